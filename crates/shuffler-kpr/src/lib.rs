//! Kernel & Port Registry (KPR): the in-memory catalogue of kernels and
//! their ports, the sorted bank-assignment rule, and the slot table kernels
//! are bound to.

pub mod kernel;
pub mod port;
pub mod registry;
pub mod slot;

pub use kernel::Kernel;
pub use port::{Port, PortList};
pub use registry::Registry;
pub use slot::{Slot, SlotState, SlotTable};

#[cfg(test)]
mod tests {
    use super::*;
    use shuffler_api::{Direction, Error};

    #[test]
    fn create_kernel_rounds_mem_bytes_up_to_integral_bank_words() {
        let reg = Registry::new(4);
        // 16384 / 3 banks = 5461.33 bytes/bank -> rounds up to 5464 (1366 words * 4)
        let id = reg.create_kernel("addvector", 16384, 3, 0).unwrap();
        reg.with_kernel_by_id(id, |k| {
            assert_eq!(k.mem_bytes % (k.banks * 4), 0);
            assert!(k.mem_bytes >= 16384);
        })
        .unwrap();
    }

    #[test]
    fn duplicate_kernel_name_is_rejected() {
        let reg = Registry::new(4);
        reg.create_kernel("k", 1024, 2, 0).unwrap();
        assert_eq!(reg.create_kernel("k", 1024, 2, 0).unwrap_err(), Error::DuplicateName);
    }

    #[test]
    fn too_many_kernels_is_rejected() {
        let reg = Registry::new(4);
        for i in 0..shuffler_api::limits::MAX_KERNELS {
            reg.create_kernel(&format!("k{i}"), 1024, 2, 0).unwrap();
        }
        assert_eq!(reg.create_kernel("overflow", 1024, 2, 0).unwrap_err(), Error::TooManyKernels);
    }

    #[test]
    fn kernel_identities_are_reused_after_release() {
        let reg = Registry::new(4);
        let id1 = reg.create_kernel("a", 1024, 2, 0).unwrap();
        reg.release_kernel("a").unwrap();
        let id2 = reg.create_kernel("b", 1024, 2, 0).unwrap();
        assert_eq!(id1, id2);
    }

    #[test]
    fn ports_are_kept_name_sorted_ascending() {
        let reg = Registry::new(4);
        reg.create_kernel("k", 4096, 4, 0).unwrap();
        reg.alloc_port("k", "zeta", 1024, Direction::Input).unwrap();
        reg.alloc_port("k", "alpha", 1024, Direction::Input).unwrap();
        reg.alloc_port("k", "mid", 1024, Direction::Input).unwrap();
        reg.with_kernel("k", |k| {
            let names: Vec<_> = k.ports(Direction::Input).iter().map(|p| p.name.clone()).collect();
            assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        })
        .unwrap();
    }

    #[test]
    fn inputs_fill_low_banks_outputs_fill_high_banks() {
        let reg = Registry::new(4);
        reg.create_kernel("k", 4096, 4, 0).unwrap();
        let in_bank = reg.alloc_port("k", "a", 1024, Direction::Input).unwrap();
        let out_bank = reg.alloc_port("k", "b", 1024, Direction::Output).unwrap();
        assert_eq!(in_bank, 0);
        assert_eq!(out_bank, 3);
    }

    #[test]
    fn no_free_bank_once_all_banks_taken() {
        let reg = Registry::new(4);
        reg.create_kernel("k", 4096, 2, 0).unwrap();
        reg.alloc_port("k", "a", 1024, Direction::Input).unwrap();
        reg.alloc_port("k", "b", 1024, Direction::Output).unwrap();
        assert_eq!(reg.alloc_port("k", "c", 1024, Direction::Input).unwrap_err(), Error::NoFreeBank);
    }

    #[test]
    fn duplicate_port_name_is_rejected() {
        let reg = Registry::new(4);
        reg.create_kernel("k", 4096, 4, 0).unwrap();
        reg.alloc_port("k", "a", 1024, Direction::Input).unwrap();
        assert_eq!(reg.alloc_port("k", "a", 1024, Direction::Output).unwrap_err(), Error::DuplicatePort);
    }

    #[test]
    fn free_port_releases_its_bank_for_reuse() {
        let reg = Registry::new(4);
        reg.create_kernel("k", 4096, 2, 0).unwrap();
        reg.alloc_port("k", "a", 1024, Direction::Input).unwrap();
        reg.free_port("k", "a").unwrap();
        let bank = reg.alloc_port("k", "b", 1024, Direction::Input).unwrap();
        assert_eq!(bank, 0);
    }

    #[test]
    fn alloc_port_on_constant_direction_resets_constants_loaded() {
        let reg = Registry::new(4);
        reg.create_kernel("k", 4096, 4, 0).unwrap();
        reg.alloc_port("k", "c0", 16, Direction::Constant).unwrap();
        reg.with_kernel("k", |k| assert!(!k.constants_loaded)).unwrap();
    }

    #[test]
    fn release_kernel_clears_its_bound_slot() {
        let reg = Registry::new(4);
        let id = reg.create_kernel("k", 4096, 2, 0).unwrap();
        reg.begin_load(0, id).unwrap();
        reg.finish_load(0).unwrap();
        reg.release_kernel("k").unwrap();
        assert_eq!(reg.slot_state(0).unwrap(), SlotState::Empty);
        assert_eq!(reg.slot_kernel(0).unwrap(), None);
    }

    #[test]
    fn operations_on_unknown_kernel_fail_not_found() {
        let reg = Registry::new(4);
        assert_eq!(reg.release_kernel("nope").unwrap_err(), Error::NotFound);
        assert_eq!(reg.alloc_port("nope", "p", 4, Direction::Input).unwrap_err(), Error::NotFound);
        assert_eq!(reg.free_port("nope", "p").unwrap_err(), Error::NotFound);
    }

    #[test]
    fn slot_out_of_range_is_rejected() {
        let reg = Registry::new(2);
        assert_eq!(reg.begin_load(5, 1).unwrap_err(), Error::SlotOutOfRange);
        assert_eq!(reg.unload_slot(5).unwrap_err(), Error::SlotOutOfRange);
    }

    #[test]
    fn set_round_state_only_moves_slots_bound_to_that_kernel() {
        let reg = Registry::new(4);
        let a = reg.create_kernel("a", 1024, 2, 0).unwrap();
        let b = reg.create_kernel("b", 1024, 2, 0).unwrap();
        reg.begin_load(0, a).unwrap();
        reg.finish_load(0).unwrap();
        reg.begin_load(1, b).unwrap();
        reg.finish_load(1).unwrap();

        reg.set_round_state(a, SlotState::Writing);
        assert_eq!(reg.slot_state(0).unwrap(), SlotState::Writing);
        assert_eq!(reg.slot_state(1).unwrap(), SlotState::Idle);
    }
}
