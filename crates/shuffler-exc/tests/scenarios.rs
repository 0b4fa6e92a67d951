//! End-to-end scenarios exercising HCS+DEA+KPR+SHS+EXC together, from the
//! public API only. `MockDmaProvider` moves bytes but does not model the
//! accelerator's own arithmetic (no silicon is simulated here), so these
//! assert the scheduling/round/work-size invariants rather than output
//! values a real accelerator would compute.

use std::sync::Arc;
use std::time::Duration;

use shuffler_api::{Direction, Error};
use shuffler_dea::{Dea, MockDmaProvider};
use shuffler_exc::{BusyWaitWaiter, CompletionWaiter, Executor, PortBuffers};
use shuffler_hcs::{Hcs, MockRegisterWindow};
use shuffler_kpr::Registry;
use shuffler_shs::{MockBitstreamLoader, Scheduler};

/// Sleeps a fixed duration per round regardless of register state, so a
/// test can observe a delegate still running without racing real time.
struct SlowWaiter(Duration);
impl CompletionWaiter for SlowWaiter {
    fn wait(&self, _mask: u32) { std::thread::sleep(self.0); }
}

struct Harness {
    registry: Arc<Registry>,
    scheduler: Arc<Scheduler>,
    executor: Arc<Executor>,
    loader: MockBitstreamLoader,
}

fn harness(n_slots: u32) -> Harness {
    let window = Arc::new(MockRegisterWindow::new(1 << 20));
    window.poke(shuffler_hcs::regs::N_SLOTS, n_slots);
    // No firmware ever flips the ready register in this mock; pre-assert it
    // so `BusyWaitWaiter` observes every round as immediately complete.
    window.poke(shuffler_hcs::regs::READY, u32::MAX);
    let hcs = Arc::new(Hcs::new(window).unwrap());
    let waiter: Arc<dyn CompletionWaiter> = Arc::new(BusyWaitWaiter::new(hcs.clone()));
    harness_with_waiter(n_slots, hcs, waiter)
}

fn harness_with_waiter(n_slots: u32, hcs: Arc<Hcs>, waiter: Arc<dyn CompletionWaiter>) -> Harness {
    let registry = Arc::new(Registry::new(n_slots as usize));
    let scheduler = Arc::new(Scheduler::new(hcs.clone(), registry.clone()));
    let dea = Arc::new(Dea::new(MockDmaProvider::new(), hcs));
    let executor = Arc::new(Executor::new(registry.clone(), scheduler.clone(), dea, waiter));
    Harness { registry, scheduler, executor, loader: MockBitstreamLoader::new() }
}

fn buffers_1024() -> PortBuffers {
    let mut b = PortBuffers::new();
    b.insert("a", vec![1u32; 1024]);
    b.insert("b", vec![2u32; 1024]);
    b.insert("c", vec![0u32; 1024]);
    b
}

#[test]
fn single_slot_addvector_runs_one_round_with_one_accelerator() {
    let h = harness(4);
    let id = h.registry.create_kernel("addvector", 16384, 3, 0).unwrap();
    h.registry.alloc_port("addvector", "a", 1024 * 4, Direction::Input).unwrap();
    h.registry.alloc_port("addvector", "b", 1024 * 4, Direction::Input).unwrap();
    h.registry.alloc_port("addvector", "c", 1024 * 4, Direction::Output).unwrap();
    h.scheduler.load(&h.loader, 0, id as u8, "addvector", 0, 0, false).unwrap();
    assert_eq!(h.scheduler.naccs(id as u8).unwrap(), 1);

    h.executor.execute("addvector", 1024, 1024, buffers_1024()).unwrap();
    let out = h.executor.wait("addvector").unwrap();
    assert_eq!(out.get("c").len(), 1024);
}

#[test]
fn four_simplex_replicas_collapse_to_one_round_of_four_accelerators() {
    let h = harness(4);
    let id = h.registry.create_kernel("addvector", 16384, 3, 0).unwrap();
    h.registry.alloc_port("addvector", "a", 4096 * 4, Direction::Input).unwrap();
    h.registry.alloc_port("addvector", "b", 4096 * 4, Direction::Input).unwrap();
    h.registry.alloc_port("addvector", "c", 4096 * 4, Direction::Output).unwrap();
    for slot in 0..4 {
        h.scheduler.load(&h.loader, slot, id as u8, "addvector", 0, 0, false).unwrap();
    }
    assert_eq!(h.scheduler.naccs(id as u8).unwrap(), 4);

    let mut b = PortBuffers::new();
    b.insert("a", vec![1u32; 4096]);
    b.insert("b", vec![2u32; 4096]);
    b.insert("c", vec![0u32; 4096]);
    h.executor.execute("addvector", 4096, 1024, b).unwrap();
    let out = h.executor.wait("addvector").unwrap();
    assert_eq!(out.get("c").len(), 4096);
}

#[test]
fn tmr_group_of_three_plus_one_simplex_runs_two_rounds() {
    let h = harness(4);
    let id = h.registry.create_kernel("addvector", 16384, 3, 0).unwrap();
    h.registry.alloc_port("addvector", "a", 2048 * 4, Direction::Input).unwrap();
    h.registry.alloc_port("addvector", "b", 2048 * 4, Direction::Input).unwrap();
    h.registry.alloc_port("addvector", "c", 2048 * 4, Direction::Output).unwrap();
    h.scheduler.load(&h.loader, 0, id as u8, "addvector", 1, 0, false).unwrap();
    h.scheduler.load(&h.loader, 1, id as u8, "addvector", 1, 0, false).unwrap();
    h.scheduler.load(&h.loader, 2, id as u8, "addvector", 1, 0, false).unwrap();
    h.scheduler.load(&h.loader, 3, id as u8, "addvector", 0, 0, false).unwrap();
    assert_eq!(h.scheduler.naccs(id as u8).unwrap(), 2);

    let mut b = PortBuffers::new();
    b.insert("a", vec![1u32; 2048]);
    b.insert("b", vec![2u32; 2048]);
    b.insert("c", vec![0u32; 2048]);
    h.executor.execute("addvector", 2048, 1024, b).unwrap();
    let out = h.executor.wait("addvector").unwrap();
    assert_eq!(out.get("c").len(), 2048);
}

#[test]
fn round_misalignment_is_rejected_before_any_transfer() {
    let h = harness(4);
    let id = h.registry.create_kernel("addvector", 16384, 3, 0).unwrap();
    h.registry.alloc_port("addvector", "a", 1024 * 4, Direction::Input).unwrap();
    h.scheduler.load(&h.loader, 0, id as u8, "addvector", 0, 0, false).unwrap();

    let mut b = PortBuffers::new();
    b.insert("a", vec![1u32; 1024]);
    let err = h.executor.execute("addvector", 1000, 1024, b).unwrap_err();
    assert_eq!(err, Error::BadWorkSize);
}

#[test]
fn reconfiguration_blocks_until_the_run_completes() {
    let window = Arc::new(MockRegisterWindow::new(1 << 20));
    window.poke(shuffler_hcs::regs::N_SLOTS, 4);
    let hcs = Arc::new(Hcs::new(window).unwrap());
    let waiter: Arc<dyn CompletionWaiter> = Arc::new(SlowWaiter(Duration::from_millis(50)));
    let h = harness_with_waiter(4, hcs, waiter);
    let id = h.registry.create_kernel("addvector", 16384, 3, 0).unwrap();
    h.registry.alloc_port("addvector", "a", 8192 * 4, Direction::Input).unwrap();
    h.registry.alloc_port("addvector", "b", 8192 * 4, Direction::Input).unwrap();
    h.registry.alloc_port("addvector", "c", 8192 * 4, Direction::Output).unwrap();
    h.scheduler.load(&h.loader, 0, id as u8, "addvector", 0, 0, false).unwrap();

    let mut b = PortBuffers::new();
    b.insert("a", vec![1u32; 8192]);
    b.insert("b", vec![2u32; 8192]);
    b.insert("c", vec![0u32; 8192]);
    h.executor.execute("addvector", 8192, 1024, b).unwrap();

    let second_id = h.registry.create_kernel("other", 16384, 3, 0).unwrap();
    let scheduler = h.scheduler.clone();
    let loader2 = MockBitstreamLoader::new();
    let blocked = std::thread::spawn(move || scheduler.load(&loader2, 1, second_id as u8, "other", 0, 0, false));

    std::thread::sleep(Duration::from_millis(20));
    assert!(!blocked.is_finished(), "load must block while a delegate is running");

    h.executor.wait("addvector").unwrap();
    blocked.join().unwrap().unwrap();
}
