//! The typed, atomic accessor over the shuffler's register file (§4.1).

use std::sync::Arc;

use shuffler_api::Error;

use crate::regs;
use crate::shadow::Shadow;
use crate::window::RegisterWindow;

/// Hardware Control Surface: every access to the shuffler's control block
/// goes through here. `Hcs` itself holds no mutable state besides the
/// register window — the shadow registers it writes during `publish` are
/// owned by the caller (SHS), per §4.4.1's copy-on-read discipline.
pub struct Hcs {
    window: Arc<dyn RegisterWindow>,
    n_slots: u32,
}

impl Hcs {
    /// Maps and validates the control block. Fails `HwUnavailable` when the
    /// slot-count register reads back zero, which is how missing firmware
    /// announces itself (§4.1).
    pub fn new(window: Arc<dyn RegisterWindow>) -> Result<Self, Error> {
        let n_slots = window.read32(regs::N_SLOTS);
        if n_slots == 0 {
            log::error!("shuffler n_slots register read 0 -- firmware missing or not mapped");
            return Err(Error::HwUnavailable);
        }
        log::info!("shuffler control block mapped, {} slots", n_slots);
        Ok(Hcs { window, n_slots })
    }

    /// The slot count learned when this `Hcs` was constructed.
    pub fn n_slots(&self) -> u32 { self.n_slots }

    /// One-shot read of the slot-count register, independent of the cached
    /// value captured at construction time; `0` signals firmware missing.
    pub fn read_nslots(&self) -> u32 { self.window.read32(regs::N_SLOTS) }

    /// Atomically writes id, TMR, DMR (as 32-bit halves) and block-size
    /// from `shadow`. The real hardware registers are the only thing
    /// mutated; `shadow` itself is not touched (§4.4.1).
    pub fn publish(&self, shadow: &Shadow) {
        self.window.write32(regs::ID_LOW, shadow.id_low());
        self.window.write32(regs::ID_HIGH, shadow.id_high());
        self.window.write32(regs::TMR_LOW, shadow.tmr_low());
        self.window.write32(regs::TMR_HIGH, shadow.tmr_high());
        self.window.write32(regs::DMR_LOW, shadow.dmr_low());
        self.window.write32(regs::DMR_HIGH, shadow.dmr_high());
        self.window.write32(regs::BLOCK_SIZE, shadow.block_size);
        log::trace!(
            "published shadow id={:#x} tmr={:#x} dmr={:#x} blksize={}",
            shadow.id_reg, shadow.tmr_reg, shadow.dmr_reg, shadow.block_size
        );
    }

    /// Address-encoded per-accelerator register write. `op=0` is a plain
    /// register access, `op=1`/`op=2` are the reset/start commands (the
    /// write value is ignored for commands, but still issued so a mock
    /// window can observe the pulse).
    pub fn regwrite(&self, id: u8, op: u8, reg12: u16, value: u32) {
        let addr = regs::encode_reg_address(id, op, reg12);
        self.window.write32(addr, value);
        log::trace!("regwrite id={} op={:#x} reg={:#x} value={:#x}", id, op, reg12, value);
    }

    /// Address-encoded per-accelerator register read.
    pub fn regread(&self, id: u8, op: u8, reg12: u16) -> u32 {
        let addr = regs::encode_reg_address(id, op, reg12);
        self.window.read32(addr)
    }

    /// `(ready & mask) == mask`: every replica covered by `mask` has
    /// finished its current round (§4.1, §4.4.2).
    pub fn transfer_is_done(&self, readymask: u32) -> bool {
        let ready = self.window.read32(regs::READY);
        (ready & readymask) == readymask
    }

    /// Enables the clock for every slot the hardware reports.
    pub fn enable_clocks(&self) {
        let mask = clock_mask(self.n_slots);
        self.window.write32(regs::CLOCK_GATE, mask);
    }

    /// Gates every slot's clock off.
    pub fn disable_clocks(&self) { self.window.write32(regs::CLOCK_GATE, 0); }

    pub fn pmc_cycles(&self, slot: usize) -> u32 { self.window.read32(regs::pmc_cycles_offset(slot)) }

    pub fn pmc_errors(&self, slot: usize) -> u32 {
        self.window.read32(regs::pmc_errors_offset(self.n_slots, slot))
    }
}

fn clock_mask(n_slots: u32) -> u32 {
    if n_slots >= 32 {
        u32::MAX
    } else {
        (1u32 << n_slots) - 1
    }
}
