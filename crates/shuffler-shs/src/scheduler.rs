//! Owns the shuffler shadow registers and the execution lock that
//! serialises reconfiguration against in-flight delegate rounds (§4.4,
//! §5).

use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use shuffler_api::Error;
use shuffler_hcs::{Hcs, Shadow};
use shuffler_kpr::Registry;

use crate::loader::BitstreamLoader;
use crate::naccs;

struct State {
    shadow: Shadow,
    running: u32,
}

/// One round's worth of scheduling facts, handed to the delegate by
/// [`Scheduler::begin_round`].
pub struct RoundContext {
    pub naccs: u32,
    pub readymask: u32,
}

/// The Shuffler Scheduler. Shared by every delegate (EXC) and by the
/// load/unload/wcfg/rcfg reconfiguration path.
pub struct Scheduler {
    hcs: Arc<Hcs>,
    registry: Arc<Registry>,
    state: Mutex<State>,
    idle: Condvar,
}

impl Scheduler {
    pub fn new(hcs: Arc<Hcs>, registry: Arc<Registry>) -> Self {
        Scheduler { hcs, registry, state: Mutex::new(State { shadow: Shadow::default(), running: 0 }), idle: Condvar::new() }
    }

    pub fn registry(&self) -> &Arc<Registry> { &self.registry }

    fn n_slots(&self) -> usize { self.hcs.n_slots() as usize }

    /// Equivalent accelerator count for `k`, read off the current shadow.
    pub fn naccs(&self, k: u8) -> Result<u32, Error> {
        let state = self.state.lock().unwrap();
        let n = naccs::equivalent_accelerator_count(&state.shadow, self.n_slots(), k);
        if n == 0 { Err(Error::NoAccelerators) } else { Ok(n) }
    }

    pub fn readymask(&self, k: u8) -> u32 {
        let state = self.state.lock().unwrap();
        naccs::ready_mask(&state.shadow, self.n_slots(), k)
    }

    /// Bumps the running counter and computes this round's scheduling
    /// facts. Held only long enough to read the shadow and register
    /// intent to run — not across the SEND/RECV phases themselves, which
    /// block on DMA and must let other kernels' delegates interleave
    /// freely (§5). Reconfiguration instead serialises against the
    /// `running` counter via [`Scheduler::end_round`]'s wake-up and its own
    /// wait-until-idle loop.
    pub fn begin_round(&self, k: u8) -> Result<RoundContext, Error> {
        let mut state = self.state.lock().unwrap();
        let n_slots = self.n_slots();
        let naccs = naccs::equivalent_accelerator_count(&state.shadow, n_slots, k);
        if naccs == 0 {
            return Err(Error::NoAccelerators);
        }
        let readymask = naccs::ready_mask(&state.shadow, n_slots, k);
        state.running += 1;
        Ok(RoundContext { naccs, readymask })
    }

    /// Decrements the running counter and wakes anyone waiting to
    /// reconfigure.
    pub fn end_round(&self) {
        let mut state = self.state.lock().unwrap();
        state.running -= 1;
        self.idle.notify_all();
    }

    /// Updates only the block-size word of the currently-published shadow,
    /// leaving id/TMR/DMR untouched — the SEND/RECV phases republish this
    /// before every DMA descriptor (§4.5.2).
    pub fn publish_block_size(&self, block_size: u32) {
        let mut state = self.state.lock().unwrap();
        state.shadow.block_size = block_size;
        self.hcs.publish(&state.shadow);
    }

    /// Direct access to the HCS for the command writes SEND/RECV need
    /// outside the shadow (the software start command, DMA hw offsets).
    pub fn hcs(&self) -> &Arc<Hcs> { &self.hcs }

    fn wait_until_idle<'a>(&'a self, mut state: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        while state.running != 0 {
            state = self.idle.wait(state).unwrap();
        }
        state
    }

    /// Load admits only when no kernel is running. Idempotent when the
    /// slot already holds the same (kernel, tmr, dmr) and `force` is false
    /// (§4.4.4, §8).
    pub fn load(
        &self,
        loader: &dyn BitstreamLoader,
        slot: usize,
        kernel_id: u8,
        kernel_name: &str,
        tmr: u8,
        dmr: u8,
        force: bool,
    ) -> Result<(), Error> {
        let state = self.state.lock().unwrap();
        let mut state = self.wait_until_idle(state);

        if slot >= self.n_slots() as usize {
            return Err(Error::SlotOutOfRange);
        }
        if !force
            && state.shadow.id_nibble(slot) == kernel_id
            && state.shadow.tmr_nibble(slot) == tmr
            && state.shadow.dmr_nibble(slot) == dmr
        {
            return Ok(());
        }

        let bound = self.registry.slot_kernel(slot)?;
        if bound.is_none() || bound != Some(kernel_id as u32) || force {
            self.registry.begin_load(slot, kernel_id as u32)?;
            let path = crate::loader::partial_bitstream_path(kernel_name, slot);
            loader.load_bitstream(&path, true).map_err(|_| Error::ReconfigFailed)?;
            self.registry.finish_load(slot)?;
        }

        state.shadow.set_id_nibble(slot, kernel_id);
        state.shadow.set_tmr_nibble(slot, tmr);
        state.shadow.set_dmr_nibble(slot, dmr);
        self.hcs.publish(&state.shadow);
        Ok(())
    }

    pub fn unload(&self, slot: usize) -> Result<(), Error> {
        let state = self.state.lock().unwrap();
        let mut state = self.wait_until_idle(state);
        if slot >= self.n_slots() as usize {
            return Err(Error::SlotOutOfRange);
        }
        self.registry.unload_slot(slot)?;
        state.shadow.clear_slot(slot);
        self.hcs.publish(&state.shadow);
        Ok(())
    }

    /// Writes `cfg` to offset `offset` of every participating unit of
    /// kernel `k`, sequenced TMR-then-DMR-then-simplex (§4.4.3). Holds the
    /// execution lock for the whole sequence so it serialises against
    /// delegates and other reconfiguration.
    pub fn wcfg(&self, k: u8, offset: u16, cfg: &[u32]) -> Result<(), Error> {
        let state = self.state.lock().unwrap();
        let mut state = self.wait_until_idle(state);
        let previous = state.shadow;
        let units = replicated_units(&previous, self.n_slots(), k);
        for (unit, value) in units.iter().zip(cfg.iter()) {
            state.shadow = *unit;
            state.shadow.block_size = 0;
            self.hcs.publish(&state.shadow);
            self.hcs.regwrite(k, 0, offset, *value);
        }
        state.shadow = previous;
        self.hcs.publish(&state.shadow);
        Ok(())
    }

    /// Reads offset `offset` back from every participating unit of kernel
    /// `k`, same sequencing as [`Scheduler::wcfg`].
    pub fn rcfg(&self, k: u8, offset: u16) -> Result<Vec<u32>, Error> {
        let state = self.state.lock().unwrap();
        let mut state = self.wait_until_idle(state);
        let previous = state.shadow;
        let units = replicated_units(&previous, self.n_slots(), k);
        let mut out = Vec::with_capacity(units.len());
        for unit in &units {
            state.shadow = *unit;
            state.shadow.block_size = 0;
            self.hcs.publish(&state.shadow);
            out.push(self.hcs.regread(k, 0, offset));
        }
        state.shadow = previous;
        self.hcs.publish(&state.shadow);
        Ok(out)
    }
}

/// TMR groups ascending group id, then DMR groups ascending group id, then
/// simplex slots ascending index — each yielding a pseudo-shadow holding
/// only the slots of that one unit.
fn replicated_units(shadow: &Shadow, n_slots: usize, k: u8) -> Vec<Shadow> {
    let mut units = Vec::new();

    for group in 1..=15u8 {
        let members: Vec<usize> = (0..n_slots).filter(|&i| shadow.id_nibble(i) == k && shadow.tmr_nibble(i) == group).collect();
        if members.is_empty() {
            continue;
        }
        let mut pseudo = Shadow::default();
        for &slot in &members {
            pseudo.set_id_nibble(slot, k);
            pseudo.set_tmr_nibble(slot, group);
        }
        units.push(pseudo);
    }

    for group in 1..=15u8 {
        let members: Vec<usize> = (0..n_slots)
            .filter(|&i| shadow.id_nibble(i) == k && shadow.tmr_nibble(i) == 0 && shadow.dmr_nibble(i) == group)
            .collect();
        if members.is_empty() {
            continue;
        }
        let mut pseudo = Shadow::default();
        for &slot in &members {
            pseudo.set_id_nibble(slot, k);
            pseudo.set_dmr_nibble(slot, group);
        }
        units.push(pseudo);
    }

    for slot in 0..n_slots {
        if shadow.id_nibble(slot) == k && shadow.tmr_nibble(slot) == 0 && shadow.dmr_nibble(slot) == 0 {
            let mut pseudo = Shadow::default();
            pseudo.set_id_nibble(slot, k);
            units.push(pseudo);
        }
    }

    units
}
