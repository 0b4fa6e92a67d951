//! The kernel/port catalogue and slot table (§3, §4.3). Lookups take a
//! shared lock, inserts/removes take an exclusive lock (§5) — mirrors the
//! teacher's registry-style services where many readers (name lookups) can
//! run alongside infrequent catalogue mutation.

use std::sync::RwLock;

use shuffler_api::{limits::MAX_KERNELS, Direction, Error};

use crate::kernel::Kernel;
use crate::slot::SlotTable;

struct Inner {
    kernels: Vec<Option<Kernel>>,
    slots: SlotTable,
}

/// The Kernel & Port Registry. One instance is shared (behind an `Arc`) by
/// every delegate and by the scheduler.
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    pub fn new(n_slots: usize) -> Self {
        Registry {
            inner: RwLock::new(Inner { kernels: (0..MAX_KERNELS).map(|_| None).collect(), slots: SlotTable::new(n_slots) }),
        }
    }

    pub fn slot_count(&self) -> usize { self.inner.read().unwrap().slots.len() }

    /// Reserves the first free identity in `1..=MAX_KERNELS`, rounds the
    /// per-bank memory size, and registers `name`. Fails `TooManyKernels` if
    /// every identity slot is occupied, `DuplicateName` if `name` is already
    /// registered.
    pub fn create_kernel(&self, name: &str, mem_bytes: usize, banks: usize, regs: usize) -> Result<u32, Error> {
        let mut inner = self.inner.write().unwrap();
        if inner.kernels.iter().flatten().any(|k| k.name == name) {
            return Err(Error::DuplicateName);
        }
        let slot = inner.kernels.iter().position(|k| k.is_none()).ok_or(Error::TooManyKernels)?;
        let id = (slot + 1) as u32;
        inner.kernels[slot] = Some(Kernel::new(id, name, mem_bytes, banks, regs));
        Ok(id)
    }

    /// Clears any slot bound to this kernel and drops its catalogue entry.
    pub fn release_kernel(&self, name: &str) -> Result<(), Error> {
        let mut inner = self.inner.write().unwrap();
        let slot = inner.kernels.iter().position(|k| matches!(k, Some(k) if k.name == name)).ok_or(Error::NotFound)?;
        let id = inner.kernels[slot].as_ref().unwrap().id;
        inner.slots.clear_bound_to(id);
        inner.kernels[slot] = None;
        Ok(())
    }

    pub fn alloc_port(&self, kname: &str, pname: &str, size_bytes: usize, direction: Direction) -> Result<usize, Error> {
        let mut inner = self.inner.write().unwrap();
        let kernel = inner
            .kernels
            .iter_mut()
            .flatten()
            .find(|k| k.name == kname)
            .ok_or(Error::NotFound)?;
        if kernel.contains_name_anywhere(pname) {
            return Err(Error::DuplicatePort);
        }
        let bank = kernel.next_bank(direction).ok_or(Error::NoFreeBank)?;
        kernel.insert_port(pname, size_bytes, direction, bank);
        Ok(bank)
    }

    /// Marks a kernel's constant ports as resident on the hardware, so
    /// subsequent SEND phases skip re-transferring them (§4.5.2).
    pub fn mark_constants_loaded(&self, kname: &str) -> Result<(), Error> {
        let mut inner = self.inner.write().unwrap();
        let kernel = inner.kernels.iter_mut().flatten().find(|k| k.name == kname).ok_or(Error::NotFound)?;
        kernel.constants_loaded = true;
        Ok(())
    }

    pub fn free_port(&self, kname: &str, pname: &str) -> Result<(), Error> {
        let mut inner = self.inner.write().unwrap();
        let kernel = inner
            .kernels
            .iter_mut()
            .flatten()
            .find(|k| k.name == kname)
            .ok_or(Error::NotFound)?;
        kernel.remove_port_anywhere(pname).map(|_| ()).ok_or(Error::NotFound)
    }

    /// Runs `f` with a read-only view of the named kernel.
    pub fn with_kernel<R>(&self, name: &str, f: impl FnOnce(&Kernel) -> R) -> Result<R, Error> {
        let inner = self.inner.read().unwrap();
        let kernel = inner.kernels.iter().flatten().find(|k| k.name == name).ok_or(Error::NotFound)?;
        Ok(f(kernel))
    }

    /// Runs `f` with a read-only view of the kernel bound to `id`.
    pub fn with_kernel_by_id<R>(&self, id: u32, f: impl FnOnce(&Kernel) -> R) -> Result<R, Error> {
        let inner = self.inner.read().unwrap();
        let kernel = inner.kernels.iter().flatten().find(|k| k.id == id).ok_or(Error::NotFound)?;
        Ok(f(kernel))
    }

    pub fn kernel_id(&self, name: &str) -> Result<u32, Error> {
        self.with_kernel(name, |k| k.id)
    }

    /// Binds `kernel_id` to `slot`, moving it to `Loading`. Fails
    /// `SlotOutOfRange` if `slot` is out of bounds.
    pub fn begin_load(&self, slot: usize, kernel_id: u32) -> Result<(), Error> {
        let mut inner = self.inner.write().unwrap();
        let entry = inner.slots.get_mut(slot).ok_or(Error::SlotOutOfRange)?;
        entry.state = crate::slot::SlotState::Loading;
        entry.kernel = Some(kernel_id);
        Ok(())
    }

    pub fn finish_load(&self, slot: usize) -> Result<(), Error> {
        let mut inner = self.inner.write().unwrap();
        let entry = inner.slots.get_mut(slot).ok_or(Error::SlotOutOfRange)?;
        entry.state = crate::slot::SlotState::Idle;
        Ok(())
    }

    pub fn unload_slot(&self, slot: usize) -> Result<(), Error> {
        let mut inner = self.inner.write().unwrap();
        let entry = inner.slots.get_mut(slot).ok_or(Error::SlotOutOfRange)?;
        *entry = crate::slot::Slot::empty();
        Ok(())
    }

    /// Moves every slot bound to `kernel_id` to `state` — the delegate round
    /// loop calls this at each SEND/WAIT/RECV boundary (§4.5.1-3).
    pub fn set_round_state(&self, kernel_id: u32, state: crate::slot::SlotState) {
        let mut inner = self.inner.write().unwrap();
        inner.slots.set_state_bound_to(kernel_id, state);
    }

    pub fn slot_state(&self, slot: usize) -> Result<crate::slot::SlotState, Error> {
        let inner = self.inner.read().unwrap();
        inner.slots.get(slot).map(|s| s.state).ok_or(Error::SlotOutOfRange)
    }

    pub fn slot_kernel(&self, slot: usize) -> Result<Option<u32>, Error> {
        let inner = self.inner.read().unwrap();
        inner.slots.get(slot).map(|s| s.kernel).ok_or(Error::SlotOutOfRange)
    }
}
