//! The application-facing facade: an in-process [`Runtime`] that talks
//! directly to the Registry/Scheduler/Executor, or a [`Client`] stub (from
//! `shuffler-exc`) that talks to an out-of-process daemon over the
//! coordinator. Both expose the same operations; which one an application
//! links against is a deployment choice, not a code change (§1, §9).

use std::sync::Arc;

use shuffler_api::{Direction, Error};
use shuffler_dea::{Dea, DmaProvider};
use shuffler_exc::{BusyWaitWaiter, CompletionWaiter, Executor, PortBuffers};
use shuffler_hcs::{Hcs, RegisterWindow};
use shuffler_kpr::Registry;
use shuffler_shs::{BitstreamLoader, Scheduler};

pub use shuffler_exc::Client;

/// Installs `env_logger` with the default filter, for applications that
/// embed [`Runtime`] directly and have no other logging setup of their own.
/// `shuffler-daemon` does this itself at startup instead of calling this.
pub fn init_logging() {
    let _ = env_logger::try_init();
}

/// The in-process runtime: owns HCS/DEA/KPR/SHS/EXC and exposes the same
/// operations a daemon client would issue, without the wire round-trip.
pub struct Runtime {
    registry: Arc<Registry>,
    scheduler: Arc<Scheduler>,
    executor: Arc<Executor>,
    loader: Arc<dyn BitstreamLoader>,
}

impl Runtime {
    /// Builds the runtime over the given collaborators. `n_slots` must
    /// match what `window` reports at `regs::N_SLOTS`, or construction
    /// fails `HwUnavailable` (§4.1).
    pub fn new(
        window: Arc<dyn RegisterWindow>,
        dma: Arc<dyn DmaProvider>,
        waiter: Option<Arc<dyn CompletionWaiter>>,
        loader: Arc<dyn BitstreamLoader>,
    ) -> Result<Self, Error> {
        let hcs = Arc::new(Hcs::new(window)?);
        let registry = Arc::new(Registry::new(hcs.n_slots() as usize));
        let scheduler = Arc::new(Scheduler::new(hcs.clone(), registry.clone()));
        let dea = Arc::new(Dea::new(dma, hcs.clone()));
        let waiter = waiter.unwrap_or_else(|| Arc::new(BusyWaitWaiter::new(hcs.clone())) as Arc<dyn CompletionWaiter>);
        let executor = Arc::new(Executor::new(registry.clone(), scheduler.clone(), dea, waiter));
        Ok(Runtime { registry, scheduler, executor, loader })
    }

    pub fn kernel_create(&self, name: &str, mem_bytes: usize, banks: usize, regs: usize) -> Result<u32, Error> {
        self.registry.create_kernel(name, mem_bytes, banks, regs)
    }

    pub fn kernel_release(&self, name: &str) -> Result<(), Error> { self.registry.release_kernel(name) }

    pub fn alloc(&self, kernel_name: &str, port_name: &str, size_bytes: usize, direction: Direction) -> Result<usize, Error> {
        self.registry.alloc_port(kernel_name, port_name, size_bytes, direction)
    }

    pub fn free(&self, kernel_name: &str, port_name: &str) -> Result<(), Error> { self.registry.free_port(kernel_name, port_name) }

    pub fn load(&self, slot: usize, name: &str, tmr: u8, dmr: u8, force: bool) -> Result<(), Error> {
        let id = self.registry.kernel_id(name)? as u8;
        self.scheduler.load(self.loader.as_ref(), slot, id, name, tmr, dmr, force)
    }

    pub fn unload(&self, slot: usize) -> Result<(), Error> { self.scheduler.unload(slot) }

    pub fn get_naccs(&self, name: &str) -> Result<u32, Error> {
        let id = self.registry.kernel_id(name)? as u8;
        self.scheduler.naccs(id)
    }

    pub fn wcfg(&self, name: &str, offset: u16, words: &[u32]) -> Result<(), Error> {
        let id = self.registry.kernel_id(name)? as u8;
        self.scheduler.wcfg(id, offset, words)
    }

    pub fn rcfg(&self, name: &str, offset: u16) -> Result<Vec<u32>, Error> {
        let id = self.registry.kernel_id(name)? as u8;
        self.scheduler.rcfg(id, offset)
    }

    /// Starts a kernel over `gsize`/`lsize`; `buffers` supplies the
    /// backing storage for every port previously allocated on it.
    pub fn execute(&self, name: &str, gsize: u64, lsize: u64, buffers: PortBuffers) -> Result<(), Error> {
        self.executor.execute(name, gsize, lsize, buffers)
    }

    /// Blocks for the running kernel to finish, returning its port buffers
    /// with output data written in.
    pub fn wait(&self, name: &str) -> Result<PortBuffers, Error> { self.executor.wait(name) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuffler_dea::MockDmaProvider;
    use shuffler_hcs::MockRegisterWindow;
    use shuffler_shs::MockBitstreamLoader;

    fn runtime() -> Runtime {
        let window = Arc::new(MockRegisterWindow::new(1 << 16));
        window.poke(shuffler_hcs::regs::N_SLOTS, 4);
        Runtime::new(window, MockDmaProvider::new(), None, Arc::new(MockBitstreamLoader::new())).unwrap()
    }

    #[test]
    fn kernel_lifecycle_round_trips_in_process() {
        let rt = runtime();
        rt.kernel_create("addvector", 4096, 2, 4).unwrap();
        rt.load(0, "addvector", 0, 0, false).unwrap();
        assert_eq!(rt.get_naccs("addvector").unwrap(), 1);
        rt.wcfg("addvector", 0, &[7]).unwrap();
        assert_eq!(rt.rcfg("addvector", 0).unwrap(), vec![7]);
        rt.unload(0).unwrap();
        rt.kernel_release("addvector").unwrap();
    }

    #[test]
    fn hw_unavailable_when_nslots_register_reads_zero() {
        let window: Arc<dyn RegisterWindow> = Arc::new(MockRegisterWindow::new(4096));
        let err = Runtime::new(window, MockDmaProvider::new(), None, Arc::new(MockBitstreamLoader::new())).unwrap_err();
        assert_eq!(err, Error::HwUnavailable);
    }
}
