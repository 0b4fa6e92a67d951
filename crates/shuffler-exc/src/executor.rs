//! Ties the Registry, Scheduler, DMA engine adapter and completion waiter
//! together into `execute`/`wait` (§4.5): one delegate thread per
//! concurrently running kernel, tracked by name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use shuffler_api::Error;
use shuffler_dea::Dea;
use shuffler_kpr::Registry;
use shuffler_shs::Scheduler;

use crate::buffers::PortBuffers;
use crate::delegate::Delegate;
use crate::waiter::CompletionWaiter;

/// Owns the set of currently running delegates. Shared by every daemon
/// worker thread handling `KernelExecute`/`KernelWait` requests.
pub struct Executor {
    registry: Arc<Registry>,
    scheduler: Arc<Scheduler>,
    dea: Arc<Dea>,
    waiter: Arc<dyn CompletionWaiter>,
    running: Mutex<HashMap<String, Delegate>>,
}

impl Executor {
    pub fn new(registry: Arc<Registry>, scheduler: Arc<Scheduler>, dea: Arc<Dea>, waiter: Arc<dyn CompletionWaiter>) -> Self {
        Executor { registry, scheduler, dea, waiter, running: Mutex::new(HashMap::new()) }
    }

    /// Starts a delegate for `kernel_name`. `gsize` must be a multiple of
    /// `lsize` (`BadWorkSize`); a delegate already running for this kernel
    /// is `AlreadyRunning` (§4.5, §7).
    pub fn execute(&self, kernel_name: &str, gsize: u64, lsize: u64, buffers: PortBuffers) -> Result<(), Error> {
        if lsize == 0 || gsize % lsize != 0 {
            return Err(Error::BadWorkSize);
        }
        let nrounds = (gsize / lsize) as usize;
        let kernel_id = self.registry.kernel_id(kernel_name)? as u8;

        let mut running = self.running.lock().unwrap();
        if running.contains_key(kernel_name) {
            return Err(Error::AlreadyRunning);
        }

        let delegate = Delegate::spawn(
            self.registry.clone(),
            self.scheduler.clone(),
            self.dea.clone(),
            self.waiter.clone(),
            kernel_name.to_string(),
            kernel_id,
            nrounds,
            buffers,
        );
        running.insert(kernel_name.to_string(), delegate);
        Ok(())
    }

    /// Joins the delegate for `kernel_name`, returning its port buffers
    /// with RECV's output data written in. `NotFound` if nothing is
    /// running for that name.
    pub fn wait(&self, kernel_name: &str) -> Result<PortBuffers, Error> {
        let delegate = {
            let mut running = self.running.lock().unwrap();
            running.remove(kernel_name).ok_or(Error::NotFound)?
        };
        delegate.join()
    }

    /// True if a delegate is currently running for `kernel_name`.
    pub fn is_running(&self, kernel_name: &str) -> bool { self.running.lock().unwrap().contains_key(kernel_name) }
}
