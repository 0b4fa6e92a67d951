//! The per-kernel delegate: the round loop from §4.5.1, run on its own OS
//! thread for the lifetime of one `execute` call. Drives every slot bound
//! to the kernel through its lifecycle each round: `Writing` during SEND,
//! `Running` while the waiter blocks on completion, `Reading` during RECV,
//! `Ready` once RECV returns, `Idle` once the round is fully closed out.

use std::sync::Arc;
use std::thread::JoinHandle;

use shuffler_api::Error;
use shuffler_dea::Dea;
use shuffler_kpr::{Registry, SlotState};
use shuffler_shs::Scheduler;

use crate::buffers::PortBuffers;
use crate::transfer;
use crate::waiter::CompletionWaiter;

/// A running (or finished) delegate. `wait` joins the underlying thread and
/// hands back the port buffers it was given, with RECV's output data
/// written into them.
pub struct Delegate {
    handle: JoinHandle<Result<PortBuffers, Error>>,
}

impl Delegate {
    /// Spawns the delegate thread. `gsize % lsize` must already have been
    /// validated by the caller (`Executor::execute`); this only runs the
    /// loop.
    pub fn spawn(
        registry: Arc<Registry>,
        scheduler: Arc<Scheduler>,
        dea: Arc<Dea>,
        waiter: Arc<dyn CompletionWaiter>,
        kernel_name: String,
        kernel_id: u8,
        nrounds: usize,
        mut buffers: PortBuffers,
    ) -> Self {
        let handle = std::thread::spawn(move || -> Result<PortBuffers, Error> {
            let mut round = 0usize;
            let id32 = kernel_id as u32;
            while round < nrounds {
                let ctx = scheduler.begin_round(kernel_id)?;

                registry.set_round_state(id32, SlotState::Writing);
                let send_result = transfer::send(&registry, &scheduler, &dea, &kernel_name, kernel_id, ctx.naccs, round, nrounds, &buffers);
                if let Err(e) = send_result {
                    registry.set_round_state(id32, SlotState::Idle);
                    scheduler.end_round();
                    return Err(e);
                }

                registry.set_round_state(id32, SlotState::Running);
                waiter.wait(ctx.readymask);

                registry.set_round_state(id32, SlotState::Reading);
                let recv_result = transfer::recv(&registry, &scheduler, &dea, &kernel_name, kernel_id, ctx.naccs, round, nrounds, &mut buffers);
                round += ctx.naccs as usize;

                registry.set_round_state(id32, SlotState::Ready);
                scheduler.end_round();
                registry.set_round_state(id32, SlotState::Idle);
                recv_result?;
            }
            Ok(buffers)
        });
        Delegate { handle }
    }

    /// Joins the delegate, returning the port buffers with RECV's results
    /// written in (or the error the loop failed with).
    pub fn join(self) -> Result<PortBuffers, Error> {
        self.handle.join().expect("delegate thread panicked")
    }
}
