//! Executor & Coordinator: the per-kernel delegate round loop (§4.5.1-3)
//! and the multi-tenant shared-memory request coordinator (§4.5.4) built on
//! top of the Kernel & Port Registry and the Shuffler Scheduler.

pub mod buffers;
pub mod coordinator;
pub mod delegate;
pub mod executor;
pub mod transfer;
pub mod waiter;

pub use buffers::PortBuffers;
pub use coordinator::{new_daemon, Client, Daemon, ShmMailbox, ShmUser};
pub use delegate::Delegate;
pub use executor::Executor;
pub use waiter::{BusyWaitWaiter, CompletionWaiter, IrqSource, IrqWaiter};
