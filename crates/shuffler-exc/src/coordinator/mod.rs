//! The multi-tenant request coordinator (§3 Coordinator, §4.5.4): users,
//! channels, the single-slot mailbox, the daemon-side dispatcher, the
//! client helper, and the POSIX shared-memory transport.

pub mod client;
pub mod daemon;
pub mod mailbox;
pub mod response;
pub mod shm;
pub mod user;

pub use client::Client;
pub use daemon::{new_daemon, Daemon};
pub use mailbox::Mailbox;
pub use response::Response;
pub use shm::{ShmMailbox, ShmUser};
pub use user::{Channel, User};
