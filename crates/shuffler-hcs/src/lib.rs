//! Hardware Control Surface (HCS): typed, atomic access to the shuffler's
//! memory-mapped register file, decoupled from any particular host.

pub mod hcs;
pub mod regs;
pub mod shadow;
pub mod window;

pub use hcs::Hcs;
pub use shadow::Shadow;
pub use window::{MmapRegisterWindow, MockRegisterWindow, RegisterWindow};
