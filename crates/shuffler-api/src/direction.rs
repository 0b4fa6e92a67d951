//! Port/transfer direction shared by the registry, the scheduler and the
//! wire layer.

use num_derive::{FromPrimitive, ToPrimitive};

/// A port's role in a kernel's bank layout (§3 Port, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum Direction {
    Constant = 0,
    Input = 1,
    Output = 2,
    InOut = 3,
}

/// The direction of one DMA transfer against the data aperture (§4.2, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    MemToHw,
    HwToMem,
}
