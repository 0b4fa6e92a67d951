//! The closed error taxonomy returned by every fallible operation in the
//! core (HCS/DEA/KPR/SHS/EXC) and surfaced to daemon clients as a negative
//! wire code.

use num_derive::{FromPrimitive, ToPrimitive};

/// All failures the runtime can report. Ordering is stable: the discriminant
/// is part of the wire contract with daemon clients (see §7 of the spec),
/// so existing variants must never be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(i32)]
pub enum Error {
    /// The MMIO mapping for the shuffler control block is absent.
    HwUnavailable = 1,
    /// The DMA provider could not be reached.
    DmaUnavailable = 2,
    /// A partial-bitstream load failed.
    ReconfigFailed = 3,
    /// A kernel, port, slot or user lookup failed.
    NotFound = 4,
    /// A kernel name is already registered.
    DuplicateName = 5,
    /// A port name is already registered within its kernel/direction.
    DuplicatePort = 6,
    /// No free kernel identity remains in `1..=MAX_KERNELS`.
    TooManyKernels = 7,
    /// No free user id remains.
    TooManyUsers = 8,
    /// A port cannot be placed in any free bank.
    NoFreeBank = 9,
    /// A user has no free request/response channel.
    NoFreeChannel = 10,
    /// A slot index is outside `0..n_slots`.
    SlotOutOfRange = 11,
    /// `gsize % lsize != 0`.
    BadWorkSize = 12,
    /// The equivalent accelerator count for a kernel identity is zero.
    NoAccelerators = 13,
    /// `execute` was called while a delegate for this kernel is still running.
    AlreadyRunning = 14,
    /// The DMA provider never signalled completion within the deadline.
    DmaTimeout = 15,
    /// A POSIX shared-memory object could not be created, opened or mapped.
    ShmUnavailable = 16,
}

impl Error {
    /// The negative wire code written into a channel's response slot.
    pub fn wire_code(self) -> i32 {
        use num_traits::ToPrimitive;
        -self.to_i32().expect("Error always maps to its own discriminant")
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Error::HwUnavailable => "hardware control surface is not mapped",
            Error::DmaUnavailable => "DMA provider is unavailable",
            Error::ReconfigFailed => "partial bitstream reconfiguration failed",
            Error::NotFound => "kernel, port, slot or user not found",
            Error::DuplicateName => "name already registered",
            Error::DuplicatePort => "port already registered",
            Error::TooManyKernels => "no free kernel identity",
            Error::TooManyUsers => "no free user id",
            Error::NoFreeBank => "no free bank for port",
            Error::NoFreeChannel => "no free request/response channel",
            Error::SlotOutOfRange => "slot index out of range",
            Error::BadWorkSize => "global work size is not a multiple of local work size",
            Error::NoAccelerators => "equivalent accelerator count is zero",
            Error::AlreadyRunning => "a delegate is already running for this kernel",
            Error::DmaTimeout => "DMA transfer did not complete in time",
            Error::ShmUnavailable => "shared-memory object could not be created, opened or mapped",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::ToPrimitive;

    #[test]
    fn wire_code_is_negative_discriminant() {
        assert_eq!(Error::HwUnavailable.wire_code(), -1);
        assert_eq!(Error::DmaTimeout.wire_code(), -15);
    }

    #[test]
    fn every_variant_has_a_stable_discriminant() {
        assert_eq!(Error::NotFound.to_i32().unwrap(), 4);
        assert_eq!(Error::AlreadyRunning.to_i32().unwrap(), 14);
    }
}
