//! The coordinator's closed function-tag enumeration (§4.5.4, §6).

use num_derive::{FromPrimitive, ToPrimitive};

/// One entry per request a daemon client can issue. The discriminant is
/// carried on the wire inside `Request::func`, so it must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum FunctionTag {
    AddUser = 0,
    RemoveUser = 1,
    Load = 2,
    Unload = 3,
    KernelCreate = 4,
    KernelRelease = 5,
    KernelExecute = 6,
    KernelWait = 7,
    KernelReset = 8,
    KernelWcfg = 9,
    KernelRcfg = 10,
    Alloc = 11,
    Free = 12,
    GetNaccs = 13,
}
