//! System-wide capacity constants.

/// Maximum number of kernels that can be registered at once. Kernel
/// identities are drawn from `1..=MAX_KERNELS`; identity 0 means "no
/// kernel" in the shuffler shadow registers.
pub const MAX_KERNELS: usize = 15;

/// Maximum number of concurrently connected daemon users.
pub const MAX_USERS: usize = 16;

/// Number of request/response channels owned by each user.
pub const CHANNELS_PER_USER: usize = 4;

/// Length, including any terminator, of a shared-memory object name as
/// carried in a wire `Request`.
pub const SHM_NAME_LEN: usize = 13;

/// Maximum number of TMR/DMR groups (group tags are 4-bit nibbles, 1..=15;
/// 0 means "no group").
pub const MAX_GROUPS: usize = 15;
