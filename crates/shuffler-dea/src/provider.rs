//! The physical-memory DMA provider collaborator (out of scope per §1):
//! `dma_alloc`, `dma_submit`, `dma_wait`. Abstracted behind [`DmaProvider`]
//! so DEA never depends on a particular DMA-engine driver.

use shuffler_api::{Error, TransferDirection};

/// An opaque physical-memory handle the DMA provider understands. Never
/// dereferenced by DEA itself — only threaded through to `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysHandle(pub u64);

/// One DMA-coherent, page-aligned allocation: a user-visible pointer plus
/// the physical handle the provider needs to route a transfer.
pub struct DmaAllocation {
    phys: PhysHandle,
    ptr: *mut u32,
    len_words: usize,
}

// The allocation is just a block of plain old data guarded by DEA's scoping
// discipline; only one owner ever touches it at a time.
unsafe impl Send for DmaAllocation {}

impl DmaAllocation {
    /// Constructs an allocation from a raw pointer handed back by a
    /// provider. `ptr` must be valid for `len_words` consecutive `u32`s for
    /// the lifetime of this allocation.
    pub fn new(phys: PhysHandle, ptr: *mut u32, len_words: usize) -> Self {
        DmaAllocation { phys, ptr, len_words }
    }

    pub fn phys(&self) -> PhysHandle { self.phys }
    pub fn len_words(&self) -> usize { self.len_words }

    /// # Safety
    /// The caller must not alias this with another live reference into the
    /// same allocation.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [u32] {
        std::slice::from_raw_parts_mut(self.ptr, self.len_words)
    }
}

/// One in-flight transfer descriptor, as handed to `dma_submit` (§4.2, §6).
#[derive(Debug, Clone, Copy)]
pub struct TransferToken {
    pub mem_phys: PhysHandle,
    pub mem_off: usize,
    pub hw_base: usize,
    pub hw_off: usize,
    pub size: usize,
    pub dir: TransferDirection,
}

/// The in-flight completion handle returned by [`DmaProvider::submit`].
/// `wait` blocks until the provider's completion callback or polled file
/// descriptor fires; `cancel` is invoked instead when the caller drops the
/// completion without waiting (§4.2, §5) — the transfer itself is not
/// rewound, only the caller's wait is abandoned.
pub trait RawCompletion: Send {
    fn wait(&mut self) -> Result<(), Error>;
    fn cancel(&mut self);
}

/// The DMA provider collaborator.
pub trait DmaProvider: Send + Sync {
    fn alloc(&self, len_bytes: usize) -> Result<DmaAllocation, Error>;
    fn dealloc(&self, alloc: DmaAllocation);
    fn submit(&self, token: TransferToken) -> Box<dyn RawCompletion>;
}
