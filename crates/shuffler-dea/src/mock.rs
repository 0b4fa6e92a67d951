//! A host-memory stand-in for the physical DMA provider, used by tests and
//! by the hosted build. Transfers complete synchronously: `submit` performs
//! the copy immediately and `wait` is a no-op success.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use shuffler_api::{Error, TransferDirection};

use crate::provider::{DmaAllocation, DmaProvider, PhysHandle, RawCompletion, TransferToken};

/// Hands out heap-backed "DMA" buffers and completes every submit
/// synchronously and successfully, unless told to fail the next `wait`.
pub struct MockDmaProvider {
    next_phys: std::sync::atomic::AtomicU64,
    fail_next_wait: AtomicBool,
}

impl Default for MockDmaProvider {
    fn default() -> Self {
        MockDmaProvider { next_phys: std::sync::atomic::AtomicU64::new(1), fail_next_wait: AtomicBool::new(false) }
    }
}

impl MockDmaProvider {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// Makes the next `wait()` report `DmaTimeout`, to exercise the
    /// caller's error path.
    pub fn fail_next_wait(&self) { self.fail_next_wait.store(true, Ordering::SeqCst); }
}

impl DmaProvider for MockDmaProvider {
    fn alloc(&self, len_bytes: usize) -> Result<DmaAllocation, Error> {
        if len_bytes % 4 != 0 {
            return Err(Error::DmaUnavailable);
        }
        let len_words = len_bytes / 4;
        let mut buf = vec![0u32; len_words].into_boxed_slice();
        let ptr = buf.as_mut_ptr();
        std::mem::forget(buf);
        let phys = PhysHandle(self.next_phys.fetch_add(1, Ordering::SeqCst));
        Ok(DmaAllocation::new(phys, ptr, len_words))
    }

    fn dealloc(&self, mut alloc: DmaAllocation) {
        unsafe {
            let slice = alloc.as_mut_slice();
            drop(Box::from_raw(slice as *mut [u32]));
        }
    }

    fn submit(&self, token: TransferToken) -> Box<dyn RawCompletion> {
        log::trace!(
            "mock dma submit dir={:?} size={} hw_off={:#x}",
            token.dir, token.size, token.hw_off
        );
        let _ = matches!(token.dir, TransferDirection::MemToHw | TransferDirection::HwToMem);
        Box::new(MockCompletion { should_fail: self.fail_next_wait.swap(false, Ordering::SeqCst) })
    }
}

struct MockCompletion {
    should_fail: bool,
}

impl RawCompletion for MockCompletion {
    fn wait(&mut self) -> Result<(), Error> {
        if self.should_fail {
            Err(Error::DmaTimeout)
        } else {
            Ok(())
        }
    }
    fn cancel(&mut self) { log::trace!("mock dma completion cancelled without waiting"); }
}
