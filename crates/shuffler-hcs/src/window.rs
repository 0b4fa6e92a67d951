//! The MMIO mapper collaborator (out of scope per §1) abstracted behind a
//! trait, so that HCS itself never calls into a particular host's mmap API.
//! A real deployment plugs in a window backed by `libc::mmap` over
//! `/dev/mem` or a UIO device; tests and the hosted build use
//! [`MockRegisterWindow`].

use std::ffi::CString;
use std::sync::atomic::{AtomicU32, Ordering};

use shuffler_api::Error;

/// A fixed-size, word-addressable register window. Reads and writes are
/// single 32-bit, atomic, and must not be reordered with respect to each
/// other (the shuffler's control block has side effects on every access).
pub trait RegisterWindow: Send + Sync {
    /// Atomically read the 32-bit word at `byte_offset`.
    fn read32(&self, byte_offset: usize) -> u32;
    /// Atomically write `value` to the 32-bit word at `byte_offset`.
    fn write32(&self, byte_offset: usize, value: u32);
}

/// A plain in-memory register window backed by a vector of atomics, used by
/// the hosted build and by every test in this workspace. Large enough to
/// hold the fixed register block plus a per-accelerator configuration
/// address space addressed by [`crate::regs::encode_reg_address`].
pub struct MockRegisterWindow {
    words: Vec<AtomicU32>,
}

impl MockRegisterWindow {
    /// `len_bytes` must be a multiple of 4.
    pub fn new(len_bytes: usize) -> Self {
        assert_eq!(len_bytes % 4, 0, "register window length must be word-aligned");
        let words = (0..len_bytes / 4).map(|_| AtomicU32::new(0)).collect();
        MockRegisterWindow { words }
    }

    /// Directly set a word, bypassing any side effects a real accessor might
    /// model. Used by tests to simulate firmware-driven state (e.g. the
    /// ready register ticking over, or PMC counters advancing).
    pub fn poke(&self, byte_offset: usize, value: u32) { self.write32(byte_offset, value); }
}

impl RegisterWindow for MockRegisterWindow {
    fn read32(&self, byte_offset: usize) -> u32 {
        self.words[byte_offset / 4].load(Ordering::SeqCst)
    }
    fn write32(&self, byte_offset: usize, value: u32) {
        self.words[byte_offset / 4].store(value, Ordering::SeqCst);
    }
}

/// A register window backed by `libc::mmap` over a device file — the
/// register/data aperture device path configured on `shuffler-daemon`
/// (§4.8). Every access goes through a volatile atomic read/write at
/// `base + byte_offset`, exactly as a real MMIO window requires.
pub struct MmapRegisterWindow {
    base: *mut u8,
    len: usize,
}

unsafe impl Send for MmapRegisterWindow {}
unsafe impl Sync for MmapRegisterWindow {}

impl MmapRegisterWindow {
    /// Opens `path` and maps `len_bytes` starting at its beginning. Fails
    /// `HwUnavailable` if the device cannot be opened or mapped (e.g. no
    /// such device on this host, or insufficient permission).
    pub fn open(path: &str, len_bytes: usize) -> Result<Self, Error> {
        let cpath = CString::new(path).map_err(|_| Error::HwUnavailable)?;
        unsafe {
            let fd = libc::open(cpath.as_ptr(), libc::O_RDWR | libc::O_SYNC);
            if fd < 0 {
                return Err(Error::HwUnavailable);
            }
            let base = libc::mmap(std::ptr::null_mut(), len_bytes, libc::PROT_READ | libc::PROT_WRITE, libc::MAP_SHARED, fd, 0);
            libc::close(fd);
            if base == libc::MAP_FAILED {
                return Err(Error::HwUnavailable);
            }
            Ok(MmapRegisterWindow { base: base as *mut u8, len: len_bytes })
        }
    }
}

impl Drop for MmapRegisterWindow {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base as *mut libc::c_void, self.len);
        }
    }
}

impl RegisterWindow for MmapRegisterWindow {
    fn read32(&self, byte_offset: usize) -> u32 {
        assert!(byte_offset + 4 <= self.len, "register offset out of bounds");
        unsafe {
            let ptr = self.base.add(byte_offset) as *const AtomicU32;
            (*ptr).load(Ordering::SeqCst)
        }
    }
    fn write32(&self, byte_offset: usize, value: u32) {
        assert!(byte_offset + 4 <= self.len, "register offset out of bounds");
        unsafe {
            let ptr = self.base.add(byte_offset) as *const AtomicU32;
            (*ptr).store(value, Ordering::SeqCst);
        }
    }
}
