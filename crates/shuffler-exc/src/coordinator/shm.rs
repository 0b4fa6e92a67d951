//! The POSIX shared-memory transport (§6 "Shared-memory coordinator"): a
//! `PTHREAD_PROCESS_SHARED` mutex/condvar pair inside an `shm_open` object
//! (named by `--shm-name`, `a3d` by default), plus one per-user object named
//! `user_%07d` holding that user's channels. Satisfies the same
//! request/response shape as [`super::mailbox::Mailbox`]; `shuffler-daemon`
//! drives [`Daemon::run_shm`](super::daemon::Daemon::run_shm) over this
//! transport so any process, not just another thread of this one, can
//! attach to the coordinator and exchange the packed requests of §6.

use std::ffi::CString;
use std::mem::MaybeUninit;
use std::ptr;

use shuffler_api::limits::{CHANNELS_PER_USER, SHM_NAME_LEN};
use shuffler_api::wire::ARGS_CAPACITY;
use shuffler_api::Error;

/// Formats a user's shared-memory object name: `user_%07d`, `SHM_NAME_LEN`
/// bytes including the NUL terminator (§6).
pub fn user_shm_name(user_id: u32) -> String {
    let name = format!("user_{user_id:07}");
    debug_assert_eq!(name.len() + 1, SHM_NAME_LEN);
    name
}

fn leading_slash(name: &str) -> String {
    if name.starts_with('/') { name.to_string() } else { format!("/{name}") }
}

/// One `shm_open`+`mmap`'d region. Unmapped and closed on drop; the backing
/// object itself is only unlinked by whichever side calls
/// [`ShmRegion::unlink`] (the creator, on clean shutdown).
struct ShmRegion {
    ptr: *mut libc::c_void,
    len: usize,
    name: CString,
}

unsafe impl Send for ShmRegion {}
unsafe impl Sync for ShmRegion {}

impl ShmRegion {
    /// Creates (or truncates) the object and maps `len` bytes.
    fn create(name: &str, len: usize) -> Result<Self, Error> {
        let cname = CString::new(name).map_err(|_| Error::ShmUnavailable)?;
        unsafe {
            let fd = libc::shm_open(cname.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600);
            if fd < 0 {
                return Err(Error::ShmUnavailable);
            }
            if libc::ftruncate(fd, len as libc::off_t) != 0 {
                libc::close(fd);
                return Err(Error::ShmUnavailable);
            }
            let region = Self::map(fd, len, cname)?;
            libc::close(fd);
            Ok(region)
        }
    }

    /// Attaches to an existing object, sized `len`.
    fn open(name: &str, len: usize) -> Result<Self, Error> {
        let cname = CString::new(name).map_err(|_| Error::ShmUnavailable)?;
        unsafe {
            let fd = libc::shm_open(cname.as_ptr(), libc::O_RDWR, 0o600);
            if fd < 0 {
                return Err(Error::ShmUnavailable);
            }
            let region = Self::map(fd, len, cname)?;
            libc::close(fd);
            Ok(region)
        }
    }

    unsafe fn map(fd: libc::c_int, len: usize, name: CString) -> Result<Self, Error> {
        let ptr = libc::mmap(ptr::null_mut(), len, libc::PROT_READ | libc::PROT_WRITE, libc::MAP_SHARED, fd, 0);
        if ptr == libc::MAP_FAILED {
            return Err(Error::ShmUnavailable);
        }
        Ok(ShmRegion { ptr, len, name })
    }

    fn unlink(&self) {
        unsafe {
            libc::shm_unlink(self.name.as_ptr());
        }
    }
}

impl Drop for ShmRegion {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr, self.len);
        }
    }
}

/// Initialises a process-shared mutex or condvar in place. `libc`'s raw
/// `pthread_mutex_t`/`pthread_cond_t` default-init to a process-private
/// object; `PTHREAD_PROCESS_SHARED` is required for cross-process use.
unsafe fn init_shared_mutex(m: *mut libc::pthread_mutex_t) {
    let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::uninit();
    libc::pthread_mutexattr_init(attr.as_mut_ptr());
    libc::pthread_mutexattr_setpshared(attr.as_mut_ptr(), libc::PTHREAD_PROCESS_SHARED);
    libc::pthread_mutex_init(m, attr.as_ptr());
    libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
}

unsafe fn init_shared_cond(c: *mut libc::pthread_cond_t) {
    let mut attr = MaybeUninit::<libc::pthread_condattr_t>::uninit();
    libc::pthread_condattr_init(attr.as_mut_ptr());
    libc::pthread_condattr_setpshared(attr.as_mut_ptr(), libc::PTHREAD_PROCESS_SHARED);
    libc::pthread_cond_init(c, attr.as_ptr());
    libc::pthread_condattr_destroy(attr.as_mut_ptr());
}

/// The layout mapped at the start of the coordinator's shared-memory object.
/// Mirrors [`super::mailbox::Mailbox`]'s fields but with raw `pthread`
/// primitives in place of `std::sync`, since the lock must be visible to
/// other processes. `cond_control`/`control_*` carry the `AddUser` reply
/// (§4.5.4: the caller has no channel yet to receive it through).
#[repr(C)]
struct RawMailbox {
    lock: libc::pthread_mutex_t,
    cond_request: libc::pthread_cond_t,
    cond_free: libc::pthread_cond_t,
    cond_control: libc::pthread_cond_t,
    request_available: u8,
    terminate: u8,
    control_available: u8,
    user_id: u32,
    channel_id: u32,
    func: u32,
    shm: [u8; SHM_NAME_LEN],
    control_status: i32,
    control_user_id: u32,
}

/// The coordinator's shared-memory mailbox, mapped by every client process
/// and by the daemon.
pub struct ShmMailbox {
    region: ShmRegion,
}

impl ShmMailbox {
    fn raw(&self) -> *mut RawMailbox { self.region.ptr as *mut RawMailbox }

    /// Creates the named object and initialises its process-shared
    /// primitives. Called once, by the daemon, at startup.
    pub fn create(name: &str) -> Result<Self, Error> {
        let region = ShmRegion::create(&leading_slash(name), std::mem::size_of::<RawMailbox>())?;
        unsafe {
            let raw = region.ptr as *mut RawMailbox;
            init_shared_mutex(ptr::addr_of_mut!((*raw).lock));
            init_shared_cond(ptr::addr_of_mut!((*raw).cond_request));
            init_shared_cond(ptr::addr_of_mut!((*raw).cond_free));
            init_shared_cond(ptr::addr_of_mut!((*raw).cond_control));
            (*raw).request_available = 0;
            (*raw).terminate = 0;
            (*raw).control_available = 0;
        }
        Ok(ShmMailbox { region })
    }

    /// Attaches to an object a daemon already created. Called by every
    /// client process.
    pub fn open(name: &str) -> Result<Self, Error> {
        let region = ShmRegion::open(&leading_slash(name), std::mem::size_of::<RawMailbox>())?;
        Ok(ShmMailbox { region })
    }

    /// Unlinks the backing object. Only the daemon should call this, after
    /// every client has disconnected.
    pub fn unlink(&self) { self.region.unlink(); }

    pub fn publish(&self, user_id: u32, channel_id: u32, func: u32, shm_name: &str) {
        unsafe {
            let raw = self.raw();
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*raw).lock));
            while (*raw).request_available != 0 {
                libc::pthread_cond_wait(ptr::addr_of_mut!((*raw).cond_free), ptr::addr_of_mut!((*raw).lock));
            }
            (*raw).user_id = user_id;
            (*raw).channel_id = channel_id;
            (*raw).func = func;
            (*raw).shm = [0u8; SHM_NAME_LEN];
            let bytes = shm_name.as_bytes();
            let n = bytes.len().min(SHM_NAME_LEN - 1);
            (*raw).shm[..n].copy_from_slice(&bytes[..n]);
            (*raw).request_available = 1;
            libc::pthread_cond_signal(ptr::addr_of_mut!((*raw).cond_request));
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*raw).lock));
        }
    }

    /// Blocks until a request is available or termination is requested,
    /// returning `(user_id, channel_id, func, shm_name)`.
    pub fn take(&self) -> Option<(u32, u32, u32, String)> {
        unsafe {
            let raw = self.raw();
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*raw).lock));
            while (*raw).request_available == 0 && (*raw).terminate == 0 {
                libc::pthread_cond_wait(ptr::addr_of_mut!((*raw).cond_request), ptr::addr_of_mut!((*raw).lock));
            }
            if (*raw).terminate != 0 && (*raw).request_available == 0 {
                libc::pthread_mutex_unlock(ptr::addr_of_mut!((*raw).lock));
                return None;
            }
            let user_id = (*raw).user_id;
            let channel_id = (*raw).channel_id;
            let func = (*raw).func;
            let end = (*raw).shm.iter().position(|&b| b == 0).unwrap_or(SHM_NAME_LEN);
            let shm_name = String::from_utf8_lossy(&(*raw).shm[..end]).into_owned();
            (*raw).request_available = 0;
            libc::pthread_cond_broadcast(ptr::addr_of_mut!((*raw).cond_free));
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*raw).lock));
            Some((user_id, channel_id, func, shm_name))
        }
    }

    pub fn request_termination(&self) {
        unsafe {
            let raw = self.raw();
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*raw).lock));
            (*raw).terminate = 1;
            libc::pthread_cond_broadcast(ptr::addr_of_mut!((*raw).cond_request));
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*raw).lock));
        }
    }

    /// Client side for `AddUser`: publishes the request, then blocks until
    /// [`ShmMailbox::fulfill_control`] answers with the wire status
    /// (`MAX_KERNELS` on success, per §4.5.4) and the assigned user id.
    pub fn request_control(&self, shm_name: &str, func: u32) -> (i32, u32) {
        self.publish(0, 0, func, shm_name);
        unsafe {
            let raw = self.raw();
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*raw).lock));
            while (*raw).control_available == 0 {
                libc::pthread_cond_wait(ptr::addr_of_mut!((*raw).cond_control), ptr::addr_of_mut!((*raw).lock));
            }
            let reply = ((*raw).control_status, (*raw).control_user_id);
            (*raw).control_available = 0;
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*raw).lock));
            reply
        }
    }

    /// Daemon side: answers the single outstanding [`ShmMailbox::request_control`]
    /// call.
    pub fn fulfill_control(&self, status: i32, user_id: u32) {
        unsafe {
            let raw = self.raw();
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*raw).lock));
            (*raw).control_status = status;
            (*raw).control_user_id = user_id;
            (*raw).control_available = 1;
            libc::pthread_cond_broadcast(ptr::addr_of_mut!((*raw).cond_control));
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*raw).lock));
        }
    }
}

unsafe impl Send for ShmMailbox {}
unsafe impl Sync for ShmMailbox {}

/// One request/response channel inside a user's shared-memory object.
#[repr(C)]
struct RawChannel {
    lock: libc::pthread_mutex_t,
    cond_response: libc::pthread_cond_t,
    free: u8,
    response_available: u8,
    args: [u8; ARGS_CAPACITY],
}

#[repr(C)]
struct RawUser {
    channels: [RawChannel; CHANNELS_PER_USER],
}

/// A user's shared-memory channel block, mapped by that user's client
/// process and by the daemon.
pub struct ShmUser {
    region: ShmRegion,
}

impl ShmUser {
    fn raw(&self) -> *mut RawUser { self.region.ptr as *mut RawUser }

    pub fn create(user_id: u32) -> Result<Self, Error> {
        let name = format!("/{}", user_shm_name(user_id));
        let region = ShmRegion::create(&name, std::mem::size_of::<RawUser>())?;
        unsafe {
            let raw = region.ptr as *mut RawUser;
            for i in 0..CHANNELS_PER_USER {
                let ch = ptr::addr_of_mut!((*raw).channels[i]);
                init_shared_mutex(ptr::addr_of_mut!((*ch).lock));
                init_shared_cond(ptr::addr_of_mut!((*ch).cond_response));
                (*ch).free = 1;
                (*ch).response_available = 0;
                (*ch).args = [0u8; ARGS_CAPACITY];
            }
        }
        Ok(ShmUser { region })
    }

    pub fn open(user_id: u32) -> Result<Self, Error> {
        let name = format!("/{}", user_shm_name(user_id));
        let region = ShmRegion::open(&name, std::mem::size_of::<RawUser>())?;
        Ok(ShmUser { region })
    }

    pub fn unlink(&self) { self.region.unlink(); }

    pub fn acquire_channel(&self) -> Option<usize> {
        unsafe {
            let raw = self.raw();
            for i in 0..CHANNELS_PER_USER {
                let ch = ptr::addr_of_mut!((*raw).channels[i]);
                libc::pthread_mutex_lock(ptr::addr_of_mut!((*ch).lock));
                let was_free = (*ch).free != 0;
                if was_free {
                    (*ch).free = 0;
                }
                libc::pthread_mutex_unlock(ptr::addr_of_mut!((*ch).lock));
                if was_free {
                    return Some(i);
                }
            }
            None
        }
    }

    pub fn release_channel(&self, idx: usize) {
        unsafe {
            let raw = self.raw();
            let ch = ptr::addr_of_mut!((*raw).channels[idx]);
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*ch).lock));
            (*ch).free = 1;
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*ch).lock));
        }
    }

    /// Reads out a channel's current `args` bytes (the daemon's dispatcher
    /// calls this instead of holding the channel lock across the operation
    /// it decodes them for).
    pub fn read_args(&self, idx: usize) -> [u8; ARGS_CAPACITY] {
        unsafe {
            let raw = self.raw();
            let ch = ptr::addr_of_mut!((*raw).channels[idx]);
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*ch).lock));
            let out = (*ch).args;
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*ch).lock));
            out
        }
    }

    pub fn write_args(&self, idx: usize, bytes: &[u8]) {
        unsafe {
            let raw = self.raw();
            let ch = ptr::addr_of_mut!((*raw).channels[idx]);
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*ch).lock));
            (*ch).args[..bytes.len()].copy_from_slice(bytes);
            (*ch).response_available = 0;
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*ch).lock));
        }
    }

    pub fn publish_response(&self, idx: usize, bytes: &[u8]) {
        unsafe {
            let raw = self.raw();
            let ch = ptr::addr_of_mut!((*raw).channels[idx]);
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*ch).lock));
            (*ch).args[..bytes.len()].copy_from_slice(bytes);
            (*ch).response_available = 1;
            libc::pthread_cond_broadcast(ptr::addr_of_mut!((*ch).cond_response));
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*ch).lock));
        }
    }

    pub fn wait_response(&self, idx: usize) -> [u8; ARGS_CAPACITY] {
        unsafe {
            let raw = self.raw();
            let ch = ptr::addr_of_mut!((*raw).channels[idx]);
            libc::pthread_mutex_lock(ptr::addr_of_mut!((*ch).lock));
            while (*ch).response_available == 0 {
                libc::pthread_cond_wait(ptr::addr_of_mut!((*ch).cond_response), ptr::addr_of_mut!((*ch).lock));
            }
            let out = (*ch).args;
            libc::pthread_mutex_unlock(ptr::addr_of_mut!((*ch).lock));
            out
        }
    }
}

unsafe impl Send for ShmUser {}
unsafe impl Sync for ShmUser {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_shm_name_fits_the_fixed_width() {
        assert_eq!(user_shm_name(3), "user_0000003");
        assert_eq!(user_shm_name(3).len() + 1, SHM_NAME_LEN);
    }

    #[test]
    fn mailbox_round_trips_across_a_single_process() {
        let name = format!("a3d-test-{}", std::process::id());
        let mailbox = ShmMailbox::create(&name).unwrap();
        mailbox.publish(7, 1, 4, "");
        let (user_id, channel_id, func, _) = mailbox.take().unwrap();
        assert_eq!((user_id, channel_id, func), (7, 1, 4));
        mailbox.unlink();
    }

    #[test]
    fn control_reply_round_trips_the_status_and_assigned_user_id() {
        let name = format!("a3d-control-test-{}", std::process::id());
        let mailbox = std::sync::Arc::new(ShmMailbox::create(&name).unwrap());
        let daemon_side = mailbox.clone();
        let handle = std::thread::spawn(move || {
            let (_, _, _, shm_name) = daemon_side.take().unwrap();
            assert_eq!(shm_name, "user_0000042");
            daemon_side.fulfill_control(15, 3);
        });
        let (status, user_id) = mailbox.request_control("user_0000042", 0);
        assert_eq!((status, user_id), (15, 3));
        handle.join().unwrap();
        mailbox.unlink();
    }
}
