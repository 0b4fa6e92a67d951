//! A daemon-side user: a numeric id, the shared-memory name it registered
//! with, and its fixed array of request/response channels (§3 User,
//! Channel).

use std::sync::{Condvar, Mutex};

use shuffler_api::limits::CHANNELS_PER_USER;

/// One request/response slot. `args` carries the packed wire payload in
/// both directions — the response overwrites it in place.
pub struct Channel {
    pub free: Mutex<bool>,
    pub args: Mutex<[u8; shuffler_api::wire::ARGS_CAPACITY]>,
    pub response_available: Mutex<bool>,
    pub cond_response: Condvar,
}

impl Default for Channel {
    fn default() -> Self {
        Channel {
            free: Mutex::new(true),
            args: Mutex::new([0u8; shuffler_api::wire::ARGS_CAPACITY]),
            response_available: Mutex::new(false),
            cond_response: Condvar::new(),
        }
    }
}

pub struct User {
    pub id: u32,
    pub shm_name: String,
    pub channels: Vec<Channel>,
}

impl User {
    pub fn new(id: u32, shm_name: impl Into<String>) -> Self {
        User { id, shm_name: shm_name.into(), channels: (0..CHANNELS_PER_USER).map(|_| Channel::default()).collect() }
    }

    /// Acquires the first free channel, marking it taken. `None` when every
    /// channel is in flight (`NoFreeChannel`, §7).
    pub fn acquire_channel(&self) -> Option<usize> {
        for (i, ch) in self.channels.iter().enumerate() {
            let mut free = ch.free.lock().unwrap();
            if *free {
                *free = false;
                return Some(i);
            }
        }
        None
    }

    pub fn release_channel(&self, idx: usize) { *self.channels[idx].free.lock().unwrap() = true; }
}
