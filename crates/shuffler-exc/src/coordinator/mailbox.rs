//! The single-slot request mailbox (§3 Coordinator, §4.5.4): clients
//! publish at most one pending request at a time; the daemon's receiver
//! thread drains it and signals the client back through its own channel.
//!
//! This is the in-process transport, backed by `std::sync::{Mutex,
//! Condvar}` — used by an in-process embedder (see [`crate::coordinator::Client`])
//! and by every test in this workspace. [`crate::coordinator::shm`] provides
//! the POSIX shared-memory transport [`crate::coordinator::Daemon::run_shm`]
//! drives for the out-of-process daemon binary; both satisfy the same
//! request/response shape.

use std::sync::{Condvar, Mutex};

use shuffler_api::wire::Request;

struct Slot {
    request_available: bool,
    request: Option<Request>,
    terminate: bool,
}

/// The daemon's reply to an `AddUser` request: `status` is the wire status
/// word (`MAX_KERNELS` on success, a negative `Error` wire code on
/// failure, per §4.5.4), kept separate from `user_id` — the slot the
/// daemon assigned this connection — since the status word communicates
/// the catalogue size, not the id.
pub struct ControlReply {
    pub status: i32,
    pub user_id: u32,
}

/// Holds the reply to an `AddUser` (or other pre-channel) request: the
/// requester has no user id yet, so it cannot own a [`crate::coordinator::user::Channel`]
/// to wait on — the daemon hands the reply back through here instead.
struct ControlSlot {
    reply: Option<ControlReply>,
}

/// The coordinator's mailbox: mutex + condvar, a request-available flag,
/// and the latest request (§3 Coordinator).
pub struct Mailbox {
    slot: Mutex<Slot>,
    cond_request: Condvar,
    cond_free: Condvar,
    control: Mutex<ControlSlot>,
    cond_control: Condvar,
}

impl Default for Mailbox {
    fn default() -> Self { Self::new() }
}

impl Mailbox {
    pub fn new() -> Self {
        Mailbox {
            slot: Mutex::new(Slot { request_available: false, request: None, terminate: false }),
            cond_request: Condvar::new(),
            cond_free: Condvar::new(),
            control: Mutex::new(ControlSlot { reply: None }),
            cond_control: Condvar::new(),
        }
    }

    /// Client side for `AddUser`: publishes `request`, then blocks until the
    /// daemon calls [`Mailbox::fulfill_control`] with the wire status (§4.5.4:
    /// `MAX_KERNELS` on success) and the assigned user id.
    pub fn request_control(&self, request: Request) -> ControlReply {
        self.publish(request);
        let mut control = self.control.lock().unwrap();
        loop {
            if let Some(reply) = control.reply.take() {
                return reply;
            }
            control = self.cond_control.wait(control).unwrap();
        }
    }

    /// Daemon side: answers the single outstanding [`Mailbox::request_control`]
    /// call.
    pub fn fulfill_control(&self, status: i32, user_id: u32) {
        let mut control = self.control.lock().unwrap();
        control.reply = Some(ControlReply { status, user_id });
        self.cond_control.notify_all();
    }

    /// Client side: blocks until the mailbox is free, then publishes
    /// `request` and wakes the receiver.
    pub fn publish(&self, request: Request) {
        let mut slot = self.slot.lock().unwrap();
        while slot.request_available {
            slot = self.cond_free.wait(slot).unwrap();
        }
        slot.request = Some(request);
        slot.request_available = true;
        self.cond_request.notify_one();
    }

    /// Daemon side: blocks until a request is available or termination is
    /// requested, then takes ownership of it and broadcasts `cond_free` so
    /// the next client may enqueue.
    pub fn take(&self) -> Option<Request> {
        let mut slot = self.slot.lock().unwrap();
        while !slot.request_available && !slot.terminate {
            slot = self.cond_request.wait(slot).unwrap();
        }
        if slot.terminate && !slot.request_available {
            return None;
        }
        let request = slot.request.take();
        slot.request_available = false;
        self.cond_free.notify_all();
        request
    }

    /// A SIGINT/SIGTERM handler (or test harness) calls this to unblock a
    /// receiver parked in `take`.
    pub fn request_termination(&self) {
        let mut slot = self.slot.lock().unwrap();
        slot.terminate = true;
        self.cond_request.notify_all();
    }

    pub fn is_terminating(&self) -> bool { self.slot.lock().unwrap().terminate }
}
