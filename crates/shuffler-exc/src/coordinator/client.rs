//! The client side of the coordinator (§3, §4.5.4): registers a user,
//! acquires a channel per outstanding request, and blocks for the
//! response. Talks to the in-process [`Daemon`] directly; the
//! out-of-process build instead goes through [`super::shm`]'s POSIX
//! transport, which exposes the same request/response shape.

use std::sync::Arc;

use shuffler_api::wire::{
    AllocArgs, FreeArgs, KernelCreateArgs, KernelExecuteArgs, LoadArgs, NameArgs, RcfgArgs, Request, UnloadArgs, WcfgArgs, ARGS_CAPACITY,
};
use shuffler_api::{Direction, Error, FunctionTag};

use crate::coordinator::daemon::Daemon;

/// A registered daemon user, talking to its `Daemon` in-process.
pub struct Client {
    daemon: Arc<Daemon>,
    user_id: u32,
}

impl Client {
    /// Registers a new user named `shm_name`, returning the `Client` handle
    /// to issue further requests with.
    pub fn connect(daemon: Arc<Daemon>, shm_name: &str) -> Result<Self, Error> {
        let request = Request::new(0, 0, FunctionTag::AddUser).with_shm_name(shm_name);
        let reply = daemon.mailbox.request_control(request);
        if reply.status < 0 {
            return Err(decode_error(reply.status));
        }
        // The status word carries MAX_KERNELS, not the assigned id (§4.5.4);
        // the id travels alongside it in the control reply instead.
        Ok(Client { daemon, user_id: reply.user_id })
    }

    pub fn disconnect(&self) {
        let request = Request::new(self.user_id, 0, FunctionTag::RemoveUser);
        self.daemon.mailbox.publish(request);
    }

    fn call(&self, func: FunctionTag, args: &[u8]) -> Result<[u8; ARGS_CAPACITY], Error> {
        let channel_id = self.daemon.acquire_channel(self.user_id)?;
        self.daemon.write_args(self.user_id, channel_id, args)?;
        self.daemon.mailbox.publish(Request::new(self.user_id, channel_id as u32, func));
        let response = self.daemon.wait_response(self.user_id, channel_id);
        self.daemon.release_channel(self.user_id, channel_id);
        response
    }

    fn call_status(&self, func: FunctionTag, args: &[u8]) -> Result<i32, Error> {
        let response = self.call(func, args)?;
        let status = i32::from_le_bytes(response[0..4].try_into().unwrap());
        if status < 0 {
            Err(decode_error(status))
        } else {
            Ok(status)
        }
    }

    pub fn kernel_create(&self, name: &str, mem_bytes: u64, mem_banks: u64, regs: u64) -> Result<(), Error> {
        let mut buf = [0u8; ARGS_CAPACITY];
        KernelCreateArgs { name: name.to_string(), mem_bytes, mem_banks, regs }.encode(&mut buf);
        self.call_status(FunctionTag::KernelCreate, &buf).map(|_| ())
    }

    pub fn kernel_release(&self, name: &str) -> Result<(), Error> {
        let mut buf = [0u8; ARGS_CAPACITY];
        NameArgs { name: name.to_string() }.encode(&mut buf);
        self.call_status(FunctionTag::KernelRelease, &buf).map(|_| ())
    }

    pub fn load(&self, name: &str, slot: u8, tmr: u8, dmr: u8, force: bool) -> Result<(), Error> {
        let mut buf = [0u8; ARGS_CAPACITY];
        LoadArgs { name: name.to_string(), slot, tmr, dmr, force }.encode(&mut buf);
        self.call_status(FunctionTag::Load, &buf).map(|_| ())
    }

    pub fn unload(&self, slot: u8) -> Result<(), Error> {
        let mut buf = [0u8; ARGS_CAPACITY];
        UnloadArgs { slot }.encode(&mut buf);
        self.call_status(FunctionTag::Unload, &buf).map(|_| ())
    }

    pub fn alloc(&self, kernel_name: &str, port_name: &str, size: u64, direction: Direction) -> Result<(), Error> {
        let mut buf = [0u8; ARGS_CAPACITY];
        AllocArgs { size, kernel_name: kernel_name.to_string(), port_name: port_name.to_string(), direction: direction as u32 }.encode(&mut buf);
        self.call_status(FunctionTag::Alloc, &buf).map(|_| ())
    }

    pub fn free(&self, kernel_name: &str, port_name: &str) -> Result<(), Error> {
        let mut buf = [0u8; ARGS_CAPACITY];
        FreeArgs { kernel_name: kernel_name.to_string(), port_name: port_name.to_string() }.encode(&mut buf);
        self.call_status(FunctionTag::Free, &buf).map(|_| ())
    }

    pub fn kernel_execute(&self, name: &str, gsize: u64, lsize: u64) -> Result<(), Error> {
        let mut buf = [0u8; ARGS_CAPACITY];
        KernelExecuteArgs { name: name.to_string(), gsize, lsize }.encode(&mut buf);
        self.call_status(FunctionTag::KernelExecute, &buf).map(|_| ())
    }

    pub fn kernel_wait(&self, name: &str) -> Result<(), Error> {
        let mut buf = [0u8; ARGS_CAPACITY];
        NameArgs { name: name.to_string() }.encode(&mut buf);
        self.call_status(FunctionTag::KernelWait, &buf).map(|_| ())
    }

    pub fn get_naccs(&self, name: &str) -> Result<u32, Error> {
        let mut buf = [0u8; ARGS_CAPACITY];
        NameArgs { name: name.to_string() }.encode(&mut buf);
        self.call_status(FunctionTag::GetNaccs, &buf).map(|n| n as u32)
    }

    pub fn wcfg(&self, name: &str, offset: u16, words: &[u32]) -> Result<(), Error> {
        let mut buf = [0u8; ARGS_CAPACITY];
        WcfgArgs { name: name.to_string(), offset, words: words.to_vec() }.encode(&mut buf);
        self.call_status(FunctionTag::KernelWcfg, &buf).map(|_| ())
    }

    pub fn rcfg(&self, name: &str, offset: u16, naccs: usize) -> Result<Vec<u32>, Error> {
        let mut buf = [0u8; ARGS_CAPACITY];
        RcfgArgs { name: name.to_string(), offset }.encode(&mut buf);
        let response = self.call(FunctionTag::KernelRcfg, &buf)?;
        let status = i32::from_le_bytes(response[0..4].try_into().unwrap());
        if status < 0 {
            return Err(decode_error(status));
        }
        let words = (0..naccs)
            .map(|i| {
                let start = 4 + i * 4;
                u32::from_le_bytes(response[start..start + 4].try_into().unwrap())
            })
            .collect();
        Ok(words)
    }
}

fn decode_error(status: i32) -> Error {
    num_traits::FromPrimitive::from_i32(-status).unwrap_or(Error::NotFound)
}
