//! Packed little-endian request layouts (§6) exchanged between a daemon
//! client and the coordinator. Each function tag has its own fixed-field
//! layout; they all serialise by byte-copy into a channel's `args` buffer.

use crate::limits::SHM_NAME_LEN;
use crate::opcode::FunctionTag;

/// Size of the fixed `args` byte buffer carried by every channel. Large
/// enough for a name plus a handful of scalars, or a `Wcfg` register array
/// sized to the largest possible equivalent-accelerator count.
pub const ARGS_CAPACITY: usize = 512;

/// Maximum length (including the NUL terminator) of a kernel or port name
/// carried on the wire.
pub const NAME_CAPACITY: usize = 64;

/// The single-slot mailbox payload (§3 Request, §4.5.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Request {
    pub user_id: u32,
    pub channel_id: u32,
    pub func: u32,
    /// Only meaningful for `AddUser`: the client's shared-memory object name.
    pub shm: [u8; SHM_NAME_LEN],
}

impl Request {
    pub fn new(user_id: u32, channel_id: u32, func: FunctionTag) -> Self {
        Request { user_id, channel_id, func: func as u32, shm: [0u8; SHM_NAME_LEN] }
    }

    pub fn with_shm_name(mut self, name: &str) -> Self {
        let bytes = name.as_bytes();
        let n = bytes.len().min(SHM_NAME_LEN - 1);
        self.shm[..n].copy_from_slice(&bytes[..n]);
        self
    }

    pub fn shm_name(&self) -> &str {
        let end = self.shm.iter().position(|&b| b == 0).unwrap_or(self.shm.len());
        core::str::from_utf8(&self.shm[..end]).unwrap_or("")
    }
}

/// A tiny byte-buffer cursor used to pack/unpack the fixed argument layouts.
/// Mirrors the manual little-endian packing the teacher's `api.rs` modules
/// perform on raw IPC scalars, rather than pulling in a generic serializer:
/// the wire format here is dictated field-by-field by the spec.
struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn new(buf: &'a mut [u8]) -> Self { Writer { buf, pos: 0 } }

    fn write_u8(&mut self, v: u8) {
        self.buf[self.pos] = v;
        self.pos += 1;
    }
    fn write_u16(&mut self, v: u16) {
        self.buf[self.pos..self.pos + 2].copy_from_slice(&v.to_le_bytes());
        self.pos += 2;
    }
    fn write_u32(&mut self, v: u32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }
    fn write_u64(&mut self, v: u64) {
        self.buf[self.pos..self.pos + 8].copy_from_slice(&v.to_le_bytes());
        self.pos += 8;
    }
    fn write_cstr(&mut self, s: &str, cap: usize) {
        let bytes = s.as_bytes();
        let n = bytes.len().min(cap - 1);
        self.buf[self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
        for b in &mut self.buf[self.pos + n..self.pos + cap] {
            *b = 0;
        }
        self.pos += cap;
    }
    fn finish(self) -> usize { self.pos }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self { Reader { buf, pos: 0 } }

    fn read_u8(&mut self) -> u8 {
        let v = self.buf[self.pos];
        self.pos += 1;
        v
    }
    fn read_u16(&mut self) -> u16 {
        let v = u16::from_le_bytes(self.buf[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        v
    }
    fn read_u32(&mut self) -> u32 {
        let v = u32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        v
    }
    fn read_u64(&mut self) -> u64 {
        let v = u64::from_le_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        v
    }
    fn read_cstr(&mut self, cap: usize) -> String {
        let raw = &self.buf[self.pos..self.pos + cap];
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let s = String::from_utf8_lossy(&raw[..end]).into_owned();
        self.pos += cap;
        s
    }
}

/// `KernelCreate`: name C-string; size_t membytes; size_t membanks; size_t regs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelCreateArgs {
    pub name: String,
    pub mem_bytes: u64,
    pub mem_banks: u64,
    pub regs: u64,
}

impl KernelCreateArgs {
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(buf);
        w.write_cstr(&self.name, NAME_CAPACITY);
        w.write_u64(self.mem_bytes);
        w.write_u64(self.mem_banks);
        w.write_u64(self.regs);
        w.finish()
    }
    pub fn decode(buf: &[u8]) -> Self {
        let mut r = Reader::new(buf);
        let name = r.read_cstr(NAME_CAPACITY);
        let mem_bytes = r.read_u64();
        let mem_banks = r.read_u64();
        let regs = r.read_u64();
        KernelCreateArgs { name, mem_bytes, mem_banks, regs }
    }
}

/// A bare kernel-name argument, shared by `KernelRelease`, `KernelWait`,
/// `KernelReset` and `GetNaccs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameArgs {
    pub name: String,
}

impl NameArgs {
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(buf);
        w.write_cstr(&self.name, NAME_CAPACITY);
        w.finish()
    }
    pub fn decode(buf: &[u8]) -> Self {
        let mut r = Reader::new(buf);
        NameArgs { name: r.read_cstr(NAME_CAPACITY) }
    }
}

/// `KernelExecute`: name; size_t gsize; size_t lsize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelExecuteArgs {
    pub name: String,
    pub gsize: u64,
    pub lsize: u64,
}

impl KernelExecuteArgs {
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(buf);
        w.write_cstr(&self.name, NAME_CAPACITY);
        w.write_u64(self.gsize);
        w.write_u64(self.lsize);
        w.finish()
    }
    pub fn decode(buf: &[u8]) -> Self {
        let mut r = Reader::new(buf);
        let name = r.read_cstr(NAME_CAPACITY);
        let gsize = r.read_u64();
        let lsize = r.read_u64();
        KernelExecuteArgs { name, gsize, lsize }
    }
}

/// `Alloc`: size_t size; kname; pname; u32 direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocArgs {
    pub size: u64,
    pub kernel_name: String,
    pub port_name: String,
    pub direction: u32,
}

impl AllocArgs {
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(buf);
        w.write_u64(self.size);
        w.write_cstr(&self.kernel_name, NAME_CAPACITY);
        w.write_cstr(&self.port_name, NAME_CAPACITY);
        w.write_u32(self.direction);
        w.finish()
    }
    pub fn decode(buf: &[u8]) -> Self {
        let mut r = Reader::new(buf);
        let size = r.read_u64();
        let kernel_name = r.read_cstr(NAME_CAPACITY);
        let port_name = r.read_cstr(NAME_CAPACITY);
        let direction = r.read_u32();
        AllocArgs { size, kernel_name, port_name, direction }
    }
}

/// `Free`: kname; pname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeArgs {
    pub kernel_name: String,
    pub port_name: String,
}

impl FreeArgs {
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(buf);
        w.write_cstr(&self.kernel_name, NAME_CAPACITY);
        w.write_cstr(&self.port_name, NAME_CAPACITY);
        w.finish()
    }
    pub fn decode(buf: &[u8]) -> Self {
        let mut r = Reader::new(buf);
        let kernel_name = r.read_cstr(NAME_CAPACITY);
        let port_name = r.read_cstr(NAME_CAPACITY);
        FreeArgs { kernel_name, port_name }
    }
}

/// `Load`: name; u8 slot; u8 tmr; u8 dmr; u8 force.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadArgs {
    pub name: String,
    pub slot: u8,
    pub tmr: u8,
    pub dmr: u8,
    pub force: bool,
}

impl LoadArgs {
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(buf);
        w.write_cstr(&self.name, NAME_CAPACITY);
        w.write_u8(self.slot);
        w.write_u8(self.tmr);
        w.write_u8(self.dmr);
        w.write_u8(self.force as u8);
        w.finish()
    }
    pub fn decode(buf: &[u8]) -> Self {
        let mut r = Reader::new(buf);
        let name = r.read_cstr(NAME_CAPACITY);
        let slot = r.read_u8();
        let tmr = r.read_u8();
        let dmr = r.read_u8();
        let force = r.read_u8() != 0;
        LoadArgs { name, slot, tmr, dmr, force }
    }
}

/// `Unload`: u8 slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnloadArgs {
    pub slot: u8,
}

impl UnloadArgs {
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(buf);
        w.write_u8(self.slot);
        w.finish()
    }
    pub fn decode(buf: &[u8]) -> Self {
        let mut r = Reader::new(buf);
        UnloadArgs { slot: r.read_u8() }
    }
}

/// `Wcfg`: name; u16 offset; followed by `naccs * u32` configuration words.
/// `Rcfg` shares the leading `name`/`offset` fields (see [`RcfgArgs`]) but
/// carries no trailing words; the equivalent accelerator count instead
/// bounds how many words the daemon reads back out of the channel response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WcfgArgs {
    pub name: String,
    pub offset: u16,
    pub words: Vec<u32>,
}

impl WcfgArgs {
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(buf);
        w.write_cstr(&self.name, NAME_CAPACITY);
        w.write_u16(self.offset);
        for word in &self.words {
            w.write_u32(*word);
        }
        w.finish()
    }
    pub fn decode(buf: &[u8], naccs: usize) -> Self {
        let mut r = Reader::new(buf);
        let name = r.read_cstr(NAME_CAPACITY);
        let offset = r.read_u16();
        let words = (0..naccs).map(|_| r.read_u32()).collect();
        WcfgArgs { name, offset, words }
    }
}

/// `Rcfg`: name; u16 offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcfgArgs {
    pub name: String,
    pub offset: u16,
}

impl RcfgArgs {
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        let mut w = Writer::new(buf);
        w.write_cstr(&self.name, NAME_CAPACITY);
        w.write_u16(self.offset);
        w.finish()
    }
    pub fn decode(buf: &[u8]) -> Self {
        let mut r = Reader::new(buf);
        let name = r.read_cstr(NAME_CAPACITY);
        let offset = r.read_u16();
        RcfgArgs { name, offset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_create_round_trips() {
        let args = KernelCreateArgs {
            name: "addvector".to_string(),
            mem_bytes: 16384,
            mem_banks: 3,
            regs: 0,
        };
        let mut buf = [0u8; ARGS_CAPACITY];
        let n = args.encode(&mut buf);
        assert!(n <= ARGS_CAPACITY);
        assert_eq!(KernelCreateArgs::decode(&buf), args);
    }

    #[test]
    fn wcfg_round_trips_with_trailing_words() {
        let args = WcfgArgs { name: "k".to_string(), offset: 4, words: vec![1, 2, 3, 4] };
        let mut buf = [0u8; ARGS_CAPACITY];
        args.encode(&mut buf);
        assert_eq!(WcfgArgs::decode(&buf, 4), args);
    }

    #[test]
    fn request_shm_name_round_trips() {
        let req = Request::new(3, 1, FunctionTag::AddUser).with_shm_name("user_0000003");
        assert_eq!(req.shm_name(), "user_0000003");
    }

    #[test]
    fn long_names_are_truncated_not_overrun() {
        let long = "x".repeat(NAME_CAPACITY + 16);
        let args = NameArgs { name: long.clone() };
        let mut buf = [0u8; ARGS_CAPACITY];
        args.encode(&mut buf);
        let decoded = NameArgs::decode(&buf);
        assert_eq!(decoded.name.len(), NAME_CAPACITY - 1);
    }
}
