//! The response a daemon worker writes back into a channel's `args` buffer:
//! a leading status word (a non-negative success value, or the negative
//! `Error` wire code per §7) followed by any trailing payload words.

use shuffler_api::Error;

pub struct Response {
    pub status: i32,
    pub payload: Vec<u32>,
}

impl Response {
    pub fn ok() -> Self { Response { status: 0, payload: Vec::new() } }

    pub fn value(status: i32) -> Self { Response { status, payload: Vec::new() } }

    pub fn words(words: Vec<u32>) -> Self { Response { status: 0, payload: words } }

    pub fn err(e: Error) -> Self { Response { status: e.wire_code(), payload: Vec::new() } }

    pub fn encode(&self, buf: &mut [u8; shuffler_api::wire::ARGS_CAPACITY]) {
        buf[0..4].copy_from_slice(&self.status.to_le_bytes());
        let mut pos = 4;
        for word in &self.payload {
            buf[pos..pos + 4].copy_from_slice(&word.to_le_bytes());
            pos += 4;
        }
    }

    pub fn is_error(&self) -> bool { self.status < 0 }
}
