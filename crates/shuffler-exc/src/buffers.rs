//! The user-visible backing storage for a kernel's ports. A real deployment
//! backs these with the shared-memory segment the daemon's client mapped;
//! the in-process runtime and every test here use plain heap buffers.

use std::collections::HashMap;

#[derive(Default)]
pub struct PortBuffers {
    buffers: HashMap<String, Vec<u32>>,
}

impl PortBuffers {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, name: impl Into<String>, words: Vec<u32>) { self.buffers.insert(name.into(), words); }

    pub fn get(&self, name: &str) -> &[u32] {
        self.buffers.get(name).unwrap_or_else(|| panic!("no backing buffer registered for port {name}"))
    }

    pub fn get_mut(&mut self, name: &str) -> &mut [u32] {
        self.buffers.get_mut(name).unwrap_or_else(|| panic!("no backing buffer registered for port {name}"))
    }
}
