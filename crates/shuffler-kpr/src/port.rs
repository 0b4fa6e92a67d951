//! A single typed I/O port owned by a kernel (§3, §4.3).

use shuffler_api::Direction;

/// One bank-resident port. `bank` is the index this port was assigned when
/// it was inserted; it does not change on subsequent inserts/removals of
/// other ports in the same list (only the list's iteration order, which is
/// name-sorted, changes).
#[derive(Clone, Debug)]
pub struct Port {
    pub name: String,
    pub size_bytes: usize,
    pub direction: Direction,
    pub bank: usize,
}

impl Port {
    pub fn new(name: impl Into<String>, size_bytes: usize, direction: Direction, bank: usize) -> Self {
        Port { name: name.into(), size_bytes, direction, bank }
    }
}

/// One of the four ordered port lists a kernel owns (§3's C/I/O/IO lists).
/// Insertion always re-sorts the whole list by name ascending — callers rely
/// on this for a deterministic bank layout, so the sort must be stable even
/// though name collisions are rejected before insertion ever happens.
#[derive(Clone, Debug, Default)]
pub struct PortList {
    ports: Vec<Port>,
}

impl PortList {
    pub fn len(&self) -> usize { self.ports.len() }
    pub fn is_empty(&self) -> bool { self.ports.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, Port> { self.ports.iter() }
    pub fn contains_name(&self, name: &str) -> bool { self.ports.iter().any(|p| p.name == name) }

    pub fn get(&self, name: &str) -> Option<&Port> { self.ports.iter().find(|p| p.name == name) }

    /// Inserts `port` and restores name-ascending order. The incoming bank
    /// index is assigned by the caller (the registry), not here.
    pub fn insert_sorted(&mut self, port: Port) {
        self.ports.push(port);
        self.ports.sort_by(|a, b| a.name.cmp(&b.name));
    }

    /// Removes the port named `name`, if present, returning it.
    pub fn remove(&mut self, name: &str) -> Option<Port> {
        let idx = self.ports.iter().position(|p| p.name == name)?;
        Some(self.ports.remove(idx))
    }
}
