//! The kernel entity: identity, rounded memory geometry, and the four
//! ordered port lists (§3, §4.3).

use shuffler_api::Direction;

use crate::port::{Port, PortList};

/// Rounds `mem_bytes` up so every one of `banks` banks holds an integral
/// number of 32-bit words: `banks * ceil((mem_bytes/banks)/4) * 4`.
pub fn round_mem_bytes(mem_bytes: usize, banks: usize) -> usize {
    let per_bank = (mem_bytes + banks - 1) / banks;
    let per_bank_words = (per_bank + 3) / 4;
    banks * per_bank_words * 4
}

#[derive(Clone, Debug)]
pub struct Kernel {
    pub id: u32,
    pub name: String,
    pub mem_bytes: usize,
    pub banks: usize,
    pub regs: usize,
    pub constants: PortList,
    pub inputs: PortList,
    pub outputs: PortList,
    pub inouts: PortList,
    pub constants_loaded: bool,
    /// Bitmap of which banks are occupied, shared across all four lists.
    pub(crate) bank_occupied: Vec<bool>,
}

impl Kernel {
    pub fn new(id: u32, name: impl Into<String>, mem_bytes: usize, banks: usize, regs: usize) -> Self {
        Kernel {
            id,
            name: name.into(),
            mem_bytes: round_mem_bytes(mem_bytes, banks),
            banks,
            regs,
            constants: PortList::default(),
            inputs: PortList::default(),
            outputs: PortList::default(),
            inouts: PortList::default(),
            constants_loaded: false,
            bank_occupied: vec![false; banks],
        }
    }

    pub fn bank_count(&self) -> usize { self.banks }

    pub fn port_count(&self) -> usize {
        self.constants.len() + self.inputs.len() + self.outputs.len() + self.inouts.len()
    }

    fn list_for(&self, direction: Direction) -> &PortList {
        match direction {
            Direction::Constant => &self.constants,
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
            Direction::InOut => &self.inouts,
        }
    }

    fn list_for_mut(&mut self, direction: Direction) -> &mut PortList {
        match direction {
            Direction::Constant => &mut self.constants,
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
            Direction::InOut => &mut self.inouts,
        }
    }

    pub fn contains_name(&self, name: &str, direction: Direction) -> bool {
        self.list_for(direction).contains_name(name)
    }

    /// True if `name` exists in any of the four lists (ports are unique
    /// within kernel and direction per §3, but a duplicate-name check across
    /// the whole kernel is what `alloc_port` actually enforces).
    pub fn contains_name_anywhere(&self, name: &str) -> bool {
        self.constants.contains_name(name)
            || self.inputs.contains_name(name)
            || self.outputs.contains_name(name)
            || self.inouts.contains_name(name)
    }

    fn lowest_free_bank(&self) -> Option<usize> { self.bank_occupied.iter().position(|&b| !b) }

    fn highest_free_bank(&self) -> Option<usize> { self.bank_occupied.iter().rposition(|&b| !b) }

    /// Assigns the next bank for `direction` per the layout contract: inputs
    /// (and constants/inout) fill low banks upward, outputs fill high banks
    /// downward.
    pub(crate) fn next_bank(&self, direction: Direction) -> Option<usize> {
        match direction {
            Direction::Output => self.highest_free_bank(),
            _ => self.lowest_free_bank(),
        }
    }

    pub fn insert_port(&mut self, name: impl Into<String>, size_bytes: usize, direction: Direction, bank: usize) {
        self.bank_occupied[bank] = true;
        if direction == Direction::Constant {
            self.constants_loaded = false;
        }
        let port = Port::new(name, size_bytes, direction, bank);
        self.list_for_mut(direction).insert_sorted(port);
    }

    /// Removes a port by name from whichever of the four lists holds it,
    /// freeing its bank. Returns the removed port's direction.
    pub fn remove_port_anywhere(&mut self, name: &str) -> Option<Direction> {
        for direction in [Direction::Constant, Direction::Input, Direction::Output, Direction::InOut] {
            if let Some(port) = self.list_for_mut(direction).remove(name) {
                self.bank_occupied[port.bank] = false;
                return Some(direction);
            }
        }
        None
    }

    pub fn ports(&self, direction: Direction) -> &PortList { self.list_for(direction) }
}
