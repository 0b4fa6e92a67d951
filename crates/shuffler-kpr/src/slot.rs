//! The slot table: one entry per hardware accelerator slot, index-addressed
//! and sized from the hardware's own slot-count register (§3).

/// Lifecycle state of one slot (§3's Slot entity).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Loading,
    Idle,
    Writing,
    Running,
    Ready,
    Reading,
}

#[derive(Clone, Debug)]
pub struct Slot {
    pub state: SlotState,
    /// Back-reference only — the registry's kernel table is the owner.
    pub kernel: Option<u32>,
}

impl Slot {
    pub fn empty() -> Self { Slot { state: SlotState::Empty, kernel: None } }
}

/// The fixed-size table of slots, created once the hardware slot count is
/// known. Indexing is the slot index itself (0..N).
#[derive(Clone, Debug)]
pub struct SlotTable {
    slots: Vec<Slot>,
}

impl SlotTable {
    pub fn new(n: usize) -> Self { SlotTable { slots: vec![Slot::empty(); n] } }

    pub fn len(&self) -> usize { self.slots.len() }

    pub fn get(&self, index: usize) -> Option<&Slot> { self.slots.get(index) }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Slot> { self.slots.get_mut(index) }

    /// Clears every slot currently bound to `kernel_id`, returning it to
    /// `Empty` with no bound kernel — used by kernel release (§4.3).
    pub fn clear_bound_to(&mut self, kernel_id: u32) {
        for slot in self.slots.iter_mut() {
            if slot.kernel == Some(kernel_id) {
                *slot = Slot::empty();
            }
        }
    }

    /// Moves every slot currently bound to `kernel_id` into `state` — a
    /// kernel running with redundancy (TMR/DMR) occupies more than one
    /// slot, and all of them move through the round lifecycle together.
    pub fn set_state_bound_to(&mut self, kernel_id: u32, state: SlotState) {
        for slot in self.slots.iter_mut() {
            if slot.kernel == Some(kernel_id) {
                slot.state = state;
            }
        }
    }
}
