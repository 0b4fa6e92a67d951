//! DMA Engine Adapter (DEA): scoped acquisition of a DMA-coherent buffer and
//! a submit/await transfer contract with cancellation on drop (§4.2).

pub mod dea;
pub mod mock;
pub mod provider;

pub use dea::{Completion, Dea};
pub use mock::MockDmaProvider;
pub use provider::{DmaAllocation, DmaProvider, PhysHandle, RawCompletion, TransferToken};
