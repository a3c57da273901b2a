//! The run store contract the orchestrator and service layer consume.

mod memory;
mod traits;

pub use memory::InMemoryStore;
pub use traits::RunStore;
