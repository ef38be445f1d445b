//! In-memory backing store and repository registry for the collection catalog.

pub mod fault;
pub mod memory;
pub mod registry;

pub use fault::{FaultPlan, StoreOp};
pub use memory::MemoryCollectionStore;
pub use registry::MemoryRepositoryRegistry;
