pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{complete, SchedulingStore, SchedulingTransaction, StoreError, StoreResult};
