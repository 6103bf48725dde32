//! Infrastructure for the wizard workflow engine: interchangeable storage
//! backends, the in-process task queue, and deadline handling.

pub mod queue;
pub mod resilience;
pub mod storage;

pub use queue::MemoryTaskQueue;
pub use resilience::{TimeoutError, TimeoutPolicy};
pub use storage::{build_storage, FileStorage, MemoryStorage, PostgresStorage};
