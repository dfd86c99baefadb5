//! Page-wide shared state store and its persistence layer.
//!
//! # Responsibility
//! - Hold one mutable state tree per page, split into namespaced sub-states.
//! - Rehydrate declared persistent paths at construction and write them
//!   through to durable storage after every mutation.
//!
//! # Invariants
//! - At most one store is constructed per `StoreCell`; later declarations are
//!   ignored, never merged.
//! - A mutation returns only after its persisted paths were written.
//! - Missing or corrupt persisted values fall back to declared defaults.

mod persist;
mod shared;
mod state;
mod storage;

pub use shared::{StoreCell, StoreError, StoreHandle, StoreResult};
pub use state::{MutationFn, StateModule};
pub use storage::{DurableStorage, MemoryStorage, StorageError, StorageResult};
