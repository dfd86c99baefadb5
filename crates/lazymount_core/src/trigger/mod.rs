//! Deferred bundle loading on page events.
//!
//! # Invariants
//! - Each trigger makes at most one load attempt per page lifetime.
//! - `Mounted` and `Failed` are terminal; there is no automatic retry.

mod condition;
mod lazy;

pub use condition::{PageEvent, TriggerCondition};
pub use lazy::{LazyTrigger, TriggerOutcome, TriggerState};
