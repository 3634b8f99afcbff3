//! Common infrastructure for the router relation reconciler.
//!
//! - [`shell`]: Shell command execution with proper quoting
//! - [`Reconciler`]: Base trait for relation event reconcilers
//! - [`event`]: Relation lifecycle events and flat relation data
//! - [`error`]: Error types for reconciliation
//!
//! # Architecture
//!
//! Reconcilers follow this pattern:
//!
//! 1. Receive a relation lifecycle event from the hosting runtime
//! 2. Validate the remote unit's relation data at the boundary
//! 3. Drive the networking layer (interfaces, routes) to match
//! 4. Record router-side resources per remote unit for later teardown

pub mod error;
pub mod event;
pub mod manager;
pub mod shell;
pub mod task;

// Re-export commonly used items at crate root
pub use error::{RouterError, RouterResult};
pub use event::{RelationData, RelationDataExt, RelationEvent, RelationEventKind};
pub use manager::{process_event, process_events, Reconciler};
pub use task::TaskStatus;
