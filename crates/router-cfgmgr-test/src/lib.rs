//! Integration test infrastructure for the router relation reconciler
//!
//! Provides:
//! - Relation event builders and the `core`/`ran`/`access` fixtures
//! - Scenario runner over a mock-mode networking layer
//! - Router state and command verification helpers
//! - A networking layer with injectable failures
//! - A stateful model of the host network stack

pub mod faults;
pub mod fixtures;
pub mod kernel;
mod verification;

pub use faults::{FaultPoint, FaultyNetwork};
pub use fixtures::*;
pub use kernel::KernelNetwork;
pub use verification::*;
