//! Coordinator-based execution of component graphs
//!
//! The graph builder, preflight checks and credential binding run before
//! anything is dispatched; the coordinator then drives the run against the
//! submitter and event channel collaborators.

pub mod types;
pub mod graph;
pub mod aggregator;
pub mod preflight;
pub mod credentials;
pub mod channel;
pub mod submitter;
pub mod hooks;
pub mod coordinator;

pub use types::*;
pub use graph::{build, build_with_known, DependencyTable};
pub use aggregator::ErrorAggregator;
pub use preflight::*;
pub use credentials::{bind_credentials, WorkerCredentials};
pub use channel::*;
pub use submitter::*;
pub use hooks::*;
pub use coordinator::*;
