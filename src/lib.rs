// Core infrastructure modules
pub mod core {
    pub mod errors;
    pub mod config;
    pub mod logging;
}

// Dependency-ordered execution of component graphs
pub mod coord;

// Re-exports for convenience
pub use crate::core::config::{DeployConfig, DeployConfigBuilder};
pub use crate::core::errors::{ErrorRecord, FailureKind, Result, StackError};
pub use coord::*;
