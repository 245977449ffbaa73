use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How a component failure reached the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The call that starts the component on the remote endpoint failed
    Submission,
    /// The remote worker reported an error through the event channel
    RemoteExecution,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submission => write!(f, "submission"),
            Self::RemoteExecution => write!(f, "remote execution"),
        }
    }
}

/// A single component failure collected during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub component_id: String,
    pub component_name: String,
    pub message: String,
    pub kind: FailureKind,
}

impl ErrorRecord {
    pub fn new<I, N, M>(component_id: I, component_name: N, message: M, kind: FailureKind) -> Self
    where
        I: Into<String>,
        N: Into<String>,
        M: Into<String>,
    {
        Self {
            component_id: component_id.into(),
            component_name: component_name.into(),
            message: message.into(),
            kind,
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.component_name, self.message)
    }
}

/// Unified error type for stackrun
#[derive(Debug, Error)]
pub enum StackError {
    /// Invalid input detected before anything is dispatched
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// One or more components failed; records are in arrival order
    #[error("{} component(s) failed: {}", .0.len(), format_records(.0))]
    ComponentsFailed(Vec<ErrorRecord>),

    /// An event could not be interpreted
    #[error("Protocol error: {message}")]
    Protocol {
        message: String,
        frame: Option<String>,
    },

    /// The event channel could not be opened or ended early
    #[error("Channel error: {channel} - {message}")]
    Channel { channel: String, message: String },

    /// A collaborator call failed for a single component
    #[error("Submission failed for {component}: {message}")]
    Submission { component: String, message: String },

    #[error("Operation timed out: {operation} (timeout: {timeout_ms}ms)")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

fn format_records(records: &[ErrorRecord]) -> String {
    records
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl StackError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error pointing at a config field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
            frame: None,
        }
    }

    /// Create a protocol error keeping the offending frame
    pub fn protocol_frame<S: Into<String>, F: Into<String>>(message: S, frame: F) -> Self {
        Self::Protocol {
            message: message.into(),
            frame: Some(frame.into()),
        }
    }

    pub fn channel<S: Into<String>, M: Into<String>>(channel: S, message: M) -> Self {
        Self::Channel {
            channel: channel.into(),
            message: message.into(),
        }
    }

    pub fn submission<S: Into<String>, M: Into<String>>(component: S, message: M) -> Self {
        Self::Submission {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn timeout<S: Into<String>>(operation: S, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Records carried by an aggregated rejection, empty for every other variant
    pub fn records(&self) -> &[ErrorRecord] {
        match self {
            Self::ComponentsFailed(records) => records,
            _ => &[],
        }
    }

    /// Whether the error aborts a run outright instead of being aggregated
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ComponentsFailed(_) | Self::Submission { .. })
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::ComponentsFailed(_) => "components",
            Self::Protocol { .. } => "protocol",
            Self::Channel { .. } => "channel",
            Self::Submission { .. } => "submission",
            Self::Timeout { .. } => "timeout",
            Self::Io { .. } => "io",
            Self::Serialization { .. } => "serialization",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, StackError>;

impl From<std::io::Error> for StackError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<serde_json::Error> for StackError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for StackError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}

impl From<anyhow::Error> for StackError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", err))
    }
}
