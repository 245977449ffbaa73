//! Core types shared by the graph builder, the coordinator and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Stable hash identifying a component
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ComponentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Configuration of one infrastructure component
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentConfig {
    pub id: ComponentId,
    /// Human-readable name used in logs and error records
    pub name: String,
    /// Components that must complete before this one in forward direction
    #[serde(default)]
    pub dependencies: Vec<ComponentId>,
    /// Provisioning parameters, opaque to the coordinator
    #[serde(default)]
    pub parameters: Value,
    #[serde(default)]
    pub cloud_account: Option<String>,
    #[serde(default)]
    pub backend_account: Option<String>,
    /// Project paths the remote worker needs
    #[serde(default)]
    pub mapping: Vec<String>,
}

impl ComponentConfig {
    /// Create a component with no dependencies and no account binding
    pub fn new(id: impl Into<ComponentId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            dependencies: Vec::new(),
            parameters: Value::Object(serde_json::Map::new()),
            cloud_account: None,
            backend_account: None,
            mapping: Vec::new(),
        }
    }

    pub fn with_dependencies<I, D>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = D>,
        D: Into<ComponentId>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_cloud_account(mut self, account: impl Into<String>) -> Self {
        self.cloud_account = Some(account.into());
        self
    }

    pub fn with_backend_account(mut self, account: impl Into<String>) -> Self {
        self.backend_account = Some(account.into());
        self
    }

    pub fn with_mapping<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.mapping = paths.into_iter().map(Into::into).collect();
        self
    }
}

/// Components selected for a run, keyed by id
pub type ComponentSet = BTreeMap<ComponentId, ComponentConfig>;

/// Key a list of configs by their ids
pub fn component_set<I>(configs: I) -> ComponentSet
where
    I: IntoIterator<Item = ComponentConfig>,
{
    configs.into_iter().map(|c| (c.id.clone(), c)).collect()
}

/// Traversal order of a run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Dependencies before dependents (apply)
    #[default]
    Forward,
    /// Dependents before dependencies (teardown)
    Reverse,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forward => write!(f, "forward"),
            Self::Reverse => write!(f, "reverse"),
        }
    }
}

/// Correlation ticket issued by the remote system, scoping one event channel
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub ticket_id: String,
}

impl Ticket {
    pub fn new(ticket_id: impl Into<String>) -> Self {
        Self {
            ticket_id: ticket_id.into(),
        }
    }
}

/// Identifiers correlating one coordinator invocation
#[derive(Clone, Debug)]
pub struct RunContext {
    pub run_id: String,
    pub ticket: Ticket,
    pub direction: Direction,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    /// Create a context with a fresh run id
    pub fn new(ticket: Ticket, direction: Direction) -> Self {
        Self::with_run_id(uuid::Uuid::new_v4().to_string(), ticket, direction)
    }

    pub fn with_run_id(run_id: impl Into<String>, ticket: Ticket, direction: Direction) -> Self {
        Self {
            run_id: run_id.into(),
            ticket,
            direction,
            started_at: Utc::now(),
        }
    }
}

/// Result reported for a component
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    Finished,
    Failed { message: String },
}

/// A correlated completion event for one component
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentEvent {
    pub component_id: ComponentId,
    /// Run the event belongs to, when the remote side reports it
    pub run_id: Option<String>,
    pub outcome: EventOutcome,
}

impl ComponentEvent {
    pub fn finished(component_id: impl Into<ComponentId>) -> Self {
        Self {
            component_id: component_id.into(),
            run_id: None,
            outcome: EventOutcome::Finished,
        }
    }

    pub fn failed(component_id: impl Into<ComponentId>, message: impl Into<String>) -> Self {
        Self {
            component_id: component_id.into(),
            run_id: None,
            outcome: EventOutcome::Failed {
                message: message.into(),
            },
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_component_config_deserializes_camel_case() {
        let config: ComponentConfig = serde_json::from_value(json!({
            "id": "a1b2",
            "name": "vpc",
            "dependencies": ["c3d4"],
            "cloudAccount": "prod",
            "mapping": ["./vpc"]
        }))
        .unwrap();

        assert_eq!(config.id, ComponentId::from("a1b2"));
        assert_eq!(config.dependencies, vec![ComponentId::from("c3d4")]);
        assert_eq!(config.cloud_account.as_deref(), Some("prod"));
        assert!(config.backend_account.is_none());
        assert!(config.parameters.is_null());
    }

    #[test]
    fn test_component_set_keys_by_id() {
        let set = component_set(vec![
            ComponentConfig::new("b", "beta"),
            ComponentConfig::new("a", "alpha").with_dependencies(["b"]),
        ]);

        assert_eq!(set.len(), 2);
        assert_eq!(set[&ComponentId::from("a")].name, "alpha");
    }

    #[test]
    fn test_run_ids_are_unique() {
        let first = RunContext::new(Ticket::new("t"), Direction::Forward);
        let second = RunContext::new(Ticket::new("t"), Direction::Forward);
        assert_ne!(first.run_id, second.run_id);
    }
}
