use crate::core::errors::{Result, StackError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Deployment run configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Whether a destination for execution logs is configured
    pub logs: bool,
    /// Cloud provider whose accounts bind components
    pub provider: String,
    /// Action name the remote deployer tags its events with
    pub deployer_action: String,
    /// Root under which per-component credential files are expected
    pub credentials_root: PathBuf,
    /// Fail the run when no event arrives for this long once every submit call
    /// has returned (None waits forever)
    pub event_idle_timeout: Option<Duration>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            logs: false,
            provider: "aws".to_string(),
            deployer_action: "aws-cloud-deployer".to_string(),
            credentials_root: std::env::temp_dir().join("stackrun"),
            event_idle_timeout: None,
        }
    }
}

impl DeployConfig {
    /// Create a new builder for DeployConfig
    pub fn builder() -> DeployConfigBuilder {
        DeployConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.provider.trim().is_empty() {
            return Err(StackError::configuration_field(
                "provider must not be empty",
                "provider",
            ));
        }
        if self.deployer_action.trim().is_empty() {
            return Err(StackError::configuration_field(
                "deployer_action must not be empty",
                "deployer_action",
            ));
        }
        if let Some(timeout) = self.event_idle_timeout {
            if timeout.is_zero() {
                return Err(StackError::configuration_field(
                    "event_idle_timeout must be greater than zero",
                    "event_idle_timeout",
                ));
            }
        }
        Ok(())
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(input: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document
    pub fn from_json_str(input: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| StackError::io(format!("read {}", path.display()), e))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json_str(&contents),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&contents),
            other => Err(StackError::configuration(format!(
                "unsupported config format {:?} for {}",
                other,
                path.display()
            ))),
        }
    }
}

/// Builder for DeployConfig
pub struct DeployConfigBuilder {
    config: DeployConfig,
}

impl DeployConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: DeployConfig::default(),
        }
    }

    pub fn logs(mut self, enabled: bool) -> Self {
        self.config.logs = enabled;
        self
    }

    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.config.provider = provider.into();
        self
    }

    pub fn deployer_action(mut self, action: impl Into<String>) -> Self {
        self.config.deployer_action = action.into();
        self
    }

    pub fn credentials_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.credentials_root = root.into();
        self
    }

    pub fn event_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.event_idle_timeout = timeout;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<DeployConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for DeployConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DeployConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.logs);
        assert_eq!(config.provider, "aws");
        assert_eq!(config.deployer_action, "aws-cloud-deployer");
        assert!(config.event_idle_timeout.is_none());
    }

    #[test]
    fn test_validation_errors() {
        let mut config = DeployConfig::default();

        config.provider = " ".to_string();
        assert!(config.validate().is_err());
        config.provider = "aws".to_string();

        config.deployer_action.clear();
        assert!(config.validate().is_err());
        config.deployer_action = "aws-cloud-deployer".to_string();

        config.event_idle_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = DeployConfig::builder()
            .logs(true)
            .provider("gcp")
            .deployer_action("gcp-cloud-deployer")
            .credentials_root("/tmp/creds")
            .event_idle_timeout(Some(Duration::from_secs(30)))
            .build()
            .unwrap();

        assert!(config.logs);
        assert_eq!(config.provider, "gcp");
        assert_eq!(config.deployer_action, "gcp-cloud-deployer");
        assert_eq!(config.credentials_root, PathBuf::from("/tmp/creds"));
        assert_eq!(config.event_idle_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_yaml_partial_document_uses_defaults() {
        let config = DeployConfig::from_yaml_str("logs: true\nprovider: aws\n").unwrap();
        assert!(config.logs);
        assert_eq!(config.deployer_action, "aws-cloud-deployer");
    }

    #[test]
    fn test_json_invalid_value_rejected() {
        let err = DeployConfig::from_json_str(r#"{"deployer_action": ""}"#).unwrap_err();
        assert!(matches!(err, StackError::Configuration { .. }));
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let path = std::env::temp_dir().join(format!("stackrun-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "logs = true").unwrap();

        let err = DeployConfig::from_file(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(matches!(err, StackError::Configuration { .. }));
    }

    #[test]
    fn test_from_yaml_file() {
        let path = std::env::temp_dir().join(format!("stackrun-{}.yml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "logs: true\ndeployer_action: custom\n").unwrap();

        let config = DeployConfig::from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert!(config.logs);
        assert_eq!(config.deployer_action, "custom");
    }
}
