//! Per-component credential bindings
//!
//! Each component gets its own environment for the worker that runs it, built
//! from the account it is bound to. Nothing here writes files or touches the
//! process environment; the values travel with the submit request.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::core::config::DeployConfig;
use crate::core::errors::{Result, StackError};
use crate::coord::preflight::{AccountSet, AccountType};
use crate::coord::types::{ComponentId, ComponentSet};

pub const SHARED_CREDENTIALS_FILE: &str = "AWS_SHARED_CREDENTIALS_FILE";
pub const PROFILE: &str = "AWS_PROFILE";
pub const CONFIG_FILE: &str = "AWS_CONFIG_FILE";
pub const SDK_LOAD_CONFIG: &str = "AWS_SDK_LOAD_CONFIG";

/// Credential context handed to the worker of a single component
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerCredentials {
    pub account: Option<String>,
    pub source_profile: Option<String>,
    /// Environment the worker process is launched with
    pub env: BTreeMap<String, String>,
}

impl WorkerCredentials {
    pub fn is_empty(&self) -> bool {
        self.account.is_none() && self.env.is_empty()
    }
}

/// Directory holding the credential files of one component
pub fn component_dir(root: &Path, id: &ComponentId) -> PathBuf {
    root.join(id.as_str())
}

/// Compute the credentials of every component bound to a known cloud account.
///
/// Components without a resolvable cloud account get empty credentials. A role
/// account whose source profile cannot be found is rejected.
pub fn bind_credentials(
    config: &DeployConfig,
    components: &ComponentSet,
    accounts: &AccountSet,
) -> Result<HashMap<ComponentId, WorkerCredentials>> {
    let provider = config.provider.as_str();
    let mut bindings = HashMap::with_capacity(components.len());

    for (id, component) in components {
        let account = match component
            .cloud_account
            .as_deref()
            .and_then(|name| accounts.find_by_name(provider, name))
        {
            Some(account) => account,
            None => {
                bindings.insert(id.clone(), WorkerCredentials::default());
                continue;
            }
        };

        let source_profile = match (account.account_type, account.source_profile.as_deref()) {
            (AccountType::Role, Some(source_id)) => {
                let source = accounts.find_by_id(provider, source_id).ok_or_else(|| {
                    StackError::configuration(format!(
                        "account '{}' used by '{}' references unknown source profile '{}'",
                        account.name, component.name, source_id
                    ))
                })?;
                Some(source.name.clone())
            }
            (AccountType::Role, None) => {
                return Err(StackError::configuration(format!(
                    "role account '{}' used by '{}' has no source profile",
                    account.name, component.name
                )));
            }
            (AccountType::Static, _) => None,
        };

        let dir = component_dir(&config.credentials_root, id);
        let mut env = BTreeMap::new();
        env.insert(
            SHARED_CREDENTIALS_FILE.to_string(),
            dir.join(".aws/credentials").display().to_string(),
        );
        env.insert(PROFILE.to_string(), "default".to_string());
        if source_profile.is_some() {
            env.insert(
                CONFIG_FILE.to_string(),
                dir.join(".aws/config").display().to_string(),
            );
            env.insert(SDK_LOAD_CONFIG.to_string(), "1".to_string());
        }

        bindings.insert(
            id.clone(),
            WorkerCredentials {
                account: Some(account.name.clone()),
                source_profile,
                env,
            },
        );
    }

    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::preflight::Account;
    use crate::coord::types::{component_set, ComponentConfig};

    fn config() -> DeployConfig {
        DeployConfig::builder()
            .logs(true)
            .credentials_root("/var/stackrun")
            .build()
            .unwrap()
    }

    fn accounts() -> AccountSet {
        AccountSet::new().with_accounts(
            "aws",
            vec![
                Account::new("1", "base"),
                Account::role("2", "deployer", "1"),
                Account::role("3", "orphan", "99"),
            ],
        )
    }

    #[test]
    fn test_static_account_binding() {
        let components =
            component_set(vec![ComponentConfig::new("h1", "vpc").with_cloud_account("base")]);
        let bindings = bind_credentials(&config(), &components, &accounts()).unwrap();

        let creds = &bindings[&ComponentId::from("h1")];
        assert_eq!(creds.account.as_deref(), Some("base"));
        assert!(creds.source_profile.is_none());
        assert_eq!(
            creds.env.get(SHARED_CREDENTIALS_FILE).map(String::as_str),
            Some("/var/stackrun/h1/.aws/credentials")
        );
        assert_eq!(creds.env.get(PROFILE).map(String::as_str), Some("default"));
        assert!(!creds.env.contains_key(CONFIG_FILE));
    }

    #[test]
    fn test_role_account_uses_source_profile() {
        let components = component_set(vec![
            ComponentConfig::new("h2", "eks").with_cloud_account("deployer"),
        ]);
        let bindings = bind_credentials(&config(), &components, &accounts()).unwrap();

        let creds = &bindings[&ComponentId::from("h2")];
        assert_eq!(creds.source_profile.as_deref(), Some("base"));
        assert_eq!(
            creds.env.get(CONFIG_FILE).map(String::as_str),
            Some("/var/stackrun/h2/.aws/config")
        );
        assert_eq!(creds.env.get(SDK_LOAD_CONFIG).map(String::as_str), Some("1"));
    }

    #[test]
    fn test_bindings_are_scoped_per_component() {
        let components = component_set(vec![
            ComponentConfig::new("h1", "vpc").with_cloud_account("base"),
            ComponentConfig::new("h2", "eks").with_cloud_account("deployer"),
        ]);
        let bindings = bind_credentials(&config(), &components, &accounts()).unwrap();

        assert_ne!(
            bindings[&ComponentId::from("h1")].env.get(SHARED_CREDENTIALS_FILE),
            bindings[&ComponentId::from("h2")].env.get(SHARED_CREDENTIALS_FILE)
        );
        assert!(!bindings[&ComponentId::from("h1")].env.contains_key(CONFIG_FILE));
    }

    #[test]
    fn test_backend_only_component_gets_empty_credentials() {
        let components =
            component_set(vec![ComponentConfig::new("h3", "state").with_backend_account("base")]);
        let bindings = bind_credentials(&config(), &components, &accounts()).unwrap();
        assert!(bindings[&ComponentId::from("h3")].is_empty());
    }

    #[test]
    fn test_missing_source_profile_rejected() {
        let components =
            component_set(vec![ComponentConfig::new("h4", "x").with_cloud_account("orphan")]);
        let err = bind_credentials(&config(), &components, &accounts()).unwrap_err();
        assert!(err.to_string().contains("unknown source profile '99'"));
    }
}
