//! Preflight checks that must pass before a run touches the network
//!
//! Logging and account bindings are checked synchronously against the
//! component set; account names are then resolved against the accounts the
//! caller can use. Any failure leaves no side effects behind.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::config::DeployConfig;
use crate::core::errors::{Result, StackError};
use crate::coord::types::{ComponentConfig, ComponentSet};

/// Kind of cloud account
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Static,
    /// Assumed role that needs a source profile to authenticate
    Role,
}

/// An account available to the caller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub account_type: AccountType,
    /// Id of the account used as source profile for role accounts
    #[serde(default)]
    pub source_profile: Option<String>,
}

impl Account {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            account_type: AccountType::Static,
            source_profile: None,
        }
    }

    /// A role account authenticated through `source_profile_id`
    pub fn role(
        id: impl Into<String>,
        name: impl Into<String>,
        source_profile_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            account_type: AccountType::Role,
            source_profile: Some(source_profile_id.into()),
        }
    }
}

/// Accounts grouped by provider
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountSet(BTreeMap<String, Vec<Account>>);

impl AccountSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(mut self, provider: impl Into<String>, accounts: Vec<Account>) -> Self {
        self.0.entry(provider.into()).or_default().extend(accounts);
        self
    }

    pub fn provider(&self, provider: &str) -> &[Account] {
        self.0.get(provider).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find_by_name(&self, provider: &str, name: &str) -> Option<&Account> {
        self.provider(provider).iter().find(|a| a.name == name)
    }

    pub fn find_by_id(&self, provider: &str, id: &str) -> Option<&Account> {
        self.provider(provider).iter().find(|a| a.id == id)
    }
}

/// Account resolution service
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn list_accounts(&self) -> Result<AccountSet>;
}

/// Directory answering from a fixed account set
#[derive(Clone, Debug, Default)]
pub struct StaticAccountDirectory {
    accounts: AccountSet,
}

impl StaticAccountDirectory {
    pub fn new(accounts: AccountSet) -> Self {
        Self { accounts }
    }
}

#[async_trait]
impl AccountDirectory for StaticAccountDirectory {
    async fn list_accounts(&self) -> Result<AccountSet> {
        Ok(self.accounts.clone())
    }
}

/// Checks run before any dispatch
pub struct PreflightValidator<'a> {
    config: &'a DeployConfig,
}

impl<'a> PreflightValidator<'a> {
    pub fn new(config: &'a DeployConfig) -> Self {
        Self { config }
    }

    /// Run every check, fetching the account list only once the local checks pass
    pub async fn validate(
        &self,
        components: &ComponentSet,
        directory: &dyn AccountDirectory,
    ) -> Result<AccountSet> {
        self.check_logging()?;
        self.check_bindings(components)?;
        let accounts = directory.list_accounts().await?;
        self.check_accounts(components, &accounts)?;
        Ok(accounts)
    }

    pub fn check_logging(&self) -> Result<()> {
        if !self.config.logs {
            return Err(StackError::configuration_field(
                "Please enable logging in the deploy configuration",
                "logs",
            ));
        }
        Ok(())
    }

    /// Every component needs a cloud or backend account binding
    pub fn check_bindings(&self, components: &ComponentSet) -> Result<()> {
        let offending: Vec<&ComponentConfig> = components
            .values()
            .filter(|c| c.cloud_account.is_none() && c.backend_account.is_none())
            .collect();

        if offending.is_empty() {
            return Ok(());
        }
        Err(StackError::configuration(format!(
            "{} do not have a cloud account and/or backend account in config",
            quote_names(&offending)
        )))
    }

    /// The cloud account, and the backend account when set, must exist for the provider
    pub fn check_accounts(&self, components: &ComponentSet, accounts: &AccountSet) -> Result<()> {
        let provider = self.config.provider.as_str();
        let resolves = |name: &str| accounts.find_by_name(provider, name).is_some();

        let offending: Vec<&ComponentConfig> = components
            .values()
            .filter(|c| {
                !c.cloud_account.as_deref().map_or(false, resolves)
                    || !c.backend_account.as_deref().map_or(true, resolves)
            })
            .collect();

        if offending.is_empty() {
            return Ok(());
        }
        Err(StackError::configuration(format!(
            "{} do not have a valid {} account in config",
            quote_names(&offending),
            provider
        )))
    }
}

fn quote_names(components: &[&ComponentConfig]) -> String {
    components
        .iter()
        .map(|c| format!("'{}'", c.name))
        .collect::<Vec<_>>()
        .join(", ")
}
