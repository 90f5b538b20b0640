//! Configuration Management
//!
//! Accounts per provider, worker pool size and extra table definitions.

use crate::collect::{Account, ProviderKind, DEFAULT_MAX_CONCURRENCY};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpAccount {
    pub project_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GcpConfig {
    #[serde(default)]
    pub accounts: Vec<GcpAccount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureAccount {
    pub subscription_id: String,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureConfig {
    #[serde(default)]
    pub accounts: Vec<AzureAccount>,
    /// ARM bearer token; falls back to `AZURE_ACCESS_TOKEN`
    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,
    /// AAD Graph bearer token; falls back to `AZURE_GRAPH_ACCESS_TOKEN`
    #[serde(default, skip_serializing)]
    pub graph_access_token: Option<String>,
    /// Key Vault bearer token; falls back to `AZURE_VAULT_ACCESS_TOKEN`
    #[serde(default, skip_serializing)]
    pub vault_access_token: Option<String>,
}

/// User configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub gcp: GcpConfig,
    #[serde(default)]
    pub azure: AzureConfig,
    /// Upper bound on concurrently running scope workers
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Directory with additional table definition files
    #[serde(default)]
    pub tables_dir: Option<PathBuf>,
}

impl Config {
    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloudtab").join("config.json"))
    }

    /// Load configuration from the default location
    ///
    /// A missing file yields the default configuration; a malformed one is
    /// logged and ignored.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %format!("{:#}", e),
                    "ignoring unreadable config"
                );
                Self::default()
            }
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Configured accounts for `provider` (empty = implicit default account)
    pub fn accounts(&self, provider: ProviderKind) -> Vec<Account> {
        match provider {
            ProviderKind::Gcp => self
                .gcp
                .accounts
                .iter()
                .map(|a| Account::new(&a.project_id))
                .collect(),
            ProviderKind::Azure => self
                .azure
                .accounts
                .iter()
                .map(|a| {
                    let account = Account::new(&a.subscription_id);
                    match &a.tenant_id {
                        Some(tenant) => account.with_tenant(tenant),
                        None => account,
                    }
                })
                .collect(),
        }
    }

    /// Get effective worker pool size (CLI > config > default)
    pub fn effective_concurrency(&self, cli: Option<usize>) -> usize {
        cli.or(self.max_concurrency)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
            .max(1)
    }
}
