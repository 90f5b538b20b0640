//! Cloud provider access
//!
//! # Module Structure
//!
//! - [`http`] - Bearer-authenticated JSON GET with sanitized error logging
//! - [`gcp`] - Application Default Credentials, default project, zone discovery
//! - [`azure`] - ARM, Graph and Key Vault tokens, resource group and vault discovery
//! - [`rest`] - [`RestSource`], the table-definition driven resource source

pub mod azure;
pub mod gcp;
pub mod http;
pub mod rest;

pub use azure::AzureProvider;
pub use gcp::GcpProvider;
pub use http::{format_api_error, ApiHttpClient};
pub use rest::RestSource;

use crate::collect::{Account, ProviderKind, ScopeContext, SubScopeKind};
use crate::config::Config;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// API a bearer token is issued for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Resource manager (ARM, GCP APIs)
    #[default]
    Management,
    /// Azure AD Graph (users, groups)
    Graph,
    /// Key Vault data plane
    Vault,
}

/// Authenticated access to one account
#[derive(Clone)]
pub struct ApiSession {
    pub account_id: String,
    pub token: String,
    pub tenant_id: Option<String>,
    /// Tokens for audiences other than [`Audience::Management`]
    pub audience_tokens: HashMap<Audience, String>,
}

impl ApiSession {
    pub fn new(account_id: &str, token: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            token: token.to_string(),
            tenant_id: None,
            audience_tokens: HashMap::new(),
        }
    }

    pub fn with_audience_token(mut self, audience: Audience, token: &str) -> Self {
        self.audience_tokens.insert(audience, token.to_string());
        self
    }

    /// Token for `audience`, falling back to the management token
    pub fn token_for(&self, audience: Audience) -> &str {
        self.audience_tokens
            .get(&audience)
            .map(String::as_str)
            .unwrap_or(&self.token)
    }
}

impl fmt::Debug for ApiSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut audiences: Vec<&Audience> = self.audience_tokens.keys().collect();
        audiences.sort_by_key(|a| format!("{:?}", a));
        f.debug_struct("ApiSession")
            .field("account_id", &self.account_id)
            .field("token", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .field("audiences", &audiences)
            .finish()
    }
}

/// Provider-specific authentication and sub-scope discovery
#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Establish a session; a default account is resolved from the environment
    async fn authenticate(&self, account: &Account) -> Result<ApiSession>;

    /// One discovery pass narrowing `scope` down to `kind`
    async fn list_sub_scopes(
        &self,
        http: &ApiHttpClient,
        session: &ApiSession,
        scope: &ScopeContext,
        kind: SubScopeKind,
    ) -> Result<Vec<ScopeContext>>;
}

/// Provider for `kind`, with any tokens the config supplies
pub fn provider_for(kind: ProviderKind, config: &Config) -> Arc<dyn CloudProvider> {
    match kind {
        ProviderKind::Gcp => Arc::new(GcpProvider::new()),
        ProviderKind::Azure => Arc::new(AzureProvider::from_config(&config.azure)),
    }
}
