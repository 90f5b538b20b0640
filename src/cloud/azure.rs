//! Azure provider
//!
//! Uses pre-acquired bearer tokens (one per API audience), lists resource
//! groups for tables that fan out per group, and the key vaults inside each
//! group for tables that read vault contents.

use super::http::ApiHttpClient;
use super::rest::list_names;
use super::{ApiSession, Audience, CloudProvider};
use crate::collect::{Account, ProviderKind, ScopeContext, SubScopeKind};
use crate::config::AzureConfig;
use crate::table::Pagination;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;

pub const MANAGEMENT_BASE_URL: &str = "https://management.azure.com";

const RESOURCE_GROUPS_API_VERSION: &str = "2021-04-01";
const VAULTS_API_VERSION: &str = "2022-07-01";

/// Environment variable holding the ARM access token
pub const ACCESS_TOKEN_ENV: &str = "AZURE_ACCESS_TOKEN";

/// Environment variable holding the AAD Graph access token
pub const GRAPH_ACCESS_TOKEN_ENV: &str = "AZURE_GRAPH_ACCESS_TOKEN";

/// Environment variable holding the Key Vault access token
pub const VAULT_ACCESS_TOKEN_ENV: &str = "AZURE_VAULT_ACCESS_TOKEN";

/// Environment variable naming the default subscription
pub const SUBSCRIPTION_ENV: &str = "AZURE_SUBSCRIPTION_ID";

/// Environment variable naming the directory tenant
pub const TENANT_ENV: &str = "AZURE_TENANT_ID";

/// Azure side of the REST source
pub struct AzureProvider {
    management_base_url: String,
    access_token: Option<String>,
    graph_access_token: Option<String>,
    vault_access_token: Option<String>,
}

impl Default for AzureProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureProvider {
    pub fn new() -> Self {
        Self {
            management_base_url: MANAGEMENT_BASE_URL.to_string(),
            access_token: None,
            graph_access_token: None,
            vault_access_token: None,
        }
    }

    /// Provider using whatever tokens `config` carries
    pub fn from_config(config: &AzureConfig) -> Self {
        let mut provider = Self::new();
        if let Some(token) = &config.access_token {
            provider = provider.with_access_token(token);
        }
        if let Some(token) = &config.graph_access_token {
            provider = provider.with_audience_token(Audience::Graph, token);
        }
        if let Some(token) = &config.vault_access_token {
            provider = provider.with_audience_token(Audience::Vault, token);
        }
        provider
    }

    /// Use `token` instead of reading it from the environment
    pub fn with_access_token(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    /// Use `token` for `audience` instead of reading it from the environment
    pub fn with_audience_token(mut self, audience: Audience, token: &str) -> Self {
        match audience {
            Audience::Management => self.access_token = Some(token.to_string()),
            Audience::Graph => self.graph_access_token = Some(token.to_string()),
            Audience::Vault => self.vault_access_token = Some(token.to_string()),
        }
        self
    }

    /// Point resource group and vault discovery at another ARM endpoint
    pub fn with_management_base_url(mut self, url: &str) -> Self {
        self.management_base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn resource_groups_url(&self, subscription: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourcegroups?api-version={}",
            self.management_base_url,
            urlencoding::encode(subscription),
            RESOURCE_GROUPS_API_VERSION
        )
    }

    fn vaults_url(&self, subscription: &str, resource_group: &str) -> String {
        let group = format!(
            "{}/subscriptions/{}/resourceGroups/{}",
            self.management_base_url,
            urlencoding::encode(subscription),
            urlencoding::encode(resource_group)
        );
        format!(
            "{}/providers/Microsoft.KeyVault/vaults?api-version={}",
            group, VAULTS_API_VERSION
        )
    }

    fn token(&self) -> Result<String> {
        match &self.access_token {
            Some(token) => Ok(token.clone()),
            None => std::env::var(ACCESS_TOKEN_ENV)
                .with_context(|| format!("No Azure access token; set {}", ACCESS_TOKEN_ENV)),
        }
    }

    /// Explicit or environment token for a non-management audience, if any
    fn audience_token(&self, audience: Audience) -> Option<String> {
        let (explicit, env) = match audience {
            Audience::Management => return None,
            Audience::Graph => (&self.graph_access_token, GRAPH_ACCESS_TOKEN_ENV),
            Audience::Vault => (&self.vault_access_token, VAULT_ACCESS_TOKEN_ENV),
        };
        explicit
            .clone()
            .or_else(|| std::env::var(env).ok().filter(|t| !t.trim().is_empty()))
    }

    async fn resource_groups(
        &self,
        http: &ApiHttpClient,
        session: &ApiSession,
        scope: &ScopeContext,
    ) -> Result<Vec<ScopeContext>> {
        let url = self.resource_groups_url(&session.account_id);
        let names = list_names(http, session, &url, "value", Pagination::NextLink, |_| true).await?;
        Ok(names
            .iter()
            .map(|rg| scope.clone().with_sub_scope(SubScopeKind::ResourceGroup, rg))
            .collect())
    }

    /// Every vault of every resource group
    ///
    /// A group whose vaults cannot be listed is logged and skipped.
    async fn vaults(
        &self,
        http: &ApiHttpClient,
        session: &ApiSession,
        scope: &ScopeContext,
    ) -> Result<Vec<ScopeContext>> {
        let mut vaults = Vec::new();
        for group in self.resource_groups(http, session, scope).await? {
            let rg = group.sub_scope_name().unwrap_or_default();
            let url = self.vaults_url(&session.account_id, rg);
            match list_names(http, session, &url, "value", Pagination::NextLink, |_| true).await {
                Ok(names) => vaults.extend(
                    names
                        .iter()
                        .map(|vault| group.clone().with_sub_scope(SubScopeKind::Vault, vault)),
                ),
                Err(e) => {
                    tracing::warn!(
                        scope = %group.label(),
                        error = %format!("{:#}", e),
                        "failed to list key vaults, skipping resource group"
                    );
                }
            }
        }
        Ok(vaults)
    }
}

#[async_trait]
impl CloudProvider for AzureProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    async fn authenticate(&self, account: &Account) -> Result<ApiSession> {
        let subscription = match &account.id {
            Some(id) => id.clone(),
            None => std::env::var(SUBSCRIPTION_ENV).with_context(|| {
                format!("No Azure subscription configured; set {}", SUBSCRIPTION_ENV)
            })?,
        };
        if subscription.trim().is_empty() {
            bail!("Empty Azure subscription ID");
        }

        let token = self.token()?;
        let mut session = ApiSession::new(&subscription, &token);
        session.tenant_id = account
            .tenant_id
            .clone()
            .or_else(|| std::env::var(TENANT_ENV).ok().filter(|t| !t.trim().is_empty()));
        for audience in [Audience::Graph, Audience::Vault] {
            if let Some(token) = self.audience_token(audience) {
                session = session.with_audience_token(audience, &token);
            }
        }
        Ok(session)
    }

    async fn list_sub_scopes(
        &self,
        http: &ApiHttpClient,
        session: &ApiSession,
        scope: &ScopeContext,
        kind: SubScopeKind,
    ) -> Result<Vec<ScopeContext>> {
        match kind {
            SubScopeKind::ResourceGroup => self.resource_groups(http, session, scope).await,
            SubScopeKind::Vault => self.vaults(http, session, scope).await,
            other => bail!("Azure tables cannot fan out over {}", other),
        }
    }
}
