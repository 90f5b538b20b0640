//! GCP provider
//!
//! Authenticates with Application Default Credentials, resolves the default
//! project from the gcloud environment and lists zones for zonal tables.

use super::http::ApiHttpClient;
use super::rest::list_names;
use super::{ApiSession, CloudProvider};
use crate::collect::{Account, ProviderKind, ScopeContext, SubScopeKind};
use crate::table::Pagination;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use gcp_auth::TokenProvider;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

pub const COMPUTE_BASE_URL: &str = "https://compute.googleapis.com";

/// Refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// GCP credentials holder with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    provider: Arc<dyn TokenProvider>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    /// Create new GCP credentials using Application Default Credentials
    pub async fn new() -> Result<Self> {
        let provider = gcp_auth::provider().await.context(
            "Failed to initialize GCP authentication. Run 'gcloud auth application-default login'",
        )?;

        Ok(Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Get an access token, reusing the cached one while it is still valid
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self
            .provider
            .token(DEFAULT_SCOPES)
            .await
            .context("Failed to get access token")?;
        let token_str = token.as_str().to_string();

        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;
        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token_str.clone(),
                expires_at,
            });
        }

        Ok(token_str)
    }
}

/// Get the gcloud configuration directory
pub fn get_gcloud_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// Validate a GCP project ID format
/// Project IDs must be 6-30 characters, lowercase letters, digits, and hyphens
/// Must start with a letter and cannot end with a hyphen
pub fn validate_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }

    match project.chars().next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }

    if project.ends_with('-') {
        return false;
    }

    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Read `project = ...` from an INI-style gcloud file, optionally inside `[core]`
fn project_from_properties(content: &str, core_section_only: bool) -> Option<String> {
    let mut in_core_section = !core_section_only;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_core_section = !core_section_only || line == "[core]";
            continue;
        }
        if !in_core_section {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let project = value.trim();
            if key.trim() == "project" && validate_project_id(project) {
                return Some(project.to_string());
            }
        }
    }
    None
}

/// Resolve the default project from the environment or gcloud configuration
pub fn get_default_project() -> Option<String> {
    for var in ["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"] {
        if let Ok(project) = std::env::var(var) {
            if validate_project_id(&project) {
                return Some(project);
            }
            tracing::warn!("Invalid project ID format in {}", var);
        }
    }

    let config_dir = get_gcloud_config_dir()?;

    if let Ok(content) = std::fs::read_to_string(config_dir.join("properties")) {
        if let Some(project) = project_from_properties(&content, false) {
            return Some(project);
        }
    }

    let active_config = std::fs::read_to_string(config_dir.join("active_config")).ok()?;
    let config_name = active_config.trim();

    // Validate config name to prevent path traversal
    if !config_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        tracing::warn!("Invalid characters in active_config name");
        return None;
    }

    let config_path = config_dir
        .join("configurations")
        .join(format!("config_{}", config_name));
    let content = std::fs::read_to_string(config_path).ok()?;
    project_from_properties(&content, true)
}

/// GCP side of the REST source
pub struct GcpProvider {
    compute_base_url: String,
    credentials: OnceCell<GcpCredentials>,
}

impl Default for GcpProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl GcpProvider {
    pub fn new() -> Self {
        Self {
            compute_base_url: COMPUTE_BASE_URL.to_string(),
            credentials: OnceCell::new(),
        }
    }

    /// Point zone discovery at another Compute Engine endpoint
    pub fn with_compute_base_url(mut self, url: &str) -> Self {
        self.compute_base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn zones_url(&self, project: &str) -> String {
        format!(
            "{}/compute/v1/projects/{}/zones",
            self.compute_base_url,
            urlencoding::encode(project)
        )
    }
}

#[async_trait]
impl CloudProvider for GcpProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gcp
    }

    async fn authenticate(&self, account: &Account) -> Result<ApiSession> {
        let project = match &account.id {
            Some(id) => id.clone(),
            None => get_default_project()
                .context("No GCP project configured and none found in the gcloud environment")?,
        };
        if !validate_project_id(&project) {
            bail!("Invalid GCP project ID: {}", project);
        }

        let credentials = self.credentials.get_or_try_init(GcpCredentials::new).await?;
        let token = credentials.get_token().await?;

        Ok(ApiSession::new(&project, &token))
    }

    async fn list_sub_scopes(
        &self,
        http: &ApiHttpClient,
        session: &ApiSession,
        scope: &ScopeContext,
        kind: SubScopeKind,
    ) -> Result<Vec<ScopeContext>> {
        match kind {
            SubScopeKind::Zone => {
                let url = self.zones_url(&session.account_id);
                let up = |zone: &Value| {
                    zone.get("status").and_then(|s| s.as_str()).unwrap_or("UP") == "UP"
                };
                let zones =
                    list_names(http, session, &url, "items", Pagination::PageToken, up).await?;
                Ok(zones
                    .iter()
                    .map(|zone| scope.clone().with_sub_scope(SubScopeKind::Zone, zone))
                    .collect())
            }
            other => bail!("GCP tables cannot fan out over {}", other),
        }
    }
}
