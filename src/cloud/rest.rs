//! REST resource source
//!
//! Drives a table definition against a provider's JSON list endpoint:
//! expands the URL template per scope, follows page tokens or next links,
//! and extracts the item array from each response.
//!
//! Next links are only followed to the origin of the first page, since every
//! request carries the session's bearer token.

use super::http::ApiHttpClient;
use super::{ApiSession, CloudProvider};
use crate::collect::{Account, Connected, Page, ResourceSource, ScopeContext, SubScopeKind};
use crate::table::{FlattenOptions, Pagination, TableDef};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Resource source for one declaratively defined table
pub struct RestSource {
    table: String,
    def: TableDef,
    options: FlattenOptions,
    provider: Arc<dyn CloudProvider>,
    http: ApiHttpClient,
}

impl RestSource {
    pub fn new(table: &str, def: TableDef, provider: Arc<dyn CloudProvider>) -> Result<Self> {
        if def.provider != provider.kind() {
            bail!(
                "Table {} belongs to {}, not {}",
                table,
                def.provider,
                provider.kind()
            );
        }

        Ok(Self {
            table: table.to_string(),
            options: def.flatten_options(),
            def,
            provider,
            http: ApiHttpClient::new()?,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn page_url(&self, scope: &ScopeContext, cursor: Option<&str>) -> Result<String> {
        let first = expand_url(&self.def.list_url, scope)?;
        match (self.def.pagination, cursor) {
            (_, None) | (Pagination::None, _) => Ok(first),
            (Pagination::PageToken, Some(token)) => with_page_token(&first, token),
            (Pagination::NextLink, Some(link)) => resolve_next_link(&first, link),
        }
    }
}

#[async_trait]
impl ResourceSource for RestSource {
    type Session = ApiSession;

    async fn connect(&self, account: &Account) -> Result<Connected<ApiSession>> {
        let session = self.provider.authenticate(account).await?;
        let mut scope = ScopeContext::account(self.def.provider, &session.account_id);
        match &session.tenant_id {
            Some(tenant) => scope = scope.with_tenant(tenant),
            None if self.def.list_url.contains("{tenant}") => {
                bail!(
                    "Table {} needs a directory tenant for {}; set AZURE_TENANT_ID",
                    self.table,
                    session.account_id
                );
            }
            None => {}
        }
        Ok(Connected { scope, session })
    }

    fn sub_scope_kind(&self) -> Option<SubScopeKind> {
        self.def.sub_scope
    }

    async fn list_sub_scopes(
        &self,
        session: &ApiSession,
        scope: &ScopeContext,
    ) -> Result<Vec<ScopeContext>> {
        let kind = self
            .def
            .sub_scope
            .with_context(|| format!("Table {} has no sub-scope dimension", self.table))?;
        self.provider
            .list_sub_scopes(&self.http, session, scope, kind)
            .await
    }

    async fn fetch_page(
        &self,
        session: &ApiSession,
        scope: &ScopeContext,
        cursor: Option<String>,
    ) -> Result<Page> {
        let url = self.page_url(scope, cursor.as_deref())?;
        let response = self
            .http
            .get(&url, session.token_for(self.def.audience))
            .await
            .with_context(|| format!("Failed to list {} in {}", self.table, scope.label()))?;

        Ok(Page {
            items: extract_items(&response, &self.def.items_path),
            next_token: next_cursor(&response, self.def.pagination),
        })
    }

    fn flatten_options(&self) -> FlattenOptions {
        self.options.clone()
    }
}

/// Substitute scope values into a list URL template
///
/// Fails when the template names a value the scope does not carry.
pub fn expand_url(template: &str, scope: &ScopeContext) -> Result<String> {
    let values = [
        ("{project}", Some(scope.account_id.as_str())),
        ("{subscription}", Some(scope.account_id.as_str())),
        ("{tenant}", scope.tenant_id.as_deref()),
        ("{region}", scope.region.as_deref()),
        ("{zone}", scope.sub_scope(SubScopeKind::Zone)),
        ("{resource_group}", scope.sub_scope(SubScopeKind::ResourceGroup)),
        ("{vault}", scope.sub_scope(SubScopeKind::Vault)),
    ];

    let mut url = template.to_string();
    for (placeholder, value) in values {
        if !url.contains(placeholder) {
            continue;
        }
        let Some(value) = value else {
            bail!("{} has no value for {} in {}", scope, placeholder, template);
        };
        url = url.replace(placeholder, &urlencoding::encode(value));
    }
    Ok(url)
}

/// Resolve a server-supplied next link against the first page's URL
///
/// Relative links (AAD Graph) are joined onto the first URL. The link must
/// stay on the first URL's scheme, host and port. Query parameters of the
/// first URL the link omits (`api-version`) are carried over.
pub fn resolve_next_link(first: &str, link: &str) -> Result<String> {
    let base = Url::parse(first).with_context(|| format!("Invalid list URL: {}", first))?;
    let mut next = base
        .join(link)
        .with_context(|| format!("Invalid next link: {}", link))?;

    if next.scheme() != base.scheme()
        || next.host_str() != base.host_str()
        || next.port_or_known_default() != base.port_or_known_default()
    {
        bail!(
            "Refusing to follow next link to {} outside {}",
            next.origin().ascii_serialization(),
            base.origin().ascii_serialization()
        );
    }

    let present: Vec<String> = next.query_pairs().map(|(k, _)| k.into_owned()).collect();
    let missing: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| !present.iter().any(|p| p == k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !missing.is_empty() {
        next.query_pairs_mut().extend_pairs(missing);
    }
    Ok(next.into())
}

fn with_page_token(url: &str, token: &str) -> Result<String> {
    let mut url = Url::parse(url).with_context(|| format!("Invalid list URL: {}", url))?;
    url.query_pairs_mut().append_pair("pageToken", token);
    Ok(url.into())
}

/// Continuation for the next page, if the response carries one
pub fn next_cursor(response: &Value, pagination: Pagination) -> Option<String> {
    let keys: &[&str] = match pagination {
        Pagination::PageToken => &["nextPageToken"],
        Pagination::NextLink => &["nextLink", "@odata.nextLink", "odata.nextLink"],
        Pagination::None => return None,
    };

    keys.iter()
        .filter_map(|key| response.get(*key).and_then(|v| v.as_str()))
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Extract items from a response using a dot-notation path
///
/// A missing path means an empty page (GCP omits `items` when there are none).
pub fn extract_items(response: &Value, path: &str) -> Vec<Value> {
    if path.is_empty() {
        return response.as_array().cloned().unwrap_or_default();
    }

    let mut current = response;
    for part in path.split('.') {
        current = match current.get(part) {
            Some(v) => v,
            None => return vec![],
        };
    }

    current.as_array().cloned().unwrap_or_default()
}

/// Page through a listing endpoint and collect each kept item's `name`
pub async fn list_names<F>(
    http: &ApiHttpClient,
    session: &ApiSession,
    url: &str,
    items_path: &str,
    pagination: Pagination,
    keep: F,
) -> Result<Vec<String>>
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    let mut names = Vec::new();
    let mut next_url = Some(url.to_string());

    while let Some(current) = next_url.take() {
        let response = http.get(&current, &session.token).await?;
        names.extend(
            extract_items(&response, items_path)
                .iter()
                .filter(|item| keep(item))
                .filter_map(|item| item.get("name").and_then(|n| n.as_str()))
                .map(|n| n.to_string()),
        );

        next_url = match (pagination, next_cursor(&response, pagination)) {
            (Pagination::PageToken, Some(token)) => Some(with_page_token(url, &token)?),
            (Pagination::NextLink, Some(link)) => Some(resolve_next_link(url, &link)?),
            _ => None,
        };
    }

    Ok(names)
}
