//! Accounts and scopes
//!
//! A [`ScopeContext`] names one unit of work (an account, optionally narrowed
//! to a zone, a resource group or a vault inside one) and carries the metadata
//! columns stamped on every row produced inside it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cloud platform a table reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gcp,
    Azure,
}

impl ProviderKind {
    /// Column holding the account identifier
    pub fn account_column(&self) -> &'static str {
        match self {
            ProviderKind::Gcp => "project_id",
            ProviderKind::Azure => "subscription_id",
        }
    }

    /// Column holding the region/location pinned by the scope
    pub fn region_column(&self) -> &'static str {
        match self {
            ProviderKind::Gcp => "region",
            ProviderKind::Azure => "location",
        }
    }

    /// Column holding the directory tenant, for providers that have one
    pub fn tenant_column(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Gcp => None,
            ProviderKind::Azure => Some("tenant_id"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gcp => "gcp",
            ProviderKind::Azure => "azure",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dimension a table fans out over inside one account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubScopeKind {
    Zone,
    ResourceGroup,
    /// Key vault inside a resource group
    Vault,
}

impl SubScopeKind {
    pub fn column(&self) -> &'static str {
        match self {
            SubScopeKind::Zone => "zone",
            SubScopeKind::ResourceGroup => "resource_group",
            SubScopeKind::Vault => "vault_name",
        }
    }
}

impl fmt::Display for SubScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubScopeKind::Zone => f.write_str("zones"),
            SubScopeKind::ResourceGroup => f.write_str("resource groups"),
            SubScopeKind::Vault => f.write_str("key vaults"),
        }
    }
}

/// One configured account (GCP project, Azure subscription)
///
/// An account with no `id` is the implicit default account; the source
/// resolves it from the environment when connecting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

impl Account {
    pub fn new(id: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            tenant_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }

    pub fn is_default(&self) -> bool {
        self.id.is_none()
    }

    pub fn label(&self) -> &str {
        self.id.as_deref().unwrap_or("default")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubScope {
    pub kind: SubScopeKind,
    pub name: String,
}

/// Immutable description of one unit of collection work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeContext {
    pub provider: ProviderKind,
    pub account_id: String,
    pub tenant_id: Option<String>,
    pub region: Option<String>,
    /// Narrowing levels, outermost first (resource group, then vault)
    pub sub_scopes: Vec<SubScope>,
}

impl ScopeContext {
    /// Account-level scope with no region and no sub-scope
    pub fn account(provider: ProviderKind, account_id: &str) -> Self {
        Self {
            provider,
            account_id: account_id.to_string(),
            tenant_id: None,
            region: None,
            sub_scopes: Vec::new(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: &str) -> Self {
        self.tenant_id = Some(tenant_id.to_string());
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    /// Narrow the scope by one level
    ///
    /// A zone also pins its region (`us-east1-b` -> `us-east1`) unless one is set.
    pub fn with_sub_scope(mut self, kind: SubScopeKind, name: &str) -> Self {
        if kind == SubScopeKind::Zone && self.region.is_none() {
            self.region = zone_region(name).map(str::to_string);
        }
        self.sub_scopes.push(SubScope {
            kind,
            name: name.to_string(),
        });
        self
    }

    /// Name of the innermost sub-scope, if any
    pub fn sub_scope_name(&self) -> Option<&str> {
        self.sub_scopes.last().map(|s| s.name.as_str())
    }

    /// Name of the sub-scope of `kind`, if the scope is narrowed by one
    pub fn sub_scope(&self, kind: SubScopeKind) -> Option<&str> {
        self.sub_scopes
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.name.as_str())
    }

    /// Metadata columns this scope stamps onto rows
    pub fn metadata(&self) -> Vec<(&'static str, &str)> {
        let mut columns = vec![(self.provider.account_column(), self.account_id.as_str())];
        if let (Some(column), Some(tenant)) = (self.provider.tenant_column(), &self.tenant_id) {
            columns.push((column, tenant.as_str()));
        }
        if let Some(region) = &self.region {
            columns.push((self.provider.region_column(), region.as_str()));
        }
        for sub in &self.sub_scopes {
            columns.push((sub.kind.column(), sub.name.as_str()));
        }
        columns
    }

    /// `account`, `account/sub-scope` or `account/group/vault`
    pub fn label(&self) -> String {
        let mut label = self.account_id.clone();
        for sub in &self.sub_scopes {
            label.push('/');
            label.push_str(&sub.name);
        }
        label
    }
}

/// Region part of a GCP zone name
fn zone_region(zone: &str) -> Option<&str> {
    zone.rsplit_once('-')
        .map(|(region, _)| region)
        .filter(|region| region.contains('-'))
}

impl fmt::Display for ScopeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.label())
    }
}
