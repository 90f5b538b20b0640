//! Resource source abstraction
//!
//! A source knows how to open a session for an account, how to discover the
//! sub-scopes of that account and how to pull one page of raw resources for
//! one scope. The [`Collector`](super::Collector) drives everything else.

use super::scope::{Account, ScopeContext, SubScopeKind};
use crate::table::FlattenOptions;
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One page returned by a paginated list call
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Value>,
    /// Continuation handed back to the next `fetch_page` call; `None` = exhausted
    pub next_token: Option<String>,
}

impl Page {
    /// Final page holding `items`
    pub fn last(items: Vec<Value>) -> Self {
        Self {
            items,
            next_token: None,
        }
    }

    pub fn with_next(items: Vec<Value>, next_token: &str) -> Self {
        Self {
            items,
            next_token: Some(next_token.to_string()),
        }
    }
}

/// Session established for one account, plus the account-level scope it serves
pub struct Connected<S> {
    pub scope: ScopeContext,
    pub session: S,
}

/// Provider-specific resource listing consumed by the collector
#[async_trait]
pub trait ResourceSource: Send + Sync + 'static {
    type Session: Send + Sync + 'static;

    /// Authenticate and resolve the account-level scope
    async fn connect(&self, account: &Account) -> Result<Connected<Self::Session>>;

    /// Sub-scope dimension to fan out over, or `None` to fetch per account
    fn sub_scope_kind(&self) -> Option<SubScopeKind>;

    /// Discover the sub-scopes of one account (single pass)
    ///
    /// Each returned scope is `scope` narrowed by one or more levels.
    async fn list_sub_scopes(
        &self,
        session: &Self::Session,
        scope: &ScopeContext,
    ) -> Result<Vec<ScopeContext>>;

    /// Fetch one page; `cursor` is the previous page's `next_token`
    async fn fetch_page(
        &self,
        session: &Self::Session,
        scope: &ScopeContext,
        cursor: Option<String>,
    ) -> Result<Page>;

    /// Naming convention used when flattening this source's resources
    fn flatten_options(&self) -> FlattenOptions {
        FlattenOptions::default()
    }
}
