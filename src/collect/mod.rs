//! Collection engine
//!
//! - [`scope`] - Accounts, sub-scopes and the metadata they stamp on rows
//! - [`source`] - The [`ResourceSource`] trait providers implement
//! - [`collector`] - Account loop, sub-scope fan-out and pagination
//! - [`aggregate`] - Single-owner accumulation of scope reports

pub mod aggregate;
pub mod collector;
pub mod scope;
pub mod source;

pub use aggregate::{Outcome, ResultAggregator, ResultSet, ScopeReport};
pub use collector::{to_row, Collector, DEFAULT_MAX_CONCURRENCY};
pub use scope::{Account, ProviderKind, ScopeContext, SubScope, SubScopeKind};
pub use source::{Connected, Page, ResourceSource};

use crate::error::TableError;
use crate::table::SchemaRegistry;
use std::sync::Arc;

/// Generate every row of `table`
///
/// Fails only when the table has no registered schema; all other problems are
/// reported in [`ResultSet::errors`].
pub async fn generate<S: ResourceSource>(
    registry: &SchemaRegistry,
    table: &str,
    source: Arc<S>,
    accounts: &[Account],
    collector: &Collector,
) -> Result<ResultSet, TableError> {
    let schema = registry.schema(table).inspect_err(|_| {
        tracing::error!(table, "failed to get table configuration");
    })?;
    Ok(collector.collect(source, schema, accounts).await)
}
