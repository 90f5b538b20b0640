//! cloudtab - cloud resource inventories as uniform table rows
//!
//! Every table follows the same pipeline: list resources from a provider API
//! (per account, optionally per zone, resource group or key vault), flatten
//! each nested response into a `path -> value` map, then project that map onto
//! the table's declared columns.
//!
//! - [`table`] - Column schemas, flattening and projection
//! - [`collect`] - Account loop, bounded sub-scope fan-out, aggregation
//! - [`cloud`] - GCP and Azure REST sources
//! - [`config`] - Accounts and runtime settings
//! - [`output`] - JSON lines and text table rendering

pub mod cloud;
pub mod collect;
pub mod config;
pub mod error;
pub mod output;
pub mod table;

pub use collect::{generate, Account, Collector, ResultSet, ScopeContext};
pub use error::TableError;
pub use table::{ColumnSchema, FlatRow, SchemaRegistry};

/// Version injected at compile time via CLOUDTAB_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("CLOUDTAB_VERSION") {
    Some(v) => v,
    None => "dev",
};
