//! Error taxonomy for table generation.
//!
//! Only [`TableError::ConfigMissing`] is fatal to a table-generation call.
//! Every other variant is collected into the [`ResultSet`](crate::collect::ResultSet)
//! error list while the remaining accounts and scopes keep producing rows.

use crate::collect::SubScopeKind;
use thiserror::Error;

/// Errors raised while generating rows for one table
#[derive(Debug, Error)]
pub enum TableError {
    /// No column schema is registered for the requested table
    #[error("table configuration not found: {table}")]
    ConfigMissing { table: String },

    /// Authentication or session setup failed; the account was skipped
    #[error("session setup failed for account {account}")]
    Session {
        account: String,
        #[source]
        source: anyhow::Error,
    },

    /// Sub-scope discovery failed; the account was skipped
    #[error("listing {kind} failed for account {account}")]
    ScopeEnumeration {
        account: String,
        kind: SubScopeKind,
        #[source]
        source: anyhow::Error,
    },

    /// A page request failed; pagination of this scope stopped, earlier rows were kept
    #[error("page fetch failed for {scope} after {rows_kept} rows")]
    PageFetch {
        scope: String,
        rows_kept: usize,
        #[source]
        source: anyhow::Error,
    },

    /// One resource could not be turned into a row and was skipped
    #[error("skipped record in {scope}")]
    Record {
        scope: String,
        #[source]
        source: anyhow::Error,
    },

    /// A scope worker panicked or was aborted before reporting
    #[error("worker for {scope} terminated abnormally: {message}")]
    Worker { scope: String, message: String },
}

impl TableError {
    /// Account or scope label this error is attributed to
    pub fn scope_label(&self) -> &str {
        match self {
            TableError::ConfigMissing { table } => table,
            TableError::Session { account, .. } | TableError::ScopeEnumeration { account, .. } => {
                account
            }
            TableError::PageFetch { scope, .. }
            | TableError::Record { scope, .. }
            | TableError::Worker { scope, .. } => scope,
        }
    }

    /// Underlying provider error, if any
    pub fn cause(&self) -> Option<&anyhow::Error> {
        match self {
            TableError::Session { source, .. }
            | TableError::ScopeEnumeration { source, .. }
            | TableError::PageFetch { source, .. }
            | TableError::Record { source, .. } => Some(source),
            TableError::ConfigMissing { .. } | TableError::Worker { .. } => None,
        }
    }

    /// True when the whole account was skipped
    pub fn is_account_level(&self) -> bool {
        matches!(
            self,
            TableError::Session { .. } | TableError::ScopeEnumeration { .. }
        )
    }
}
