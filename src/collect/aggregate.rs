//! Result aggregation
//!
//! Scope workers never touch the result set directly. Each one reports once
//! over a channel and a single aggregator task owns the accumulator.

use super::scope::ScopeContext;
use crate::error::TableError;
use crate::table::FlatRow;
use tokio::sync::mpsc;

/// Everything one scope worker produced
#[derive(Debug)]
pub struct ScopeReport {
    pub scope: ScopeContext,
    pub rows: Vec<FlatRow>,
    pub errors: Vec<TableError>,
    /// False when pagination stopped early (page error or cancellation)
    pub completed: bool,
}

/// Message sent to the aggregator
#[derive(Debug)]
pub enum Outcome {
    Scope(ScopeReport),
    /// Account-level failure (session, enumeration) or a lost worker
    Failed(TableError),
}

/// Rows for one table-generation call, plus what went wrong along the way
///
/// Row order is not meaningful.
#[derive(Debug, Default)]
pub struct ResultSet {
    pub rows: Vec<FlatRow>,
    pub errors: Vec<TableError>,
    pub scopes_completed: usize,
    /// Labels of scopes whose pagination stopped early
    pub scopes_incomplete: Vec<String>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// True when some account, scope or record failed
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty() || !self.scopes_incomplete.is_empty()
    }

    /// Accounts that were skipped entirely
    pub fn skipped_accounts(&self) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.is_account_level())
            .map(TableError::scope_label)
            .collect()
    }

    pub fn into_rows(self) -> Vec<FlatRow> {
        self.rows
    }
}

/// Single owner of the accumulating [`ResultSet`]
#[derive(Debug, Default)]
pub struct ResultAggregator {
    result: ResultSet,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Scope(report) => {
                tracing::debug!(
                    scope = %report.scope,
                    rows = report.rows.len(),
                    errors = report.errors.len(),
                    completed = report.completed,
                    "scope finished"
                );
                if report.completed {
                    self.result.scopes_completed += 1;
                } else {
                    self.result.scopes_incomplete.push(report.scope.label());
                }
                self.result.rows.extend(report.rows);
                self.result.errors.extend(report.errors);
            }
            Outcome::Failed(err) => self.result.errors.push(err),
        }
    }

    pub fn finish(self) -> ResultSet {
        self.result
    }

    /// Drain `rx` until every sender is dropped
    pub async fn run(mut rx: mpsc::Receiver<Outcome>) -> ResultSet {
        let mut aggregator = Self::new();
        while let Some(outcome) = rx.recv().await {
            aggregator.absorb(outcome);
        }
        aggregator.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::{ProviderKind, SubScopeKind};

    fn row(id: &str) -> FlatRow {
        FlatRow::from([("id".to_string(), id.to_string())])
    }

    fn scope(rg: &str) -> ScopeContext {
        ScopeContext::account(ProviderKind::Azure, "sub-1")
            .with_sub_scope(SubScopeKind::ResourceGroup, rg)
    }

    #[test]
    fn test_absorb_tracks_completion() {
        let mut aggregator = ResultAggregator::new();
        aggregator.absorb(Outcome::Scope(ScopeReport {
            scope: scope("rg-a"),
            rows: vec![row("1"), row("2")],
            errors: vec![],
            completed: true,
        }));
        aggregator.absorb(Outcome::Scope(ScopeReport {
            scope: scope("rg-b"),
            rows: vec![row("3")],
            errors: vec![TableError::PageFetch {
                scope: "sub-1/rg-b".to_string(),
                rows_kept: 1,
                source: anyhow::anyhow!("503"),
            }],
            completed: false,
        }));

        let result = aggregator.finish();
        assert_eq!(result.len(), 3);
        assert_eq!(result.scopes_completed, 1);
        assert_eq!(result.scopes_incomplete, vec!["sub-1/rg-b".to_string()]);
        assert!(result.is_partial());
        assert!(result.skipped_accounts().is_empty());
    }

    #[test]
    fn test_failed_account_is_reported() {
        let mut aggregator = ResultAggregator::new();
        aggregator.absorb(Outcome::Failed(TableError::Session {
            account: "sub-9".to_string(),
            source: anyhow::anyhow!("denied"),
        }));
        let result = aggregator.finish();
        assert!(result.is_empty());
        assert_eq!(result.skipped_accounts(), vec!["sub-9"]);
    }

    #[tokio::test]
    async fn test_run_drains_until_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let producer = tokio::spawn(async move {
            for i in 0..10 {
                let report = ScopeReport {
                    scope: scope(&format!("rg-{}", i)),
                    rows: vec![row(&i.to_string())],
                    errors: vec![],
                    completed: true,
                };
                tx.send(Outcome::Scope(report)).await.unwrap();
            }
        });

        let result = ResultAggregator::run(rx).await;
        producer.await.unwrap();
        assert_eq!(result.len(), 10);
        assert_eq!(result.scopes_completed, 10);
        assert!(!result.is_partial());
    }
}
