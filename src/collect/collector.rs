//! Collector
//!
//! Walks every account, fans out over sub-scopes with a bounded worker pool
//! and funnels each scope's rows into a single aggregator.
//!
//! Failure containment:
//! - session or sub-scope discovery failure skips that account only
//! - a page error stops that scope's pagination, rows already read are kept
//! - a resource that cannot become a row is skipped, the page continues

use super::aggregate::{Outcome, ResultAggregator, ResultSet, ScopeReport};
use super::scope::{Account, ScopeContext};
use super::source::{Connected, ResourceSource};
use crate::error::TableError;
use crate::table::{flatten, project, ColumnSchema, FlatRow, Flatten, FlattenOptions};
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Default number of scope workers running at once
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Buffered scope reports between workers and the aggregator
const CHANNEL_CAPACITY: usize = 64;

/// Orchestrates one table-generation call
#[derive(Debug, Clone)]
pub struct Collector {
    max_concurrency: usize,
    cancel: CancellationToken,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

impl Collector {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop launching workers and abandon in-flight pagination once `token` fires
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Collect rows for `schema` across `accounts`
    ///
    /// An empty account list means the single implicit default account.
    /// Returns only after every account has been processed or skipped.
    pub async fn collect<S: ResourceSource>(
        &self,
        source: Arc<S>,
        schema: Arc<ColumnSchema>,
        accounts: &[Account],
    ) -> ResultSet {
        let default_account = [Account::default()];
        let accounts = if accounts.is_empty() {
            &default_account[..]
        } else {
            accounts
        };

        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("collect", table = schema.table(), run = %run_id);

        async {
            let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
            let producer = self.produce(source, Arc::clone(&schema), accounts, tx);
            let ((), result) = tokio::join!(producer, ResultAggregator::run(rx));

            tracing::info!(
                rows = result.len(),
                errors = result.errors.len(),
                incomplete = result.scopes_incomplete.len(),
                "table generation finished"
            );
            result
        }
        .instrument(span)
        .await
    }

    async fn produce<S: ResourceSource>(
        &self,
        source: Arc<S>,
        schema: Arc<ColumnSchema>,
        accounts: &[Account],
        tx: mpsc::Sender<Outcome>,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        for account in accounts {
            if self.cancel.is_cancelled() {
                tracing::warn!(
                    account = account.label(),
                    "cancelled, remaining accounts not processed"
                );
                break;
            }
            self.collect_account(&source, &schema, account, &semaphore, &tx)
                .await;
        }
        // `tx` drops here, which ends the aggregator loop
    }

    async fn collect_account<S: ResourceSource>(
        &self,
        source: &Arc<S>,
        schema: &Arc<ColumnSchema>,
        account: &Account,
        semaphore: &Arc<Semaphore>,
        tx: &mpsc::Sender<Outcome>,
    ) {
        tracing::info!(account = account.label(), "processing account");

        let connected = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            connected = source.connect(account) => Some(connected),
        };
        let Some(connected) = connected else {
            tracing::warn!(account = account.label(), "cancelled while establishing session");
            return;
        };
        let Connected { scope, session } = match connected {
            Ok(connected) => connected,
            Err(e) => {
                tracing::error!(
                    account = account.label(),
                    error = %format!("{:#}", e),
                    "failed to establish session"
                );
                let _ = tx
                    .send(Outcome::Failed(TableError::Session {
                        account: account.label().to_string(),
                        source: e,
                    }))
                    .await;
                return;
            }
        };

        let scopes = match source.sub_scope_kind() {
            None => vec![scope.clone()],
            Some(kind) => {
                let listed = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    listed = source.list_sub_scopes(&session, &scope) => Some(listed),
                };
                let Some(listed) = listed else {
                    tracing::warn!(account = %scope.account_id, "cancelled while listing {}", kind);
                    return;
                };
                match listed {
                    Ok(scopes) => {
                        tracing::info!(
                            account = %scope.account_id,
                            count = scopes.len(),
                            "discovered {}",
                            kind
                        );
                        scopes
                    }
                    Err(e) => {
                        tracing::error!(
                            account = %scope.account_id,
                            error = %format!("{:#}", e),
                            "failed to list {}",
                            kind
                        );
                        let _ = tx
                            .send(Outcome::Failed(TableError::ScopeEnumeration {
                                account: scope.account_id.clone(),
                                kind,
                                source: e,
                            }))
                            .await;
                        return;
                    }
                }
            }
        };

        let session = Arc::new(session);
        let mut workers = JoinSet::new();
        let mut labels: HashMap<Id, String> = HashMap::new();

        for worker_scope in scopes {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                permit = Arc::clone(semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                tracing::warn!(
                    account = %scope.account_id,
                    "cancelled, remaining scopes not launched"
                );
                break;
            };

            let label = worker_scope.label();
            let source = Arc::clone(source);
            let session = Arc::clone(&session);
            let schema = Arc::clone(schema);
            let cancel = self.cancel.clone();
            let tx = tx.clone();

            let handle = workers.spawn(async move {
                let _permit = permit;
                let report =
                    run_scope(source.as_ref(), session.as_ref(), worker_scope, &schema, &cancel)
                        .await;
                let _ = tx.send(Outcome::Scope(report)).await;
            });
            labels.insert(handle.id(), label);
        }

        // Join barrier: the account is done only when all its workers are
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                let label = labels.remove(&e.id()).unwrap_or_else(|| scope.label());
                tracing::error!(scope = %label, error = %e, "scope worker terminated abnormally");
                let _ = tx
                    .send(Outcome::Failed(TableError::Worker {
                        scope: label,
                        message: e.to_string(),
                    }))
                    .await;
            }
        }
    }
}

/// Paginate one scope to exhaustion, first page error, or cancellation
async fn run_scope<S: ResourceSource>(
    source: &S,
    session: &S::Session,
    scope: ScopeContext,
    schema: &ColumnSchema,
    cancel: &CancellationToken,
) -> ScopeReport {
    let options = source.flatten_options();
    let label = scope.label();
    let mut rows = Vec::new();
    let mut errors = Vec::new();
    let mut cursor: Option<String> = None;

    let completed = loop {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            fetched = source.fetch_page(session, &scope, cursor.take()) => Some(fetched),
        };
        let Some(fetched) = fetched else {
            tracing::warn!(scope = %label, rows = rows.len(), "cancelled during pagination");
            break false;
        };

        match fetched {
            Ok(page) => {
                for item in &page.items {
                    match to_row(item, &options, schema, &scope) {
                        Ok(row) => rows.push(row),
                        Err(e) => {
                            tracing::warn!(scope = %label, error = %e, "skipping resource");
                            errors.push(TableError::Record {
                                scope: label.clone(),
                                source: e,
                            });
                        }
                    }
                }
                match page.next_token {
                    Some(token) => cursor = Some(token),
                    None => break true,
                }
            }
            Err(e) => {
                tracing::error!(
                    scope = %label,
                    rows = rows.len(),
                    error = %format!("{:#}", e),
                    "failed to get resource page, stopping scope"
                );
                errors.push(TableError::PageFetch {
                    scope: label.clone(),
                    rows_kept: rows.len(),
                    source: e,
                });
                break false;
            }
        }
    };

    ScopeReport {
        scope,
        rows,
        errors,
        completed,
    }
}

/// Flatten and project one resource, raw or typed
pub fn to_row<T: Flatten + ?Sized>(
    item: &T,
    options: &FlattenOptions,
    schema: &ColumnSchema,
    scope: &ScopeContext,
) -> Result<FlatRow> {
    let raw = item.to_raw().context("resource could not be serialized")?;
    if !raw.is_object() {
        bail!("resource is not an object: {}", describe(&raw));
    }
    Ok(project(&flatten(&raw, options), schema, scope))
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect::{Page, ProviderKind};
    use serde_json::json;

    #[test]
    fn test_to_row_rejects_non_objects() {
        let schema = ColumnSchema::new("t", ["id"]).unwrap();
        let scope = ScopeContext::account(ProviderKind::Gcp, "p");
        let err = to_row(&json!("oops"), &FlattenOptions::default(), &schema, &scope).unwrap_err();
        assert!(err.to_string().contains("string"));
        assert!(to_row(&json!({"id": "1"}), &FlattenOptions::default(), &schema, &scope).is_ok());
    }

    #[test]
    fn test_typed_resource_becomes_row() {
        #[derive(serde::Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Disk {
            name: String,
            size_gb: u64,
        }

        let schema = ColumnSchema::new("t", ["project_id", "name", "size_gb"]).unwrap();
        let scope = ScopeContext::account(ProviderKind::Gcp, "p");
        let disk = Disk {
            name: "boot".to_string(),
            size_gb: 10,
        };
        let row = to_row(&disk, &FlattenOptions::default(), &schema, &scope).unwrap();
        assert_eq!(row["size_gb"], "10");
        assert_eq!(row["project_id"], "p");
    }

    #[test]
    fn test_zero_concurrency_is_clamped() {
        assert_eq!(Collector::new(0).max_concurrency(), 1);
        assert_eq!(Collector::default().max_concurrency(), DEFAULT_MAX_CONCURRENCY);
    }

    /// Account-level source that serves a fixed list of pages
    struct Pages(Vec<Result<Page, String>>);

    #[async_trait::async_trait]
    impl ResourceSource for Pages {
        type Session = ();

        async fn connect(&self, account: &Account) -> Result<Connected<()>> {
            Ok(Connected {
                scope: ScopeContext::account(ProviderKind::Gcp, account.label()),
                session: (),
            })
        }

        fn sub_scope_kind(&self) -> Option<crate::collect::SubScopeKind> {
            None
        }

        async fn list_sub_scopes(&self, _: &(), _: &ScopeContext) -> Result<Vec<ScopeContext>> {
            Ok(vec![])
        }

        async fn fetch_page(
            &self,
            _: &(),
            _: &ScopeContext,
            cursor: Option<String>,
        ) -> Result<Page> {
            let idx: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
            match &self.0[idx] {
                Ok(page) => Ok(page.clone()),
                Err(msg) => Err(anyhow::anyhow!(msg.clone())),
            }
        }
    }

    #[tokio::test]
    async fn test_page_error_keeps_earlier_rows() {
        let source = Pages(vec![
            Ok(Page::with_next(vec![json!({"id": "a"}), json!({"id": "b"})], "1")),
            Err("HTTP 503".to_string()),
            Ok(Page::last(vec![json!({"id": "never"})])),
        ]);
        let schema = Arc::new(ColumnSchema::new("t", ["project_id", "id"]).unwrap());

        let result = Collector::default()
            .collect(Arc::new(source), schema, &[Account::new("proj-a")])
            .await;

        assert_eq!(result.len(), 2);
        assert_eq!(result.scopes_incomplete, vec!["proj-a".to_string()]);
        assert!(matches!(
            result.errors.as_slice(),
            [TableError::PageFetch { rows_kept: 2, .. }]
        ));
    }

    #[tokio::test]
    async fn test_bad_record_is_skipped() {
        let source = Pages(vec![Ok(Page::last(vec![
            json!({"id": "a"}),
            json!(null),
            json!({"id": "c"}),
        ]))]);
        let schema = Arc::new(ColumnSchema::new("t", ["id"]).unwrap());

        let result = Collector::default()
            .collect(Arc::new(source), schema, &[])
            .await;

        let ids: Vec<&str> = result.rows.iter().map(|r| r["id"].as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(result.scopes_completed, 1);
        assert!(matches!(result.errors.as_slice(), [TableError::Record { .. }]));
    }

    #[tokio::test]
    async fn test_default_account_is_used_when_none_configured() {
        let source = Pages(vec![Ok(Page::last(vec![json!({"id": "a"})]))]);
        let schema = Arc::new(ColumnSchema::new("t", ["project_id", "id"]).unwrap());

        let result = Collector::default()
            .collect(Arc::new(source), schema, &[])
            .await;

        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0]["project_id"], "default");
    }
}
