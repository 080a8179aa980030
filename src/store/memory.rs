//! In-memory store over JSON documents.
//!
//! Executes composed query streams in-process with the `expr` evaluator and
//! implements both the native (`QueryableStore`) and the cursor-paginated
//! (`PagedStore`) surfaces, so every adapter can run against it.
//!
//! Collections are keyed by `Scope::path()` (`database/collection`). Reading a
//! collection that was never provisioned fails with `NotFound`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ContinuedResults, FeedOptions, PagedStore, QueryableStore, StoreClient};
use crate::cancel::CancellationToken;
use crate::error::{StoreError, StoreErrorKind};
use crate::expr::{self, FieldPath};
use crate::query::stream::{QueryStream, ScalarOp, Scope, Stage};

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 100;

pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    indexes: RwLock<HashSet<String>>,
    page_size: usize,
    partition_field: Option<String>,
    latency: Option<Duration>,
}

/// Resume position encoded into continuation tokens.
#[derive(Debug, Serialize, Deserialize)]
struct Continuation {
    position: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashSet::new()),
            page_size: DEFAULT_PAGE_SIZE,
            partition_field: None,
            latency: None,
        }
    }

    /// Cap on items per page. Zero is treated as one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Route partition-scoped queries by this document field.
    pub fn with_partition_field(mut self, field: impl Into<String>) -> Self {
        self.partition_field = Some(field.into());
        self
    }

    /// Delay every round-trip, to exercise cancellation between pages.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Create the collection if missing. Returns `true` when it was created.
    pub async fn ensure_collection(&self, scope: &Scope) -> bool {
        let mut collections = self.collections.write().await;
        let path = scope.path();
        if collections.contains_key(&path) {
            return false;
        }
        debug!(collection = %path, "provisioning collection");
        collections.insert(path, Vec::new());
        true
    }

    /// Append documents, provisioning the collection on demand.
    pub async fn insert<I>(&self, scope: &Scope, docs: I)
    where
        I: IntoIterator<Item = Value>,
    {
        let mut collections = self.collections.write().await;
        collections.entry(scope.path()).or_default().extend(docs);
    }

    /// Register a named index so queries scoped to it resolve.
    pub async fn define_index(&self, name: impl Into<String>) {
        self.indexes.write().await.insert(name.into());
    }

    pub async fn document_count(&self, scope: &Scope) -> Option<usize> {
        self.collections.read().await.get(&scope.path()).map(Vec::len)
    }

    async fn round_trip(&self, cancel: &CancellationToken) -> Result<(), StoreError> {
        cancel.check()?;
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
            cancel.check()?;
        }
        Ok(())
    }

    /// Documents visible to `scope`, narrowed to `partition_key` when routing is on.
    async fn load(
        &self,
        scope: &Scope,
        partition_key: Option<&str>,
    ) -> Result<Vec<Value>, StoreError> {
        if let Some(index) = &scope.index_name {
            if !self.indexes.read().await.contains(index) {
                return Err(StoreError::not_found(format!("index '{}'", index)));
            }
        }

        let path = scope.path();
        let docs = self
            .collections
            .read()
            .await
            .get(&path)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("collection '{}'", path)))?;

        match (&self.partition_field, partition_key) {
            (Some(field), Some(key)) => {
                let field = FieldPath::dotted(field);
                Ok(docs
                    .into_iter()
                    .filter(|doc| expr::resolve(doc, &field).map(partition_value).as_deref() == Some(key))
                    .collect())
            }
            _ => Ok(docs),
        }
    }

    async fn execute(
        &self,
        stream: &QueryStream,
        partition_key: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, StoreError> {
        self.round_trip(cancel).await?;
        debug!(query = %stream, "executing");
        let docs = self.load(&stream.scope, partition_key).await?;
        run_stages(docs, &stream.stages)
    }
}

fn partition_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Apply stages in composition order.
pub fn run_stages(mut docs: Vec<Value>, stages: &[Stage]) -> Result<Vec<Value>, StoreError> {
    for stage in stages {
        match stage {
            Stage::Where(predicate) => {
                let expr = expr::parse_predicate(&predicate.text)?;
                docs.retain(|doc| expr::matches(&expr, doc, &predicate.params));
            }
            Stage::OrderBy(ordering) => {
                let keys = expr::parse_ordering(&ordering.0)?;
                expr::sort_documents(&mut docs, &keys);
            }
            Stage::Skip(n) => {
                let n = (*n).min(docs.len());
                docs.drain(..n);
            }
            Stage::Take(n) => docs.truncate(*n),
            Stage::Select(projection) => {
                let selector = expr::parse_projection(&projection.0)?;
                docs = docs.iter().map(|doc| expr::project(doc, &selector)).collect();
            }
        }
    }
    Ok(docs)
}

fn decode_token(token: Option<&str>) -> Result<usize, StoreError> {
    match token.filter(|t| !t.is_empty()) {
        None => Ok(0),
        Some(raw) => serde_json::from_str::<Continuation>(raw)
            .map(|c| c.position)
            .map_err(|_| {
                StoreError::new(
                    StoreErrorKind::InvalidContinuation,
                    format!("unrecognized continuation token '{}'", raw),
                )
            }),
    }
}

fn encode_token(position: usize) -> Result<String, StoreError> {
    serde_json::to_string(&Continuation { position })
        .map_err(|e| StoreError::backend(e.to_string()))
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn scalar(
        &self,
        stream: &QueryStream,
        op: &ScalarOp,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>, StoreError> {
        let mut docs = self
            .execute(stream, stream.scope.partition_key.as_deref(), cancel)
            .await?;
        debug!(op = %op, rows = docs.len(), "evaluating scalar");

        Ok(match op {
            ScalarOp::Count => Some(Value::from(docs.len() as u64)),
            ScalarOp::First => docs.into_iter().next(),
            ScalarOp::Last => docs.pop(),
            ScalarOp::Aggregate { func, field } => {
                let path = FieldPath::dotted(field);
                let values: Vec<Value> = docs
                    .iter()
                    .map(|doc| expr::resolve(doc, &path).cloned().unwrap_or(Value::Null))
                    .collect();
                expr::fold_aggregate(*func, &values)
            }
        })
    }
}

#[async_trait]
impl QueryableStore for MemoryStore {
    async fn fetch(
        &self,
        stream: &QueryStream,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, StoreError> {
        self.execute(stream, stream.scope.partition_key.as_deref(), cancel)
            .await
    }
}

#[async_trait]
impl PagedStore for MemoryStore {
    async fn fetch_page(
        &self,
        stream: &QueryStream,
        feed: &FeedOptions,
        cancel: &CancellationToken,
    ) -> Result<ContinuedResults<Value>, StoreError> {
        if stream.has_skip() {
            return Err(StoreError::unsupported(
                "Skip is not supported on a paged query",
            ));
        }

        let partition_key = feed
            .partition_key
            .as_deref()
            .or(stream.scope.partition_key.as_deref());
        if self.partition_field.is_some()
            && partition_key.is_none()
            && !feed.enable_cross_partition_query
        {
            return Err(StoreError::unsupported(
                "cross partition query is required but disabled",
            ));
        }

        let position = decode_token(feed.request_continuation.as_deref())?;
        let mut docs = self.execute(stream, partition_key, cancel).await?;
        if position > docs.len() {
            return Err(StoreError::new(
                StoreErrorKind::InvalidContinuation,
                format!("continuation past end of results ({})", position),
            ));
        }

        let page_len = feed
            .page_limit()
            .map_or(self.page_size, |limit| limit.min(self.page_size));
        let end = (position + page_len).min(docs.len());
        let continuation_token = if end < docs.len() {
            Some(encode_token(end)?)
        } else {
            None
        };

        docs.truncate(end);
        let results = docs.split_off(position);

        Ok(ContinuedResults {
            continuation_token,
            results,
        })
    }
}

/// Ten `TestExample{n}` documents numbered 0..9, split into even/odd categories.
#[cfg(test)]
pub(crate) fn sample_documents() -> Vec<Value> {
    (0..10)
        .map(|n| {
            serde_json::json!({
                "Id": n,
                "Name": format!("TestExample{}", n),
                "Number": n,
                "Category": if n % 2 == 0 { "even" } else { "odd" },
            })
        })
        .collect()
}
