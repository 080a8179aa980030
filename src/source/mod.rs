//! Data source adapters.
//!
//! A [`DataSource`] turns a [`DataQuery`] into a composed [`QueryStream`] and
//! runs it against its store. The trait carries the shared behavior as default
//! methods; each adapter only says what is different about its store:
//!
//! | Adapter               | Store trait      | Skip | Last | Empty `load_select` |
//! |-----------------------|------------------|------|------|---------------------|
//! | `RavenDbDataSource`   | `QueryableStore` | yes  | yes  | not found           |
//! | `MongoDbDataSource`   | `QueryableStore` | yes  | no   | not found           |
//! | `CosmosDbDataSource`  | `PagedStore`     | no   | no   | empty list          |

pub mod aggregate;
pub mod cosmos;
pub mod mongo;
pub mod pager;
pub mod raven;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cancel::CancellationToken;
use crate::error::{DataSourceError, Result};
use crate::query::compiler::{apply_conditions, apply_limits, compose};
use crate::query::stream::{QueryStream, ScalarOp, Scope};
use crate::query::types::DataQuery;

pub use cosmos::CosmosDbDataSource;
pub use mongo::MongoDbDataSource;
pub use raven::RavenDbDataSource;

/// A document type stored in a named collection.
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Collection used when an adapter is not given one explicitly.
    const COLLECTION: &'static str;
    /// Field used to synthesize a deterministic order for FIRST / LAST.
    const PRIMARY_KEY: &'static str;
}

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Whether the store can take the true last element of a sorted stream.
    fn supports_last(&self) -> bool;

    /// Whether the store can skip leading elements itself.
    fn supports_skip(&self) -> bool {
        true
    }

    fn primary_key(&self) -> &str;

    /// The collection (and partition, index, ...) this adapter reads.
    fn scope(&self) -> Scope;

    /// Base stream for `q`, before any condition or limit.
    fn init_query(&self, _q: &DataQuery) -> QueryStream {
        QueryStream::new(self.scope())
    }

    /// Conditions, then sorting, then limits, then projection.
    fn get_query(&self, q: &DataQuery) -> QueryStream {
        let stream = compose(self.init_query(q), q);
        debug!(query = %stream, "composed query");
        stream
    }

    /// Evaluate a terminal operation on the store.
    async fn execute_scalar(
        &self,
        stream: &QueryStream,
        op: &ScalarOp,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>>;

    /// Number of rows matching `q`.
    ///
    /// Limits are applied *before* the conditions: the count is taken over the
    /// first `offset..offset + rows` stored rows that then pass the filter.
    async fn count(&self, q: &DataQuery, cancel: &CancellationToken) -> Result<u64> {
        let stream = apply_limits(self.init_query(q), q.offset, q.rows);
        let stream = apply_conditions(stream, &q.conditions);
        let count = self.execute_scalar(&stream, &ScalarOp::Count, cancel).await?;
        Ok(count.as_ref().and_then(Value::as_u64).unwrap_or(0))
    }

    /// Materialize `q` and convert each row into `R`.
    async fn load_select<R>(&self, q: &DataQuery, cancel: &CancellationToken) -> Result<Vec<R>>
    where
        R: DeserializeOwned + Send + 'static;

    /// Evaluate one aggregate. `Ok(None)` when `name` is not an aggregate or
    /// nothing matched.
    async fn select_aggregate(
        &self,
        q: &DataQuery,
        name: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Result<Option<Value>> {
        aggregate::select_aggregate(self, q, name, args, cancel).await
    }
}

/// Convert raw rows into the requested shape.
pub fn convert_rows<R: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<R>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_err(DataSourceError::from))
        .collect()
}

/// Not-found policy for adapters that treat an empty result as missing.
pub fn require_rows<R>(rows: Vec<R>, scope: &Scope) -> Result<Vec<R>> {
    if rows.is_empty() {
        warn!(collection = %scope.path(), "no results found");
        return Err(DataSourceError::NotFound("No results found.".into()));
    }
    Ok(rows)
}

/// Collection id override, falling back to the document's own collection.
pub(crate) fn collection_or_default<T: Document>(collection_id: Option<String>) -> String {
    collection_id
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| T::COLLECTION.to_string())
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use testing::TestDocument;

    #[test]
    fn test_convert_rows() {
        let rows = vec![json!({"Id": 1, "Name": "a", "Number": 1, "Extra": true})];
        let docs: Vec<TestDocument> = convert_rows(rows).unwrap();
        assert_eq!(docs[0].name, "a");

        let bad = vec![json!({"Id": "x"})];
        let err = convert_rows::<TestDocument>(bad).unwrap_err();
        assert!(matches!(err, DataSourceError::Conversion(_)));
    }

    #[test]
    fn test_require_rows() {
        let scope = Scope::collection("Docs");
        let err = require_rows(Vec::<Value>::new(), &scope).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "not found: No results found.");
        assert_eq!(require_rows(vec![1], &scope).unwrap(), vec![1]);
    }

    #[test]
    fn test_collection_or_default() {
        assert_eq!(collection_or_default::<TestDocument>(None), "TestDocument");
        assert_eq!(collection_or_default::<TestDocument>(Some(" ".into())), "TestDocument");
        assert_eq!(collection_or_default::<TestDocument>(Some("Docs".into())), "Docs");
    }
}
