//! Session-style document store with native skip, take and last.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::info;

use super::{collection_or_default, convert_rows, require_rows, DataSource, Document};
use crate::cancel::CancellationToken;
use crate::error::{DataSourceError, Result};
use crate::query::stream::{QueryStream, ScalarOp, Scope};
use crate::query::types::DataQuery;
use crate::store::QueryableStore;

pub struct RavenDbDataSource<T, S> {
    store: Arc<S>,
    collection_id: String,
    index_name: Option<String>,
    is_map_reduce: bool,
    _document: PhantomData<fn() -> T>,
}

impl<T: Document, S: QueryableStore> RavenDbDataSource<T, S> {
    pub fn new(store: Arc<S>, collection_id: Option<String>) -> Self {
        let collection_id = collection_or_default::<T>(collection_id);
        info!(collection = %collection_id, "raven data source");
        Self {
            store,
            collection_id,
            index_name: None,
            is_map_reduce: false,
            _document: PhantomData,
        }
    }

    /// Query through a named index instead of the raw collection. A blank name
    /// keeps the collection query.
    pub fn with_index(mut self, index_name: impl Into<String>, is_map_reduce: bool) -> Self {
        let index_name = index_name.into();
        self.index_name = Some(index_name).filter(|n| !n.trim().is_empty());
        self.is_map_reduce = is_map_reduce;
        self
    }

    pub fn index_name(&self) -> Option<&str> {
        self.index_name.as_deref()
    }
}

#[async_trait]
impl<T: Document, S: QueryableStore> DataSource for RavenDbDataSource<T, S> {
    fn supports_last(&self) -> bool {
        true
    }

    fn primary_key(&self) -> &str {
        T::PRIMARY_KEY
    }

    fn scope(&self) -> Scope {
        Scope {
            index_name: self.index_name.clone(),
            is_map_reduce: self.is_map_reduce,
            ..Scope::collection(&self.collection_id)
        }
    }

    async fn execute_scalar(
        &self,
        stream: &QueryStream,
        op: &ScalarOp,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>> {
        self.store
            .scalar(stream, op, cancel)
            .await
            .map_err(DataSourceError::from_store)
    }

    async fn load_select<R>(&self, q: &DataQuery, cancel: &CancellationToken) -> Result<Vec<R>>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let stream = self.get_query(q);
        let rows = self
            .store
            .fetch(&stream, cancel)
            .await
            .map_err(DataSourceError::from_store)?;
        require_rows(convert_rows(rows)?, &stream.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::{params, seeded_store, TestDocument};
    use crate::store::MemoryStore;
    use serde_json::json;

    async fn source() -> RavenDbDataSource<TestDocument, MemoryStore> {
        let store = seeded_store(MemoryStore::new(), &Scope::collection("TestDocument")).await;
        RavenDbDataSource::new(Arc::new(store), None)
    }

    async fn aggregate(source: &RavenDbDataSource<TestDocument, MemoryStore>, include: &str) -> Option<Value> {
        let request = crate::query::request::parse_aggregate(include);
        source
            .select_aggregate(&DataQuery::new(), &request.name, &request.args, &CancellationToken::new())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_greater_than() {
        let source = source().await;
        let q = params(&[("NumberGreaterThan", "5")]);
        let docs: Vec<TestDocument> = source.load_select(&q, &CancellationToken::new()).await.unwrap();
        assert_eq!(docs.len(), 4);
        assert_eq!(docs[0].number, 6);
    }

    #[tokio::test]
    async fn test_string_operators_with_numeric_text() {
        let source = source().await;
        let cancel = CancellationToken::new();
        for (key, value, expected) in [
            ("NameEndsWith", "9", vec![9]),
            ("NameContains", "5", vec![5]),
            ("NameStartsWith", "TestExample1", vec![1]),
            ("Number", "3", vec![3]),
            ("NumberIn", "2,4", vec![2, 4]),
        ] {
            let q = params(&[(key, value)]);
            let docs: Vec<TestDocument> = source.load_select(&q, &cancel).await.unwrap();
            let numbers: Vec<i64> = docs.iter().map(|d| d.number).collect();
            assert_eq!(numbers, expected, "{}={}", key, value);
        }
    }

    #[tokio::test]
    async fn test_skip_take_order_by() {
        let source = source().await;
        let q = params(&[("Skip", "2"), ("Take", "5"), ("OrderBy", "Name")]);
        let docs: Vec<TestDocument> = source.load_select(&q, &CancellationToken::new()).await.unwrap();
        assert_eq!(docs.len(), 5);
        assert_eq!(docs[0].number, 2);
        assert_eq!(docs[4].number, 6);
    }

    #[tokio::test]
    async fn test_aggregates() {
        let source = source().await;
        assert_eq!(aggregate(&source, "SUM(Number) NumberSum").await, Some(json!(45)));
        assert_eq!(aggregate(&source, "AVG(Number) NumberAvg").await, Some(json!(4.5)));
        assert_eq!(aggregate(&source, "MIN(Number)").await, Some(json!(0)));
        assert_eq!(aggregate(&source, "MAX(Number)").await, Some(json!(9)));
        assert_eq!(aggregate(&source, "COUNT(*)").await, Some(json!(10)));
        assert_eq!(aggregate(&source, "FIRST(Name) FirstName").await, Some(json!("TestExample0")));
        assert_eq!(aggregate(&source, "LAST(Name) LastName").await, Some(json!("TestExample9")));
        assert_eq!(aggregate(&source, "MEDIAN(Number)").await, None);
    }

    #[tokio::test]
    async fn test_count_matches_materialized_rows() {
        let source = source().await;
        let cancel = CancellationToken::new();
        let q = params(&[("NameStartsWith", "TestExample"), ("NumberLessThan", "7")]);
        let docs: Vec<TestDocument> = source.load_select(&q, &cancel).await.unwrap();
        assert_eq!(source.count(&q, &cancel).await.unwrap(), docs.len() as u64);
    }

    #[tokio::test]
    async fn test_empty_result_is_not_found() {
        let source = source().await;
        let q = params(&[("NumberGreaterThan", "50")]);
        let err = source
            .load_select::<TestDocument>(&q, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_index_scope() {
        let store = seeded_store(MemoryStore::new(), &Scope::collection("TestDocument")).await;
        store.define_index("TestDocuments/ByName").await;
        let source: RavenDbDataSource<TestDocument, _> =
            RavenDbDataSource::new(Arc::new(store), None).with_index("TestDocuments/ByName", true);

        let scope = source.scope();
        assert_eq!(scope.index_name.as_deref(), Some("TestDocuments/ByName"));
        assert!(scope.is_map_reduce);

        let docs: Vec<TestDocument> = source
            .load_select(&DataQuery::new(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(docs.len(), 10);

        let blank: RavenDbDataSource<TestDocument, MemoryStore> =
            RavenDbDataSource::new(Arc::new(MemoryStore::new()), None).with_index("  ", false);
        assert_eq!(blank.index_name(), None);
    }
}
