//! Partitioned document store adapter.
//!
//! The store pages results behind continuation tokens and cannot skip, so:
//! - the native window is widened to `rows + offset` and no `Skip` is issued
//! - `load_select` drives the pager and drops the first `offset` rows itself
//! - FIRST / LAST take one row under the (inverted, for LAST) order, ignoring
//!   the query's offset and rows
//!
//! Without a partition key every query runs cross-partition.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

use super::{collection_or_default, convert_rows, pager, DataSource, Document};
use crate::cancel::CancellationToken;
use crate::error::{DataSourceError, Result};
use crate::query::compiler::{apply_conditions, apply_limits, apply_sorting, apply_specific_fields};
use crate::query::stream::{QueryStream, ScalarOp, Scope};
use crate::query::types::DataQuery;
use crate::store::{ConnectionPolicy, ConsistencyLevel, FeedOptions, PagedStore};

/// Per-request options sent with every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestOptions {
    pub consistency_level: ConsistencyLevel,
}

pub struct CosmosDbDataSource<T, S> {
    store: Arc<S>,
    database_id: String,
    collection_id: String,
    partition_key: Option<String>,
    connection_policy: ConnectionPolicy,
    request_options: RequestOptions,
    _document: PhantomData<fn() -> T>,
}

impl<T: Document, S: PagedStore> CosmosDbDataSource<T, S> {
    /// Fails when `database_id` is blank. A blank partition key means none.
    pub fn new(
        store: Arc<S>,
        database_id: &str,
        collection_id: Option<String>,
        partition_key: Option<String>,
    ) -> Result<Self> {
        if database_id.trim().is_empty() {
            return Err(DataSourceError::invalid_argument(
                "database_id",
                "must not be blank",
            ));
        }
        let collection_id = collection_or_default::<T>(collection_id);
        let partition_key = partition_key.filter(|k| !k.is_empty());
        info!(
            database = database_id,
            collection = %collection_id,
            partition = ?partition_key,
            "cosmos data source"
        );
        Ok(Self {
            store,
            database_id: database_id.to_string(),
            collection_id,
            partition_key,
            connection_policy: ConnectionPolicy::default(),
            request_options: RequestOptions::default(),
            _document: PhantomData,
        })
    }

    pub fn with_connection_policy(mut self, policy: ConnectionPolicy) -> Self {
        self.connection_policy = policy;
        self
    }

    pub fn with_request_options(mut self, options: RequestOptions) -> Self {
        self.request_options = options;
        self
    }

    pub fn connection_policy(&self) -> ConnectionPolicy {
        self.connection_policy
    }

    pub fn request_options(&self) -> RequestOptions {
        self.request_options
    }

    /// Feed options for `q`, resuming at `continuation` when given.
    pub fn feed_options(&self, q: &DataQuery, continuation: Option<String>) -> FeedOptions {
        let max_item_count = q
            .window()
            .map_or(-1, |window| i32::try_from(window).unwrap_or(i32::MAX));
        FeedOptions {
            max_item_count,
            enable_scan_in_query: true,
            enable_cross_partition_query: self.partition_key.is_none(),
            partition_key: self.partition_key.clone(),
            request_continuation: continuation.filter(|t| !t.is_empty()),
        }
    }
}

#[async_trait]
impl<T: Document, S: PagedStore> DataSource for CosmosDbDataSource<T, S> {
    fn supports_last(&self) -> bool {
        false
    }

    fn supports_skip(&self) -> bool {
        false
    }

    fn primary_key(&self) -> &str {
        T::PRIMARY_KEY
    }

    fn scope(&self) -> Scope {
        Scope {
            partition_key: self.partition_key.clone(),
            consistency: Some(self.request_options.consistency_level),
            ..Scope::collection(&self.collection_id).in_database(&self.database_id)
        }
    }

    /// Conditions, sorting and projection, then `Take(rows + offset)`; never `Skip`.
    fn get_query(&self, q: &DataQuery) -> QueryStream {
        let stream = apply_conditions(self.init_query(q), &q.conditions);
        let stream = apply_sorting(stream, q.order_by.as_ref());
        let stream = apply_specific_fields(stream, q.fields());
        let stream = apply_limits(stream, None, q.window());
        debug!(query = %stream, "composed query");
        stream
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

    /// Pages through the whole window. An empty result is returned as is.
    async fn load_select<R>(&self, q: &DataQuery, cancel: &CancellationToken) -> Result<Vec<R>>
    where
        R: DeserializeOwned + Send + 'static,
    {
        let stream = self.get_query(q);
        let feed = self.feed_options(q, None);
        let rows = pager::collect(
            self.store.as_ref(),
            &stream,
            feed,
            q.offset.unwrap_or(0),
            cancel,
        )
        .await?;
        convert_rows(rows)
    }
}
