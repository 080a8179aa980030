//! Document database adapter: native skip and take, no native last.

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

pub struct MongoDbDataSource<T, S> {
    store: Arc<S>,
    database_id: String,
    collection_id: String,
    _document: PhantomData<fn() -> T>,
}

impl<T: Document, S: QueryableStore> MongoDbDataSource<T, S> {
    /// Fails when `database_id` is blank.
    pub fn new(store: Arc<S>, database_id: &str, collection_id: Option<String>) -> Result<Self> {
        if database_id.trim().is_empty() {
            return Err(DataSourceError::invalid_argument(
                "database_id",
                "must not be blank",
            ));
        }
        let collection_id = collection_or_default::<T>(collection_id);
        info!(database = database_id, collection = %collection_id, "mongo data source");
        Ok(Self {
            store,
            database_id: database_id.to_string(),
            collection_id,
            _document: PhantomData,
        })
    }

    pub fn database_id(&self) -> &str {
        &self.database_id
    }
}

#[async_trait]
impl<T: Document, S: QueryableStore> DataSource for MongoDbDataSource<T, S> {
    fn supports_last(&self) -> bool {
        false
    }

    fn primary_key(&self) -> &str {
        T::PRIMARY_KEY
    }

    fn scope(&self) -> Scope {
        Scope::collection(&self.collection_id).in_database(&self.database_id)
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
