//! Backend-agnostic query translation.
//!
//! A store-independent [`DataQuery`] is compiled into a [`QueryStream`] and run
//! through a [`DataSource`] adapter against stores of uneven capability: some
//! skip natively, some only page behind continuation tokens, some lack a
//! native "last".

pub mod cancel;
pub mod config;
pub mod error;
pub mod export;
pub mod expr;
pub mod query;
pub mod source;
pub mod store;

pub use cancel::CancellationToken;
pub use error::{DataSourceError, ExprError, Result, StoreError, StoreErrorKind};
pub use query::{
    parse_request, parse_request_with_fields, AggregateRequest, Condition, ConditionOp, DataQuery,
    OrderBy, QueryRequest, QueryStream, QueryTerm,
};
pub use source::{CosmosDbDataSource, DataSource, Document, MongoDbDataSource, RavenDbDataSource};
pub use store::{FeedOptions, MemoryStore, PagedStore, QueryableStore, StoreClient};
