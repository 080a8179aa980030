//! Store capability surface.
//!
//! The adapters in `source` only ever talk to a store through these traits:
//!
//! - [`StoreClient`]: evaluate a terminal scalar (`Count`, `First`, `Last`,
//!   `Aggregate`) over a composed stream
//! - [`QueryableStore`]: materialize a stream with native skip / take
//! - [`PagedStore`]: materialize one page at a time, resumable with an opaque
//!   continuation token
//!
//! Concrete drivers live outside this crate; [`memory::MemoryStore`] is the
//! in-process implementation.

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cancel::CancellationToken;
use crate::error::StoreError;
use crate::query::stream::{QueryStream, ScalarOp};

pub use memory::MemoryStore;

#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Evaluate `op` over `stream`. `None` when `First`/`Last`/`Min`/`Max`/`Average`
    /// found nothing to return.
    async fn scalar(
        &self,
        stream: &QueryStream,
        op: &ScalarOp,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>, StoreError>;
}

/// Stores with native skip, take and last.
#[async_trait]
pub trait QueryableStore: StoreClient {
    async fn fetch(
        &self,
        stream: &QueryStream,
        cancel: &CancellationToken,
    ) -> Result<Vec<Value>, StoreError>;
}

/// Cursor-paginated stores without native skip.
#[async_trait]
pub trait PagedStore: StoreClient {
    /// Fetch the page starting at `feed.request_continuation`.
    async fn fetch_page(
        &self,
        stream: &QueryStream,
        feed: &FeedOptions,
        cancel: &CancellationToken,
    ) -> Result<ContinuedResults<Value>, StoreError>;
}

/// Per-request options for a paged query.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedOptions {
    /// Upper bound on items per page; `-1` lets the store decide.
    pub max_item_count: i32,
    pub enable_scan_in_query: bool,
    pub enable_cross_partition_query: bool,
    pub partition_key: Option<String>,
    pub request_continuation: Option<String>,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            max_item_count: -1,
            enable_scan_in_query: false,
            enable_cross_partition_query: false,
            partition_key: None,
            request_continuation: None,
        }
    }
}

impl FeedOptions {
    /// Same options, resuming at `token`.
    pub fn resume(&self, token: Option<String>) -> Self {
        Self {
            request_continuation: token,
            ..self.clone()
        }
    }

    /// The per-page bound, or `None` when unbounded.
    pub fn page_limit(&self) -> Option<usize> {
        usize::try_from(self.max_item_count).ok().filter(|n| *n > 0)
    }
}

/// One page of a paged query. An absent or empty token means the feed is exhausted.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuedResults<T> {
    pub continuation_token: Option<String>,
    pub results: Vec<T>,
}

impl<T> ContinuedResults<T> {
    pub fn has_more(&self) -> bool {
        self.continuation_token
            .as_deref()
            .map_or(false, |t| !t.is_empty())
    }
}

/// Read consistency requested per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConsistencyLevel {
    Strong,
    BoundedStaleness,
    #[default]
    Session,
    Eventual,
    ConsistentPrefix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionMode {
    Gateway,
    #[default]
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Protocol {
    Https,
    #[default]
    Tcp,
}

/// How a client reaches a paged store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionPolicy {
    pub connection_mode: ConnectionMode,
    pub connection_protocol: Protocol,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_page_limit() {
        assert_eq!(FeedOptions::default().page_limit(), None);
        let feed = FeedOptions {
            max_item_count: 7,
            ..Default::default()
        };
        assert_eq!(feed.page_limit(), Some(7));
        let feed = FeedOptions {
            max_item_count: 0,
            ..Default::default()
        };
        assert_eq!(feed.page_limit(), None);
    }

    #[test]
    fn test_resume_keeps_options() {
        let feed = FeedOptions {
            max_item_count: 3,
            enable_cross_partition_query: true,
            ..Default::default()
        };
        let next = feed.resume(Some("abc".into()));
        assert_eq!(next.request_continuation.as_deref(), Some("abc"));
        assert_eq!(next.max_item_count, 3);
        assert!(next.enable_cross_partition_query);
    }

    #[test]
    fn test_has_more() {
        let page: ContinuedResults<Value> = ContinuedResults {
            continuation_token: Some(String::new()),
            results: vec![],
        };
        assert!(!page.has_more());
        let page: ContinuedResults<Value> = ContinuedResults {
            continuation_token: Some("t".into()),
            results: vec![],
        };
        assert!(page.has_more());
    }

    #[test]
    fn test_connection_defaults() {
        let policy = ConnectionPolicy::default();
        assert_eq!(policy.connection_mode, ConnectionMode::Direct);
        assert_eq!(policy.connection_protocol, Protocol::Tcp);
        assert_eq!(ConsistencyLevel::default(), ConsistencyLevel::Session);
    }
}
