//! Offset emulation over cursor-paginated stores.
//!
//! The store is asked for one page at a time; each page names the token for the
//! next. Pages are exposed as a lazy stream and folded into the final result:
//! a counter starting at `-offset` drops items while it is negative, so the
//! caller sees the same rows a native `Skip(offset)` would have produced.

use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;
use tracing::debug;

use crate::cancel::CancellationToken;
use crate::error::{DataSourceError, Result};
use crate::query::stream::QueryStream;
use crate::store::{FeedOptions, PagedStore};

/// Lazily fetch pages of `query`, starting at `feed.request_continuation`.
///
/// Cancellation is checked before every page. The stream ends after the first
/// page without a continuation token.
pub fn pages<'a, S>(
    store: &'a S,
    query: &'a QueryStream,
    feed: FeedOptions,
    cancel: &'a CancellationToken,
) -> impl Stream<Item = Result<Vec<Value>>> + Send + 'a
where
    S: PagedStore + ?Sized,
{
    stream::try_unfold((Some(feed), 0usize), move |(next, page_no)| async move {
        let Some(feed) = next else {
            return Ok(None);
        };
        if cancel.is_cancelled() {
            debug!(page = page_no, "paging cancelled");
            return Err(DataSourceError::Cancelled);
        }

        let page = store
            .fetch_page(query, &feed, cancel)
            .await
            .map_err(DataSourceError::from_store)?;

        debug!(
            page = page_no,
            items = page.results.len(),
            more = page.has_more(),
            "fetched page"
        );

        let next = if page.has_more() {
            Some(feed.resume(page.continuation_token))
        } else {
            None
        };
        Ok(Some((page.results, (next, page_no + 1))))
    })
}

/// Fetch every page and drop the first `offset` items.
pub async fn collect<S>(
    store: &S,
    query: &QueryStream,
    feed: FeedOptions,
    offset: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Value>>
where
    S: PagedStore + ?Sized,
{
    let start = -i64::try_from(offset).unwrap_or(i64::MAX);

    let (_, items) = pages(store, query, feed, cancel)
        .try_fold((start, Vec::new()), |(mut counter, mut kept), page| async move {
            for item in page {
                if counter >= 0 {
                    kept.push(item);
                }
                counter = counter.saturating_add(1);
            }
            Ok((counter, kept))
        })
        .await?;

    Ok(items)
}
