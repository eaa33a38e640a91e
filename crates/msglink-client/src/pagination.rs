//! Cursor-driven enumeration of server-side result sets.
//!
//! The server hands back at most one page per request together with a
//! continuation cursor; cursor [`END_CURSOR`] means there is nothing left.
//! Enumeration is a lazy stream: a page is requested only when the consumer
//! has drained the previous one.
//!
//! There is no cap on the number of pages. A server that never returns
//! [`END_CURSOR`] keeps the stream going for as long as it is polled;
//! consumers that need a bound apply one themselves (`take`, a deadline).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, Stream, TryStreamExt};
use tracing::debug;

use msglink_protocol::{Command, TroopMemberEntry, TroopMemberListResponse};

use crate::dispatcher::{CallOptions, RequestDispatcher};
use crate::error::{ClientError, ClientResult};

/// Cursor value signalling the last page.
pub const END_CURSOR: u64 = 0;

/// Default time to wait for each page.
pub const DEFAULT_PAGE_TIMEOUT: Duration = Duration::from_millis(3000);

/// One page of records and the cursor for the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<R> {
    pub records: Vec<R>,
    pub next: u64,
}

/// A response that is one page of a larger result set.
pub trait Paged {
    type Record;

    fn into_page(self) -> Page<Self::Record>;
}

impl Paged for TroopMemberListResponse {
    type Record = TroopMemberEntry;

    fn into_page(self) -> Page<TroopMemberEntry> {
        Page {
            records: self.members,
            next: self.next_uin,
        }
    }
}

/// Flattens the pages produced by `page_request` into one stream of records.
///
/// `page_request` is called with `initial_cursor` first, then with each
/// page's `next` cursor until a page reports [`END_CURSOR`]. The first error
/// is yielded and ends the stream; records yielded before it stay valid.
pub fn paginate<R, F, Fut>(
    initial_cursor: u64,
    mut page_request: F,
) -> impl Stream<Item = ClientResult<R>> + Send
where
    R: Send,
    F: FnMut(u64) -> Fut + Send,
    Fut: Future<Output = ClientResult<Page<R>>> + Send,
{
    stream::try_unfold(Some(initial_cursor), move |cursor| {
        let request = cursor.map(&mut page_request);
        async move {
            let Some(request) = request else {
                return Ok::<_, ClientError>(None);
            };
            let page = request.await?;
            let next = (page.next != END_CURSOR).then_some(page.next);
            Ok(Some((page.records, next)))
        }
    })
    .map_ok(|records| stream::iter(records.into_iter().map(Ok::<R, ClientError>)))
    .try_flatten()
}

/// Enumerates paginated queries through a [`RequestDispatcher`].
#[derive(Debug, Clone)]
pub struct PaginatedFetcher {
    dispatcher: Arc<RequestDispatcher>,
    options: CallOptions,
}

impl PaginatedFetcher {
    /// Creates a fetcher issuing each page request with `options`.
    pub fn new(dispatcher: Arc<RequestDispatcher>, options: CallOptions) -> Self {
        Self {
            dispatcher,
            options,
        }
    }

    /// Returns the per-page call options.
    pub fn options(&self) -> CallOptions {
        self.options
    }

    /// Streams every record of the query built by `make_request`.
    ///
    /// `make_request` turns a cursor into the page request for it.
    pub fn fetch_all<C, F>(
        &self,
        initial_cursor: u64,
        mut make_request: F,
    ) -> impl Stream<Item = ClientResult<<C::Response as Paged>::Record>> + Send + use<C, F>
    where
        C: Command + Send + Sync + 'static,
        C::Response: Paged + Send,
        <C::Response as Paged>::Record: Send,
        F: FnMut(u64) -> C + Send,
    {
        let dispatcher = Arc::clone(&self.dispatcher);
        let options = self.options;
        paginate(initial_cursor, move |cursor| {
            let dispatcher = Arc::clone(&dispatcher);
            let request = make_request(cursor);
            async move {
                debug!(command = C::NAME, cursor, "requesting page");
                let page = dispatcher.send_and_expect(&request, options).await?.into_page();
                debug!(
                    command = C::NAME,
                    records = page.records.len(),
                    next = page.next,
                    "page received"
                );
                Ok(page)
            }
        })
    }
}
