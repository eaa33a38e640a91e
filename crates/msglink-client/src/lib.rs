//! Account session runtime: request dispatch, pagination, long messages, recall
//!
//! An [`AccountSession`] issues typed requests over one persistent connection
//! and correlates the responses that come back out of order. On top of the
//! [`RequestDispatcher`] it provides cursor-driven enumeration
//! ([`PaginatedFetcher`]), delivery of oversized messages through the upload
//! side channel ([`LongMessageTransfer`]) and message recall
//! ([`RecallProtocol`]).
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use msglink_client::{AccountSession, BroadcastEvents, ClientConfig, Collaborators};
//! # use msglink_client::{StaticRoster, UploadTransport, MessageSender};
//! # async fn run(
//! #     uploader: Arc<dyn UploadTransport>,
//! #     sender: Arc<dyn MessageSender>,
//! #     context: Arc<msglink_core::SessionContext>,
//! # ) -> msglink_client::ClientResult<()> {
//! let config = ClientConfig::load()?;
//! let collaborators = Collaborators {
//!     uploader,
//!     sender,
//!     roster: Arc::new(StaticRoster::new()),
//!     events: Arc::new(BroadcastEvents::default()),
//! };
//! let stream = tokio::net::TcpStream::connect("127.0.0.1:8080").await.map_err(
//!     |e| msglink_client::ClientError::Transport(e.into()),
//! )?;
//! let session = AccountSession::over_stream(context, stream, collaborators, &config);
//! for group in session.query_group_list().await? {
//!     println!("{} {}", group.group_code, group.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod long_message;
pub mod pagination;
pub mod recall;
pub mod roster;
pub mod session;
pub mod stream;
pub mod transport;

#[cfg(test)]
mod testing;

pub use config::{
    ClientConfig, DispatcherSettings, LoggingSettings, LongMessageSettings, PaginationSettings,
};
pub use dispatcher::{CallOptions, DEFAULT_TIMEOUT, RequestDispatcher};
pub use error::{ClientError, ClientResult, TransportError};
pub use events::{BroadcastEvents, EventSink, SessionEvent};
pub use long_message::{
    DEFAULT_LONG_MESSAGE_THRESHOLD, LongMessageReceipt, LongMessageTransfer, TransferState,
};
pub use pagination::{DEFAULT_PAGE_TIMEOUT, END_CURSOR, Page, PaginatedFetcher, Paged, paginate};
pub use recall::RecallProtocol;
pub use roster::{GroupRoster, Membership, StaticRoster};
pub use session::{AccountSession, Collaborators};
pub use stream::{DEFAULT_QUEUE_DEPTH, StreamTransport};
pub use transport::{
    BoxFuture, LONG_MESSAGE_COMMAND_ID, MessageReceipt, MessageSender, Transport,
    UploadRequest, UploadTicket, UploadTransport,
};
