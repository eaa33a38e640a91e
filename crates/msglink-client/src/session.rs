//! The account session: one logical endpoint driving every operation.

use std::sync::Arc;

use futures_util::stream::{Stream, TryStreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use msglink_core::{
    GroupInfo, GroupListEntry, MemberInfo, MessageChain, MessageSource, SessionContext,
    group_uin_from_code,
};
use msglink_protocol::{Command, GetGroupInfo, GetTroopList, GetTroopMemberList};

use crate::config::ClientConfig;
use crate::dispatcher::{CallOptions, RequestDispatcher};
use crate::error::ClientResult;
use crate::events::EventSink;
use crate::long_message::{LongMessageReceipt, LongMessageTransfer};
use crate::pagination::{END_CURSOR, PaginatedFetcher, Paged};
use crate::recall::RecallProtocol;
use crate::roster::GroupRoster;
use crate::stream::{DEFAULT_QUEUE_DEPTH, StreamTransport};
use crate::transport::{MessageReceipt, MessageSender, Transport, UploadTransport};

/// Services the session relies on but does not implement.
#[derive(Clone)]
pub struct Collaborators {
    /// Binary upload side channel.
    pub uploader: Arc<dyn UploadTransport>,
    /// Ordinary message-send path.
    pub sender: Arc<dyn MessageSender>,
    /// Group membership of this account.
    pub roster: Arc<dyn GroupRoster>,
    /// Local event observers.
    pub events: Arc<dyn EventSink>,
}

/// An account session.
///
/// Cheap to share behind an `Arc`; every operation takes `&self` and many may
/// run concurrently.
pub struct AccountSession {
    dispatcher: Arc<RequestDispatcher>,
    fetcher: PaginatedFetcher,
    long_messages: LongMessageTransfer,
    recalls: RecallProtocol,
    sender: Arc<dyn MessageSender>,
    list_options: CallOptions,
    long_message_threshold: usize,
}

impl AccountSession {
    /// Creates a session sending through `transport`.
    ///
    /// Inbound frames must be fed to [`dispatcher`](Self::dispatcher) by the
    /// owner of the connection.
    pub fn new(
        session: Arc<SessionContext>,
        transport: Arc<dyn Transport>,
        collaborators: Collaborators,
        config: &ClientConfig,
    ) -> Self {
        let dispatcher = RequestDispatcher::new(session, transport)
            .with_defaults(config.dispatcher.call_options());
        Self::with_dispatcher(Arc::new(dispatcher), collaborators, config)
    }

    /// Creates a session over a framed byte stream, reading responses from it.
    pub fn over_stream<S>(
        session: Arc<SessionContext>,
        stream: S,
        collaborators: Collaborators,
        config: &ClientConfig,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (transport, inbound) = StreamTransport::spawn(stream, DEFAULT_QUEUE_DEPTH);
        let this = Self::new(session, Arc::new(transport), collaborators, config);
        this.dispatcher.spawn_inbound(inbound);
        this
    }

    /// Creates a session on an existing dispatcher.
    ///
    /// The dispatcher keeps its own default call options; `config` supplies
    /// everything else.
    pub fn with_dispatcher(
        dispatcher: Arc<RequestDispatcher>,
        collaborators: Collaborators,
        config: &ClientConfig,
    ) -> Self {
        let Collaborators {
            uploader,
            sender,
            roster,
            events,
        } = collaborators;

        let fetcher = PaginatedFetcher::new(dispatcher.clone(), config.pagination.call_options());
        let long_messages = LongMessageTransfer::new(
            dispatcher.clone(),
            uploader,
            sender.clone(),
            roster.clone(),
        )
        .with_brief_limit(config.long_message.brief_limit)
        .with_brief_chars(config.long_message.brief_chars)
        .with_command_id(config.long_message.upload_command_id);
        let recalls = RecallProtocol::new(dispatcher.clone(), roster, events);

        Self {
            dispatcher,
            fetcher,
            long_messages,
            recalls,
            sender,
            list_options: config.dispatcher.list_options(),
            long_message_threshold: config.long_message.threshold,
        }
    }

    /// Returns the request dispatcher.
    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    /// Returns the session context.
    pub fn session(&self) -> &Arc<SessionContext> {
        self.dispatcher.session()
    }

    /// CSRF token for web endpoints tied to this session.
    pub fn csrf_token(&self) -> i32 {
        self.session().csrf_token()
    }

    /// Recalls a message. See [`RecallProtocol::recall`].
    pub async fn recall(&self, source: &MessageSource) -> ClientResult<()> {
        self.recalls.recall(source).await
    }

    /// Recalls a direct message this account sent, by packed message id.
    pub async fn recall_friend_message(
        &self,
        friend_id: u64,
        message_id: i64,
        time: i64,
    ) -> ClientResult<()> {
        self.recalls.recall_friend(friend_id, message_id, time).await
    }

    /// Recalls a group message by packed message id.
    pub async fn recall_group_message(&self, group_code: u64, message_id: i64) -> ClientResult<()> {
        self.recalls.recall_group(group_code, message_id).await
    }

    /// Sends `chain` as a long message. See [`LongMessageTransfer`].
    pub async fn send_long_message(
        &self,
        group_code: u64,
        chain: &MessageChain,
    ) -> ClientResult<LongMessageReceipt> {
        self.long_messages.send_long_message(group_code, chain).await
    }

    /// Sends a group message, uploading it as a long message when its
    /// estimated length exceeds the configured threshold.
    pub async fn send_group_message(
        &self,
        group_code: u64,
        chain: MessageChain,
    ) -> ClientResult<MessageReceipt> {
        let threshold = self.long_message_threshold;
        if chain.estimate_length(threshold) > threshold {
            debug!(group_code, threshold, "routing oversized message through upload");
            let done = self.long_messages.send_long_message(group_code, &chain).await?;
            return Ok(done.receipt);
        }
        self.sender.send_group_message(group_code, chain).await
    }

    /// Streams every record of a paginated query. See [`PaginatedFetcher::fetch_all`].
    pub fn fetch_paginated<C, F>(
        &self,
        initial_cursor: u64,
        make_request: F,
    ) -> impl Stream<Item = ClientResult<<C::Response as Paged>::Record>> + Send + use<C, F>
    where
        C: Command + Send + Sync + 'static,
        C::Response: Paged + Send,
        <C::Response as Paged>::Record: Send,
        F: FnMut(u64) -> C + Send,
    {
        self.fetcher.fetch_all(initial_cursor, make_request)
    }

    /// Streams the members of a group.
    ///
    /// `owner_id` is used to mark the owner's permission.
    pub fn query_group_member_list(
        &self,
        group_code: u64,
        owner_id: u64,
    ) -> impl Stream<Item = ClientResult<MemberInfo>> + Send + use<> {
        let group_uin = group_uin_from_code(group_code);
        self.fetch_paginated(END_CURSOR, move |next_uin| GetTroopMemberList {
            group_uin,
            group_code,
            next_uin,
        })
        .map_ok(move |entry| entry.into_member_info(owner_id))
    }

    /// Lists the groups this account belongs to.
    pub async fn query_group_list(&self) -> ClientResult<Vec<GroupListEntry>> {
        let response = self
            .dispatcher
            .send_and_expect(&GetTroopList, self.list_options)
            .await?;
        Ok(response.groups)
    }

    /// Fetches the details of one group.
    pub async fn query_group_info(&self, group_code: u64) -> ClientResult<GroupInfo> {
        self.dispatcher
            .send_and_expect(&GetGroupInfo { group_code }, self.list_options)
            .await
    }
}

impl std::fmt::Debug for AccountSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSession")
            .field("dispatcher", &self.dispatcher)
            .field("long_message_threshold", &self.long_message_threshold)
            .finish_non_exhaustive()
    }
}
