//! Message recall.

use std::sync::Arc;

use tracing::{debug, info};

use msglink_core::{MessageSource, pack_message_id, unpack_message_id};
use msglink_protocol::{WithdrawFriend, WithdrawGroup, WithdrawResponse};

use crate::dispatcher::RequestDispatcher;
use crate::error::{ClientError, ClientResult};
use crate::events::{EventSink, SessionEvent};
use crate::roster::GroupRoster;

/// Retracts previously sent messages.
pub struct RecallProtocol {
    dispatcher: Arc<RequestDispatcher>,
    roster: Arc<dyn GroupRoster>,
    events: Arc<dyn EventSink>,
}

impl RecallProtocol {
    pub fn new(
        dispatcher: Arc<RequestDispatcher>,
        roster: Arc<dyn GroupRoster>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            dispatcher,
            roster,
            events,
        }
    }

    /// Recalls the message identified by `source`.
    ///
    /// Recalling someone else's group message requires operator permission
    /// in that group, checked locally before anything is sent. Group recalls
    /// publish [`SessionEvent::GroupRecallInitiated`] before the request goes
    /// out.
    ///
    /// # Errors
    ///
    /// - [`ClientError::UnknownGroup`] / [`ClientError::PermissionDenied`]
    ///   from the local permission check
    /// - [`ClientError::RecallRejected`] when the server answers with anything
    ///   but success
    /// - any [`RequestDispatcher`] error
    pub async fn recall(&self, source: &MessageSource) -> ClientResult<()> {
        let account = self.dispatcher.session().account();
        let message_id = source.id();

        if source.is_group() {
            let group_code = source.group_id;
            if source.sender_id != account {
                self.ensure_operator(group_code)?;
            }

            self.events.publish(SessionEvent::GroupRecallInitiated {
                group_code,
                author_id: source.sender_id,
                operator_id: account,
                message_id,
                time: source.time,
            });

            self.withdraw_group(group_code, source.sequence_id, source.random).await?;
            self.events.publish(SessionEvent::GroupRecallCompleted {
                group_code,
                message_id,
            });
        } else {
            let friend_id = source.peer(account);
            debug!(friend_id, message_id, "recalling direct message");
            let response = self
                .dispatcher
                .send(&WithdrawFriend {
                    to_uin: friend_id,
                    sequence_id: source.sequence_id,
                    random: source.random,
                    time: source.time,
                })
                .await?;
            accepted(response, message_id)?;

            info!(friend_id, message_id, "direct message recalled");
            self.events.publish(SessionEvent::FriendRecallCompleted {
                friend_id,
                message_id,
            });
        }
        Ok(())
    }

    /// Recalls a message this account sent to `friend_id`, by packed id.
    pub async fn recall_friend(
        &self,
        friend_id: u64,
        message_id: i64,
        time: i64,
    ) -> ClientResult<()> {
        let (sequence_id, random) = unpack_message_id(message_id);
        self.recall(&MessageSource {
            sender_id: self.dispatcher.session().account(),
            group_id: 0,
            target_id: friend_id,
            sequence_id,
            random,
            time,
        })
        .await
    }

    /// Recalls a group message by packed id.
    ///
    /// The author is unknown here, so operator permission is required and no
    /// events are published.
    pub async fn recall_group(&self, group_code: u64, message_id: i64) -> ClientResult<()> {
        let (sequence_id, random) = unpack_message_id(message_id);
        self.ensure_operator(group_code)?;
        self.withdraw_group(group_code, sequence_id, random).await
    }

    async fn withdraw_group(
        &self,
        group_code: u64,
        sequence_id: i32,
        random: i32,
    ) -> ClientResult<()> {
        let message_id = pack_message_id(sequence_id, random);
        debug!(group_code, message_id, "recalling group message");
        let response = self
            .dispatcher
            .send(&WithdrawGroup {
                group_code,
                sequence_id,
                random,
            })
            .await?;
        accepted(response, message_id)?;

        info!(group_code, message_id, "group message recalled");
        Ok(())
    }

    fn ensure_operator(&self, group_code: u64) -> ClientResult<()> {
        let membership = self
            .roster
            .membership(group_code)
            .ok_or(ClientError::UnknownGroup { group_code })?;
        if membership.permission.is_operator() {
            Ok(())
        } else {
            Err(ClientError::PermissionDenied { group_code })
        }
    }
}

impl std::fmt::Debug for RecallProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecallProtocol")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

fn accepted(response: WithdrawResponse, message_id: i64) -> ClientResult<()> {
    match response {
        WithdrawResponse::Success => Ok(()),
        WithdrawResponse::Failure { result, message } => Err(ClientError::RecallRejected {
            message_id,
            detail: format!("{message} (result {result})"),
        }),
    }
}
