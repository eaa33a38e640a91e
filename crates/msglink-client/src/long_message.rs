//! Oversized message delivery through the upload side channel.
//!
//! A transfer moves through `Negotiating -> {Rejected | Uploading} -> Finalized`.
//! The reference message is sent only after the upload has been acknowledged,
//! so a failed transfer never leaves a conversation item pointing at content
//! that was not stored. A failed transfer is not resumable: the ticket it
//! obtained is spent, and a retry starts again from negotiation.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use msglink_core::{
    DEFAULT_BRIEF_CHARS, DEFAULT_BRIEF_LIMIT, MessageChain, MessageReference,
    current_time_seconds, group_uin_from_code,
};
use msglink_protocol::{
    ApplyUp, ApplyUpResponse, Command, LONG_MESSAGE_GROUP_TYPE, LongMessageContent,
    LongMsgRequest, ProtocolError,
};

use crate::dispatcher::RequestDispatcher;
use crate::error::{ClientError, ClientResult};
use crate::roster::GroupRoster;
use crate::transport::{
    LONG_MESSAGE_COMMAND_ID, MessageReceipt, MessageSender, UploadRequest, UploadTicket,
    UploadTransport,
};

/// Estimated chain length above which a group message is sent as a long message.
pub const DEFAULT_LONG_MESSAGE_THRESHOLD: usize = 702;

/// Phase of a long-message transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Negotiating,
    Rejected,
    Uploading,
    Finalized,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Negotiating => "negotiating",
            Self::Rejected => "rejected",
            Self::Uploading => "uploading",
            Self::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Result of a finalized transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongMessageReceipt {
    /// The reference that stands in for the uploaded content.
    pub reference: MessageReference,
    /// Receipt of the reference message itself.
    pub receipt: MessageReceipt,
}

/// Drives long-message transfers for one session.
pub struct LongMessageTransfer {
    dispatcher: Arc<RequestDispatcher>,
    uploader: Arc<dyn UploadTransport>,
    sender: Arc<dyn MessageSender>,
    roster: Arc<dyn GroupRoster>,
    brief_limit: usize,
    brief_chars: usize,
    command_id: u32,
}

impl LongMessageTransfer {
    pub fn new(
        dispatcher: Arc<RequestDispatcher>,
        uploader: Arc<dyn UploadTransport>,
        sender: Arc<dyn MessageSender>,
        roster: Arc<dyn GroupRoster>,
    ) -> Self {
        Self {
            dispatcher,
            uploader,
            sender,
            roster,
            brief_limit: DEFAULT_BRIEF_LIMIT,
            brief_chars: DEFAULT_BRIEF_CHARS,
            command_id: LONG_MESSAGE_COMMAND_ID,
        }
    }

    /// Builder: set how many elements the preview may render.
    #[must_use]
    pub fn with_brief_limit(mut self, brief_limit: usize) -> Self {
        self.brief_limit = brief_limit;
        self
    }

    /// Builder: set how many characters the preview may hold.
    #[must_use]
    pub fn with_brief_chars(mut self, brief_chars: usize) -> Self {
        self.brief_chars = brief_chars;
        self
    }

    /// Builder: set the highway command id used for uploads.
    #[must_use]
    pub fn with_command_id(mut self, command_id: u32) -> Self {
        self.command_id = command_id;
        self
    }

    /// Uploads `chain` and sends a short reference to it into `group_code`.
    ///
    /// # Errors
    ///
    /// - [`ClientError::UnknownGroup`] when the account is not in the group
    /// - [`ClientError::ContentTooLarge`] when the server refuses the size
    /// - [`ClientError::UploadFailed`] when the side channel fails
    /// - any [`RequestDispatcher`] error from negotiation, and any error from
    ///   the message-send path
    pub async fn send_long_message(
        &self,
        group_code: u64,
        chain: &MessageChain,
    ) -> ClientResult<LongMessageReceipt> {
        let membership = self
            .roster
            .membership(group_code)
            .ok_or(ClientError::UnknownGroup { group_code })?;

        let session = self.dispatcher.session();
        let group_uin = group_uin_from_code(group_code);
        let time = current_time_seconds();
        let content = LongMessageContent {
            from_uin: session.account(),
            to_uin: group_uin,
            sequence_id: session.next_sequence_id(),
            random: rand::random(),
            time,
            sender_name: membership.display_name,
            elements: chain.clone(),
        };
        let content = serde_json::to_vec(&content).map_err(ProtocolError::from)?;
        let size = content.len();

        debug!(group_code, size, state = %TransferState::Negotiating, "applying for upload slot");
        let apply = ApplyUp {
            dst_uin: group_uin,
            msg_size: size as u64,
            msg_md5: md5::compute(&content).0,
            msg_type: LONG_MESSAGE_GROUP_TYPE,
        };
        let mut slot = match self.dispatcher.send(&apply).await? {
            ApplyUpResponse::RequireUpload(slot) => slot,
            ApplyUpResponse::MessageTooLarge => {
                info!(group_code, size, state = %TransferState::Rejected, "long message refused");
                return Err(ClientError::ContentTooLarge { size });
            }
            ApplyUpResponse::Failure { reason } => {
                warn!(group_code, reason = %reason, "upload slot negotiation failed");
                return Err(ClientError::failure(ApplyUp::NAME, reason));
            }
        };

        let ukey = std::mem::take(&mut slot.msg_ukey);
        let ticket = UploadTicket::from_slot(slot, self.command_id).ok_or_else(|| {
            ClientError::malformed(ApplyUp::NAME, "upload slot advertises no server")
        })?;
        let resource_id = ticket.resource_id().to_string();

        let envelope = LongMsgRequest::for_group(group_uin, ukey, content);
        let payload = serde_json::to_vec(&envelope).map_err(ProtocolError::from)?;
        let checksum = md5::compute(&payload).0;

        debug!(
            group_code,
            server = %ticket.server(),
            resource_id = %resource_id,
            bytes = payload.len(),
            state = %TransferState::Uploading,
            "uploading long message"
        );
        self.uploader
            .upload(UploadRequest {
                ticket,
                payload,
                checksum,
            })
            .await
            .map_err(|e| {
                warn!(group_code, resource_id = %resource_id, error = %e, "long message upload failed");
                ClientError::UploadFailed {
                    reason: e.to_string(),
                }
            })?;

        let reference = MessageReference {
            resource_id,
            brief: chain.brief(self.brief_limit, self.brief_chars),
            time,
        };
        let receipt = self
            .sender
            .send_group_message(group_code, MessageChain::long_message(reference.clone()))
            .await?;

        info!(
            group_code,
            resource_id = %reference.resource_id,
            state = %TransferState::Finalized,
            "long message sent"
        );
        Ok(LongMessageReceipt { reference, receipt })
    }
}

impl fmt::Debug for LongMessageTransfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LongMessageTransfer")
            .field("brief_limit", &self.brief_limit)
            .field("brief_chars", &self.brief_chars)
            .field("command_id", &self.command_id)
            .finish_non_exhaustive()
    }
}
