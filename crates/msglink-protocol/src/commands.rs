//! Typed command families and their response sum types.

use std::net::{Ipv4Addr, SocketAddrV4};

use msglink_core::{GroupInfo, GroupListEntry, MemberInfo, MemberPermission, MessageChain};
use serde::{Deserialize, Serialize};

use crate::frame::Command;

// ---------------------------------------------------------------------------
// Group list / info
// ---------------------------------------------------------------------------

/// Requests the simplified list of groups the account belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTroopList;

impl Command for GetTroopList {
    const NAME: &'static str = "friendlist.GetTroopListReqV2";
    type Response = TroopListResponse;
}

/// Response to [`GetTroopList`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroopListResponse {
    pub groups: Vec<GroupListEntry>,
}

/// Requests details of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetGroupInfo {
    pub group_code: u64,
}

impl Command for GetGroupInfo {
    const NAME: &'static str = "OidbSvc.0x88d_0";
    type Response = GroupInfo;
}

// ---------------------------------------------------------------------------
// Member list (paginated)
// ---------------------------------------------------------------------------

/// Requests one page of a group's member list.
///
/// `next_uin` is the continuation cursor; `0` asks for the first page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTroopMemberList {
    pub group_uin: u64,
    pub group_code: u64,
    pub next_uin: u64,
}

impl Command for GetTroopMemberList {
    const NAME: &'static str = "friendlist.GetTroopMemberListReq";
    type Response = TroopMemberListResponse;
}

/// A raw member row as the server sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroopMemberEntry {
    pub member_uin: u64,
    #[serde(default)]
    pub nick: String,
    #[serde(default)]
    pub name_card: String,
    #[serde(default)]
    pub special_title: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl TroopMemberEntry {
    /// Converts into a [`MemberInfo`], resolving permission from `owner_id`.
    pub fn into_member_info(self, owner_id: u64) -> MemberInfo {
        MemberInfo {
            permission: MemberPermission::resolve(self.member_uin, owner_id, self.is_admin),
            uin: self.member_uin,
            nick: self.nick,
            name_card: self.name_card,
            special_title: self.special_title,
        }
    }
}

/// One page of members plus the cursor for the next page (`0` when done).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroopMemberListResponse {
    pub members: Vec<TroopMemberEntry>,
    pub next_uin: u64,
}

// ---------------------------------------------------------------------------
// Long message upload slot
// ---------------------------------------------------------------------------

/// Message type used for group long messages.
pub const LONG_MESSAGE_GROUP_TYPE: u32 = 3;

/// Applies for an upload slot for an oversized message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyUp {
    /// Destination uin (group uin for group messages).
    pub dst_uin: u64,
    /// Size of the encoded message content in bytes.
    pub msg_size: u64,
    /// MD5 of the encoded message content.
    pub msg_md5: [u8; 16],
    pub msg_type: u32,
}

impl Command for ApplyUp {
    const NAME: &'static str = "MultiMsg.ApplyUp";
    type Response = ApplyUpResponse;
}

/// Server answer to [`ApplyUp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApplyUpResponse {
    /// The content exceeds even the long-message ceiling.
    MessageTooLarge,
    /// Upload the content to the given slot, then reference `msg_resid`.
    RequireUpload(UploadSlot),
    /// The server refused the request.
    Failure { reason: String },
}

/// Upload slot issued by [`ApplyUp`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSlot {
    /// Candidate upload server addresses, IPv4 in little-endian `u32` form.
    pub up_ip: Vec<u32>,
    /// Ports matching `up_ip`.
    pub up_port: Vec<u16>,
    /// Per-transfer ticket.
    pub msg_sig: Vec<u8>,
    /// Resource id the final message will reference.
    pub msg_resid: String,
    /// Upload key echoed back in the upload envelope.
    pub msg_ukey: Vec<u8>,
}

impl UploadSlot {
    /// Returns the first advertised upload server, if any.
    pub fn server(&self) -> Option<SocketAddrV4> {
        let ip = *self.up_ip.first()?;
        let port = *self.up_port.first()?;
        Some(SocketAddrV4::new(ipv4_from_le(ip), port))
    }
}

/// Converts the little-endian `u32` address form used by the server.
pub fn ipv4_from_le(raw: u32) -> Ipv4Addr {
    Ipv4Addr::from(raw.to_le_bytes())
}

/// Upload envelope pushed through the highway transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongMsgRequest {
    pub subcmd: u32,
    pub platform_type: u32,
    pub term_type: u32,
    pub msg_up_req: Vec<MsgUpReq>,
}

/// One content item of a [`LongMsgRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgUpReq {
    pub msg_type: u32,
    pub dst_uin: u64,
    pub msg_id: u32,
    pub msg_ukey: Vec<u8>,
    pub need_cache: u32,
    pub store_type: u32,
    pub msg_content: Vec<u8>,
}

impl LongMsgRequest {
    /// Builds the single-item upload envelope for a group long message.
    pub fn for_group(dst_uin: u64, msg_ukey: Vec<u8>, msg_content: Vec<u8>) -> Self {
        Self {
            subcmd: 1,
            platform_type: 9,
            term_type: 5,
            msg_up_req: vec![MsgUpReq {
                msg_type: LONG_MESSAGE_GROUP_TYPE,
                dst_uin,
                msg_id: 0,
                msg_ukey,
                need_cache: 0,
                store_type: 2,
                msg_content,
            }],
        }
    }
}

/// The stored body of a long message: the original chain plus the header
/// the server shows when the reference is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongMessageContent {
    pub from_uin: u64,
    pub to_uin: u64,
    pub sequence_id: i32,
    pub random: i32,
    pub time: i64,
    /// Sender's name as members of the destination group see it.
    pub sender_name: String,
    pub elements: MessageChain,
}

// ---------------------------------------------------------------------------
// Recall
// ---------------------------------------------------------------------------

/// Recalls a direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawFriend {
    pub to_uin: u64,
    pub sequence_id: i32,
    pub random: i32,
    pub time: i64,
}

impl Command for WithdrawFriend {
    const NAME: &'static str = "PbMessageSvc.PbMsgWithDraw";
    type Response = WithdrawResponse;
}

/// Recalls a group message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawGroup {
    pub group_code: u64,
    pub sequence_id: i32,
    pub random: i32,
}

impl Command for WithdrawGroup {
    const NAME: &'static str = "PbMessageSvc.PbMsgWithDraw";
    type Response = WithdrawResponse;
}

/// Server answer to a recall request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WithdrawResponse {
    Success,
    Failure { result: i32, message: String },
}
