//! Wire layer for msglink.
//!
//! # Protocol Overview
//!
//! Frames are sent as length-prefixed JSON:
//! - 4 bytes: frame length (u32, big-endian)
//! - N bytes: JSON [`Frame`]
//!
//! Every frame carries the account it is addressed as, a correlation id, a
//! command tag and an opaque body. Bodies are the JSON encoding of a typed
//! [`Command`] or of that command's response sum type.
//!
//! # Example
//!
//! ```rust
//! use msglink_protocol::{Frame, GetGroupInfo, encode_message, decode_message};
//!
//! let frame = Frame::request(10001, 1, &GetGroupInfo { group_code: 123 }).unwrap();
//! let bytes = encode_message(&frame).unwrap();
//! let decoded: Frame = decode_message(&bytes).unwrap();
//! assert_eq!(decoded.command, "OidbSvc.0x88d_0");
//! ```

mod commands;
mod error;
mod frame;
mod framing;

pub use commands::{
    ApplyUp, ApplyUpResponse, GetGroupInfo, GetTroopList, GetTroopMemberList,
    LONG_MESSAGE_GROUP_TYPE, LongMessageContent, LongMsgRequest, MsgUpReq, TroopListResponse, TroopMemberEntry,
    TroopMemberListResponse, UploadSlot, WithdrawFriend, WithdrawGroup, WithdrawResponse,
    ipv4_from_le,
};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{Command, Frame, PUSH_CORRELATION_ID};
pub use framing::{FrameReader, FrameWriter, decode_message, encode_message};

/// Protocol version constant.
pub const PROTOCOL_VERSION: &str = "1";

/// Maximum frame size (1 MB).
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;
