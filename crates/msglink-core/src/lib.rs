//! Core types: session context, messages, groups, tracing

pub mod group;
pub mod message;
pub mod session;
pub mod tracing;

pub use group::{
    GroupInfo, GroupListEntry, MemberInfo, MemberPermission, group_code_from_uin,
    group_uin_from_code,
};
pub use message::{
    DEFAULT_BRIEF_CHARS, DEFAULT_BRIEF_LIMIT, MessageChain, MessageElement, MessageReference,
    MessageSource, current_time_seconds, pack_message_id, unpack_message_id,
};
pub use session::{SessionContext, SessionKeys};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
