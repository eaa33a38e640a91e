//! Seams to the collaborators the client drives.
//!
//! The client never touches sockets directly: it hands frames to a
//! [`Transport`], pushes large payloads through an [`UploadTransport`] and
//! delivers finished messages through a [`MessageSender`].

use std::fmt;
use std::future::Future;
use std::net::SocketAddrV4;
use std::pin::Pin;

use msglink_core::{MessageChain, MessageSource};
use msglink_protocol::{Frame, UploadSlot};

use crate::error::{ClientResult, TransportError};

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The main connection.
///
/// Inbound frames do not come back through this trait; whoever owns the
/// connection feeds them to
/// [`RequestDispatcher::on_frame_received`](crate::RequestDispatcher::on_frame_received).
pub trait Transport: Send + Sync {
    /// Queues a frame for transmission.
    fn send(&self, frame: Frame) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Highway command id for long-message uploads.
pub const LONG_MESSAGE_COMMAND_ID: u32 = 27;

/// Single-use authorization for one side-channel upload.
///
/// Not `Clone`: an upload consumes its ticket.
pub struct UploadTicket {
    server: SocketAddrV4,
    ticket: Vec<u8>,
    resource_id: String,
    command_id: u32,
}

impl UploadTicket {
    /// Creates a ticket.
    pub fn new(
        server: SocketAddrV4,
        ticket: Vec<u8>,
        resource_id: impl Into<String>,
        command_id: u32,
    ) -> Self {
        Self {
            server,
            ticket,
            resource_id: resource_id.into(),
            command_id,
        }
    }

    /// Builds a ticket from a negotiated slot, using its first advertised
    /// server. Returns `None` when the slot advertises no server.
    pub fn from_slot(slot: UploadSlot, command_id: u32) -> Option<Self> {
        let server = slot.server()?;
        Some(Self::new(server, slot.msg_sig, slot.msg_resid, command_id))
    }

    /// Upload server address.
    pub fn server(&self) -> SocketAddrV4 {
        self.server
    }

    /// Ticket bytes presented to the upload server.
    pub fn ticket(&self) -> &[u8] {
        &self.ticket
    }

    /// Resource id the uploaded content will be stored under.
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// Transfer-type command id.
    pub fn command_id(&self) -> u32 {
        self.command_id
    }
}

impl fmt::Debug for UploadTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTicket")
            .field("server", &self.server)
            .field("ticket", &format_args!("<{} bytes>", self.ticket.len()))
            .field("resource_id", &self.resource_id)
            .field("command_id", &self.command_id)
            .finish()
    }
}

/// One upload through the binary side channel.
#[derive(Debug)]
pub struct UploadRequest {
    pub ticket: UploadTicket,
    pub payload: Vec<u8>,
    /// MD5 of `payload`.
    pub checksum: [u8; 16],
}

/// The binary upload side channel ("highway").
pub trait UploadTransport: Send + Sync {
    /// Streams `request.payload` to the ticket's server.
    ///
    /// Resolves once the server has acknowledged the bytes.
    fn upload(&self, request: UploadRequest) -> BoxFuture<'_, Result<(), TransportError>>;
}

/// Delivery receipt for a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageReceipt {
    /// Source of the delivered message, usable for a later recall.
    pub source: MessageSource,
}

/// The ordinary message-send path.
pub trait MessageSender: Send + Sync {
    /// Sends a chain to a group and returns its receipt.
    fn send_group_message(
        &self,
        group_code: u64,
        chain: MessageChain,
    ) -> BoxFuture<'_, ClientResult<MessageReceipt>>;
}
