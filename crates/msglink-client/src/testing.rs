//! Test doubles for the client's collaborators.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use msglink_core::{
    GroupInfo, MessageChain, MessageSource, SessionContext, SessionKeys, current_time_seconds,
};
use msglink_protocol::{Frame, TroopMemberEntry};
use serde::Serialize;

use crate::dispatcher::RequestDispatcher;
use crate::error::{ClientResult, TransportError};
use crate::events::{EventSink, SessionEvent};
use crate::transport::{
    BoxFuture, MessageReceipt, MessageSender, Transport, UploadRequest, UploadTransport,
};

pub const ACCOUNT: u64 = 10001;

type Responder = Box<dyn Fn(&Frame, usize) -> Option<Frame> + Send + Sync>;

/// A main connection that records every frame and answers through a
/// scripted responder.
///
/// The responder receives each transmitted frame with its zero-based
/// transmission index and may return a frame to deliver inbound.
pub struct ScriptedTransport {
    sent: Mutex<Vec<Frame>>,
    responder: Option<Responder>,
    inbox: Option<mpsc::Sender<Frame>>,
}

impl ScriptedTransport {
    /// Builds a dispatcher wired to a scripted transport, with the inbound
    /// side already draining into it.
    pub fn dispatcher(
        responder: impl Fn(&Frame, usize) -> Option<Frame> + Send + Sync + 'static,
    ) -> (Arc<RequestDispatcher>, Arc<ScriptedTransport>) {
        let (tx, rx) = mpsc::channel(256);
        let transport = Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            responder: Some(Box::new(responder)),
            inbox: Some(tx),
        });
        let dispatcher = Arc::new(RequestDispatcher::new(session(), transport.clone()));
        dispatcher.spawn_inbound(rx);
        (dispatcher, transport)
    }

    /// A transport whose every send fails.
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            responder: None,
            inbox: None,
        }
    }

    pub fn transmissions(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, frame: Frame) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let index = {
                let mut sent = self.sent.lock().unwrap();
                sent.push(frame.clone());
                sent.len() - 1
            };
            let Some(inbox) = &self.inbox else {
                return Err(TransportError::Closed);
            };
            let response = self.responder.as_ref().and_then(|r| r(&frame, index));
            if let Some(response) = response {
                inbox.send(response).await.map_err(|_| TransportError::Closed)?;
            }
            Ok(())
        })
    }
}

/// What an upload double saw for one upload.
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub ticket: Vec<u8>,
    pub resource_id: String,
    pub command_id: u32,
    pub payload: Vec<u8>,
    pub checksum: [u8; 16],
}

/// An upload side channel that records uploads and optionally fails them.
#[derive(Default)]
pub struct RecordingUploader {
    uploads: Mutex<Vec<RecordedUpload>>,
    failure: Option<String>,
}

impl RecordingUploader {
    pub fn failing(reason: &str) -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            failure: Some(reason.to_string()),
        }
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap().clone()
    }
}

impl UploadTransport for RecordingUploader {
    fn upload(&self, request: UploadRequest) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            self.uploads.lock().unwrap().push(RecordedUpload {
                ticket: request.ticket.ticket().to_vec(),
                resource_id: request.ticket.resource_id().to_string(),
                command_id: request.ticket.command_id(),
                payload: request.payload,
                checksum: request.checksum,
            });
            match &self.failure {
                Some(reason) => Err(TransportError::rejected(reason.clone())),
                None => Ok(()),
            }
        })
    }
}

/// A message-send path that records chains and hands out receipts.
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(u64, MessageChain)>>,
    sequence: AtomicI32,
}

impl RecordingSender {
    pub fn sent(&self) -> Vec<(u64, MessageChain)> {
        self.sent.lock().unwrap().clone()
    }
}

impl MessageSender for RecordingSender {
    fn send_group_message(
        &self,
        group_code: u64,
        chain: MessageChain,
    ) -> BoxFuture<'_, ClientResult<MessageReceipt>> {
        Box::pin(async move {
            self.sent.lock().unwrap().push((group_code, chain));
            Ok(MessageReceipt {
                source: MessageSource {
                    sender_id: ACCOUNT,
                    group_id: group_code,
                    target_id: 0,
                    sequence_id: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
                    random: 77,
                    time: current_time_seconds(),
                },
            })
        })
    }
}

/// An event sink that keeps every event in publication order.
#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingEvents {
    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }
}

impl EventSink for RecordingEvents {
    fn publish(&self, event: SessionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn session() -> Arc<SessionContext> {
    let keys = SessionKeys::new(vec![1, 2, 3], b"@abcdefgh".to_vec());
    Arc::new(SessionContext::new(ACCOUNT, "bot", keys, 100))
}

/// Answers `frame` with `response`.
pub fn reply<T: Serialize>(frame: &Frame, response: &T) -> Option<Frame> {
    Frame::response_to(frame, response).ok()
}

pub fn group_info(group_code: u64) -> GroupInfo {
    GroupInfo {
        group_code,
        name: format!("group {group_code}"),
        owner_id: 1,
        member_count: 3,
        max_member_count: 200,
        memo: String::new(),
    }
}

pub fn member(uin: u64, is_admin: bool) -> TroopMemberEntry {
    TroopMemberEntry {
        member_uin: uin,
        nick: format!("member{uin}"),
        name_card: String::new(),
        special_title: String::new(),
        is_admin,
    }
}
