//! Request/response correlation.
//!
//! Every request gets a correlation id that is unique among the requests
//! currently awaiting an answer. The caller's task parks on a oneshot
//! channel registered under that id; the inbound side resolves it when a
//! frame with the same id arrives. A waiter is removed exactly once: either
//! by the frame that resolves it, or when its call gives up (timeout after
//! the last retry, or the caller dropping the future). Frames that find no
//! waiter are discarded. Once the inbound side has ended the dispatcher is
//! closed and new calls fail immediately with [`ClientError::Disconnected`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use msglink_core::SessionContext;
use msglink_protocol::{Command, Frame, PUSH_CORRELATION_ID};

use crate::error::{ClientError, ClientResult, TransportError};
use crate::transport::Transport;

/// Default time to wait for a correlated response.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Per-call timeout and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    /// How long to wait for a response to each transmission.
    pub timeout: Duration,
    /// Retransmissions allowed after the first attempt times out.
    pub retries: u32,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
        }
    }
}

impl CallOptions {
    /// Creates call options.
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self { timeout, retries }
    }

    /// Builder: set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder: set the retry budget.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

type Waiters = Mutex<HashMap<u32, oneshot::Sender<Frame>>>;

/// Sends typed requests and awaits their correlated responses.
pub struct RequestDispatcher {
    session: Arc<SessionContext>,
    transport: Arc<dyn Transport>,
    waiters: Waiters,
    next_correlation_id: AtomicU32,
    closed: AtomicBool,
    defaults: CallOptions,
}

impl RequestDispatcher {
    /// Creates a dispatcher sending through `transport` as `session`'s account.
    pub fn new(session: Arc<SessionContext>, transport: Arc<dyn Transport>) -> Self {
        Self {
            session,
            transport,
            waiters: Mutex::new(HashMap::new()),
            next_correlation_id: AtomicU32::new(1),
            closed: AtomicBool::new(false),
            defaults: CallOptions::default(),
        }
    }

    /// Builder: set the options used by [`send`](Self::send).
    #[must_use]
    pub fn with_defaults(mut self, defaults: CallOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Returns the session requests are addressed as.
    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Returns the default call options.
    pub fn defaults(&self) -> CallOptions {
        self.defaults
    }

    /// Returns true once the inbound side has ended.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of requests currently awaiting a response.
    pub fn outstanding(&self) -> usize {
        self.lock_waiters().len()
    }

    /// Sends `command` with the default options.
    pub async fn send<C: Command>(&self, command: &C) -> ClientResult<C::Response> {
        self.send_and_expect(command, self.defaults).await
    }

    /// Sends `command` and waits for the correlated response.
    ///
    /// Waits `options.timeout` per transmission. On timeout the same frame,
    /// with the same correlation id, is retransmitted while retries remain.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Timeout`] when every attempt timed out
    /// - [`ClientError::Malformed`] when the response cannot be decoded
    /// - [`ClientError::Transport`] when the last transmission failed to send,
    ///   or at once when the frame could not be encoded
    /// - [`ClientError::Disconnected`] when the inbound side closed
    pub async fn send_and_expect<C: Command>(
        &self,
        command: &C,
        options: CallOptions,
    ) -> ClientResult<C::Response> {
        let (correlation_id, mut response_rx) = self.register()?;
        let _waiter = WaiterGuard {
            waiters: &self.waiters,
            correlation_id,
        };

        let frame = Frame::request(self.session.account(), correlation_id, command)?;
        let attempts = options.retries.saturating_add(1);

        for attempt in 1..=attempts {
            debug!(correlation_id, command = C::NAME, attempt, "sending request");

            if let Err(e) = self.transport.send(frame.clone()).await {
                if attempt == attempts || matches!(e, TransportError::Protocol(_)) {
                    return Err(e.into());
                }
                warn!(correlation_id, command = C::NAME, attempt, error = %e, "send failed, retrying");
                continue;
            }

            match tokio::time::timeout(options.timeout, &mut response_rx).await {
                Ok(Ok(response)) => {
                    debug!(correlation_id, command = C::NAME, "response received");
                    return decode_response::<C>(response);
                }
                Ok(Err(_)) => return Err(ClientError::Disconnected),
                Err(_) if attempt < attempts => {
                    warn!(
                        correlation_id,
                        command = C::NAME,
                        attempt,
                        timeout_ms = options.timeout.as_millis() as u64,
                        "request timed out, retrying"
                    );
                }
                Err(_) => {}
            }
        }

        Err(ClientError::Timeout {
            command: C::NAME.to_string(),
            attempts,
        })
    }

    /// Routes an inbound frame to the waiter registered under its
    /// correlation id.
    pub fn on_frame_received(&self, frame: Frame) {
        if frame.is_push() {
            trace!(command = %frame.command, "ignoring server push");
            return;
        }

        let correlation_id = frame.correlation_id;
        let waiter = self.lock_waiters().remove(&correlation_id);
        match waiter {
            Some(tx) => {
                if tx.send(frame).is_err() {
                    debug!(correlation_id, "waiter went away, discarding response");
                }
            }
            None => {
                warn!(correlation_id, command = %frame.command, "discarding uncorrelated frame");
            }
        }
    }

    /// Fails every outstanding request with [`ClientError::Disconnected`].
    pub fn fail_outstanding(&self) {
        let mut waiters = self.lock_waiters();
        if !waiters.is_empty() {
            debug!(count = waiters.len(), "failing outstanding requests");
        }
        waiters.clear();
    }

    /// Closes the dispatcher: outstanding and future requests fail with
    /// [`ClientError::Disconnected`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.fail_outstanding();
    }

    /// Spawns a task that feeds `inbound` into [`on_frame_received`](Self::on_frame_received).
    ///
    /// When the inbound stream ends the dispatcher is [closed](Self::close).
    /// The task holds only a weak reference.
    pub fn spawn_inbound(self: &Arc<Self>, mut inbound: mpsc::Receiver<Frame>) -> JoinHandle<()> {
        let dispatcher: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                let Some(dispatcher) = dispatcher.upgrade() else {
                    return;
                };
                dispatcher.on_frame_received(frame);
            }
            debug!("inbound frame stream ended");
            if let Some(dispatcher) = dispatcher.upgrade() {
                dispatcher.close();
            }
        })
    }

    /// Allocates a correlation id not held by any outstanding request and
    /// registers a waiter for it.
    fn register(&self) -> ClientResult<(u32, oneshot::Receiver<Frame>)> {
        let mut waiters = self.lock_waiters();
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::Disconnected);
        }
        loop {
            let id = self.next_correlation_id.fetch_add(1, Ordering::Relaxed);
            if id == PUSH_CORRELATION_ID || waiters.contains_key(&id) {
                continue;
            }
            let (tx, rx) = oneshot::channel();
            waiters.insert(id, tx);
            return Ok((id, rx));
        }
    }

    fn lock_waiters(&self) -> MutexGuard<'_, HashMap<u32, oneshot::Sender<Frame>>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("account", &self.session.account())
            .field("outstanding", &self.outstanding())
            .field("closed", &self.is_closed())
            .field("defaults", &self.defaults)
            .finish()
    }
}

/// Removes a waiter when its call ends, however it ends.
struct WaiterGuard<'a> {
    waiters: &'a Waiters,
    correlation_id: u32,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.correlation_id);
    }
}

fn decode_response<C: Command>(frame: Frame) -> ClientResult<C::Response> {
    if frame.command != C::NAME {
        return Err(ClientError::malformed(
            C::NAME,
            format!("response carries command tag {}", frame.command),
        ));
    }
    frame
        .decode_body::<C::Response>()
        .map_err(|e| ClientError::malformed(C::NAME, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use msglink_protocol::{GetGroupInfo, WithdrawGroup, WithdrawResponse};

    use crate::testing::{ScriptedTransport, group_info, reply};

    fn info_request() -> GetGroupInfo {
        GetGroupInfo { group_code: 123 }
    }

    #[tokio::test]
    async fn resolves_correlated_response() {
        let (dispatcher, transport) = ScriptedTransport::dispatcher(|frame, _| reply(frame, &group_info(123)));

        let info = dispatcher.send(&info_request()).await.unwrap();

        assert_eq!(info.group_code, 123);
        assert_eq!(transport.transmissions(), 1);
        assert_eq!(dispatcher.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_answered() {
        let (dispatcher, transport) = ScriptedTransport::dispatcher(|frame, attempt| {
            (attempt >= 2).then(|| reply(frame, &group_info(123))).flatten()
        });

        let options = CallOptions::default().with_retries(2);
        let info = dispatcher.send_and_expect(&info_request(), options).await.unwrap();

        assert_eq!(info.group_code, 123);
        assert_eq!(transport.transmissions(), 3);
        let ids: HashSet<u32> = transport.sent().iter().map(|f| f.correlation_id).collect();
        assert_eq!(ids.len(), 1, "retransmissions reuse the correlation id");
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_retries_exhausted() {
        let (dispatcher, transport) = ScriptedTransport::dispatcher(|frame, attempt| {
            (attempt >= 2).then(|| reply(frame, &group_info(123))).flatten()
        });

        let options = CallOptions::default().with_retries(1);
        let err = dispatcher.send_and_expect(&info_request(), options).await.unwrap_err();

        assert!(matches!(err, ClientError::Timeout { attempts: 2, .. }));
        assert_eq!(transport.transmissions(), 2);
        assert_eq!(dispatcher.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_response_is_discarded() {
        let (dispatcher, transport) = ScriptedTransport::dispatcher(|_, _| None);

        let err = dispatcher.send(&info_request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));

        let late = reply(&transport.sent()[0], &group_info(123)).unwrap();
        dispatcher.on_frame_received(late);
        assert_eq!(dispatcher.outstanding(), 0);
    }

    #[tokio::test]
    async fn undecodable_body_is_malformed() {
        let (dispatcher, _) = ScriptedTransport::dispatcher(|frame, _| {
            let mut response = frame.clone();
            response.body = b"{\"unexpected\":true}".to_vec();
            Some(response)
        });

        let err = dispatcher.send(&info_request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Malformed { ref command, .. } if command == "OidbSvc.0x88d_0"));
    }

    #[tokio::test]
    async fn wrong_command_tag_is_malformed() {
        let (dispatcher, _) = ScriptedTransport::dispatcher(|frame, _| {
            let mut response = reply(frame, &group_info(1))?;
            response.command = "other.Command".into();
            Some(response)
        });

        let err = dispatcher.send(&info_request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Malformed { .. }));
    }

    #[tokio::test]
    async fn application_failure_is_a_value() {
        let (dispatcher, _) = ScriptedTransport::dispatcher(|frame, _| {
            reply(
                frame,
                &WithdrawResponse::Failure {
                    result: 1001,
                    message: "no such message".into(),
                },
            )
        });

        let response = dispatcher
            .send(&WithdrawGroup {
                group_code: 1,
                sequence_id: 2,
                random: 3,
            })
            .await
            .unwrap();
        assert!(matches!(response, WithdrawResponse::Failure { result: 1001, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_get_distinct_ids() {
        let (dispatcher, transport) = ScriptedTransport::dispatcher(|_, _| None);
        let options = CallOptions::default().with_timeout(Duration::from_secs(3600));

        let handles: Vec<_> = (0..64)
            .map(|_| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move { dispatcher.send_and_expect(&info_request(), options).await })
            })
            .collect();

        while transport.transmissions() < 64 {
            tokio::task::yield_now().await;
        }

        let ids: HashSet<u32> = transport.sent().iter().map(|f| f.correlation_id).collect();
        assert_eq!(ids.len(), 64);
        assert!(!ids.contains(&PUSH_CORRELATION_ID));
        assert_eq!(dispatcher.outstanding(), 64);

        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
        assert_eq!(dispatcher.outstanding(), 0, "cancelled calls release their ids");
    }

    #[tokio::test]
    async fn responses_out_of_order_reach_their_callers() {
        let (dispatcher, transport) = ScriptedTransport::dispatcher(|_, _| None);

        let first = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.send(&GetGroupInfo { group_code: 1 }).await }
        });
        let second = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.send(&GetGroupInfo { group_code: 2 }).await }
        });

        while transport.transmissions() < 2 {
            tokio::task::yield_now().await;
        }

        let sent = transport.sent();
        for frame in sent.iter().rev() {
            let request: GetGroupInfo = frame.decode_body().unwrap();
            dispatcher.on_frame_received(reply(frame, &group_info(request.group_code)).unwrap());
        }

        assert_eq!(first.await.unwrap().unwrap().group_code, 1);
        assert_eq!(second.await.unwrap().unwrap().group_code, 2);
    }

    #[tokio::test]
    async fn closed_inbound_fails_outstanding() {
        let (dispatcher, transport) = ScriptedTransport::dispatcher(|_, _| None);

        let pending = tokio::spawn({
            let dispatcher = dispatcher.clone();
            async move { dispatcher.send(&info_request()).await }
        });
        while transport.transmissions() < 1 {
            tokio::task::yield_now().await;
        }

        dispatcher.fail_outstanding();
        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, ClientError::Disconnected));
    }

    #[tokio::test]
    async fn send_failure_propagates() {
        let transport = Arc::new(ScriptedTransport::failing());
        let dispatcher = RequestDispatcher::new(crate::testing::session(), transport.clone());

        let err = dispatcher
            .send_and_expect(&info_request(), CallOptions::default().with_retries(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
        assert_eq!(transport.transmissions(), 2);
    }

    #[tokio::test]
    async fn requests_after_inbound_closed_fail_fast() {
        let transport = Arc::new(ScriptedTransport::failing());
        let dispatcher =
            Arc::new(RequestDispatcher::new(crate::testing::session(), transport.clone()));
        let (tx, rx) = mpsc::channel(1);
        let inbound = dispatcher.spawn_inbound(rx);

        drop(tx);
        inbound.await.unwrap();

        assert!(dispatcher.is_closed());
        let err = dispatcher.send(&info_request()).await.unwrap_err();
        assert!(matches!(err, ClientError::Disconnected));
        assert_eq!(transport.transmissions(), 0);
    }

    #[test]
    fn correlation_ids_wrap_past_push_and_live_ids() {
        let dispatcher =
            RequestDispatcher::new(crate::testing::session(), Arc::new(ScriptedTransport::failing()));

        let (first, _first_rx) = dispatcher.register().unwrap();
        assert_eq!(first, 1);

        dispatcher.next_correlation_id.store(u32::MAX, Ordering::Relaxed);
        let (last, _last_rx) = dispatcher.register().unwrap();
        let (wrapped, _wrapped_rx) = dispatcher.register().unwrap();

        assert_eq!(last, u32::MAX);
        assert_eq!(wrapped, 2, "skips the push id and the still outstanding id 1");
        assert_eq!(dispatcher.outstanding(), 3);
    }

    #[test]
    fn call_options_builders() {
        let options = CallOptions::new(Duration::from_millis(3000), 0).with_retries(2);
        assert_eq!(options.timeout, Duration::from_millis(3000));
        assert_eq!(options.retries, 2);
        assert_eq!(CallOptions::default().timeout, DEFAULT_TIMEOUT);
    }
}
