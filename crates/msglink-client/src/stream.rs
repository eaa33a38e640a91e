//! A [`Transport`] over any async byte stream.
//!
//! Outbound frames are encoded in [`Transport::send`] and queued to a writer
//! task, so a frame that cannot be encoded fails its own send and nothing
//! else. A reader task decodes inbound frames and forwards them on a channel
//! that the caller hands to
//! [`RequestDispatcher::spawn_inbound`](crate::RequestDispatcher::spawn_inbound).

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use msglink_protocol::{Frame, FrameReader, FrameWriter, ProtocolError, encode_message};

use crate::error::TransportError;
use crate::transport::{BoxFuture, Transport};

/// Default depth of the outbound and inbound frame queues.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Frame transport over a split byte stream.
///
/// Dropping the transport closes the write side and stops the reader, which
/// ends the inbound channel.
pub struct StreamTransport {
    outbound: mpsc::Sender<Outbound>,
    reader: JoinHandle<()>,
}

/// A frame already length-prefixed and encoded.
struct Outbound {
    correlation_id: u32,
    data: Vec<u8>,
}

impl StreamTransport {
    /// Starts the reader and writer tasks on `stream`.
    ///
    /// Returns the transport and the channel of inbound frames.
    pub fn spawn<S>(stream: S, queue_depth: usize) -> (Self, mpsc::Receiver<Frame>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (outbound, outbound_rx) = mpsc::channel(queue_depth);
        let (inbound_tx, inbound) = mpsc::channel(queue_depth);

        tokio::spawn(write_loop(FrameWriter::new(write_half), outbound_rx));
        let reader = tokio::spawn(read_loop(FrameReader::new(read_half), inbound_tx));

        (Self { outbound, reader }, inbound)
    }

    /// Connects over TCP and starts the transport.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        queue_depth: usize,
    ) -> Result<(Self, mpsc::Receiver<Frame>), TransportError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(peer = ?stream.peer_addr().ok(), "connected");
        Ok(Self::spawn(stream, queue_depth))
    }

    /// Returns true once the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

impl Transport for StreamTransport {
    fn send(&self, frame: Frame) -> BoxFuture<'_, Result<(), TransportError>> {
        Box::pin(async move {
            let data = encode_message(&frame)?;
            let outbound = Outbound {
                correlation_id: frame.correlation_id,
                data,
            };
            self.outbound
                .send(outbound)
                .await
                .map_err(|_| TransportError::Closed)
        })
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn write_loop<S: AsyncWrite>(
    mut writer: FrameWriter<WriteHalf<S>>,
    mut outbound: mpsc::Receiver<Outbound>,
) {
    while let Some(frame) = outbound.recv().await {
        if let Err(e) = writer.write_encoded(&frame.data).await {
            error!(
                correlation_id = frame.correlation_id,
                error = %e,
                "connection write failed"
            );
            return;
        }
    }
    debug!("outbound queue closed, shutting down write side");
    if let Err(e) = writer.shutdown().await {
        debug!(error = %e, "write shutdown failed");
    }
}

async fn read_loop<S: AsyncRead>(
    mut reader: FrameReader<ReadHalf<S>>,
    inbound: mpsc::Sender<Frame>,
) {
    loop {
        let frame = match reader.read_message::<Frame>().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("connection closed by peer");
                return;
            }
            Err(ProtocolError::Serialization(e)) => {
                warn!(error = %e, "skipping undecodable frame");
                continue;
            }
            Err(ProtocolError::EmptyMessage) => {
                warn!("skipping empty frame");
                continue;
            }
            Err(e) => {
                error!(error = %e, "connection read failed");
                return;
            }
        };

        if let Err(e) = frame.ensure_compatible() {
            warn!(correlation_id = frame.correlation_id, error = %e, "skipping frame");
            continue;
        }
        if inbound.send(frame).await.is_err() {
            debug!("inbound receiver dropped");
            return;
        }
    }
}
