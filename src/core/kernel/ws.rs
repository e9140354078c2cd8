use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{decompress_gzip, InboundMessage, WsCodec};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, trace, warn};

/// Reconnection policy applied after an unexpected drop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Upper bound on any single backoff, jitter included
    pub max_backoff: Duration,
    /// Consecutive failed attempts before giving up. `None` retries until
    /// the session is closed.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Whether attempt number `attempt` (1-based) may be made
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_attempts.map_or(true, |max| attempt <= max)
    }

    /// Exponential backoff with up to 50% random jitter.
    ///
    /// `base = initial * 2^attempt`, capped at `max_backoff`; the jittered
    /// result never exceeds `max_backoff` either.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self
            .initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff);

        let jitter_frac = rand::random::<f64>() * 0.5;
        let jitter = Duration::from_secs_f64(base.as_secs_f64() * jitter_frac);

        (base + jitter).min(self.max_backoff)
    }
}

/// WebSocket session configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Bound on dialing plus the opening handshake
    pub connect_timeout: Duration,
    /// How long to wait for a subscribe or auth acknowledgement
    pub ack_timeout: Duration,
    /// A frame write that takes longer marks the socket dead
    pub write_timeout: Duration,
    /// How long `close()` waits for the driver before aborting it
    pub close_grace: Duration,
    pub reconnect: ReconnectPolicy,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
            close_grace: Duration::from_secs(1),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl WsConfig {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

/// Transport-level frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

/// Write half of a physical socket
#[async_trait]
pub trait WsSink: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ExchangeError>;

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), ExchangeError>;

    async fn close(&mut self) -> Result<(), ExchangeError>;
}

/// Read half of a physical socket. `None` means the peer went away.
#[async_trait]
pub trait WsStream: Send {
    async fn read_frame(&mut self) -> Option<Result<Frame, ExchangeError>>;
}

/// Opens physical sockets
#[async_trait]
pub trait WsConnector: Send + Sync {
    async fn dial(&self, url: &str)
        -> Result<(Box<dyn WsSink>, Box<dyn WsStream>), ExchangeError>;
}

type TungsteniteSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// `WsConnector` over tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

struct TungsteniteSink {
    inner: SplitSink<TungsteniteSocket, Message>,
}

struct TungsteniteStream {
    inner: SplitStream<TungsteniteSocket>,
}

#[async_trait]
impl WsConnector for TungsteniteConnector {
    async fn dial(
        &self,
        url: &str,
    ) -> Result<(Box<dyn WsSink>, Box<dyn WsStream>), ExchangeError> {
        let (socket, _) = connect_async(url)
            .await
            .map_err(|e| ExchangeError::ConnectError(format!("{}: {}", url, e)))?;
        let (write, read) = socket.split();

        Ok((
            Box::new(TungsteniteSink { inner: write }),
            Box::new(TungsteniteStream { inner: read }),
        ))
    }
}

#[async_trait]
impl WsSink for TungsteniteSink {
    async fn send_text(&mut self, text: String) -> Result<(), ExchangeError> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| ExchangeError::SendError(e.to_string()))
    }

    async fn send_binary(&mut self, data: Vec<u8>) -> Result<(), ExchangeError> {
        self.inner
            .send(Message::Binary(data))
            .await
            .map_err(|e| ExchangeError::SendError(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), ExchangeError> {
        self.inner
            .close()
            .await
            .map_err(|e| ExchangeError::SendError(e.to_string()))
    }
}

#[async_trait]
impl WsStream for TungsteniteStream {
    async fn read_frame(&mut self) -> Option<Result<Frame, ExchangeError>> {
        loop {
            let frame = match self.inner.next().await? {
                Ok(Message::Text(text)) => Frame::Text(text),
                Ok(Message::Binary(data)) => Frame::Binary(data),
                Ok(Message::Ping(data)) => Frame::Ping(data),
                Ok(Message::Pong(data)) => Frame::Pong(data),
                Ok(Message::Close(_)) => Frame::Close,
                // raw frames are never yielded while reading
                Ok(Message::Frame(_)) => continue,
                Err(e) => {
                    return Some(Err(ExchangeError::ConnectError(format!(
                        "WebSocket read failed: {}",
                        e
                    ))))
                }
            };
            return Some(Ok(frame));
        }
    }
}

/// One physical socket's write side plus the inbound frame pipeline.
///
/// The sink sits behind an async mutex so frames from the read loop and
/// from callers are written one at a time. The read half is handed back
/// from `connect` and owned by whoever runs the read loop.
///
/// Writes are bounded by `write_timeout` and `close` by `close_grace`, so a
/// stalled peer can hold the writer for at most that long.
pub struct WsConnection {
    writer: Mutex<Option<Box<dyn WsSink>>>,
    write_timeout: Duration,
    close_grace: Duration,
}

impl Default for WsConnection {
    fn default() -> Self {
        let config = WsConfig::default();
        Self {
            writer: Mutex::new(None),
            write_timeout: config.write_timeout,
            close_grace: config.close_grace,
        }
    }
}

impl std::fmt::Debug for WsConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsConnection").finish_non_exhaustive()
    }
}

impl WsConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the write and close bounds from `config`
    pub fn from_config(config: &WsConfig) -> Self {
        Self {
            writer: Mutex::new(None),
            write_timeout: config.write_timeout,
            close_grace: config.close_grace,
        }
    }

    /// Dial `url` within `timeout`, install the writer, and return the reader.
    ///
    /// Any previously installed writer is closed first.
    #[instrument(skip(self, connector), fields(url = %url))]
    pub async fn connect(
        &self,
        connector: &dyn WsConnector,
        url: &str,
        timeout: Duration,
    ) -> Result<Box<dyn WsStream>, ExchangeError> {
        self.close().await;

        let (sink, stream) = tokio::time::timeout(timeout, connector.dial(url))
            .await
            .map_err(|_| {
                ExchangeError::ConnectError(format!("timed out after {:?} dialing {}", timeout, url))
            })??;

        *self.writer.lock().await = Some(sink);
        debug!("WebSocket connected");
        Ok(stream)
    }

    /// Write one text frame.
    ///
    /// A failed or timed out write drops the writer, so the connection stays
    /// unwritable until the next `connect`.
    pub async fn send(&self, text: &str) -> Result<(), ExchangeError> {
        let mut writer = self.writer.lock().await;
        let sink = writer
            .as_mut()
            .ok_or_else(|| ExchangeError::SendError("WebSocket is not connected".to_string()))?;

        trace!(frame = %text, "Sending frame");
        let result = tokio::time::timeout(self.write_timeout, sink.send_text(text.to_string()))
            .await
            .unwrap_or_else(|_| {
                Err(ExchangeError::SendError(format!(
                    "write did not complete within {:?}",
                    self.write_timeout
                )))
            });

        if let Err(e) = result {
            *writer = None;
            return Err(e);
        }
        Ok(())
    }

    pub async fn is_writable(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Close the socket. Safe to call repeatedly and on a never-opened connection.
    ///
    /// Gives up after `close_grace` if a write still holds the writer; that
    /// write drops the sink itself when it fails.
    pub async fn close(&self) {
        let Ok(mut writer) = tokio::time::timeout(self.close_grace, self.writer.lock()).await else {
            warn!(grace = ?self.close_grace, "Writer still busy, abandoning socket");
            return;
        };
        let sink = writer.take();
        drop(writer);

        if let Some(mut sink) = sink {
            match tokio::time::timeout(self.close_grace, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(error = %e, "Error while closing WebSocket"),
                Err(_) => warn!("WebSocket close handshake timed out"),
            }
        }
    }

    /// Read until the next frame that matters to the session.
    ///
    /// Binary frames are gunzipped. Application pings are answered here,
    /// before the next frame is read, and never surface to the caller.
    /// `Some(Err(DecodeError))` reports one bad frame; the stream is still
    /// usable. `None` means the connection is gone.
    pub async fn next_message<C: WsCodec + ?Sized>(
        &self,
        stream: &mut dyn WsStream,
        codec: &C,
    ) -> Option<Result<InboundMessage, ExchangeError>> {
        loop {
            let text = match stream.read_frame().await? {
                Ok(Frame::Text(text)) => text,
                Ok(Frame::Binary(data)) => match decompress_gzip(&data) {
                    Ok(text) => text,
                    Err(e) => return Some(Err(e)),
                },
                Ok(Frame::Ping(_) | Frame::Pong(_)) => continue,
                Ok(Frame::Close) => {
                    debug!("Peer sent close frame");
                    return None;
                }
                Err(e) => {
                    warn!(error = %e, "WebSocket read failed");
                    return None;
                }
            };

            match codec.decode_message(&text) {
                Ok(InboundMessage::Ping(ts)) => {
                    trace!(ts, "Answering ping");
                    let pong = match codec.encode_pong(ts) {
                        Ok(pong) => pong,
                        Err(e) => return Some(Err(e)),
                    };
                    if let Err(e) = self.send(&pong).await {
                        return Some(Err(e));
                    }
                }
                Ok(message) => return Some(Ok(message)),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
