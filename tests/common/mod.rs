//! In-memory WebSocket transport and fixtures shared by the session tests

#![allow(dead_code)]

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use huobi_sdk::core::kernel::{Frame, ReconnectPolicy, WsConfig, WsConnector, WsSink, WsStream};
use huobi_sdk::{ExchangeError, MessageHandler, SessionState, WsEvent};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub const STEP: Duration = Duration::from_secs(2);

pub fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

pub fn fast_config() -> WsConfig {
    WsConfig::default()
        .with_connect_timeout(Duration::from_millis(200))
        .with_ack_timeout(Duration::from_secs(1))
        .with_write_timeout(Duration::from_secs(1))
        .with_close_grace(Duration::from_millis(200))
        .with_reconnect(ReconnectPolicy {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(50),
            max_attempts: None,
        })
}

/// The exchange's end of one scripted connection
pub struct ServerSide {
    inbound: mpsc::UnboundedSender<Frame>,
    outbound: mpsc::UnboundedReceiver<String>,
}

impl ServerSide {
    pub fn send_text(&self, text: &str) {
        self.inbound.send(Frame::Text(text.to_string())).unwrap();
    }

    pub fn send_gzip(&self, text: &str) {
        self.inbound.send(Frame::Binary(gzip(text))).unwrap();
    }

    pub fn send_binary(&self, data: &[u8]) {
        self.inbound.send(Frame::Binary(data.to_vec())).unwrap();
    }

    /// Acknowledge a v1 `{"sub","id"}` request
    pub fn ack_sub(&self, request: &Value) {
        let ack = json!({
            "id": request["id"],
            "status": "ok",
            "subbed": request["sub"],
            "ts": 1_630_000_000_000_i64,
        });
        self.send_gzip(&ack.to_string());
    }

    pub fn push(&self, topic: &str, tick: Value) {
        let frame = json!({"ch": topic, "ts": 1_630_000_000_000_i64, "tick": tick});
        self.send_gzip(&frame.to_string());
    }

    /// Next frame written by the client
    pub async fn expect_frame(&mut self) -> String {
        tokio::time::timeout(STEP, self.outbound.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client closed the connection")
    }

    pub async fn expect_json(&mut self) -> Value {
        serde_json::from_str(&self.expect_frame().await).unwrap()
    }

    /// Resolves once the client side of this connection is gone
    pub async fn expect_closed(&mut self) {
        let closed = tokio::time::timeout(STEP, async {
            while self.outbound.recv().await.is_some() {}
        })
        .await;
        assert!(closed.is_ok(), "client kept the connection open");
    }

    /// Drop the connection from the exchange side
    pub fn disconnect(self) {}
}

struct ScriptedEpoch {
    inbound: mpsc::UnboundedReceiver<Frame>,
    outbound: mpsc::UnboundedSender<String>,
    stall_writes: bool,
}

/// `WsConnector` that hands out pre-scripted connections in order.
///
/// Dialing with nothing queued fails with `ConnectError`; a hanging connector
/// never completes a dial.
#[derive(Default)]
pub struct MockConnector {
    epochs: Mutex<VecDeque<ScriptedEpoch>>,
    dials: AtomicUsize,
    hang: bool,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn hanging() -> Arc<Self> {
        Arc::new(Self {
            hang: true,
            ..Self::default()
        })
    }

    /// Queue one connection and return the exchange's end of it
    pub fn add_epoch(&self) -> ServerSide {
        self.queue_epoch(false)
    }

    /// Queue a connection whose client writes never complete
    pub fn add_stalled_epoch(&self) -> ServerSide {
        self.queue_epoch(true)
    }

    fn queue_epoch(&self, stall_writes: bool) -> ServerSide {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        self.epochs.lock().unwrap().push_back(ScriptedEpoch {
            inbound: inbound_rx,
            outbound: outbound_tx,
            stall_writes,
        });
        ServerSide {
            inbound: inbound_tx,
            outbound: outbound_rx,
        }
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

struct MockSink {
    outbound: mpsc::UnboundedSender<String>,
    stall_writes: bool,
}

struct MockStream(mpsc::UnboundedReceiver<Frame>);

#[async_trait]
impl WsConnector for MockConnector {
    async fn dial(
        &self,
        url: &str,
    ) -> Result<(Box<dyn WsSink>, Box<dyn WsStream>), ExchangeError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }

        let epoch = self
            .epochs
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ExchangeError::ConnectError(format!("{}: connection refused", url)))?;

        Ok((
            Box::new(MockSink {
                outbound: epoch.outbound,
                stall_writes: epoch.stall_writes,
            }),
            Box::new(MockStream(epoch.inbound)),
        ))
    }
}

#[async_trait]
impl WsSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<(), ExchangeError> {
        if self.stall_writes {
            std::future::pending::<()>().await;
        }
        self.outbound
            .send(text)
            .map_err(|_| ExchangeError::SendError("peer went away".to_string()))
    }

    async fn send_binary(&mut self, _data: Vec<u8>) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ExchangeError> {
        Ok(())
    }
}

#[async_trait]
impl WsStream for MockStream {
    async fn read_frame(&mut self) -> Option<Result<Frame, ExchangeError>> {
        self.0.recv().await.map(Ok)
    }
}

/// Handler that keeps everything it is given
#[derive(Clone, Default)]
pub struct Recorder {
    pub events: Arc<Mutex<Vec<WsEvent>>>,
    pub errors: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn event_count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

impl MessageHandler for Recorder {
    fn handle(&self, event: &WsEvent) {
        self.events.lock().unwrap().push(event.clone());
    }

    fn on_error(&self, error: &ExchangeError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

pub async fn wait_for_state(states: &mut watch::Receiver<SessionState>, target: SessionState) {
    let reached = tokio::time::timeout(STEP, states.wait_for(|state| *state == target)).await;
    assert!(
        matches!(reached, Ok(Ok(_))),
        "session never reached {target}"
    );
}

/// Poll `condition` until it holds or the step timeout passes
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + STEP;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
