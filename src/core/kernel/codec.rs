use crate::core::errors::ExchangeError;
use crate::core::types::WsEvent;
use flate2::read::GzDecoder;
use std::io::Read;

/// A decoded inbound frame, classified for the session state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Heartbeat request carrying the server timestamp to echo back
    Ping(i64),
    /// A subscribe request was accepted for `topic`
    SubscribeAck { topic: String },
    /// A subscribe request was refused. Some dialects only echo the request id.
    SubscribeError {
        topic: Option<String>,
        id: Option<String>,
        message: String,
    },
    Unsubscribed { topic: String },
    AuthAck,
    AuthRejected { code: i64, message: String },
    Data(WsEvent),
    /// Housekeeping frames with no meaning for the session
    Other,
}

/// Codec for exchange-specific WebSocket message encoding/decoding.
///
/// The kernel never inspects JSON itself; every frame it writes comes from
/// the codec and every text frame it reads is classified by the codec.
pub trait WsCodec: Send + Sync + 'static {
    /// Encode a subscribe request. `id` is chosen by the client and echoed
    /// back in the acknowledgement.
    fn encode_subscription(&self, topic: &str, id: &str) -> Result<String, ExchangeError>;

    fn encode_unsubscription(&self, topic: &str, id: &str) -> Result<String, ExchangeError>;

    /// Encode the reply to a `Ping` carrying `ts`
    fn encode_pong(&self, ts: i64) -> Result<String, ExchangeError>;

    /// Classify one decompressed text frame
    fn decode_message(&self, text: &str) -> Result<InboundMessage, ExchangeError>;
}

/// Inflate a gzip-compressed binary frame into UTF-8 text.
pub fn decompress_gzip(data: &[u8]) -> Result<String, ExchangeError> {
    let mut decoder = GzDecoder::new(data);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .map_err(|e| ExchangeError::DecodeError(format!("gzip decompression failed: {}", e)))?;
    Ok(text)
}
