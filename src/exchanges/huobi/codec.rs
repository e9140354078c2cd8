use crate::core::errors::ExchangeError;
use crate::core::kernel::{InboundMessage, WsCodec};
use crate::core::types::WsEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const SUCCESS_CODE: i64 = 200;

fn encode<T: Serialize>(request: &T) -> Result<String, ExchangeError> {
    serde_json::to_string(request)
        .map_err(|e| ExchangeError::EncodingError(format!("Failed to encode request: {}", e)))
}

fn parse<'a, T: Deserialize<'a>>(text: &'a str) -> Result<T, ExchangeError> {
    serde_json::from_str(text)
        .map_err(|e| ExchangeError::DecodeError(format!("Invalid frame {}: {}", text, e)))
}

/// Market feed on `/ws`.
///
/// Frames arrive gzip-compressed. Heartbeats are `{"ping":n}` and must be
/// answered with `{"pong":n}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HuobiMarketCodec;

#[derive(Serialize)]
struct MarketRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    sub: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unsub: Option<&'a str>,
    id: &'a str,
}

#[derive(Serialize)]
struct MarketPong {
    pong: i64,
}

#[derive(Deserialize)]
struct MarketFrame {
    ping: Option<i64>,
    id: Option<Value>,
    status: Option<String>,
    subbed: Option<String>,
    unsubbed: Option<String>,
    ch: Option<String>,
    ts: Option<i64>,
    tick: Option<Value>,
    data: Option<Value>,
    #[serde(rename = "err-code")]
    err_code: Option<String>,
    #[serde(rename = "err-msg")]
    err_msg: Option<String>,
}

fn id_to_string(id: Value) -> String {
    match id {
        Value::String(id) => id,
        other => other.to_string(),
    }
}

impl WsCodec for HuobiMarketCodec {
    fn encode_subscription(&self, topic: &str, id: &str) -> Result<String, ExchangeError> {
        encode(&MarketRequest {
            sub: Some(topic),
            unsub: None,
            id,
        })
    }

    fn encode_unsubscription(&self, topic: &str, id: &str) -> Result<String, ExchangeError> {
        encode(&MarketRequest {
            sub: None,
            unsub: Some(topic),
            id,
        })
    }

    fn encode_pong(&self, ts: i64) -> Result<String, ExchangeError> {
        encode(&MarketPong { pong: ts })
    }

    fn decode_message(&self, text: &str) -> Result<InboundMessage, ExchangeError> {
        let frame: MarketFrame = parse(text)?;

        if let Some(ts) = frame.ping {
            return Ok(InboundMessage::Ping(ts));
        }

        if frame.status.as_deref() == Some("error") {
            return Ok(InboundMessage::SubscribeError {
                topic: frame.subbed,
                id: frame.id.map(id_to_string),
                message: format!(
                    "{}: {}",
                    frame.err_code.unwrap_or_default(),
                    frame.err_msg.unwrap_or_default()
                ),
            });
        }

        if let Some(topic) = frame.subbed {
            return Ok(InboundMessage::SubscribeAck { topic });
        }
        if let Some(topic) = frame.unsubbed {
            return Ok(InboundMessage::Unsubscribed { topic });
        }

        match (frame.ch, frame.tick.or(frame.data)) {
            (Some(topic), Some(payload)) => {
                Ok(InboundMessage::Data(WsEvent::new(topic, frame.ts, payload)))
            }
            _ => Ok(InboundMessage::Other),
        }
    }
}

/// Account and order feed on `/ws/v2`.
///
/// Every frame carries an `action`: `ping`/`pong` heartbeats, `req` for the
/// auth exchange, `sub` for subscriptions and `push` for data.
#[derive(Debug, Clone, Copy, Default)]
pub struct HuobiAccountCodec;

#[derive(Serialize)]
struct AccountRequest<'a> {
    action: &'a str,
    ch: &'a str,
    cid: &'a str,
}

#[derive(Serialize, Deserialize)]
struct Heartbeat {
    ts: i64,
}

#[derive(Serialize)]
struct AccountPong {
    action: &'static str,
    data: Heartbeat,
}

#[derive(Deserialize)]
struct AccountFrame {
    action: Option<String>,
    code: Option<i64>,
    ch: Option<String>,
    message: Option<String>,
    data: Option<Value>,
}

impl WsCodec for HuobiAccountCodec {
    fn encode_subscription(&self, topic: &str, id: &str) -> Result<String, ExchangeError> {
        encode(&AccountRequest {
            action: "sub",
            ch: topic,
            cid: id,
        })
    }

    fn encode_unsubscription(&self, topic: &str, id: &str) -> Result<String, ExchangeError> {
        encode(&AccountRequest {
            action: "unsub",
            ch: topic,
            cid: id,
        })
    }

    fn encode_pong(&self, ts: i64) -> Result<String, ExchangeError> {
        encode(&AccountPong {
            action: "pong",
            data: Heartbeat { ts },
        })
    }

    fn decode_message(&self, text: &str) -> Result<InboundMessage, ExchangeError> {
        let frame: AccountFrame = parse(text)?;
        let succeeded = frame.code == Some(SUCCESS_CODE);
        let message = || frame.message.clone().unwrap_or_default();

        match frame.action.as_deref() {
            Some("ping") => {
                let heartbeat: Heartbeat = frame
                    .data
                    .clone()
                    .ok_or_else(|| ExchangeError::DecodeError(format!("Ping without data: {}", text)))
                    .and_then(|data| {
                        serde_json::from_value(data).map_err(|e| {
                            ExchangeError::DecodeError(format!("Invalid ping {}: {}", text, e))
                        })
                    })?;
                Ok(InboundMessage::Ping(heartbeat.ts))
            }
            Some("req") if frame.ch.as_deref() == Some("auth") => {
                if succeeded {
                    Ok(InboundMessage::AuthAck)
                } else {
                    Ok(InboundMessage::AuthRejected {
                        code: frame.code.unwrap_or_default(),
                        message: message(),
                    })
                }
            }
            Some("sub") => match (succeeded, frame.ch.clone()) {
                (true, Some(topic)) => Ok(InboundMessage::SubscribeAck { topic }),
                (false, topic) => Ok(InboundMessage::SubscribeError {
                    topic,
                    id: None,
                    message: format!("{}: {}", frame.code.unwrap_or_default(), message()),
                }),
                (true, None) => Ok(InboundMessage::Other),
            },
            Some("unsub") => match frame.ch.clone() {
                Some(topic) if succeeded => Ok(InboundMessage::Unsubscribed { topic }),
                _ => Ok(InboundMessage::Other),
            },
            Some("push") => match (frame.ch.clone(), frame.data.clone()) {
                (Some(topic), Some(data)) => Ok(InboundMessage::Data(WsEvent::new(topic, None, data))),
                _ => Ok(InboundMessage::Other),
            },
            _ => Ok(InboundMessage::Other),
        }
    }
}
