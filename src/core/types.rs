use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::core::errors::ExchangeError;

/// Query parameters keyed by name. `BTreeMap` iteration order is byte-wise
/// lexicographic on the names, which is the order the signature requires.
pub type Params = BTreeMap<String, String>;

/// Lifecycle state of a WebSocket session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    Ready,
    Closing,
}

impl SessionState {
    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{Authenticating, Closing, Connected, Connecting, Disconnected, Ready};

        match (self, next) {
            (_, Closing) => self != Closing,
            (Closing, Disconnected) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Connected | Disconnected) => true,
            (Connected, Authenticating | Ready | Disconnected) => true,
            (Authenticating, Ready | Disconnected) => true,
            (Ready, Ready | Disconnected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Authenticating => "authenticating",
            Self::Ready => "ready",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// One data message routed to a subscription handler.
#[derive(Debug, Clone, PartialEq)]
pub struct WsEvent {
    pub topic: String,
    /// Exchange-side timestamp in milliseconds, when the frame carries one
    pub ts: Option<i64>,
    /// The `tick` or `data` body of the frame
    pub data: Value,
}

impl WsEvent {
    pub fn new(topic: impl Into<String>, ts: Option<i64>, data: Value) -> Self {
        Self {
            topic: topic.into(),
            ts,
            data,
        }
    }

    /// Deserialize the payload into a typed model
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ExchangeError> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| ExchangeError::DecodeError(format!("{}: {}", self.topic, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_allowed_transitions() {
        use SessionState::*;

        assert!(Disconnected.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Disconnected));
        assert!(Connected.can_transition_to(Authenticating));
        assert!(Connected.can_transition_to(Ready));
        assert!(Authenticating.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Ready));
        assert!(Ready.can_transition_to(Disconnected));
        assert!(Ready.can_transition_to(Closing));
        assert!(Closing.can_transition_to(Disconnected));
    }

    #[test]
    fn test_rejected_transitions() {
        use SessionState::*;

        assert!(!Connecting.can_transition_to(Ready));
        assert!(!Disconnected.can_transition_to(Ready));
        assert!(!Closing.can_transition_to(Connecting));
        assert!(!Closing.can_transition_to(Closing));
        assert!(!Authenticating.can_transition_to(Connected));
    }

    #[test]
    fn test_event_parse() {
        #[derive(Debug, Deserialize)]
        struct Tick {
            close: f64,
        }

        let event = WsEvent::new("market.btcusdt.detail", Some(1), json!({"close": 42.5}));
        let tick: Tick = event.parse().unwrap();
        assert!((tick.close - 42.5).abs() < f64::EPSILON);

        let bad = WsEvent::new("market.btcusdt.detail", None, json!("nope"));
        assert!(bad.parse::<Tick>().unwrap_err().is_decode_error());
    }
}
