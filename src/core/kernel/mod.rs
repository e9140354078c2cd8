//! Exchange-neutral transport kernel.
//!
//! - `signer` / `url_builder`: canonical query strings, HMAC signatures and
//!   ready-to-call URLs. Pure string work, no I/O.
//! - `rest`: the HTTP transport seam and a client that composes it with the
//!   URL builders.
//! - `codec`: the seam between raw frames and exchange dialects.
//! - `ws`: one physical socket (dial, single writer, gzip, heartbeat replies).
//! - `subscriptions`: what should be active on a session, replayed per epoch.
//! - `session`: the state machine callers use, with reconnect and replay.
//!
//! # Example
//! ```rust,no_run
//! use huobi_sdk::core::config::ExchangeConfig;
//! use huobi_sdk::core::types::WsEvent;
//! use huobi_sdk::exchanges::huobi::{build_market_session, topics};
//!
//! # async fn example() -> Result<(), huobi_sdk::ExchangeError> {
//! let session = build_market_session(&ExchangeConfig::read_only());
//! session
//!     .subscribe(&topics::kline("btcusdt", "1min"), |event: &WsEvent| {
//!         println!("{}: {}", event.topic, event.data);
//!     })
//!     .await?;
//! session.open().await?;
//! # session.close().await;
//! # Ok(())
//! # }
//! ```
pub mod codec;
pub mod rest;
pub mod session;
pub mod signer;
pub mod subscriptions;
pub mod url_builder;
pub mod ws;

pub use codec::{decompress_gzip, InboundMessage, WsCodec};
pub use rest::{decode_envelope, HttpTransport, ReqwestTransport, RestClient, RestClientConfig};
pub use session::{WsAuthenticator, WsSession, WsSessionBuilder};
pub use signer::{
    sign_request, to_query_params, AuthScheme, Clock, FixedClock, HmacSigner, SignedRequest,
    Signer, SystemClock,
};
pub use subscriptions::{AddOutcome, Subscription, SubscriptionRegistry};
pub use url_builder::{PrivateUrlBuilder, PublicUrlBuilder};
pub use ws::{
    Frame, ReconnectPolicy, TungsteniteConnector, WsConfig, WsConnection, WsConnector, WsSink,
    WsStream,
};
