pub mod auth;
pub mod builder;
pub mod codec;
pub mod topics;
pub mod types;

pub use auth::HuobiWsAuth;
pub use builder::{build_account_session, build_market_session, build_rest_client};
pub use codec::{HuobiAccountCodec, HuobiMarketCodec};
pub use types::{
    Candlestick, Depth, SubscribeDepthResponse, SubscribeLast24hCandlestickResponse,
    WebSocketResponseBase,
};

/// Market data feed (v1 protocol, gzip frames)
pub const MARKET_WS_PATH: &str = "/ws";

/// Account and order feed (v2 protocol, authenticated)
pub const ACCOUNT_WS_PATH: &str = "/ws/v2";

/// `wss://{host}{path}`
pub fn websocket_url(host: &str, path: &str) -> String {
    format!("wss://{}{}", host, path)
}
