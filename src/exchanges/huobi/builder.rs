use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::{
    ReqwestTransport, RestClient, RestClientConfig, WsSession, WsSessionBuilder,
};
use crate::exchanges::huobi::auth::HuobiWsAuth;
use crate::exchanges::huobi::codec::{HuobiAccountCodec, HuobiMarketCodec};
use crate::exchanges::huobi::{websocket_url, ACCOUNT_WS_PATH, MARKET_WS_PATH};
use std::sync::Arc;

/// REST client for `config.host()`. Signed calls need credentials.
pub fn build_rest_client(config: &ExchangeConfig) -> Result<RestClient, ExchangeError> {
    build_rest_client_with(config, &RestClientConfig::default())
}

pub fn build_rest_client_with(
    config: &ExchangeConfig,
    rest_config: &RestClientConfig,
) -> Result<RestClient, ExchangeError> {
    let transport = ReqwestTransport::new(rest_config)?;
    RestClient::new(transport, config)
}

/// Builder for the public market feed, for callers that need a custom
/// connector or `WsConfig`
pub fn market_session_builder(config: &ExchangeConfig) -> WsSessionBuilder<HuobiMarketCodec> {
    WsSession::builder(
        websocket_url(config.host(), MARKET_WS_PATH),
        HuobiMarketCodec,
    )
}

/// Builder for the authenticated account feed
pub fn account_session_builder(
    config: &ExchangeConfig,
) -> Result<WsSessionBuilder<HuobiAccountCodec>, ExchangeError> {
    let auth = HuobiWsAuth::from_config(config)?;
    Ok(WsSession::builder(
        websocket_url(config.host(), ACCOUNT_WS_PATH),
        HuobiAccountCodec,
    )
    .with_authenticator(Arc::new(auth)))
}

/// Public market data session (`wss://{host}/ws`)
pub fn build_market_session(config: &ExchangeConfig) -> WsSession<HuobiMarketCodec> {
    market_session_builder(config).build()
}

/// Authenticated account and order session (`wss://{host}/ws/v2`)
pub fn build_account_session(
    config: &ExchangeConfig,
) -> Result<WsSession<HuobiAccountCodec>, ExchangeError> {
    Ok(account_session_builder(config)?.build())
}
