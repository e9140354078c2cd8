use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Fields shared by every market-feed frame
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSocketResponseBase {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub ch: Option<String>,
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(rename = "err-code", default)]
    pub err_code: Option<String>,
    #[serde(rename = "err-msg", default)]
    pub err_msg: Option<String>,
}

/// One `[price, amount]` level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel(pub Decimal, pub Decimal);

impl PriceLevel {
    pub fn price(&self) -> Decimal {
        self.0
    }

    pub fn amount(&self) -> Decimal {
        self.1
    }
}

/// Order book snapshot of `market.$symbol.depth.$step`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Depth {
    #[serde(default)]
    pub ts: Option<i64>,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
}

impl Depth {
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }
}

/// Candlestick of `market.$symbol.kline.$period` and `market.$symbol.detail`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candlestick {
    /// Bar start in epoch seconds
    pub id: i64,
    pub open: Decimal,
    pub close: Decimal,
    pub low: Decimal,
    pub high: Decimal,
    pub amount: Decimal,
    pub vol: Decimal,
    pub count: i64,
}

/// A full depth frame. Pushes carry `tick`, request replies carry `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeDepthResponse {
    #[serde(flatten)]
    pub base: WebSocketResponseBase,
    #[serde(default)]
    pub data: Option<Depth>,
    #[serde(default)]
    pub tick: Option<Depth>,
}

impl SubscribeDepthResponse {
    pub fn depth(&self) -> Option<&Depth> {
        self.tick.as_ref().or(self.data.as_ref())
    }
}

/// A full 24h candlestick frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeLast24hCandlestickResponse {
    #[serde(flatten)]
    pub base: WebSocketResponseBase,
    #[serde(default)]
    pub data: Option<Candlestick>,
    #[serde(default)]
    pub tick: Option<Candlestick>,
}

impl SubscribeLast24hCandlestickResponse {
    pub fn candlestick(&self) -> Option<&Candlestick> {
        self.tick.as_ref().or(self.data.as_ref())
    }
}
