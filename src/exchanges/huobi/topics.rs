//! Channel names for the market (`/ws`) and account (`/ws/v2`) feeds.

/// `market.$symbol.kline.$period`, e.g. period `1min`, `1day`
pub fn kline(symbol: &str, period: &str) -> String {
    format!("market.{}.kline.{}", symbol, period)
}

/// `market.$symbol.depth.$step`, step `step0` through `step5`
pub fn depth(symbol: &str, step: &str) -> String {
    format!("market.{}.depth.{}", symbol, step)
}

/// Incremental market-by-price updates, `levels` of 5, 20 or 150
pub fn mbp(symbol: &str, levels: u32) -> String {
    format!("market.{}.mbp.{}", symbol, levels)
}

pub fn bbo(symbol: &str) -> String {
    format!("market.{}.bbo", symbol)
}

pub fn trade_detail(symbol: &str) -> String {
    format!("market.{}.trade.detail", symbol)
}

/// Rolling 24h candlestick
pub fn market_detail(symbol: &str) -> String {
    format!("market.{}.detail", symbol)
}

/// Order updates; `*` for every symbol
pub fn orders(symbol: &str) -> String {
    format!("orders#{}", symbol)
}

/// Balance updates. Mode `0` pushes on balance change, `1` also on available
/// balance change, `2` on every change with the account's total.
pub fn account_update(mode: u8) -> String {
    format!("accounts.update#{}", mode)
}

pub fn trade_clearing(symbol: &str, mode: u8) -> String {
    format!("trade.clearing#{}#{}", symbol, mode)
}
