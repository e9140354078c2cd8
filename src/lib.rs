pub mod core;
pub mod exchanges;
pub mod utils;

pub use crate::core::config::{ConfigError, Credentials, ExchangeConfig};
pub use crate::core::errors::ExchangeError;
pub use crate::core::traits::{typed_handler, MessageHandler};
pub use crate::core::types::*;
pub use crate::exchanges::huobi::{build_account_session, build_market_session, build_rest_client};
