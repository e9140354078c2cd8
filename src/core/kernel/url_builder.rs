use crate::core::config::{ConfigError, Credentials, ExchangeConfig};
use crate::core::errors::ExchangeError;
use crate::core::kernel::signer::{
    canonical_query_string, Clock, HmacSigner, SignedRequest, Signer, SystemClock,
};
use crate::core::types::Params;
use std::sync::Arc;
use tracing::trace;

/// Builds signed URLs for private REST endpoints.
///
/// Holds the credentials and host for its whole lifetime and never performs
/// I/O. Every call takes a fresh timestamp, so the same logical request signed
/// twice yields two different (and both valid) signatures.
#[derive(Clone)]
pub struct PrivateUrlBuilder {
    host: String,
    signer: Arc<dyn Signer>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for PrivateUrlBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateUrlBuilder")
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

impl PrivateUrlBuilder {
    pub fn new(access_key: &str, secret_key: &str, host: &str) -> Result<Self, ExchangeError> {
        if host.is_empty() {
            return Err(ConfigError::MissingCredential("host").into());
        }
        let credentials = Credentials::new(access_key.to_string(), secret_key.to_string())?;

        Ok(Self {
            host: host.to_string(),
            signer: Arc::new(HmacSigner::new(credentials)),
            clock: Arc::new(SystemClock),
        })
    }

    pub fn from_config(config: &ExchangeConfig) -> Result<Self, ExchangeError> {
        let credentials = config.credentials()?;
        Self::new(credentials.access_key(), credentials.secret_key(), config.host())
    }

    /// Replace the wall clock, mainly for reproducible signatures in tests
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a custom signer implementation
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = signer;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Sign a request without rendering it
    pub fn sign(
        &self,
        method: &str,
        path: &str,
        params: Option<&Params>,
    ) -> Result<SignedRequest, ExchangeError> {
        let empty = Params::new();
        let params = params.unwrap_or(&empty);
        self.signer
            .sign(method, &self.host, path, params, self.clock.now())
    }

    /// `https://{host}{path}?{signed query}`
    pub fn build(
        &self,
        method: &str,
        path: &str,
        params: Option<&Params>,
    ) -> Result<String, ExchangeError> {
        let signed = self.sign(method, path, params)?;
        let url = format!("https://{}{}?{}", self.host, path, signed.query_string());
        trace!(method = %signed.method, path, "Built signed URL");
        Ok(url)
    }
}

/// Builds unsigned URLs for public market endpoints
#[derive(Debug, Clone)]
pub struct PublicUrlBuilder {
    host: String,
}

impl PublicUrlBuilder {
    pub fn new(host: &str) -> Result<Self, ExchangeError> {
        if host.is_empty() {
            return Err(ConfigError::MissingCredential("host").into());
        }
        Ok(Self {
            host: host.to_string(),
        })
    }

    pub fn build(&self, path: &str, params: Option<&Params>) -> String {
        let query = params
            .map(|params| {
                let pairs: Vec<(String, String)> = params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                canonical_query_string(&pairs)
            })
            .unwrap_or_default();

        if query.is_empty() {
            format!("https://{}{}", self.host, path)
        } else {
            format!("https://{}{}?{}", self.host, path, query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel::signer::FixedClock;
    use chrono::{TimeZone, Utc};

    fn builder() -> PrivateUrlBuilder {
        PrivateUrlBuilder::new("access-key", "secret-key", "api.huobi.pro").unwrap()
    }

    #[test]
    fn test_init_rejects_empty_arguments() {
        for (ak, sk, host) in [
            ("", "sk", "api.huobi.pro"),
            ("ak", "", "api.huobi.pro"),
            ("ak", "sk", ""),
        ] {
            let err = PrivateUrlBuilder::new(ak, sk, host).unwrap_err();
            assert!(matches!(err, ExchangeError::ConfigurationError(_)));
        }
    }

    #[test]
    fn test_get_without_params_is_signed() {
        let url = builder().build("GET", "/v1/account/accounts", None).unwrap();

        assert!(url.starts_with("https://api.huobi.pro/v1/account/accounts?"));
        for name in [
            "AccessKeyId=",
            "SignatureMethod=",
            "SignatureVersion=",
            "Timestamp=",
            "Signature=",
        ] {
            assert!(url.contains(name), "missing {name} in {url}");
        }
    }

    #[test]
    fn test_caller_params_merged() {
        let mut params = Params::new();
        params.insert("symbol".to_string(), "btcusdt".to_string());

        let signed = builder()
            .sign("GET", "/v1/order/openOrders", Some(&params))
            .unwrap();
        assert_eq!(signed.param("symbol"), Some("btcusdt"));
        assert!(signed.verify("secret-key"));
    }

    #[test]
    fn test_fixed_clock_reproduces_url() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let builder = builder().with_clock(Arc::new(FixedClock(at)));

        let first = builder.build("POST", "/v1/order/orders/place", None).unwrap();
        let second = builder.build("POST", "/v1/order/orders/place", None).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("Timestamp=2024-01-02T03%3A04%3A05"));
    }

    #[test]
    fn test_public_url() {
        let builder = PublicUrlBuilder::new("api.huobi.pro").unwrap();
        assert_eq!(
            builder.build("/v1/common/symbols", None),
            "https://api.huobi.pro/v1/common/symbols"
        );

        let mut params = Params::new();
        params.insert("symbol".to_string(), "btcusdt".to_string());
        params.insert("period".to_string(), "1min".to_string());
        assert_eq!(
            builder.build("/market/history/kline", Some(&params)),
            "https://api.huobi.pro/market/history/kline?period=1min&symbol=btcusdt"
        );
    }
}
