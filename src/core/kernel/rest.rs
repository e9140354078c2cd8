use crate::core::config::ExchangeConfig;
use crate::core::errors::ExchangeError;
use crate::core::kernel::url_builder::{PrivateUrlBuilder, PublicUrlBuilder};
use crate::core::types::Params;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{instrument, trace};

/// Raw HTTP capability the SDK sits on.
///
/// Retries and connection pooling belong to the implementation, not to the
/// callers in this crate.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<String, ExchangeError>;

    async fn post(&self, url: &str, body: &str) -> Result<String, ExchangeError>;
}

/// Configuration for the reqwest transport
#[derive(Clone, Debug)]
pub struct RestClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string to include in requests
    pub user_agent: String,
}

impl Default for RestClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            user_agent: concat!("huobi-sdk/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl RestClientConfig {
    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// `HttpTransport` backed by a pooled `reqwest::Client`
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(config: &RestClientConfig) -> Result<Self, ExchangeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { client })
    }

    async fn handle_response(response: Response) -> Result<String, ExchangeError> {
        let status = response.status();
        let body = response.text().await?;

        trace!(%status, "Response body: {}", body);

        if status.is_success() {
            Ok(body)
        } else {
            Err(ExchangeError::ApiError {
                code: i32::from(status.as_u16()),
                message: body,
            })
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<String, ExchangeError> {
        let response = self.client.get(url).send().await?;
        Self::handle_response(response).await
    }

    async fn post(&self, url: &str, body: &str) -> Result<String, ExchangeError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await?;
        Self::handle_response(response).await
    }
}

/// Composes the URL builders with a transport and decodes Huobi envelopes.
pub struct RestClient<T: HttpTransport = ReqwestTransport> {
    transport: T,
    public: PublicUrlBuilder,
    private: Option<PrivateUrlBuilder>,
}

impl<T: HttpTransport> std::fmt::Debug for RestClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("public", &self.public)
            .field("has_credentials", &self.private.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: HttpTransport> RestClient<T> {
    /// Credentials in `config` are optional; without them only public calls work.
    pub fn new(transport: T, config: &ExchangeConfig) -> Result<Self, ExchangeError> {
        let private = if config.has_credentials() {
            Some(PrivateUrlBuilder::from_config(config)?)
        } else {
            None
        };

        Ok(Self {
            transport,
            public: PublicUrlBuilder::new(config.host())?,
            private,
        })
    }

    pub fn with_private_builder(mut self, builder: PrivateUrlBuilder) -> Self {
        self.private = Some(builder);
        self
    }

    fn private(&self) -> Result<&PrivateUrlBuilder, ExchangeError> {
        self.private.as_ref().ok_or_else(|| {
            crate::core::config::ConfigError::InvalidConfiguration(
                "Signed request requires access and secret keys".to_string(),
            )
            .into()
        })
    }

    #[instrument(skip(self, params), fields(path = %path))]
    pub async fn get_public<R: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<&Params>,
    ) -> Result<R, ExchangeError> {
        let url = self.public.build(path, params);
        let body = self.transport.get(&url).await?;
        decode_envelope(&body)
    }

    #[instrument(skip(self, params), fields(path = %path))]
    pub async fn get_signed<R: DeserializeOwned>(
        &self,
        path: &str,
        params: Option<&Params>,
    ) -> Result<R, ExchangeError> {
        let url = self.private()?.build("GET", path, params)?;
        let body = self.transport.get(&url).await?;
        decode_envelope(&body)
    }

    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn post_signed<B, R>(&self, path: &str, body: &B) -> Result<R, ExchangeError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let body = serde_json::to_string(body)
            .map_err(|e| ExchangeError::EncodingError(format!("Failed to encode body: {}", e)))?;
        let url = self.private()?.build("POST", path, None)?;
        let response = self.transport.post(&url, &body).await?;
        decode_envelope(&response)
    }
}

/// Parse a response body and reject error envelopes.
///
/// v1 endpoints answer `{"status":"ok"|"error", "err-code", "err-msg"}`,
/// v2 endpoints answer `{"code":200, "message"}`.
pub fn decode_envelope<R: DeserializeOwned>(body: &str) -> Result<R, ExchangeError> {
    let value: Value = serde_json::from_str(body)?;

    if value.get("status").and_then(Value::as_str) == Some("error") {
        let message = format!(
            "{}: {}",
            value.get("err-code").and_then(Value::as_str).unwrap_or("unknown"),
            value.get("err-msg").and_then(Value::as_str).unwrap_or_default()
        );
        return Err(ExchangeError::ApiError { code: 0, message });
    }

    if let Some(code) = value.get("code").and_then(Value::as_i64) {
        if code != 200 {
            return Err(ExchangeError::ApiError {
                code: i32::try_from(code).unwrap_or(i32::MAX),
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
    }

    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        requests: Mutex<Vec<(String, Option<String>)>>,
        response: String,
    }

    #[async_trait]
    impl HttpTransport for RecordingTransport {
        async fn get(&self, url: &str) -> Result<String, ExchangeError> {
            self.requests.lock().unwrap().push((url.to_string(), None));
            Ok(self.response.clone())
        }

        async fn post(&self, url: &str, body: &str) -> Result<String, ExchangeError> {
            self.requests
                .lock()
                .unwrap()
                .push((url.to_string(), Some(body.to_string())));
            Ok(self.response.clone())
        }
    }

    #[derive(Debug, Deserialize)]
    struct Accounts {
        status: String,
        data: Vec<Value>,
    }

    fn client(response: &str) -> RestClient<RecordingTransport> {
        let transport = RecordingTransport {
            response: response.to_string(),
            ..Default::default()
        };
        let config = ExchangeConfig::new("ak".to_string(), "sk".to_string());
        RestClient::new(transport, &config).unwrap()
    }

    #[tokio::test]
    async fn test_get_signed_builds_signed_url() {
        let client = client(r#"{"status":"ok","data":[]}"#);
        let accounts: Accounts = client.get_signed("/v1/account/accounts", None).await.unwrap();
        assert_eq!(accounts.status, "ok");
        assert!(accounts.data.is_empty());

        let requests = client.transport.requests.lock().unwrap();
        assert!(requests[0].0.starts_with("https://api.huobi.pro/v1/account/accounts?AccessKeyId=ak"));
        assert!(requests[0].0.contains("&Signature="));
    }

    #[tokio::test]
    async fn test_post_signed_sends_json_body() {
        let client = client(r#"{"status":"ok","data":"59378"}"#);
        let body = serde_json::json!({"client-order-id": "abc"});
        let response: Value = client
            .post_signed("/v1/order/orders/submitCancelClientOrder", &body)
            .await
            .unwrap();
        assert_eq!(response["data"], "59378");

        let requests = client.transport.requests.lock().unwrap();
        assert_eq!(requests[0].1.as_deref(), Some(r#"{"client-order-id":"abc"}"#));
    }

    #[tokio::test]
    async fn test_signed_call_without_credentials() {
        let transport = RecordingTransport::default();
        let client = RestClient::new(transport, &ExchangeConfig::read_only()).unwrap();
        let err = client
            .get_signed::<Value>("/v1/account/accounts", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ConfigurationError(_)));
        assert!(client.transport.requests.lock().unwrap().is_empty());
    }

    #[test]
    fn test_decode_error_envelopes() {
        let err = decode_envelope::<Value>(
            r#"{"status":"error","err-code":"api-signature-not-valid","err-msg":"Signature not valid"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("api-signature-not-valid"));

        let err = decode_envelope::<Value>(r#"{"code":2002,"message":"invalid.auth.state"}"#)
            .unwrap_err();
        assert!(matches!(err, ExchangeError::ApiError { code: 2002, .. }));

        let ok: Value = decode_envelope(r#"{"code":200,"data":[1]}"#).unwrap();
        assert_eq!(ok["data"][0], 1);
    }
}
