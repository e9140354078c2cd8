use crate::core::config::Credentials;
use crate::core::errors::ExchangeError;
use crate::core::types::Params;
use base64::engine::general_purpose;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_METHOD: &str = "HmacSHA256";

/// Everything except RFC 3986 unreserved characters is escaped.
const STRICT_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Source of the signing timestamp
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always returns the same instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Names and version of the injected authentication parameters.
///
/// REST calls and the v2 WebSocket auth request sign the same way but spell
/// the parameters differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthScheme {
    pub access_key_name: &'static str,
    pub signature_method_name: &'static str,
    pub signature_version_name: &'static str,
    pub signature_version: &'static str,
    pub timestamp_name: &'static str,
    pub signature_name: &'static str,
}

impl AuthScheme {
    pub const REST: Self = Self {
        access_key_name: "AccessKeyId",
        signature_method_name: "SignatureMethod",
        signature_version_name: "SignatureVersion",
        signature_version: "2",
        timestamp_name: "Timestamp",
        signature_name: "Signature",
    };

    pub const WEBSOCKET_V2: Self = Self {
        access_key_name: "accessKey",
        signature_method_name: "signatureMethod",
        signature_version_name: "signatureVersion",
        signature_version: "2.1",
        timestamp_name: "timestamp",
        signature_name: "signature",
    };
}

/// The output of one signing operation. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub method: String,
    pub host: String,
    pub path: String,
    /// Sorted by name, unencoded, without the signature
    pub params: Vec<(String, String)>,
    /// UTC, `YYYY-MM-DDThh:mm:ss`
    pub timestamp: String,
    /// Base64 HMAC-SHA256 digest
    pub signature: String,
    pub scheme: AuthScheme,
}

impl SignedRequest {
    /// Sorted, percent-encoded query string with the signature appended last
    pub fn query_string(&self) -> String {
        let canonical = canonical_query_string(&self.params);
        let signature = format!(
            "{}={}",
            self.scheme.signature_name,
            percent_encode(&self.signature)
        );

        if canonical.is_empty() {
            signature
        } else {
            format!("{}&{}", canonical, signature)
        }
    }

    /// Look up an injected or caller parameter by name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The exact text that was fed to the HMAC
    pub fn payload(&self) -> String {
        signing_payload(
            &self.method,
            &self.host,
            &self.path,
            &canonical_query_string(&self.params),
        )
    }

    /// Recompute the HMAC with `secret_key` and compare in constant time
    pub fn verify(&self, secret_key: &str) -> bool {
        let Ok(expected) = general_purpose::STANDARD.decode(&self.signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(secret_key.as_bytes()) else {
            return false;
        };
        mac.update(self.payload().as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

/// Signer trait for request authentication
///
/// Implementations must be deterministic for a fixed `timestamp`.
pub trait Signer: Send + Sync {
    fn sign(
        &self,
        method: &str,
        host: &str,
        path: &str,
        params: &Params,
        timestamp: DateTime<Utc>,
    ) -> Result<SignedRequest, ExchangeError>;
}

/// HMAC-SHA256 signer holding one credential pair
#[derive(Debug, Clone)]
pub struct HmacSigner {
    credentials: Credentials,
    scheme: AuthScheme,
}

impl HmacSigner {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            scheme: AuthScheme::REST,
        }
    }

    pub fn with_scheme(mut self, scheme: AuthScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn access_key(&self) -> &str {
        self.credentials.access_key()
    }
}

impl Signer for HmacSigner {
    fn sign(
        &self,
        method: &str,
        host: &str,
        path: &str,
        params: &Params,
        timestamp: DateTime<Utc>,
    ) -> Result<SignedRequest, ExchangeError> {
        sign_request(
            self.scheme,
            method,
            host,
            path,
            params,
            self.credentials.access_key(),
            self.credentials.secret_key(),
            timestamp,
        )
    }
}

/// Sign a request the way Huobi verifies it.
///
/// Injects the auth parameters, sorts all names byte-wise, percent-encodes the
/// values and signs `METHOD\nhost\npath\nquery` with the secret key.
#[allow(clippy::too_many_arguments)]
pub fn sign_request(
    scheme: AuthScheme,
    method: &str,
    host: &str,
    path: &str,
    params: &Params,
    access_key: &str,
    secret_key: &str,
    timestamp: DateTime<Utc>,
) -> Result<SignedRequest, ExchangeError> {
    if access_key.is_empty() {
        return Err(crate::core::config::ConfigError::MissingCredential("access key").into());
    }
    if secret_key.is_empty() {
        return Err(crate::core::config::ConfigError::MissingCredential("secret key").into());
    }

    if params.contains_key(scheme.signature_name) {
        return Err(ExchangeError::EncodingError(format!(
            "{} is computed by the signer and cannot be passed as a parameter",
            scheme.signature_name
        )));
    }

    let method = method.to_uppercase();
    let timestamp = format_timestamp(timestamp);

    let mut all = params.clone();
    all.insert(scheme.access_key_name.to_string(), access_key.to_string());
    all.insert(
        scheme.signature_method_name.to_string(),
        SIGNATURE_METHOD.to_string(),
    );
    all.insert(
        scheme.signature_version_name.to_string(),
        scheme.signature_version.to_string(),
    );
    all.insert(scheme.timestamp_name.to_string(), timestamp.clone());

    // BTreeMap<String, _> iterates in byte order, which is what the server sorts by
    let sorted: Vec<(String, String)> = all.into_iter().collect();

    let payload = signing_payload(&method, host, path, &canonical_query_string(&sorted));
    let signature = hmac_sha256_base64(secret_key, &payload)?;

    Ok(SignedRequest {
        method,
        host: host.to_string(),
        path: path.to_string(),
        params: sorted,
        timestamp,
        signature,
        scheme,
    })
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, STRICT_ENCODE_SET).to_string()
}

pub fn canonical_query_string(params: &[(String, String)]) -> String {
    params
        .iter()
        .map(|(key, value)| format!("{}={}", key, percent_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

fn signing_payload(method: &str, host: &str, path: &str, query: &str) -> String {
    format!("{}\n{}\n{}\n{}", method, host, path, query)
}

fn hmac_sha256_base64(secret_key: &str, payload: &str) -> Result<String, ExchangeError> {
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|e| ExchangeError::AuthError(format!("Invalid secret key: {}", e)))?;
    mac.update(payload.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Flatten a struct or map of scalar fields into query parameters.
///
/// `null` fields are skipped; nested objects and arrays have no query-string
/// representation and fail with `EncodingError`.
pub fn to_query_params<T: Serialize + ?Sized>(value: &T) -> Result<Params, ExchangeError> {
    let value = serde_json::to_value(value)
        .map_err(|e| ExchangeError::EncodingError(format!("Failed to serialize params: {}", e)))?;

    let Value::Object(fields) = value else {
        return Err(ExchangeError::EncodingError(
            "Query parameters must serialize to a map".to_string(),
        ));
    };

    let mut params = Params::new();
    for (name, field) in fields {
        let text = match field {
            Value::Null => continue,
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => {
                return Err(ExchangeError::EncodingError(format!(
                    "Parameter '{}' is not representable as text",
                    name
                )));
            }
        };
        params.insert(name, text);
    }

    Ok(params)
}
