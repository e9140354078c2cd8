use base64::engine::general_purpose;
use base64::Engine;
use chrono::{TimeZone, Utc};
use hmac::{Hmac, Mac};
use huobi_sdk::core::kernel::{to_query_params, FixedClock, PrivateUrlBuilder};
use huobi_sdk::{ExchangeConfig, Params};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use sha2::Sha256;
use std::sync::Arc;

const HOST: &str = "api.huobi.pro";
const SECRET: &str = "b0xxxxxx-c6xxxxxx-94xxxxxx-dxxxx";

fn builder() -> PrivateUrlBuilder {
    PrivateUrlBuilder::new("e2xxxxxx-99xxxxxx-84xxxxxx-7xxxx", SECRET, HOST).unwrap()
}

/// Split a built URL into (path, [(name, encoded value)])
fn split_url(url: &str) -> (String, Vec<(String, String)>) {
    let rest = url.strip_prefix(&format!("https://{}", HOST)).unwrap();
    let (path, query) = rest.split_once('?').unwrap();
    let pairs = query
        .split('&')
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap();
            (name.to_string(), value.to_string())
        })
        .collect();
    (path.to_string(), pairs)
}

/// Recompute the signature from the URL alone, the way the exchange does
fn signature_is_valid(method: &str, url: &str) -> bool {
    let (path, mut pairs) = split_url(url);
    let (name, signature) = pairs.pop().unwrap();
    assert_eq!(name, "Signature");

    let query = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");
    let payload = format!("{}\n{}\n{}\n{}", method, HOST, path, query);

    let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
    mac.update(payload.as_bytes());
    let expected = general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    percent_decode_str(&signature).decode_utf8().unwrap() == expected
}

#[test]
fn test_query_names_sorted_byte_wise() {
    let mut params = Params::new();
    for name in ["symbol", "Size", "account-id", "_private", "states", "from", "Direct"] {
        params.insert(name.to_string(), format!("v {}", name));
    }

    let url = builder()
        .build("GET", "/v1/order/orders", Some(&params))
        .unwrap();
    let (_, pairs) = split_url(&url);
    let names: Vec<&str> = pairs[..pairs.len() - 1]
        .iter()
        .map(|(name, _)| name.as_str())
        .collect();

    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);
    assert_eq!(names.len(), 11);
}

#[test]
fn test_two_calls_differ_only_by_time_but_both_verify() {
    let builder = builder();
    let mut params = Params::new();
    params.insert("symbol".to_string(), "btcusdt".to_string());

    let first = builder.build("GET", "/v1/order/openOrders", Some(&params)).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1100));
    let second = builder.build("GET", "/v1/order/openOrders", Some(&params)).unwrap();

    assert_ne!(first, second);
    assert!(signature_is_valid("GET", &first));
    assert!(signature_is_valid("GET", &second));
}

#[test]
fn test_fixed_clock_reproduces_signature() {
    let at = Utc.with_ymd_and_hms(2017, 5, 11, 15, 19, 30).unwrap();
    let builder = builder().with_clock(Arc::new(FixedClock(at)));

    let first = builder.build("POST", "/v1/order/orders/place", None).unwrap();
    let second = builder.build("POST", "/v1/order/orders/place", None).unwrap();

    assert_eq!(first, second);
    assert!(first.contains("Timestamp=2017-05-11T15%3A19%3A30"));
    assert!(signature_is_valid("POST", &first));
}

#[test]
fn test_serialized_request_becomes_signed_query() {
    #[derive(Serialize)]
    struct OpenOrdersRequest {
        #[serde(rename = "account-id")]
        account_id: u64,
        symbol: &'static str,
        size: Option<u32>,
    }

    let params = to_query_params(&OpenOrdersRequest {
        account_id: 100_009,
        symbol: "btcusdt",
        size: None,
    })
    .unwrap();
    let url = builder()
        .build("GET", "/v1/order/openOrders", Some(&params))
        .unwrap();

    assert!(url.contains("account-id=100009"));
    assert!(!url.contains("size="));
    assert!(signature_is_valid("GET", &url));
}

#[test]
fn test_builder_from_config() {
    let config = ExchangeConfig::new("ak".to_string(), "sk".to_string()).aws(true);
    let url = PrivateUrlBuilder::from_config(&config)
        .unwrap()
        .build("GET", "/v1/account/accounts", None)
        .unwrap();
    assert!(url.starts_with("https://api-aws.huobi.pro/v1/account/accounts?AccessKeyId=ak"));

    assert!(PrivateUrlBuilder::from_config(&ExchangeConfig::read_only()).is_err());
}
