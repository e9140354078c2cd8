use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;

pub const DEFAULT_HOST: &str = "api.huobi.pro";
pub const AWS_HOST: &str = "api-aws.huobi.pro";

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub access_key: Secret<String>,
    pub secret_key: Secret<String>,
    /// Route through the AWS-hosted endpoint instead of the default host
    pub aws: bool,
    pub host: Option<String>,
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for ExchangeConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExchangeConfig", 4)?;
        state.serialize_field("access_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("aws", &self.aws)?;
        state.serialize_field("host", &self.host)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ExchangeConfigHelper {
            access_key: String,
            secret_key: String,
            #[serde(default)]
            aws: bool,
            host: Option<String>,
        }

        let helper = ExchangeConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            access_key: Secret::new(helper.access_key),
            secret_key: Secret::new(helper.secret_key),
            aws: helper.aws,
            host: helper.host,
        })
    }
}

impl ExchangeConfig {
    /// Create a new configuration with API credentials
    #[must_use]
    pub fn new(access_key: String, secret_key: String) -> Self {
        Self {
            access_key: Secret::new(access_key),
            secret_key: Secret::new(secret_key),
            aws: false,
            host: None,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_ACCESS_KEY` (e.g., `HUOBI_ACCESS_KEY`)
    /// - `{PREFIX}_SECRET_KEY` (e.g., `HUOBI_SECRET_KEY`)
    /// - `{PREFIX}_AWS` (optional, defaults to false)
    /// - `{PREFIX}_HOST` (optional)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let access_key_var = format!("{}_ACCESS_KEY", prefix);
        let secret_key_var = format!("{}_SECRET_KEY", prefix);

        let access_key = env::var(&access_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(access_key_var))?;

        let secret_key = env::var(&secret_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(secret_key_var))?;

        let aws = env::var(format!("{}_AWS", prefix))
            .ok()
            .and_then(|value| value.parse::<bool>().ok())
            .unwrap_or(false);

        let host = env::var(format!("{}_HOST", prefix)).ok();

        Ok(Self {
            access_key: Secret::new(access_key),
            secret_key: Secret::new(secret_key),
            aws,
            host,
        })
    }

    /// Create configuration from the `.env` file in the working directory
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    ///
    /// A missing file is not an error; system environment variables are used instead.
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    /// Configuration for public market data only
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new())
    }

    /// Check if this configuration has credentials for signed operations
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.access_key.expose_secret().is_empty() && !self.secret_key.expose_secret().is_empty()
    }

    #[must_use]
    pub fn aws(mut self, aws: bool) -> Self {
        self.aws = aws;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: String) -> Self {
        self.host = Some(host);
        self
    }

    /// REST and WebSocket host, without scheme
    pub fn host(&self) -> &str {
        match &self.host {
            Some(host) => host,
            None if self.aws => AWS_HOST,
            None => DEFAULT_HOST,
        }
    }

    /// Validated credentials for signed REST calls and private feeds
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        Credentials::new(
            self.access_key.expose_secret().clone(),
            self.secret_key.expose_secret().clone(),
        )
    }
}

/// Access/secret key pair, immutable once built.
#[derive(Debug, Clone)]
pub struct Credentials {
    access_key: Secret<String>,
    secret_key: Secret<String>,
}

impl Credentials {
    pub fn new(access_key: String, secret_key: String) -> Result<Self, ConfigError> {
        if access_key.is_empty() {
            return Err(ConfigError::MissingCredential("access key"));
        }
        if secret_key.is_empty() {
            return Err(ConfigError::MissingCredential("secret key"));
        }

        Ok(Self {
            access_key: Secret::new(access_key),
            secret_key: Secret::new(secret_key),
        })
    }

    pub fn access_key(&self) -> &str {
        self.access_key.expose_secret()
    }

    /// Exposes the secret; only the signer should need this
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Missing credential: {0} must not be empty")]
    MissingCredential(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_selection() {
        let config = ExchangeConfig::new("ak".to_string(), "sk".to_string());
        assert_eq!(config.host(), DEFAULT_HOST);

        let config = config.aws(true);
        assert_eq!(config.host(), AWS_HOST);

        let config = config.with_host("api.hbdm.com".to_string());
        assert_eq!(config.host(), "api.hbdm.com");
    }

    #[test]
    fn test_serialize_redacts_secrets() {
        let config = ExchangeConfig::new("my-access".to_string(), "my-secret".to_string());
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("my-access"));
        assert!(!json.contains("my-secret"));
        assert!(json.contains("[REDACTED]"));
    }

    #[test]
    fn test_deserialize_config() {
        let json = r#"{"access_key":"ak","secret_key":"sk","host":"example.com"}"#;
        let config: ExchangeConfig = serde_json::from_str(json).unwrap();
        assert!(config.has_credentials());
        assert!(!config.aws);
        assert_eq!(config.host(), "example.com");
    }

    #[test]
    fn test_read_only_has_no_credentials() {
        let config = ExchangeConfig::read_only();
        assert!(!config.has_credentials());
        assert!(matches!(
            config.credentials(),
            Err(ConfigError::MissingCredential("access key"))
        ));
    }

    #[test]
    fn test_credentials_reject_empty_secret() {
        let result = Credentials::new("ak".to_string(), String::new());
        assert!(matches!(result, Err(ConfigError::MissingCredential("secret key"))));
    }

    #[test]
    fn test_from_env_missing_variable() {
        let result = ExchangeConfig::from_env("HUOBI_SDK_UNSET_PREFIX");
        assert!(matches!(
            result,
            Err(ConfigError::MissingEnvironmentVariable(var)) if var == "HUOBI_SDK_UNSET_PREFIX_ACCESS_KEY"
        ));
    }
}
