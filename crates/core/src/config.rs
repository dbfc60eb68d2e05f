//! Configuration management
//!
//! The configuration record carries the store credentials and the
//! symmetric key. It is read from a JSON file (the default, `./s3crypt.json`)
//! or from TOML when the file name ends in `.toml`.
//!
//! ```json
//! {
//!   "AwsAccessKeyID": "AKIA...",
//!   "AwsSecretAccessKey": "...",
//!   "AwsBucketRegion": "eu-west-1",
//!   "AesKey": "00112233445566778899aabbccddeeff"
//! }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cipher::CipherKey;
use crate::error::{Error, Result};

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "./s3crypt.json";

/// Default part attempt ceiling for multipart uploads
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

const MASK: &str = "********";

/// Retry behaviour for multipart part uploads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts per part, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the second attempt in milliseconds
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the doubling backoff in milliseconds
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_backoff() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RetryConfig {
    /// Retry without sleeping between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay to wait after `failed_attempts` consecutive failures
    pub fn backoff(&self, failed_attempts: u32) -> Duration {
        let shift = failed_attempts.saturating_sub(1).min(16);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

/// Credentials, region and key for one invocation
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store access key ID
    #[serde(rename = "AwsAccessKeyID", alias = "access_key", default)]
    pub access_key: String,

    /// Store secret access key
    #[serde(rename = "AwsSecretAccessKey", alias = "secret_key", default)]
    pub secret_key: String,

    /// Bucket region
    #[serde(rename = "AwsBucketRegion", alias = "region", default = "default_region")]
    pub region: String,

    /// Hex encoded 16-byte AES key
    #[serde(rename = "AesKey", alias = "aes_key")]
    pub aes_key: String,

    /// Custom endpoint for S3-compatible stores
    #[serde(
        rename = "Endpoint",
        alias = "endpoint",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub endpoint: Option<String>,

    /// Use path-style bucket addressing
    #[serde(rename = "ForcePathStyle", alias = "force_path_style", default)]
    pub force_path_style: bool,

    /// Part upload retry behaviour
    #[serde(rename = "Retry", alias = "retry", default)]
    pub retry: RetryConfig,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Config {
    /// Create a configuration with only a key, suitable for local transfers
    pub fn with_key(aes_key: impl Into<String>) -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            region: default_region(),
            aes_key: aes_key.into(),
            endpoint: None,
            force_path_style: false,
            retry: RetryConfig::default(),
        }
    }

    /// Decode and validate the AES key
    pub fn cipher_key(&self) -> Result<CipherKey> {
        CipherKey::from_hex(&self.aes_key)
    }

    /// Check that everything a remote transfer needs is present
    pub fn validate_remote(&self) -> Result<()> {
        if self.access_key.trim().is_empty() || self.secret_key.trim().is_empty() {
            return Err(Error::Config(
                "Store credentials (AwsAccessKeyID / AwsSecretAccessKey) are required for remote transfers".into(),
            ));
        }
        if self.region.trim().is_empty() {
            return Err(Error::Config("AwsBucketRegion cannot be empty".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("Retry max_attempts must be at least 1".into()));
        }
        if let Some(endpoint) = &self.endpoint {
            let url = url::Url::parse(endpoint)?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::Config(format!(
                    "Endpoint must use http or https: {endpoint}"
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("access_key", &self.access_key)
            .field("secret_key", &MASK)
            .field("region", &self.region)
            .field("aes_key", &MASK)
            .field("endpoint", &self.endpoint)
            .field("force_path_style", &self.force_path_style)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Configuration loader bound to one file
#[derive(Debug)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a ConfigManager for the default config file
    pub fn new() -> Self {
        Self::with_path(PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Create a ConfigManager with a custom path
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load and parse the configuration
    ///
    /// The key is validated here so a bad key fails before any file is
    /// opened for writing.
    pub fn load(&self) -> Result<Config> {
        let content = std::fs::read_to_string(&self.config_path).map_err(|e| {
            Error::Config(format!(
                "Failed to read configuration {}: {e}",
                self.config_path.display()
            ))
        })?;

        let is_toml = self
            .config_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let config: Config = if is_toml {
            toml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };

        config.cipher_key()?;

        tracing::debug!(
            path = %self.config_path.display(),
            access_key = %config.access_key,
            secret_key = MASK,
            region = %config.region,
            aes_key = MASK,
            "Loaded configuration"
        );

        Ok(config)
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
