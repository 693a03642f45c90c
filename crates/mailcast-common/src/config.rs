//! Configuration for Mailcast

use crate::types::{DispatchMode, EmailAddress};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Campaign run parameters
    #[serde(default)]
    pub campaign: CampaignConfig,

    /// Where campaign resources are read from
    #[serde(default)]
    pub resources: ResourcesConfig,

    /// HTTP API relay settings
    #[serde(default)]
    pub api: ApiConfig,

    /// SMTP client settings shared by relay and direct transports
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Direct-from-origin settings
    #[serde(default)]
    pub direct: DirectConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Parameters of a single campaign run.
///
/// Numeric fields are signed so that out-of-range operator input survives
/// deserialization and can be clamped by [`CampaignConfig::validated`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Transport mode
    #[serde(default)]
    pub mode: DispatchMode,

    /// Number of concurrent workers (1..=100)
    #[serde(default = "default_concurrency")]
    pub concurrency: i64,

    /// Minimum pool-wide pause once the rate window is exhausted, in ms
    #[serde(default = "default_cooling_ms")]
    pub cooling_ms: i64,

    /// Admissions allowed per 60 second window
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,

    /// Simulate sends instead of transmitting
    #[serde(default)]
    pub test_mode: bool,

    /// Deliver every test message to this address instead
    pub test_override_address: Option<String>,

    /// Attach the loaded attachments to every message
    #[serde(default)]
    pub include_attachments: bool,

    /// Seed for template/sender/endpoint selection
    pub seed: Option<u64>,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            mode: DispatchMode::default(),
            concurrency: default_concurrency(),
            cooling_ms: default_cooling_ms(),
            rate_limit_per_minute: default_rate_limit(),
            test_mode: false,
            test_override_address: None,
            include_attachments: false,
            seed: None,
        }
    }
}

fn default_concurrency() -> i64 {
    10
}

fn default_cooling_ms() -> i64 {
    1000
}

fn default_rate_limit() -> i64 {
    100
}

pub const MAX_CONCURRENCY: i64 = 100;

impl CampaignConfig {
    /// Clamp out-of-range values and drop an unusable override address
    pub fn validated(mut self) -> Self {
        let concurrency = self.concurrency.clamp(1, MAX_CONCURRENCY);
        if concurrency != self.concurrency {
            warn!(
                requested = self.concurrency,
                using = concurrency,
                "Concurrency out of range"
            );
            self.concurrency = concurrency;
        }

        if self.cooling_ms < 0 {
            warn!(requested = self.cooling_ms, "Negative cooling time, using 0");
            self.cooling_ms = 0;
        }

        if self.rate_limit_per_minute < 1 {
            warn!(
                requested = self.rate_limit_per_minute,
                "Rate limit must be at least 1 per minute"
            );
            self.rate_limit_per_minute = 1;
        }

        if let Some(address) = self.test_override_address.take() {
            if EmailAddress::parse(&address).is_some() {
                self.test_override_address = Some(address.trim().to_string());
            } else {
                warn!(
                    address = %address,
                    "Invalid test address, test messages will be simulated without redirection"
                );
            }
        }

        self
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY) as usize
    }

    pub fn cooling(&self) -> Duration {
        Duration::from_millis(self.cooling_ms.max(0) as u64)
    }

    pub fn rate_limit(&self) -> u32 {
        self.rate_limit_per_minute.clamp(1, u32::MAX as i64) as u32
    }

    /// The override address, only when test mode is on
    pub fn active_override(&self) -> Option<&str> {
        if self.test_mode {
            self.test_override_address.as_deref()
        } else {
            None
        }
    }
}

/// Resource location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Directory holding recipients.txt, templates/, relays.txt, ...
    #[serde(default = "default_resources_dir")]
    pub dir: PathBuf,
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            dir: default_resources_dir(),
        }
    }
}

fn default_resources_dir() -> PathBuf {
    PathBuf::from("./resources")
}

/// HTTP API relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the mail-send API
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            timeout_secs: default_api_timeout(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.sendgrid.com".to_string()
}

fn default_api_timeout() -> u64 {
    30
}

/// SMTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    /// Connection and command timeout in seconds
    #[serde(default = "default_smtp_timeout")]
    pub timeout_secs: u64,

    /// Name announced in EHLO; defaults to the lettre default
    pub helo_name: Option<String>,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_smtp_timeout(),
            helo_name: None,
        }
    }
}

fn default_smtp_timeout() -> u64 {
    15
}

/// Direct-from-origin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectConfig {
    /// Local addresses to originate from; probed from the host when empty
    #[serde(default)]
    pub local_addresses: Vec<IpAddr>,

    /// Destination SMTP port on the recipient MX
    #[serde(default = "default_direct_port")]
    pub port: u16,
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            local_addresses: Vec::new(),
            port: default_direct_port(),
        }
    }
}

fn default_direct_port() -> u16 {
    25
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration from file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&content)
    }

    /// Load configuration from the default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            PathBuf::from("./mailcast.toml"),
            PathBuf::from("/etc/mailcast/mailcast.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}
