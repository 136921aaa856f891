//! Player configuration
//!
//! `StreamConfig` is the validated record a pipeline is started with.
//! `AppConfig` wraps it together with retry and logging settings and is
//! persisted as TOML in the platform config directory.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::audio::format::{SampleFormat, StreamFormat};
use crate::constants::*;
use crate::error::ConfigError;
use crate::network::retry::RetryTier;

/// Connection and format parameters for one stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Domain name, IPv4 or IPv6 address of the sender
    pub host: String,
    pub port: u16,
    pub sample_rate: u32,
    /// 8, 16, 24 or 32 (32 means float samples)
    pub bit_depth: u16,
    /// 1 (mono) or 2 (stereo)
    pub channels: u16,
    /// Requested packet duration in milliseconds
    pub buffer_ms: u32,
    /// Size packets from the device's minimum buffer instead of `buffer_ms`
    pub use_device_min_buffer: bool,
    /// Ask the output device for its lowest latency mode
    pub low_latency_mode: bool,
    pub retry_on_disconnect: bool,
    /// Scan the tethering interface's subnet for the sender before connecting
    pub use_gateway_discovery: bool,
    /// Output device name, default device when unset
    pub output_device: Option<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            sample_rate: DEFAULT_SAMPLE_RATE,
            bit_depth: DEFAULT_BIT_DEPTH,
            channels: DEFAULT_CHANNELS,
            buffer_ms: DEFAULT_BUFFER_MS,
            use_device_min_buffer: false,
            low_latency_mode: false,
            retry_on_disconnect: false,
            use_gateway_discovery: false,
            output_device: None,
        }
    }
}

impl StreamConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn is_stereo(&self) -> bool {
        self.channels == 2
    }

    /// Check every field against its allowed range
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_host(&self.host) {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        SampleFormat::from_bit_depth(self.bit_depth)?;
        if !(1..=2).contains(&self.channels) {
            return Err(ConfigError::InvalidChannels(self.channels));
        }
        Ok(())
    }

    /// Wire format of the stream. Unset sample rates fall back to the default.
    pub fn stream_format(&self) -> Result<StreamFormat, ConfigError> {
        let sample_rate = if self.sample_rate == 0 {
            DEFAULT_SAMPLE_RATE
        } else {
            self.sample_rate
        };

        Ok(StreamFormat {
            sample_rate,
            sample_format: SampleFormat::from_bit_depth(self.bit_depth)?,
            channels: self.channels,
        })
    }

    /// Tag used for thread names and log lines
    pub fn endpoint(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(addr)) => format!("[{}]:{}", addr, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

/// Accept IPv4, IPv6 (optionally bracketed) and RFC 1123 host names
pub fn is_valid_host(host: &str) -> bool {
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if bare.parse::<IpAddr>().is_ok() {
        return true;
    }

    let name = host.strip_suffix('.').unwrap_or(host);
    if name.is_empty() || name.len() > 253 {
        return false;
    }

    name.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

/// Reconnect backoff table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub tiers: Vec<RetryTier>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            tiers: DEFAULT_RETRY_TIERS
                .iter()
                .map(|&(sleep_secs, max_attempts)| RetryTier {
                    sleep_secs,
                    max_attempts,
                })
                .collect(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tiers.is_empty() {
            return Err(ConfigError::InvalidRetryTiers("no tiers".to_string()));
        }
        if let Some(tier) = self.tiers.iter().find(|t| t.max_attempts == 0) {
            return Err(ConfigError::InvalidRetryTiers(format!(
                "tier with {}s sleep allows zero attempts",
                tier.sleep_secs
            )));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
    /// Seconds between statistics lines, 0 disables them
    pub stats_interval_secs: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            stats_interval_secs: 5,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub stream: StreamConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Default location of `config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("org", "pcm-stream-player", "pcm-stream-player")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(toml::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_validation() {
        assert!(is_valid_host("192.168.1.20"));
        assert!(is_valid_host("::1"));
        assert!(is_valid_host("[fe80::1]"));
        assert!(is_valid_host("media-pc.local"));
        assert!(!is_valid_host(""));
        assert!(!is_valid_host("-bad.example"));
        assert!(!is_valid_host("under_score.example"));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = StreamConfig::new("10.0.0.2", DEFAULT_PORT);
        assert!(config.validate().is_ok());

        config.port = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPort(0))));

        config.port = 4010;
        config.bit_depth = 20;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBitDepth(20))));

        config.bit_depth = 16;
        config.channels = 6;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidChannels(6))));
    }

    #[test]
    fn test_zero_sample_rate_uses_default() {
        let mut config = StreamConfig::new("10.0.0.2", DEFAULT_PORT);
        config.sample_rate = 0;
        assert!(config.validate().is_ok());
        assert_eq!(config.stream_format().unwrap().sample_rate, DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_endpoint_brackets_ipv6() {
        assert_eq!(StreamConfig::new("::1", 12345).endpoint(), "[::1]:12345");
        assert_eq!(StreamConfig::new("host", 1).endpoint(), "host:1");
    }

    #[test]
    fn test_load_missing_and_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, AppConfig::default());

        let mut config = AppConfig::default();
        config.stream.host = "studio.lan".to_string();
        config.stream.bit_depth = 16;
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str("[stream]\nhost = \"10.1.1.1\"\n").unwrap();
        assert_eq!(config.stream.port, DEFAULT_PORT);
        assert_eq!(config.retry, RetryConfig::default());
        assert_eq!(config.retry.tiers.len(), 3);
    }

    #[test]
    fn test_retry_validation() {
        assert!(RetryConfig::default().validate().is_ok());
        assert!(RetryConfig { tiers: vec![] }.validate().is_err());
    }
}
