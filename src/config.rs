//! Configuration types for the GreyNoise IP Check integration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Fixed GreyNoise community check endpoint.
pub const GREYNOISE_CHECK_URL: &str = "https://check.labs.greynoise.io/api/v1/check";

/// Longest accepted refresh interval (one year).
pub const MAX_SCAN_INTERVAL_HOURS: u64 = 24 * 365;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Scheduling and logging settings.
    #[serde(default)]
    pub settings: Settings,

    /// Check API settings.
    #[serde(default)]
    pub api: ApiConfig,
}

/// Global settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Hours between scheduled refreshes.
    #[serde(default = "default_scan_interval_hours")]
    pub scan_interval_hours: u64,

    /// Log each completed refresh cycle.
    #[serde(default = "default_true")]
    pub log_updates: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan_interval_hours: default_scan_interval_hours(),
            log_updates: true,
        }
    }
}

impl Settings {
    /// Refresh interval as a duration.
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_hours.saturating_mul(3600))
    }
}

fn default_scan_interval_hours() -> u64 {
    12
}

/// Check API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Endpoint queried for the caller's own IP.
    #[serde(default = "default_url")]
    pub url: String,

    /// User-Agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Total timeout for scheduled refreshes in milliseconds.
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_ms: u64,

    /// Total timeout for the setup connectivity probe in milliseconds.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            user_agent: default_user_agent(),
            refresh_timeout_ms: default_refresh_timeout(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl ApiConfig {
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn default_url() -> String {
    GREYNOISE_CHECK_URL.to_string()
}

fn default_user_agent() -> String {
    "curl/8.0".to_string()
}

fn default_refresh_timeout() -> u64 {
    30_000
}

fn default_probe_timeout() -> u64 {
    15_000
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.settings.scan_interval_hours == 0 {
            anyhow::bail!("scan_interval_hours must be greater than 0");
        }

        if self.settings.scan_interval_hours > MAX_SCAN_INTERVAL_HOURS {
            anyhow::bail!(
                "scan_interval_hours ({}) must be <= {}",
                self.settings.scan_interval_hours,
                MAX_SCAN_INTERVAL_HOURS
            );
        }

        if self.api.refresh_timeout_ms == 0 || self.api.probe_timeout_ms == 0 {
            anyhow::bail!("API timeouts must be greater than 0");
        }

        // Probe budget is bounded by the refresh budget
        if self.api.probe_timeout_ms > self.api.refresh_timeout_ms {
            anyhow::bail!(
                "probe_timeout_ms ({}) must be <= refresh_timeout_ms ({})",
                self.api.probe_timeout_ms,
                self.api.refresh_timeout_ms
            );
        }

        if !(self.api.url.starts_with("http://") || self.api.url.starts_with("https://")) {
            anyhow::bail!("Invalid API url: {:?}", self.api.url);
        }

        if self.api.user_agent.trim().is_empty() {
            anyhow::bail!("user_agent must not be empty");
        }

        Ok(())
    }

    /// Generate example configuration YAML.
    pub fn example() -> String {
        r#"# GreyNoise IP Check Configuration

settings:
  scan_interval_hours: 12      # How often the public IP is re-checked
  log_updates: true            # Log each completed refresh cycle

api:
  url: "https://check.labs.greynoise.io/api/v1/check"
  user_agent: "curl/8.0"
  refresh_timeout_ms: 30000    # Scheduled refresh budget
  probe_timeout_ms: 15000      # Setup connectivity probe budget
"#
        .to_string()
    }
}
