//! Settlement schedule configuration

use serde::{Deserialize, Serialize};

/// Settlement schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Hours between settlement passes
    pub interval_hours: u64,

    /// How far back each pass reaches for its period start
    pub lookback_hours: u64,

    /// Enable the scheduler loop
    pub enabled: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_hours: 24,
            lookback_hours: 24,
            enabled: true,
        }
    }
}

impl ScheduleConfig {
    /// Standard daily settlement
    pub fn daily() -> Self {
        Self::default()
    }

    /// Pass interval as a runtime duration
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_hours * 3600)
    }

    /// Period lookback as a chrono duration
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lookback_hours as i64)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(billing_core::Error::from)?;
        let config: ScheduleConfig = toml::from_str(&content).map_err(|e| {
            billing_core::Error::Config(format!("Failed to parse config: {}", e))
        })?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = ScheduleConfig::default();

        if let Ok(hours) = std::env::var("SETTLEMENT_INTERVAL_HOURS") {
            config.interval_hours = hours.parse().map_err(|_| {
                billing_core::Error::Config(format!("Invalid SETTLEMENT_INTERVAL_HOURS: {}", hours))
            })?;
        }
        if let Ok(hours) = std::env::var("SETTLEMENT_LOOKBACK_HOURS") {
            config.lookback_hours = hours.parse().map_err(|_| {
                billing_core::Error::Config(format!("Invalid SETTLEMENT_LOOKBACK_HOURS: {}", hours))
            })?;
        }
        if let Ok(enabled) = std::env::var("SETTLEMENT_ENABLED") {
            config.enabled = enabled == "1" || enabled.eq_ignore_ascii_case("true");
        }

        Ok(config)
    }
}
