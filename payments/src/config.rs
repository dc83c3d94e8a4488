//! Configuration for the payments pipeline

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

/// Payments pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentsConfig {
    /// How long an issued bill stays payable (seconds)
    pub bill_ttl_secs: u64,

    /// Platform fee in basis points of the net amount paid
    pub platform_fee_bps: u32,

    /// Processor signing key for confirmation verification (base64)
    pub processor_public_key_b64: Option<String>,

    /// How often the expiry sweeper runs (seconds)
    pub sweep_interval_secs: u64,

    /// Confirmation inbox buffer size
    pub inbox_capacity: usize,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            bill_ttl_secs: 300,
            platform_fee_bps: 250,
            processor_public_key_b64: None,
            sweep_interval_secs: 30,
            inbox_capacity: 1024,
        }
    }
}

impl PaymentsConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(billing_core::Error::from)?;
        let config: PaymentsConfig = toml::from_str(&content).map_err(|e| {
            billing_core::Error::Config(format!("Failed to parse config: {}", e))
        })?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = PaymentsConfig::default();

        if let Ok(ttl) = std::env::var("PAYMENTS_BILL_TTL_SECS") {
            config.bill_ttl_secs = ttl.parse().map_err(|_| {
                billing_core::Error::Config(format!("Invalid PAYMENTS_BILL_TTL_SECS: {}", ttl))
            })?;
        }
        if let Ok(bps) = std::env::var("PAYMENTS_PLATFORM_FEE_BPS") {
            config.platform_fee_bps = bps.parse().map_err(|_| {
                billing_core::Error::Config(format!("Invalid PAYMENTS_PLATFORM_FEE_BPS: {}", bps))
            })?;
        }
        if let Ok(key) = std::env::var("PAYMENTS_PROCESSOR_KEY") {
            config.processor_public_key_b64 = Some(key);
        }

        Ok(config)
    }

    /// Install a processor verification key, for wiring up tests and demos
    pub fn with_processor_key(mut self, public_key: &[u8; 32]) -> Self {
        self.processor_public_key_b64 = Some(BASE64.encode(public_key));
        self
    }

    /// Decode the configured processor verification key
    pub fn processor_key(&self) -> crate::Result<[u8; 32]> {
        let encoded = self.processor_public_key_b64.as_deref().ok_or_else(|| {
            billing_core::Error::Config("Processor public key not configured".to_string())
        })?;
        let bytes = BASE64.decode(encoded).map_err(|e| {
            billing_core::Error::Config(format!("Invalid processor public key: {}", e))
        })?;
        bytes.try_into().map_err(|_| {
            billing_core::Error::Config("Processor public key must be 32 bytes".to_string())
                .into()
        })
    }
}
