use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    pub store: StoreConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

/// Resource store endpoint
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Transfer and top-up rules
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WalletConfig {
    /// Fee as a fraction of the transfer amount (0.02 = 2%)
    pub fee_percent: Decimal,
    /// Maximum amount per transfer (and per top-up)
    pub transfer_limit: Decimal,
    /// Maximum amount per top-up
    pub top_up_limit: Decimal,
    pub note_max_chars: usize,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            fee_percent: Decimal::new(2, 2),
            transfer_limit: Decimal::from(50_000),
            top_up_limit: Decimal::from(100_000),
            note_max_chars: 200,
        }
    }
}

/// Startup reconciliation
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ReconcileConfig {
    /// Incomplete transfers older than this are refunded instead of completed
    pub stale_after_hours: u64,
    pub run_on_startup: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            stale_after_hours: 24,
            run_on_startup: true,
        }
    }
}

impl ReconcileConfig {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_after_hours.saturating_mul(3600))
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
