//! Configuration for a bond peer

use crate::types::DEFAULT_VALIDITY_DAYS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Bond peer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BondConfig {
    /// How long a new bond stays valid, in days
    pub validity_days: i64,

    /// Whether newly created bonds permit creditor/debtor transfer
    pub allow_transfer: bool,

    /// Where the index snapshot is written, if anywhere
    pub snapshot_path: Option<PathBuf>,
}

impl Default for BondConfig {
    fn default() -> Self {
        Self {
            validity_days: DEFAULT_VALIDITY_DAYS,
            allow_transfer: true,
            snapshot_path: None,
        }
    }
}

impl BondConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BondConfig = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> crate::Result<Self> {
        let mut config = BondConfig::default();

        if let Ok(days) = std::env::var("BOND_VALIDITY_DAYS") {
            config.validity_days = days
                .parse()
                .map_err(|_| crate::Error::Config(format!("bad BOND_VALIDITY_DAYS: {}", days)))?;
        }

        if let Ok(allow) = std::env::var("BOND_ALLOW_TRANSFER") {
            config.allow_transfer = allow
                .parse()
                .map_err(|_| crate::Error::Config(format!("bad BOND_ALLOW_TRANSFER: {}", allow)))?;
        }

        if let Ok(path) = std::env::var("BOND_SNAPSHOT_PATH") {
            config.snapshot_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}
