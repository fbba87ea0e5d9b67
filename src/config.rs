//! Coin control configuration.
//!
//! Holds the fee constants supplied by the wallet/protocol layer, the network used to
//! render addresses, and where the lock list lives.

use crate::{
    estimate::FeePolicy,
    utill::{get_data_dir, parse_field, parse_toml},
};
use bitcoin::{Amount, Network};
use std::{io, io::Write, path::Path};

/// Coin control configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CoinControlConfig {
    /// Network used to render output addresses (default: bitcoin)
    pub network: Network,
    /// Lock list path, relative to the data directory unless absolute (default: locked-outputs.txt)
    pub lock_file: String,
    /// Fee constants.
    pub fee_policy: FeePolicy,
}

impl Default for CoinControlConfig {
    fn default() -> Self {
        Self {
            network: Network::Bitcoin,
            lock_file: crate::selection::DEFAULT_LOCK_FILE.to_string(),
            fee_policy: FeePolicy::default(),
        }
    }
}

impl CoinControlConfig {
    /// Constructs a [`CoinControlConfig`] from a config file. Or create default configs and load them.
    ///
    /// If the file is missing or empty, a default config is written there first.
    /// If no path is given, `~/.coincontrol/config.toml` is used.
    /// Unknown keys are ignored, and keys with unparsable values take their defaults.
    pub fn new(config_path: Option<&Path>) -> io::Result<Self> {
        let default_config_path = get_data_dir().join("config.toml");

        let config_path = config_path.unwrap_or(&default_config_path);

        let default_config = Self::default();

        if !config_path.exists() || std::fs::metadata(config_path)?.len() == 0 {
            log::warn!(
                "Coin control config file not found, creating default config file at path: {}",
                config_path.display()
            );
            default_config.write_to_file(config_path)?;
        }

        let config_map = parse_toml(config_path)?;

        log::info!(
            "Successfully loaded config file from : {}",
            config_path.display()
        );

        let fees = &default_config.fee_policy;
        let sats = |key: &str, default: Amount| {
            Amount::from_sat(parse_field(config_map.get(key), default.to_sat()))
        };

        Ok(CoinControlConfig {
            network: parse_field(config_map.get("network"), default_config.network),
            lock_file: parse_field(config_map.get("lock_file"), default_config.lock_file.clone()),
            fee_policy: FeePolicy {
                min_tx_fee: sats("min_tx_fee", fees.min_tx_fee),
                dust_threshold: sats("dust_threshold", fees.dust_threshold),
                fee_per_kb: sats("fee_per_kb", fees.fee_per_kb),
                free_priority_threshold: parse_field(
                    config_map.get("free_priority_threshold"),
                    fees.free_priority_threshold,
                ),
                free_area_bytes: parse_field(
                    config_map.get("free_area_bytes"),
                    fees.free_area_bytes,
                ),
                large_tx_bytes: parse_field(config_map.get("large_tx_bytes"), fees.large_tx_bytes),
            },
        })
    }

    /// Serializes the config as TOML and writes it to disk, creating the parent directory.
    pub fn write_to_file(&self, path: &Path) -> io::Result<()> {
        let fees = &self.fee_policy;
        let toml_data = format!(
            "# Coin Control Configuration File
# Network used to render addresses: bitcoin, testnet, signet or regtest
network = {}
# Lock list file, relative to the data directory unless absolute
lock_file = {}
# Minimum fee per started kilobyte in sats. Payments below it are flagged as low
min_tx_fee = {}
# Payments and change below this many sats are dust
dust_threshold = {}
# Optional fee per started kilobyte in sats
fee_per_kb = {}
# Priority a transaction must exceed to be relayed for free
free_priority_threshold = {}
# Free relay only applies below this size in bytes
free_area_bytes = {}
# Size in bytes from which a transaction is flagged as large
large_tx_bytes = {}",
            self.network,
            self.lock_file,
            fees.min_tx_fee.to_sat(),
            fees.dust_threshold.to_sat(),
            fees.fee_per_kb.to_sat(),
            fees.free_priority_threshold,
            fees.free_area_bytes,
            fees.large_tx_bytes,
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        file.write_all(toml_data.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
