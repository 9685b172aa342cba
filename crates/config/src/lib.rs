//! # atm-config
//!
//! Configuration for the atm session manager.
//!
//! Values are layered with [`figment`]: built-in defaults, then `atm.toml`, then `ATM_`
//! prefixed environment variables.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

use alloy_primitives::{Address, address};
use figment::{
    Figment, Metadata, Profile, Provider,
    providers::{Env, Format, Serialized, Toml},
    value::{Dict, Map},
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

mod error;
pub use error::ExtractConfigError;

/// Session manager configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address of the ledger contract the session binds to.
    pub contract_address: Address,
    /// JSON-RPC endpoint of the wallet provider.
    ///
    /// `None` means no wallet is available to this client.
    pub wallet_url: Option<String>,
    /// Number of blocks to wait for before a transaction counts as confirmed.
    pub confirmations: u64,
    /// Upper bound in seconds on waiting for a confirmation. `None` waits forever.
    pub confirmation_timeout: Option<u64>,
    /// Denomination appended to history descriptions, e.g. `ETH`.
    pub unit: Option<String>,
    /// PIN input rules.
    pub pin: PinConfig,
    /// Transaction history settings.
    pub history: HistoryConfig,
}

/// PIN input rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self { min_length: 4, max_length: 12 }
    }
}

/// Transaction history settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Disables record keeping entirely when `false`.
    pub enabled: bool,
    /// Maximum number of records kept; the oldest record is evicted first.
    pub capacity: Option<usize>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { enabled: true, capacity: None }
    }
}

impl Config {
    /// The default config file name.
    pub const FILE_NAME: &'static str = "atm.toml";

    /// Environment variable overriding the config file location.
    pub const CONFIG_PATH_ENV: &'static str = "ATM_CONFIG";

    /// Prefix of all environment overrides.
    pub const ENV_PREFIX: &'static str = "ATM_";

    /// Nested sections that can be set from the environment, e.g. `ATM_HISTORY_CAPACITY`.
    pub const STANDALONE_SECTIONS: &'static [&'static str] = &["pin", "history"];

    /// Ledger contract address of the default local deployment.
    ///
    /// `0x5FbDB2315678afecb367f032d93F642f64180aa3`
    pub const DEFAULT_CONTRACT_ADDRESS: Address =
        address!("5FbDB2315678afecb367f032d93F642f64180aa3");

    /// Loads the config from the current working directory and the environment.
    pub fn load() -> Result<Self, ExtractConfigError> {
        Self::try_from(Self::figment())
    }

    /// Loads the config, looking for `atm.toml` in `root`.
    pub fn load_with_root(root: impl AsRef<Path>) -> Result<Self, ExtractConfigError> {
        Self::try_from(Self::figment_with_root(root))
    }

    /// Attempts to extract a `Config` from `provider`, returning the result.
    pub fn try_from<T: Provider>(provider: T) -> Result<Self, ExtractConfigError> {
        let figment = Figment::from(provider);
        trace!("load config with provider: {:?}", figment.metadata().collect::<Vec<_>>());
        let config = figment.extract::<Self>()?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the default figment rooted at the current working directory.
    pub fn figment() -> Figment {
        Self::figment_with_root(".")
    }

    /// Returns the default figment, reading `atm.toml` from `root` unless `ATM_CONFIG` points
    /// elsewhere.
    pub fn figment_with_root(root: impl AsRef<Path>) -> Figment {
        Figment::from(Self::default())
            .merge(Toml::file(Self::config_file(root.as_ref())))
            .merge(
                Env::prefixed(Self::ENV_PREFIX)
                    .ignore(&["CONFIG"])
                    .map(|key| {
                        let key = key.as_str();
                        let lower = key.to_ascii_lowercase();
                        if Self::STANDALONE_SECTIONS
                            .iter()
                            .any(|section| lower.starts_with(&format!("{section}_")))
                        {
                            key.replacen('_', ".", 1).into()
                        } else {
                            key.into()
                        }
                    })
                    .global(),
            )
    }

    /// Resolves the config file path, honoring `ATM_CONFIG`.
    fn config_file(root: &Path) -> PathBuf {
        std::env::var_os(Self::CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| root.join(Self::FILE_NAME))
    }

    /// How long to wait for a confirmation.
    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<(), ExtractConfigError> {
        if self.confirmations == 0 {
            return Err(ExtractConfigError::invalid("confirmations", "must be at least 1"));
        }
        if self.pin.min_length == 0 {
            return Err(ExtractConfigError::invalid("pin.min_length", "must be at least 1"));
        }
        if self.pin.min_length > self.pin.max_length {
            return Err(ExtractConfigError::invalid(
                "pin.max_length",
                format!("must not be smaller than pin.min_length ({})", self.pin.min_length),
            ));
        }
        if self.history.capacity == Some(0) {
            return Err(ExtractConfigError::invalid("history.capacity", "must be at least 1"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            contract_address: Self::DEFAULT_CONTRACT_ADDRESS,
            wallet_url: None,
            confirmations: 1,
            confirmation_timeout: Some(120),
            unit: None,
            pin: PinConfig::default(),
            history: HistoryConfig::default(),
        }
    }
}

impl Provider for Config {
    fn metadata(&self) -> Metadata {
        Metadata::named("atm Config")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, figment::Error> {
        Serialized::defaults(self).data()
    }
}
