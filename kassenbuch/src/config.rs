//! Server configuration, loaded from an optional TOML file.
//!
//! ```toml
//! bind_address = "0.0.0.0:8888"
//! workers = 10
//! max_line_length = 4096
//! write_timeout_ms = 5000
//!
//! [ledger]
//! genesis_account = "Genesis"
//! reward_source = "MINER"
//! reward_account = "MINER_REWARD"
//! reward_amount = "50"
//! ```

use crate::Error;
use kassenbuch_api::{Amount, FIELD_SEPARATOR};
use serde::Deserialize;
use std::{fs, net::SocketAddr, num::NonZeroU64, path::Path, time::Duration};

/// The configuration of a ledger server.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The address the acceptor listens on.
    pub bind_address: SocketAddr,
    /// Number of sessions served in parallel.
    pub workers: usize,
    /// Maximum length of a request line in bytes.
    pub max_line_length: usize,
    /// Write timeout for client sockets in milliseconds (`0` disables the timeout).
    pub write_timeout_ms: u64,
    /// Ledger constants.
    pub ledger: LedgerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([0, 0, 0, 0], Self::DEFAULT_PORT)),
            workers: 10,
            max_line_length: 4096,
            write_timeout_ms: 5000,
            ledger: LedgerConfig::default(),
        }
    }
}

impl Config {
    /// The port used when nothing else is configured.
    pub const DEFAULT_PORT: u16 = 8888;

    /// Load and validate the configuration at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        log::debug!("Loading configuration from {}.", path.display());
        let data = fs::read_to_string(path)?;
        Self::from_toml(&data)
    }

    /// Parse and validate a configuration.
    pub fn from_toml(data: &str) -> Result<Self, Error> {
        let config: Self = toml::from_str(data)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the server relies on.
    pub fn validate(&self) -> Result<(), Error> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("`workers` must be at least 1".to_string()));
        }
        if self.max_line_length == 0 {
            return Err(Error::InvalidConfig(
                "`max_line_length` must be at least 1".to_string(),
            ));
        }
        self.ledger.validate()
    }

    /// The socket write timeout.
    #[must_use]
    pub fn write_timeout(&self) -> Option<Duration> {
        if self.write_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.write_timeout_ms))
        }
    }
}

/// The sentinel accounts and the mining reward.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Sender and receiver of the genesis block.
    pub genesis_account: String,
    /// The account mined rewards are paid from. It is never debited.
    pub reward_source: String,
    /// The account mined rewards are paid to.
    pub reward_account: String,
    /// The reward per mined block.
    pub reward_amount: Amount,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            genesis_account: "Genesis".to_string(),
            reward_source: "MINER".to_string(),
            reward_account: "MINER_REWARD".to_string(),
            reward_amount: NonZeroU64::new(50).map_or_else(Amount::zero, Amount::from),
        }
    }
}

impl LedgerConfig {
    fn validate(&self) -> Result<(), Error> {
        for (name, account) in &[
            ("genesis_account", &self.genesis_account),
            ("reward_source", &self.reward_source),
            ("reward_account", &self.reward_account),
        ] {
            if account.is_empty() || account.contains(FIELD_SEPARATOR) || account.contains('\n') {
                return Err(Error::InvalidConfig(format!(
                    "`{}` must be a non-empty account name without `{}`",
                    name, FIELD_SEPARATOR
                )));
            }
        }
        if self.reward_account == self.reward_source || self.reward_account == self.genesis_account
        {
            return Err(Error::InvalidConfig(
                "`reward_account` must differ from the reserved accounts".to_string(),
            ));
        }
        Ok(())
    }

    /// The identifiers that are never debited by the audit.
    #[must_use]
    pub fn reserved_accounts(&self) -> ReservedAccounts {
        ReservedAccounts {
            genesis: self.genesis_account.clone(),
            reward_source: self.reward_source.clone(),
        }
    }
}

/// Non-account identifiers: funds flow out of them without being debited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedAccounts {
    genesis: String,
    reward_source: String,
}

impl ReservedAccounts {
    /// Whether `account` is one of the reserved identifiers.
    #[must_use]
    pub fn contains(&self, account: &str) -> bool {
        account == self.genesis || account == self.reward_source
    }
}
