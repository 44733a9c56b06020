//! Configuration for the ledger engine.
//!
//! [`LedgerConfig`] is constructed explicitly and handed to
//! [`Ledger::new`](crate::Ledger::new); there is no process-wide
//! configuration state. It can be built in code with the validating builder
//! or deserialized from any serde format, in which case
//! [`LedgerConfig::validate`] runs when the ledger is constructed.
//!
//! ```
//! use std::time::Duration;
//! use coffer_ledger::LedgerConfig;
//!
//! let config = LedgerConfig::builder()
//!     .max_attempts(8)
//!     .store_timeout(Duration::from_secs(2))
//!     .build()?;
//! assert_eq!(config.starting_balance(), 1000);
//! # Ok::<(), coffer_ledger::ConfigError>(())
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default number of read-compute-write attempts per operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default deadline for a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default balance of a newly opened account, in minor units.
pub const DEFAULT_STARTING_BALANCE: u64 = 1000;

/// Ledger engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Attempts before giving up with `ConcurrentUpdateConflict`.
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,

    /// Deadline applied to every store call.
    #[serde(with = "humantime_serde", default = "default_store_timeout")]
    store_timeout: Duration,

    /// Balance credited when an account is opened.
    #[serde(default = "default_starting_balance")]
    starting_balance: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_store_timeout() -> Duration {
    DEFAULT_STORE_TIMEOUT
}

fn default_starting_balance() -> u64 {
    DEFAULT_STARTING_BALANCE
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            starting_balance: DEFAULT_STARTING_BALANCE,
        }
    }
}

#[bon::bon]
impl LedgerConfig {
    /// Creates a new ledger configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `max_attempts` is zero or `store_timeout`
    /// is zero.
    #[builder]
    pub fn new(
        #[builder(default = DEFAULT_MAX_ATTEMPTS)] max_attempts: u32,
        #[builder(default = DEFAULT_STORE_TIMEOUT)] store_timeout: Duration,
        #[builder(default = DEFAULT_STARTING_BALANCE)] starting_balance: u64,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_attempts, store_timeout, starting_balance };
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants the builder enforces.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] for the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::BelowMinimum {
                field: "max_attempts",
                min: "1".into(),
                value: "0".into(),
            });
        }
        if self.store_timeout.is_zero() {
            return Err(ConfigError::BelowMinimum {
                field: "store_timeout",
                min: "1ns".into(),
                value: "0s".into(),
            });
        }
        Ok(())
    }

    /// Returns the attempt bound for conflicting writes.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the per-call store deadline.
    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Returns the balance of newly opened accounts.
    #[must_use]
    pub fn starting_balance(&self) -> u64 {
        self.starting_balance
    }
}
