//! Configuration for the prepare stage.
//!
//! All fields have serde defaults so a partial document deserializes cleanly.
//! Construction through the builder validates values; after deserialization
//! call [`PrepConfig::validate`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Configuration validation error.
///
/// Returned when a configuration value is outside its valid range or
/// violates a cross-field constraint.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid config: {message}"))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },
}

/// Minimum accepted path length limit.
const MIN_PATH_BYTES: usize = 1;

/// Feature switches and limits for transaction preparation.
///
/// # Validation Rules
///
/// - `max_path_bytes` must be >= 1
///
/// # Example
///
/// ```no_run
/// # use arbor_types::config::PrepConfig;
/// let config = PrepConfig::builder()
///     .digest_enabled(true)
///     .extended_types_enabled(true)
///     .build()
///     .expect("valid prep config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PrepConfig {
    /// Stamp tree digests on prepared transactions.
    #[serde(default = "default_digest_enabled")]
    pub digest_enabled: bool,
    /// Accept dynamic membership reconfiguration requests.
    #[serde(default)]
    pub reconfig_enabled: bool,
    /// Accept TTL node creation.
    #[serde(default)]
    pub extended_types_enabled: bool,
    /// Attach the removed ephemeral paths to close-session transactions.
    #[serde(default = "default_close_session_txn_enabled")]
    pub close_session_txn_enabled: bool,
    /// Bypass every ACL check.
    #[serde(default)]
    pub skip_acl: bool,
    /// Whether a single-member ensemble is permitted. Raises the reconfig
    /// voting-member floor when set.
    #[serde(default = "default_standalone_enabled")]
    pub standalone_enabled: bool,
    /// Reject every create request. Used to exercise failure paths.
    #[serde(default)]
    pub fail_create: bool,
    /// Maximum byte length of a node path.
    #[serde(default = "default_max_path_bytes")]
    pub max_path_bytes: usize,
}

#[bon::bon]
impl PrepConfig {
    /// Creates a new prepare-stage configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `max_path_bytes` is zero.
    #[builder]
    #[allow(clippy::fn_params_excessive_bools)]
    pub fn new(
        #[builder(default = default_digest_enabled())] digest_enabled: bool,
        #[builder(default)] reconfig_enabled: bool,
        #[builder(default)] extended_types_enabled: bool,
        #[builder(default = default_close_session_txn_enabled())] close_session_txn_enabled: bool,
        #[builder(default)] skip_acl: bool,
        #[builder(default = default_standalone_enabled())] standalone_enabled: bool,
        #[builder(default)] fail_create: bool,
        #[builder(default = default_max_path_bytes())] max_path_bytes: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            digest_enabled,
            reconfig_enabled,
            extended_types_enabled,
            close_session_txn_enabled,
            skip_acl,
            standalone_enabled,
            fail_create,
            max_path_bytes,
        };
        config.validate()?;
        Ok(config)
    }
}

impl PrepConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_path_bytes < MIN_PATH_BYTES {
            return Err(ConfigError::Validation {
                message: format!(
                    "max_path_bytes must be >= {}, got {}",
                    MIN_PATH_BYTES, self.max_path_bytes
                ),
            });
        }
        Ok(())
    }

    /// Smallest number of voting members a reconfiguration may leave behind.
    pub fn min_voting_members(&self) -> usize {
        if self.standalone_enabled { 2 } else { 1 }
    }
}

impl Default for PrepConfig {
    fn default() -> Self {
        Self {
            digest_enabled: default_digest_enabled(),
            reconfig_enabled: false,
            extended_types_enabled: false,
            close_session_txn_enabled: default_close_session_txn_enabled(),
            skip_acl: false,
            standalone_enabled: default_standalone_enabled(),
            fail_create: false,
            max_path_bytes: default_max_path_bytes(),
        }
    }
}

fn default_digest_enabled() -> bool {
    true
}

fn default_close_session_txn_enabled() -> bool {
    true
}

fn default_standalone_enabled() -> bool {
    true
}

fn default_max_path_bytes() -> usize {
    4096
}
