//! Test configuration helpers.
//!
//! Provides prepare-stage configurations for tests, centralizing the flag
//! combinations that would otherwise be repeated across test modules.

use arbor_types::PrepConfig;

/// Returns a prepare-stage configuration suitable for tests.
///
/// Digests are on so every test exercises the digest chain; TTL nodes and
/// reconfiguration are enabled so no operation is rejected as unimplemented.
#[must_use]
pub fn test_prep_config() -> PrepConfig {
    PrepConfig {
        digest_enabled: true,
        reconfig_enabled: true,
        extended_types_enabled: true,
        ..PrepConfig::default()
    }
}

/// Returns [`test_prep_config`] with digests disabled.
#[must_use]
pub fn test_prep_config_without_digest() -> PrepConfig {
    PrepConfig { digest_enabled: false, ..test_prep_config() }
}
