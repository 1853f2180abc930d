//! Names and default values shared across the crate.

use std::time::Duration;

/// Settings file looked up in the current directory
pub const CONFIG_FILE_NAME: &str = "stevedore.toml";

/// Environment variable naming an explicit settings file
pub const CONFIG_ENV_VAR: &str = "STEVEDORE_CONFIG";

/// Prefix of generated container names
pub const DEFAULT_NAME_PREFIX: &str = "stevedore";

/// Label set on every container this crate creates
pub const MANAGED_LABEL: &str = "stevedore.managed";

/// Delay between status polls while a container starts
pub const DEFAULT_STARTUP_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Delay between port probe rounds
pub const DEFAULT_READINESS_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Test-related constants
pub mod test {
    /// Set to `1` to skip tests that need a container runtime
    pub const SKIP_CONTAINER_TESTS_VAR: &str = "SKIP_CONTAINER_TESTS";

    /// Small image used by runtime tests
    pub const TEST_IMAGE: &str = "alpine:3.19";
}
