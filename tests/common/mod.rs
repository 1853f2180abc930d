//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Once;
use stevedore::env;

static TRACING: Once = Once::new();

/// Install a fmt subscriber once per test binary; `RUST_LOG` overrides the filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("stevedore=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Check if container tests should run.
pub fn should_run_container_tests() -> bool {
    // Skip if explicitly disabled
    if let Ok(value) = std::env::var(env::test::SKIP_CONTAINER_TESTS_VAR) {
        if value == "1" || value.eq_ignore_ascii_case("true") {
            return false;
        }
    }

    // Check if Docker or Podman is available
    ["docker", "podman"].iter().any(|runtime| {
        std::process::Command::new(runtime)
            .arg("info")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    })
}
