//! Scoped container acquisition.
//!
//! [`scoped`] starts a container, waits for its ports, lends it to an async
//! body and then kills and removes it. Teardown runs on every exit path: the
//! body returning `Ok`, returning `Err`, `run()` or `wait()` failing, or a
//! panic anywhere inside the scope.

use crate::container::{Container, ContainerBuilder, ContainerError, Result, WaitOptions};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::{debug, warn};

/// Run `body` against a started, ready `container`, then tear it down.
///
/// The body's error takes precedence over a teardown error, which is logged
/// instead; a teardown error is returned only when the body succeeded. A
/// panic is resumed after teardown.
///
/// # Errors
///
/// Returns the error of `run()`, `wait()` or the body, converted into `E`,
/// or the teardown error.
pub async fn scoped<T, E, F>(
    mut container: Container,
    wait: WaitOptions,
    body: F,
) -> std::result::Result<T, E>
where
    F: AsyncFnOnce(&Container) -> std::result::Result<T, E>,
    E: From<ContainerError>,
{
    let outcome = AssertUnwindSafe(start_and_use(&mut container, wait, body))
        .catch_unwind()
        .await;
    let teardown = teardown(&container).await;

    match outcome {
        Ok(Ok(value)) => {
            teardown?;
            Ok(value)
        }
        Ok(Err(e)) => {
            if let Err(teardown_err) = teardown {
                warn!(
                    "Teardown of {} failed after scope error: {}",
                    container.name(),
                    teardown_err
                );
            }
            Err(e)
        }
        Err(panic) => {
            if let Err(teardown_err) = teardown {
                warn!(
                    "Teardown of {} failed after panic: {}",
                    container.name(),
                    teardown_err
                );
            }
            std::panic::resume_unwind(panic)
        }
    }
}

async fn start_and_use<T, E, F>(
    container: &mut Container,
    wait: WaitOptions,
    body: F,
) -> std::result::Result<T, E>
where
    F: AsyncFnOnce(&Container) -> std::result::Result<T, E>,
    E: From<ContainerError>,
{
    container.run().await?;
    container.wait(wait).await?;
    debug!("Container {} ready, entering scope", container.name());
    body(&*container).await
}

/// Kill, then remove even if the kill failed.
async fn teardown(container: &Container) -> Result<()> {
    let killed = container.kill().await;
    if let Err(e) = &killed {
        warn!("Failed to kill {}: {}", container.name(), e);
    }
    let removed = container.remove().await;
    killed.and(removed)
}

/// Builder-style entry point to [`scoped`].
pub struct Fixture {
    builder: ContainerBuilder,
    wait: WaitOptions,
}

impl Fixture {
    /// Fixture for the container `builder` describes.
    pub fn new(builder: ContainerBuilder) -> Self {
        Self {
            builder,
            wait: WaitOptions::default(),
        }
    }

    /// Readiness parameters used before entering the body.
    pub fn wait(mut self, wait: WaitOptions) -> Self {
        self.wait = wait;
        self
    }

    /// Build the container and run `body` inside [`scoped`].
    ///
    /// # Errors
    ///
    /// Returns the build error, or anything [`scoped`] returns.
    pub async fn run<T, E, F>(self, body: F) -> std::result::Result<T, E>
    where
        F: AsyncFnOnce(&Container) -> std::result::Result<T, E>,
        E: From<ContainerError>,
    {
        let container = self.builder.build()?;
        scoped(container, self.wait, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::testing::ScriptedRuntime;
    use crate::container::{ContainerStatus, StaticImage};
    use std::sync::Arc;
    use std::time::Duration;

    fn builder(runtime: &Arc<ScriptedRuntime>) -> ContainerBuilder {
        Container::builder(Arc::new(StaticImage::new("alpine:3.19")))
            .client(runtime.clone())
            .startup_poll_interval(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_scope_success_tears_down() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let id = Fixture::new(builder(&runtime))
            .run(async |container| -> Result<String> { Ok(container.id()?.to_string()) })
            .await
            .unwrap();

        assert!(!id.is_empty());
        assert_eq!(
            runtime.call_names(),
            vec!["pull", "create_and_start", "inspect", "kill", "remove"]
        );
    }

    #[tokio::test]
    async fn test_startup_failure_still_tears_down() {
        let runtime = Arc::new(
            ScriptedRuntime::new().statuses([ContainerStatus::Created, ContainerStatus::Dead]),
        );
        let mut entered = false;
        let result = Fixture::new(builder(&runtime))
            .run(async |_container| -> Result<()> {
                entered = true;
                Ok(())
            })
            .await;

        assert!(matches!(
            result,
            Err(ContainerError::StoppedPrematurely { .. })
        ));
        assert!(!entered);
        assert!(runtime.is_removed());
    }

    #[tokio::test]
    async fn test_build_error_surfaces_without_runtime_calls() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let result = Fixture::new(
            builder(&runtime).options(crate::container::RunOptions::default().mem_limit("x")),
        )
        .run(async |_container| -> Result<()> { Ok(()) })
        .await;

        assert!(matches!(result, Err(ContainerError::ConfigError(_))));
        assert!(runtime.calls().is_empty());
    }
}
