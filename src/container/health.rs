//! Host-side health checks.

use crate::container::{Container, ContainerError, Result};
use std::process::Stdio;
use tracing::{debug, info};

impl Container {
    /// Run the image's health-check command on the host.
    ///
    /// An image without a check command passes trivially.
    ///
    /// # Errors
    ///
    /// - [`ContainerError::CheckFailed`] if the command exits non-zero
    /// - [`ContainerError::IoError`] if it cannot be spawned
    pub async fn check(&self) -> Result<()> {
        let Some(command) = self.image().check_command(self) else {
            debug!("Image {} has no health check", self.image().pull_name());
            return Ok(());
        };
        let Some((program, args)) = command.split_first() else {
            return Err(ContainerError::ConfigError(
                "Health check command is empty".to_string(),
            ));
        };

        debug!("Running health check for {}: {:?}", self.name(), command);
        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await?;

        if output.status.success() {
            info!("Health check passed for {}", self.name());
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let status = match stderr.trim() {
            "" => output.status.to_string(),
            detail => format!("{}: {}", output.status, detail),
        };
        Err(ContainerError::CheckFailed { command, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::StaticImage;
    use crate::container::testing::ScriptedRuntime;
    use std::sync::Arc;

    async fn started(image: StaticImage) -> Container {
        let mut container = Container::builder(Arc::new(image))
            .client(Arc::new(ScriptedRuntime::new()))
            .build()
            .unwrap();
        container.run().await.unwrap();
        container
    }

    #[tokio::test]
    async fn test_no_check_command_passes() {
        let container = started(StaticImage::new("alpine:3.19")).await;
        assert!(container.check().await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_check_substitutes_container_values() {
        let container =
            started(StaticImage::new("alpine:3.19").check(["test", "{address}", "=", "127.0.0.1"]))
                .await;
        assert!(container.check().await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_check() {
        let container = started(StaticImage::new("alpine:3.19").check(["false"])).await;
        match container.check().await {
            Err(ContainerError::CheckFailed { command, .. }) => {
                assert_eq!(command, vec!["false".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let container =
            started(StaticImage::new("alpine:3.19").check(["stevedore-no-such-binary"])).await;
        assert!(matches!(
            container.check().await,
            Err(ContainerError::IoError(_))
        ));
    }
}
