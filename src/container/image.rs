//! Image descriptors.
//!
//! An [`Image`] says what to run: the reference to pull, the environment the
//! process expects, how long the image usually needs to become ready, and how
//! to check its health from the host.

use crate::container::Container;
use serde_json::{Map, Value};
use std::time::Duration;

/// Default time an image is given to start and become ready.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(10);

/// Immutable description of a container image.
///
/// Implementations are shared by reference between containers and must not
/// change once handed out.
pub trait Image: Send + Sync {
    /// Reference passed to the runtime pull (`"redis:7-alpine"`).
    fn pull_name(&self) -> &str;

    /// Environment every container of this image starts with.
    fn default_environment(&self) -> Map<String, Value> {
        Map::new()
    }

    /// How long to wait for startup and readiness unless the caller overrides it.
    fn max_wait(&self) -> Duration {
        DEFAULT_MAX_WAIT
    }

    /// Host-side command that exits zero when `container` is healthy.
    fn check_command(&self, _container: &Container) -> Option<Vec<String>> {
        None
    }
}

/// Plain-data [`Image`] built from values.
///
/// The health check is an argument template; `{address}`, `{id}` and `{name}`
/// are replaced with the started container's values.
#[derive(Debug, Clone, Default)]
pub struct StaticImage {
    pull_name: String,
    environment: Map<String, Value>,
    max_wait: Option<Duration>,
    check_template: Option<Vec<String>>,
}

impl StaticImage {
    /// Describe the image at `pull_name`.
    pub fn new<S: Into<String>>(pull_name: S) -> Self {
        Self {
            pull_name: pull_name.into(),
            ..Default::default()
        }
    }

    /// Add a default environment variable.
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.environment
            .insert(key.into(), Value::String(value.into()));
        self
    }

    /// Set the per-image wait budget.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Set the health-check argument template.
    pub fn check<I, S>(mut self, template: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check_template = Some(template.into_iter().map(|s| s.into()).collect());
        self
    }
}

impl Image for StaticImage {
    fn pull_name(&self) -> &str {
        &self.pull_name
    }

    fn default_environment(&self) -> Map<String, Value> {
        self.environment.clone()
    }

    fn max_wait(&self) -> Duration {
        self.max_wait.unwrap_or(DEFAULT_MAX_WAIT)
    }

    fn check_command(&self, container: &Container) -> Option<Vec<String>> {
        let template = self.check_template.as_ref()?;
        let address = container
            .address()
            .map(|a| a.to_string())
            .unwrap_or_default();
        let id = container.id().unwrap_or_default().to_string();

        Some(
            template
                .iter()
                .map(|arg| {
                    arg.replace("{address}", &address)
                        .replace("{id}", &id)
                        .replace("{name}", container.name())
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_image_defaults() {
        let image = StaticImage::new("alpine:3.19");
        assert_eq!(image.pull_name(), "alpine:3.19");
        assert!(image.default_environment().is_empty());
        assert_eq!(Image::max_wait(&image), DEFAULT_MAX_WAIT);
    }

    #[test]
    fn test_static_image_environment_and_wait() {
        let image = StaticImage::new("postgres:16")
            .env("POSTGRES_PASSWORD", "secret")
            .max_wait(Duration::from_secs(30));

        let env = image.default_environment();
        assert_eq!(env.get("POSTGRES_PASSWORD"), Some(&Value::from("secret")));
        assert_eq!(Image::max_wait(&image), Duration::from_secs(30));
    }
}
