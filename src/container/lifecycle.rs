//! Container lifecycle.
//!
//! A [`Container`] is created from an [`Image`] plus caller overrides, started
//! with [`Container::run`], and torn down with [`Container::kill`] and
//! [`Container::remove`]. Startup is a bounded poll over the runtime-reported
//! status; the deadline is fixed when polling begins, so slow status calls
//! count against the budget.

use crate::config::Settings;
use crate::container::runtime::{
    ContainerSnapshot, ContainerStatus, CreateRequest, Launch, PulledImage, RuntimeClient,
    RuntimeHandle,
};
use crate::container::sanitize::prune;
use crate::container::{Command, ContainerError, Image, PortSpec, Result, RunOptions};
use crate::env;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Builder for [`Container`].
pub struct ContainerBuilder {
    image: Arc<dyn Image>,
    command: Option<Command>,
    environment: Map<String, Value>,
    base_options: RunOptions,
    options: RunOptions,
    max_wait: Option<Duration>,
    startup_poll_interval: Duration,
    readiness_poll_interval: Duration,
    name_prefix: String,
    client: Option<Arc<dyn RuntimeClient>>,
}

impl ContainerBuilder {
    fn new(image: Arc<dyn Image>) -> Self {
        Self {
            image,
            command: None,
            environment: Map::new(),
            base_options: RunOptions::defaults(),
            options: RunOptions::default(),
            max_wait: None,
            startup_poll_interval: env::DEFAULT_STARTUP_POLL_INTERVAL,
            readiness_poll_interval: env::DEFAULT_READINESS_POLL_INTERVAL,
            name_prefix: env::DEFAULT_NAME_PREFIX.to_string(),
            client: None,
        }
    }

    /// Apply process-wide settings: timings, name prefix and option defaults.
    pub fn settings(mut self, settings: &Settings) -> Self {
        if let Some(max_wait) = settings.max_wait() {
            self.max_wait = Some(max_wait);
        }
        self.startup_poll_interval = settings.startup_poll_interval();
        self.readiness_poll_interval = settings.readiness_poll_interval();
        self.name_prefix = settings.name_prefix.clone();
        self.base_options = RunOptions::defaults().merge(&settings.options);
        self
    }

    /// Override the image's default process.
    pub fn command<C: Into<Command>>(mut self, command: C) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Set an environment variable, overriding the image default.
    pub fn env<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.environment
            .insert(key.into(), Value::String(value.into()));
        self
    }

    /// Remove an environment variable the image would otherwise set.
    pub fn unset_env<K: Into<String>>(mut self, key: K) -> Self {
        self.environment.insert(key.into(), Value::Null);
        self
    }

    /// Merge raw environment overrides; `null` values unset image defaults.
    pub fn environment(mut self, overrides: Map<String, Value>) -> Self {
        self.environment.extend(overrides);
        self
    }

    /// Caller creation options, layered over the defaults.
    pub fn options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Startup wait budget (defaults to the image's).
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Delay between status polls during startup.
    pub fn startup_poll_interval(mut self, interval: Duration) -> Self {
        self.startup_poll_interval = interval;
        self
    }

    /// Delay between port probe rounds during `wait()`.
    pub fn readiness_poll_interval(mut self, interval: Duration) -> Self {
        self.readiness_poll_interval = interval;
        self
    }

    /// Prefix of the generated container name.
    pub fn name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// Runtime client used by `run()`, `kill()` and `remove()`.
    pub fn client(mut self, client: Arc<dyn RuntimeClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the container.
    ///
    /// # Errors
    ///
    /// Returns error if an option port token or the memory limit is malformed,
    /// or if the options ask for an attached container.
    pub fn build(self) -> Result<Container> {
        let options = self.base_options.merge(&self.options);
        options.validate()?;

        let mut environment = self.image.default_environment();
        environment.extend(self.environment);
        let environment = prune(&environment);

        let max_wait = self.max_wait.unwrap_or_else(|| self.image.max_wait());
        let name = format!("{}-{}", self.name_prefix, uuid::Uuid::new_v4());

        Ok(Container {
            image: self.image,
            name,
            command: self.command,
            environment,
            options,
            max_wait,
            startup_poll_interval: self.startup_poll_interval,
            readiness_poll_interval: self.readiness_poll_interval,
            client: self.client,
            handle: None,
            pulled: None,
            snapshot: None,
        })
    }
}

/// One ephemeral container.
///
/// Owned by a single caller; the runtime handle is written once by
/// [`Container::run`] and read-only afterwards.
pub struct Container {
    image: Arc<dyn Image>,
    name: String,
    command: Option<Command>,
    environment: Map<String, Value>,
    options: RunOptions,
    max_wait: Duration,
    startup_poll_interval: Duration,
    readiness_poll_interval: Duration,
    client: Option<Arc<dyn RuntimeClient>>,
    handle: Option<RuntimeHandle>,
    pulled: Option<PulledImage>,
    snapshot: Option<ContainerSnapshot>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("image", &self.image.pull_name())
            .field("name", &self.name)
            .field("command", &self.command)
            .field("environment", &self.environment)
            .field("options", &self.options)
            .field("max_wait", &self.max_wait)
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Start building a container for `image`.
    pub fn builder(image: Arc<dyn Image>) -> ContainerBuilder {
        ContainerBuilder::new(image)
    }

    /// Pull, create and start the container, then poll until it is running.
    ///
    /// # Errors
    ///
    /// See [`Container::run_with`].
    pub async fn run(&mut self) -> Result<String> {
        self.run_with(None, None).await
    }

    /// [`Container::run`] with a call-time command and/or runtime client.
    ///
    /// A client passed here replaces the configured one for every later call.
    ///
    /// # Errors
    ///
    /// - [`ContainerError::ConfigError`] if no client is available or the
    ///   container was already started
    /// - [`ContainerError::ImageNotFound`] if the image does not exist
    /// - [`ContainerError::StoppedPrematurely`] if the container dies or exits
    ///   before running
    /// - [`ContainerError::Timeout`] if it is not running within `max_wait`
    /// - any other runtime error, unchanged
    pub async fn run_with(
        &mut self,
        command: Option<Command>,
        client: Option<Arc<dyn RuntimeClient>>,
    ) -> Result<String> {
        if let Some(handle) = &self.handle {
            return Err(ContainerError::ConfigError(format!(
                "Container {} was already started",
                handle
            )));
        }

        if let Some(client) = client {
            self.client = Some(client);
        }
        let client = self.client.clone().ok_or_else(|| {
            ContainerError::ConfigError("No container runtime client available".to_string())
        })?;

        let pulled = client.pull(self.image.pull_name()).await?;

        let launch = match command.as_ref().or(self.command.as_ref()) {
            None => Launch::ImageDefault,
            Some(command) if pulled.has_entrypoint => Launch::Entrypoint(command.to_argv()),
            Some(command) => Launch::Cmd(command.to_argv()),
        };

        let request = CreateRequest {
            name: self.name.clone(),
            image: pulled.reference.clone(),
            env: self.env_pairs(),
            options: self.options.clone(),
            launch,
            labels: BTreeMap::from([(env::MANAGED_LABEL.to_string(), "true".to_string())]),
        };

        info!(
            "Running container {} from image {} (env: {:?}, options: {:?}, launch: {:?})",
            self.name,
            self.image.pull_name(),
            self.environment,
            self.options,
            request.launch
        );

        let handle = client.create_and_start(&request).await?;
        self.handle = Some(handle.clone());
        self.pulled = Some(pulled);

        self.wait_until_running(client.as_ref(), &handle).await?;
        Ok(handle.id)
    }

    async fn wait_until_running(
        &mut self,
        client: &dyn RuntimeClient,
        handle: &RuntimeHandle,
    ) -> Result<()> {
        let started = Instant::now();

        while started.elapsed() < self.max_wait {
            let snapshot = client.inspect(handle).await?;
            let status = snapshot.status.clone();
            self.snapshot = Some(snapshot);

            match status {
                ContainerStatus::Running => {
                    info!(
                        "Container {} running after {:.1?}",
                        handle,
                        started.elapsed()
                    );
                    return Ok(());
                }
                ContainerStatus::Dead | ContainerStatus::Exited => {
                    return Err(ContainerError::StoppedPrematurely {
                        id: handle.id.clone(),
                        status,
                    });
                }
                ContainerStatus::Created | ContainerStatus::Paused => {
                    debug!("Container {} is {}, polling again", handle, status);
                }
                ContainerStatus::Unknown(raw) => {
                    warn!(
                        "Container {} reported unrecognized status '{}', polling again",
                        handle, raw
                    );
                }
            }

            tokio::time::sleep(self.startup_poll_interval).await;
        }

        Err(ContainerError::Timeout {
            waiting_for: format!("container {} to reach running state", handle),
            elapsed: started.elapsed(),
        })
    }

    /// Re-read the container's state from the runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotStarted`] before `run()`, or the runtime error.
    pub async fn refresh(&mut self) -> Result<&ContainerSnapshot> {
        let handle = self.handle.as_ref().ok_or(ContainerError::NotStarted)?;
        let client = self.client.as_ref().ok_or(ContainerError::NotStarted)?;
        let snapshot = client.inspect(handle).await?;
        Ok(self.snapshot.insert(snapshot))
    }

    /// Kill the container.
    ///
    /// Killing a container the runtime already reports as stopped is not an
    /// error, and neither is killing one that was never started.
    ///
    /// # Errors
    ///
    /// Returns any other runtime error.
    pub async fn kill(&self) -> Result<()> {
        let (Some(handle), Some(client)) = (&self.handle, &self.client) else {
            debug!("Container {} was never started, nothing to kill", self.name);
            return Ok(());
        };

        match client.kill(handle).await {
            Ok(()) => Ok(()),
            Err(ContainerError::AlreadyStopped(_)) => {
                debug!("Container {} already stopped", handle);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Force-remove the container and its anonymous volumes.
    ///
    /// Warns and returns `Ok` if the container was never started; removing an
    /// already-removed container is a no-op.
    ///
    /// # Errors
    ///
    /// Returns any other runtime error.
    pub async fn remove(&self) -> Result<()> {
        let (Some(handle), Some(client)) = (&self.handle, &self.client) else {
            warn!("Container {} was never started, nothing to remove", self.name);
            return Ok(());
        };

        match client.remove(handle).await {
            Ok(()) => Ok(()),
            Err(ContainerError::NotFound(_)) => {
                debug!("Container {} already removed", handle);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Runtime container ID.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotStarted`] before `run()`.
    pub fn id(&self) -> Result<&str> {
        self.handle
            .as_ref()
            .map(|h| h.id.as_str())
            .ok_or(ContainerError::NotStarted)
    }

    /// Generated container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runtime handle, once started.
    pub fn handle(&self) -> Option<&RuntimeHandle> {
        self.handle.as_ref()
    }

    /// Address the container is reachable on.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotStarted`] before `run()`, or
    /// [`ContainerError::Other`] if the runtime reported no address.
    pub fn address(&self) -> Result<IpAddr> {
        let handle = self.handle.as_ref().ok_or(ContainerError::NotStarted)?;
        self.snapshot
            .as_ref()
            .and_then(|s| s.address)
            .ok_or_else(|| {
                ContainerError::Other(format!("Container {} has no network address", handle))
            })
    }

    /// Ports the container serves: the image's exposed ports plus the ports
    /// named in the creation options.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::NotStarted`] before `run()`, or the parse
    /// error of a malformed port token.
    pub fn ports(&self) -> Result<Vec<PortSpec>> {
        let pulled = self.pulled.as_ref().ok_or(ContainerError::NotStarted)?;
        if self.handle.is_none() {
            return Err(ContainerError::NotStarted);
        }

        let mut ports = BTreeSet::new();
        for token in &pulled.exposed_ports {
            ports.insert(PortSpec::parse(token)?);
        }
        ports.extend(self.options.port_specs()?);

        Ok(ports.into_iter().collect())
    }

    /// Host port the runtime published for `port`, if any.
    pub fn host_port(&self, port: PortSpec) -> Option<u16> {
        self.snapshot
            .as_ref()
            .and_then(|s| s.published_ports.get(&port).copied())
    }

    /// Status observed by the most recent poll.
    pub fn status(&self) -> Option<&ContainerStatus> {
        self.snapshot.as_ref().map(|s| &s.status)
    }

    /// The image this container runs.
    pub fn image(&self) -> &Arc<dyn Image> {
        &self.image
    }

    /// Configured command override.
    pub fn command(&self) -> Option<&Command> {
        self.command.as_ref()
    }

    /// Merged, pruned environment.
    pub fn environment(&self) -> &Map<String, Value> {
        &self.environment
    }

    /// Merged creation options.
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Startup wait budget.
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Delay between status polls.
    pub fn startup_poll_interval(&self) -> Duration {
        self.startup_poll_interval
    }

    /// Delay between port probe rounds.
    pub fn readiness_poll_interval(&self) -> Duration {
        self.readiness_poll_interval
    }

    fn env_pairs(&self) -> Vec<String> {
        self.environment
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{}={}", key, s),
                other => format!("{}={}", key, other),
            })
            .collect()
    }
}
