//! Boundary to the container runtime.
//!
//! [`RuntimeClient`] is the only way a [`Container`](crate::container::Container)
//! talks to the daemon. [`DockerClient`](crate::container::DockerClient)
//! implements it over bollard; [`ScriptedRuntime`](crate::container::testing::ScriptedRuntime)
//! implements it in memory for tests.

use crate::container::{PortSpec, Result, RunOptions};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

/// Container status as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created but not yet started
    Created,
    /// Paused
    Paused,
    /// Process is running
    Running,
    /// Runtime gave up on the container
    Dead,
    /// Process exited
    Exited,
    /// Any status this crate does not know about, verbatim
    Unknown(String),
}

impl ContainerStatus {
    /// Map a runtime status string (`"running"`, `"exited"`, ...).
    pub fn from_runtime(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "created" => ContainerStatus::Created,
            "paused" => ContainerStatus::Paused,
            "running" => ContainerStatus::Running,
            "dead" => ContainerStatus::Dead,
            "exited" => ContainerStatus::Exited,
            _ => ContainerStatus::Unknown(status.to_string()),
        }
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerStatus::Created => write!(f, "created"),
            ContainerStatus::Paused => write!(f, "paused"),
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Dead => write!(f, "dead"),
            ContainerStatus::Exited => write!(f, "exited"),
            ContainerStatus::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}

/// Opaque reference to a container created on the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeHandle {
    /// Runtime-assigned container ID
    pub id: String,
    /// Container name
    pub name: String,
}

impl RuntimeHandle {
    /// Abbreviated ID for log lines.
    pub fn short_id(&self) -> &str {
        self.id.get(..12).unwrap_or(&self.id)
    }
}

impl fmt::Display for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.short_id())
    }
}

/// Image metadata returned by a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PulledImage {
    /// Reference that was pulled
    pub reference: String,
    /// Whether the image declares its own entrypoint
    pub has_entrypoint: bool,
    /// Port tokens the image exposes (`"80/tcp"`)
    pub exposed_ports: Vec<String>,
}

/// How the effective command reaches the container process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launch {
    /// Keep the image's own entrypoint and command
    ImageDefault,
    /// Replace the image entrypoint
    Entrypoint(Vec<String>),
    /// Replace the image command
    Cmd(Vec<String>),
}

/// Everything needed to create and start one container.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Container name
    pub name: String,
    /// Image reference, as pulled
    pub image: String,
    /// Environment as `KEY=value` pairs
    pub env: Vec<String>,
    /// Merged creation options
    pub options: RunOptions,
    /// Process override
    pub launch: Launch,
    /// Container labels
    pub labels: BTreeMap<String, String>,
}

/// Point-in-time view of a created container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSnapshot {
    /// Current status
    pub status: ContainerStatus,
    /// Address the container can be reached on, once networking is up
    pub address: Option<IpAddr>,
    /// Host ports published for container ports
    pub published_ports: BTreeMap<PortSpec, u16>,
}

impl ContainerSnapshot {
    /// Snapshot carrying only a status.
    pub fn with_status(status: ContainerStatus) -> Self {
        Self {
            status,
            address: None,
            published_ports: BTreeMap::new(),
        }
    }
}

/// Operations a container runtime must provide.
///
/// `kill` reports a container that is already stopped as
/// [`ContainerError::AlreadyStopped`](crate::container::ContainerError::AlreadyStopped),
/// and `remove` reports a missing container as
/// [`ContainerError::NotFound`](crate::container::ContainerError::NotFound).
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Pull an image and return its metadata.
    async fn pull(&self, reference: &str) -> Result<PulledImage>;

    /// Create and start a container.
    async fn create_and_start(&self, request: &CreateRequest) -> Result<RuntimeHandle>;

    /// Refresh the observed state of a container.
    async fn inspect(&self, handle: &RuntimeHandle) -> Result<ContainerSnapshot>;

    /// Kill a running container.
    async fn kill(&self, handle: &RuntimeHandle) -> Result<()>;

    /// Force-remove a container and its anonymous volumes.
    async fn remove(&self, handle: &RuntimeHandle) -> Result<()>;
}
