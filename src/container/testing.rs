//! In-memory [`RuntimeClient`] for tests.
//!
//! [`ScriptedRuntime`] replays a scripted status sequence, reports a
//! configurable image and address, and records every call so tests can
//! assert on ordering (for example that `kill` precedes `remove`).

use crate::container::runtime::{
    ContainerSnapshot, ContainerStatus, CreateRequest, PulledImage, RuntimeClient, RuntimeHandle,
};
use crate::container::{ContainerError, PortSpec, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A call received by [`ScriptedRuntime`].
#[derive(Debug, Clone)]
pub enum RuntimeCall {
    /// `pull(reference)`
    Pull(String),
    /// `create_and_start(request)`
    CreateAndStart(CreateRequest),
    /// `inspect(id)`
    Inspect(String),
    /// `kill(id)`
    Kill(String),
    /// `remove(id)`
    Remove(String),
}

impl RuntimeCall {
    /// Operation name (`"pull"`, `"inspect"`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeCall::Pull(_) => "pull",
            RuntimeCall::CreateAndStart(_) => "create_and_start",
            RuntimeCall::Inspect(_) => "inspect",
            RuntimeCall::Kill(_) => "kill",
            RuntimeCall::Remove(_) => "remove",
        }
    }
}

#[derive(Debug, Default)]
struct State {
    statuses: VecDeque<ContainerStatus>,
    last_status: Option<ContainerStatus>,
    killed: bool,
    removed: bool,
    created: u32,
    calls: Vec<RuntimeCall>,
}

/// Scriptable runtime double.
///
/// Statuses are consumed one per `inspect`; the last one repeats. With no
/// script every container is immediately `Running`.
#[derive(Debug)]
pub struct ScriptedRuntime {
    image: PulledImage,
    missing_image: bool,
    failing_kill: bool,
    address: Option<IpAddr>,
    published_ports: BTreeMap<PortSpec, u16>,
    state: Mutex<State>,
}

impl Default for ScriptedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRuntime {
    /// Runtime whose containers run immediately on 127.0.0.1.
    pub fn new() -> Self {
        Self {
            image: PulledImage::default(),
            missing_image: false,
            failing_kill: false,
            address: Some(IpAddr::from([127, 0, 0, 1])),
            published_ports: BTreeMap::new(),
            state: Mutex::new(State::default()),
        }
    }

    /// Statuses returned by successive `inspect` calls.
    pub fn statuses<I: IntoIterator<Item = ContainerStatus>>(self, statuses: I) -> Self {
        self.lock().statuses = statuses.into_iter().collect();
        self
    }

    /// Whether the pulled image declares an entrypoint.
    pub fn entrypoint(mut self, has_entrypoint: bool) -> Self {
        self.image.has_entrypoint = has_entrypoint;
        self
    }

    /// Ports the pulled image exposes.
    pub fn exposed_ports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.image.exposed_ports = ports.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Make every pull report the image as missing.
    pub fn missing_image(mut self) -> Self {
        self.missing_image = true;
        self
    }

    /// Make `kill` fail with a non-recoverable error.
    pub fn failing_kill(mut self) -> Self {
        self.failing_kill = true;
        self
    }

    /// Address reported by `inspect` (`None` for no network).
    pub fn address(mut self, address: Option<IpAddr>) -> Self {
        self.address = address;
        self
    }

    /// Host port reported for a container port.
    pub fn published_port(mut self, port: PortSpec, host_port: u16) -> Self {
        self.published_ports.insert(port, host_port);
        self
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.lock().calls.clone()
    }

    /// Names of every call received so far, in order.
    pub fn call_names(&self) -> Vec<&'static str> {
        self.lock().calls.iter().map(RuntimeCall::name).collect()
    }

    /// Number of calls to the named operation.
    pub fn count(&self, name: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.name() == name)
            .count()
    }

    /// Most recent create request.
    pub fn last_create(&self) -> Option<CreateRequest> {
        self.lock().calls.iter().rev().find_map(|call| match call {
            RuntimeCall::CreateAndStart(request) => Some(request.clone()),
            _ => None,
        })
    }

    /// Whether the container has been removed.
    pub fn is_removed(&self) -> bool {
        self.lock().removed
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RuntimeClient for ScriptedRuntime {
    async fn pull(&self, reference: &str) -> Result<PulledImage> {
        self.lock().calls.push(RuntimeCall::Pull(reference.to_string()));
        if self.missing_image {
            return Err(ContainerError::ImageNotFound {
                image: reference.to_string(),
            });
        }
        Ok(PulledImage {
            reference: reference.to_string(),
            ..self.image.clone()
        })
    }

    async fn create_and_start(&self, request: &CreateRequest) -> Result<RuntimeHandle> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::CreateAndStart(request.clone()));
        state.created += 1;
        Ok(RuntimeHandle {
            id: format!("{:064x}", state.created),
            name: request.name.clone(),
        })
    }

    async fn inspect(&self, handle: &RuntimeHandle) -> Result<ContainerSnapshot> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Inspect(handle.id.clone()));
        if state.removed {
            return Err(ContainerError::NotFound(handle.id.clone()));
        }

        let next = state.statuses.pop_front();
        let status = next
            .or_else(|| state.last_status.clone())
            .unwrap_or(ContainerStatus::Running);
        state.last_status = Some(status.clone());

        let status = if state.killed {
            ContainerStatus::Exited
        } else {
            status
        };
        Ok(ContainerSnapshot {
            status,
            address: self.address,
            published_ports: self.published_ports.clone(),
        })
    }

    async fn kill(&self, handle: &RuntimeHandle) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Kill(handle.id.clone()));
        if self.failing_kill {
            return Err(ContainerError::Other("kill rejected".to_string()));
        }
        if state.removed {
            return Err(ContainerError::NotFound(handle.id.clone()));
        }
        let stopped = matches!(
            state.last_status,
            Some(ContainerStatus::Exited | ContainerStatus::Dead)
        );
        if state.killed || stopped {
            return Err(ContainerError::AlreadyStopped(handle.id.clone()));
        }
        state.killed = true;
        Ok(())
    }

    async fn remove(&self, handle: &RuntimeHandle) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(RuntimeCall::Remove(handle.id.clone()));
        if state.removed {
            return Err(ContainerError::NotFound(handle.id.clone()));
        }
        state.removed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::RunOptions;
    use crate::container::runtime::Launch;

    fn handle() -> RuntimeHandle {
        RuntimeHandle {
            id: "abc".to_string(),
            name: "stevedore-test".to_string(),
        }
    }

    fn request() -> CreateRequest {
        CreateRequest {
            name: "stevedore-test".to_string(),
            image: "alpine:3.19".to_string(),
            env: Vec::new(),
            options: RunOptions::defaults(),
            launch: Launch::ImageDefault,
            labels: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_last_status_repeats() {
        let runtime =
            ScriptedRuntime::new().statuses([ContainerStatus::Created, ContainerStatus::Paused]);
        let h = handle();
        assert_eq!(runtime.inspect(&h).await.unwrap().status, ContainerStatus::Created);
        assert_eq!(runtime.inspect(&h).await.unwrap().status, ContainerStatus::Paused);
        assert_eq!(runtime.inspect(&h).await.unwrap().status, ContainerStatus::Paused);
    }

    #[tokio::test]
    async fn test_kill_twice_reports_already_stopped() {
        let runtime = ScriptedRuntime::new();
        let h = runtime.create_and_start(&request()).await.unwrap();
        assert_eq!(h.name, "stevedore-test");
        assert_eq!(h.id.len(), 64);

        runtime.kill(&h).await.unwrap();
        assert!(matches!(
            runtime.kill(&h).await,
            Err(ContainerError::AlreadyStopped(_))
        ));
        assert_eq!(runtime.inspect(&h).await.unwrap().status, ContainerStatus::Exited);
    }

    #[tokio::test]
    async fn test_remove_twice_reports_not_found() {
        let runtime = ScriptedRuntime::new();
        let h = handle();
        runtime.remove(&h).await.unwrap();
        assert!(matches!(
            runtime.remove(&h).await,
            Err(ContainerError::NotFound(_))
        ));
        assert_eq!(runtime.call_names(), vec!["remove", "remove"]);
    }

    #[tokio::test]
    async fn test_pull_reports_configured_image() {
        let runtime = ScriptedRuntime::new()
            .entrypoint(true)
            .exposed_ports(["6379/tcp"]);
        let pulled = runtime.pull("redis:7").await.unwrap();
        assert_eq!(pulled.reference, "redis:7");
        assert!(pulled.has_entrypoint);
        assert_eq!(pulled.exposed_ports, vec!["6379/tcp".to_string()]);
    }
}
