//! Docker/Podman runtime client.
//!
//! Implements [`RuntimeClient`] over the bollard Docker API with connection
//! fallback (Docker local defaults, then rootless and system Podman sockets)
//! and a ping on connect.

use crate::container::runtime::{
    ContainerSnapshot, ContainerStatus, CreateRequest, Launch, PulledImage, RuntimeClient,
    RuntimeHandle,
};
use crate::container::sanitize::prune;
use crate::container::{ContainerError, PortSpec, Result};
use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerCreateBody, CreateImageInfo, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, CreateImageOptions, InspectContainerOptions, KillContainerOptions,
    RemoveContainerOptions, StartContainerOptions,
};
use futures::stream::StreamExt;
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Seconds bollard waits on a single API request.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Docker/Podman API client.
#[derive(Clone)]
pub struct DockerClient {
    docker: Arc<Docker>,
}

impl DockerClient {
    /// Connect to whichever runtime is available and verify it answers.
    ///
    /// Tries Docker's local defaults, then the rootless and system Podman
    /// sockets, keeping the first one that answers a ping.
    ///
    /// # Errors
    ///
    /// Returns error if neither Docker nor Podman can be reached.
    pub async fn connect() -> Result<Self> {
        debug!("Attempting to connect to container runtime...");

        for (source, candidate) in Self::candidates() {
            let docker = match candidate {
                Ok(docker) => docker,
                Err(e) => {
                    debug!("{} unusable: {}", source, e);
                    continue;
                }
            };

            let client = Self::from_docker(docker);
            match client.ping().await {
                Ok(()) => {
                    info!("Connected to container runtime via {}", source);
                    return Ok(client);
                }
                Err(e) => debug!("{} did not answer: {}", source, e),
            }
        }

        Err(ContainerError::ConfigError(
            "Failed to connect to Docker or Podman. Please ensure Docker or Podman is installed and running.".to_string(),
        ))
    }

    /// Connect to an explicit daemon address (`unix:///...`, `tcp://...`).
    ///
    /// # Errors
    ///
    /// Returns error if the address is unusable or the daemon does not answer.
    pub async fn connect_with_host(host: &str) -> Result<Self> {
        debug!("Connecting to container runtime at {}", host);

        let docker = if host.starts_with("unix://") {
            Docker::connect_with_socket(host, REQUEST_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)?
        } else {
            Docker::connect_with_http(host, REQUEST_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)?
        };

        let client = Self::from_docker(docker);
        client.ping().await?;
        Ok(client)
    }

    /// Wrap an existing bollard client.
    pub fn from_docker(docker: Docker) -> Self {
        Self {
            docker: Arc::new(docker),
        }
    }

    fn candidates() -> Vec<(String, std::result::Result<Docker, BollardError>)> {
        let mut candidates = vec![(
            "local defaults".to_string(),
            Docker::connect_with_local_defaults(),
        )];

        #[cfg(unix)]
        {
            let mut sockets = Vec::new();
            if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
                sockets.push(format!("unix://{}/podman/podman.sock", runtime_dir));
            }
            sockets.push("unix:///run/podman/podman.sock".to_string());

            for socket in sockets {
                let docker = Docker::connect_with_socket(
                    &socket,
                    REQUEST_TIMEOUT_SECS,
                    bollard::API_DEFAULT_VERSION,
                );
                candidates.push((socket, docker));
            }
        }

        candidates
    }

    /// Ping the runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the daemon does not answer.
    pub async fn ping(&self) -> Result<()> {
        self.docker.ping().await?;
        debug!("Container runtime ping successful");
        Ok(())
    }

    /// The underlying bollard client.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    fn host_config(request: &CreateRequest) -> Result<HostConfig> {
        let options = &request.options;

        let port_bindings: Map<String, Value> = options
            .ports
            .iter()
            .flatten()
            .map(|(token, binding)| {
                let host_port = binding
                    .host_port()
                    .map(|p| p.to_string())
                    .unwrap_or_default();
                (
                    normalize_port_token(token),
                    json!([{ "HostPort": host_port }]),
                )
            })
            .collect();

        let mut document = Map::new();
        document.insert("CapAdd".to_string(), json!(options.cap_add));
        document.insert("Memory".to_string(), json!(options.memory_bytes()?));
        document.insert("Privileged".to_string(), json!(options.privileged));
        document.insert(
            "PublishAllPorts".to_string(),
            json!(options.publish_all_ports),
        );
        document.insert("PortBindings".to_string(), Value::Object(port_bindings));

        serde_json::from_value(Value::Object(prune(&document)))
            .map_err(|e| ContainerError::ConfigError(format!("Invalid host configuration: {}", e)))
    }

    /// Creation body: image, environment, launch override, labels and host config.
    ///
    /// Docker keys exposed ports by token with an empty object as the value.
    fn create_body(request: &CreateRequest) -> Result<ContainerCreateBody> {
        let (entrypoint, cmd) = match &request.launch {
            Launch::ImageDefault => (None, None),
            Launch::Entrypoint(argv) => (Some(argv.clone()), None),
            Launch::Cmd(argv) => (None, Some(argv.clone())),
        };

        let exposed_ports: HashMap<String, HashMap<(), ()>> = request
            .options
            .port_specs()?
            .iter()
            .map(|spec| (spec.to_string(), HashMap::new()))
            .collect();

        let labels: HashMap<String, String> = request
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(ContainerCreateBody {
            image: Some(request.image.clone()),
            env: if request.env.is_empty() {
                None
            } else {
                Some(request.env.clone())
            },
            entrypoint,
            cmd,
            exposed_ports: if exposed_ports.is_empty() {
                None
            } else {
                Some(exposed_ports)
            },
            labels: Some(labels),
            host_config: Some(Self::host_config(request)?),
            ..Default::default()
        })
    }
}

#[async_trait]
impl RuntimeClient for DockerClient {
    async fn pull(&self, reference: &str) -> Result<PulledImage> {
        let (from_image, tag) = split_image_reference(reference);
        info!("Pulling image: {}", reference);

        let mut stream = self.docker.create_image(
            Some(CreateImageOptions {
                from_image: Some(from_image.to_string()),
                tag: Some(tag.to_string()),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = &info.status {
                        debug!("Pull status: {}", status);
                    }
                    if let Some(message) = pull_error(&info) {
                        if is_missing_image_message(&message) {
                            return Err(ContainerError::ImageNotFound {
                                image: reference.to_string(),
                            });
                        }
                        return Err(ContainerError::Other(format!("Pull failed: {}", message)));
                    }
                }
                Err(BollardError::DockerResponseServerError {
                    status_code: 404, ..
                }) => {
                    return Err(ContainerError::ImageNotFound {
                        image: reference.to_string(),
                    });
                }
                Err(BollardError::DockerStreamError { error }) if is_missing_image_message(&error) => {
                    return Err(ContainerError::ImageNotFound {
                        image: reference.to_string(),
                    });
                }
                Err(e) => return Err(ContainerError::ApiError(e)),
            }
        }

        let inspect = self.docker.inspect_image(reference).await?;
        let document = serde_json::to_value(&inspect)
            .map_err(|e| ContainerError::Other(format!("Unreadable image metadata: {}", e)))?;
        let config = document.get("Config").cloned().unwrap_or(Value::Null);

        let pulled = PulledImage {
            reference: reference.to_string(),
            has_entrypoint: has_entrypoint(&config),
            exposed_ports: exposed_ports(&config),
        };

        info!(
            "Successfully pulled image: {} (entrypoint: {}, exposed: {:?})",
            reference, pulled.has_entrypoint, pulled.exposed_ports
        );
        Ok(pulled)
    }

    async fn create_and_start(&self, request: &CreateRequest) -> Result<RuntimeHandle> {
        let body = Self::create_body(request)?;

        debug!("Creating container: {}", request.name);

        let response = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: Some(request.name.clone()),
                    ..Default::default()
                }),
                body,
            )
            .await?;

        let handle = RuntimeHandle {
            id: response.id,
            name: request.name.clone(),
        };
        info!("Created container: {}", handle);

        self.docker
            .start_container(&handle.id, None::<StartContainerOptions>)
            .await?;

        info!("Started container: {}", handle);
        Ok(handle)
    }

    async fn inspect(&self, handle: &RuntimeHandle) -> Result<ContainerSnapshot> {
        let inspect = self
            .docker
            .inspect_container(&handle.id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| match e {
                BollardError::DockerResponseServerError {
                    status_code: 404, ..
                } => ContainerError::NotFound(handle.id.clone()),
                e => ContainerError::ApiError(e),
            })?;

        let status = inspect
            .state
            .as_ref()
            .and_then(|state| state.status.as_ref())
            .map(|status| ContainerStatus::from_runtime(&status.to_string()))
            .unwrap_or_else(|| ContainerStatus::Unknown(String::new()));

        let document = serde_json::to_value(&inspect)
            .map_err(|e| ContainerError::Other(format!("Unreadable container state: {}", e)))?;
        let network = document.get("NetworkSettings").cloned().unwrap_or(Value::Null);

        Ok(ContainerSnapshot {
            status,
            address: container_address(&network),
            published_ports: published_ports(&network),
        })
    }

    async fn kill(&self, handle: &RuntimeHandle) -> Result<()> {
        debug!("Killing container: {}", handle);

        match self
            .docker
            .kill_container(&handle.id, None::<KillContainerOptions>)
            .await
        {
            Ok(()) => {
                info!("Killed container: {}", handle);
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 409, ..
            }) => Err(ContainerError::AlreadyStopped(handle.id.clone())),
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(ContainerError::NotFound(handle.id.clone())),
            Err(e) => Err(ContainerError::ApiError(e)),
        }
    }

    async fn remove(&self, handle: &RuntimeHandle) -> Result<()> {
        debug!("Removing container: {}", handle);

        match self
            .docker
            .remove_container(
                &handle.id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(()) => {
                info!("Removed container: {}", handle);
                Ok(())
            }
            Err(BollardError::DockerResponseServerError {
                status_code: 404, ..
            }) => Err(ContainerError::NotFound(handle.id.clone())),
            Err(e) => Err(ContainerError::ApiError(e)),
        }
    }
}

/// Split `repo[:tag]` / `repo@digest` into the pull name and tag, defaulting
/// to `latest` so a bare repository never pulls every tag.
fn split_image_reference(reference: &str) -> (&str, &str) {
    if let Some((name, digest)) = reference.split_once('@') {
        return (name, digest);
    }

    // A colon after the last slash separates the tag; one before it is a
    // registry port.
    let last_slash = reference.rfind('/').map_or(0, |i| i + 1);
    match reference[last_slash..].rfind(':') {
        Some(i) => (
            &reference[..last_slash + i],
            &reference[last_slash + i + 1..],
        ),
        None => (reference, "latest"),
    }
}

/// Error reported inline in a pull progress message, if any.
fn pull_error(info: &CreateImageInfo) -> Option<String> {
    let document = serde_json::to_value(info).ok()?;
    document
        .get("errorDetail")
        .and_then(|detail| detail.get("message"))
        .or_else(|| document.get("error"))
        .and_then(Value::as_str)
        .map(String::from)
}

fn is_missing_image_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("not found")
        || message.contains("manifest unknown")
        || message.contains("does not exist")
        || message.contains("pull access denied")
}

/// Docker port keys always carry a protocol (`"8080/tcp"`).
fn normalize_port_token(token: &str) -> String {
    PortSpec::parse(token)
        .map(|spec| spec.to_string())
        .unwrap_or_else(|_| token.to_string())
}

fn has_entrypoint(config: &Value) -> bool {
    match config.get("Entrypoint") {
        Some(Value::Array(argv)) => !argv.is_empty(),
        Some(Value::String(line)) => !line.is_empty(),
        _ => false,
    }
}

/// Exposed ports appear as an object keyed by token, or as a token list,
/// depending on the API version.
fn exposed_ports(config: &Value) -> Vec<String> {
    match config.get("ExposedPorts") {
        Some(Value::Object(ports)) => ports.keys().cloned().collect(),
        Some(Value::Array(ports)) => ports
            .iter()
            .filter_map(|p| p.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    }
}

fn container_address(network: &Value) -> Option<IpAddr> {
    let parse = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .and_then(|s| s.parse::<IpAddr>().ok())
    };

    parse(network.get("IPAddress")).or_else(|| {
        network
            .get("Networks")
            .and_then(Value::as_object)?
            .values()
            .find_map(|endpoint| parse(endpoint.get("IPAddress")))
    })
}

fn published_ports(network: &Value) -> BTreeMap<PortSpec, u16> {
    let Some(ports) = network.get("Ports").and_then(Value::as_object) else {
        return BTreeMap::new();
    };

    ports
        .iter()
        .filter_map(|(token, bindings)| {
            let spec = PortSpec::parse(token).ok()?;
            let host_port = bindings
                .as_array()?
                .iter()
                .find_map(|b| b.get("HostPort")?.as_str()?.parse::<u16>().ok())?;
            Some((spec, host_port))
        })
        .collect()
}
