//! Ephemeral container lifecycle and readiness.
//!
//! This module starts a single container from an image, polls the runtime
//! until the container is running, probes its ports until they accept
//! connections, and tears it down again on every exit path.
//!
//! ## Architecture
//!
//! - [`port`]: `"<port>/<proto>"` token parsing
//! - [`sanitize`]: pruning of absent values from nested configuration
//! - [`options`]: runtime creation options and command overrides
//! - [`image`]: image descriptors
//! - [`runtime`]: the [`RuntimeClient`] boundary and the status enum
//! - [`client`]: Docker/Podman implementation of [`RuntimeClient`] over bollard
//! - [`lifecycle`]: [`Container`] itself (run, kill, remove, accessors)
//! - [`readiness`]: port readiness probing (`Container::wait`)
//! - [`health`]: host-side health checks (`Container::check`)
//! - [`fixture`]: scoped acquisition with guaranteed teardown
//! - [`testing`]: scripted in-memory runtime
//!
//! ## Usage
//!
//! ```rust,no_run
//! use stevedore::container::{Container, DockerClient, Fixture, StaticImage, WaitOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(DockerClient::connect().await?);
//!     let image = Arc::new(StaticImage::new("redis:7-alpine"));
//!
//!     let builder = Container::builder(image).client(client);
//!     let pong = Fixture::new(builder)
//!         .wait(WaitOptions::default())
//!         .run(async |container| -> anyhow::Result<String> {
//!             Ok(format!("redis up at {}", container.address()?))
//!         })
//!         .await?;
//!
//!     println!("{}", pong);
//!     Ok(())
//! }
//! ```

#[cfg(feature = "docker")]
mod client;
mod fixture;
mod health;
mod image;
mod lifecycle;
mod options;
mod port;
mod readiness;
mod runtime;
pub mod sanitize;
pub mod testing;

#[cfg(feature = "docker")]
pub use client::DockerClient;
pub use fixture::{Fixture, scoped};
pub use image::{DEFAULT_MAX_WAIT, Image, StaticImage};
pub use lifecycle::{Container, ContainerBuilder};
pub use options::{Command, PortBinding, RunOptions};
pub use port::{PortSpec, Protocol, SUPPORTED_PROTOCOLS};
pub use readiness::WaitOptions;
pub use runtime::{
    ContainerSnapshot, ContainerStatus, CreateRequest, Launch, PulledImage, RuntimeClient,
    RuntimeHandle,
};
pub use sanitize::prune;

use std::time::Duration;

/// Container lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Docker/Podman API error
    #[cfg(feature = "docker")]
    #[error("Container API error: {0}")]
    ApiError(#[from] bollard::errors::Error),

    /// The image reference does not exist in the registry
    #[error("Image not found: {image}")]
    ImageNotFound {
        /// Reference that was pulled
        image: String,
    },

    /// The container reached a terminal state before it was ever running
    #[error("Container {id} stopped prematurely (status: {status})")]
    StoppedPrematurely {
        /// Container identifier
        id: String,
        /// Terminal status observed
        status: ContainerStatus,
    },

    /// A bounded wait ran out of time
    #[error("Timed out after {elapsed:.1?} waiting for {waiting_for}")]
    Timeout {
        /// What was being waited for
        waiting_for: String,
        /// Wall-clock time spent waiting
        elapsed: Duration,
    },

    /// A port token named a protocol other than tcp/udp
    #[error("Unsupported protocol '{value}', expected one of: {allowed}")]
    UnsupportedProtocol {
        /// Offending protocol
        value: String,
        /// Accepted protocols
        allowed: String,
    },

    /// A port token is not a valid port number
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// Container configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An accessor needing a started container was called before `run()`
    #[error("Container has not been started")]
    NotStarted,

    /// The runtime reports the container is already stopped
    #[error("Container already stopped: {0}")]
    AlreadyStopped(String),

    /// Container not found
    #[error("Container not found: {0}")]
    NotFound(String),

    /// The image health check exited unsuccessfully
    #[error("Health check {command:?} failed: {status}")]
    CheckFailed {
        /// Command that was run
        command: Vec<String>,
        /// Exit status description
        status: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// General error
    #[error("Container error: {0}")]
    Other(String),
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
