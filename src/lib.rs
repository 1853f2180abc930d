//! # Stevedore
//!
//! Ephemeral containers for tests and tooling: start a container from an
//! image, wait until it is running and its ports accept connections, use it,
//! and tear it down on every exit path.
//!
//! ## Architecture Overview
//!
//! - **[`container`]**: the container lifecycle, readiness probing, the
//!   runtime client boundary and the scoped fixture
//! - **[`config`]**: process-wide settings loaded from TOML
//! - **[`env`]**: shared names and default values
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stevedore::container::{Container, PortSpec, StaticImage, WaitOptions, scoped};
//! use stevedore::Settings;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::discover()?;
//!     let client = Arc::new(settings.runtime_client().await?);
//!
//!     let container = Container::builder(Arc::new(StaticImage::new("nginx:alpine")))
//!         .settings(&settings)
//!         .client(client)
//!         .build()?;
//!
//!     let wait = WaitOptions::default().ports([PortSpec::tcp(80)]);
//!     scoped(container, wait, async |container| -> anyhow::Result<()> {
//!         println!("nginx listening on {}:80", container.address()?);
//!         Ok(())
//!     })
//!     .await
//! }
//! ```

/// Container lifecycle, readiness and teardown.
///
/// Drives a container runtime through create, start, status polling and
/// removal, and probes published ports until they are reachable.
pub mod container;

/// Process-wide settings and their discovery.
pub mod config;

/// Shared names and default values.
pub mod env;

// Re-export main container types
pub use container::{
    Container, ContainerBuilder, ContainerError, ContainerStatus, Fixture, Image, PortBinding,
    PortSpec, Protocol, RunOptions, RuntimeClient, StaticImage, WaitOptions,
};

#[cfg(feature = "docker")]
pub use container::DockerClient;

// Re-export configuration types
pub use config::Settings;
