//! Port readiness probing.
//!
//! A running container is not necessarily serving. [`Container::wait`] probes
//! each target port from the host until every one accepts a connection or the
//! deadline passes.

use crate::container::{Container, ContainerError, PortSpec, Protocol, Result};
use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::Instant;
use tracing::{debug, info};

/// Upper bound for a single connection attempt.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Lower bound for a single connection attempt near the deadline.
const MIN_PROBE_TIMEOUT: Duration = Duration::from_millis(10);

/// Parameters for [`Container::wait`]; unset fields fall back to the
/// container's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaitOptions {
    /// Ports to confirm instead of the container's resolved ports
    pub ports: Option<Vec<PortSpec>>,
    /// Overall deadline, measured from the start of the wait
    pub max_wait: Option<Duration>,
    /// Delay between probe rounds
    pub poll_interval: Option<Duration>,
}

impl WaitOptions {
    /// Wait for exactly `ports`.
    pub fn ports<I: IntoIterator<Item = PortSpec>>(mut self, ports: I) -> Self {
        self.ports = Some(ports.into_iter().collect());
        self
    }

    /// Override the deadline.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    /// Override the delay between rounds.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }
}

impl Container {
    /// Block until every target port accepts connections.
    ///
    /// Returns `Ok(true)` once the working set is empty, immediately when
    /// there is nothing to wait for.
    ///
    /// # Errors
    ///
    /// - [`ContainerError::NotStarted`] before `run()`
    /// - [`ContainerError::Timeout`] naming the ports still unreachable
    pub async fn wait(&self, options: WaitOptions) -> Result<bool> {
        let targets = match options.ports {
            Some(ports) => ports,
            None => self.ports()?,
        };
        if targets.is_empty() {
            debug!("Container {} has no ports to wait for", self.name());
            return Ok(true);
        }

        let address = self.address()?;
        let max_wait = options.max_wait.unwrap_or_else(|| self.image().max_wait());
        let poll_interval = options
            .poll_interval
            .unwrap_or_else(|| self.readiness_poll_interval());

        let started = Instant::now();
        let deadline = started + max_wait;
        let mut pending: BTreeSet<PortSpec> = targets.into_iter().collect();

        loop {
            let round: Vec<PortSpec> = pending.iter().copied().collect();
            for port in round {
                let remaining = deadline.saturating_duration_since(Instant::now());
                let bound = remaining.clamp(MIN_PROBE_TIMEOUT, PROBE_TIMEOUT);

                if probe(address, port, bound).await {
                    debug!("Port {} on {} is accepting connections", port, address);
                    pending.remove(&port);
                }
            }

            if pending.is_empty() {
                info!(
                    "Container {} ready after {:.1?}",
                    self.name(),
                    started.elapsed()
                );
                return Ok(true);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(poll_interval.min(remaining)).await;
        }

        let ports = pending
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(ContainerError::Timeout {
            waiting_for: format!("ports [{}] on {}", ports, address),
            elapsed: started.elapsed(),
        })
    }
}

/// One bounded connection attempt.
async fn probe(address: IpAddr, port: PortSpec, bound: Duration) -> bool {
    let target = SocketAddr::new(address, port.port);
    match port.protocol {
        Protocol::Tcp => matches!(
            tokio::time::timeout(bound, TcpStream::connect(target)).await,
            Ok(Ok(_))
        ),
        Protocol::Udp => {
            let local: IpAddr = match address {
                IpAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
                IpAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
            };
            let attempt = async {
                let socket = UdpSocket::bind(SocketAddr::new(local, 0)).await?;
                socket.connect(target).await
            };
            matches!(tokio::time::timeout(bound, attempt).await, Ok(Ok(())))
        }
    }
}
