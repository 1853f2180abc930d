//! Port token parsing.
//!
//! Runtimes describe ports as `"<port>/<proto>"` strings (`"8080/tcp"`,
//! `"53/udp"`); the protocol suffix is optional and defaults to TCP.

use crate::container::{ContainerError, Result};
use std::fmt;
use std::str::FromStr;

/// Protocols accepted in a port token.
pub const SUPPORTED_PROTOCOLS: &[&str] = &["tcp", "udp"];

/// Transport protocol of an exposed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    /// Stream socket
    Tcp,
    /// Datagram socket
    Udp,
}

impl Protocol {
    /// Lowercase protocol name as used in port tokens.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ContainerError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            _ => Err(ContainerError::UnsupportedProtocol {
                value: value.to_string(),
                allowed: SUPPORTED_PROTOCOLS.join(", "),
            }),
        }
    }
}

/// A container-side port and its protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortSpec {
    /// Port number
    pub port: u16,
    /// Transport protocol
    pub protocol: Protocol,
}

impl PortSpec {
    /// TCP port.
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }

    /// UDP port.
    pub fn udp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Udp,
        }
    }

    /// Parse a `"<port>"` or `"<port>/<proto>"` token.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::UnsupportedProtocol`] for a protocol other than
    /// tcp/udp and [`ContainerError::InvalidPort`] when the port is not a valid
    /// 16-bit number.
    pub fn parse(token: &str) -> Result<Self> {
        let (port, protocol) = match token.split_once('/') {
            Some((port, proto)) => (port, proto.parse()?),
            None => (token, Protocol::Tcp),
        };

        let port = port
            .trim()
            .parse::<u16>()
            .map_err(|_| ContainerError::InvalidPort(token.to_string()))?;

        Ok(Self { port, protocol })
    }
}

impl FromStr for PortSpec {
    type Err = ContainerError;

    fn from_str(token: &str) -> Result<Self> {
        Self::parse(token)
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_port_defaults_to_tcp() {
        assert_eq!(PortSpec::parse("8080").unwrap(), PortSpec::tcp(8080));
    }

    #[test]
    fn test_explicit_protocols() {
        assert_eq!(PortSpec::parse("8080/tcp").unwrap(), PortSpec::tcp(8080));
        assert_eq!(PortSpec::parse("53/udp").unwrap(), PortSpec::udp(53));
        assert_eq!(PortSpec::parse("53/UDP").unwrap(), PortSpec::udp(53));
    }

    #[test]
    fn test_unsupported_protocol() {
        let err = PortSpec::parse("132/sctp").unwrap_err();
        match &err {
            ContainerError::UnsupportedProtocol { value, allowed } => {
                assert_eq!(value, "sctp");
                assert_eq!(allowed, "tcp, udp");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let message = err.to_string();
        assert!(message.contains("sctp"));
        assert!(message.contains("tcp, udp"));
    }

    #[test]
    fn test_invalid_port_number() {
        assert!(matches!(
            PortSpec::parse("http/tcp"),
            Err(ContainerError::InvalidPort(_))
        ));
        assert!(matches!(
            PortSpec::parse("70000"),
            Err(ContainerError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_display_round_trips_token() {
        let spec: PortSpec = "5432".parse().unwrap();
        assert_eq!(spec.to_string(), "5432/tcp");
    }
}
