//! Runtime creation options and command overrides.
//!
//! Options are layered functionally: [`RunOptions::defaults`] is merged with
//! configuration-file options and then with caller options, with the later
//! layer winning for every key it sets. No layer is ever mutated in place.

use crate::container::{ContainerError, PortSpec, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Creation options passed to the runtime.
///
/// Every field is optional; `None` means "no opinion" so the layer below (or
/// the daemon's own default) applies. `RunOptions::default()` is the empty
/// layer, while [`RunOptions::defaults`] is the baseline every container
/// starts from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Extra kernel capabilities (e.g. `NET_ADMIN`)
    pub cap_add: Option<Vec<String>>,
    /// Memory ceiling, Docker style (`"512m"`, `"1g"`, plain bytes)
    pub mem_limit: Option<String>,
    /// Run the container privileged
    pub privileged: Option<bool>,
    /// Start detached from the caller. Containers are always started
    /// detached; [`RunOptions::validate`] rejects `Some(false)`.
    pub detach: Option<bool>,
    /// Publish every exposed port on a random host port
    pub publish_all_ports: Option<bool>,
    /// Explicit port bindings: `"<port>/<proto>"` to a host port binding
    pub ports: Option<BTreeMap<String, PortBinding>>,
}

impl RunOptions {
    /// Baseline options applied to every container.
    pub fn defaults() -> Self {
        Self {
            detach: Some(true),
            publish_all_ports: Some(true),
            ..Self::default()
        }
    }

    /// Overlay `overrides` on top of `self`; keys set in `overrides` win.
    pub fn merge(&self, overrides: &RunOptions) -> RunOptions {
        RunOptions {
            cap_add: overrides.cap_add.clone().or_else(|| self.cap_add.clone()),
            mem_limit: overrides
                .mem_limit
                .clone()
                .or_else(|| self.mem_limit.clone()),
            privileged: overrides.privileged.or(self.privileged),
            detach: overrides.detach.or(self.detach),
            publish_all_ports: overrides.publish_all_ports.or(self.publish_all_ports),
            ports: overrides.ports.clone().or_else(|| self.ports.clone()),
        }
    }

    /// Add a kernel capability.
    pub fn cap_add<S: Into<String>>(mut self, capability: S) -> Self {
        self.cap_add
            .get_or_insert_with(Vec::new)
            .push(capability.into());
        self
    }

    /// Set the memory ceiling.
    pub fn mem_limit<S: Into<String>>(mut self, limit: S) -> Self {
        self.mem_limit = Some(limit.into());
        self
    }

    /// Run privileged.
    pub fn privileged(mut self, enable: bool) -> Self {
        self.privileged = Some(enable);
        self
    }

    /// Run detached.
    pub fn detach(mut self, enable: bool) -> Self {
        self.detach = Some(enable);
        self
    }

    /// Publish all exposed ports.
    pub fn publish_all_ports(mut self, enable: bool) -> Self {
        self.publish_all_ports = Some(enable);
        self
    }

    /// Bind a container port (`"8080/tcp"`) to a host port, or to any free
    /// host port when `host_port` is `None`.
    pub fn port<S: Into<String>>(mut self, container_port: S, host_port: Option<u16>) -> Self {
        self.ports
            .get_or_insert_with(BTreeMap::new)
            .insert(container_port.into(), PortBinding::from(host_port));
        self
    }

    /// Parsed keys of [`RunOptions::ports`].
    ///
    /// # Errors
    ///
    /// Returns the parse error of the first malformed port token.
    pub fn port_specs(&self) -> Result<Vec<PortSpec>> {
        self.ports
            .iter()
            .flat_map(|ports| ports.keys())
            .map(|token| PortSpec::parse(token))
            .collect()
    }

    /// Check port tokens, the memory limit and the detach mode.
    ///
    /// # Errors
    ///
    /// Returns the parse error of a malformed port token or memory limit, or
    /// [`ContainerError::ConfigError`] when `detach` is `false`.
    pub fn validate(&self) -> Result<()> {
        self.port_specs()?;
        self.memory_bytes()?;
        if self.detach == Some(false) {
            return Err(ContainerError::ConfigError(
                "Attached containers are not supported; detach must be true".to_string(),
            ));
        }
        Ok(())
    }

    /// Memory ceiling in bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ConfigError`] when `mem_limit` cannot be parsed.
    pub fn memory_bytes(&self) -> Result<Option<i64>> {
        self.mem_limit.as_deref().map(parse_memory).transpose()
    }
}

/// Host side of a port binding.
///
/// Written in TOML as a port number, or as `"any"` (or `0`) to let the
/// runtime pick a free host port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BindingRepr", into = "BindingRepr")]
pub enum PortBinding {
    /// Runtime-assigned host port
    Any,
    /// Fixed host port
    Host(u16),
}

impl PortBinding {
    /// Fixed host port, if any.
    pub fn host_port(&self) -> Option<u16> {
        match self {
            PortBinding::Any => None,
            PortBinding::Host(port) => Some(*port),
        }
    }
}

impl From<Option<u16>> for PortBinding {
    fn from(host_port: Option<u16>) -> Self {
        match host_port {
            None | Some(0) => PortBinding::Any,
            Some(port) => PortBinding::Host(port),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BindingRepr {
    Port(u16),
    Keyword(String),
}

impl TryFrom<BindingRepr> for PortBinding {
    type Error = String;

    fn try_from(repr: BindingRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            BindingRepr::Port(port) => Ok(PortBinding::from(Some(port))),
            BindingRepr::Keyword(word) if word.eq_ignore_ascii_case("any") => Ok(PortBinding::Any),
            BindingRepr::Keyword(word) => Err(format!(
                "invalid host port binding '{}', expected a port number or \"any\"",
                word
            )),
        }
    }
}

impl From<PortBinding> for BindingRepr {
    fn from(binding: PortBinding) -> Self {
        match binding {
            PortBinding::Any => BindingRepr::Keyword("any".to_string()),
            PortBinding::Host(port) => BindingRepr::Port(port),
        }
    }
}

/// Parse a Docker-style memory size (`"1024"`, `"512k"`, `"256mb"`, `"2g"`).
fn parse_memory(limit: &str) -> Result<i64> {
    let invalid = || ContainerError::ConfigError(format!("Invalid memory limit: {}", limit));

    let normalized = limit.trim().to_ascii_lowercase();
    let normalized = normalized.strip_suffix('b').unwrap_or(&normalized).to_string();

    let (digits, multiplier) = match normalized.chars().last() {
        Some('k') => (&normalized[..normalized.len() - 1], 1i64 << 10),
        Some('m') => (&normalized[..normalized.len() - 1], 1i64 << 20),
        Some('g') => (&normalized[..normalized.len() - 1], 1i64 << 30),
        Some('t') => (&normalized[..normalized.len() - 1], 1i64 << 40),
        Some(c) if c.is_ascii_digit() => (normalized.as_str(), 1),
        _ => return Err(invalid()),
    };

    let value: i64 = digits.trim().parse().map_err(|_| invalid())?;
    value.checked_mul(multiplier).ok_or_else(invalid)
}

/// Process override for a container: a single string or an argument vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// Whitespace-separated command line; no shell quoting is interpreted
    Shell(String),
    /// Explicit argument vector
    Exec(Vec<String>),
}

impl Command {
    /// Argument vector handed to the runtime.
    pub fn to_argv(&self) -> Vec<String> {
        match self {
            Command::Shell(line) => line.split_whitespace().map(String::from).collect(),
            Command::Exec(argv) => argv.clone(),
        }
    }
}

impl From<&str> for Command {
    fn from(line: &str) -> Self {
        Command::Shell(line.to_string())
    }
}

impl From<String> for Command {
    fn from(line: String) -> Self {
        Command::Shell(line)
    }
}

impl From<Vec<String>> for Command {
    fn from(argv: Vec<String>) -> Self {
        Command::Exec(argv)
    }
}

impl From<Vec<&str>> for Command {
    fn from(argv: Vec<&str>) -> Self {
        Command::Exec(argv.into_iter().map(String::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_publish_and_detach() {
        let options = RunOptions::defaults();
        assert_eq!(options.detach, Some(true));
        assert_eq!(options.publish_all_ports, Some(true));
        assert!(options.cap_add.is_none());
        assert!(options.ports.is_none());
    }

    #[test]
    fn test_merge_caller_wins_on_collision() {
        let defaults = RunOptions::defaults().mem_limit("1g");
        let caller = RunOptions::default()
            .mem_limit("256m")
            .publish_all_ports(false)
            .cap_add("NET_ADMIN");

        let merged = defaults.merge(&caller);
        assert_eq!(merged.mem_limit.as_deref(), Some("256m"));
        assert_eq!(merged.publish_all_ports, Some(false));
        assert_eq!(merged.detach, Some(true));
        assert_eq!(merged.cap_add, Some(vec!["NET_ADMIN".to_string()]));

        // Inputs are untouched
        assert_eq!(defaults.mem_limit.as_deref(), Some("1g"));
        assert!(caller.detach.is_none());
    }

    #[test]
    fn test_port_specs() {
        let options = RunOptions::default()
            .port("8080/tcp", Some(18080))
            .port("53/udp", None);
        let mut specs = options.port_specs().unwrap();
        specs.sort();
        assert_eq!(specs, vec![PortSpec::udp(53), PortSpec::tcp(8080)]);

        let bad = RunOptions::default().port("8080/sctp", None);
        assert!(matches!(
            bad.port_specs(),
            Err(ContainerError::UnsupportedProtocol { .. })
        ));
    }

    #[test]
    fn test_port_binding_from_host_port() {
        let options = RunOptions::default()
            .port("80/tcp", None)
            .port("81/tcp", Some(0))
            .port("82/tcp", Some(8082));
        let ports = options.ports.unwrap();
        assert_eq!(ports["80/tcp"], PortBinding::Any);
        assert_eq!(ports["81/tcp"], PortBinding::Any);
        assert_eq!(ports["82/tcp"], PortBinding::Host(8082));
        assert_eq!(ports["82/tcp"].host_port(), Some(8082));
        assert_eq!(ports["80/tcp"].host_port(), None);
    }

    #[test]
    fn test_port_binding_json_forms() {
        let parsed: BTreeMap<String, PortBinding> =
            serde_json::from_str(r#"{"80/tcp": "any", "81/tcp": "ANY", "82/tcp": 0, "83/tcp": 8083}"#)
                .unwrap();
        assert_eq!(parsed["80/tcp"], PortBinding::Any);
        assert_eq!(parsed["81/tcp"], PortBinding::Any);
        assert_eq!(parsed["82/tcp"], PortBinding::Any);
        assert_eq!(parsed["83/tcp"], PortBinding::Host(8083));

        assert_eq!(serde_json::to_string(&PortBinding::Any).unwrap(), r#""any""#);
        assert_eq!(serde_json::to_string(&PortBinding::Host(80)).unwrap(), "80");
        assert!(serde_json::from_str::<PortBinding>(r#""random""#).is_err());
    }

    #[test]
    fn test_validate_rejects_attached_mode() {
        assert!(RunOptions::defaults().validate().is_ok());
        assert!(matches!(
            RunOptions::defaults().detach(false).validate(),
            Err(ContainerError::ConfigError(_))
        ));
    }

    #[test]
    fn test_memory_parsing() {
        let bytes = |s: &str| RunOptions::default().mem_limit(s).memory_bytes().unwrap();
        assert_eq!(bytes("1024"), Some(1024));
        assert_eq!(bytes("512k"), Some(512 * 1024));
        assert_eq!(bytes("256m"), Some(256 * 1024 * 1024));
        assert_eq!(bytes("256MB"), Some(256 * 1024 * 1024));
        assert_eq!(bytes("2g"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(RunOptions::default().memory_bytes().unwrap(), None);
        assert!(matches!(
            RunOptions::default().mem_limit("lots").memory_bytes(),
            Err(ContainerError::ConfigError(_))
        ));
    }

    #[test]
    fn test_command_argv() {
        assert_eq!(
            Command::from("redis-server --port  6380").to_argv(),
            vec!["redis-server", "--port", "6380"]
        );
        assert_eq!(
            Command::from(vec!["sh", "-c", "echo hi"]).to_argv(),
            vec!["sh", "-c", "echo hi"]
        );
    }
}
