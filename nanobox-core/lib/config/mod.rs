//! Configuration types for the nanobox runtime.
//!
//! This module defines:
//! - [`BoxConfig`] - the caller-supplied description of a box to create
//! - Mount, port and network specifications consumed by the isolation layer
//! - [`RuntimeOptions`] - settings for the runtime itself (home directory)
//!
//! Configuration is validated before any resources are touched; a rejected
//! configuration never leaves a partial record behind.

use std::path::PathBuf;
use std::str::FromStr;

use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use nanobox_utils::{DEFAULT_CPUS, DEFAULT_MEMORY_MIB};

use crate::{NanoboxError, NanoboxResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Network attachment mode for a box.
///
/// Immutable after creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// No network access outside the box
    #[default]
    Isolated,

    /// Box shares a bridged network with the host
    Bridged,
}

/// Transport protocol of a port mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortProtocol {
    /// TCP (the default)
    #[default]
    Tcp,

    /// UDP
    Udp,
}

/// Host to guest filesystem mount specification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Path on the host to mount from
    pub host_path: String,

    /// Path inside the box to mount at
    pub guest_path: String,

    /// Whether the mount is read-only for the box
    #[serde(default)]
    pub read_only: bool,
}

/// Port mapping specification (host -> guest).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Host port to bind; `None` requests dynamic assignment
    pub host_port: Option<u16>,

    /// Port inside the box
    pub guest_port: u16,

    /// Transport protocol
    #[serde(default)]
    pub protocol: PortProtocol,
}

/// Caller-supplied description of a box to create.
///
/// The image reference is required; everything else has a sensible default.
/// `cpus` and `memory_mib` of `None` (or zero) select the runtime defaults.
///
/// ## Example
///
/// ```
/// use nanobox_core::config::BoxConfig;
///
/// let config = BoxConfig::builder()
///     .image("alpine:3.19")
///     .env(vec!["DEBUG=1".to_string()])
///     .auto_remove(true)
///     .build();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct BoxConfig {
    /// Image reference identifying the rootfs source (immutable after creation)
    #[builder(setter(into))]
    image: String,

    /// Optional human label; unique across the runtime when present
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    name: Option<String>,

    /// Working directory inside the box
    #[builder(default, setter(strip_option, into))]
    #[serde(default)]
    working_dir: Option<String>,

    /// Environment entries in `KEY=VALUE` form
    #[builder(default)]
    #[serde(default)]
    env: Vec<String>,

    /// Host to guest mounts
    #[builder(default)]
    #[serde(default)]
    volumes: Vec<VolumeMount>,

    /// Network attachment mode (immutable after creation)
    #[builder(default)]
    #[serde(default)]
    network: NetworkMode,

    /// Port mappings
    #[builder(default)]
    #[serde(default)]
    ports: Vec<PortMapping>,

    /// Number of virtual CPUs; `None` or `0` selects the runtime default
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    cpus: Option<u32>,

    /// Memory limit in MiB; `None` or `0` selects the runtime default
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    memory_mib: Option<u32>,

    /// Delete the box record automatically when it stops
    #[builder(default)]
    #[serde(default)]
    auto_remove: bool,
}

/// Configuration options for the runtime itself.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Root directory for runtime state (images, box state, logs)
    pub home_dir: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BoxConfig {
    /// Validate the configuration before any resources are provisioned.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidArgument` when the image reference is empty, an
    /// environment entry is not in `KEY=VALUE` form, or a mount is missing
    /// one of its paths.
    pub fn validate(&self) -> NanoboxResult<()> {
        if self.image.trim().is_empty() {
            return Err(NanoboxError::InvalidArgument(
                "image reference must not be empty".to_string(),
            ));
        }

        for entry in &self.env {
            let mut parts = entry.splitn(2, '=');
            let key = parts.next().unwrap_or_default();
            if key.is_empty() || parts.next().is_none() {
                return Err(NanoboxError::InvalidArgument(format!(
                    "environment entry '{}' is not in KEY=VALUE form",
                    entry
                )));
            }
        }

        for mount in &self.volumes {
            if mount.host_path.is_empty() || mount.guest_path.is_empty() {
                return Err(NanoboxError::InvalidArgument(
                    "volume mount requires both a host and a guest path".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Number of virtual CPUs the box will get once created.
    pub fn effective_cpus(&self) -> u32 {
        match self.cpus {
            Some(cpus) if cpus > 0 => cpus,
            _ => DEFAULT_CPUS,
        }
    }

    /// Memory limit in MiB the box will get once created.
    pub fn effective_memory_mib(&self) -> u32 {
        match self.memory_mib {
            Some(memory) if memory > 0 => memory,
            _ => DEFAULT_MEMORY_MIB,
        }
    }

    /// Environment entries split into `(key, value)` pairs.
    ///
    /// Entries that fail to split are skipped; `validate` rejects them
    /// before a box is created.
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.env
            .iter()
            .filter_map(|entry| {
                entry
                    .split_once('=')
                    .map(|(k, v)| (k.to_string(), v.to_string()))
            })
            .collect()
    }
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            home_dir: nanobox_utils::get_nanobox_home_path(),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkMode::Isolated => write!(f, "isolated"),
            NetworkMode::Bridged => write!(f, "bridged"),
        }
    }
}

impl FromStr for NetworkMode {
    type Err = NanoboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "isolated" => Ok(NetworkMode::Isolated),
            "bridged" => Ok(NetworkMode::Bridged),
            other => Err(NanoboxError::InvalidArgument(format!(
                "unknown network mode '{}'",
                other
            ))),
        }
    }
}

impl FromStr for VolumeMount {
    type Err = NanoboxError;

    /// Parse a `host:guest[:ro]` mount specification.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [host, guest] => Ok(VolumeMount {
                host_path: host.to_string(),
                guest_path: guest.to_string(),
                read_only: false,
            }),
            [host, guest, "ro"] => Ok(VolumeMount {
                host_path: host.to_string(),
                guest_path: guest.to_string(),
                read_only: true,
            }),
            _ => Err(NanoboxError::InvalidArgument(format!(
                "volume spec '{}' is not in host:guest[:ro] form",
                s
            ))),
        }
    }
}

impl FromStr for PortMapping {
    type Err = NanoboxError;

    /// Parse a `[host:]guest[/protocol]` port specification.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ports, protocol) = match s.split_once('/') {
            Some((ports, "tcp")) => (ports, PortProtocol::Tcp),
            Some((ports, "udp")) => (ports, PortProtocol::Udp),
            Some((_, other)) => {
                return Err(NanoboxError::InvalidArgument(format!(
                    "unknown port protocol '{}'",
                    other
                )));
            }
            None => (s, PortProtocol::Tcp),
        };

        let parse_port = |p: &str| {
            p.parse::<u16>().map_err(|_| {
                NanoboxError::InvalidArgument(format!("'{}' is not a valid port number", p))
            })
        };

        match ports.split_once(':') {
            Some((host, guest)) => Ok(PortMapping {
                host_port: Some(parse_port(host)?),
                guest_port: parse_port(guest)?,
                protocol,
            }),
            None => Ok(PortMapping {
                host_port: None,
                guest_port: parse_port(ports)?,
                protocol,
            }),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
