//! Guest configuration passed to `start`.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A host directory shared into the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    /// Host path to share.
    pub location: PathBuf,
    /// Whether the guest may write to it.
    #[serde(default)]
    pub writable: bool,
}

/// Configuration used to provision and boot a guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestConfig {
    /// vCPU count (default: 2).
    pub cpus: u32,
    /// Memory in GiB (default: 2).
    pub memory_gib: u32,
    /// Disk size in GiB (default: 60).
    pub disk_gib: u32,
    /// Guest architecture, `host` to match the host (default: `host`).
    pub arch: String,
    /// Container runtime provisioned in the guest (default: `docker`).
    pub runtime: String,
    /// Environment variables set inside the guest.
    pub env: BTreeMap<String, String>,
    /// Host directories shared into the guest.
    pub mounts: Vec<Mount>,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            cpus: 2,
            memory_gib: 2,
            disk_gib: 60,
            arch: "host".to_string(),
            runtime: "docker".to_string(),
            env: BTreeMap::new(),
            mounts: Vec::new(),
        }
    }
}

impl GuestConfig {
    /// Create a new config builder.
    pub fn builder() -> GuestConfigBuilder {
        GuestConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), EnvError> {
        if self.cpus == 0 {
            return Err(EnvError::Config("cpus must be > 0".into()));
        }
        if self.memory_gib == 0 {
            return Err(EnvError::Config("memory_gib must be > 0".into()));
        }
        if self.disk_gib == 0 {
            return Err(EnvError::Config("disk_gib must be > 0".into()));
        }
        if self.arch.is_empty() {
            return Err(EnvError::Config("arch is required".into()));
        }
        if self.runtime.is_empty() {
            return Err(EnvError::Config("runtime is required".into()));
        }
        if let Some(key) = self.env.keys().find(|k| !is_env_name(k)) {
            return Err(EnvError::Config(format!("invalid env name '{key}'")));
        }
        if self.mounts.iter().any(|m| m.location.as_os_str().is_empty()) {
            return Err(EnvError::Config("mount location is required".into()));
        }
        Ok(())
    }

    /// Settings that differ from `requested` and cannot change on a running guest.
    ///
    /// Returns one `field: running -> requested` line per difference.
    pub fn mismatches(&self, requested: &GuestConfig) -> Vec<String> {
        let mut diffs = Vec::new();
        let mut check = |field: &str, running: String, wanted: String| {
            if running != wanted {
                diffs.push(format!("{field}: {running} -> {wanted}"));
            }
        };
        check("cpus", self.cpus.to_string(), requested.cpus.to_string());
        check(
            "memory_gib",
            self.memory_gib.to_string(),
            requested.memory_gib.to_string(),
        );
        check(
            "disk_gib",
            self.disk_gib.to_string(),
            requested.disk_gib.to_string(),
        );
        check("arch", self.arch.clone(), requested.arch.clone());
        check("runtime", self.runtime.clone(), requested.runtime.clone());
        diffs
    }
}

/// Check that `name` is a portable shell variable name.
pub(crate) fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

/// Builder for GuestConfig.
#[derive(Debug, Default)]
pub struct GuestConfigBuilder {
    config: GuestConfig,
}

impl GuestConfigBuilder {
    /// Set the vCPU count.
    pub fn cpus(mut self, count: u32) -> Self {
        self.config.cpus = count;
        self
    }

    /// Set memory in GiB.
    pub fn memory_gib(mut self, gib: u32) -> Self {
        self.config.memory_gib = gib;
        self
    }

    /// Set disk size in GiB.
    pub fn disk_gib(mut self, gib: u32) -> Self {
        self.config.disk_gib = gib;
        self
    }

    /// Set the guest architecture.
    pub fn arch(mut self, arch: impl Into<String>) -> Self {
        self.config.arch = arch.into();
        self
    }

    /// Set the container runtime.
    pub fn runtime(mut self, runtime: impl Into<String>) -> Self {
        self.config.runtime = runtime.into();
        self
    }

    /// Add an environment variable for the guest.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.insert(key.into(), value.into());
        self
    }

    /// Share a host directory into the guest.
    pub fn mount(mut self, location: impl Into<PathBuf>, writable: bool) -> Self {
        self.config.mounts.push(Mount {
            location: location.into(),
            writable,
        });
        self
    }

    /// Build the configuration, validating all fields.
    pub fn build(self) -> Result<GuestConfig, EnvError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
