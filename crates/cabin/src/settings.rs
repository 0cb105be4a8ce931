//! Settings for the cabin CLI.
//!
//! Settings are read from environment variables with sensible defaults.

use cabin_env::{EnvError, GuestConfig, HostActions};
use cabin_lima::VmType;
use std::path::PathBuf;

/// Settings resolved for one CLI invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Profile name, one guest per profile (default: `default`).
    pub profile: String,

    /// Host directory for recorded guest state (default: `$HOME/.cabin`).
    pub state_dir: PathBuf,

    /// Hypervisor for new guests (default: qemu).
    pub vm_type: VmType,

    /// Configuration passed to `start`.
    pub guest: GuestConfig,
}

/// Settings validation error.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// `CABIN_PROFILE` resolved to a blank name
    #[error("profile name must not be empty")]
    EmptyProfile,

    /// Guest settings rejected by [`GuestConfig::validate`]
    #[error("invalid guest configuration: {0}")]
    Guest(#[from] EnvError),
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profile: "default".to_string(),
            state_dir: PathBuf::from(".cabin"),
            vm_type: VmType::default(),
            guest: GuestConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from the environment seen by `host`.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `CABIN_PROFILE` | `default` |
    /// | `CABIN_STATE_DIR` | `$HOME/.cabin` |
    /// | `CABIN_VM_TYPE` | `qemu` (qemu, vz) |
    /// | `CABIN_CPUS` | `2` |
    /// | `CABIN_MEMORY` | `2` (GiB) |
    /// | `CABIN_DISK` | `60` (GiB) |
    /// | `CABIN_ARCH` | `host` |
    /// | `CABIN_RUNTIME` | `docker` |
    pub fn from_host(host: &impl HostActions) -> Self {
        let default = Self::default();
        let var = |name: &str| Some(host.env(name)).filter(|v| !v.is_empty());
        let number = |name: &str, fallback: u32| {
            var(name)
                .and_then(|v| v.parse().ok())
                .unwrap_or(fallback)
        };

        let state_dir = var("CABIN_STATE_DIR")
            .map(PathBuf::from)
            .or_else(|| var("HOME").map(|home| PathBuf::from(home).join(".cabin")))
            .unwrap_or(default.state_dir);

        let guest = GuestConfig {
            cpus: number("CABIN_CPUS", default.guest.cpus),
            memory_gib: number("CABIN_MEMORY", default.guest.memory_gib),
            disk_gib: number("CABIN_DISK", default.guest.disk_gib),
            arch: var("CABIN_ARCH").unwrap_or(default.guest.arch),
            runtime: var("CABIN_RUNTIME").unwrap_or(default.guest.runtime),
            ..default.guest
        };

        Self {
            profile: var("CABIN_PROFILE").unwrap_or(default.profile),
            state_dir,
            vm_type: var("CABIN_VM_TYPE")
                .map(|v| VmType::parse(&v))
                .unwrap_or(default.vm_type),
            guest,
        }
    }

    /// Validate the resolved settings.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.profile.trim().is_empty() {
            return Err(SettingsError::EmptyProfile);
        }
        self.guest.validate()?;
        Ok(())
    }
}
