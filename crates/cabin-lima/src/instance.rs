//! Parsing of `limactl list --json` output.

use cabin_env::{EnvError, Result};
use serde::Deserialize;

/// One Lima instance as reported by `limactl list --json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LimaInstance {
    /// Instance name.
    pub name: String,
    /// `Running`, `Stopped` or `Broken`.
    pub status: String,
    /// Guest architecture.
    #[serde(default)]
    pub arch: String,
    /// vCPU count.
    #[serde(default)]
    pub cpus: u32,
    /// Memory in bytes.
    #[serde(default)]
    pub memory: u64,
    /// Disk size in bytes.
    #[serde(default)]
    pub disk: u64,
}

impl LimaInstance {
    /// Check whether Lima reports the instance as running.
    pub fn is_running(&self) -> bool {
        self.status == "Running"
    }
}

/// Parse the listing, which is one JSON object per line.
///
/// Some Lima releases print a single JSON array instead; both are accepted.
pub(crate) fn parse_instances(output: &str) -> Result<Vec<LimaInstance>> {
    let trimmed = output.trim();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str::<LimaInstance>(line).map_err(EnvError::from))
        .collect()
}
