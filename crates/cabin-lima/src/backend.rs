//! `GuestBackend` implementation driving `limactl`.

use crate::instance::{parse_instances, LimaInstance};
use cabin_env::{EnvError, GuestBackend, GuestConfig, HostActions, Result};
use std::path::PathBuf;

/// Lima template used for new instances.
const TEMPLATE: &str = "template://default";

/// Hypervisor Lima should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VmType {
    /// QEMU, available everywhere
    #[default]
    Qemu,
    /// Apple Virtualization.framework
    Vz,
}

impl VmType {
    /// Parse from string (case-insensitive), defaulting to QEMU.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "vz" => Self::Vz,
            _ => Self::Qemu,
        }
    }

    /// Name understood by `limactl --vm-type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qemu => "qemu",
            Self::Vz => "vz",
        }
    }
}

/// Lima instance name for a profile: `cabin` or `cabin-<profile>`.
pub fn instance_name(profile: &str) -> String {
    match profile {
        "" | "default" | "cabin" => "cabin".to_string(),
        other => format!("cabin-{}", other.trim_start_matches("cabin-")),
    }
}

/// Guest backend that manages one Lima instance.
///
/// The configuration each start used is recorded on the host under
/// `<state_dir>/<profile>/config.json`, since Lima does not keep the
/// Cabin-level settings (such as the runtime) itself.
#[derive(Debug, Clone)]
pub struct LimaBackend<H> {
    host: H,
    profile: String,
    instance: String,
    state_dir: PathBuf,
    vm_type: VmType,
}

impl<H: HostActions> LimaBackend<H> {
    /// Create a backend for `profile`, recording state below `state_dir`.
    pub fn new(host: H, profile: &str, state_dir: impl Into<PathBuf>) -> Self {
        let profile = if profile.is_empty() { "default" } else { profile };
        Self {
            host,
            profile: profile.to_string(),
            instance: instance_name(profile),
            state_dir: state_dir.into(),
            vm_type: VmType::default(),
        }
    }

    /// Select the hypervisor for newly provisioned instances.
    pub fn with_vm_type(mut self, vm_type: VmType) -> Self {
        self.vm_type = vm_type;
        self
    }

    /// Profile this backend serves.
    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Where the last-used configuration is recorded.
    pub fn config_path(&self) -> PathBuf {
        self.state_dir.join(&self.profile).join("config.json")
    }

    /// Current Lima view of the instance, `None` if it does not exist.
    pub fn instance(&self) -> Result<Option<LimaInstance>> {
        let listing = self.host.run_output(&["limactl", "list", "--json"])?;
        Ok(parse_instances(&listing)?
            .into_iter()
            .find(|i| i.name == self.instance))
    }

    fn record_config(&self, config: &GuestConfig) -> Result<()> {
        let body = serde_json::to_string_pretty(config)?;
        self.host.write(&self.config_path(), &body)
    }

    fn limactl(&self, args: &[String]) -> Result<()> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::debug!(instance = %self.instance, command = ?args, "Invoking limactl");
        self.host.run(&args)
    }

    /// Arguments creating and booting a new instance.
    fn create_args(&self, config: &GuestConfig) -> Vec<String> {
        let mut args = vec![
            "limactl".to_string(),
            "start".to_string(),
            "--tty=false".to_string(),
            format!("--name={}", self.instance),
            format!("--cpus={}", config.cpus),
            format!("--memory={}", config.memory_gib),
            format!("--disk={}", config.disk_gib),
            format!("--vm-type={}", self.vm_type.as_str()),
        ];
        if config.arch != "host" {
            args.push(format!("--arch={}", config.arch));
        }
        for mount in &config.mounts {
            let suffix = if mount.writable { ":w" } else { "" };
            args.push(format!("--mount={}{}", mount.location.display(), suffix));
        }
        if !config.env.is_empty() {
            let exprs: Vec<String> = config
                .env
                .iter()
                .map(|(key, value)| {
                    // JSON string literals are valid yq string literals
                    let quoted = serde_json::Value::String(value.clone()).to_string();
                    format!(".env.{key} = {quoted}")
                })
                .collect();
            args.push(format!("--set={}", exprs.join(" | ")));
        }
        args.push(TEMPLATE.to_string());
        args
    }
}

impl<H: HostActions + Send + Sync> GuestBackend for LimaBackend<H> {
    fn name(&self) -> &str {
        &self.instance
    }

    fn created(&self) -> Result<bool> {
        Ok(self.instance()?.is_some())
    }

    fn running(&self) -> Result<bool> {
        Ok(self.instance()?.is_some_and(|i| i.is_running()))
    }

    fn provision(&self, config: &GuestConfig) -> Result<()> {
        tracing::info!(instance = %self.instance, vm_type = self.vm_type.as_str(), "Creating Lima instance");
        self.limactl(&self.create_args(config))?;
        self.record_config(config)
    }

    fn boot(&self, config: &GuestConfig) -> Result<()> {
        let previous = self.last_config()?;
        let resized = previous
            .as_ref()
            .is_some_and(|p| p.cpus != config.cpus || p.memory_gib != config.memory_gib);
        if resized {
            tracing::info!(
                instance = %self.instance,
                cpus = config.cpus,
                memory_gib = config.memory_gib,
                "Resizing Lima instance"
            );
            self.limactl(&[
                "limactl".to_string(),
                "edit".to_string(),
                "--tty=false".to_string(),
                format!("--cpus={}", config.cpus),
                format!("--memory={}", config.memory_gib),
                self.instance.clone(),
            ])?;
        }

        self.limactl(&[
            "limactl".to_string(),
            "start".to_string(),
            "--tty=false".to_string(),
            self.instance.clone(),
        ])?;

        // disk, arch and runtime are fixed at creation
        let applied = match previous {
            Some(previous) => GuestConfig {
                cpus: config.cpus,
                memory_gib: config.memory_gib,
                env: config.env.clone(),
                mounts: config.mounts.clone(),
                ..previous
            },
            None => config.clone(),
        };
        self.record_config(&applied)
    }

    fn shutdown(&self) -> Result<()> {
        self.limactl(&[
            "limactl".to_string(),
            "stop".to_string(),
            self.instance.clone(),
        ])
        .map_err(|e| EnvError::Shutdown(e.to_string()))
    }

    fn last_config(&self) -> Result<Option<GuestConfig>> {
        match self.host.read(&self.config_path()) {
            Ok(body) => Ok(Some(serde_json::from_str(&body)?)),
            Err(EnvError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn shell_command(&self, args: &[&str]) -> Vec<String> {
        let mut cmd = vec![
            "limactl".to_string(),
            "shell".to_string(),
            "--workdir=/".to_string(),
            self.instance.clone(),
            "--".to_string(),
        ];
        cmd.extend(args.iter().map(|a| a.to_string()));
        cmd
    }

    fn dependencies(&self) -> Vec<String> {
        let mut deps = vec!["lima".to_string()];
        if self.vm_type == VmType::Qemu {
            deps.push("qemu".to_string());
        }
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabin_env::{EnvContext, FileActions, Host, RunActions};
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    /// Host double answering `limactl` invocations from a script while
    /// delegating file I/O to the real filesystem.
    #[derive(Clone, Default)]
    struct ScriptedHost {
        calls: Arc<Mutex<Vec<String>>>,
        listings: Arc<Mutex<VecDeque<String>>>,
        files: Host,
    }

    impl ScriptedHost {
        fn listing(&self, output: &str) {
            self.listings.lock().unwrap().push_back(output.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RunActions for ScriptedHost {
        fn run(&self, args: &[&str]) -> Result<()> {
            self.run_output(args).map(|_| ())
        }

        fn run_output(&self, args: &[&str]) -> Result<String> {
            let line = args.join(" ");
            self.calls.lock().unwrap().push(line.clone());
            if line == "limactl list --json" {
                return Ok(self.listings.lock().unwrap().pop_front().unwrap_or_default());
            }
            Ok(String::new())
        }

        fn run_interactive(&self, args: &[&str]) -> Result<()> {
            self.run(args)
        }
    }

    impl FileActions for ScriptedHost {
        fn read(&self, path: &Path) -> Result<String> {
            self.files.read(path)
        }

        fn write(&self, path: &Path, body: &str) -> Result<()> {
            self.files.write(path, body)
        }
    }

    impl HostActions for ScriptedHost {
        fn with_env(&self, overrides: EnvContext) -> Self {
            Self {
                files: self.files.with_env(overrides),
                ..self.clone()
            }
        }

        fn env(&self, name: &str) -> String {
            self.files.env(name)
        }
    }

    const RUNNING: &str = r#"{"name":"cabin","status":"Running","cpus":2}"#;
    const STOPPED: &str = r#"{"name":"cabin","status":"Stopped","cpus":2}"#;

    #[test]
    fn test_instance_name() {
        assert_eq!(instance_name("default"), "cabin");
        assert_eq!(instance_name(""), "cabin");
        assert_eq!(instance_name("work"), "cabin-work");
        assert_eq!(instance_name("cabin-work"), "cabin-work");
    }

    #[test]
    fn test_vm_type_parsing() {
        assert_eq!(VmType::parse("vz"), VmType::Vz);
        assert_eq!(VmType::parse("VZ"), VmType::Vz);
        assert_eq!(VmType::parse("qemu"), VmType::Qemu);
        assert_eq!(VmType::parse("anything"), VmType::Qemu);
    }

    #[test]
    fn test_probes_match_by_name() {
        let dir = tempdir().unwrap();
        let host = ScriptedHost::default();
        let backend = LimaBackend::new(host.clone(), "default", dir.path());

        host.listing(r#"{"name":"cabin-other","status":"Running"}"#);
        assert!(!backend.created().unwrap());

        host.listing(STOPPED);
        assert!(backend.created().unwrap());
        host.listing(STOPPED);
        assert!(!backend.running().unwrap());

        host.listing(RUNNING);
        assert!(backend.running().unwrap());
    }

    #[test]
    fn test_provision_args_and_recorded_config() {
        let dir = tempdir().unwrap();
        let host = ScriptedHost::default();
        let backend =
            LimaBackend::new(host.clone(), "work", dir.path()).with_vm_type(VmType::Vz);
        let config = GuestConfig::builder()
            .cpus(4)
            .memory_gib(8)
            .arch("aarch64")
            .env("GREETING", "hello \"world\"")
            .mount("/Users/me", true)
            .build()
            .unwrap();

        backend.provision(&config).unwrap();

        let calls = host.calls();
        assert_eq!(calls.len(), 1);
        let cmd = &calls[0];
        assert!(cmd.starts_with("limactl start --tty=false --name=cabin-work --cpus=4 --memory=8"));
        assert!(cmd.contains("--vm-type=vz"));
        assert!(cmd.contains("--arch=aarch64"));
        assert!(cmd.contains("--mount=/Users/me:w"));
        assert!(cmd.contains(r#"--set=.env.GREETING = "hello \"world\"""#));
        assert!(cmd.ends_with(TEMPLATE));

        assert_eq!(backend.last_config().unwrap(), Some(config));
        assert!(backend.config_path().ends_with("work/config.json"));
    }

    #[test]
    fn test_boot_resizes_when_cpus_change() {
        let dir = tempdir().unwrap();
        let host = ScriptedHost::default();
        let backend = LimaBackend::new(host.clone(), "default", dir.path());
        backend.provision(&GuestConfig::default()).unwrap();

        let bigger = GuestConfig::builder().cpus(6).disk_gib(10).build().unwrap();
        backend.boot(&bigger).unwrap();

        let calls = host.calls();
        assert_eq!(calls[1], "limactl edit --tty=false --cpus=6 --memory=2 cabin");
        assert_eq!(calls[2], "limactl start --tty=false cabin");

        // disk stays at its creation size
        let recorded = backend.last_config().unwrap().unwrap();
        assert_eq!(recorded.cpus, 6);
        assert_eq!(recorded.disk_gib, GuestConfig::default().disk_gib);
    }

    #[test]
    fn test_boot_without_changes_skips_edit() {
        let dir = tempdir().unwrap();
        let host = ScriptedHost::default();
        let backend = LimaBackend::new(host.clone(), "default", dir.path());
        backend.provision(&GuestConfig::default()).unwrap();
        backend.boot(&GuestConfig::default()).unwrap();

        assert_eq!(
            host.calls(),
            vec![
                backend.create_args(&GuestConfig::default()).join(" "),
                "limactl start --tty=false cabin".to_string(),
            ]
        );
    }

    #[test]
    fn test_last_config_missing() {
        let dir = tempdir().unwrap();
        let backend = LimaBackend::new(ScriptedHost::default(), "default", dir.path());
        assert_eq!(backend.last_config().unwrap(), None);
    }

    #[test]
    fn test_shell_command_and_dependencies() {
        let dir = tempdir().unwrap();
        let backend = LimaBackend::new(ScriptedHost::default(), "default", dir.path());

        assert_eq!(
            backend.shell_command(&["uname", "-a"]),
            vec!["limactl", "shell", "--workdir=/", "cabin", "--", "uname", "-a"]
        );
        assert_eq!(backend.dependencies(), vec!["lima", "qemu"]);

        let vz = backend.with_vm_type(VmType::Vz);
        assert_eq!(vz.dependencies(), vec!["lima"]);
    }
}
