//! Actions performed inside the guest VM.

use crate::backend::GuestBackend;
use crate::config::{is_env_name, GuestConfig};
use crate::deps::Dependencies;
use crate::error::{EnvError, Result};
use crate::host::{HostActions, RunActions};
use crate::lifecycle::LifecycleState;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Guest path holding the persisted configuration entries.
pub const DEFAULT_CONFIG_FILE: &str = "/etc/cabin/cabin.json";

/// Exit status of the store write script when the store changed since it was read.
const STORE_CONFLICT: i32 = 75;

/// Read-modify-write attempts before `set` gives up on a contended store.
const STORE_ATTEMPTS: usize = 5;

/// Actions performed on the guest.
pub trait GuestActions: RunActions {
    /// Bring the guest to `Running`, provisioning it if needed.
    fn start(&self, config: &GuestConfig) -> Result<()>;

    /// Gracefully shut the guest down.
    fn stop(&self) -> Result<()>;

    /// Stop and start again with the last-known configuration.
    fn restart(&self) -> Result<()>;

    /// Whether the guest has been created.
    fn created(&self) -> bool;

    /// Whether the guest is currently running.
    fn running(&self) -> bool;

    /// Lifecycle state derived from the two probes.
    fn state(&self) -> LifecycleState {
        LifecycleState::from_probes(self.created(), self.running())
    }

    /// Environment variable as seen inside the guest.
    fn env(&self, name: &str) -> Result<String>;

    /// Configuration entry stored in the guest, empty if absent.
    fn get(&self, key: &str) -> String;

    /// Store a configuration entry in the guest.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Guest action set that reaches the guest through a host and a backend.
///
/// Commands are wrapped with the backend's shell prefix and executed by the
/// host. Nothing about the guest is cached: every operation re-probes the
/// backend, so changes made by other processes are always observed.
pub struct Guest<H, B> {
    host: H,
    backend: B,
    config_file: String,
    elevated: bool,
}

impl<H: HostActions, B: GuestBackend> Guest<H, B> {
    /// Create a guest action set persisting config entries to
    /// [`DEFAULT_CONFIG_FILE`] with `sudo`.
    pub fn new(host: H, backend: B) -> Self {
        Self {
            host,
            backend,
            config_file: DEFAULT_CONFIG_FILE.to_string(),
            elevated: true,
        }
    }

    /// Persist config entries to `path` in the guest, optionally via `sudo`.
    pub fn with_config_file(mut self, path: impl Into<String>, elevated: bool) -> Self {
        self.config_file = path.into();
        self.elevated = elevated;
        self
    }

    /// The backend driving this guest.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The host used to reach the guest.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Guest path of the config entry store.
    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    fn ensure_running(&self) -> Result<()> {
        if !self.running() {
            return Err(EnvError::NotRunning);
        }
        Ok(())
    }

    /// Run `f` against the host with `args` wrapped for the guest.
    fn in_guest<T>(&self, args: &[&str], f: impl FnOnce(&H, &[&str]) -> Result<T>) -> Result<T> {
        self.ensure_running()?;
        let wrapped = self.backend.shell_command(args);
        let wrapped: Vec<&str> = wrapped.iter().map(String::as_str).collect();
        f(&self.host, &wrapped[..])
    }

    /// Lifecycle state from the backend probes, failing instead of guessing.
    fn probed_state(&self, map_err: fn(EnvError) -> EnvError) -> Result<LifecycleState> {
        let created = self.backend.created().map_err(map_err)?;
        let running = self.backend.running().map_err(map_err)?;
        Ok(LifecycleState::from_probes(created, running))
    }

    fn confirm_running(&self, started: Instant) -> Result<()> {
        if !self.backend.running().map_err(provision_error)? {
            return Err(EnvError::Provision(format!(
                "guest '{}' did not reach running state",
                self.backend.name()
            )));
        }
        info!(
            guest = %self.backend.name(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Guest running"
        );
        Ok(())
    }

    /// Raw store contents, empty when the store has not been written yet.
    fn read_raw_store(&self) -> Result<String> {
        match self.run_output(&["cat", self.config_file.as_str()]) {
            Ok(raw) => Ok(raw),
            Err(EnvError::Execution { .. }) => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    fn read_store(&self) -> Result<BTreeMap<String, String>> {
        parse_store(&self.read_raw_store()?)
    }

    /// Replace the store with `body` if it still holds `expected`.
    ///
    /// Writers in the guest are serialized with `flock` on `<store>.lock` when
    /// available. A store that no longer matches `expected` makes the script
    /// exit with [`STORE_CONFLICT`].
    fn write_store(&self, expected: &str, body: &str) -> Result<()> {
        let path = &self.config_file;
        let dir = Path::new(path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_string());
        // $$ keeps concurrent writers on distinct staging files
        let staged = format!("{}.$$", shell_quote(path));
        let script = format!(
            "mkdir -p {dir} || exit 1\n\
             if command -v flock >/dev/null 2>&1; then exec 9>>{lock} && flock 9 || exit 1; fi\n\
             current=$(cat {path} 2>/dev/null)\n\
             [ \"$current\" = {expected} ] || exit {conflict}\n\
             printf '%s' {body} > {staged} && mv -f {staged} {path}",
            dir = shell_quote(&dir),
            lock = shell_quote(&format!("{path}.lock")),
            path = shell_quote(path),
            expected = shell_quote(expected),
            conflict = STORE_CONFLICT,
            body = shell_quote(body),
        );

        let mut args = Vec::with_capacity(4);
        if self.elevated {
            args.push("sudo");
        }
        args.extend(["sh", "-c", script.as_str()]);
        self.run(&args)
    }
}

impl<H: HostActions, B: GuestBackend> RunActions for Guest<H, B> {
    fn run(&self, args: &[&str]) -> Result<()> {
        self.in_guest(args, |host, cmd| host.run(cmd))
    }

    fn run_output(&self, args: &[&str]) -> Result<String> {
        self.in_guest(args, |host, cmd| host.run_output(cmd))
    }

    fn run_interactive(&self, args: &[&str]) -> Result<()> {
        self.in_guest(args, |host, cmd| host.run_interactive(cmd))
    }
}

impl<H: HostActions, B: GuestBackend> GuestActions for Guest<H, B> {
    fn start(&self, config: &GuestConfig) -> Result<()> {
        config.validate()?;
        let lock = lifecycle_lock(self.backend.name());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let started = Instant::now();
        let name = self.backend.name();
        match self.probed_state(provision_error)? {
            LifecycleState::Running => {
                let current = match self.backend.last_config() {
                    Ok(current) => current,
                    Err(e) => {
                        warn!(guest = %name, error = %e, "Cannot read running configuration");
                        None
                    }
                };
                if let Some(current) = current {
                    let diffs = current.mismatches(config);
                    if !diffs.is_empty() {
                        return Err(EnvError::ConfigMismatch(diffs.join(", ")));
                    }
                }
                debug!(guest = %name, "Guest already running");
                return Ok(());
            }
            LifecycleState::Stopped => {
                info!(guest = %name, "Booting guest");
                self.backend.boot(config).map_err(provision_error)?;
            }
            LifecycleState::NotCreated => {
                info!(
                    guest = %name,
                    cpus = config.cpus,
                    memory_gib = config.memory_gib,
                    disk_gib = config.disk_gib,
                    "Provisioning guest"
                );
                self.backend.provision(config).map_err(provision_error)?;
            }
        }
        self.confirm_running(started)
    }

    fn stop(&self) -> Result<()> {
        let lock = lifecycle_lock(self.backend.name());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let name = self.backend.name();
        let state = self.probed_state(shutdown_error)?;
        if !state.is_running() {
            debug!(guest = %name, %state, "Guest not running, nothing to stop");
            return Ok(());
        }

        let started = Instant::now();
        info!(guest = %name, "Stopping guest");
        self.backend.shutdown().map_err(shutdown_error)?;
        if self.backend.running().map_err(shutdown_error)? {
            return Err(EnvError::Shutdown(format!(
                "guest '{name}' still running after shutdown"
            )));
        }
        info!(
            guest = %name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Guest stopped"
        );
        Ok(())
    }

    fn restart(&self) -> Result<()> {
        let lock = lifecycle_lock(self.backend.name());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let name = self.backend.name();
        let state = self.probed_state(provision_error)?;
        if !state.is_created() {
            return Err(EnvError::NotCreated);
        }

        let config = self
            .backend
            .last_config()
            .map_err(provision_error)?
            .ok_or_else(|| {
                EnvError::Provision(format!("no recorded configuration for guest '{name}'"))
            })?;

        let started = Instant::now();
        info!(guest = %name, %state, "Restarting guest");
        if state.is_running() {
            self.backend.reboot(&config).map_err(provision_error)?;
        } else {
            self.backend.boot(&config).map_err(provision_error)?;
        }
        self.confirm_running(started)
    }

    fn created(&self) -> bool {
        self.backend.created().unwrap_or_else(|e| {
            warn!(guest = %self.backend.name(), error = %e, "Created probe failed");
            false
        })
    }

    fn running(&self) -> bool {
        self.backend.running().unwrap_or_else(|e| {
            warn!(guest = %self.backend.name(), error = %e, "Running probe failed");
            false
        })
    }

    fn env(&self, name: &str) -> Result<String> {
        if !is_env_name(name) {
            return Err(EnvError::Config(format!("invalid env name '{name}'")));
        }
        let script = format!("printf '%s' \"${{{name}-}}\"");
        self.run_output(&["sh", "-c", script.as_str()])
    }

    fn get(&self, key: &str) -> String {
        match self.read_store() {
            Ok(mut entries) => entries.remove(key).unwrap_or_default(),
            Err(e) => {
                debug!(guest = %self.backend.name(), key, error = %e, "Config entry unavailable");
                String::new()
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let lock = store_lock(self.backend.name());
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let persist_error = |e: EnvError| match e {
            EnvError::NotRunning => e,
            other => EnvError::io(format!("persist config entry '{key}'"), other),
        };

        for attempt in 1..=STORE_ATTEMPTS {
            let raw = self.read_raw_store()?;
            let mut entries = match parse_store(&raw) {
                Ok(entries) => entries,
                Err(EnvError::Json(e)) => {
                    warn!(guest = %self.backend.name(), error = %e, "Discarding unreadable config store");
                    BTreeMap::new()
                }
                Err(e) => return Err(e),
            };
            entries.insert(key.to_string(), value.to_string());
            let body = serde_json::to_string(&entries)?;

            debug!(guest = %self.backend.name(), key, attempt, "Setting config entry");
            match self.write_store(&raw, &body) {
                Ok(()) => return Ok(()),
                Err(EnvError::Execution {
                    status: STORE_CONFLICT,
                    ..
                }) => {
                    debug!(guest = %self.backend.name(), key, attempt, "Config store changed, retrying");
                }
                Err(e) => return Err(persist_error(e)),
            }
        }
        Err(persist_error(EnvError::Config(format!(
            "config store kept changing after {STORE_ATTEMPTS} attempts"
        ))))
    }
}

impl<H, B: GuestBackend> Dependencies for Guest<H, B> {
    fn dependencies(&self) -> Vec<String> {
        self.backend.dependencies()
    }
}

type LockRegistry = OnceLock<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Mutex serializing lifecycle operations of every `Guest` addressing `name`.
fn lifecycle_lock(name: &str) -> Arc<Mutex<()>> {
    static LOCKS: LockRegistry = OnceLock::new();
    named_lock(&LOCKS, name)
}

/// Mutex serializing config store updates of every `Guest` addressing `name`.
fn store_lock(name: &str) -> Arc<Mutex<()>> {
    static LOCKS: LockRegistry = OnceLock::new();
    named_lock(&LOCKS, name)
}

// Entries are never removed: one per guest name for the life of the process.
fn named_lock(registry: &LockRegistry, name: &str) -> Arc<Mutex<()>> {
    let mut locks = registry
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(name.to_string()).or_default())
}

fn parse_store(raw: &str) -> Result<BTreeMap<String, String>> {
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    Ok(serde_json::from_str(raw)?)
}

fn provision_error(err: EnvError) -> EnvError {
    match err {
        EnvError::Provision(_) | EnvError::Shutdown(_) | EnvError::ConfigMismatch(_) => err,
        other => EnvError::Provision(other.to_string()),
    }
}

fn shutdown_error(err: EnvError) -> EnvError {
    match err {
        EnvError::Shutdown(_) => err,
        other => EnvError::Shutdown(other.to_string()),
    }
}

/// Single-quote `s` for POSIX sh.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
