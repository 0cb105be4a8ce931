//! In-memory guest backend shared by the integration tests.
//!
//! The "guest" is the local machine: `shell_command` returns the arguments
//! unchanged, so guest commands run through the host as-is. Lifecycle state
//! lives behind a shared mutex so tests can change it the way another
//! process would.

#![allow(dead_code)]

use cabin_env::{EnvError, Guest, GuestBackend, GuestConfig, Host, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct FakeState {
    pub created: bool,
    pub running: bool,
    pub config: Option<GuestConfig>,
    pub fail_provision: bool,
    pub stuck_running: bool,
    pub failing_probes: bool,
    pub provision_delay: Option<Duration>,
    pub calls: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct FakeBackend {
    name: String,
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    pub fn running(name: &str) -> Self {
        let backend = Self::new(name);
        {
            let mut state = backend.state.lock().unwrap();
            state.created = true;
            state.running = true;
            state.config = Some(GuestConfig::default());
        }
        backend
    }

    pub fn stopped(name: &str) -> Self {
        let backend = Self::running(name);
        backend.state.lock().unwrap().running = false;
        backend
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl GuestBackend for FakeBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn created(&self) -> Result<bool> {
        let state = self.state.lock().unwrap();
        probe(&state).map(|_| state.created)
    }

    fn running(&self) -> Result<bool> {
        let state = self.state.lock().unwrap();
        probe(&state).map(|_| state.running)
    }

    fn provision(&self, config: &GuestConfig) -> Result<()> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.calls.push("provision");
            state.provision_delay
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock().unwrap();
        state.created = true;
        if state.fail_provision {
            return Err(EnvError::Execution {
                command: "fakevm boot".into(),
                status: 1,
                stderr: "kernel panic".into(),
            });
        }
        state.running = true;
        state.config = Some(config.clone());
        Ok(())
    }

    fn boot(&self, config: &GuestConfig) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("boot");
        state.running = true;
        state.config = Some(config.clone());
        Ok(())
    }

    fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("shutdown");
        if !state.stuck_running {
            state.running = false;
        }
        Ok(())
    }

    fn last_config(&self) -> Result<Option<GuestConfig>> {
        Ok(self.state.lock().unwrap().config.clone())
    }

    fn shell_command(&self, args: &[&str]) -> Vec<String> {
        args.iter().map(|a| a.to_string()).collect()
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["fakevm".to_string()]
    }
}

fn probe(state: &FakeState) -> Result<()> {
    if state.failing_probes {
        return Err(EnvError::Execution {
            command: "fakevm list".into(),
            status: 1,
            stderr: "daemon unreachable".into(),
        });
    }
    Ok(())
}

/// Guest over `backend` storing config entries under `dir`.
pub fn guest(backend: FakeBackend, dir: &Path) -> Guest<Host, FakeBackend> {
    let store = dir.join("etc/cabin/cabin.json");
    Guest::new(Host::new(), backend).with_config_file(store.to_string_lossy(), false)
}
