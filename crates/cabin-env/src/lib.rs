//! # cabin-env
//!
//! Execution and lifecycle layer for Cabin guest VMs.
//!
//! Orchestration code talks to two action sets that share a common
//! run capability but differ in everything else:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     orchestration                        │
//! └──────────────────────────────────────────────────────────┘
//!            │                               │
//!            ▼                               ▼
//! ┌─────────────────────┐        ┌──────────────────────────┐
//! │ Host (HostActions)  │        │ Guest (GuestActions)     │
//! │  - run*()           │◀───────│  - run*()  (wrapped)     │
//! │  - read()/write()   │        │  - start/stop/restart    │
//! │  - with_env()/env() │        │  - created()/running()   │
//! └─────────────────────┘        │  - env()/get()/set()     │
//!            │                   └──────────────────────────┘
//!            ▼                               │
//! ┌─────────────────────┐        ┌──────────────────────────┐
//! │  EnvContext         │        │  GuestBackend            │
//! │  (immutable)        │        │  (provision, boot, ...)  │
//! └─────────────────────┘        └──────────────────────────┘
//! ```
//!
//! The guest lifecycle is never stored. [`LifecycleState`] is derived from
//! the backend's `created`/`running` probes every time it is needed, since
//! the VM can be created or destroyed by other processes.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cabin_env::{EnvContext, GuestActions, GuestConfig, Host, HostActions, RunActions};
//!
//! let host = Host::new().with_env(EnvContext::from_pairs([("LIMA_HOME", "/tmp/lima")]));
//! host.run(&["limactl", "--version"])?;
//!
//! let guest = cabin_env::Guest::new(host, backend);
//! guest.start(&GuestConfig::default())?;
//! guest.set("runtime", "docker")?;
//! assert_eq!(guest.get("runtime"), "docker");
//! guest.stop()?;
//! ```

mod backend;
mod config;
mod context;
mod deps;
mod error;
mod guest;
mod host;
mod lifecycle;

pub use backend::GuestBackend;
pub use config::{GuestConfig, GuestConfigBuilder, Mount};
pub use context::EnvContext;
pub use deps::{collect_dependencies, Dependencies};
pub use error::{EnvError, Result};
pub use guest::{Guest, GuestActions, DEFAULT_CONFIG_FILE};
pub use host::{FileActions, Host, HostActions, RunActions};
pub use lifecycle::LifecycleState;
