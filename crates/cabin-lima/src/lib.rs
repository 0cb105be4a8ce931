//! # cabin-lima
//!
//! Guest backend for Cabin built on [Lima](https://lima-vm.io).
//!
//! Every operation shells out to `limactl` through a [`cabin_env::HostActions`]
//! implementation, so the environment scoping of the host (for example a
//! custom `LIMA_HOME`) carries over to the VM manager.
//!
//! ```ignore
//! use cabin_env::{Guest, GuestActions, GuestConfig, Host};
//! use cabin_lima::LimaBackend;
//!
//! let host = Host::new();
//! let backend = LimaBackend::new(host.clone(), "default", "/home/me/.cabin");
//! let guest = Guest::new(host, backend);
//! guest.start(&GuestConfig::default())?;
//! ```

mod backend;
mod instance;

pub use backend::{instance_name, LimaBackend, VmType};
pub use instance::LimaInstance;
