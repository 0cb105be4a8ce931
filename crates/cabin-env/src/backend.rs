//! Guest backend contract.

use crate::config::GuestConfig;
use crate::error::{EnvError, Result};

/// Provisioning, boot, shutdown and command transport for one guest.
///
/// Implementations talk to whatever actually runs the VM. They must answer
/// the probes from the real external state on every call and never report a
/// guest as running when it does not exist.
pub trait GuestBackend: Send + Sync {
    /// Identity of the guest. Lifecycle operations are serialized per name.
    fn name(&self) -> &str;

    /// Whether the guest exists.
    fn created(&self) -> Result<bool>;

    /// Whether the guest is booted.
    fn running(&self) -> Result<bool>;

    /// Create and boot a guest that does not exist yet.
    fn provision(&self, config: &GuestConfig) -> Result<()>;

    /// Boot an existing, stopped guest.
    fn boot(&self, config: &GuestConfig) -> Result<()>;

    /// Gracefully shut down a running guest.
    fn shutdown(&self) -> Result<()>;

    /// Restart a running guest.
    ///
    /// The default shuts down and boots again. Backends that can restart in
    /// place should override this so observers never see the guest stopped.
    fn reboot(&self, config: &GuestConfig) -> Result<()> {
        self.shutdown().map_err(|e| match e {
            EnvError::Shutdown(_) => e,
            other => EnvError::Shutdown(other.to_string()),
        })?;
        self.boot(config)
    }

    /// Configuration the guest was last provisioned or booted with.
    fn last_config(&self) -> Result<Option<GuestConfig>>;

    /// Host command line that runs `args` inside the guest.
    fn shell_command(&self, args: &[&str]) -> Vec<String>;

    /// Host packages this backend needs.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }
}
