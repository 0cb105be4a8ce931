//! Guest lifecycle state machine.
//!
//! The state is never stored. It is derived from the two backend probes
//! each time it is needed, because the guest can be created, stopped or
//! destroyed by processes other than this one.

use std::fmt;

/// Lifecycle state of a guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Guest does not exist
    NotCreated,
    /// Guest exists but is shut down
    Stopped,
    /// Guest is booted
    Running,
}

impl LifecycleState {
    /// Combine the `created` and `running` probes into a state.
    ///
    /// A backend reporting running for a guest it says does not exist is
    /// broken; the guest is treated as running since commands can reach it.
    pub fn from_probes(created: bool, running: bool) -> Self {
        match (created, running) {
            (_, true) => {
                if !created {
                    tracing::warn!("backend reports a running guest that was never created");
                }
                Self::Running
            }
            (true, false) => Self::Stopped,
            (false, false) => Self::NotCreated,
        }
    }

    /// Check whether the guest exists.
    pub fn is_created(&self) -> bool {
        !matches!(self, Self::NotCreated)
    }

    /// Check whether the guest is booted.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotCreated => write!(f, "not created"),
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}
