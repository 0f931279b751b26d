//! Supervisor lifecycle state and child exit classification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supervisor lifecycle.
///
/// ```text
/// BOOTSTRAPPING → SPAWNING → MONITORING ⇄ DRAINING
///       ↓                        ↓          ↓
///   TERMINATED  ←  SHUTTING_DOWN ←──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Bootstrapping,
    Spawning,
    Monitoring,
    Draining,
    ShuttingDown,
    Terminated,
}

impl SupervisorState {
    pub fn is_terminal(self) -> bool {
        self == SupervisorState::Terminated
    }

    pub fn can_transition_to(self, to: SupervisorState) -> bool {
        use SupervisorState::*;
        match (self, to) {
            (Bootstrapping, Spawning) => true,
            // Fatal bootstrap failure.
            (Bootstrapping, Terminated) => true,
            (Spawning, Monitoring) => true,
            (Monitoring, Draining) => true,
            (Draining, Monitoring) => true,
            (Monitoring, ShuttingDown) => true,
            (Draining, ShuttingDown) => true,
            (ShuttingDown, Terminated) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SupervisorState::Bootstrapping => "bootstrapping",
            SupervisorState::Spawning => "spawning",
            SupervisorState::Monitoring => "monitoring",
            SupervisorState::Draining => "draining",
            SupervisorState::ShuttingDown => "shutting_down",
            SupervisorState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// How a subsystem task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum ChildExit {
    /// Returned `Ok` after a quit signal.
    Normal,
    /// Returned an error.
    Failed(String),
    Panicked,
    /// Aborted after the shutdown grace period.
    Cancelled,
}

impl ChildExit {
    pub fn is_error(&self) -> bool {
        matches!(self, ChildExit::Failed(_) | ChildExit::Panicked)
    }
}

impl fmt::Display for ChildExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChildExit::Normal => f.write_str("normal"),
            ChildExit::Failed(e) => write!(f, "failed ({})", e),
            ChildExit::Panicked => f.write_str("panicked"),
            ChildExit::Cancelled => f.write_str("cancelled"),
        }
    }
}
