//! Box lifecycle states and the transitions between them.
//!
//! ```text
//! create() → Created → Running   (creation auto-starts; Created is never
//! stop()   → Stopped              observed by callers)
//! start()  → Running              (restart from Stopped)
//! remove() → Removed              (terminal; the record is purged)
//! ```

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{NanoboxError, NanoboxResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Lifecycle status of a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxStatus {
    /// Box record assembled but not yet started. Transient: creation
    /// advances to `Running` before the record becomes visible.
    Created,

    /// Box is running and accepting commands.
    Running,

    /// Box is not running; it can be restarted or removed.
    Stopped,

    /// Box has been removed. Terminal; no lookup observes this state.
    Removed,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BoxStatus {
    /// Whether the box's isolation unit is live.
    pub fn is_running(&self) -> bool {
        matches!(self, BoxStatus::Running)
    }

    /// Whether start() may be applied in this state.
    pub fn can_start(&self) -> bool {
        matches!(self, BoxStatus::Stopped)
    }

    /// Whether commands may be executed in this state.
    pub fn can_exec(&self) -> bool {
        matches!(self, BoxStatus::Running)
    }

    /// Whether remove() may be applied in this state without force.
    pub fn can_remove(&self) -> bool {
        matches!(self, BoxStatus::Stopped)
    }

    /// Check whether a transition to `target` is valid.
    pub fn can_transition_to(&self, target: BoxStatus) -> bool {
        use BoxStatus::*;
        matches!(
            (self, target),
            // Creation auto-starts the box
            (Created, Running)
            // Graceful or forced stop
            | (Running, Stopped)
            // Restart
            | (Stopped, Running)
            // Removal of a stopped box (force stops first)
            | (Stopped, Removed)
        )
    }

    /// Validate a transition, returning `InvalidState` when it is not allowed.
    pub fn transition_to(&self, target: BoxStatus) -> NanoboxResult<BoxStatus> {
        if !self.can_transition_to(target) {
            return Err(NanoboxError::InvalidState(format!(
                "cannot transition from {} to {}",
                self, target
            )));
        }
        Ok(target)
    }

    /// String form used in info records.
    pub fn as_str(&self) -> &'static str {
        match self {
            BoxStatus::Created => "created",
            BoxStatus::Running => "running",
            BoxStatus::Stopped => "stopped",
            BoxStatus::Removed => "removed",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Display for BoxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BoxStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(BoxStatus::Created),
            "running" => Ok(BoxStatus::Running),
            "stopped" => Ok(BoxStatus::Stopped),
            "removed" => Ok(BoxStatus::Removed),
            _ => Err(()),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
