//! Input and output types for the release orchestration

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ReleaseError;

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSettings {
    /// Pause between two polls of the release record (default: 3s)
    pub poll_interval: Duration,
    /// Polls before a release is declared timed out (default: 200, ~10 minutes)
    pub max_poll_attempts: u32,
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            max_poll_attempts: 200,
        }
    }
}

// ============================================================================
// Release Plan
// ============================================================================

/// A validated release request, ready to be executed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReleasePlan {
    /// Correlates every log line of one release attempt
    pub release_id: Uuid,
    pub namespace: String,
    pub devbox_name: String,
    /// UID of the devbox, used as the owner of the release record
    pub devbox_uid: Option<String>,
    pub tag: String,
    pub description: String,
    /// Whether the devbox was running when the request was accepted
    pub was_running: bool,
    /// Whether the devbox should be running once the release succeeded
    pub restart_after_release: bool,
}

// ============================================================================
// Stages & Outcome
// ============================================================================

/// Stages of one release attempt, in order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReleaseStage {
    Requested,
    Validating,
    Paused,
    Submitted,
    Polling,
    Succeeded,
    Failed,
    Restored,
}

impl fmt::Display for ReleaseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReleaseStage::Requested => "requested",
            ReleaseStage::Validating => "validating",
            ReleaseStage::Paused => "paused",
            ReleaseStage::Submitted => "submitted",
            ReleaseStage::Polling => "polling",
            ReleaseStage::Succeeded => "succeeded",
            ReleaseStage::Failed => "failed",
            ReleaseStage::Restored => "restored",
        };
        f.write_str(name)
    }
}

/// What the restoration step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// The devbox was meant to stay stopped
    Skipped,
    Resumed,
    /// Resuming failed; the release result is unaffected
    ResumeFailed(String),
}

/// Final report of a release attempt
#[derive(Debug)]
pub struct ReleaseOutcome {
    pub release_id: Uuid,
    /// Stages visited, in order
    pub stages: Vec<ReleaseStage>,
    pub result: Result<(), ReleaseError>,
    pub restore: RestoreOutcome,
}

impl ReleaseOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}
