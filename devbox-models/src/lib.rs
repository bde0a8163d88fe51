use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group shared by the devbox custom resources
pub const DEVBOX_GROUP: &str = "devbox.sealos.io";

/// API version of the devbox custom resources served by the cluster
pub const DEVBOX_VERSION: &str = "v1alpha2";

// ============================================================================
// Devbox
// ============================================================================

/// Desired run-state of a devbox
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum DevboxState {
    Running,
    Stopped,
    Shutdown,
    /// Any state written by a newer controller that this server does not know
    #[serde(other)]
    Unknown,
}

impl DevboxState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DevboxState::Running => "Running",
            DevboxState::Stopped => "Stopped",
            DevboxState::Shutdown => "Shutdown",
            DevboxState::Unknown => "Unknown",
        }
    }
}

/// The subset of a devbox spec this server reads and writes.
///
/// Everything else in the resource is owned by the devbox controller and is
/// only ever touched through merge patches, so it does not need to round-trip.
#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "devbox.sealos.io",
    version = "v1alpha2",
    kind = "Devbox",
    plural = "devboxes",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct DevboxSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<DevboxState>,
}

impl Devbox {
    pub fn is_running(&self) -> bool {
        self.spec.state == Some(DevboxState::Running)
    }
}

// ============================================================================
// DevboxRelease
// ============================================================================

/// Lifecycle phase of a release record, written by the release reconciler
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ReleasePhase {
    Pending,
    Building,
    Success,
    Failed,
    #[serde(other)]
    Unknown,
}

/// A single build-and-tag attempt for a devbox
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "devbox.sealos.io",
    version = "v1alpha2",
    kind = "DevboxRelease",
    plural = "devboxreleases",
    namespaced,
    status = "DevboxReleaseStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct DevboxReleaseSpec {
    pub devbox_name: String,
    /// Release tag, unique per devbox
    pub version: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub start_devbox_after_release: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DevboxReleaseStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ReleasePhase>,
}

impl DevboxRelease {
    /// Current phase; a record the reconciler has not picked up yet is pending
    pub fn phase(&self) -> ReleasePhase {
        self.status
            .as_ref()
            .and_then(|status| status.phase)
            .unwrap_or(ReleasePhase::Pending)
    }

    /// UID of the owning devbox, if the record carries an owner reference
    pub fn owner_devbox_uid(&self) -> Option<&str> {
        self.metadata
            .owner_references
            .as_ref()?
            .iter()
            .find(|owner| owner.kind == "Devbox")
            .map(|owner| owner.uid.as_str())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.metadata.creation_timestamp.as_ref().map(|time| time.0)
    }
}

// ============================================================================
// HTTP API
// ============================================================================

/// Request body for `POST /devbox/{name}/release`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CreateReleaseRequest {
    pub tag: String,
    #[serde(default)]
    pub release_des: String,
    #[serde(default)]
    pub start_devbox_after_release: bool,
}

/// One entry of `GET /devbox/{name}/release`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseSummary {
    pub devbox_name: String,
    pub tag: String,
    pub description: String,
    pub phase: ReleasePhase,
    pub created_at: Option<DateTime<Utc>>,
    pub image: String,
}
