//! Release devbox orchestration
//!
//! Takes the devbox offline, submits a `DevboxRelease`, polls it until the
//! reconciler reports a terminal phase, then puts the devbox back the way the
//! caller expects it. Runs detached from the request that triggered it; the
//! outcome only ever ends up in the log.

use std::sync::Arc;

use devbox_models::{CreateReleaseRequest, DevboxRelease, ReleasePhase};
use kube::ResourceExt;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{GatewayError, ReleaseError};
use crate::k8s_client::ClusterGateway;
use crate::manifests::ReleaseManifest;
use crate::query::is_owned_by;
use crate::traffic::set_devbox_state;
use crate::types::{
    ReleaseOutcome, ReleasePlan, ReleaseSettings, ReleaseStage, RestoreOutcome,
};
use crate::validation::{tag_exists, validate_release_request};

#[derive(Clone)]
pub struct ReleaseOrchestrator {
    gateway: Arc<dyn ClusterGateway>,
    settings: ReleaseSettings,
}

impl ReleaseOrchestrator {
    pub fn new(gateway: Arc<dyn ClusterGateway>, settings: ReleaseSettings) -> Self {
        Self { gateway, settings }
    }

    pub fn gateway(&self) -> &Arc<dyn ClusterGateway> {
        &self.gateway
    }

    /// Validate a release request and capture the devbox state it starts from.
    ///
    /// Nothing on the cluster is mutated here. A tag is refused when the pair
    /// already has a record or when another record holds the object name the
    /// release would get. The check is advisory: two concurrent requests can
    /// both pass it, and the create call in [`Self::execute`] settles the race.
    pub async fn prepare(
        &self,
        namespace: &str,
        devbox_name: &str,
        request: &CreateReleaseRequest,
    ) -> Result<ReleasePlan, ReleaseError> {
        validate_release_request(devbox_name, request)?;

        let (devboxes, releases) = tokio::try_join!(
            self.gateway.list_devboxes(namespace),
            self.gateway.list_releases(namespace),
        )?;

        let devbox = devboxes
            .iter()
            .find(|devbox| devbox.name_any() == devbox_name)
            .ok_or_else(|| ReleaseError::DevboxNotFound(devbox_name.to_string()))?;

        if tag_exists(&releases, devbox_name, &request.tag) {
            return Err(ReleaseError::TagConflict {
                devbox: devbox_name.to_string(),
                tag: request.tag.clone(),
            });
        }

        let was_running = devbox.is_running();
        Ok(ReleasePlan {
            release_id: Uuid::new_v4(),
            namespace: namespace.to_string(),
            devbox_name: devbox_name.to_string(),
            devbox_uid: devbox.metadata.uid.clone().filter(|uid| !uid.is_empty()),
            tag: request.tag.clone(),
            description: request.release_des.clone(),
            was_running,
            restart_after_release: was_running || request.start_devbox_after_release,
        })
    }

    /// Run [`Self::execute`] as a detached task.
    ///
    /// Dropping the handle does not cancel the release.
    pub fn spawn(&self, plan: ReleasePlan) -> JoinHandle<ReleaseOutcome> {
        let span = tracing::info_span!(
            "release",
            release_id = %plan.release_id,
            devbox = %plan.devbox_name,
            tag = %plan.tag,
        );
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.execute(plan).await }.instrument(span))
    }

    /// Drive one release attempt to its end. Never fails: every error is
    /// folded into the returned outcome and logged.
    pub async fn execute(&self, plan: ReleasePlan) -> ReleaseOutcome {
        let mut stages = StageLog::default();
        stages.enter(ReleaseStage::Requested);
        stages.enter(ReleaseStage::Validating);

        let result = self.release(&plan, &mut stages).await;
        match &result {
            Ok(()) => stages.enter(ReleaseStage::Succeeded),
            Err(_) => stages.enter(ReleaseStage::Failed),
        }

        let restore = if self.lost_submit_race(&plan, &result).await {
            tracing::info!("Release record belongs to a concurrent request, leaving the devbox");
            RestoreOutcome::Skipped
        } else {
            self.restore(&plan, result.is_ok()).await
        };
        stages.enter(ReleaseStage::Restored);

        match &result {
            Ok(()) => tracing::info!(restore = ?restore, "Release completed"),
            Err(e) => tracing::error!(error = %e, restore = ?restore, "Release failed"),
        }

        ReleaseOutcome {
            release_id: plan.release_id,
            stages: stages.0,
            result,
            restore,
        }
    }

    async fn release(
        &self,
        plan: &ReleasePlan,
        stages: &mut StageLog,
    ) -> Result<(), ReleaseError> {
        // The image must be cut from a stopped devbox, even if it runs again right after
        stages.enter(ReleaseStage::Paused);
        set_devbox_state(self.gateway.as_ref(), &plan.namespace, &plan.devbox_name, false)
            .await?;

        stages.enter(ReleaseStage::Submitted);
        let manifest = ReleaseManifest {
            namespace: &plan.namespace,
            devbox_name: &plan.devbox_name,
            devbox_uid: plan.devbox_uid.as_deref(),
            tag: &plan.tag,
            notes: &plan.description,
        }
        .render()?;

        self.gateway
            .create_manifests(&plan.namespace, &[manifest])
            .await
            .map_err(|e| match e {
                GatewayError::Conflict { .. } => ReleaseError::TagConflict {
                    devbox: plan.devbox_name.clone(),
                    tag: plan.tag.clone(),
                },
                other => ReleaseError::Gateway(other),
            })?;

        stages.enter(ReleaseStage::Polling);
        self.wait_for_release(plan).await
    }

    async fn wait_for_release(&self, plan: &ReleasePlan) -> Result<(), ReleaseError> {
        let max_attempts = self.settings.max_poll_attempts;

        for attempt in 1..=max_attempts {
            let releases = self.gateway.list_releases(&plan.namespace).await?;
            let phase = releases
                .iter()
                .find(|release| is_release_of(release, plan))
                .map(DevboxRelease::phase);

            match phase {
                Some(ReleasePhase::Success) => return Ok(()),
                Some(ReleasePhase::Failed) => {
                    return Err(ReleaseError::ReleaseFailed {
                        devbox: plan.devbox_name.clone(),
                        tag: plan.tag.clone(),
                    })
                }
                _ => {}
            }

            tracing::debug!(attempt, max_attempts, phase = ?phase, "Release not finished yet");
            if attempt < max_attempts {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        }

        Err(ReleaseError::Timeout {
            devbox: plan.devbox_name.clone(),
            tag: plan.tag.clone(),
            attempts: max_attempts,
        })
    }

    /// Whether the submit conflict in `result` came from a concurrent request
    /// for the same release, which then owns bringing the devbox back.
    async fn lost_submit_race(
        &self,
        plan: &ReleasePlan,
        result: &Result<(), ReleaseError>,
    ) -> bool {
        if !matches!(result, Err(ReleaseError::TagConflict { .. })) {
            return false;
        }
        match self.gateway.list_releases(&plan.namespace).await {
            Ok(releases) => releases.iter().any(|release| is_release_of(release, plan)),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to look up the conflicting release");
                false
            }
        }
    }

    /// Best-effort resume. A failed release puts a previously running devbox
    /// back online whatever the caller asked for.
    async fn restore(&self, plan: &ReleasePlan, succeeded: bool) -> RestoreOutcome {
        let resume = if succeeded {
            plan.restart_after_release
        } else {
            plan.was_running
        };
        if !resume {
            return RestoreOutcome::Skipped;
        }

        let resumed =
            set_devbox_state(self.gateway.as_ref(), &plan.namespace, &plan.devbox_name, true).await;
        match resumed {
            Ok(_) => RestoreOutcome::Resumed,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to resume devbox after release");
                RestoreOutcome::ResumeFailed(e.to_string())
            }
        }
    }
}

/// Whether `release` is the record submitted for `plan`
fn is_release_of(release: &DevboxRelease, plan: &ReleasePlan) -> bool {
    release.spec.version == plan.tag
        && is_owned_by(release, &plan.devbox_name, plan.devbox_uid.as_deref())
}

#[derive(Default)]
struct StageLog(Vec<ReleaseStage>);

impl StageLog {
    fn enter(&mut self, stage: ReleaseStage) {
        tracing::info!(%stage, "Release stage");
        self.0.push(stage);
    }
}
