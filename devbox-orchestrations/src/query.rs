//! Release listing for one devbox

use devbox_models::{DevboxRelease, ReleaseSummary};
use kube::ResourceExt;

use crate::error::ReleaseError;
use crate::k8s_client::ClusterGateway;
use crate::names::release_image;
use crate::validation::is_valid_devbox_name;

/// Whether `release` belongs to the devbox `devbox_name`.
///
/// Owner UIDs only decide when both sides carry one, so records created
/// without an owner reference still show up.
pub(crate) fn is_owned_by(
    release: &DevboxRelease,
    devbox_name: &str,
    devbox_uid: Option<&str>,
) -> bool {
    if release.spec.devbox_name != devbox_name {
        return false;
    }
    match (devbox_uid, release.owner_devbox_uid()) {
        (Some(expected), Some(owner)) => expected == owner,
        _ => true,
    }
}

/// Releases of a devbox, newest first, with the image each one produced
pub async fn list_releases(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    devbox_name: &str,
    registry: &str,
) -> Result<Vec<ReleaseSummary>, ReleaseError> {
    if !is_valid_devbox_name(devbox_name) {
        return Err(ReleaseError::InvalidName(devbox_name.to_string()));
    }

    let (devboxes, releases) = tokio::try_join!(
        gateway.list_devboxes(namespace),
        gateway.list_releases(namespace),
    )?;

    let devbox = devboxes
        .iter()
        .find(|devbox| devbox.name_any() == devbox_name)
        .ok_or_else(|| ReleaseError::DevboxNotFound(devbox_name.to_string()))?;
    let devbox_uid = devbox.metadata.uid.as_deref().filter(|uid| !uid.is_empty());

    let mut owned: Vec<&DevboxRelease> = releases
        .iter()
        .filter(|release| is_owned_by(release, devbox_name, devbox_uid))
        .collect();
    // Records without a timestamp sort last
    owned.sort_by(|a, b| b.created_at().cmp(&a.created_at()));

    tracing::debug!(
        devbox = devbox_name,
        total = releases.len(),
        owned = owned.len(),
        "Listed releases"
    );

    Ok(owned
        .into_iter()
        .map(|release| ReleaseSummary {
            devbox_name: release.spec.devbox_name.clone(),
            tag: release.spec.version.clone(),
            description: release.spec.notes.clone(),
            phase: release.phase(),
            created_at: release.created_at(),
            image: release_image(registry, namespace, devbox_name, &release.spec.version),
        })
        .collect())
}
