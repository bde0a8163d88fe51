//! Traffic state controller: pause or resume a devbox's public routing and run-state

use devbox_models::DevboxState;
use futures::future::try_join_all;
use k8s_openapi::api::networking::v1::Ingress;
use serde_json::json;

use crate::error::GatewayError;
use crate::k8s_client::ClusterGateway;
use crate::names::{devbox_label_selector, ingress_classes, INGRESS_CLASS_ANNOTATION};

/// What a call to [`set_devbox_state`] changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChange {
    /// Ingresses whose traffic class was rewritten
    pub routes_patched: usize,
    /// Run-state written to the devbox
    pub state: DevboxState,
}

/// Flip every route of a devbox between the public and paused traffic
/// classes, then patch the devbox run-state to match.
///
/// Routes are patched concurrently; the devbox is only patched once all of
/// them succeeded.
pub async fn set_devbox_state(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    devbox_name: &str,
    running: bool,
) -> Result<StateChange, GatewayError> {
    let (from_class, to_class) = if running {
        (ingress_classes::PAUSED, ingress_classes::PUBLIC)
    } else {
        (ingress_classes::PUBLIC, ingress_classes::PAUSED)
    };

    let ingresses = gateway
        .list_ingresses(namespace, &devbox_label_selector(devbox_name))
        .await?;

    let patches: Vec<(String, serde_json::Value)> = ingresses
        .iter()
        .filter_map(|ingress| {
            let name = ingress.metadata.name.clone()?;
            class_patch(ingress, from_class, to_class).map(|patch| (name, patch))
        })
        .collect();

    tracing::debug!(
        devbox = devbox_name,
        from = from_class,
        to = to_class,
        total = ingresses.len(),
        selected = patches.len(),
        "Switching ingress traffic class"
    );

    try_join_all(
        patches
            .iter()
            .map(|(name, patch)| gateway.patch_ingress(namespace, name, patch)),
    )
    .await?;

    let state = if running { DevboxState::Running } else { DevboxState::Stopped };
    gateway
        .patch_devbox(namespace, devbox_name, &json!({ "spec": { "state": state.as_str() } }))
        .await?;

    tracing::info!(
        devbox = devbox_name,
        state = state.as_str(),
        routes = patches.len(),
        "Devbox state updated"
    );

    Ok(StateChange {
        routes_patched: patches.len(),
        state,
    })
}

/// Merge patch moving every class marker of `ingress` that holds `from` to
/// `to`, or `None` when no marker holds `from`
fn class_patch(ingress: &Ingress, from: &str, to: &str) -> Option<serde_json::Value> {
    let annotation = ingress
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(INGRESS_CLASS_ANNOTATION))
        .map(String::as_str);
    let class_name = ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.ingress_class_name.as_deref());

    let mut patch = serde_json::Map::new();
    if annotation == Some(from) {
        patch.insert(
            "metadata".to_string(),
            json!({ "annotations": { INGRESS_CLASS_ANNOTATION: to } }),
        );
    }
    if class_name == Some(from) {
        patch.insert("spec".to_string(), json!({ "ingressClassName": to }));
    }

    if patch.is_empty() {
        None
    } else {
        Some(serde_json::Value::Object(patch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{devbox, ingress, FakeCluster};

    #[test]
    fn test_class_patch_rewrites_matching_markers_only() {
        let by_annotation = ingress("demo", "a", Some("nginx"), None);
        assert_eq!(
            class_patch(&by_annotation, "nginx", "pause"),
            Some(json!({
                "metadata": { "annotations": { "kubernetes.io/ingress.class": "pause" } }
            }))
        );

        let by_field = ingress("demo", "b", None, Some("nginx"));
        assert_eq!(
            class_patch(&by_field, "nginx", "pause"),
            Some(json!({ "spec": { "ingressClassName": "pause" } }))
        );

        let both = ingress("demo", "c", Some("nginx"), Some("nginx"));
        let patch = class_patch(&both, "nginx", "pause").unwrap();
        assert_eq!(patch["metadata"]["annotations"]["kubernetes.io/ingress.class"], "pause");
        assert_eq!(patch["spec"]["ingressClassName"], "pause");

        let neither = ingress("demo", "d", None, None);
        assert_eq!(class_patch(&neither, "nginx", "pause"), None);

        let other_class = ingress("demo", "e", Some("traefik"), None);
        assert_eq!(class_patch(&other_class, "nginx", "pause"), None);
    }

    #[tokio::test]
    async fn test_pause_moves_public_routes_and_stops_devbox() {
        let cluster = FakeCluster::new();
        cluster.insert_devbox("ns", devbox("demo", "uid-1", DevboxState::Running));
        cluster.insert_ingress("ns", ingress("demo", "web", Some("nginx"), None));
        cluster.insert_ingress("ns", ingress("demo", "api", None, Some("nginx")));
        cluster.insert_ingress("ns", ingress("demo", "bare", None, None));
        cluster.insert_ingress("ns", ingress("other", "web-other", Some("nginx"), None));

        let change = set_devbox_state(&cluster, "ns", "demo", false).await.unwrap();

        assert_eq!(change, StateChange { routes_patched: 2, state: DevboxState::Stopped });
        assert_eq!(cluster.ingress_class("ns", "web"), (Some("pause".to_string()), None));
        assert_eq!(cluster.ingress_class("ns", "api"), (None, Some("pause".to_string())));
        assert_eq!(cluster.ingress_class("ns", "bare"), (None, None));
        assert_eq!(cluster.ingress_class("ns", "web-other"), (Some("nginx".to_string()), None));
        assert_eq!(cluster.devbox_state("ns", "demo"), Some(DevboxState::Stopped));
    }

    #[tokio::test]
    async fn test_resume_is_idempotent() {
        let cluster = FakeCluster::new();
        cluster.insert_devbox("ns", devbox("demo", "uid-1", DevboxState::Stopped));
        cluster.insert_ingress("ns", ingress("demo", "web", Some("pause"), None));
        cluster.insert_ingress("ns", ingress("demo", "api", None, Some("pause")));

        let first = set_devbox_state(&cluster, "ns", "demo", true).await.unwrap();
        let after_first = (
            cluster.ingress_class("ns", "web"),
            cluster.ingress_class("ns", "api"),
            cluster.devbox_state("ns", "demo"),
        );

        let second = set_devbox_state(&cluster, "ns", "demo", true).await.unwrap();
        let after_second = (
            cluster.ingress_class("ns", "web"),
            cluster.ingress_class("ns", "api"),
            cluster.devbox_state("ns", "demo"),
        );

        assert_eq!(first.routes_patched, 2);
        assert_eq!(second.routes_patched, 0);
        assert_eq!(after_first, after_second);
        assert_eq!(after_second.2, Some(DevboxState::Running));
    }

    #[tokio::test]
    async fn test_route_failure_leaves_devbox_untouched() {
        let cluster = FakeCluster::new();
        cluster.insert_devbox("ns", devbox("demo", "uid-1", DevboxState::Running));
        cluster.insert_ingress("ns", ingress("demo", "web", Some("nginx"), None));
        cluster.fail_ingress_patches(true);

        let result = set_devbox_state(&cluster, "ns", "demo", false).await;

        assert!(result.is_err());
        assert_eq!(cluster.devbox_state("ns", "demo"), Some(DevboxState::Running));
    }
}
