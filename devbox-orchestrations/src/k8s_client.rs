//! Cluster gateway: the only place that talks to the Kubernetes API

use anyhow::{Context, Result};
use async_trait::async_trait;
use devbox_models::{Devbox, DevboxRelease};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use kube::{Client, ResourceExt};

use crate::error::GatewayError;

/// Capabilities the control plane needs from the cluster.
///
/// Every method addresses a single namespace. Errors are surfaced as they
/// come back from the API server; callers own the retry policy.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    async fn list_ingresses(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Ingress>, GatewayError>;

    /// Merge-patch a single ingress
    async fn patch_ingress(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), GatewayError>;

    async fn list_devboxes(&self, namespace: &str) -> Result<Vec<Devbox>, GatewayError>;

    /// Merge-patch a single devbox
    async fn patch_devbox(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), GatewayError>;

    async fn list_releases(&self, namespace: &str) -> Result<Vec<DevboxRelease>, GatewayError>;

    /// Create each manifest, in order. An object that already exists yields
    /// [`GatewayError::Conflict`].
    async fn create_manifests(
        &self,
        namespace: &str,
        manifests: &[DynamicObject],
    ) -> Result<(), GatewayError>;
}

/// Get a Kubernetes client
pub async fn get_k8s_client() -> Result<Client> {
    Client::try_default()
        .await
        .context("Failed to create Kubernetes client")
}

/// [`ClusterGateway`] backed by a live `kube::Client`
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
}

impl KubeGateway {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Namespace of the active kubeconfig context or in-cluster service account
    pub fn default_namespace(&self) -> &str {
        self.client.default_namespace()
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn list_ingresses(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Ingress>, GatewayError> {
        let ingresses: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        let list = ingresses
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(|e| GatewayError::from_kube(e, "Ingress", label_selector))?;
        Ok(list.items)
    }

    async fn patch_ingress(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), GatewayError> {
        let ingresses: Api<Ingress> = Api::namespaced(self.client.clone(), namespace);
        ingresses
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| GatewayError::from_kube(e, "Ingress", name))?;
        Ok(())
    }

    async fn list_devboxes(&self, namespace: &str) -> Result<Vec<Devbox>, GatewayError> {
        let devboxes: Api<Devbox> = Api::namespaced(self.client.clone(), namespace);
        let list = devboxes
            .list(&ListParams::default())
            .await
            .map_err(|e| GatewayError::from_kube(e, "Devbox", namespace))?;
        Ok(list.items)
    }

    async fn patch_devbox(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), GatewayError> {
        let devboxes: Api<Devbox> = Api::namespaced(self.client.clone(), namespace);
        devboxes
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| GatewayError::from_kube(e, "Devbox", name))?;
        Ok(())
    }

    async fn list_releases(&self, namespace: &str) -> Result<Vec<DevboxRelease>, GatewayError> {
        let releases: Api<DevboxRelease> = Api::namespaced(self.client.clone(), namespace);
        let list = releases
            .list(&ListParams::default())
            .await
            .map_err(|e| GatewayError::from_kube(e, "DevboxRelease", namespace))?;
        Ok(list.items)
    }

    async fn create_manifests(
        &self,
        namespace: &str,
        manifests: &[DynamicObject],
    ) -> Result<(), GatewayError> {
        for manifest in manifests {
            let gvk = manifest_gvk(manifest)?;
            let name = manifest.name_any();
            let (resource, _caps) = kube::discovery::pinned_kind(&self.client, &gvk)
                .await
                .map_err(|e| GatewayError::from_kube(e, &gvk.kind, &name))?;
            let api: Api<DynamicObject> =
                Api::namespaced_with(self.client.clone(), namespace, &resource);

            tracing::debug!(kind = %gvk.kind, %name, "Creating manifest");
            api.create(&PostParams::default(), manifest)
                .await
                .map_err(|e| GatewayError::from_kube(e, &gvk.kind, &name))?;
        }
        Ok(())
    }
}

/// Group/version/kind of a manifest, from its `apiVersion` and `kind`
fn manifest_gvk(manifest: &DynamicObject) -> Result<GroupVersionKind, GatewayError> {
    let types = manifest
        .types
        .as_ref()
        .ok_or_else(|| GatewayError::InvalidManifest("missing apiVersion/kind".to_string()))?;

    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        // core group, e.g. "v1"
        None => ("", types.api_version.as_str()),
    };
    if version.is_empty() || types.kind.is_empty() {
        return Err(GatewayError::InvalidManifest(format!(
            "unusable apiVersion '{}' / kind '{}'",
            types.api_version, types.kind
        )));
    }

    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::TypeMeta;

    #[test]
    fn test_manifest_gvk_splits_group_and_version() {
        let mut manifest = DynamicObject {
            types: Some(TypeMeta {
                api_version: "devbox.sealos.io/v1alpha2".to_string(),
                kind: "DevboxRelease".to_string(),
            }),
            metadata: Default::default(),
            data: serde_json::json!({}),
        };
        let gvk = manifest_gvk(&manifest).unwrap();
        assert_eq!(gvk.group, "devbox.sealos.io");
        assert_eq!(gvk.version, "v1alpha2");
        assert_eq!(gvk.kind, "DevboxRelease");

        manifest.types = Some(TypeMeta {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
        });
        let gvk = manifest_gvk(&manifest).unwrap();
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
    }

    #[test]
    fn test_manifest_gvk_rejects_untyped_objects() {
        let manifest = DynamicObject {
            types: None,
            metadata: Default::default(),
            data: serde_json::json!({}),
        };
        assert!(matches!(manifest_gvk(&manifest), Err(GatewayError::InvalidManifest(_))));
    }
}
