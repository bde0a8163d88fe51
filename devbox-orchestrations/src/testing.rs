//! In-memory cluster for tests
//!
//! [`FakeCluster`] implements [`ClusterGateway`] over plain maps. It applies
//! merge patches the way the API server does, answers a duplicate create with
//! a conflict, and stands in for the release reconciler: a scripted release
//! reaches its terminal phase after a given number of list calls.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use devbox_models::{
    Devbox, DevboxRelease, DevboxReleaseSpec, DevboxReleaseStatus, DevboxSpec, DevboxState,
    ReleasePhase, DEVBOX_GROUP, DEVBOX_VERSION,
};
use k8s_openapi::api::networking::v1::{Ingress, IngressSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{OwnerReference, Time};
use kube::api::{DynamicObject, ObjectMeta};
use kube::ResourceExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::GatewayError;
use crate::k8s_client::ClusterGateway;
use crate::names::{DEVBOX_LABEL_KEY, INGRESS_CLASS_ANNOTATION};

type Key = (String, String);

#[derive(Debug, Clone, Copy)]
struct ReleaseScript {
    after_polls: u32,
    phase: ReleasePhase,
}

#[derive(Default)]
struct State {
    ingresses: BTreeMap<Key, Ingress>,
    devboxes: BTreeMap<Key, Devbox>,
    releases: BTreeMap<Key, DevboxRelease>,
    scripts: HashMap<Key, ReleaseScript>,
    polls: HashMap<Key, u32>,
    devbox_writes: Vec<(Key, DevboxState)>,
    created: u32,
    fail_ingress_patches: bool,
    fail_creates: bool,
    fail_resume: bool,
    fail_release_lists: bool,
}

#[derive(Default)]
pub struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake cluster state poisoned")
    }

    pub fn insert_devbox(&self, namespace: &str, devbox: Devbox) {
        let key = (namespace.to_string(), devbox.name_any());
        self.state().devboxes.insert(key, devbox);
    }

    pub fn insert_ingress(&self, namespace: &str, ingress: Ingress) {
        let key = (namespace.to_string(), ingress.name_any());
        self.state().ingresses.insert(key, ingress);
    }

    pub fn insert_release(&self, namespace: &str, release: DevboxRelease) {
        let key = (namespace.to_string(), release.name_any());
        self.state().releases.insert(key, release);
    }

    /// Have the release for `(devbox_name, tag)` reach `phase` once it has
    /// been listed `after_polls` times
    pub fn script_release(
        &self,
        devbox_name: &str,
        tag: &str,
        after_polls: u32,
        phase: ReleasePhase,
    ) {
        let key = (devbox_name.to_string(), tag.to_string());
        self.state().scripts.insert(key, ReleaseScript { after_polls, phase });
    }

    pub fn fail_ingress_patches(&self, fail: bool) {
        self.state().fail_ingress_patches = fail;
    }

    /// Answer every create with a server error
    pub fn fail_creates(&self, fail: bool) {
        self.state().fail_creates = fail;
    }

    /// Reject every devbox patch that would set it running
    pub fn fail_resume(&self, fail: bool) {
        self.state().fail_resume = fail;
    }

    pub fn fail_release_lists(&self, fail: bool) {
        self.state().fail_release_lists = fail;
    }

    pub fn devbox_state(&self, namespace: &str, name: &str) -> Option<DevboxState> {
        self.state()
            .devboxes
            .get(&(namespace.to_string(), name.to_string()))
            .and_then(|devbox| devbox.spec.state)
    }

    /// Every run-state written to a devbox, oldest first
    pub fn devbox_state_history(&self, namespace: &str, name: &str) -> Vec<DevboxState> {
        let key = (namespace.to_string(), name.to_string());
        self.state()
            .devbox_writes
            .iter()
            .filter(|(written, _)| *written == key)
            .map(|(_, state)| *state)
            .collect()
    }

    /// `(annotation, spec.ingressClassName)` of an ingress
    pub fn ingress_class(
        &self,
        namespace: &str,
        name: &str,
    ) -> (Option<String>, Option<String>) {
        let state = self.state();
        let Some(ingress) = state.ingresses.get(&(namespace.to_string(), name.to_string())) else {
            return (None, None);
        };
        let annotation = ingress
            .metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(INGRESS_CLASS_ANNOTATION))
            .cloned();
        let class_name = ingress
            .spec
            .as_ref()
            .and_then(|spec| spec.ingress_class_name.clone());
        (annotation, class_name)
    }

    /// Release records of a devbox in a namespace
    pub fn releases_of(&self, namespace: &str, devbox_name: &str) -> Vec<DevboxRelease> {
        self.state()
            .releases
            .iter()
            .filter(|((ns, _), release)| {
                ns == namespace && release.spec.devbox_name == devbox_name
            })
            .map(|(_, release)| release.clone())
            .collect()
    }
}

#[async_trait]
impl ClusterGateway for FakeCluster {
    async fn list_ingresses(
        &self,
        namespace: &str,
        label_selector: &str,
    ) -> Result<Vec<Ingress>, GatewayError> {
        let (key, value) = label_selector.split_once('=').unwrap_or((label_selector, ""));
        Ok(self
            .state()
            .ingresses
            .iter()
            .filter(|((ns, _), ingress)| {
                ns == namespace && ingress.labels().get(key).map(String::as_str) == Some(value)
            })
            .map(|(_, ingress)| ingress.clone())
            .collect())
    }

    async fn patch_ingress(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), GatewayError> {
        let mut state = self.state();
        if state.fail_ingress_patches {
            return Err(injected_failure("Ingress", name));
        }
        let ingress = state
            .ingresses
            .get_mut(&(namespace.to_string(), name.to_string()))
            .ok_or_else(|| not_found("Ingress", name))?;
        *ingress = merged(ingress, patch)?;
        Ok(())
    }

    async fn list_devboxes(&self, namespace: &str) -> Result<Vec<Devbox>, GatewayError> {
        Ok(self
            .state()
            .devboxes
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, devbox)| devbox.clone())
            .collect())
    }

    async fn patch_devbox(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), GatewayError> {
        let mut state = self.state();
        let key = (namespace.to_string(), name.to_string());
        let devbox = state.devboxes.get(&key).ok_or_else(|| not_found("Devbox", name))?;
        let patched: Devbox = merged(devbox, patch)?;

        if state.fail_resume && patched.spec.state == Some(DevboxState::Running) {
            return Err(injected_failure("Devbox", name));
        }
        if let Some(written) = patched.spec.state {
            state.devbox_writes.push((key.clone(), written));
        }
        state.devboxes.insert(key, patched);
        Ok(())
    }

    async fn list_releases(&self, namespace: &str) -> Result<Vec<DevboxRelease>, GatewayError> {
        let mut state = self.state();
        if state.fail_release_lists {
            return Err(injected_failure("DevboxRelease", namespace));
        }

        let State { releases, scripts, polls, .. } = &mut *state;
        let mut listed = Vec::new();
        for ((ns, name), release) in releases.iter_mut() {
            if ns != namespace {
                continue;
            }
            let script_key = (release.spec.devbox_name.clone(), release.spec.version.clone());
            if let Some(script) = scripts.get(&script_key) {
                let count = polls.entry((ns.clone(), name.clone())).or_insert(0);
                *count += 1;
                if *count >= script.after_polls {
                    release.status = Some(DevboxReleaseStatus { phase: Some(script.phase) });
                }
            }
            listed.push(release.clone());
        }
        Ok(listed)
    }

    async fn create_manifests(
        &self,
        namespace: &str,
        manifests: &[DynamicObject],
    ) -> Result<(), GatewayError> {
        let mut state = self.state();
        for manifest in manifests {
            let kind = manifest
                .types
                .as_ref()
                .map(|types| types.kind.as_str())
                .unwrap_or_default();
            if state.fail_creates {
                return Err(injected_failure(kind, &manifest.name_any()));
            }
            if kind != "DevboxRelease" {
                return Err(GatewayError::InvalidManifest(format!("unsupported kind '{}'", kind)));
            }
            let mut release: DevboxRelease = convert(manifest)?;
            let key = (namespace.to_string(), release.name_any());

            if state.releases.contains_key(&key) {
                return Err(GatewayError::Conflict {
                    kind: kind.to_string(),
                    name: key.1,
                });
            }

            state.created += 1;
            release.metadata.namespace = Some(namespace.to_string());
            release.metadata.uid = Some(format!("release-uid-{}", state.created));
            release.metadata.creation_timestamp = Some(timestamp(state.created as i64));
            state.releases.insert(key, release);
        }
        Ok(())
    }
}

fn not_found(kind: &str, name: &str) -> GatewayError {
    GatewayError::NotFound {
        kind: kind.to_string(),
        name: name.to_string(),
    }
}

fn injected_failure(kind: &str, name: &str) -> GatewayError {
    GatewayError::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message: format!("injected failure for {} '{}'", kind, name),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

fn convert<T: DeserializeOwned>(value: &impl Serialize) -> Result<T, GatewayError> {
    serde_json::to_value(value)
        .and_then(serde_json::from_value)
        .map_err(|e| GatewayError::InvalidManifest(e.to_string()))
}

/// JSON merge patch (RFC 7386) applied to a typed object
fn merged<T: Serialize + DeserializeOwned>(
    current: &T,
    patch: &serde_json::Value,
) -> Result<T, GatewayError> {
    let mut value =
        serde_json::to_value(current).map_err(|e| GatewayError::InvalidManifest(e.to_string()))?;
    merge_patch(&mut value, patch);
    serde_json::from_value(value).map_err(|e| GatewayError::InvalidManifest(e.to_string()))
}

fn merge_patch(target: &mut serde_json::Value, patch: &serde_json::Value) {
    let serde_json::Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = serde_json::Value::Object(Default::default());
    }
    if let serde_json::Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                let slot = target_map.entry(key.clone()).or_insert(serde_json::Value::Null);
                merge_patch(slot, value);
            }
        }
    }
}

fn timestamp(offset_secs: i64) -> Time {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
    Time(base + chrono::Duration::seconds(offset_secs))
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn devbox(name: &str, uid: &str, state: DevboxState) -> Devbox {
    let mut devbox = Devbox::new(name, DevboxSpec { state: Some(state) });
    devbox.metadata.uid = Some(uid.to_string());
    devbox
}

/// Ingress of `devbox_name` with an optional class annotation and class field
pub fn ingress(
    devbox_name: &str,
    name: &str,
    annotation: Option<&str>,
    class_name: Option<&str>,
) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                DEVBOX_LABEL_KEY.to_string(),
                devbox_name.to_string(),
            )])),
            annotations: annotation.map(|class| {
                BTreeMap::from([(INGRESS_CLASS_ANNOTATION.to_string(), class.to_string())])
            }),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            ingress_class_name: class_name.map(str::to_string),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Release record of `(devbox_name, tag)`, optionally owned by a devbox uid
pub fn release(
    devbox_name: &str,
    tag: &str,
    owner_uid: Option<&str>,
    phase: Option<ReleasePhase>,
) -> DevboxRelease {
    let mut release = DevboxRelease::new(
        &format!("{}-{}", devbox_name, tag),
        DevboxReleaseSpec {
            devbox_name: devbox_name.to_string(),
            version: tag.to_string(),
            notes: String::new(),
            start_devbox_after_release: false,
        },
    );
    release.metadata.owner_references = owner_uid.map(|uid| {
        vec![OwnerReference {
            api_version: format!("{}/{}", DEVBOX_GROUP, DEVBOX_VERSION),
            kind: "Devbox".to_string(),
            name: devbox_name.to_string(),
            uid: uid.to_string(),
            ..Default::default()
        }]
    });
    release.status = phase.map(|phase| DevboxReleaseStatus { phase: Some(phase) });
    release
}

/// Same as [`release`], with a creation time `offset_secs` after a fixed epoch
pub fn release_created_at(
    devbox_name: &str,
    tag: &str,
    owner_uid: Option<&str>,
    phase: Option<ReleasePhase>,
    offset_secs: i64,
) -> DevboxRelease {
    let mut release = release(devbox_name, tag, owner_uid, phase);
    release.metadata.creation_timestamp = Some(timestamp(offset_secs));
    release
}
