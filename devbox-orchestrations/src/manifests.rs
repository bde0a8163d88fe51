//! Release manifest rendering

use kube::api::DynamicObject;
use tera::{Context as TeraContext, Tera};

use crate::error::ManifestError;
use crate::names::{release_resource_name, DEVBOX_GROUP, DEVBOX_LABEL_KEY, DEVBOX_VERSION};

const RELEASE_TEMPLATE_NAME: &str = "devbox-release.yaml";
const RELEASE_TEMPLATE: &str = include_str!("../templates/devbox-release.yaml");

/// Inputs of a `DevboxRelease` manifest
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseManifest<'a> {
    pub namespace: &'a str,
    pub devbox_name: &'a str,
    /// Owner reference target; omitted from the manifest when unknown
    pub devbox_uid: Option<&'a str>,
    pub tag: &'a str,
    pub notes: &'a str,
}

impl ReleaseManifest<'_> {
    /// Render to YAML.
    ///
    /// `startDevboxAfterRelease` is always false: restoring the devbox is the
    /// orchestrator's job, never the reconciler's.
    pub fn render_yaml(&self) -> Result<String, ManifestError> {
        let mut tera = Tera::default();
        tera.add_raw_template(RELEASE_TEMPLATE_NAME, RELEASE_TEMPLATE)?;

        let mut ctx = TeraContext::new();
        ctx.insert("api_version", &format!("{}/{}", DEVBOX_GROUP, DEVBOX_VERSION));
        ctx.insert("name", &release_resource_name(self.devbox_name, self.tag));
        ctx.insert("namespace", self.namespace);
        ctx.insert("label_key", DEVBOX_LABEL_KEY);
        ctx.insert("devbox_name", self.devbox_name);
        ctx.insert("devbox_uid", &self.devbox_uid.filter(|uid| !uid.is_empty()));
        ctx.insert("tag", self.tag);
        ctx.insert("notes", self.notes);

        Ok(tera.render(RELEASE_TEMPLATE_NAME, &ctx)?)
    }

    pub fn render(&self) -> Result<DynamicObject, ManifestError> {
        let yaml = self.render_yaml()?;
        Ok(serde_yaml::from_str(&yaml)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devbox_models::DevboxRelease;

    #[test]
    fn test_render_release_manifest() {
        let manifest = ReleaseManifest {
            namespace: "ns-dev",
            devbox_name: "demo",
            devbox_uid: Some("1234-abcd"),
            tag: "v1",
            notes: "first release",
        }
        .render()
        .unwrap();

        let types = manifest.types.as_ref().unwrap();
        assert_eq!(types.api_version, "devbox.sealos.io/v1alpha2");
        assert_eq!(types.kind, "DevboxRelease");
        assert_eq!(manifest.metadata.name.as_deref(), Some("demo-v1"));
        assert_eq!(manifest.metadata.namespace.as_deref(), Some("ns-dev"));
        assert_eq!(
            manifest.metadata.labels.as_ref().unwrap()["cloud.sealos.io/devbox-manager"],
            "demo"
        );

        let owners = manifest.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners.len(), 1);
        assert_eq!(owners[0].kind, "Devbox");
        assert_eq!(owners[0].uid, "1234-abcd");

        assert_eq!(manifest.data["spec"]["devboxName"], "demo");
        assert_eq!(manifest.data["spec"]["version"], "v1");
        assert_eq!(manifest.data["spec"]["notes"], "first release");
        assert_eq!(manifest.data["spec"]["startDevboxAfterRelease"], false);
    }

    #[test]
    fn test_render_without_owner_reference() {
        let manifest = ReleaseManifest {
            namespace: "ns-dev",
            devbox_name: "demo",
            devbox_uid: None,
            tag: "v1",
            notes: "",
        }
        .render()
        .unwrap();

        assert!(manifest.metadata.owner_references.is_none());
    }

    #[test]
    fn test_notes_and_numeric_values_stay_strings() {
        let manifest = ReleaseManifest {
            namespace: "ns-dev",
            devbox_name: "123",
            devbox_uid: Some(""),
            tag: "1.0",
            notes: "line one\nkey: value # not a comment\n\"quoted\"",
        }
        .render()
        .unwrap();

        assert!(manifest.metadata.owner_references.is_none());
        assert_eq!(manifest.data["spec"]["devboxName"], "123");
        assert_eq!(manifest.data["spec"]["version"], "1.0");
        assert_eq!(
            manifest.data["spec"]["notes"],
            "line one\nkey: value # not a comment\n\"quoted\""
        );

        // The manifest is also a valid typed release record
        let value = serde_json::to_value(&manifest).unwrap();
        let typed: DevboxRelease = serde_json::from_value(value).unwrap();
        assert_eq!(typed.spec.version, "1.0");
        assert!(!typed.spec.start_devbox_after_release);
    }
}
