//! Name constants for devbox resources
//!
//! Everything the control plane reads or writes on the cluster is addressed
//! through these constants so the wire names live in one place.

pub use devbox_models::{DEVBOX_GROUP, DEVBOX_VERSION};

/// Resource plurals under [`DEVBOX_GROUP`]
pub mod plurals {
    pub const DEVBOXES: &str = "devboxes";
    pub const RELEASES: &str = "devboxreleases";
}

/// Label carried by every ingress (and release record) belonging to a devbox
pub const DEVBOX_LABEL_KEY: &str = "cloud.sealos.io/devbox-manager";

/// Legacy annotation holding the ingress class
pub const INGRESS_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";

/// Traffic classes
pub mod ingress_classes {
    /// Serves external traffic
    pub const PUBLIC: &str = "nginx";
    /// Routed to the holding page while the devbox is offline
    pub const PAUSED: &str = "pause";
}

/// Maximum length of a devbox name (DNS-1123 label)
pub const MAX_DEVBOX_NAME_LENGTH: usize = 63;

/// Maximum length of an object name (DNS-1123 subdomain)
pub const MAX_OBJECT_NAME_LENGTH: usize = 253;

/// Label selector matching every ingress owned by a devbox
pub fn devbox_label_selector(devbox_name: &str) -> String {
    format!("{}={}", DEVBOX_LABEL_KEY, devbox_name)
}

/// Object name of the release record for `(devbox_name, tag)`
pub fn release_resource_name(devbox_name: &str, tag: &str) -> String {
    format!("{}-{}", devbox_name, tag)
}

/// Image reference produced by a release
pub fn release_image(registry: &str, namespace: &str, devbox_name: &str, tag: &str) -> String {
    format!("{}/{}/{}:{}", registry.trim_end_matches('/'), namespace, devbox_name, tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_image() {
        assert_eq!(
            release_image("hub.example.io", "ns-dev", "demo", "v1"),
            "hub.example.io/ns-dev/demo:v1"
        );
        assert_eq!(
            release_image("hub.example.io/", "ns-dev", "demo", "v1"),
            "hub.example.io/ns-dev/demo:v1"
        );
    }

    #[test]
    fn test_selector_and_resource_name() {
        assert_eq!(devbox_label_selector("demo"), "cloud.sealos.io/devbox-manager=demo");
        assert_eq!(release_resource_name("demo", "v1.2"), "demo-v1.2");
    }
}
