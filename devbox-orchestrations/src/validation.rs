//! Request validation: devbox name syntax, tag syntax and tag uniqueness

use devbox_models::{CreateReleaseRequest, DevboxRelease};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{GatewayError, ReleaseError};
use crate::k8s_client::ClusterGateway;
use crate::names::{release_resource_name, MAX_DEVBOX_NAME_LENGTH, MAX_OBJECT_NAME_LENGTH};

static DEVBOX_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("devbox name pattern is valid")
});

// A tag is both an image tag and a suffix of the release object name
static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-.a-z0-9]*[a-z0-9])?$").expect("tag pattern is valid")
});

/// DNS-1123 label check used for every devbox name coming from a caller
pub fn is_valid_devbox_name(name: &str) -> bool {
    name.len() <= MAX_DEVBOX_NAME_LENGTH && DEVBOX_NAME_PATTERN.is_match(name)
}

pub fn validate_tag(devbox_name: &str, tag: &str) -> Result<(), ReleaseError> {
    if tag.is_empty() {
        return Err(ReleaseError::InvalidRequest("tag must not be empty".to_string()));
    }
    if !TAG_PATTERN.is_match(tag) {
        return Err(ReleaseError::InvalidRequest(format!(
            "tag '{}' must consist of lowercase alphanumerics, '-' or '.', \
             and start and end with an alphanumeric",
            tag
        )));
    }
    if release_resource_name(devbox_name, tag).len() > MAX_OBJECT_NAME_LENGTH {
        return Err(ReleaseError::InvalidRequest(format!("tag '{}' is too long", tag)));
    }
    Ok(())
}

/// Validate a release request against a devbox name, before any cluster call
pub fn validate_release_request(
    devbox_name: &str,
    request: &CreateReleaseRequest,
) -> Result<(), ReleaseError> {
    if !is_valid_devbox_name(devbox_name) {
        return Err(ReleaseError::InvalidName(devbox_name.to_string()));
    }
    validate_tag(devbox_name, &request.tag)
}

/// Whether `(devbox_name, tag)` can no longer be released: a record for the
/// pair exists, or another record already holds its object name (`a-b` + `c`
/// and `a` + `b-c` both name `a-b-c`).
pub fn tag_exists(releases: &[DevboxRelease], devbox_name: &str, tag: &str) -> bool {
    let object_name = release_resource_name(devbox_name, tag);
    releases.iter().any(|release| {
        (release.spec.devbox_name == devbox_name && release.spec.version == tag)
            || release.metadata.name.as_deref() == Some(object_name.as_str())
    })
}

/// [`tag_exists`] against the current release records of a namespace
pub async fn tag_exists_in_cluster(
    gateway: &dyn ClusterGateway,
    namespace: &str,
    devbox_name: &str,
    tag: &str,
) -> Result<bool, GatewayError> {
    let releases = gateway.list_releases(namespace).await?;
    Ok(tag_exists(&releases, devbox_name, tag))
}
