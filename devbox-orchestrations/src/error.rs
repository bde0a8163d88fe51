//! Error types for the release control plane

use thiserror::Error;

/// Failure reported by a [`crate::k8s_client::ClusterGateway`]
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{kind} '{name}' already exists")]
    Conflict { kind: String, name: String },

    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("cluster API request failed: {0}")]
    Kube(#[from] kube::Error),
}

impl GatewayError {
    /// Wrap a kube error, surfacing 404/409 responses with the resource they concern
    pub fn from_kube(err: kube::Error, kind: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(response) if response.code == 409 => GatewayError::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(response) if response.code == 404 => GatewayError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            other => GatewayError::Kube(other),
        }
    }
}

/// Failure while rendering a release manifest
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to render template: {0}")]
    Template(#[from] tera::Error),

    #[error("rendered manifest is not valid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// How a [`ReleaseError`] should be reported to a synchronous caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    NotFound,
    Conflict,
    Internal,
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("invalid devbox name '{0}'")]
    InvalidName(String),

    #[error("invalid release request: {0}")]
    InvalidRequest(String),

    #[error("devbox '{0}' not found")]
    DevboxNotFound(String),

    #[error("release '{tag}' already exists for devbox '{devbox}'")]
    TagConflict { devbox: String, tag: String },

    #[error("release '{tag}' of devbox '{devbox}' failed")]
    ReleaseFailed { devbox: String, tag: String },

    #[error("release '{tag}' of devbox '{devbox}' did not finish after {attempts} polls")]
    Timeout { devbox: String, tag: String, attempts: u32 },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl ReleaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReleaseError::InvalidName(_) | ReleaseError::InvalidRequest(_) => {
                ErrorKind::InvalidRequest
            }
            ReleaseError::DevboxNotFound(_) => ErrorKind::NotFound,
            ReleaseError::TagConflict { .. } => ErrorKind::Conflict,
            ReleaseError::ReleaseFailed { .. }
            | ReleaseError::Timeout { .. }
            | ReleaseError::Manifest(_)
            | ReleaseError::Gateway(_) => ErrorKind::Internal,
        }
    }
}
