//! Devbox Orchestrations - release workflow for devboxes on Kubernetes
//!
//! A release takes a devbox offline, submits a `DevboxRelease` record for the
//! in-cluster reconciler to build, waits for the build to finish and brings
//! the devbox back. Everything touching the cluster goes through
//! [`ClusterGateway`], so the workflow runs unchanged against [`KubeGateway`]
//! or an in-memory cluster.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use devbox_models::CreateReleaseRequest;
//! use devbox_orchestrations::k8s_client::get_k8s_client;
//! use devbox_orchestrations::{KubeGateway, ReleaseOrchestrator, ReleaseSettings};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let gateway = Arc::new(KubeGateway::new(get_k8s_client().await?));
//! let orchestrator = ReleaseOrchestrator::new(gateway, ReleaseSettings::default());
//!
//! let request = CreateReleaseRequest {
//!     tag: "v1".to_string(),
//!     release_des: "first release".to_string(),
//!     start_devbox_after_release: true,
//! };
//! let plan = orchestrator.prepare("ns-dev", "demo", &request).await?;
//! orchestrator.spawn(plan);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod k8s_client;
pub mod manifests;
pub mod names;
pub mod orchestrations;
pub mod query;
pub mod traffic;
pub mod types;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export key types for convenience
pub use error::{ErrorKind, GatewayError, ManifestError, ReleaseError};
pub use k8s_client::{ClusterGateway, KubeGateway};
pub use orchestrations::release::ReleaseOrchestrator;
pub use types::*;
