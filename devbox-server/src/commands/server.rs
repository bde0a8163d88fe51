use std::sync::Arc;

use anyhow::{Context, Result};
use devbox_orchestrations::k8s_client::get_k8s_client;
use devbox_orchestrations::{KubeGateway, ReleaseOrchestrator};

use crate::api::{start_server, AppState};
use crate::config::Config;

/// Serve the API until Ctrl+C
pub async fn run_server(port: Option<u16>) -> Result<()> {
    let config = Config::load()?;
    let port = port.unwrap_or(config.server_port);

    let client = get_k8s_client()
        .await
        .context("Failed to connect to Kubernetes")?;
    let gateway = KubeGateway::new(client);
    let namespace = config
        .namespace
        .clone()
        .unwrap_or_else(|| gateway.default_namespace().to_string());

    tracing::info!("Starting devbox release server");
    tracing::info!("  Namespace: {}", namespace);
    tracing::info!("  Registry: {}", config.registry_addr);
    tracing::info!(
        "  Release polling: every {:?}, up to {} attempts",
        config.release.poll_interval,
        config.release.max_poll_attempts
    );

    let state = AppState {
        orchestrator: ReleaseOrchestrator::new(Arc::new(gateway), config.release.clone()),
        namespace,
        registry: config.registry_addr.clone(),
    };

    let addr = format!("{}:{}", config.server_host, port);
    tracing::info!("  Press Ctrl+C to stop");
    start_server(&addr, state).await?;

    // Detached releases still in flight are abandoned here; the devbox keeps
    // whatever state the last completed step left it in.
    tracing::info!("Shutting down...");
    Ok(())
}
