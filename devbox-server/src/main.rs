use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cli;
mod commands;
mod config;

use cli::{Args, Mode};

/// Initialize tracing with two outputs:
/// 1. Console (stderr) for interactive use
/// 2. File (~/.devbox/server.log) so release outcomes survive the terminal
fn initialize_tracing() -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "info,\
         devbox_server=debug,\
         devbox_orchestrations=debug,\
         kube=info"
            .into()
    });

    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let devbox_dir = PathBuf::from(home).join(".devbox");
    std::fs::create_dir_all(&devbox_dir)?;

    let file_appender = tracing_appender::rolling::never(&devbox_dir, "server.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops file logging
    std::mem::forget(guard);

    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    initialize_tracing()?;

    match args.mode {
        Mode::Serve { port } => commands::server::run_server(port).await,
        Mode::Releases { name, output } => commands::release::run_list(name, output).await,
        Mode::Release {
            name,
            tag,
            description,
            start,
        } => commands::release::run_create(name, tag, description, start).await,
    }
}
