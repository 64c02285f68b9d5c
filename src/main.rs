// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `lavisd`: process entry point. Parses [`cli::Cli`], loads configuration
//! via `lavis_bootstrap::load_config`, and either serves the engine built by
//! `lavis_bootstrap::build` or runs one of the operational subcommands.

mod cli;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_serve(cli.config.as_deref()).await,
        Commands::ShowConfig => show_config(cli.config.as_deref()),
        Commands::Completions { shell } => {
            cli::print_completions(shell);
            Ok(())
        }
    }
}

async fn run_serve(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = lavis_bootstrap::load_config(config_path).context("loading configuration")?;
    let http_port = config.http.port;
    let config_port = config.http.config_port;

    let engine = lavis_bootstrap::build(config)
        .await
        .context("building Lavis engine")?;

    let main_addr = SocketAddr::from(([0, 0, 0, 0], http_port));
    let main_listener = tokio::net::TcpListener::bind(main_addr)
        .await
        .with_context(|| format!("binding main API port {main_addr}"))?;
    tracing::info!(addr = %main_addr, "lavis API listening");

    let config_addr = SocketAddr::from(([127, 0, 0, 1], config_port));
    let config_listener = tokio::net::TcpListener::bind(config_addr)
        .await
        .with_context(|| format!("binding loopback config port {config_addr}"))?;
    tracing::info!(addr = %config_addr, "lavis config API listening (loopback only)");

    let main_server = axum::serve(main_listener, engine.router).with_graceful_shutdown(shutdown_signal());
    let config_server =
        axum::serve(config_listener, engine.config_router).with_graceful_shutdown(shutdown_signal());

    tokio::try_join!(
        async { main_server.await.context("main API server") },
        async { config_server.await.context("config API server") },
    )?;
    Ok(())
}

fn show_config(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = lavis_bootstrap::load_config(config_path).context("loading configuration")?;
    let yaml = serde_yaml::to_string(&config).context("serializing configuration")?;
    print!("{yaml}");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}

/// `EnvFilter::from_default_env()` with a `lavis=info` default, per
/// SPEC_FULL.md's logging section — `-v`/`-vv` raise the default crate
/// filter without needing `RUST_LOG` set.
fn init_logging(verbosity: u8) {
    let default_directive = match verbosity {
        0 => "lavis=info",
        1 => "lavis=debug",
        _ => "lavis=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
}
