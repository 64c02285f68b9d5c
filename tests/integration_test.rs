// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Workspace-root integration tests: exercise the Lavis engine across crate
//! boundaries the way a single unit test inside one crate cannot — config
//! loading feeding `lavis-bootstrap::build`, then a couple of HTTP round
//! trips against the assembled router.

use lavis_config::{Config, ModelAliasConfig};
use tower::ServiceExt as _;

fn mock_config(tmp: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.store.dir = tmp.join("store").to_string_lossy().into_owned();
    config.skills.root = tmp.join("skills").to_string_lossy().into_owned();
    config.scheduler.enabled = false;
    config.models.aliases.insert(
        "default-chat".to_string(),
        ModelAliasConfig {
            provider: "mock".to_string(),
            ..Default::default()
        },
    );
    config
}

#[tokio::test]
async fn engine_builds_and_serves_status() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = lavis_bootstrap::build(mock_config(tmp.path()))
        .await
        .expect("engine should build from a fresh config");

    let response = engine
        .router
        .oneshot(
            axum::http::Request::builder()
                .uri("/api/agent/status")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .expect("status request should be handled");

    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

#[tokio::test]
async fn config_router_only_serves_api_key_routes() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = lavis_bootstrap::build(mock_config(tmp.path()))
        .await
        .expect("engine should build from a fresh config");

    let response = engine
        .config_router
        .clone()
        .oneshot(
            axum::http::Request::builder()
                .uri("/api/config/api-key")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .expect("api-key GET should be handled");
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    // Routes that belong to the main router must not leak onto the config
    // port's router.
    let response = engine
        .config_router
        .oneshot(
            axum::http::Request::builder()
                .uri("/api/agent/status")
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await
        .expect("request should complete, just unmatched");
    assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
}

#[test]
fn config_defaults_are_valid() {
    let cfg = Config::default();
    assert_eq!(cfg.http.port, 8080);
    assert_eq!(cfg.http.config_port, 18765);
    assert!(cfg.agent.max_milestones > 0);
    assert_eq!(cfg.skills.root, "~/.lavis/skills");
}

#[test]
fn cli_parses_serve_with_verbosity_and_config_path() {
    use clap::Parser;

    #[path = "../src/cli.rs"]
    mod cli;

    let cli = cli::Cli::parse_from(["lavisd", "-vv", "--config", "/tmp/lavis.yaml", "serve"]);
    assert_eq!(cli.verbose, 2);
    assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/lavis.yaml")));
    assert!(matches!(cli.command, Some(cli::Commands::Serve)));
}

#[test]
fn cli_defaults_to_no_subcommand() {
    use clap::Parser;

    #[path = "../src/cli.rs"]
    mod cli;

    let cli = cli::Cli::parse_from(["lavisd"]);
    assert!(cli.command.is_none());
}
