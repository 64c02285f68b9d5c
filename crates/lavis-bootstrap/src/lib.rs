// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Composition root for the Lavis desktop-assistant engine.
//!
//! Every lower crate (`lavis-model`, `lavis-image`, `lavis-actuator`,
//! `lavis-store`, `lavis-runtime`, `lavis-tts`, `lavis-scheduler`,
//! `lavis-node`) exposes its piece of the system behind a trait or a plain
//! constructor and stays ignorant of its siblings. [`build`] is the one
//! place that instantiates the concrete types, plugs the capability seams
//! together (`UnifiedChatService` as both `SkillExecutor` and
//! `CommandExecutor`; `PushBus` as both `ProgressSink` and `TtsPushSink`),
//! and hands back a ready-to-serve [`Engine`].
//!
//! Grounded on the teacher's `AgentBuilder` (`agent.rs`, now removed): "one
//! entry point that owns wiring so frontends don't inline their own
//! construction loop" — generalized here from wiring one `Agent` out of a
//! tool registry to wiring the whole Lavis engine out of its components.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use lavis_actuator::{EnigoActuator, SystemActuator};
use lavis_config::Config;
use lavis_core::ProgressSink;
use lavis_image::{ScreenSource, XcapScreenSource};
use lavis_model::ModelGateway;
use lavis_node::{AppState, PushBus, Router, UnifiedChatService};
use lavis_runtime::SkillRegistry;
use lavis_scheduler::{CommandExecutor, Scheduler};
use lavis_store::PersistentStore;
use lavis_tts::{AsyncTts, TtsGate, TtsPushSink};

const TTS_ALIAS: &str = "TTS";

/// Every long-lived handle the running engine holds, plus the axum router
/// built from them. Dropping `Engine` drops the `Scheduler`'s background
/// jobs and `AsyncTts`'s worker pool along with it (both hold their state
/// behind `Arc`s owned here or by `AppState`, not detached globals).
pub struct Engine {
    pub chat: Arc<UnifiedChatService>,
    pub push: Arc<PushBus>,
    pub skills: Arc<SkillRegistry>,
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<PersistentStore>,
    pub gateway: Arc<ModelGateway>,
    pub config: Config,
    /// Main API surface (spec §6) — meant for `http.port`, may be
    /// network-exposed.
    pub router: Router,
    /// API-key endpoints only (spec §8) — meant for `http.config_port`,
    /// bound to `127.0.0.1` only by the frontend that serves it.
    pub config_router: Router,
}

/// Expand a leading `~` in a config path and return it as an owned
/// [`PathBuf`]. Config paths (`store.dir`, `skills.root`) are authored as
/// `~/.lavis/...` for readability; nothing downstream should have to know
/// that convention.
fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// Build every component named in SPEC_FULL.md and wire them into one
/// [`Engine`]. Call once at process startup; the returned `router` is ready
/// to hand to an HTTP server.
pub async fn build(config: Config) -> Result<Engine> {
    let store_dir = expand_path(&config.store.dir);
    std::fs::create_dir_all(&store_dir)
        .with_context(|| format!("creating store directory {}", store_dir.display()))?;
    let store = Arc::new(
        PersistentStore::open(&store_dir.join("lavis.sqlite3"))
            .context("opening persistent store")?,
    );
    info!(dir = %store_dir.display(), "persistent store open");

    let gateway = Arc::new(ModelGateway::new(config.models.clone()));

    let actuator: Arc<dyn SystemActuator> =
        Arc::new(EnigoActuator::new(config.actuator.clone()).context("initializing actuator")?);

    let screen: Arc<dyn ScreenSource> = Arc::new(XcapScreenSource);

    let skills_root = expand_path(&config.skills.root);
    let project_root = if skills_root.is_dir() { Some(skills_root) } else { None };
    let skills = SkillRegistry::spawn_watching(project_root, Some(store.clone()));

    let push = PushBus::new();

    let tts = AsyncTts::spawn(
        gateway.clone(),
        push.clone() as Arc<dyn TtsPushSink>,
        TTS_ALIAS.to_string(),
        config.push.tts_worker_pool_size,
        config.push.connection_queue_capacity,
    );
    let tts_gate = Arc::new(TtsGate::new(gateway.clone()));

    let chat = UnifiedChatService::new(
        gateway.clone(),
        actuator.clone(),
        screen.clone(),
        skills.clone(),
        push.clone(),
        tts,
        tts_gate,
        config.agent.clone(),
    );

    let backup_dir = store_dir.join("backups");
    std::fs::create_dir_all(&backup_dir)
        .with_context(|| format!("creating backup directory {}", backup_dir.display()))?;
    let scheduler = Scheduler::spawn(
        store.clone(),
        chat.clone() as Arc<dyn CommandExecutor>,
        config.scheduler.clone(),
        backup_dir,
    )
    .context("starting scheduler")?;

    // `PushBus` satisfies `lavis_core::ProgressSink` too (checked by the
    // orchestrated path inside `UnifiedChatService::run_orchestrated`);
    // asserted here so a future signature drift on either trait fails
    // composition instead of a runtime surprise.
    let _: Arc<dyn ProgressSink> = push.clone();

    let state = AppState {
        chat: chat.clone(),
        push: push.clone(),
        skills: skills.clone(),
        scheduler: scheduler.clone(),
        store: store.clone(),
        gateway: gateway.clone(),
        screen,
        actuator,
    };
    let router = lavis_node::router(state.clone());
    let config_router = lavis_node::config_router(state);

    Ok(Engine { chat, push, skills, scheduler, store, gateway, config, router, config_router })
}

/// Convenience for callers that only need a `Config` loaded from the usual
/// search path plus an optional explicit override (`--config`).
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    lavis_config::load(explicit)
}

// Re-exported so callers of this crate don't need a direct `lavis-node`
// dependency just to name these types in their own signatures.
pub use lavis_node::{ChatReply, GatewayError};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn build_wires_a_servable_engine_with_in_memory_dependencies() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.store.dir = tmp.path().join("store").to_string_lossy().into_owned();
        config.skills.root = tmp.path().join("skills").to_string_lossy().into_owned();
        config.scheduler.enabled = false;
        config.models.aliases.insert(
            "default-chat".to_string(),
            lavis_config::ModelAliasConfig {
                provider: "mock".to_string(),
                ..Default::default()
            },
        );

        let engine = build(config).await.expect("engine should build from a fresh config");
        assert_eq!(engine.push.count(), 0);
        assert!(engine.store.list_tasks().unwrap().is_empty());
    }
}
