// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `SkillRegistry`: the live, hot-reloadable collection of discovered skills
//! (spec component C6).
//!
//! This module owns discovery, parsing, `ToolSchema` derivation, command-
//! template resolution, and persistence bookkeeping. It deliberately does
//! **not** depend on `lavis-actuator` or `lavis-core` to actually run
//! `shell:`/`agent:` commands — that would pull the engine's own dependents
//! back into a low crate in the graph. Instead [`SkillRegistry::execute`]
//! resolves a skill's command template and hands the resolved string to a
//! caller-supplied [`SkillExecutor`], mirroring the `TtsPushSink` seam used by
//! `lavis-tts` to stay decoupled from `lavis-node`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{error, warn};

use lavis_model::ToolSchema;
use lavis_store::{PersistentStore, SkillRow, StoreError};

use crate::shared::Shared;
use crate::skills::{discover_skills, SharedSkills, SkillInfo};

/// Outcome of executing a skill's resolved command template.
#[derive(Debug, Clone)]
pub struct SkillExecutionOutcome {
    pub success: bool,
    pub output: String,
}

/// Executes a skill's resolved `shell:`/`agent:` command.
///
/// Implemented by a higher-level crate that actually owns `SystemActuator`
/// (for `shell:`) and the chat/turn machinery (for `agent:`). `SkillRegistry`
/// only resolves the template; it never runs anything itself.
#[async_trait]
pub trait SkillExecutor: Send + Sync {
    async fn run_shell(&self, skill: &SkillInfo, command: &str) -> SkillExecutionOutcome;

    /// Run an `agent:` skill. `goal` is the resolved goal template; `knowledge`
    /// is the SKILL.md body, handed to the caller as context to inject into
    /// the spawned turn. Returns `None` when the caller has no context-
    /// injection path configured — in that case [`SkillRegistry::execute`]
    /// falls back to returning the composed knowledge payload unexecuted.
    async fn run_agent(
        &self,
        skill: &SkillInfo,
        goal: &str,
        knowledge: &str,
    ) -> Option<SkillExecutionOutcome>;
}

/// Errors that can arise while executing a skill.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("skill {0:?} not found")]
    NotFound(String),
    #[error("skill {0:?} has no invocation template; it is a knowledge-only skill")]
    NoInvocation(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// The live, hot-reloadable skill registry.
///
/// Holds an immutable snapshot ([`SharedSkills`]) that is atomically replaced
/// whenever the underlying skill directories change. Readers (the prompt
/// builder, the tool dispatcher) always see a consistent point-in-time view
/// via [`SkillRegistry::snapshot`].
pub struct SkillRegistry {
    skills: SharedSkills,
    project_root: Option<PathBuf>,
    store: Option<Arc<PersistentStore>>,
    // Keeps the filesystem watcher alive for the registry's lifetime. Dropped
    // (and the watch torn down) when the registry is dropped.
    _watcher: Mutex<Option<RecommendedWatcher>>,
}

impl SkillRegistry {
    /// Discover skills once and persist them to `store` (if given), without
    /// starting a filesystem watcher.
    pub fn load(project_root: Option<PathBuf>, store: Option<Arc<PersistentStore>>) -> Arc<Self> {
        let skills = Shared::new(discover_skills(project_root.as_deref()));
        let registry = Arc::new(Self {
            skills,
            project_root,
            store,
            _watcher: Mutex::new(None),
        });
        registry.persist_all();
        registry
    }

    /// Like [`Self::load`], but also starts a recursive filesystem watcher
    /// over every ancestor directory's `skills/` config dirs so that editing,
    /// adding, or removing a `SKILL.md` (or creating a brand-new skill
    /// subdirectory) republishes a fresh snapshot without a restart.
    ///
    /// Watch failures (e.g. a config directory that doesn't exist yet) are
    /// logged and skipped rather than treated as fatal — skills under
    /// directories created after startup are picked up on the next reload
    /// triggered by a sibling directory's watch event, or the next explicit
    /// [`Self::refresh`] call.
    pub fn spawn_watching(
        project_root: Option<PathBuf>,
        store: Option<Arc<PersistentStore>>,
    ) -> Arc<Self> {
        let registry = Self::load(project_root, store);
        registry.start_watcher();
        registry
    }

    fn start_watcher(self: &Arc<Self>) {
        let this = self.clone();
        let (tx, rx) = std::sync::mpsc::channel();
        let mut watcher = match notify::recommended_watcher(move |res| {
            let _ = tx.send(res);
        }) {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, "failed to create skill directory watcher");
                return;
            }
        };

        for dir in this.watch_roots() {
            if dir.is_dir() {
                if let Err(e) = watcher.watch(&dir, RecursiveMode::Recursive) {
                    warn!(dir = %dir.display(), error = %e, "failed to watch skills directory");
                }
            }
        }

        *self._watcher.lock().unwrap() = Some(watcher);

        std::thread::spawn(move || {
            for res in rx {
                match res {
                    Ok(_event) => this.refresh(),
                    Err(e) => error!(error = %e, "skill directory watch error"),
                }
            }
        });
    }

    /// Every `skills/` config directory that could plausibly hold a skill,
    /// across the same ancestor-walk precedence order used by discovery.
    fn watch_roots(&self) -> Vec<PathBuf> {
        crate::skills::build_sorted_search_dirs(self.project_root.as_deref())
            .into_iter()
            .flat_map(|dir| {
                [".agents", ".claude", ".codex", ".cursor", ".sven"]
                    .into_iter()
                    .map(move |cfg| dir.join(cfg).join("skills"))
            })
            .collect()
    }

    /// Re-run discovery and atomically replace the published snapshot,
    /// upserting every discovered skill into the persistent store.
    pub fn refresh(&self) {
        self.skills.refresh(self.project_root.as_deref());
        self.persist_all();
    }

    /// The current immutable snapshot of discovered skills.
    pub fn snapshot(&self) -> Arc<[SkillInfo]> {
        self.skills.get()
    }

    /// Look up one skill by its canonical snake_case tool name
    /// (case-insensitive), not by its slash-command path.
    pub fn find_by_tool_name(&self, tool_name: &str) -> Option<SkillInfo> {
        self.snapshot()
            .iter()
            .find(|s| s.tool_name().eq_ignore_ascii_case(tool_name))
            .cloned()
    }

    /// Derive a [`ToolSchema`] for every skill that has an invocation
    /// template (knowledge-only skills are not exposed as callable tools).
    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.snapshot()
            .iter()
            .filter(|s| s.invocation.is_some())
            .map(SkillInfo::to_tool_schema)
            .collect()
    }

    /// Execute a skill by tool name: resolve its `shell:`/`agent:` template
    /// against `args` and dispatch through `executor`, then record the use.
    ///
    /// `shell:` commands are always dispatched to `executor.run_shell`.
    /// `agent:` commands are dispatched to `executor.run_agent`, which may
    /// decline to run them (no context-injection callback configured); in
    /// that case the composed knowledge payload (goal + SKILL.md body) is
    /// returned instead, matching the spec's context-injection fallback.
    pub async fn execute(
        &self,
        tool_name: &str,
        args: &std::collections::HashMap<String, String>,
        executor: &dyn SkillExecutor,
    ) -> Result<SkillExecutionOutcome, SkillError> {
        let skill = self
            .find_by_tool_name(tool_name)
            .ok_or_else(|| SkillError::NotFound(tool_name.to_string()))?;

        let resolved = skill
            .resolve_command(args)
            .ok_or_else(|| SkillError::NoInvocation(tool_name.to_string()))?;

        let outcome = if let Some(cmd) = resolved.strip_prefix("shell:") {
            executor.run_shell(&skill, cmd).await
        } else if let Some(goal) = resolved.strip_prefix("agent:") {
            match executor.run_agent(&skill, goal, &skill.content).await {
                Some(outcome) => outcome,
                None => SkillExecutionOutcome {
                    success: true,
                    output: format!("{}\n\n{}", goal, skill.content),
                },
            }
        } else {
            SkillExecutionOutcome {
                success: false,
                output: format!("unrecognised command prefix in {resolved:?}"),
            }
        };

        self.record_use(&skill.tool_name());
        Ok(outcome)
    }

    fn persist_all(&self) {
        let Some(store) = &self.store else { return };
        for skill in self.snapshot().iter() {
            let mut row = SkillRow::new(skill.tool_name(), skill.description.clone());
            row.category = skill.category.clone();
            row.version = skill.version.clone();
            row.author = skill.author.clone();
            if let Err(e) = store.upsert_skill(&row) {
                warn!(skill = %skill.tool_name(), error = %e, "failed to upsert skill");
            }
        }
    }

    fn record_use(&self, tool_name: &str) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.record_skill_use(tool_name) {
            warn!(skill = tool_name, error = %e, "failed to record skill use");
        }
    }
}
