// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `UnifiedChatService` (C9): normalizes text/voice input, routes to the
//! fast or orchestrated path, and coordinates async TTS (spec §4.9).
//!
//! Grounded on the teacher's `agent_builder.rs`/`control::service` split
//! between "build the turn's model request" and "own the long-running
//! state the HTTP layer talks to" — generalized here into one service that
//! also implements the two capability seams lower crates expect from it:
//! [`lavis_runtime::SkillExecutor`] (`agent:`/`shell:` skill invocation) and
//! [`lavis_scheduler::CommandExecutor`] (cron-triggered invocation).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::warn;
use uuid::Uuid;

use lavis_actuator::SystemActuator;
use lavis_config::AgentConfig;
use lavis_core::{MicroExecutor, Plan, PlanStatus, ProgressSink, TaskOrchestrator};
use lavis_image::ScreenSource;
use lavis_model::{CompletionRequest, ContentPart, Message, ModelError, ModelGateway};
use lavis_runtime::{SkillExecutionOutcome, SkillExecutor, SkillInfo, SkillRegistry};
use lavis_scheduler::{CommandExecutor, CommandOutcome};
use lavis_tts::{AsyncTts, TtsGate};

use crate::push::PushBus;

/// Reply text and bookkeeping shared by the fast and orchestrated paths.
pub struct ChatReply {
    pub user_text: String,
    pub agent_text: String,
    pub request_id: String,
    pub audio_pending: bool,
    pub duration_ms: u64,
    pub orchestrator_state: Option<String>,
}

pub struct UnifiedChatService {
    gateway: Arc<ModelGateway>,
    actuator: Arc<dyn SystemActuator>,
    screen: Arc<dyn ScreenSource>,
    skills: Arc<SkillRegistry>,
    push: Arc<PushBus>,
    tts: Arc<AsyncTts>,
    tts_gate: Arc<TtsGate>,
    config: AgentConfig,
    interrupted: AtomicBool,
    active_plan: std::sync::Mutex<Option<Plan>>,
}

impl UnifiedChatService {
    pub fn new(
        gateway: Arc<ModelGateway>,
        actuator: Arc<dyn SystemActuator>,
        screen: Arc<dyn ScreenSource>,
        skills: Arc<SkillRegistry>,
        push: Arc<PushBus>,
        tts: Arc<AsyncTts>,
        tts_gate: Arc<TtsGate>,
        config: AgentConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            actuator,
            screen,
            skills,
            push,
            tts,
            tts_gate,
            config,
            interrupted: AtomicBool::new(false),
            active_plan: std::sync::Mutex::new(None),
        })
    }

    /// spec §4.9: `normalizeText`.
    pub async fn normalize_text(
        &self,
        text: &str,
        ws_session_id: Option<&str>,
        use_orchestrator: bool,
        needs_tts: bool,
    ) -> Result<ChatReply, ModelError> {
        self.interrupted.store(false, Ordering::Relaxed);
        let started = Instant::now();
        let request_id = Uuid::new_v4().to_string();
        let session_id = ws_session_id.unwrap_or(&request_id).to_string();

        let (agent_text, orchestrator_state) = if use_orchestrator {
            let plan = self.run_orchestrated(text, &session_id).await;
            let state = format!("{:?}", plan.status);
            let summary = plan
                .milestones
                .iter()
                .filter_map(|m| m.result_summary.clone())
                .collect::<Vec<_>>()
                .join("; ");
            *self.active_plan.lock().unwrap() = Some(plan);
            (if summary.is_empty() { "Task finished.".to_string() } else { summary }, Some(state))
        } else {
            (self.run_fast_path(text, None).await?, None)
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        let audio_pending = self
            .maybe_speak(&session_id, &request_id, &agent_text, needs_tts)
            .await;

        Ok(ChatReply {
            user_text: text.to_string(),
            agent_text,
            request_id,
            audio_pending,
            duration_ms,
            orchestrator_state,
        })
    }

    /// spec §4.9: `normalizeAudio`. Transcribes first, then defers to the
    /// text path; transcription failures are mapped to user-visible model
    /// error categories by the caller (spec §4.3), not swallowed here.
    pub async fn normalize_audio(
        &self,
        audio_bytes: Vec<u8>,
        mime: &str,
        ws_session_id: Option<&str>,
        use_orchestrator: bool,
        needs_tts: bool,
    ) -> Result<ChatReply, ModelError> {
        let text = self.gateway.stt("STT", audio_bytes, mime).await?;
        self.normalize_text(&text, ws_session_id, use_orchestrator, needs_tts).await
    }

    /// The "chat-with-screenshot" fast path: one decision call, no milestone
    /// bookkeeping. `extra_context` lets skill-knowledge injection
    /// (`agent:` skills without orchestration) prepend a knowledge block.
    async fn run_fast_path(&self, text: &str, extra_context: Option<&str>) -> Result<String, ModelError> {
        let frame = self.screen.capture_as_base64(true).ok();
        let mut parts = vec![ContentPart::text(format!(
            "User message: {text}\n\nRespond conversationally. If the user asks about their screen, describe what is visible in the attached screenshot."
        ))];
        if let Some(context) = extra_context {
            parts.push(ContentPart::text(format!("Relevant knowledge:\n{context}")));
        }
        if let Some(frame) = frame {
            parts.push(ContentPart::image(frame.into_data_url()));
        }
        let system_prompt = self.config.system_prompt.clone().unwrap_or_else(|| {
            "You are Lavis, a desktop assistant. Answer the user's message directly; only describe the screen when asked.".to_string()
        });
        let req = CompletionRequest {
            messages: vec![Message::system(system_prompt), Message::user_with_parts(parts)],
            ..Default::default()
        };
        self.gateway.chat("CHAT", req).await
    }

    async fn run_orchestrated(&self, goal: &str, session_id: &str) -> Plan {
        if self.interrupted.load(Ordering::Relaxed) {
            let mut plan = Plan::new(Uuid::new_v4().to_string(), goal, Vec::new());
            plan.status = PlanStatus::Cancelled;
            return plan;
        }
        let executor = MicroExecutor {
            screen: self.screen.clone(),
            actuator: self.actuator.clone(),
            gateway: self.gateway.clone(),
            model_alias: "CHAT".to_string(),
            progress: self.push.clone() as Arc<dyn ProgressSink>,
            session_id: session_id.to_string(),
        };
        let orchestrator = TaskOrchestrator::new(executor, session_id.to_string());
        let skills = self.skills.snapshot();
        orchestrator.run(goal, &skills).await
    }

    /// If `needs_tts`, asks `TtsGate` whether the reply merits speech and, if
    /// so, submits it to `AsyncTts` and reports `audio_pending=true`
    /// immediately without waiting for synthesis (spec §4.9).
    async fn maybe_speak(&self, session_id: &str, request_id: &str, reply: &str, needs_tts: bool) -> bool {
        if !needs_tts {
            return false;
        }
        if !self.tts_gate.needs_speech(reply).await {
            return false;
        }
        let target = if self.push.is_active(session_id) {
            session_id.to_string()
        } else if let Some(fallback) = self.push.first_active() {
            fallback
        } else {
            warn!(session_id, "no active push connection for tts reply");
            return false;
        };
        self.tts.generate_and_push(&target, request_id, reply).await;
        true
    }

    /// Best-effort cancellation flag for `/api/agent/stop`; checked before
    /// starting the next milestone of a subsequent orchestrated run.
    pub fn stop(&self) {
        self.interrupted.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        *self.active_plan.lock().unwrap() = None;
        self.interrupted.store(false, Ordering::Relaxed);
    }

    pub fn status(&self) -> (bool, Option<String>, Option<u8>) {
        let plan = self.active_plan.lock().unwrap();
        match plan.as_ref() {
            Some(p) => {
                let total = p.milestones.len().max(1);
                let done = p
                    .milestones
                    .iter()
                    .filter(|m| m.is_terminal())
                    .count();
                let progress = ((done * 100) / total) as u8;
                (true, Some(format!("{:?}", p.status)), Some(progress))
            }
            None => (true, None, None),
        }
    }

    pub fn current_plan(&self) -> Option<Plan> {
        self.active_plan.lock().unwrap().clone()
    }
}

#[async_trait]
impl SkillExecutor for UnifiedChatService {
    async fn run_shell(&self, _skill: &SkillInfo, command: &str) -> SkillExecutionOutcome {
        match self.actuator.shell_exec(command, None).await {
            Ok(report) => SkillExecutionOutcome { success: report.success, output: report.output },
            Err(e) => SkillExecutionOutcome { success: false, output: e.to_string() },
        }
    }

    async fn run_agent(
        &self,
        _skill: &SkillInfo,
        goal: &str,
        knowledge: &str,
    ) -> Option<SkillExecutionOutcome> {
        match self.run_fast_path(goal, Some(knowledge)).await {
            Ok(text) => Some(SkillExecutionOutcome { success: true, output: text }),
            Err(e) => Some(SkillExecutionOutcome { success: false, output: e.to_string() }),
        }
    }
}

#[async_trait]
impl CommandExecutor for UnifiedChatService {
    async fn run_shell(&self, command: &str) -> CommandOutcome {
        match self.actuator.shell_exec(command, None).await {
            Ok(report) if report.success => CommandOutcome::Success(report.output),
            Ok(report) => CommandOutcome::Failed(report.output),
            Err(e) => CommandOutcome::Error(e.to_string()),
        }
    }

    async fn run_agent(&self, goal: &str) -> CommandOutcome {
        let session_id = format!("scheduler-{}", Uuid::new_v4());
        let plan = self.run_orchestrated(goal, &session_id).await;
        match plan.status {
            PlanStatus::Completed => CommandOutcome::Success(format!("{:?}", plan.status)),
            PlanStatus::Failed => CommandOutcome::Failed(format!("{:?}", plan.status)),
            _ => CommandOutcome::Error(format!("{:?}", plan.status)),
        }
    }
}
