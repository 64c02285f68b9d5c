// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Progress event catalog emitted by `MicroExecutor`/`TaskOrchestrator` on
//! `PushBus` (spec §4.11), and the `ProgressSink` seam that delivers them.
//!
//! `lavis-core` sits below `lavis-node` (which owns `PushBus`) in the crate
//! graph, so it cannot depend on it directly. This mirrors the
//! `TtsPushSink` trait `lavis-tts` defines for the same reason: the low
//! crate declares the capability trait, the higher crate (`lavis-node`)
//! implements it, and `lavis-bootstrap` wires the two together.

use async_trait::async_trait;

use crate::types::PostMortem;

#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Thinking { context: String },
    ActionExecuted { action_type: String, description: String, success: bool },
    IterationProgress { current: u32, max: u32, intent: String },
    HideWindow { reason: String },
    ShowWindow { reason: String },
    PlanCreated { plan_id: String, goal: String, steps: Vec<String>, total_steps: usize },
    StepStarted { plan_id: String, step_id: String, description: String, step_type: Option<String>, progress: u8 },
    StepCompleted { plan_id: String, step_id: String, status: String, result_summary: String, progress: u8, execution_ms: u64 },
    StepFailed { plan_id: String, step_id: String, post_mortem: PostMortem, progress: u8 },
    PlanCompleted { plan_id: String, status: String, progress: u8 },
    PlanFailed { plan_id: String, reason: String, progress: u8 },
    ExecutionError { error_message: String, error_type: String, task_or_plan_id: Option<String> },
}

/// Delivers [`ProgressEvent`]s to whatever connection(s) are associated with
/// a session. `lavis-node`'s `PushBus` implements this by broadcasting and/or
/// addressing by connection id; a no-op implementation is fine for tests and
/// for callers that don't care about UI feedback (e.g. `Scheduler` runs with
/// no attached UI).
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, session_id: &str, event: ProgressEvent);
}

/// A `ProgressSink` that drops every event. Used where a caller has no
/// active push connection (e.g. a scheduled job with no UI attached).
pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn emit(&self, _session_id: &str, _event: ProgressEvent) {}
}
