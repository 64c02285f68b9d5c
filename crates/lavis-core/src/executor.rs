// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `MicroExecutor` (C7): drives one milestone to completion.
//!
//! Generalized from the teacher's `agent.rs` OODA-shaped loop
//! (`submit`/`run_agentic_loop`): the single-session chat loop becomes the
//! milestone-scoped perceive/decide/act/reflect cycle, `ScreenSource.capture`
//! replaces plain text prompting, and `PostMortem` replaces the teacher's
//! plain error propagation on loop exhaustion.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lavis_actuator::{Action, ActuatorError, ExecutionReport, SystemActuator};
use lavis_image::ScreenSource;
use lavis_model::{CompletionRequest, ContentPart, Message, ModelGateway};
use lavis_runtime::SkillInfo;

use crate::decision_prompts::{render_tool_list, DECISION_SYSTEM_PROMPT};
use crate::global_context::GlobalContext;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::turn_memory::TurnMemory;
use crate::types::{parse_decision_bundle, DecisionBundle, FailureReason, Milestone, MilestoneStatus, PostMortem};
use crate::cancellation::CancellationToken;

/// Hard ceiling on perceive/decide/act/reflect cycles per milestone,
/// regardless of `milestone.max_retries` (spec §4.7: "at most
/// `min(milestone.maxRetries, cycleCap=8)`").
const CYCLE_CAP: u32 = 8;

/// How long to wait for the UI to hide its own overlay before capturing,
/// and to wait after capture before it may redraw again (spec §4.7).
const WINDOW_TOGGLE_WAIT: Duration = Duration::from_millis(150);

/// Consecutive hard-failure-category actuator errors that terminate the
/// milestone (spec §4.7).
const HARD_FAILURE_LIMIT: u32 = 3;

/// Consecutive decision-parse failures (including upstream model errors,
/// which leave the executor equally unable to decide) that terminate the
/// milestone (spec §4.7).
const PARSE_FAILURE_LIMIT: u32 = 2;

/// `PostMortem.failureReason` is inferred from the last three
/// `ExecutionReport`s and the latest thought (spec §4.7).
const RECENT_REPORTS_WINDOW: usize = 3;

pub enum MilestoneOutcome {
    Success,
    Failed,
    Cancelled,
}

pub struct MicroExecutor {
    pub screen: Arc<dyn ScreenSource>,
    pub actuator: Arc<dyn SystemActuator>,
    pub gateway: Arc<ModelGateway>,
    pub model_alias: String,
    pub progress: Arc<dyn ProgressSink>,
    pub session_id: String,
}

impl MicroExecutor {
    /// Drive `milestone` to a terminal status, mutating it in place
    /// (`status`, `result_summary`, `post_mortem`, timestamps). Returns the
    /// outcome for the orchestrator's retry/skip decision.
    pub async fn run(
        &self,
        milestone: &mut Milestone,
        turn_id: &str,
        turn_memory: &TurnMemory,
        global_context: &mut GlobalContext,
        skills: &[SkillInfo],
        cancel: &CancellationToken,
    ) -> MilestoneOutcome {
        milestone.status = MilestoneStatus::InProgress;
        milestone.started_at = Some(chrono::Utc::now());
        global_context.start_milestone(milestone.clone());

        let deadline = Instant::now() + Duration::from_secs(milestone.timeout_secs);
        let cap = milestone.max_retries.min(CYCLE_CAP).max(1);

        let mut last_action_failure_hint: Option<String> = None;
        let mut hard_failures: u32 = 0;
        let mut parse_failures: u32 = 0;
        let mut recent_reports: VecDeque<ExecutionReport> = VecDeque::with_capacity(RECENT_REPORTS_WINDOW);
        let mut latest_thought = String::new();

        for iteration in 1..=cap {
            if cancel.is_cancelled() {
                return self.finish(milestone, global_context, MilestoneOutcome::Cancelled, None);
            }
            if Instant::now() >= deadline {
                let pm = PostMortem::new(FailureReason::Timeout, "increase the milestone timeout or split it into smaller steps");
                return self.finish(milestone, global_context, MilestoneOutcome::Failed, Some(pm));
            }

            self.progress
                .emit(&self.session_id, ProgressEvent::Thinking { context: milestone.description.clone() })
                .await;

            // ── Perceive ─────────────────────────────────────────────────
            self.progress.emit(&self.session_id, ProgressEvent::HideWindow { reason: "capture".into() }).await;
            tokio::time::sleep(WINDOW_TOGGLE_WAIT).await;
            let frame = match self.screen.capture_as_base64(false) {
                Ok(f) => f,
                Err(e) => {
                    self.progress.emit(&self.session_id, ProgressEvent::ShowWindow { reason: "capture-failed".into() }).await;
                    let pm = PostMortem::new(FailureReason::Unknown, format!("screen capture failed: {e}"));
                    return self.finish(milestone, global_context, MilestoneOutcome::Failed, Some(pm));
                }
            };
            self.progress.emit(&self.session_id, ProgressEvent::ShowWindow { reason: "capture".into() }).await;

            // ── Decide ───────────────────────────────────────────────────
            let bundle = match self.decide(milestone, turn_id, turn_memory, global_context, skills, &frame.into_data_url(), last_action_failure_hint.take()).await {
                Ok(b) => {
                    parse_failures = 0;
                    latest_thought = b.thought.clone();
                    b
                }
                Err(_) => {
                    parse_failures += 1;
                    if parse_failures >= PARSE_FAILURE_LIMIT {
                        let pm = PostMortem::new(FailureReason::Unknown, "the model repeatedly returned an unparsable decision; try rephrasing the milestone");
                        return self.finish(milestone, global_context, MilestoneOutcome::Failed, Some(pm));
                    }
                    continue;
                }
            };

            if bundle.is_goal_complete {
                milestone.result_summary = bundle.completion_summary.clone().or(Some(bundle.thought.clone()));
                return self.finish(milestone, global_context, MilestoneOutcome::Success, None);
            }

            // ── Act ──────────────────────────────────────────────────────
            let Some(execute_now) = bundle.execute_now.as_ref() else { continue };
            self.progress
                .emit(&self.session_id, ProgressEvent::IterationProgress { current: iteration, max: cap, intent: execute_now.intent.clone() })
                .await;

            let mut batch_success = true;
            let mut completed_via_signal: Option<String> = None;

            for action in &execute_now.actions {
                if cancel.is_cancelled() {
                    return self.finish(milestone, global_context, MilestoneOutcome::Cancelled, None);
                }

                if let Action::CompleteMilestone { summary } = action {
                    completed_via_signal = Some(summary.clone());
                    break;
                }

                let (success, description, hard_failure, report) = self.act(action).await;
                if let Some(report) = report {
                    if recent_reports.len() == RECENT_REPORTS_WINDOW {
                        recent_reports.pop_front();
                    }
                    recent_reports.push_back(report);
                }
                turn_memory.append(Some(turn_id.to_string()), Message::assistant(format!("action: {description}")));
                global_context.add_action_summary(describe_action(action), if success { "ok" } else { "failed" }, success);
                self.progress
                    .emit(
                        &self.session_id,
                        ProgressEvent::ActionExecuted { action_type: action_type_name(action).into(), description: description.clone(), success },
                    )
                    .await;

                if hard_failure {
                    hard_failures += 1;
                    if hard_failures >= HARD_FAILURE_LIMIT {
                        let pm = PostMortem::new(
                            FailureReason::Unknown,
                            "grant accessibility/screen-recording permission",
                        );
                        return self.finish(milestone, global_context, MilestoneOutcome::Failed, Some(pm));
                    }
                } else {
                    hard_failures = 0;
                }

                if !success {
                    batch_success = false;
                    last_action_failure_hint = Some(description);
                    break;
                }
            }

            if let Some(summary) = completed_via_signal {
                milestone.result_summary = Some(summary);
                return self.finish(milestone, global_context, MilestoneOutcome::Success, None);
            }

            if !batch_success {
                global_context.record_retry();
            }
        }

        let pm = infer_failure_reason(&recent_reports, &latest_thought, &last_action_failure_hint);
        self.finish(milestone, global_context, MilestoneOutcome::Failed, Some(pm))
    }

    async fn decide(
        &self,
        milestone: &Milestone,
        turn_id: &str,
        turn_memory: &TurnMemory,
        global_context: &GlobalContext,
        skills: &[SkillInfo],
        frame_data_url: &str,
        failure_hint: Option<String>,
    ) -> Result<DecisionBundle, crate::error::ParseError> {
        let mut system = String::from(DECISION_SYSTEM_PROMPT);
        system.push_str("\n\n");
        system.push_str(&global_context.generate_context_injection());
        system.push_str("\n\n");
        system.push_str(&render_tool_list(skills));
        system.push_str(&format!("\n\nCurrent milestone: {}", milestone.description));
        if let Some(hint) = failure_hint {
            system.push_str(&format!("\n\nThe previous action failed: {hint}. Adjust your approach."));
        }

        let mut messages = vec![Message::system(system)];
        messages.extend(turn_memory.messages());
        messages.push(Message::user_with_parts(vec![
            ContentPart::text("Here is the current screen."),
            ContentPart::image(frame_data_url.to_string()),
        ]));

        let req = CompletionRequest { messages, tools: Vec::new(), stream: false, system_dynamic_suffix: None };
        let raw = self
            .gateway
            .chat(&self.model_alias, req)
            .await
            .map_err(|e| crate::error::ParseError::DecisionBundleMalformed(format!("model call failed: {e}")))?;

        turn_memory.append(Some(turn_id.to_string()), Message::assistant(raw.clone()));
        parse_decision_bundle(&raw)
    }

    /// Translate and execute one `Action`, returning `(success, human
    /// description, is_hard_failure_category, execution_report)`. Pointer
    /// primitives never error (per `SystemActuator`'s contract) and carry
    /// their `ExecutionReport` back so the caller can feed it into
    /// `infer_failure_reason`'s recent-reports window; process primitives
    /// (`shellExec`/`openApp`) return a `Result` whose `Err` is classified
    /// into the hard-failure category when it is a permission denial, and
    /// have no `ExecutionReport` equivalent.
    async fn act(&self, action: &Action) -> (bool, String, bool, Option<ExecutionReport>) {
        match action {
            Action::Click { x, y } => report_outcome(self.actuator.click(*x, *y), "click"),
            Action::DoubleClick { x, y } => report_outcome(self.actuator.double_click(*x, *y), "double-click"),
            Action::RightClick { x, y } => report_outcome(self.actuator.right_click(*x, *y), "right-click"),
            Action::Drag { x1, y1, x2, y2 } => report_outcome(self.actuator.drag(*x1, *y1, *x2, *y2), "drag"),
            Action::Scroll { amount } => report_outcome(self.actuator.scroll(*amount), "scroll"),
            Action::Type { text } => report_outcome(self.actuator.type_text(text), "type"),
            Action::Key { combo } => report_outcome(self.actuator.key(combo), "key"),
            Action::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                (true, format!("waited {ms}ms"), false, None)
            }
            Action::ShellExec { cmd } => match self.actuator.shell_exec(cmd, None).await {
                Ok(report) => (report.success, format!("shellExec {cmd:?} -> exit {:?}", report.exit_code), false, None),
                Err(e) => (false, format!("shellExec {cmd:?} failed: {e}"), is_hard_failure(&e), None),
            },
            Action::OpenApp { name } => match self.actuator.open_app(name).await {
                Ok(report) => (report.success, format!("openApp {name} -> exit {:?}", report.exit_code), false, None),
                Err(e) => (false, format!("openApp {name} failed: {e}"), is_hard_failure(&e), None),
            },
            Action::CompleteMilestone { summary } => (true, summary.clone(), false, None),
        }
    }

    fn finish(
        &self,
        milestone: &mut Milestone,
        global_context: &mut GlobalContext,
        outcome: MilestoneOutcome,
        post_mortem: Option<PostMortem>,
    ) -> MilestoneOutcome {
        milestone.ended_at = Some(chrono::Utc::now());
        milestone.status = match outcome {
            MilestoneOutcome::Success => MilestoneStatus::Success,
            MilestoneOutcome::Failed => MilestoneStatus::Failed,
            MilestoneOutcome::Cancelled => MilestoneStatus::Failed,
        };
        milestone.post_mortem = post_mortem;
        let success = matches!(milestone.status, MilestoneStatus::Success);
        global_context.complete_milestone(milestone.result_summary.clone().unwrap_or_default(), success);
        outcome
    }
}

fn report_outcome(report: ExecutionReport, label: &str) -> (bool, String, bool, Option<ExecutionReport>) {
    let success = report.success;
    let description = format!("{label}: {}", report.message);
    (success, description, false, Some(report))
}

fn action_type_name(action: &Action) -> &'static str {
    match action {
        Action::Click { .. } => "click",
        Action::DoubleClick { .. } => "doubleClick",
        Action::RightClick { .. } => "rightClick",
        Action::Drag { .. } => "drag",
        Action::Scroll { .. } => "scroll",
        Action::Type { .. } => "type",
        Action::Key { .. } => "key",
        Action::ShellExec { .. } => "shellExec",
        Action::OpenApp { .. } => "openApp",
        Action::Wait { .. } => "wait",
        Action::CompleteMilestone { .. } => "completeMilestone",
    }
}

fn describe_action(action: &Action) -> String {
    format!("{}({:?})", action_type_name(action), action)
}

/// `ActuatorError::Denied` is this crate's permission-denial category
/// (spec's `ActuatorError{PERMISSION}`); everything else is a soft failure
/// that does not count toward the hard-failure-category limit.
fn is_hard_failure(err: &ActuatorError) -> bool {
    matches!(err, ActuatorError::Denied(_))
}

/// Infer a `FailureReason` from the last three `ExecutionReport`s and the
/// model's latest thought. This is a coarse heuristic, not a classifier — the
/// caller only needs a plausible reason and recovery suggestion, not a
/// guaranteed-correct diagnosis.
fn infer_failure_reason(recent_reports: &VecDeque<ExecutionReport>, latest_thought: &str, last_failure: &Option<String>) -> PostMortem {
    if recent_reports.len() == RECENT_REPORTS_WINDOW && all_same_target_and_failing(recent_reports) {
        return PostMortem::new(
            FailureReason::InfiniteLoop,
            "break the loop: try a different element or verify the previous action had any effect",
        );
    }

    let thought_lower = latest_thought.to_lowercase();
    if thought_lower.contains("not responding") || thought_lower.contains("unresponsive") || thought_lower.contains("frozen") || thought_lower.contains("hung") {
        return PostMortem::new(FailureReason::AppNotResponding, "wait longer or restart the target application");
    }
    if thought_lower.contains("dialog") || thought_lower.contains("popup") || thought_lower.contains("modal") || thought_lower.contains("alert") {
        return PostMortem::new(FailureReason::UnexpectedDialog, "dismiss the unexpected dialog before retrying the milestone");
    }

    let Some(hint) = last_failure else {
        return PostMortem::new(FailureReason::Unknown, "retry with a more specific description of the target element");
    };
    let lower = hint.to_lowercase();
    let reason = if lower.contains("permission") || lower.contains("denied") {
        FailureReason::Unknown
    } else if lower.contains("deviat") {
        FailureReason::ClickMissed
    } else if lower.contains("timeout") || lower.contains("timed out") {
        FailureReason::Timeout
    } else if lower.contains("not found") || lower.contains("no such") {
        FailureReason::ElementNotFound
    } else {
        FailureReason::Unknown
    };
    PostMortem::new(reason, "retry with a more specific description of the target element or verify the app is responsive")
}

/// True when every report in the window failed against the same target
/// coordinates, i.e. the model kept retrying the same action with no effect.
fn all_same_target_and_failing(reports: &VecDeque<ExecutionReport>) -> bool {
    let first = &reports[0];
    reports
        .iter()
        .all(|r| !r.success && r.requested_x == first.requested_x && r.requested_y == first.requested_y)
}
