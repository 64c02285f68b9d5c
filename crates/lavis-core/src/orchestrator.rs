// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `TaskOrchestrator` (C8): plans a goal into milestones and drives
//! `MicroExecutor` per milestone.
//!
//! Generalized from the same `agent.rs` loop shape one level up (planning
//! call, milestone iteration, retry/skip policy by tag) plus a cooperative
//! [`CancellationToken`].

use std::sync::Arc;

use lavis_runtime::SkillInfo;
use serde::Deserialize;
use uuid::Uuid;

use crate::cancellation::CancellationToken;
use crate::decision_prompts::PLANNING_SYSTEM_PROMPT;
use crate::error::ParseError;
use crate::executor::{MicroExecutor, MilestoneOutcome};
use crate::global_context::GlobalContext;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::turn_memory::TurnMemory;
use crate::types::{extract_json_object, Milestone, MilestoneType, Plan, PlanStatus};

#[derive(Debug, Deserialize)]
struct PlanningMilestone {
    description: String,
    #[serde(rename = "type", default = "default_milestone_type")]
    milestone_type: MilestoneType,
}

fn default_milestone_type() -> MilestoneType {
    MilestoneType::Primitive
}

#[derive(Debug, Deserialize)]
struct PlanningResponse {
    milestones: Vec<PlanningMilestone>,
}

/// Plans `goal` into an ordered milestone list via one `ModelGateway.chat`
/// call, tolerantly parsing the response the same way `DecisionBundle` is
/// parsed (spec §4.8 and §4.7 share the same tolerant-JSON convention).
fn parse_planning_response(raw: &str) -> Result<PlanningResponse, ParseError> {
    let candidate = extract_json_object(raw)
        .ok_or_else(|| ParseError::DecisionBundleMalformed("no JSON object found in planning response".into()))?;
    serde_json::from_str(&candidate).map_err(|e| ParseError::DecisionBundleMalformed(format!("{e}: {candidate}")))
}

pub struct TaskOrchestrator {
    pub executor: MicroExecutor,
    pub session_id: String,
    cancel: CancellationToken,
}

impl TaskOrchestrator {
    pub fn new(executor: MicroExecutor, session_id: impl Into<String>) -> Self {
        Self { executor, session_id: session_id.into(), cancel: CancellationToken::new() }
    }

    /// A single shared cancellation token; the executor checks it between
    /// iterations and between batched actions (spec §4.8).
    pub fn interrupt(&self) {
        self.cancel.cancel();
    }

    async fn plan(&self, goal: &str) -> Result<Plan, ParseError> {
        let req = lavis_model::CompletionRequest {
            messages: vec![
                lavis_model::Message::system(PLANNING_SYSTEM_PROMPT),
                lavis_model::Message::user(goal),
            ],
            tools: Vec::new(),
            stream: false,
            system_dynamic_suffix: None,
        };
        let raw = self
            .executor
            .gateway
            .chat(&self.executor.model_alias, req)
            .await
            .map_err(|e| ParseError::DecisionBundleMalformed(format!("planning call failed: {e}")))?;

        let parsed = parse_planning_response(&raw)?;
        let milestones: Vec<Milestone> = parsed
            .milestones
            .into_iter()
            .enumerate()
            .map(|(i, m)| Milestone::new((i + 1).to_string(), m.description, m.milestone_type))
            .collect();

        Ok(Plan::new(Uuid::new_v4().to_string(), goal, milestones))
    }

    /// Plan the goal and drive every milestone to completion, emitting the
    /// full `plan_created` → `step_started`/`step_completed`/`step_failed` →
    /// `plan_completed`/`plan_failed` event sequence (spec §4.8/§4.11).
    pub async fn run(&self, goal: &str, skills: &Arc<[SkillInfo]>) -> Plan {
        let mut plan = match self.plan(goal).await {
            Ok(p) => p,
            Err(e) => {
                let mut p = Plan::new(Uuid::new_v4().to_string(), goal, Vec::new());
                p.status = PlanStatus::Failed;
                self.executor
                    .progress
                    .emit(
                        &self.session_id,
                        ProgressEvent::PlanFailed { plan_id: p.id.clone(), reason: format!("planning failed: {e}"), progress: 0 },
                    )
                    .await;
                return p;
            }
        };
        plan.status = PlanStatus::InProgress;

        let steps: Vec<String> = plan.milestones.iter().map(|m| m.description.clone()).collect();
        self.executor
            .progress
            .emit(
                &self.session_id,
                ProgressEvent::PlanCreated {
                    plan_id: plan.id.clone(),
                    goal: goal.to_string(),
                    steps,
                    total_steps: plan.milestones.len(),
                },
            )
            .await;

        let mut global_context = GlobalContext::new(goal);
        let turn_memory = TurnMemory::new(200);
        let turn_id = Uuid::new_v4().to_string();
        let total = plan.milestones.len().max(1);

        for idx in 0..plan.milestones.len() {
            if self.cancel.is_cancelled() {
                plan.status = PlanStatus::Cancelled;
                break;
            }

            plan.current_index = idx;
            let progress_pct = ((idx * 100) / total) as u8;

            {
                let milestone = &mut plan.milestones[idx];
                self.executor
                    .progress
                    .emit(
                        &self.session_id,
                        ProgressEvent::StepStarted {
                            plan_id: plan.id.clone(),
                            step_id: milestone.id.clone(),
                            description: milestone.description.clone(),
                            step_type: Some(format!("{:?}", milestone.milestone_type)),
                            progress: progress_pct,
                        },
                    )
                    .await;
            }

            let attempts = plan.milestones[idx].max_retries + 1;
            let mut outcome = MilestoneOutcome::Failed;
            for attempt in 0..attempts {
                if attempt > 0 {
                    global_context.record_retry();
                }
                outcome = self
                    .executor
                    .run(&mut plan.milestones[idx], &turn_id, &turn_memory, &mut global_context, skills, &self.cancel)
                    .await;
                if !matches!(outcome, MilestoneOutcome::Failed) {
                    break;
                }
                if self.cancel.is_cancelled() {
                    break;
                }
            }

            let milestone = &plan.milestones[idx];
            match outcome {
                MilestoneOutcome::Success => {
                    self.executor
                        .progress
                        .emit(
                            &self.session_id,
                            ProgressEvent::StepCompleted {
                                plan_id: plan.id.clone(),
                                step_id: milestone.id.clone(),
                                status: "SUCCESS".into(),
                                result_summary: milestone.result_summary.clone().unwrap_or_default(),
                                progress: (((idx + 1) * 100) / total) as u8,
                                execution_ms: milestone_duration_ms(milestone),
                            },
                        )
                        .await;
                }
                MilestoneOutcome::Cancelled => {
                    plan.status = PlanStatus::Cancelled;
                    break;
                }
                MilestoneOutcome::Failed => {
                    let skippable = milestone.is_skippable_on_exhaustion();
                    self.executor
                        .progress
                        .emit(
                            &self.session_id,
                            ProgressEvent::StepFailed {
                                plan_id: plan.id.clone(),
                                step_id: milestone.id.clone(),
                                post_mortem: milestone.post_mortem.clone().unwrap_or_else(|| {
                                    crate::types::PostMortem::new(crate::types::FailureReason::Unknown, "retry the milestone")
                                }),
                                progress: (((idx + 1) * 100) / total) as u8,
                            },
                        )
                        .await;

                    if skippable {
                        plan.milestones[idx].status = crate::types::MilestoneStatus::Skipped;
                    } else {
                        plan.status = PlanStatus::Failed;
                        break;
                    }
                }
            }
        }

        plan.recompute_status();

        let status_label = match plan.status {
            PlanStatus::Completed => "COMPLETED",
            PlanStatus::Failed => "FAILED",
            PlanStatus::Cancelled => "CANCELLED",
            PlanStatus::InProgress | PlanStatus::Planning => "COMPLETED",
        };
        self.executor
            .progress
            .emit(&self.session_id, ProgressEvent::PlanCompleted { plan_id: plan.id.clone(), status: status_label.into(), progress: 100 })
            .await;

        plan
    }
}

fn milestone_duration_ms(m: &Milestone) -> u64 {
    match (m.started_at, m.ended_at) {
        (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as u64,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_planning_response_defaults_missing_type_to_primitive() {
        let raw = r#"{"milestones":[{"description":"open the app"}]}"#;
        let parsed = parse_planning_response(raw).unwrap();
        assert_eq!(parsed.milestones.len(), 1);
        assert!(matches!(parsed.milestones[0].milestone_type, MilestoneType::Primitive));
    }

    #[test]
    fn parse_planning_response_strips_surrounding_commentary() {
        let raw = "Here is the plan:\n{\"milestones\":[{\"description\":\"a\",\"type\":\"verify\"}]}\nDone.";
        let parsed = parse_planning_response(raw).unwrap();
        assert!(matches!(parsed.milestones[0].milestone_type, MilestoneType::Verify));
    }

    #[test]
    fn parse_planning_response_rejects_garbage() {
        assert!(parse_planning_response("no json here").is_err());
    }
}
