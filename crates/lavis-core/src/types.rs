// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Core data model: `Plan`/`Milestone`, `DecisionBundle`, `PostMortem`.
//!
//! `Action`/`ExecutionReport` are *not* redefined here — they already live in
//! `lavis-actuator` in exactly the shape this model needs, and are
//! re-exported for convenience.

use serde::{Deserialize, Serialize};

pub use lavis_actuator::{Action, ExecutionReport};

use crate::error::ParseError;

// ─── Plan / Milestone ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PlanStatus {
    Planning,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MilestoneType {
    Navigate,
    Workflow,
    Verify,
    Primitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MilestoneStatus {
    Pending,
    InProgress,
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    ElementNotFound,
    ClickMissed,
    InfiniteLoop,
    AppNotResponding,
    UnexpectedDialog,
    Timeout,
    Unknown,
}

/// Failure diagnostics attached to a terminally failed milestone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMortem {
    pub last_screen_digest: Option<String>,
    pub tried_strategies: Vec<String>,
    pub failure_reason: FailureReason,
    pub suggested_recovery: String,
}

impl PostMortem {
    pub fn new(failure_reason: FailureReason, suggested_recovery: impl Into<String>) -> Self {
        Self {
            last_screen_digest: None,
            tried_strategies: Vec::new(),
            failure_reason,
            suggested_recovery: suggested_recovery.into(),
        }
    }
}

/// One semantic step of a `Plan` ("open app X", "fill form Y and submit").
///
/// Mutated only by `MicroExecutor` or the orchestrator's retry path; frozen
/// once `status` reaches a terminal value (`Success`/`Failed`/`Skipped`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub description: String,
    #[serde(rename = "type")]
    pub milestone_type: MilestoneType,
    pub action_budget: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub status: MilestoneStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub result_summary: Option<String>,
    pub post_mortem: Option<PostMortem>,
}

impl Milestone {
    pub fn new(id: impl Into<String>, description: impl Into<String>, milestone_type: MilestoneType) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            milestone_type,
            action_budget: 20,
            timeout_secs: 120,
            max_retries: 2,
            status: MilestoneStatus::Pending,
            started_at: None,
            ended_at: None,
            result_summary: None,
            post_mortem: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            MilestoneStatus::Success | MilestoneStatus::Failed | MilestoneStatus::Skipped
        )
    }

    /// `verify`-tagged milestones are the only ones the orchestrator may skip
    /// instead of aborting once retries are exhausted (spec §4.8).
    pub fn is_skippable_on_exhaustion(&self) -> bool {
        matches!(self.milestone_type, MilestoneType::Verify)
    }
}

/// Maximum milestones accepted from one planning call before truncation
/// (spec §4.8: "default ≤ 20 milestones").
pub const MAX_PLAN_MILESTONES: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub goal: String,
    pub milestones: Vec<Milestone>,
    pub current_index: usize,
    pub status: PlanStatus,
    /// Set when the planner returned more than `MAX_PLAN_MILESTONES` and the
    /// list was truncated; surfaced as a hint on the first milestone.
    pub truncated: bool,
}

impl Plan {
    pub fn new(id: impl Into<String>, goal: impl Into<String>, mut milestones: Vec<Milestone>) -> Self {
        let truncated = milestones.len() > MAX_PLAN_MILESTONES;
        milestones.truncate(MAX_PLAN_MILESTONES);
        Self {
            id: id.into(),
            goal: goal.into(),
            milestones,
            current_index: 0,
            status: PlanStatus::Planning,
            truncated,
        }
    }

    pub fn current_milestone(&self) -> Option<&Milestone> {
        self.milestones.get(self.current_index)
    }

    pub fn current_milestone_mut(&mut self) -> Option<&mut Milestone> {
        self.milestones.get_mut(self.current_index)
    }

    /// Derive overall plan status from its milestones: any terminal `Failed`
    /// ⇒ `Failed`; all `Success`/`Skipped` ⇒ `Completed`; otherwise unchanged.
    pub fn recompute_status(&mut self) {
        if self.status == PlanStatus::Cancelled {
            return;
        }
        if self.milestones.iter().any(|m| m.status == MilestoneStatus::Failed) {
            self.status = PlanStatus::Failed;
        } else if self
            .milestones
            .iter()
            .all(|m| matches!(m.status, MilestoneStatus::Success | MilestoneStatus::Skipped))
        {
            self.status = PlanStatus::Completed;
        }
    }
}

// ─── DecisionBundle ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LastActionResult {
    None,
    Success,
    Partial,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteNow {
    pub intent: String,
    pub actions: Vec<Action>,
}

/// The model's structured output on one perception cycle (spec §3).
///
/// Invariant: `is_goal_complete == false` ⇒ `execute_now` is `Some` with a
/// non-empty action list — enforced by [`DecisionBundle::validate`], called
/// by [`parse_decision_bundle`] immediately after parsing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionBundle {
    pub thought: String,
    #[serde(default)]
    pub last_action_result: LastActionResult,
    #[serde(default)]
    pub execute_now: Option<ExecuteNow>,
    pub is_goal_complete: bool,
    #[serde(default)]
    pub completion_summary: Option<String>,
}

impl Default for LastActionResult {
    fn default() -> Self {
        Self::None
    }
}

impl DecisionBundle {
    pub fn has_actions_to_execute(&self) -> bool {
        !self.is_goal_complete && self.execute_now.as_ref().is_some_and(|e| !e.actions.is_empty())
    }

    pub fn action_count(&self) -> usize {
        self.execute_now.as_ref().map_or(0, |e| e.actions.len())
    }

    /// Enforce spec §3's invariant: incomplete goals must carry at least one
    /// queued action. Completion with a non-empty `executeNow` is tolerated
    /// (the model's stray trailing action list is simply ignored by the
    /// caller), matching spec §3's "empty or absent" wording.
    pub fn validate(&self) -> Result<(), ParseError> {
        if !self.is_goal_complete && !self.has_actions_to_execute() {
            return Err(ParseError::DecisionBundleMalformed(
                "isGoalComplete=false but executeNow is empty or absent".into(),
            ));
        }
        Ok(())
    }
}

/// Parse a `DecisionBundle` tolerantly from a raw model response: strips
/// Markdown code fences, extracts the first balanced `{...}` object in the
/// text (ignoring any commentary the model added around it), then validates
/// the `isGoalComplete`/`executeNow` invariant.
pub fn parse_decision_bundle(raw: &str) -> Result<DecisionBundle, ParseError> {
    let candidate = extract_json_object(raw)
        .ok_or_else(|| ParseError::DecisionBundleMalformed("no JSON object found in response".into()))?;
    let bundle: DecisionBundle = serde_json::from_str(&candidate)
        .map_err(|e| ParseError::DecisionBundleMalformed(format!("{e}: {candidate}")))?;
    bundle.validate()?;
    Ok(bundle)
}

/// Strip a leading/trailing Markdown code fence (```json ... ``` or ``` ... ```)
/// and return the first balanced `{...}` substring found, scanning with a
/// brace counter that ignores braces inside string literals.
pub(crate) fn extract_json_object(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let unfenced = strip_code_fence(trimmed);
    let start = unfenced.find('{')?;
    let bytes = unfenced.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(unfenced[start..=i].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_code_fence(s: &str) -> &str {
    let s = s.strip_prefix("```json").or_else(|| s.strip_prefix("```")).unwrap_or(s);
    s.strip_suffix("```").unwrap_or(s).trim()
}

// ─── Unit tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json() {
        let raw = r#"{"thought":"ok","isGoalComplete":true,"completionSummary":"done"}"#;
        let b = parse_decision_bundle(raw).unwrap();
        assert!(b.is_goal_complete);
        assert_eq!(b.completion_summary.as_deref(), Some("done"));
    }

    #[test]
    fn strips_fences_and_commentary() {
        let raw = "Sure, here you go:\n```json\n{\"thought\":\"t\",\"isGoalComplete\":false,\"executeNow\":{\"intent\":\"click\",\"actions\":[{\"type\":\"click\",\"x\":1.0,\"y\":2.0}]}}\n```\nLet me know if that works.";
        let b = parse_decision_bundle(raw).unwrap();
        assert!(!b.is_goal_complete);
        assert_eq!(b.action_count(), 1);
    }

    #[test]
    fn rejects_incomplete_with_no_actions() {
        let raw = r#"{"thought":"t","isGoalComplete":false}"#;
        assert!(parse_decision_bundle(raw).is_err());
    }

    #[test]
    fn complete_with_no_actions_is_valid() {
        let raw = r#"{"thought":"t","isGoalComplete":true}"#;
        let b = parse_decision_bundle(raw).unwrap();
        assert_eq!(b.action_count(), 0);
        assert!(!b.has_actions_to_execute());
    }

    #[test]
    fn has_actions_to_execute_requires_both_conditions() {
        let mut b = DecisionBundle {
            thought: "t".into(),
            last_action_result: LastActionResult::None,
            execute_now: Some(ExecuteNow { intent: "i".into(), actions: vec![Action::Wait { ms: 10 }] }),
            is_goal_complete: true,
            completion_summary: None,
        };
        assert!(!b.has_actions_to_execute(), "goal complete overrides a stray action list");
        b.is_goal_complete = false;
        assert!(b.has_actions_to_execute());
    }

    #[test]
    fn malformed_json_is_an_error_not_a_panic() {
        assert!(parse_decision_bundle("not json at all").is_err());
    }

    #[test]
    fn plan_truncates_over_budget_and_flags_it() {
        let milestones: Vec<_> = (0..25)
            .map(|i| Milestone::new(i.to_string(), format!("step {i}"), MilestoneType::Primitive))
            .collect();
        let plan = Plan::new("p1", "goal", milestones);
        assert_eq!(plan.milestones.len(), MAX_PLAN_MILESTONES);
        assert!(plan.truncated);
    }

    #[test]
    fn plan_status_derives_failed_on_any_failed_milestone() {
        let mut plan = Plan::new(
            "p1",
            "goal",
            vec![
                Milestone::new("1", "a", MilestoneType::Primitive),
                Milestone::new("2", "b", MilestoneType::Primitive),
            ],
        );
        plan.milestones[0].status = MilestoneStatus::Success;
        plan.milestones[1].status = MilestoneStatus::Failed;
        plan.recompute_status();
        assert_eq!(plan.status, PlanStatus::Failed);
    }

    #[test]
    fn plan_status_derives_completed_when_all_terminal_success_or_skipped() {
        let mut plan = Plan::new(
            "p1",
            "goal",
            vec![
                Milestone::new("1", "a", MilestoneType::Primitive),
                Milestone::new("2", "b", MilestoneType::Verify),
            ],
        );
        plan.milestones[0].status = MilestoneStatus::Success;
        plan.milestones[1].status = MilestoneStatus::Skipped;
        plan.recompute_status();
        assert_eq!(plan.status, PlanStatus::Completed);
    }

    #[test]
    fn only_verify_milestones_are_skippable_on_exhaustion() {
        let verify = Milestone::new("1", "check it", MilestoneType::Verify);
        let navigate = Milestone::new("2", "open it", MilestoneType::Navigate);
        assert!(verify.is_skippable_on_exhaustion());
        assert!(!navigate.is_skippable_on_exhaustion());
    }
}
