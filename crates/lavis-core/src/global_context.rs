// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `GlobalContext` (C5): long-lived per-goal state.
//!
//! Generalized from the teacher's `session.rs` shape plus a bounded
//! `VecDeque` for the recent-action digest — the teacher prefers explicit
//! bounded collections over an unbounded `Vec` with manual truncation, as
//! seen throughout its compaction code.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::types::Milestone;

/// Cap on `GlobalContext::recent_actions` (spec §3: "bounded deque of recent
/// action summaries, size ≤ 10").
const RECENT_ACTIONS_CAP: usize = 10;

/// Number of trailing completed milestones/actions shown in a context
/// injection briefing (spec §4.5: "last three completed milestones",
/// "last three actions").
const INJECTION_TAIL: usize = 3;

#[derive(Debug, Clone)]
pub struct CompletedMilestone {
    pub description: String,
    pub success: bool,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ActionSummary {
    pub action: String,
    pub result: String,
    pub success: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GlobalCounters {
    pub total_steps: u64,
    pub success: u64,
    pub failed: u64,
    pub retries: u64,
}

/// Per-goal singleton created by `TaskOrchestrator` at goal start, destroyed
/// at goal end. Only the executor thread driving this goal's plan mutates
/// it; other threads read via the methods below, which return owned/cloned
/// views rather than references into internal state (spec §5).
pub struct GlobalContext {
    pub goal: String,
    completed_milestones: Vec<CompletedMilestone>,
    current_milestone: Option<Milestone>,
    variables: HashMap<String, String>,
    recent_actions: VecDeque<ActionSummary>,
    counters: GlobalCounters,
    last_screen_digest: Option<String>,
    recovery_note: Option<String>,
}

impl GlobalContext {
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            goal: goal.into(),
            completed_milestones: Vec::new(),
            current_milestone: None,
            variables: HashMap::new(),
            recent_actions: VecDeque::with_capacity(RECENT_ACTIONS_CAP),
            counters: GlobalCounters::default(),
            last_screen_digest: None,
            recovery_note: None,
        }
    }

    pub fn start_milestone(&mut self, ms: Milestone) {
        self.current_milestone = Some(ms);
        self.recovery_note = None;
    }

    pub fn complete_milestone(&mut self, result: impl Into<String>, success: bool) {
        let description = self
            .current_milestone
            .as_ref()
            .map(|m| m.description.clone())
            .unwrap_or_default();
        self.completed_milestones.push(CompletedMilestone {
            description,
            success,
            completed_at: Utc::now(),
        });
        if success {
            self.counters.success += 1;
        } else {
            self.counters.failed += 1;
        }
        let result = result.into();
        if !success {
            self.recovery_note = Some(truncate_for_recovery(&result));
        }
        self.current_milestone = None;
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(key.into(), value.into());
    }

    pub fn get_variable(&self, key: &str, default: Option<&str>) -> Option<String> {
        self.variables.get(key).cloned().or_else(|| default.map(str::to_string))
    }

    pub fn add_action_summary(&mut self, action: impl Into<String>, result: impl Into<String>, success: bool) {
        self.counters.total_steps += 1;
        if self.recent_actions.len() == RECENT_ACTIONS_CAP {
            self.recent_actions.pop_front();
        }
        self.recent_actions.push_back(ActionSummary { action: action.into(), result: result.into(), success });
    }

    pub fn record_retry(&mut self) {
        self.counters.retries += 1;
    }

    /// Update bookkeeping after one `MicroExecutor` action: the last-screen
    /// digest, action summary, and (on failure) the recovery note.
    pub fn update_from_execution(&mut self, screen_digest: impl Into<String>, action_summary: impl Into<String>, success: bool) {
        self.last_screen_digest = Some(screen_digest.into());
        let summary = action_summary.into();
        let result = if success { "ok" } else { "failed" };
        self.add_action_summary(summary.clone(), result, success);
        if !success {
            self.recovery_note = Some(truncate_for_recovery(&summary));
        }
    }

    pub fn current_milestone(&self) -> Option<&Milestone> {
        self.current_milestone.as_ref()
    }

    pub fn counters(&self) -> &GlobalCounters {
        &self.counters
    }

    /// Compact briefing for the executor prompt — the *only* channel through
    /// which the executor learns cross-milestone history (spec §4.5).
    pub fn generate_context_injection(&self) -> String {
        let mut lines = vec![format!("Goal: {}", self.goal)];
        lines.push(format!(
            "Progress: {} steps, {} succeeded, {} failed, {} retries",
            self.counters.total_steps, self.counters.success, self.counters.failed, self.counters.retries
        ));

        if !self.completed_milestones.is_empty() {
            lines.push("Recent milestones:".to_string());
            let start = self.completed_milestones.len().saturating_sub(INJECTION_TAIL);
            for m in &self.completed_milestones[start..] {
                let mark = if m.success { "\u{2713}" } else { "\u{2717}" };
                lines.push(format!("  {mark} {}", m.description));
            }
        }

        if let Some(cur) = &self.current_milestone {
            lines.push(format!("Current milestone: {}", cur.description));
        }

        if !self.recent_actions.is_empty() {
            lines.push("Recent actions:".to_string());
            let start = self.recent_actions.len().saturating_sub(INJECTION_TAIL);
            for a in self.recent_actions.iter().skip(start) {
                let mark = if a.success { "ok" } else { "failed" };
                lines.push(format!("  - {} -> {} ({mark})", a.action, a.result));
            }
        }

        if let Some(note) = &self.recovery_note {
            lines.push(format!("Recovery note (previous step failed): {note}"));
        }

        lines.join("\n")
    }
}

/// Truncate an error/result string for the recovery note so one verbose
/// stack trace or shell stderr dump cannot dominate the injected briefing.
const RECOVERY_NOTE_MAX_CHARS: usize = 240;

fn truncate_for_recovery(s: &str) -> String {
    if s.chars().count() <= RECOVERY_NOTE_MAX_CHARS {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(RECOVERY_NOTE_MAX_CHARS).collect();
        format!("{truncated}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MilestoneType;

    #[test]
    fn recent_actions_deque_is_bounded_at_ten() {
        let mut ctx = GlobalContext::new("goal");
        for i in 0..25 {
            ctx.add_action_summary(format!("a{i}"), "ok", true);
        }
        assert_eq!(ctx.recent_actions.len(), RECENT_ACTIONS_CAP);
        // FIFO: the last 10 appended must be the ones retained.
        let kept: Vec<_> = ctx.recent_actions.iter().map(|a| a.action.clone()).collect();
        assert_eq!(kept.first().unwrap(), "a15");
        assert_eq!(kept.last().unwrap(), "a24");
    }

    #[test]
    fn complete_milestone_updates_counters_and_recovery_note_on_failure() {
        let mut ctx = GlobalContext::new("goal");
        ctx.start_milestone(Milestone::new("1", "open app", MilestoneType::Navigate));
        ctx.complete_milestone("app crashed on launch", false);
        assert_eq!(ctx.counters().failed, 1);
        assert_eq!(ctx.counters().success, 0);
        assert!(ctx.generate_context_injection().contains("Recovery note"));
    }

    #[test]
    fn complete_milestone_success_has_no_recovery_note() {
        let mut ctx = GlobalContext::new("goal");
        ctx.start_milestone(Milestone::new("1", "open app", MilestoneType::Navigate));
        ctx.complete_milestone("done", true);
        assert_eq!(ctx.counters().success, 1);
        assert!(!ctx.generate_context_injection().contains("Recovery note"));
    }

    #[test]
    fn variables_roundtrip_with_default_fallback() {
        let mut ctx = GlobalContext::new("goal");
        assert_eq!(ctx.get_variable("missing", Some("fallback")), Some("fallback".to_string()));
        ctx.set_variable("k", "v");
        assert_eq!(ctx.get_variable("k", None), Some("v".to_string()));
    }

    #[test]
    fn context_injection_shows_only_last_three_milestones_and_actions() {
        let mut ctx = GlobalContext::new("goal");
        for i in 0..5 {
            ctx.start_milestone(Milestone::new(i.to_string(), format!("step {i}"), MilestoneType::Primitive));
            ctx.complete_milestone("ok", true);
        }
        let injection = ctx.generate_context_injection();
        assert!(injection.contains("step 4"));
        assert!(injection.contains("step 2"));
        assert!(!injection.contains("step 1"));
        assert!(!injection.contains("step 0"));
    }

    #[test]
    fn recovery_note_truncates_long_error_text() {
        let mut ctx = GlobalContext::new("goal");
        ctx.start_milestone(Milestone::new("1", "x", MilestoneType::Primitive));
        let long_error = "e".repeat(1000);
        ctx.complete_milestone(long_error, false);
        let injection = ctx.generate_context_injection();
        assert!(injection.len() < 1000);
        assert!(injection.contains('\u{2026}'));
    }
}
