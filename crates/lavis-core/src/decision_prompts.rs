// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! System prompt text for the `MicroExecutor` decision cycle and the
//! `TaskOrchestrator` planning call — the Lavis-specific counterparts of the
//! teacher's `prompts.rs::system_prompt`, kept as a pair of small constants
//! in its same "static instruction text, formatted with live context" style
//! rather than a coding-assistant persona.

/// Instruction text prepended to every `MicroExecutor` decision call. The
/// caller appends `GlobalContext.generate_context_injection()`, the
/// available tool/skill list, and the goal reminder before the captured
/// frame.
pub const DECISION_SYSTEM_PROMPT: &str = r#"You drive a desktop computer on behalf of a user by looking at screenshots and issuing mouse/keyboard/shell actions. You are working on exactly one milestone of a larger plan at a time.

Respond with a single JSON object matching this shape and nothing else:
{
  "thought": "<brief reasoning about what you see and what to do next>",
  "lastActionResult": "none" | "success" | "partial" | "failure",
  "executeNow": {"intent": "<short description>", "actions": [ <action>, ... ]} | null,
  "isGoalComplete": true | false,
  "completionSummary": "<one-line summary>" | null
}

Each <action> is one of:
{"type":"click","x":<number>,"y":<number>}
{"type":"doubleClick","x":<number>,"y":<number>}
{"type":"rightClick","x":<number>,"y":<number>}
{"type":"drag","x1":<number>,"y1":<number>,"x2":<number>,"y2":<number>}
{"type":"scroll","amount":<integer>}
{"type":"type","text":"<string>"}
{"type":"key","combo":"<string, e.g. Cmd+S>"}
{"type":"shellExec","cmd":"<string>"}
{"type":"openApp","name":"<string>"}
{"type":"wait","ms":<integer>}
{"type":"completeMilestone","summary":"<string>"}

Rules:
- All coordinates are logical screen pixels measured from the captured frame; never invent coordinates you have not seen.
- If isGoalComplete is false, executeNow must contain at least one action.
- If isGoalComplete is true, executeNow should be null or omitted.
- Use completeMilestone only when the milestone's intent is fully satisfied.
- Prefer the smallest number of actions that makes verifiable progress; observe the result before chaining many blind actions."#;

/// Instruction text for the one-shot planning call (spec §4.8).
pub const PLANNING_SYSTEM_PROMPT: &str = r#"You turn a user's goal for controlling their desktop computer into an ordered list of milestones. Each milestone is a self-contained, verifiable step described at a high level (no coordinates, no low-level key presses).

Respond with a single JSON object and nothing else:
{"milestones": [{"description": "<string>", "type": "navigate" | "workflow" | "verify" | "primitive"}, ...]}

Rules:
- Order milestones left to right in the order they must execute.
- Use "verify" for steps whose only purpose is to confirm an outcome (these may be skipped if they cannot be completed after retries).
- Keep the list as short as correctly completing the goal allows; prefer at most 20 milestones."#;

/// Render the list of currently mounted skill tools (plus the fixed
/// `completeMilestone` signal tool) as plain text for inclusion in the
/// decision prompt. Skills are informational here — the model requests
/// their execution implicitly via a `shellExec`/`key` action sequence, or
/// (for `agent:`-templated skills) the orchestrator resolves and runs them
/// out of band; this list exists so the model knows what capabilities and
/// shortcuts exist.
pub fn render_tool_list(skills: &[lavis_runtime::SkillInfo]) -> String {
    let mut lines = vec!["Available skills:".to_string()];
    for s in skills {
        lines.push(format!("- {}: {}", s.tool_name(), s.description));
    }
    lines.push("- complete_milestone: signal that the current milestone's goal has been reached".to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_prompt_documents_every_action_variant() {
        for tag in [
            "click", "doubleClick", "rightClick", "drag", "scroll", "type", "key", "shellExec",
            "openApp", "wait", "completeMilestone",
        ] {
            assert!(DECISION_SYSTEM_PROMPT.contains(tag), "missing action tag {tag}");
        }
    }

    #[test]
    fn render_tool_list_includes_complete_milestone_signal() {
        let out = render_tool_list(&[]);
        assert!(out.contains("complete_milestone"));
    }
}
