// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `TtsGate`: decides whether a reply merits speech before `AsyncTts` spends
//! a model call generating audio for it.

use std::sync::Arc;

use lavis_model::{CompletionRequest, Message, ModelGateway};

/// Replies shorter than this are cheap enough to always classify via the
/// model; longer ones are still classified (the classification call is
/// O(prompt length) regardless), this just documents the assumption.
const MAX_WORDS_FOR_ENUMERATION_HEURISTIC: usize = 40;

pub struct TtsGate {
    gateway: Arc<ModelGateway>,
}

impl TtsGate {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    /// Returns `false` for obviously silent replies without a model call;
    /// otherwise delegates to a short, cacheable classification prompt.
    pub async fn needs_speech(&self, text: &str) -> bool {
        if is_obviously_silent(text) {
            return false;
        }
        self.classify_via_model(text).await
    }

    async fn classify_via_model(&self, text: &str) -> bool {
        let req = CompletionRequest {
            messages: vec![
                Message::system(CLASSIFY_PROMPT),
                Message::user(text),
            ],
            ..Default::default()
        };
        match self.gateway.chat("CHAT", req).await {
            Ok(answer) => answer.trim().to_lowercase().starts_with('y'),
            Err(_) => false,
        }
    }
}

const CLASSIFY_PROMPT: &str = "Reply with exactly one word, \"yes\" or \"no\": \
    would a spoken voice reading of the following assistant reply be useful to \
    the user, or is it a terse acknowledgement / code block / step list that is \
    better read than heard?";

/// Silent patterns that short-circuit the model call entirely: empty text,
/// a reply that is purely a fenced code block, or an enumerated step list
/// longer than the heuristic word count.
fn is_obviously_silent(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }
    if is_pure_code_block(trimmed) {
        return true;
    }
    if is_long_enumerated_list(trimmed) {
        return true;
    }
    if is_bare_acknowledgement(trimmed) {
        return true;
    }
    false
}

fn is_pure_code_block(text: &str) -> bool {
    text.starts_with("```") && text.ends_with("```") && text.matches("```").count() == 2
}

fn is_long_enumerated_list(text: &str) -> bool {
    let numbered_lines = text
        .lines()
        .filter(|l| {
            let l = l.trim_start();
            l.chars().next().is_some_and(|c| c.is_ascii_digit()) && (l.contains(". ") || l.contains(") "))
        })
        .count();
    numbered_lines >= 3 && text.split_whitespace().count() > MAX_WORDS_FOR_ENUMERATION_HEURISTIC
}

fn is_bare_acknowledgement(text: &str) -> bool {
    const ACKS: &[&str] = &["ok", "okay", "done", "got it", "sure", "will do", "on it"];
    let lower = text.trim_end_matches(['.', '!']).to_lowercase();
    ACKS.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_silent() {
        assert!(is_obviously_silent(""));
        assert!(is_obviously_silent("   "));
    }

    #[test]
    fn pure_code_block_is_silent() {
        assert!(is_obviously_silent("```rust\nfn main() {}\n```"));
    }

    #[test]
    fn bare_acknowledgement_is_silent() {
        assert!(is_obviously_silent("Done!"));
        assert!(is_obviously_silent("ok"));
    }

    #[test]
    fn long_enumerated_list_is_silent() {
        let text = "1. First you open the settings panel and navigate to preferences\n\
                    2. Then you select the account tab from the sidebar menu\n\
                    3. Finally click save to persist the changes permanently";
        assert!(is_obviously_silent(text));
    }

    #[test]
    fn normal_prose_reply_is_not_obviously_silent() {
        assert!(!is_obviously_silent("I found the bug — it was an off-by-one error in the loop bound."));
    }

    #[test]
    fn short_numbered_list_is_not_silent() {
        // Only 2 numbered lines, below the >=3 threshold.
        assert!(!is_obviously_silent("1. Open settings\n2. Save"));
    }
}
