// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `TurnMemory` (C4): bounded, turn-aware chat history with vision-aware
//! compaction.
//!
//! Shaped after the teacher's `session.rs` (an `RwLock`-guarded message list
//! with a fixed capacity) and written in the deterministic, category-dispatch
//! style of the teacher's `compact.rs` — except the thing being compacted is
//! historical-turn image frames, not tool output.

use std::collections::HashMap;
use std::sync::RwLock;

use lavis_model::{ContentPart, Message, MessageContent, Role};

/// Legacy policy: number of most-recent user entries (with no turn id) that
/// keep their frames uncompacted (spec §4.4 point 3).
const LEGACY_RECENT_USER_ENTRIES: usize = 4;

/// One entry in the bounded history. Mirrors [`Message`] but additionally
/// tracks the `turnId` each entry belongs to (if any), needed by the
/// compaction algorithm to tell "current turn" from "historical turn".
#[derive(Debug, Clone)]
pub struct TurnEntry {
    pub turn_id: Option<String>,
    pub message: Message,
}

impl TurnEntry {
    fn frame_count(&self) -> usize {
        match &self.message.content {
            MessageContent::ContentParts(parts) => {
                parts.iter().filter(|p| matches!(p, ContentPart::Image { .. })).count()
            }
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TurnMemoryStats {
    pub total_turns: usize,
    pub total_images: usize,
    pub total_messages: usize,
}

struct Inner {
    entries: Vec<TurnEntry>,
}

/// Bounded chat history aware of "turn" (one user-request-to-final-reply
/// cycle). Guarded by a synchronous `RwLock` — compaction never awaits, per
/// spec §5's suspension-point rule ("None of these may be invoked while
/// holding TurnMemory's write lock").
pub struct TurnMemory {
    max_entries: usize,
    inner: RwLock<Inner>,
}

impl TurnMemory {
    pub fn new(max_entries: usize) -> Self {
        Self { max_entries, inner: RwLock::new(Inner { entries: Vec::new() }) }
    }

    /// Append one entry, then run the eviction + placeholder-compaction pass
    /// for the current turn (spec §4.4 append semantics, steps 1–3).
    pub fn append(&self, turn_id: Option<String>, message: Message) {
        let mut inner = self.inner.write().expect("TurnMemory lock poisoned");
        inner.entries.push(TurnEntry { turn_id: turn_id.clone(), message });

        // Step 1: FIFO eviction while over capacity.
        while inner.entries.len() > self.max_entries {
            inner.entries.remove(0);
        }

        // Step 2/3: compact every turn that is not the current one.
        compact_inner(&mut inner.entries, turn_id.as_deref());
    }

    pub fn messages(&self) -> Vec<Message> {
        let inner = self.inner.read().expect("TurnMemory lock poisoned");
        inner.entries.iter().map(|e| e.message.clone()).collect()
    }

    pub fn entries(&self) -> Vec<TurnEntry> {
        let inner = self.inner.read().expect("TurnMemory lock poisoned");
        inner.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("TurnMemory lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.inner.write().expect("TurnMemory lock poisoned").entries.clear();
    }

    pub fn stats(&self) -> TurnMemoryStats {
        let inner = self.inner.read().expect("TurnMemory lock poisoned");
        let total_turns = inner
            .entries
            .iter()
            .filter_map(|e| e.turn_id.as_deref())
            .collect::<std::collections::HashSet<_>>()
            .len();
        let total_images: usize = inner.entries.iter().map(|e| e.frame_count()).sum();
        TurnMemoryStats { total_turns, total_images, total_messages: inner.entries.len() }
    }
}

/// Run the compaction pass over `entries` in place. `current_turn` is
/// excluded entirely (it always keeps all its frames). Every other
/// turn-tagged entry is grouped by `turnId`; groups with >2 frames have all
/// but the first and last frame replaced by a placeholder. Entries with no
/// turn id fall back to the legacy policy: only the most recent
/// `LEGACY_RECENT_USER_ENTRIES` user entries keep their frames.
fn compact_inner(entries: &mut [TurnEntry], current_turn: Option<&str>) {
    // Group indices of turn-tagged entries by turn id, preserving order.
    let mut by_turn: HashMap<String, Vec<usize>> = HashMap::new();
    let mut legacy_user_indices: Vec<usize> = Vec::new();

    for (i, e) in entries.iter().enumerate() {
        match &e.turn_id {
            Some(tid) if Some(tid.as_str()) != current_turn => {
                by_turn.entry(tid.clone()).or_default().push(i);
            }
            Some(_) => {} // current turn — never compacted
            None => {
                if matches!(e.message.role, Role::User) {
                    legacy_user_indices.push(i);
                }
            }
        }
    }

    for (turn_id, idxs) in by_turn {
        compact_turn_group(entries, &turn_id, &idxs);
    }

    if legacy_user_indices.len() > LEGACY_RECENT_USER_ENTRIES {
        let cutoff = legacy_user_indices.len() - LEGACY_RECENT_USER_ENTRIES;
        for &i in &legacy_user_indices[..cutoff] {
            compact_legacy_entry(&mut entries[i]);
        }
    }
}

/// Within one historical turn's entries, collect every frame position across
/// all its entries; if there are >2, keep the first and last and replace the
/// rest with `[Visual_Placeholder: <turnId>_<k>]`, preserving accompanying
/// text verbatim.
fn compact_turn_group(entries: &mut [TurnEntry], turn_id: &str, idxs: &[usize]) {
    // (entry_index, part_index) for every image part in this turn, in order.
    let mut frame_positions: Vec<(usize, usize)> = Vec::new();
    for &i in idxs {
        if let MessageContent::ContentParts(parts) = &entries[i].message.content {
            for (pi, part) in parts.iter().enumerate() {
                if matches!(part, ContentPart::Image { .. }) {
                    frame_positions.push((i, pi));
                }
            }
        }
    }

    if frame_positions.len() <= 2 {
        return;
    }

    let keep_first = frame_positions[0];
    let keep_last = *frame_positions.last().unwrap();

    for (k, &(entry_idx, part_idx)) in frame_positions.iter().enumerate() {
        if (entry_idx, part_idx) == keep_first || (entry_idx, part_idx) == keep_last {
            continue;
        }
        if let MessageContent::ContentParts(parts) = &mut entries[entry_idx].message.content {
            parts[part_idx] = ContentPart::text(format!("[Visual_Placeholder: {turn_id}_{k}]"));
        }
    }
}

/// Legacy (no-turn-id) entries: collapse every frame in the entry to one
/// generic placeholder, keeping any text parts verbatim.
fn compact_legacy_entry(entry: &mut TurnEntry) {
    if let MessageContent::ContentParts(parts) = &mut entry.message.content {
        let mut collapsed_once = false;
        parts.retain_mut(|p| match p {
            ContentPart::Image { .. } => {
                if collapsed_once {
                    false
                } else {
                    collapsed_once = true;
                    *p = ContentPart::text("[Visual_Placeholder: legacy]");
                    true
                }
            }
            ContentPart::Text { .. } => true,
        });
    }
}
