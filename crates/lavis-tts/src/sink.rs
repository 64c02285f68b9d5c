// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Push delivery is abstracted behind a trait so `lavis-tts` never depends
//! on `lavis-node`'s `PushBus` directly — the bootstrap crate wires the two
//! together at composition time.

use async_trait::async_trait;

/// One `tts_audio` push event, matching the spec's event-catalog shape.
#[derive(Debug, Clone)]
pub struct TtsAudioEvent {
    pub request_id: String,
    pub format: String,
    pub base64: String,
    pub seq: u32,
    pub last: bool,
}

/// Narrow view of `PushBus` that `AsyncTts` needs: deliver audio segments
/// and, on failure, one `execution_error` event.
#[async_trait]
pub trait TtsPushSink: Send + Sync {
    async fn send_tts_audio(&self, session_id: &str, event: TtsAudioEvent) -> bool;
    async fn send_execution_error(&self, session_id: &str, message: &str);
}
