// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `AsyncTts`: a bounded worker pool that turns assistant replies into
//! `tts_audio` push events without blocking the chat turn that produced them.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, Notify};
use tracing::warn;

use lavis_model::ModelGateway;

use crate::sink::{TtsAudioEvent, TtsPushSink};

/// Audio longer than this is split into multiple `tts_audio` segments so the
/// client can start playback before the whole utterance is synthesized.
const SEGMENT_CHAR_BUDGET: usize = 600;

struct SpeakRequest {
    session_id: String,
    request_id: String,
    text: String,
}

/// Bounded queue of pending speak requests. A newer request for a
/// `request_id` already waiting in the queue replaces the older one
/// (coalescing) instead of piling up; only when the queue is full *and* no
/// same-id entry exists is the oldest unrelated entry dropped to make room.
pub struct AsyncTts {
    gateway: Arc<ModelGateway>,
    sink: Arc<dyn TtsPushSink>,
    queue: Arc<Mutex<VecDeque<SpeakRequest>>>,
    notify: Arc<Notify>,
    capacity: usize,
}

impl AsyncTts {
    /// Spawns `worker_count` background tasks draining a shared bounded
    /// queue of capacity `queue_capacity`.
    pub fn spawn(
        gateway: Arc<ModelGateway>,
        sink: Arc<dyn TtsPushSink>,
        tts_alias: String,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Arc<Self> {
        let this = Arc::new(Self {
            gateway,
            sink,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            notify: Arc::new(Notify::new()),
            capacity: queue_capacity.max(1),
        });
        for _ in 0..worker_count.max(1) {
            let queue = this.queue.clone();
            let notify = this.notify.clone();
            let gateway = this.gateway.clone();
            let sink = this.sink.clone();
            let alias = tts_alias.clone();
            tokio::spawn(async move {
                loop {
                    let req = {
                        let mut queue = queue.lock().await;
                        queue.pop_front()
                    };
                    match req {
                        Some(req) => run_one(&gateway, sink.as_ref(), &alias, req).await,
                        None => notify.notified().await,
                    }
                }
            });
        }
        this
    }

    /// Enqueue a reply for speech synthesis. Drops any older still-queued
    /// request for the same `request_id` before enqueuing the new one
    /// (last write wins); if the queue is still at capacity after that, the
    /// oldest unrelated request is evicted to make room.
    pub async fn generate_and_push(&self, session_id: &str, request_id: &str, text: &str) {
        let req = SpeakRequest {
            session_id: session_id.to_string(),
            request_id: request_id.to_string(),
            text: text.to_string(),
        };
        {
            let mut queue = self.queue.lock().await;
            if let Some(pos) = queue.iter().position(|r| r.request_id == request_id) {
                queue.remove(pos);
            }
            if queue.len() >= self.capacity {
                if let Some(evicted) = queue.pop_front() {
                    warn!(request_id = %evicted.request_id, "tts queue full, dropping oldest pending request");
                }
            }
            queue.push_back(req);
        }
        self.notify.notify_one();
    }
}

async fn run_one(gateway: &ModelGateway, sink: &dyn TtsPushSink, alias: &str, req: SpeakRequest) {
    let segments = split_into_segments(&req.text);
    let last_idx = segments.len().saturating_sub(1);
    for (seq, segment) in segments.iter().enumerate() {
        match gateway.tts(alias, segment, None, None).await {
            Ok(audio) => {
                use base64::Engine;
                let event = TtsAudioEvent {
                    request_id: req.request_id.clone(),
                    format: "mp3".to_string(),
                    base64: base64::engine::general_purpose::STANDARD.encode(&audio),
                    seq: seq as u32,
                    last: seq == last_idx,
                };
                if !sink.send_tts_audio(&req.session_id, event).await {
                    warn!(request_id = %req.request_id, "tts_audio push dropped, no subscriber");
                }
            }
            Err(e) => {
                sink.send_execution_error(&req.session_id, &format!("tts synthesis failed: {e}")).await;
                return;
            }
        }
    }
}

/// Splits `text` on sentence boundaries, packing greedily up to
/// [`SEGMENT_CHAR_BUDGET`] chars per segment so segments don't split
/// mid-sentence where avoidable.
fn split_into_segments(text: &str) -> Vec<String> {
    if text.len() <= SEGMENT_CHAR_BUDGET {
        return vec![text.to_string()];
    }
    let mut segments = Vec::new();
    let mut current = String::new();
    for sentence in text.split_inclusive(['.', '!', '?']) {
        if !current.is_empty() && current.len() + sentence.len() > SEGMENT_CHAR_BUDGET {
            segments.push(std::mem::take(&mut current));
        }
        current.push_str(sentence);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    if segments.is_empty() {
        segments.push(text.to_string());
    }
    segments
}
