// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `PushBus` (C11): the server→client event channel for progress and audio
//! (spec §4.11).
//!
//! Grounded on the teacher's `control::service::AgentHandle` broadcast/mpsc
//! pairing, generalized from "one broadcast channel, no per-connection
//! addressing" into a concurrent map of per-connection bounded queues plus
//! a broadcast sender, since the spec requires both `sendById` (FIFO per
//! connection) and `broadcast`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use lavis_core::{ProgressEvent, ProgressSink};
use lavis_tts::{TtsAudioEvent, TtsPushSink};

/// Bound on each connection's outgoing queue. A slow/stalled client is
/// evicted on the first failed write rather than allowed to grow unbounded
/// (spec §5: "bounded queue" per connection).
const CONNECTION_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub ts: i64,
}

impl Envelope {
    fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self { event_type: event_type.into(), data, ts: Utc::now().timestamp_millis() }
    }
}

struct Connection {
    tx: mpsc::Sender<Envelope>,
    wants_updates: std::sync::atomic::AtomicBool,
}

/// Maintains a set of push connections keyed by stable id (spec §4.11).
pub struct PushBus {
    connections: DashMap<String, Connection>,
    next_anonymous_id: AtomicU64,
}

impl PushBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { connections: DashMap::new(), next_anonymous_id: AtomicU64::new(1) })
    }

    /// Register a new connection and return its id and receiver for the
    /// writer task to drain.
    pub fn register(self: &Arc<Self>, id: Option<String>) -> (String, mpsc::Receiver<Envelope>) {
        let id = id.unwrap_or_else(|| {
            format!("anon-{}", self.next_anonymous_id.fetch_add(1, Ordering::Relaxed))
        });
        let (tx, rx) = mpsc::channel(CONNECTION_QUEUE_CAPACITY);
        self.connections.insert(id.clone(), Connection { tx, wants_updates: std::sync::atomic::AtomicBool::new(false) });
        (id, rx)
    }

    pub fn unregister(&self, id: &str) {
        self.connections.remove(id);
    }

    pub fn set_subscribed(&self, id: &str, wants_updates: bool) {
        if let Some(conn) = self.connections.get(id) {
            conn.wants_updates.store(wants_updates, Ordering::Relaxed);
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn first_active(&self) -> Option<String> {
        self.connections.iter().next().map(|e| e.key().clone())
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Send to every connection; evicts any connection whose queue is
    /// closed or full on the first failed write.
    pub fn broadcast(&self, event_type: &str, data: serde_json::Value) {
        let envelope = Envelope::new(event_type, data);
        let mut dead = Vec::new();
        for entry in self.connections.iter() {
            if entry.value().tx.try_send(envelope.clone()).is_err() {
                dead.push(entry.key().clone());
            }
        }
        for id in dead {
            self.connections.remove(&id);
        }
    }

    /// Send to one connection by id. Returns `false` (without erroring) if
    /// the id is unknown or its queue write failed — callers use this to
    /// decide on `firstActive()` fallback (spec §4.9).
    pub fn send_by_id(&self, id: &str, event_type: &str, data: serde_json::Value) -> bool {
        let envelope = Envelope::new(event_type, data);
        match self.connections.get(id) {
            Some(conn) => {
                let ok = conn.tx.try_send(envelope).is_ok();
                if !ok {
                    drop(conn);
                    self.connections.remove(id);
                }
                ok
            }
            None => false,
        }
    }
}

impl Default for PushBus {
    fn default() -> Self {
        Self { connections: DashMap::new(), next_anonymous_id: AtomicU64::new(1) }
    }
}

#[async_trait]
impl ProgressSink for PushBus {
    async fn emit(&self, session_id: &str, event: ProgressEvent) {
        let (event_type, data) = encode_progress(event);
        if !self.send_by_id(session_id, event_type, data.clone()) {
            if let Some(fallback) = self.first_active() {
                self.send_by_id(&fallback, event_type, data);
            } else {
                warn!(session_id, event_type, "no active push connection for progress event");
            }
        }
    }
}

#[async_trait]
impl TtsPushSink for PushBus {
    async fn send_tts_audio(&self, session_id: &str, event: TtsAudioEvent) -> bool {
        let data = serde_json::json!({
            "requestId": event.request_id,
            "format": event.format,
            "base64": event.base64,
            "seq": event.seq,
            "last": event.last,
        });
        if self.send_by_id(session_id, "tts_audio", data.clone()) {
            return true;
        }
        match self.first_active() {
            Some(fallback) => self.send_by_id(&fallback, "tts_audio", data),
            None => false,
        }
    }

    async fn send_execution_error(&self, session_id: &str, message: &str) {
        let data = serde_json::json!({ "errorMessage": message, "errorType": "tts", "taskOrPlanId": null });
        if !self.send_by_id(session_id, "execution_error", data.clone()) {
            self.broadcast("execution_error", data);
        }
    }
}

fn encode_progress(event: ProgressEvent) -> (&'static str, serde_json::Value) {
    use serde_json::json;
    match event {
        ProgressEvent::Thinking { context } => ("thinking", json!({ "context": context })),
        ProgressEvent::ActionExecuted { action_type, description, success } => {
            ("action_executed", json!({ "actionType": action_type, "description": description, "success": success }))
        }
        ProgressEvent::IterationProgress { current, max, intent } => {
            ("iteration_progress", json!({ "current": current, "max": max, "intent": intent }))
        }
        ProgressEvent::HideWindow { reason } => ("hide_window", json!({ "reason": reason })),
        ProgressEvent::ShowWindow { reason } => ("show_window", json!({ "reason": reason })),
        ProgressEvent::PlanCreated { plan_id, goal, steps, total_steps } => {
            ("plan_created", json!({ "planId": plan_id, "goal": goal, "steps": steps, "totalSteps": total_steps }))
        }
        ProgressEvent::StepStarted { plan_id, step_id, description, step_type, progress } => (
            "step_started",
            json!({ "planId": plan_id, "stepId": step_id, "description": description, "type": step_type, "progress": progress }),
        ),
        ProgressEvent::StepCompleted { plan_id, step_id, status, result_summary, progress, execution_ms } => (
            "step_completed",
            json!({ "planId": plan_id, "stepId": step_id, "status": status, "resultSummary": result_summary, "progress": progress, "executionMs": execution_ms }),
        ),
        ProgressEvent::StepFailed { plan_id, step_id, post_mortem, progress } => (
            "step_failed",
            json!({
                "planId": plan_id,
                "stepId": step_id,
                "progress": progress,
                "postMortem": {
                    "failureReason": post_mortem.failure_reason,
                    "suggestedRecovery": post_mortem.suggested_recovery,
                },
            }),
        ),
        ProgressEvent::PlanCompleted { plan_id, status, progress } => {
            ("plan_completed", json!({ "planId": plan_id, "status": status, "progress": progress }))
        }
        ProgressEvent::PlanFailed { plan_id, reason, progress } => {
            ("plan_failed", json!({ "planId": plan_id, "reason": reason, "progress": progress }))
        }
        ProgressEvent::ExecutionError { error_message, error_type, task_or_plan_id } => (
            "execution_error",
            json!({ "errorMessage": error_message, "errorType": error_type, "taskOrPlanId": task_or_plan_id }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_by_id_to_unknown_connection_returns_false() {
        let bus = PushBus::new();
        assert!(!bus.send_by_id("missing", "thinking", serde_json::json!({})));
    }

    #[tokio::test]
    async fn send_by_id_delivers_in_submission_order() {
        let bus = PushBus::new();
        let (id, mut rx) = bus.register(Some("conn-1".into()));
        assert!(bus.send_by_id(&id, "a", serde_json::json!(1)));
        assert!(bus.send_by_id(&id, "b", serde_json::json!(2)));
        let e1 = rx.recv().await.unwrap();
        let e2 = rx.recv().await.unwrap();
        assert_eq!(e1.event_type, "a");
        assert_eq!(e2.event_type, "b");
    }

    #[tokio::test]
    async fn broadcast_reaches_every_connection() {
        let bus = PushBus::new();
        let (_id1, mut rx1) = bus.register(Some("conn-1".into()));
        let (_id2, mut rx2) = bus.register(Some("conn-2".into()));
        bus.broadcast("log", serde_json::json!({"level": "info"}));
        assert_eq!(rx1.recv().await.unwrap().event_type, "log");
        assert_eq!(rx2.recv().await.unwrap().event_type, "log");
    }

    #[tokio::test]
    async fn unregister_removes_connection() {
        let bus = PushBus::new();
        let (id, _rx) = bus.register(Some("conn-1".into()));
        assert!(bus.is_active(&id));
        bus.unregister(&id);
        assert!(!bus.is_active(&id));
    }

    #[tokio::test]
    async fn first_active_falls_back_when_target_missing() {
        let bus = PushBus::new();
        let (_id, mut rx) = bus.register(Some("conn-1".into()));
        use lavis_core::ProgressEvent;
        ProgressSink::emit(bus.as_ref(), "no-such-session", ProgressEvent::Thinking { context: "x".into() }).await;
        let e = rx.recv().await.unwrap();
        assert_eq!(e.event_type, "thinking");
    }
}
