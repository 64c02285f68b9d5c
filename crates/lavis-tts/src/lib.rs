// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Speech-worthiness gating and asynchronous speech synthesis for assistant
//! replies (spec component C12: `AsyncTts` + `TtsGate`).
//!
//! `lavis-tts` depends on [`lavis_model::ModelGateway`] for both the gating
//! classification call and the actual TTS synthesis, and on [`TtsPushSink`]
//! — not on `lavis-node`'s `PushBus` directly — so the crate graph stays
//! acyclic. `lavis-bootstrap` wires a `PushBus` implementation of
//! `TtsPushSink` into an [`AsyncTts`] at composition time.

mod gate;
mod sink;
mod worker;

pub use gate::TtsGate;
pub use sink::{TtsAudioEvent, TtsPushSink};
pub use worker::AsyncTts;
