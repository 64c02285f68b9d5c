// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use lavis_actuator::ActuatorError;
use lavis_image::ImageError;
use lavis_model::ModelError;

/// Structured-output parsing failures (spec error taxonomy `ParseError`).
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("decision bundle malformed: {0}")]
    DecisionBundleMalformed(String),
}

/// Errors surfaced by `MicroExecutor`/`TaskOrchestrator` that do not recover
/// locally (see spec §7 propagation policy — `ActuatorError::Permission` and
/// repeated `ParseError`s become a `PostMortem` instead of bubbling here).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("model error: {0}")]
    Model(#[from] ModelError),
    #[error("actuator error: {0}")]
    Actuator(#[from] ActuatorError),
    #[error("screen capture error: {0}")]
    Image(#[from] ImageError),
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}
