// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Stable error taxonomy for `SystemActuator` failures that escape into the
/// decision loop (pointer primitives never throw — see [`crate::ExecutionReport`]).
#[derive(Debug, Error)]
pub enum ActuatorError {
    #[error("input synthesis backend error: {0}")]
    Input(String),

    #[error("command timed out after {0}s")]
    Timeout(u64),

    #[error("command denied by policy: {0}")]
    Denied(String),

    #[error("shell/script spawn error: {0}")]
    Spawn(String),

    #[error("clipboard error: {0}")]
    Clipboard(String),

    #[error("unsupported on this platform: {0}")]
    Unsupported(String),
}
