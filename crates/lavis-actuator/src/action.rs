// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `Action`/`ExecutionReport`: the tagged-union command set `MicroExecutor`
//! issues and the uniform result `SystemActuator` returns for each one.

use serde::{Deserialize, Serialize};

/// One primitive command from a `DecisionBundle.executeNow` action list.
/// Coordinates are always logical screen units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Action {
    Click { x: f64, y: f64 },
    DoubleClick { x: f64, y: f64 },
    RightClick { x: f64, y: f64 },
    Drag { x1: f64, y1: f64, x2: f64, y2: f64 },
    Scroll { amount: i32 },
    Type { text: String },
    Key { combo: String },
    ShellExec { cmd: String },
    OpenApp { name: String },
    Wait { ms: u64 },
    CompleteMilestone { summary: String },
}

/// Result of one `SystemActuator` primitive call.
///
/// Invariant: if `|delta_x| > threshold` or `|delta_y| > threshold`,
/// `success` is `false` — enforced by [`crate::EnigoActuator`] after every
/// pointer move, never left to the caller to check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub success: bool,
    pub requested_x: f64,
    pub requested_y: f64,
    pub actual_x: f64,
    pub actual_y: f64,
    pub delta_x: f64,
    pub delta_y: f64,
    pub execution_ms: u64,
    pub message: String,
}

impl ExecutionReport {
    pub fn ok(requested: (f64, f64), actual: (f64, f64), execution_ms: u64, message: impl Into<String>) -> Self {
        let (dx, dy) = (actual.0 - requested.0, actual.1 - requested.1);
        Self {
            success: true,
            requested_x: requested.0,
            requested_y: requested.1,
            actual_x: actual.0,
            actual_y: actual.1,
            delta_x: dx,
            delta_y: dy,
            execution_ms,
            message: message.into(),
        }
    }

    /// Build a report from requested/actual coordinates, applying the
    /// deviation-threshold invariant: `success` flips to `false` whenever the
    /// observed drift exceeds `threshold` logical pixels on either axis.
    pub fn from_positions(
        requested: (f64, f64),
        actual: (f64, f64),
        threshold: f64,
        execution_ms: u64,
    ) -> Self {
        let mut report = Self::ok(requested, actual, execution_ms, "");
        if report.delta_x.abs() > threshold || report.delta_y.abs() > threshold {
            report.success = false;
            report.message = format!(
                "pointer deviated by ({:.1}, {:.1}) px, exceeding threshold {:.1}",
                report.delta_x, report.delta_y, threshold
            );
        } else {
            report.message = "ok".into();
        }
        report
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Default::default()
        }
    }
}

/// `(success, output, exit_code)` as returned by `shellExec`/`osScript`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessReport {
    pub success: bool,
    pub output: String,
    pub exit_code: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_threshold_is_success() {
        let r = ExecutionReport::from_positions((100.0, 100.0), (101.0, 99.5), 5.0, 12);
        assert!(r.success);
    }

    #[test]
    fn exceeding_threshold_on_x_fails() {
        let r = ExecutionReport::from_positions((100.0, 100.0), (110.0, 100.0), 5.0, 12);
        assert!(!r.success);
    }

    #[test]
    fn exceeding_threshold_on_y_fails() {
        let r = ExecutionReport::from_positions((100.0, 100.0), (100.0, 110.0), 5.0, 12);
        assert!(!r.success);
    }

    #[test]
    fn exactly_at_threshold_is_success() {
        let r = ExecutionReport::from_positions((0.0, 0.0), (5.0, 0.0), 5.0, 1);
        assert!(r.success);
    }

    #[test]
    fn action_serializes_with_type_tag() {
        let a = Action::Click { x: 1.0, y: 2.0 };
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["type"], "click");
        assert_eq!(v["x"], 1.0);
    }
}
