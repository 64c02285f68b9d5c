// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! `SystemActuator` (spec component C1): pointer/keyboard/shell/OS-script
//! primitives with logical-coordinate safe zones and deviation reporting.
//!
//! Built on `enigo` for cross-platform pointer/keyboard synthesis and
//! `tokio::process::Command` for `shellExec`/`osScript`, each wrapped in a
//! hard `tokio::time::timeout`. Pointer primitives never throw — failures
//! surface as `ExecutionReport { success: false, .. }` so the decision loop
//! can react to a failed click the same way it reacts to a misclick.

pub mod action;
pub mod bezier;
mod drag;
mod enigo_actuator;
mod error;

pub use action::{Action, ExecutionReport, ProcessReport};
pub use enigo_actuator::EnigoActuator;
pub use error::ActuatorError;

use async_trait::async_trait;

/// Cross-platform system-interaction surface. All pointer coordinates are
/// logical screen units; implementations clamp to the configured safe zone
/// before every move.
#[async_trait]
pub trait SystemActuator: Send + Sync {
    fn move_to(&self, x: f64, y: f64) -> ExecutionReport;
    fn click(&self, x: f64, y: f64) -> ExecutionReport;
    fn double_click(&self, x: f64, y: f64) -> ExecutionReport;
    fn right_click(&self, x: f64, y: f64) -> ExecutionReport;
    fn drag(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> ExecutionReport;
    fn scroll(&self, amount: i32) -> ExecutionReport;

    fn type_text(&self, text: &str) -> ExecutionReport;
    fn key(&self, combo: &str) -> ExecutionReport;
    fn press_enter(&self) -> ExecutionReport {
        self.key("Enter")
    }
    fn press_escape(&self) -> ExecutionReport {
        self.key("Escape")
    }
    fn press_tab(&self) -> ExecutionReport {
        self.key("Tab")
    }
    fn press_backspace(&self) -> ExecutionReport {
        self.key("Backspace")
    }
    fn copy(&self) -> ExecutionReport {
        self.key("Cmd+C")
    }
    fn paste(&self) -> ExecutionReport {
        self.key("Cmd+V")
    }
    fn save(&self) -> ExecutionReport {
        self.key("Cmd+S")
    }
    fn undo(&self) -> ExecutionReport {
        self.key("Cmd+Z")
    }
    fn select_all(&self) -> ExecutionReport {
        self.key("Cmd+A")
    }

    async fn shell_exec(&self, cmd: &str, timeout_secs: Option<u64>) -> Result<ProcessReport, ActuatorError>;
    async fn os_script(&self, script: &str, timeout_secs: Option<u64>) -> Result<ProcessReport, ActuatorError>;

    async fn open_app(&self, name: &str) -> Result<ProcessReport, ActuatorError>;
    async fn open_url(&self, url: &str) -> Result<ProcessReport, ActuatorError>;
    async fn reveal_in_finder(&self, path: &str) -> Result<ProcessReport, ActuatorError>;

    fn clipboard_get(&self) -> Result<String, ActuatorError>;
    fn clipboard_set(&self, text: &str) -> Result<(), ActuatorError>;

    fn volume_get(&self) -> Result<u32, ActuatorError>;
    fn volume_set(&self, level: u32) -> Result<(), ActuatorError>;

    async fn screenshot_to_file(&self, path: &str) -> Result<(), ActuatorError>;
    fn notify(&self, title: &str, msg: &str) -> Result<(), ActuatorError>;
}
