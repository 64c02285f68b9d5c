// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use lavis_config::ActuatorConfig;
use lavis_image::ScreenSource;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::action::{ExecutionReport, ProcessReport};
use crate::bezier::{human_like_path, straight_path};
use crate::drag::execute_drag;
use crate::error::ActuatorError;
use crate::SystemActuator;

/// [`SystemActuator`] backed by `enigo`.
///
/// `Enigo` is not `Sync` on every backend, so the instance lives behind a
/// `Mutex` — pointer/keyboard calls are brief and never overlap in practice
/// since `MicroExecutor` runs one action at a time.
pub struct EnigoActuator {
    enigo: Mutex<Enigo>,
    cfg: ActuatorConfig,
    screen_size: (i32, i32),
}

impl EnigoActuator {
    pub fn new(cfg: ActuatorConfig) -> Result<Self, ActuatorError> {
        let enigo = Enigo::new(&Settings::default()).map_err(|e| ActuatorError::Input(e.to_string()))?;
        let screen_size = enigo
            .main_display()
            .map_err(|e| ActuatorError::Input(e.to_string()))?;
        Ok(Self {
            enigo: Mutex::new(enigo),
            cfg,
            screen_size,
        })
    }

    /// Clamp `(x, y)` to the configured safe zone, logging the correction.
    /// Returns the clamped point.
    fn clamp_to_safe_zone(&self, x: f64, y: f64) -> (f64, f64) {
        let (w, h) = (self.screen_size.0 as f64, self.screen_size.1 as f64);
        let min_x = self.cfg.safe_margin_left as f64;
        let max_x = (w - self.cfg.safe_margin_right as f64).max(min_x);
        let min_y = self.cfg.safe_margin_top as f64;
        let max_y = (h - self.cfg.safe_margin_bottom as f64).max(min_y);

        let clamped_x = x.clamp(min_x, max_x);
        let clamped_y = y.clamp(min_y, max_y);
        if (clamped_x - x).abs() > f64::EPSILON || (clamped_y - y).abs() > f64::EPSILON {
            debug!(requested_x = x, requested_y = y, clamped_x, clamped_y, "clamped to safe zone");
        }
        (clamped_x, clamped_y)
    }

    fn move_pointer(&self, x: f64, y: f64) -> ExecutionReport {
        let (safe_x, safe_y) = self.clamp_to_safe_zone(x, y);
        let start = Instant::now();
        let mut enigo = self.enigo.lock().unwrap();
        let (from_x, from_y) = enigo.location().unwrap_or((0, 0));

        let path = if self.cfg.human_like_motion {
            let mut rng = rand::rngs::ThreadRng::default();
            human_like_path((from_x as f64, from_y as f64), (safe_x, safe_y), 24, 1, 6, &mut rng)
        } else {
            straight_path((from_x as f64, from_y as f64), (safe_x, safe_y), 1)
        };

        let mut result = Ok(());
        for step in &path {
            if let Err(e) = enigo.move_mouse(step.x as i32, step.y as i32, Coordinate::Abs) {
                result = Err(e);
                break;
            }
            std::thread::sleep(Duration::from_millis(step.delay_ms.max(1)));
        }

        let elapsed = start.elapsed().as_millis() as u64;
        if let Err(e) = result {
            return ExecutionReport::failed(format!("pointer move failed: {e}"));
        }
        let actual = enigo.location().unwrap_or((safe_x as i32, safe_y as i32));
        ExecutionReport::from_positions(
            (x, y),
            (actual.0 as f64, actual.1 as f64),
            self.cfg.deviation_threshold,
            elapsed,
        )
    }

    fn click_button(&self, x: f64, y: f64, button: Button, double: bool) -> ExecutionReport {
        let move_report = self.move_pointer(x, y);
        if !move_report.success {
            return move_report;
        }
        let start = Instant::now();
        let mut enigo = self.enigo.lock().unwrap();
        let clicks = if double { 2 } else { 1 };
        for i in 0..clicks {
            if let Err(e) = enigo.button(button, Direction::Click) {
                return ExecutionReport::failed(format!("click failed: {e}"));
            }
            if double && i == 0 {
                std::thread::sleep(Duration::from_millis(80));
            }
        }
        let elapsed = start.elapsed().as_millis() as u64 + move_report.execution_ms;
        ExecutionReport::ok(
            (move_report.requested_x, move_report.requested_y),
            (move_report.actual_x, move_report.actual_y),
            elapsed,
            "ok",
        )
    }
}

#[async_trait]
impl SystemActuator for EnigoActuator {
    fn move_to(&self, x: f64, y: f64) -> ExecutionReport {
        self.move_pointer(x, y)
    }

    fn click(&self, x: f64, y: f64) -> ExecutionReport {
        self.click_button(x, y, Button::Left, false)
    }

    fn double_click(&self, x: f64, y: f64) -> ExecutionReport {
        self.click_button(x, y, Button::Left, true)
    }

    fn right_click(&self, x: f64, y: f64) -> ExecutionReport {
        self.click_button(x, y, Button::Right, false)
    }

    fn drag(&self, x1: f64, y1: f64, x2: f64, y2: f64) -> ExecutionReport {
        let (from_x, from_y) = self.clamp_to_safe_zone(x1, y1);
        let (to_x, to_y) = self.clamp_to_safe_zone(x2, y2);
        let start = Instant::now();
        let result = {
            let mut enigo = self.enigo.lock().unwrap();
            execute_drag(
                &mut enigo,
                (from_x, from_y),
                (to_x, to_y),
                self.cfg.human_like_motion,
                self.cfg.drag_min_steps,
            )
        };
        let elapsed = start.elapsed().as_millis() as u64;
        match result {
            Ok(()) => ExecutionReport::from_positions((x1, y1), (x2, y2), self.cfg.deviation_threshold, elapsed),
            Err(e) => ExecutionReport::failed(format!("drag failed: {e}")),
        }
    }

    fn scroll(&self, amount: i32) -> ExecutionReport {
        let start = Instant::now();
        let mut enigo = self.enigo.lock().unwrap();
        match enigo.scroll(amount, Axis::Vertical) {
            Ok(()) => ExecutionReport::ok((0.0, 0.0), (0.0, 0.0), start.elapsed().as_millis() as u64, "ok"),
            Err(e) => ExecutionReport::failed(format!("scroll failed: {e}")),
        }
    }

    fn type_text(&self, text: &str) -> ExecutionReport {
        let start = Instant::now();
        let mut enigo = self.enigo.lock().unwrap();
        match enigo.text(text) {
            Ok(()) => ExecutionReport::ok((0.0, 0.0), (0.0, 0.0), start.elapsed().as_millis() as u64, "ok"),
            Err(e) => ExecutionReport::failed(format!("type failed: {e}")),
        }
    }

    fn key(&self, combo: &str) -> ExecutionReport {
        let start = Instant::now();
        let keys = match parse_key_combo(combo) {
            Ok(k) => k,
            Err(e) => return ExecutionReport::failed(e),
        };
        let mut enigo = self.enigo.lock().unwrap();
        for k in &keys {
            if let Err(e) = enigo.key(*k, Direction::Press) {
                return ExecutionReport::failed(format!("key press failed: {e}"));
            }
        }
        for k in keys.iter().rev() {
            if let Err(e) = enigo.key(*k, Direction::Release) {
                return ExecutionReport::failed(format!("key release failed: {e}"));
            }
        }
        ExecutionReport::ok((0.0, 0.0), (0.0, 0.0), start.elapsed().as_millis() as u64, "ok")
    }

    async fn shell_exec(&self, cmd: &str, timeout_secs: Option<u64>) -> Result<ProcessReport, ActuatorError> {
        run_timed(Command::new("bash").arg("-c").arg(cmd), timeout_secs.unwrap_or(self.cfg.shell_timeout_secs)).await
    }

    async fn os_script(&self, script: &str, timeout_secs: Option<u64>) -> Result<ProcessReport, ActuatorError> {
        if cfg!(target_os = "macos") {
            run_timed(
                Command::new("osascript").arg("-e").arg(script),
                timeout_secs.unwrap_or(self.cfg.shell_timeout_secs),
            )
            .await
        } else {
            Err(ActuatorError::Unsupported("osScript requires macOS (osascript)".into()))
        }
    }

    async fn open_app(&self, name: &str) -> Result<ProcessReport, ActuatorError> {
        if cfg!(target_os = "macos") {
            run_timed(Command::new("open").arg("-a").arg(name), self.cfg.shell_timeout_secs).await
        } else if cfg!(target_os = "linux") {
            run_timed(Command::new(name), self.cfg.shell_timeout_secs).await
        } else {
            Err(ActuatorError::Unsupported("openApp is not implemented on this platform".into()))
        }
    }

    async fn open_url(&self, url: &str) -> Result<ProcessReport, ActuatorError> {
        let opener = if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        run_timed(Command::new(opener).arg(url), self.cfg.shell_timeout_secs).await
    }

    async fn reveal_in_finder(&self, path: &str) -> Result<ProcessReport, ActuatorError> {
        if cfg!(target_os = "macos") {
            run_timed(Command::new("open").arg("-R").arg(path), self.cfg.shell_timeout_secs).await
        } else {
            run_timed(Command::new("xdg-open").arg(path), self.cfg.shell_timeout_secs).await
        }
    }

    fn clipboard_get(&self) -> Result<String, ActuatorError> {
        let mut clipboard = arboard::Clipboard::new().map_err(|e| ActuatorError::Clipboard(e.to_string()))?;
        clipboard.get_text().map_err(|e| ActuatorError::Clipboard(e.to_string()))
    }

    fn clipboard_set(&self, text: &str) -> Result<(), ActuatorError> {
        let mut clipboard = arboard::Clipboard::new().map_err(|e| ActuatorError::Clipboard(e.to_string()))?;
        clipboard.set_text(text).map_err(|e| ActuatorError::Clipboard(e.to_string()))
    }

    fn volume_get(&self) -> Result<u32, ActuatorError> {
        Err(ActuatorError::Unsupported("volumeGet requires a platform-specific audio backend".into()))
    }

    fn volume_set(&self, _level: u32) -> Result<(), ActuatorError> {
        Err(ActuatorError::Unsupported("volumeSet requires a platform-specific audio backend".into()))
    }

    async fn screenshot_to_file(&self, path: &str) -> Result<(), ActuatorError> {
        let source = lavis_image::XcapScreenSource;
        let frame = source
            .capture()
            .map_err(|e| ActuatorError::Input(format!("screenshot failed: {e}")))?;
        frame
            .image
            .save(path)
            .map_err(|e| ActuatorError::Input(format!("failed to save screenshot: {e}")))
    }

    fn notify(&self, title: &str, msg: &str) -> Result<(), ActuatorError> {
        if cfg!(target_os = "macos") {
            let script = format!(
                "display notification \"{}\" with title \"{}\"",
                msg.replace('"', "\\\""),
                title.replace('"', "\\\"")
            );
            std::process::Command::new("osascript")
                .arg("-e")
                .arg(script)
                .status()
                .map_err(|e| ActuatorError::Spawn(e.to_string()))?;
        } else {
            let status = std::process::Command::new("notify-send").arg(title).arg(msg).status();
            if status.is_err() {
                warn!(title, msg, "notify-send unavailable; dropping notification");
            }
        }
        Ok(())
    }
}

async fn run_timed(cmd: &mut Command, timeout_secs: u64) -> Result<ProcessReport, ActuatorError> {
    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);
    let result = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output()).await;
    match result {
        Ok(Ok(output)) => {
            let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.is_empty() {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&stderr);
            }
            Ok(ProcessReport {
                success: output.status.success(),
                output: text,
                exit_code: output.status.code(),
            })
        }
        Ok(Err(e)) => Err(ActuatorError::Spawn(e.to_string())),
        Err(_) => Err(ActuatorError::Timeout(timeout_secs)),
    }
}

/// Parse a combo like `"Cmd+Shift+A"` or `"Enter"` into an ordered key list
/// (modifiers first, in written order).
fn parse_key_combo(combo: &str) -> Result<Vec<enigo::Key>, String> {
    combo
        .split('+')
        .map(|part| match part.trim() {
            "Enter" | "Return" => Ok(enigo::Key::Return),
            "Escape" | "Esc" => Ok(enigo::Key::Escape),
            "Tab" => Ok(enigo::Key::Tab),
            "Backspace" => Ok(enigo::Key::Backspace),
            "Delete" => Ok(enigo::Key::Delete),
            "Space" => Ok(enigo::Key::Space),
            "Up" => Ok(enigo::Key::UpArrow),
            "Down" => Ok(enigo::Key::DownArrow),
            "Left" => Ok(enigo::Key::LeftArrow),
            "Right" => Ok(enigo::Key::RightArrow),
            "Cmd" | "Meta" | "Super" => Ok(enigo::Key::Meta),
            "Ctrl" | "Control" => Ok(enigo::Key::Control),
            "Alt" | "Option" => Ok(enigo::Key::Alt),
            "Shift" => Ok(enigo::Key::Shift),
            single if single.chars().count() == 1 => Ok(enigo::Key::Unicode(single.chars().next().unwrap())),
            other => Err(format!("unrecognised key in combo: {other:?}")),
        })
        .collect()
}
