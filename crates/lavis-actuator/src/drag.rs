// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Drag policy: press → dwell ≥ 50ms → path (≥ 1ms/step) → dwell ≥ 50ms →
//! release, with a step count floor to avoid OS drag-cancellation.

use std::time::Duration;

use enigo::{Coordinate, Enigo, Mouse};
use rand::rngs::ThreadRng;

use crate::bezier::{human_like_path, min_drag_steps, straight_path};
use crate::ActuatorError;

/// Minimum dwell before and after the drag path, per spec §4.1.
pub const DWELL_MS: u64 = 50;

pub fn execute_drag(
    enigo: &mut Enigo,
    from: (f64, f64),
    to: (f64, f64),
    human_like: bool,
    configured_min_steps: u32,
) -> Result<(), ActuatorError> {
    let dist = ((to.0 - from.0).powi(2) + (to.1 - from.1).powi(2)).sqrt();
    let steps = configured_min_steps.max(min_drag_steps(dist));

    let path = if human_like {
        let mut rng = ThreadRng::default();
        human_like_path(from, to, steps, 1, 6, &mut rng)
    } else {
        straight_path(from, to, steps)
    };

    enigo
        .button(enigo::Button::Left, enigo::Direction::Press)
        .map_err(|e| ActuatorError::Input(e.to_string()))?;
    std::thread::sleep(Duration::from_millis(DWELL_MS));

    for step in path {
        enigo
            .move_mouse(step.x as i32, step.y as i32, Coordinate::Abs)
            .map_err(|e| ActuatorError::Input(e.to_string()))?;
        std::thread::sleep(Duration::from_millis(step.delay_ms.max(1)));
    }

    std::thread::sleep(Duration::from_millis(DWELL_MS));
    enigo
        .button(enigo::Button::Left, enigo::Direction::Release)
        .map_err(|e| ActuatorError::Input(e.to_string()))?;
    Ok(())
}
