// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Human-like pointer paths: a quadratic Bézier curve through a randomized
//! control point, stepped with randomized per-step delays. A straight path
//! is used for mechanical mode and as the drag skeleton (policy in
//! [`crate::drag`] adds the press/dwell/release envelope around it).

use rand::Rng;

/// One step of a synthesized pointer path: target position plus the delay
/// to sleep before moving there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathStep {
    pub x: f64,
    pub y: f64,
    pub delay_ms: u64,
}

/// Minimum step count enforced by drag policy: `max(30, distance / 3)`.
pub fn min_drag_steps(distance: f64) -> u32 {
    (distance / 3.0).ceil().max(30.0) as u32
}

/// Straight-line path with `steps` evenly spaced points and no delay jitter
/// (used for mechanical mode).
pub fn straight_path(from: (f64, f64), to: (f64, f64), steps: u32) -> Vec<PathStep> {
    let steps = steps.max(1);
    (1..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            PathStep {
                x: lerp(from.0, to.0, t),
                y: lerp(from.1, to.1, t),
                delay_ms: 1,
            }
        })
        .collect()
}

/// Quadratic-Bézier path through a control point offset perpendicular to the
/// straight line by a random amount, with randomized per-step delay in
/// `[min_delay_ms, max_delay_ms]`. Uses the given `rng` so callers can seed
/// deterministically in tests.
pub fn human_like_path<R: Rng + ?Sized>(
    from: (f64, f64),
    to: (f64, f64),
    steps: u32,
    min_delay_ms: u64,
    max_delay_ms: u64,
    rng: &mut R,
) -> Vec<PathStep> {
    let steps = steps.max(1);
    let dx = to.0 - from.0;
    let dy = to.1 - from.1;
    let dist = (dx * dx + dy * dy).sqrt();

    // Control point: midpoint displaced perpendicular to the travel line by
    // up to 15% of the distance, capped at 60px so short moves stay tight.
    let max_offset = (dist * 0.15).min(60.0);
    let offset = if dist > 0.0 {
        rng.gen_range(-max_offset..=max_offset)
    } else {
        0.0
    };
    let (perp_x, perp_y) = if dist > 0.0 {
        (-dy / dist, dx / dist)
    } else {
        (0.0, 0.0)
    };
    let mid_x = (from.0 + to.0) / 2.0 + perp_x * offset;
    let mid_y = (from.1 + to.1) / 2.0 + perp_y * offset;

    (1..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            let x = quad_bezier(from.0, mid_x, to.0, t);
            let y = quad_bezier(from.1, mid_y, to.1, t);
            let delay_ms = if max_delay_ms > min_delay_ms {
                rng.gen_range(min_delay_ms..=max_delay_ms)
            } else {
                min_delay_ms
            };
            PathStep { x, y, delay_ms }
        })
        .collect()
}

fn quad_bezier(p0: f64, p1: f64, p2: f64, t: f64) -> f64 {
    let u = 1.0 - t;
    u * u * p0 + 2.0 * u * t * p1 + t * t * p2
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn straight_path_ends_at_target() {
        let path = straight_path((0.0, 0.0), (100.0, 50.0), 10);
        let last = path.last().unwrap();
        assert!((last.x - 100.0).abs() < 1e-9);
        assert!((last.y - 50.0).abs() < 1e-9);
        assert_eq!(path.len(), 10);
    }

    #[test]
    fn human_like_path_ends_at_target() {
        let mut rng = StdRng::seed_from_u64(42);
        let path = human_like_path((0.0, 0.0), (200.0, 200.0), 40, 1, 5, &mut rng);
        let last = path.last().unwrap();
        assert!((last.x - 200.0).abs() < 1e-6);
        assert!((last.y - 200.0).abs() < 1e-6);
    }

    #[test]
    fn human_like_path_is_deterministic_for_same_seed() {
        let mut rng1 = StdRng::seed_from_u64(7);
        let mut rng2 = StdRng::seed_from_u64(7);
        let a = human_like_path((0.0, 0.0), (50.0, 0.0), 20, 1, 10, &mut rng1);
        let b = human_like_path((0.0, 0.0), (50.0, 0.0), 20, 1, 10, &mut rng2);
        assert_eq!(a, b);
    }

    #[test]
    fn human_like_path_delays_stay_within_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let path = human_like_path((0.0, 0.0), (300.0, 0.0), 30, 2, 8, &mut rng);
        for step in &path {
            assert!(step.delay_ms >= 2 && step.delay_ms <= 8);
        }
    }

    #[test]
    fn min_drag_steps_enforces_floor_of_30() {
        assert_eq!(min_drag_steps(10.0), 30);
    }

    #[test]
    fn min_drag_steps_scales_with_distance() {
        assert_eq!(min_drag_steps(300.0), 100);
    }
}
