//! Transition planning
//!
//! A fade from the current color to a target over a time budget becomes a
//! bounded list of color steps. The step count follows the largest channel
//! difference but never exceeds what the time one step takes on the wire
//! allows. A step of a hue-dial family is several commands, each followed by
//! the family delay.

use std::time::Duration;

use crate::color::{clamp_channel, Rgbw};

/// One intermediate or final color of a fade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeStep {
    pub color: Rgbw,
    /// Delay after this step; `None` keeps the family default
    pub delay: Option<Duration>,
    pub last: bool,
}

/// Plan a fade from `from` to `to` over `budget` tenths of a second, where
/// writing one step takes at least `step_cost_ms`.
///
/// Always yields at least one step and the last step is exactly `to`.
/// White is interpolated only when both colors carry it; a target without
/// white leaves the current white untouched.
pub fn plan_fade(from: Rgbw, to: Rgbw, budget: u32, step_cost_ms: u64) -> Vec<FadeStep> {
    let white_at = |i: u64, steps: u64| match (from.white, to.white) {
        (Some(f), Some(t)) => Some(lerp(f, t, i, steps)),
        (f, None) => f,
        (None, Some(t)) => (i == steps).then_some(t),
    };

    if budget == 0 {
        return vec![FadeStep {
            color: to.with_white(white_at(1, 1)),
            delay: None,
            last: true,
        }];
    }

    let delta = |a: u8, b: u8| (b as i32 - a as i32).unsigned_abs() as u64;
    let white_delta = match (from.white, to.white) {
        (Some(f), Some(t)) => delta(f, t),
        _ => 0,
    };
    let max_delta = delta(from.red, to.red)
        .max(delta(from.green, to.green))
        .max(delta(from.blue, to.blue))
        .max(white_delta)
        .max(1);

    let budget_ms = budget as u64 * 100;
    let cap = budget_ms / step_cost_ms.max(1);
    let steps = max_delta.min(cap).max(1);
    let step_delay = Duration::from_millis((budget_ms as f64 / steps as f64).round() as u64);

    (1..=steps)
        .map(|i| {
            let last = i == steps;
            let color = if last {
                to.with_white(white_at(i, steps))
            } else {
                Rgbw {
                    red: lerp(from.red, to.red, i, steps),
                    green: lerp(from.green, to.green, i, steps),
                    blue: lerp(from.blue, to.blue, i, steps),
                    white: white_at(i, steps),
                }
            };
            FadeStep {
                color,
                delay: Some(step_delay),
                last,
            }
        })
        .collect()
}

fn lerp(from: u8, to: u8, i: u64, steps: u64) -> u8 {
    let d = (to as f64 - from as f64) / steps as f64;
    clamp_channel(from as f64 + d * i as f64)
}
