// SPDX-License-Identifier: Apache-2.0
//! Resolves the schedule's declared [`TimeModel`] against an absolute
//! timestamp into the per-frame scalars `time` nodes read.

use crate::schedule::TimeModel;

/// Session-scoped time bookkeeping; survives hot-swap.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeState {
    /// The previous frame's resolved `t_ms`, used to derive `dt`.
    pub last_t_ms: Option<f64>,
    /// Accumulated energy quantity (monotonic unless reset externally).
    pub energy: f64,
}

/// The resolved time quantities one frame's `time{which}` nodes read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTime {
    /// Absolute milliseconds, after `timeModel=finite` clamping.
    pub t_ms: f64,
    /// Frame delta in milliseconds; `0.0` on the first frame.
    pub dt: f64,
    /// First cyclic phase, `[0, 1)`.
    pub phase_a: f64,
    /// Second cyclic phase, `[0, 1)`.
    pub phase_b: f64,
    /// Whether this frame carries a pulse (always `true`; frame policy
    /// decides observable effect).
    pub pulse: bool,
    /// Accumulated energy quantity.
    pub energy: f64,
}

fn phase_of(t_ms: f64, period_ms: Option<f64>) -> f64 {
    match period_ms {
        Some(period) if period > 0.0 => (t_ms.rem_euclid(period)) / period,
        _ => 0.0,
    }
}

/// Resolves `t_abs_ms` against `model`, updating `state` in place and
/// returning the per-frame time scalars.
///
/// `timeModel=finite` clamps the reported `t_ms` to `[0, durationMs]`; time
/// itself never runs backwards within a session, matching the ordering
/// guarantee that `t_ms` is otherwise monotonic.
pub fn resolve_time(t_abs_ms: f64, model: &TimeModel, state: &mut TimeState) -> ResolvedTime {
    let (t_ms, period_a, period_b) = match *model {
        TimeModel::Infinite => (t_abs_ms, None, None),
        TimeModel::Cyclic {
            period_a_ms,
            period_b_ms,
        } => (t_abs_ms, Some(period_a_ms), Some(period_b_ms)),
        TimeModel::Finite {
            duration_ms,
            period_a_ms,
            period_b_ms,
        } => (t_abs_ms.clamp(0.0, duration_ms), period_a_ms, period_b_ms),
    };

    let dt = state.last_t_ms.map_or(0.0, |prev| t_ms - prev);
    state.last_t_ms = Some(t_ms);
    state.energy += dt.max(0.0);

    ResolvedTime {
        t_ms,
        dt,
        phase_a: phase_of(t_ms, period_a),
        phase_b: phase_of(t_ms, period_b),
        pulse: true,
        energy: state.energy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_frame_has_zero_dt() {
        let mut state = TimeState::default();
        let resolved = resolve_time(1000.0, &TimeModel::Infinite, &mut state);
        assert_eq!(resolved.dt, 0.0);
        assert_eq!(resolved.t_ms, 1000.0);
    }

    #[test]
    fn finite_model_clamps_progress() {
        let mut state = TimeState::default();
        let resolved = resolve_time(5000.0, &TimeModel::Finite {
            duration_ms: 2000.0,
            period_a_ms: None,
            period_b_ms: None,
        }, &mut state);
        assert_eq!(resolved.t_ms, 2000.0);
    }

    #[test]
    fn cyclic_phase_wraps_into_unit_interval() {
        let mut state = TimeState::default();
        let resolved = resolve_time(
            2500.0,
            &TimeModel::Cyclic {
                period_a_ms: 1000.0,
                period_b_ms: 4000.0,
            },
            &mut state,
        );
        assert!((resolved.phase_a - 0.5).abs() < 1e-9);
        assert!((resolved.phase_b - 0.625).abs() < 1e-9);
    }
}
