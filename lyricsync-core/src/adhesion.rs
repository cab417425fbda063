//! Spring-damped adhesion of the display clock to a target clock.
//!
//! The error between target and display is classified into four tiers:
//!
//! | `|error|` (ms)              | Strategy      | Effect                                  |
//! |-----------------------------|---------------|-----------------------------------------|
//! | `> hard`                    | `Hard`        | display snaps to target                 |
//! | `(soft_hi, hard]`           | `StrongSoft`  | spring with `target_settle_ms`          |
//! | `(freeze, soft_hi]`         | `WeakSoft`    | spring with a longer settle time        |
//! | `<= freeze`                 | `Freeze`      | no correction, velocity cleared         |
//!
//! Once frozen the display stays frozen until the error exceeds `soft_lo`,
//! which keeps micro-jitter around the freeze boundary from re-engaging the
//! spring every other frame.
//!
//! The spring is a semi-implicit Euler integration of
//! `a = k * error - c * v` with `ω = 2π / T_settle`, `k = ω²`, `c = 2ζω`.

use crate::config::AdhesionConfig;
use crate::time::{circular_delta, clamp_frame_delta, wrap_time};
use std::f64::consts::TAU;

/// Correction applied on the most recent adhesion step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdhesionStrategy {
    #[default]
    Freeze,
    WeakSoft,
    StrongSoft,
    Hard,
}

/// Convergence bookkeeping exposed for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AdhesionState {
    pub strategy: AdhesionStrategy,
    /// Signed `target - display` in seconds, measured before correction
    pub error: f64,
    pub target_time: f64,
    pub is_stable: bool,
    pub stable_frame_count: u32,
    /// Spring velocity in seconds per second
    pub velocity: f64,
}

/// Angular frequency, stiffness and damping derived from a settle time.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SpringCoefficients {
    stiffness: f64,
    damping: f64,
}

impl SpringCoefficients {
    fn new(damping_ratio: f64, settle_ms: f64) -> Self {
        let omega = TAU / (settle_ms / 1000.0);
        Self {
            stiffness: omega * omega,
            damping: 2.0 * damping_ratio * omega,
        }
    }
}

/// Spring integrator plus threshold tiering.
#[derive(Debug, Clone)]
pub struct Adhesion {
    config: AdhesionConfig,
    strong: SpringCoefficients,
    weak: SpringCoefficients,
    state: AdhesionState,
}

impl Adhesion {
    #[must_use]
    pub fn new(config: AdhesionConfig) -> Self {
        let strong = SpringCoefficients::new(config.damping_ratio, config.target_settle_ms);
        let weak = SpringCoefficients::new(
            config.damping_ratio,
            config.target_settle_ms * config.weak_settle_factor,
        );
        Self {
            config,
            strong,
            weak,
            state: AdhesionState::default(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> &AdhesionState {
        &self.state
    }

    /// Classify an absolute error in milliseconds, honouring freeze hysteresis.
    #[must_use]
    pub fn classify(&self, abs_error_ms: f64) -> AdhesionStrategy {
        let c = &self.config;
        if abs_error_ms > c.hard_ms {
            AdhesionStrategy::Hard
        } else if abs_error_ms <= c.freeze_ms || (self.state.is_stable && abs_error_ms <= c.soft_lo_ms)
        {
            AdhesionStrategy::Freeze
        } else if abs_error_ms > c.soft_hi_ms {
            AdhesionStrategy::StrongSoft
        } else {
            AdhesionStrategy::WeakSoft
        }
    }

    /// Advance `display` one frame towards `target` and return the new display time.
    ///
    /// Times live on a loop of length `duration`; the error is the shortest
    /// signed distance around it and the result is wrapped into `[0, duration)`.
    /// `dt_ms` is clamped to the configured frame-delta window.
    pub fn step(&mut self, display: f64, target: f64, dt_ms: f64, duration: f64) -> f64 {
        let error = circular_delta(target, display, duration);
        let abs_error_ms = error.abs() * 1000.0;
        let strategy = self.classify(abs_error_ms);

        self.state.error = error;
        self.state.target_time = target;
        self.state.strategy = strategy;

        match strategy {
            AdhesionStrategy::Hard => {
                self.state.velocity = 0.0;
                self.state.is_stable = false;
                self.state.stable_frame_count = 0;
                wrap_time(target, duration)
            }
            AdhesionStrategy::Freeze => {
                self.state.velocity = 0.0;
                self.state.is_stable = true;
                self.state.stable_frame_count = self.state.stable_frame_count.saturating_add(1);
                display
            }
            AdhesionStrategy::StrongSoft | AdhesionStrategy::WeakSoft => {
                self.state.is_stable = false;
                self.state.stable_frame_count = 0;
                let spring = if strategy == AdhesionStrategy::StrongSoft {
                    self.strong
                } else {
                    self.weak
                };
                let dt = clamp_frame_delta(dt_ms, self.config.min_dt_ms, self.config.max_dt_ms) / 1000.0;
                let acceleration = spring.stiffness * error - spring.damping * self.state.velocity;
                self.state.velocity += acceleration * dt;
                wrap_time(display + self.state.velocity * dt, duration)
            }
        }
    }

    /// Forget velocity and convergence history.
    pub fn reset(&mut self) {
        self.state = AdhesionState::default();
    }

    /// Reset only the consecutive-stable counter.
    pub fn reset_stable_frames(&mut self) {
        self.state.stable_frame_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOOP: f64 = 600.0;

    #[test]
    fn test_classify_tiers() {
        let adhesion = Adhesion::new(AdhesionConfig::default());
        assert_eq!(adhesion.classify(5.0), AdhesionStrategy::Freeze);
        assert_eq!(adhesion.classify(10.0), AdhesionStrategy::Freeze);
        assert_eq!(adhesion.classify(20.0), AdhesionStrategy::WeakSoft);
        assert_eq!(adhesion.classify(120.0), AdhesionStrategy::WeakSoft);
        assert_eq!(adhesion.classify(121.0), AdhesionStrategy::StrongSoft);
        assert_eq!(adhesion.classify(800.0), AdhesionStrategy::StrongSoft);
        assert_eq!(adhesion.classify(801.0), AdhesionStrategy::Hard);
    }

    #[test]
    fn test_freeze_hysteresis() {
        let mut adhesion = Adhesion::new(AdhesionConfig::default());
        // Settle into freeze
        adhesion.step(1.0, 1.005, 16.0, LOOP);
        assert!(adhesion.state().is_stable);
        // 20 ms is inside the hysteresis band: stays frozen
        assert_eq!(adhesion.classify(20.0), AdhesionStrategy::Freeze);
        // 40 ms exceeds soft_lo: correction re-engages
        assert_eq!(adhesion.classify(40.0), AdhesionStrategy::WeakSoft);
    }

    #[test]
    fn test_hard_snap_is_exact() {
        let mut adhesion = Adhesion::new(AdhesionConfig::default());
        let display = adhesion.step(3.0, 42.0, 16.0, LOOP);
        assert!((display - 42.0).abs() < f64::EPSILON);
        assert_eq!(adhesion.state().strategy, AdhesionStrategy::Hard);
        assert!(adhesion.state().velocity.abs() < f64::EPSILON);
    }

    #[test]
    fn test_soft_adhesion_converges_within_twice_settle_time() {
        let config = AdhesionConfig::default();
        let freeze_s = config.freeze_ms / 1000.0;
        let budget_frames = (2.0 * config.target_settle_ms / 16.0).ceil();
        let mut adhesion = Adhesion::new(config);

        let target = 0.5;
        let mut display = 0.0;
        let mut converged_at = None;
        let mut peak_velocity: f64 = 0.0;
        for frame in 0..200_u32 {
            display = adhesion.step(display, target, 16.0, LOOP);
            peak_velocity = peak_velocity.max(adhesion.state().velocity.abs());
            if converged_at.is_none() && (target - display).abs() < freeze_s {
                converged_at = Some(frame + 1);
            }
        }

        let converged_at = converged_at.unwrap();
        assert!(f64::from(converged_at) <= budget_frames, "converged after {converged_at} frames");
        assert!((target - display).abs() < freeze_s);
        assert!(adhesion.state().velocity.abs() < 1e-9);
        assert!(peak_velocity < 10.0);
    }

    #[test]
    fn test_soft_adhesion_does_not_overshoot_past_freeze() {
        let mut adhesion = Adhesion::new(AdhesionConfig::default());
        let mut display = 0.0;
        for _ in 0..100 {
            display = adhesion.step(display, 0.5, 16.0, LOOP);
            assert!(display <= 0.5 + 0.010, "overshot to {display}");
        }
    }

    #[test]
    fn test_dt_spike_is_clamped() {
        let mut spiky = Adhesion::new(AdhesionConfig::default());
        let mut clamped = Adhesion::new(AdhesionConfig::default());
        let a = spiky.step(0.0, 0.5, 5_000.0, LOOP);
        let b = clamped.step(0.0, 0.5, 33.0, LOOP);
        assert!((a - b).abs() < 1e-12);
        assert!(a < 0.5);
    }

    #[test]
    fn test_error_uses_shortest_path_around_loop() {
        let mut adhesion = Adhesion::new(AdhesionConfig::default());
        // 14.95 -> 0.05 on a 15 s loop is 100 ms forward, a weak soft step
        let display = adhesion.step(14.95, 0.05, 16.0, 15.0);
        assert_eq!(adhesion.state().strategy, AdhesionStrategy::WeakSoft);
        assert!(adhesion.state().error > 0.0);
        assert!((0.0..15.0).contains(&display));
    }

    #[test]
    fn test_stable_frame_counter() {
        let mut adhesion = Adhesion::new(AdhesionConfig::default());
        for _ in 0..3 {
            adhesion.step(2.0, 2.001, 16.0, LOOP);
        }
        assert_eq!(adhesion.state().stable_frame_count, 3);
        adhesion.reset_stable_frames();
        assert_eq!(adhesion.state().stable_frame_count, 0);
        adhesion.step(2.0, 3.0, 16.0, LOOP);
        assert!(!adhesion.state().is_stable);
    }
}
