// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Adaptive frame-rate control with hysteresis.
//!
//! The [`AdaptiveRateController`] walks a short ladder of
//! [`QualityLevel`]s (by default 24, 30, 45 and 60 fps), starting at the top.
//! Each level pairs a target frame rate with a [`CullingAggressiveness`] that
//! the culling pipeline applies to its buffer and feature caps.
//!
//! # Adaptive behavior
//!
//! With [`DegradationPolicy::Adaptive`], a degraded sampler steps quality down
//! one level immediately, while stepping up needs `recovery_samples`
//! consecutive healthy samples. After any transition the controller ignores
//! the sampler for [`RateControllerConfig::cooldown`], so a single spike
//! cannot make it oscillate. [`force_step_down`] bypasses the cooldown and is
//! reserved for resource exhaustion.
//!
//! [`force_step_down`]: AdaptiveRateController::force_step_down

use log::info;

use crate::error::ConfigError;
use crate::sampler::PerformanceSampler;
use crate::time::{Duration, HostTime};

/// Number of rungs on the quality ladder.
pub const LEVEL_COUNT: usize = 4;

/// Scales applied by the culling pipeline at a given quality level.
///
/// Both factors are in `(0, 1]`; `1.0` means no extra reduction.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CullingAggressiveness {
    /// Multiplier on the adaptive viewport buffer fraction.
    pub buffer_scale: f64,
    /// Multiplier on the LOD feature cap.
    pub feature_scale: f64,
}

impl CullingAggressiveness {
    /// No reduction.
    pub const FULL: Self = Self {
        buffer_scale: 1.0,
        feature_scale: 1.0,
    };

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("buffer_scale", self.buffer_scale),
            ("feature_scale", self.feature_scale),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::Scale { name, value });
            }
        }
        Ok(())
    }
}

impl Default for CullingAggressiveness {
    fn default() -> Self {
        Self::FULL
    }
}

/// One rung on the quality ladder.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QualityLevel {
    /// Target frame rate.
    pub fps: u32,
    /// Culling applied while this level is active.
    pub aggressiveness: CullingAggressiveness,
}

impl QualityLevel {
    const fn new(fps: u32, buffer_scale: f64, feature_scale: f64) -> Self {
        Self {
            fps,
            aggressiveness: CullingAggressiveness {
                buffer_scale,
                feature_scale,
            },
        }
    }
}

/// Controls how the controller reacts to sampler health.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DegradationPolicy {
    /// Step down when degraded, step up after sustained health.
    Adaptive {
        /// Consecutive healthy samples required before stepping up.
        recovery_samples: u32,
    },
    /// Stay at the top level. Forced step-downs still apply.
    Fixed,
}

/// Configuration for the [`AdaptiveRateController`].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RateControllerConfig {
    /// Quality ladder, lowest first, strictly increasing in fps.
    pub levels: [QualityLevel; LEVEL_COUNT],
    /// Minimum time between transitions.
    pub cooldown: Duration,
    /// Adaptation policy.
    pub policy: DegradationPolicy,
}

impl RateControllerConfig {
    /// 24/30/45/60 fps for mains-powered hosts.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            levels: [
                QualityLevel::new(24, 0.5, 0.4),
                QualityLevel::new(30, 0.7, 0.6),
                QualityLevel::new(45, 0.85, 0.8),
                QualityLevel::new(60, 1.0, 1.0),
            ],
            cooldown: Duration::from_secs(5),
            policy: DegradationPolicy::Adaptive {
                recovery_samples: 5,
            },
        }
    }

    /// A lower ladder that tops out at 30 fps and recovers more reluctantly.
    #[must_use]
    pub const fn battery_saver() -> Self {
        Self {
            levels: [
                QualityLevel::new(15, 0.4, 0.3),
                QualityLevel::new(20, 0.5, 0.45),
                QualityLevel::new(24, 0.7, 0.6),
                QualityLevel::new(30, 0.85, 0.8),
            ],
            cooldown: Duration::from_secs(10),
            policy: DegradationPolicy::Adaptive {
                recovery_samples: 30,
            },
        }
    }

    /// Checks ladder ordering and scale ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.levels[0].fps == 0 || self.levels.windows(2).any(|w| w[0].fps >= w[1].fps) {
            return Err(ConfigError::QualityLevels);
        }
        for level in &self.levels {
            level.aggressiveness.validate()?;
        }
        Ok(())
    }
}

impl Default for RateControllerConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Why the quality level changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeReason {
    /// The sampler reported degraded performance.
    Degraded,
    /// Enough consecutive healthy samples were observed.
    Recovered,
    /// Resource exhaustion forced a reduction.
    Forced,
}

/// A transition between quality levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QualityChange {
    /// Frame rate before the change.
    pub from_fps: u32,
    /// Frame rate after the change.
    pub to_fps: u32,
    /// Trigger.
    pub reason: ChangeReason,
    /// When the change happened.
    pub at: HostTime,
}

/// Exponential moving average tracker.
#[derive(Clone, Copy, Debug)]
struct Ema {
    value: f64,
    alpha: f64,
    initialized: bool,
}

impl Ema {
    const fn new(alpha: f64) -> Self {
        Self {
            value: 0.0,
            alpha,
            initialized: false,
        }
    }

    fn update(&mut self, sample: f64) {
        if self.initialized {
            self.value = self.alpha * sample + (1.0 - self.alpha) * self.value;
        } else {
            self.value = sample;
            self.initialized = true;
        }
    }

    const fn get(&self) -> f64 {
        self.value
    }
}

/// Chooses the target frame rate and culling aggressiveness.
#[derive(Debug)]
pub struct AdaptiveRateController {
    config: RateControllerConfig,
    level: usize,
    consecutive_good: u32,
    last_transition: Option<HostTime>,
    last_sample: Option<HostTime>,
    fps_ema: Ema,
}

impl AdaptiveRateController {
    /// Creates a controller at the top quality level.
    #[must_use]
    pub fn new(config: RateControllerConfig) -> Self {
        Self {
            config,
            level: LEVEL_COUNT - 1,
            consecutive_good: 0,
            last_transition: None,
            last_sample: None,
            fps_ema: Ema::new(0.2),
        }
    }

    /// Re-evaluates against the sampler's newest sample.
    ///
    /// Each sample is considered once; calling again without a new sample is
    /// a no-op.
    pub fn evaluate(&mut self, now: HostTime, sampler: &PerformanceSampler) -> Option<QualityChange> {
        let sample = sampler.current()?;
        if self.last_sample == Some(sample.at) {
            return None;
        }
        self.last_sample = Some(sample.at);
        self.fps_ema.update(sample.fps);

        let DegradationPolicy::Adaptive { recovery_samples } = self.config.policy else {
            return None;
        };
        if self.in_cooldown(now) {
            self.consecutive_good = 0;
            return None;
        }

        if sampler.has_degraded() {
            self.consecutive_good = 0;
            if self.level > 0 {
                return Some(self.transition(now, self.level - 1, ChangeReason::Degraded));
            }
        } else {
            self.consecutive_good += 1;
            if self.consecutive_good >= recovery_samples && self.level < LEVEL_COUNT - 1 {
                return Some(self.transition(now, self.level + 1, ChangeReason::Recovered));
            }
        }
        None
    }

    /// Drops one level regardless of cooldown. Returns `None` at the bottom.
    pub fn force_step_down(&mut self, now: HostTime) -> Option<QualityChange> {
        self.consecutive_good = 0;
        (self.level > 0).then(|| self.transition(now, self.level - 1, ChangeReason::Forced))
    }

    /// The active quality level.
    #[must_use]
    pub fn level(&self) -> QualityLevel {
        self.config.levels[self.level]
    }

    /// Index of the active level, 0 being the lowest.
    #[must_use]
    pub fn level_index(&self) -> usize {
        self.level
    }

    /// Target frame rate of the active level.
    #[must_use]
    pub fn target_fps(&self) -> u32 {
        self.level().fps
    }

    /// Minimum spacing between accepted animation ticks.
    #[must_use]
    pub fn target_frame_interval(&self) -> Duration {
        Duration::from_fps(self.target_fps())
    }

    /// Culling scales of the active level.
    #[must_use]
    pub fn culling_aggressiveness(&self) -> CullingAggressiveness {
        self.level().aggressiveness
    }

    /// Smoothed frame rate over the samples evaluated so far.
    #[must_use]
    pub fn smoothed_fps(&self) -> f64 {
        self.fps_ema.get()
    }

    fn in_cooldown(&self, now: HostTime) -> bool {
        self.last_transition
            .is_some_and(|at| now.saturating_duration_since(at) < self.config.cooldown)
    }

    fn transition(&mut self, now: HostTime, to: usize, reason: ChangeReason) -> QualityChange {
        let change = QualityChange {
            from_fps: self.target_fps(),
            to_fps: self.config.levels[to].fps,
            reason,
            at: now,
        };
        info!(
            "quality {} -> {} fps ({reason:?})",
            change.from_fps, change.to_fps
        );
        self.level = to;
        self.consecutive_good = 0;
        self.last_transition = Some(now);
        change
    }
}

impl Default for AdaptiveRateController {
    fn default() -> Self {
        Self::new(RateControllerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use crate::timing::FrameTick;

    use super::*;

    /// Feeds ticks `interval_ms` apart and evaluates after each one.
    fn run(
        ctl: &mut AdaptiveRateController,
        sampler: &mut PerformanceSampler,
        start_ms: u64,
        interval_ms: u64,
        frames: u64,
    ) -> (u64, Vec<QualityChange>) {
        let mut changes = Vec::new();
        let mut t = start_ms;
        for i in 0..frames {
            let now = HostTime::from_millis(t);
            sampler.record_frame(&FrameTick::new(now, i));
            changes.extend(ctl.evaluate(now, sampler));
            t += interval_ms;
        }
        (t, changes)
    }

    #[test]
    fn starts_at_top_level() {
        let ctl = AdaptiveRateController::default();
        assert_eq!(ctl.target_fps(), 60);
        assert_eq!(ctl.culling_aggressiveness(), CullingAggressiveness::FULL);
        assert_eq!(ctl.target_frame_interval(), Duration::from_fps(60));
    }

    #[test]
    fn degraded_steps_down_once_per_cooldown() {
        let mut ctl = AdaptiveRateController::default();
        let mut sampler = PerformanceSampler::default();
        // 20 fps for 3 s.
        let (_, changes) = run(&mut ctl, &mut sampler, 0, 50, 60);
        assert_eq!(changes.len(), 1, "cooldown holds further steps");
        assert_eq!(changes[0].to_fps, 45);
        assert_eq!(changes[0].reason, ChangeReason::Degraded);
        assert_eq!(ctl.target_fps(), 45);
    }

    #[test]
    fn sustained_degradation_walks_down_to_floor() {
        let mut ctl = AdaptiveRateController::default();
        let mut sampler = PerformanceSampler::default();
        // 20 fps for 30 s.
        let (_, changes) = run(&mut ctl, &mut sampler, 0, 50, 600);
        let path: Vec<u32> = changes.iter().map(|c| c.to_fps).collect();
        assert_eq!(path, [45, 30, 24]);
        assert_eq!(ctl.level_index(), 0);
    }

    #[test]
    fn recovery_needs_consecutive_good_samples_after_cooldown() {
        let mut ctl = AdaptiveRateController::default();
        let mut sampler = PerformanceSampler::default();
        let (t, _) = run(&mut ctl, &mut sampler, 0, 50, 20);
        assert_eq!(ctl.target_fps(), 45);

        // Healthy again, but inside the 5 s cooldown: no change.
        let (t, changes) = run(&mut ctl, &mut sampler, t, 16, 200);
        assert!(changes.is_empty());
        assert_eq!(ctl.target_fps(), 45);

        // Past the cooldown, five healthy samples later it steps up.
        let (_, changes) = run(&mut ctl, &mut sampler, t, 16, 200);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].reason, ChangeReason::Recovered);
        assert!(changes[0].at >= HostTime::from_millis(5_500));
        assert_eq!(ctl.target_fps(), 60);
    }

    #[test]
    fn fixed_policy_never_adapts() {
        let config = RateControllerConfig {
            policy: DegradationPolicy::Fixed,
            ..RateControllerConfig::standard()
        };
        let mut ctl = AdaptiveRateController::new(config);
        let mut sampler = PerformanceSampler::default();
        let (_, changes) = run(&mut ctl, &mut sampler, 0, 100, 100);
        assert!(changes.is_empty());
        assert_eq!(ctl.target_fps(), 60);
        assert!(ctl.smoothed_fps() > 9.0 && ctl.smoothed_fps() < 11.0);
    }

    #[test]
    fn forced_step_down_ignores_cooldown() {
        let mut ctl = AdaptiveRateController::default();
        let now = HostTime::from_millis(10);
        assert_eq!(ctl.force_step_down(now).unwrap().to_fps, 45);
        assert_eq!(ctl.force_step_down(now).unwrap().to_fps, 30);
        assert_eq!(ctl.force_step_down(now).unwrap().to_fps, 24);
        assert_eq!(ctl.force_step_down(now), None, "already at the floor");
        let agg = ctl.culling_aggressiveness();
        assert!(agg.buffer_scale < 1.0 && agg.feature_scale < 1.0);
    }

    #[test]
    fn evaluate_without_new_sample_is_noop() {
        let mut ctl = AdaptiveRateController::default();
        let sampler = PerformanceSampler::default();
        assert_eq!(ctl.evaluate(HostTime::from_millis(1), &sampler), None);
    }

    #[test]
    fn config_validation() {
        assert!(RateControllerConfig::standard().validate().is_ok());
        assert!(RateControllerConfig::battery_saver().validate().is_ok());

        let mut unordered = RateControllerConfig::standard();
        unordered.levels.swap(1, 2);
        assert_eq!(unordered.validate(), Err(ConfigError::QualityLevels));

        let mut zero_scale = RateControllerConfig::standard();
        zero_scale.levels[0].aggressiveness.feature_scale = 0.0;
        assert!(matches!(
            zero_scale.validate(),
            Err(ConfigError::Scale { name: "feature_scale", .. })
        ));
    }
}
