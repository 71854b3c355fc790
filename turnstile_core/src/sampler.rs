// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sliding-window frame and memory measurement.
//!
//! The [`PerformanceSampler`] turns successive [`FrameTick`]s into
//! [`PerformanceSample`]s kept in a fixed ring of [`SAMPLE_CAPACITY`] entries.
//! Each sample carries the instantaneous frame rate (from the delta to the
//! previous tick), the number of refresh slots that delta skipped, the last
//! measured render time and the last memory reading.
//!
//! Memory is read through a [`MemoryProbe`] at most once per
//! [`SamplerConfig::memory_interval`]. A probe that cannot introspect returns
//! `None`; memory is then reported as 0 and never counts towards degradation.

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::error::ConfigError;
use crate::time::{Duration, HostTime};
use crate::timing::{FrameFeedback, FrameTick};

/// Number of samples retained by the ring buffer.
pub const SAMPLE_CAPACITY: usize = 60;

/// Source of the process's resident memory footprint.
pub trait MemoryProbe {
    /// Resident memory in megabytes, or `None` if it cannot be measured.
    fn resident_mb(&mut self) -> Option<f64>;
}

impl<F: FnMut() -> Option<f64>> MemoryProbe for F {
    fn resident_mb(&mut self) -> Option<f64> {
        self()
    }
}

/// A probe for platforms without memory introspection.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMemoryProbe;

impl MemoryProbe for NoMemoryProbe {
    fn resident_mb(&mut self) -> Option<f64> {
        None
    }
}

/// One frame's measurements.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PerformanceSample {
    /// Host time of the tick that closed this frame.
    pub at: HostTime,
    /// Instantaneous frame rate.
    pub fps: f64,
    /// Time since the previous tick, in milliseconds.
    pub frame_time_ms: f64,
    /// Most recent measured render cost, in milliseconds.
    pub render_time_ms: f64,
    /// Most recent memory reading in megabytes, 0 when unknown.
    pub memory_mb: f64,
    /// Refresh slots skipped between the previous tick and this one.
    pub dropped_frames: u32,
}

/// Aggregate over the most recent samples.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SampleStats {
    /// Samples aggregated.
    pub samples: usize,
    /// Average frame rate.
    pub fps: f64,
    /// Average frame time in milliseconds.
    pub frame_time_ms: f64,
    /// Average render time in milliseconds.
    pub render_time_ms: f64,
    /// Average of the known memory readings, 0 when none are known.
    pub memory_mb: f64,
    /// Total skipped refresh slots.
    pub dropped_frames: u32,
    /// Skipped slots as a fraction of all slots the window covered.
    pub dropped_ratio: f64,
}

/// Sampler tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SamplerConfig {
    /// Samples averaged by [`PerformanceSampler::has_degraded`].
    pub degraded_window: usize,
    /// Average frame rate below which performance counts as degraded.
    pub min_fps: f64,
    /// Memory above which performance counts as degraded, in megabytes.
    pub memory_ceiling_mb: f64,
    /// Dropped-frame ratio above which performance counts as degraded.
    pub max_dropped_ratio: f64,
    /// Minimum spacing between memory probes.
    pub memory_interval: Duration,
    /// Refresh interval assumed when a tick does not carry one.
    pub default_refresh: Duration,
}

impl SamplerConfig {
    /// Thresholds for a desktop browser-class host.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            degraded_window: 10,
            min_fps: 45.0,
            memory_ceiling_mb: 512.0,
            max_dropped_ratio: 0.1,
            memory_interval: Duration::from_secs(1),
            default_refresh: Duration::from_fps(60),
        }
    }

    /// Checks that the window fits the ring buffer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.degraded_window == 0 || self.degraded_window > SAMPLE_CAPACITY {
            return Err(ConfigError::Capacity {
                name: "degraded_window",
                value: self.degraded_window,
                max: SAMPLE_CAPACITY,
            });
        }
        if !(self.max_dropped_ratio > 0.0 && self.max_dropped_ratio <= 1.0) {
            return Err(ConfigError::Scale {
                name: "max_dropped_ratio",
                value: self.max_dropped_ratio,
            });
        }
        Ok(())
    }
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Ring buffer of recent frame measurements.
#[derive(Clone, Debug)]
pub struct PerformanceSampler {
    config: SamplerConfig,
    samples: [PerformanceSample; SAMPLE_CAPACITY],
    /// Next slot to write.
    cursor: usize,
    len: usize,
    last_tick: Option<HostTime>,
    last_probe: Option<HostTime>,
    memory_mb: Option<f64>,
    render_time_ms: f64,
}

impl PerformanceSampler {
    /// Creates an empty sampler.
    #[must_use]
    pub fn new(config: SamplerConfig) -> Self {
        Self {
            config,
            samples: [PerformanceSample::default(); SAMPLE_CAPACITY],
            cursor: 0,
            len: 0,
            last_tick: None,
            last_probe: None,
            memory_mb: None,
            render_time_ms: 0.0,
        }
    }

    /// The sampler's configuration.
    #[must_use]
    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Records a frame tick and returns the sample it produced.
    ///
    /// The first tick only establishes a baseline. Ticks that do not advance
    /// the clock are ignored.
    pub fn record_frame(&mut self, tick: &FrameTick) -> Option<PerformanceSample> {
        let previous = self.last_tick.replace(tick.now);
        let previous = previous?;
        let delta = tick.now.saturating_duration_since(previous);
        if delta == Duration::ZERO {
            return None;
        }

        let refresh = tick
            .refresh_interval
            .filter(|r| *r > Duration::ZERO)
            .unwrap_or(self.config.default_refresh);
        let slots = if refresh > Duration::ZERO {
            (delta.nanos() as f64 / refresh.nanos() as f64).round()
        } else {
            1.0
        };
        #[expect(
            clippy::cast_possible_truncation,
            reason = "slot count is clamped to the u32 range first"
        )]
        let dropped_frames = (slots - 1.0).clamp(0.0, f64::from(u32::MAX)) as u32;

        let frame_time_ms = delta.as_millis_f64();
        let sample = PerformanceSample {
            at: tick.now,
            fps: 1000.0 / frame_time_ms,
            frame_time_ms,
            render_time_ms: self.render_time_ms,
            memory_mb: self.memory_mb.unwrap_or(0.0),
            dropped_frames,
        };
        self.push(sample);
        Some(sample)
    }

    /// Stores the measured render cost of the most recent frame.
    pub fn record_render_time(&mut self, feedback: &FrameFeedback) {
        self.render_time_ms = feedback.render_time().as_millis_f64();
        if self.len > 0 {
            let latest = self.latest_index();
            self.samples[latest].render_time_ms = self.render_time_ms;
        }
    }

    /// Reads `probe` if the memory interval has elapsed. Returns whether the
    /// probe was consulted.
    pub fn record_memory(&mut self, now: HostTime, probe: &mut dyn MemoryProbe) -> bool {
        let due = self.last_probe.is_none_or(|last| {
            now.saturating_duration_since(last) >= self.config.memory_interval
        });
        if !due {
            return false;
        }
        self.last_probe = Some(now);
        self.memory_mb = probe
            .resident_mb()
            .filter(|mb| mb.is_finite() && *mb > 0.0);
        true
    }

    /// Last known memory footprint in megabytes, or `None` if unknown.
    #[must_use]
    pub fn memory_mb(&self) -> Option<f64> {
        self.memory_mb
    }

    /// The most recent sample.
    #[must_use]
    pub fn current(&self) -> Option<PerformanceSample> {
        (self.len > 0).then(|| self.samples[self.latest_index()])
    }

    /// Number of retained samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no sample has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Averages the last `window` samples (fewer if not yet recorded).
    #[must_use]
    pub fn moving_average(&self, window: usize) -> Option<SampleStats> {
        let count = window.min(self.len);
        if count == 0 {
            return None;
        }

        let mut stats = SampleStats {
            samples: count,
            ..SampleStats::default()
        };
        let mut known_memory = 0_usize;
        for sample in self.recent(count) {
            stats.fps += sample.fps;
            stats.frame_time_ms += sample.frame_time_ms;
            stats.render_time_ms += sample.render_time_ms;
            stats.dropped_frames = stats.dropped_frames.saturating_add(sample.dropped_frames);
            if sample.memory_mb > 0.0 {
                stats.memory_mb += sample.memory_mb;
                known_memory += 1;
            }
        }

        let n = count as f64;
        stats.fps /= n;
        stats.frame_time_ms /= n;
        stats.render_time_ms /= n;
        if known_memory > 0 {
            stats.memory_mb /= known_memory as f64;
        }
        let dropped = f64::from(stats.dropped_frames);
        stats.dropped_ratio = dropped / (dropped + n);
        Some(stats)
    }

    /// Whether current performance calls for lower quality.
    ///
    /// True when the memory ceiling is exceeded, or when a full window of
    /// samples averages below the fps floor or above the dropped-frame ratio.
    #[must_use]
    pub fn has_degraded(&self) -> bool {
        if self.is_memory_exhausted() {
            return true;
        }
        if self.len < self.config.degraded_window {
            return false;
        }
        self.moving_average(self.config.degraded_window)
            .is_some_and(|stats| {
                stats.fps < self.config.min_fps
                    || stats.dropped_ratio > self.config.max_dropped_ratio
            })
    }

    /// Whether the last memory reading exceeds the configured ceiling.
    #[must_use]
    pub fn is_memory_exhausted(&self) -> bool {
        self.memory_mb
            .is_some_and(|mb| mb > self.config.memory_ceiling_mb)
    }

    fn push(&mut self, sample: PerformanceSample) {
        self.samples[self.cursor] = sample;
        self.cursor = (self.cursor + 1) % SAMPLE_CAPACITY;
        self.len = (self.len + 1).min(SAMPLE_CAPACITY);
    }

    fn latest_index(&self) -> usize {
        (self.cursor + SAMPLE_CAPACITY - 1) % SAMPLE_CAPACITY
    }

    /// Newest first.
    fn recent(&self, count: usize) -> impl Iterator<Item = &PerformanceSample> {
        let latest = self.latest_index();
        (0..count).map(move |i| &self.samples[(latest + SAMPLE_CAPACITY - i) % SAMPLE_CAPACITY])
    }
}

impl Default for PerformanceSampler {
    fn default() -> Self {
        Self::new(SamplerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feeds `frames` ticks spaced `interval_ms` apart, starting at `start_ms`.
    fn feed(sampler: &mut PerformanceSampler, start_ms: u64, interval_ms: u64, frames: u64) -> u64 {
        let mut t = start_ms;
        for i in 0..frames {
            sampler.record_frame(&FrameTick::new(HostTime::from_millis(t), i));
            t += interval_ms;
        }
        t
    }

    #[test]
    fn first_tick_is_a_baseline() {
        let mut s = PerformanceSampler::default();
        assert_eq!(s.record_frame(&FrameTick::new(HostTime::from_millis(0), 0)), None);
        assert!(s.is_empty());
        let sample = s
            .record_frame(&FrameTick::new(HostTime::from_millis(20), 1))
            .unwrap();
        assert!((sample.fps - 50.0).abs() < 1e-9);
        assert_eq!(s.len(), 1);
        // Same timestamp again produces nothing.
        assert_eq!(s.record_frame(&FrameTick::new(HostTime::from_millis(20), 2)), None);
    }

    #[test]
    fn ring_keeps_the_last_sixty() {
        let mut s = PerformanceSampler::default();
        feed(&mut s, 0, 16, 200);
        assert_eq!(s.len(), SAMPLE_CAPACITY);
        let avg = s.moving_average(1000).unwrap();
        assert_eq!(avg.samples, SAMPLE_CAPACITY);
    }

    #[test]
    fn dropped_frames_count_skipped_refresh_slots() {
        let mut s = PerformanceSampler::default();
        let mut tick = FrameTick::new(HostTime::from_millis(0), 0);
        tick.refresh_interval = Some(Duration::from_millis(10));
        s.record_frame(&tick);
        tick.now = HostTime::from_millis(40);
        let sample = s.record_frame(&tick).unwrap();
        assert_eq!(sample.dropped_frames, 3);
        tick.now = HostTime::from_millis(51);
        assert_eq!(s.record_frame(&tick).unwrap().dropped_frames, 0, "jitter is not a drop");
    }

    #[test]
    fn steady_sixty_is_healthy() {
        let mut s = PerformanceSampler::default();
        let mut tick = FrameTick::new(HostTime::ZERO, 0);
        tick.refresh_interval = Some(Duration::from_fps(60));
        for i in 0..30_u64 {
            tick.now = HostTime(i * Duration::from_fps(60).nanos());
            s.record_frame(&tick);
        }
        assert!(!s.has_degraded());
        let avg = s.moving_average(10).unwrap();
        assert!((avg.fps - 60.0).abs() < 0.01);
        assert_eq!(avg.dropped_frames, 0);
    }

    #[test]
    fn low_fps_degrades_only_with_a_full_window() {
        let mut s = PerformanceSampler::default();
        // 30 fps, every tick skips one 60 Hz slot.
        let end = feed(&mut s, 0, 33, 5);
        assert!(!s.has_degraded(), "window not full yet");
        feed(&mut s, end, 33, 10);
        assert!(s.has_degraded());
    }

    #[test]
    fn memory_ceiling_degrades_immediately() {
        let mut s = PerformanceSampler::default();
        let mut probe = || Some(600.0);
        assert!(s.record_memory(HostTime::ZERO, &mut probe));
        assert!(s.is_memory_exhausted());
        assert!(s.has_degraded());
    }

    #[test]
    fn unknown_memory_is_zero_and_ignored() {
        let mut s = PerformanceSampler::default();
        s.record_memory(HostTime::ZERO, &mut NoMemoryProbe);
        feed(&mut s, 0, 16, 20);
        assert_eq!(s.memory_mb(), None);
        assert_eq!(s.current().unwrap().memory_mb, 0.0);
        assert_eq!(s.moving_average(10).unwrap().memory_mb, 0.0);
        assert!(!s.has_degraded());
    }

    #[test]
    fn memory_probe_respects_interval() {
        let mut s = PerformanceSampler::default();
        let mut calls = 0;
        let mut probe = || {
            calls += 1;
            Some(100.0)
        };
        assert!(s.record_memory(HostTime::from_millis(0), &mut probe));
        assert!(!s.record_memory(HostTime::from_millis(500), &mut probe));
        assert!(s.record_memory(HostTime::from_millis(1000), &mut probe));
        assert_eq!(calls, 2);
    }

    #[test]
    fn render_time_lands_on_latest_sample() {
        let mut s = PerformanceSampler::default();
        feed(&mut s, 0, 16, 3);
        s.record_render_time(&FrameFeedback {
            build_start: HostTime::from_millis(32),
            submitted_at: HostTime::from_millis(36),
        });
        assert!((s.current().unwrap().render_time_ms - 4.0).abs() < 1e-9);
    }

    #[test]
    fn config_validation() {
        assert!(SamplerConfig::default().validate().is_ok());
        let bad = SamplerConfig {
            degraded_window: 0,
            ..SamplerConfig::default()
        };
        assert!(matches!(
            bad.validate(),
            Err(ConfigError::Capacity { name: "degraded_window", .. })
        ));
    }
}
