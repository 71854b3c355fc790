// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Zoom-driven level-of-detail selection.
//!
//! A [`LodConfig`] is a threshold table of five [`LodBucket`]s ordered from
//! least to most detailed. The selected bucket is the most detailed one whose
//! `min_zoom` the current zoom reaches. Each bucket caps how many features a
//! culling pass may emit; the active [`CullingAggressiveness`] scales that cap
//! down under load.
//!
//! The selector also produces the viewport buffer fraction: generous at low
//! zoom where a pan covers a lot of ground, tight at high zoom.

use core::cmp::Ordering;

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::error::ConfigError;
use crate::rate::CullingAggressiveness;

/// Highest zoom bucket. Zoom levels above this share one cache bucket.
pub const MAX_ZOOM_BUCKET: u8 = 24;

/// Detail bucket, ordered from least to most detailed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LodLevel {
    /// Overview, below every threshold.
    Minimal,
    /// District scale.
    Low,
    /// Venue scale.
    Medium,
    /// Concourse scale.
    High,
    /// Gate scale.
    Ultra,
}

impl LodLevel {
    /// Lower-case name for logs and telemetry.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Ultra => "ultra",
        }
    }
}

/// One row of the threshold table.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LodBucket {
    /// The bucket's level.
    pub level: LodLevel,
    /// Zoom at which this bucket starts to apply.
    pub min_zoom: f64,
    /// Feature cap before aggressiveness scaling.
    pub max_features: usize,
}

impl LodBucket {
    const fn new(level: LodLevel, min_zoom: f64, max_features: usize) -> Self {
        Self {
            level,
            min_zoom,
            max_features,
        }
    }
}

/// Threshold table and buffer curve.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LodConfig {
    /// Buckets from least to most detailed.
    pub buckets: [LodBucket; 5],
    /// Buffer fraction at or below `wide_zoom`.
    pub max_buffer: f64,
    /// Buffer fraction at or above `tight_zoom`.
    pub min_buffer: f64,
    /// Zoom where the buffer starts shrinking.
    pub wide_zoom: f64,
    /// Zoom where the buffer stops shrinking.
    pub tight_zoom: f64,
}

impl LodConfig {
    /// Thresholds 12/14/16/18 with caps 50/150/300/500/1500.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            buckets: [
                LodBucket::new(LodLevel::Minimal, 0.0, 50),
                LodBucket::new(LodLevel::Low, 12.0, 150),
                LodBucket::new(LodLevel::Medium, 14.0, 300),
                LodBucket::new(LodLevel::High, 16.0, 500),
                LodBucket::new(LodLevel::Ultra, 18.0, 1500),
            ],
            max_buffer: 0.3,
            min_buffer: 0.05,
            wide_zoom: 10.0,
            tight_zoom: 20.0,
        }
    }

    /// Checks that thresholds strictly increase with detail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for pair in self.buckets.windows(2) {
            let (lower, upper) = (pair[0].min_zoom, pair[1].min_zoom);
            if lower.partial_cmp(&upper) != Some(Ordering::Less) || pair[0].level >= pair[1].level {
                return Err(ConfigError::LodThresholds { lower, upper });
            }
        }
        if self.wide_zoom.partial_cmp(&self.tight_zoom) != Some(Ordering::Less) {
            return Err(ConfigError::LodThresholds {
                lower: self.wide_zoom,
                upper: self.tight_zoom,
            });
        }
        for (name, value) in [("max_buffer", self.max_buffer), ("min_buffer", self.min_buffer)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Scale { name, value });
            }
        }
        Ok(())
    }
}

impl Default for LodConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Outcome of a selection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LodSelection {
    /// Selected level.
    pub level: LodLevel,
    /// Integer zoom bucket, `0..=MAX_ZOOM_BUCKET`.
    pub zoom_bucket: u8,
    /// Feature cap after aggressiveness scaling.
    pub max_features: usize,
    /// Viewport buffer fraction after aggressiveness scaling.
    pub buffer_fraction: f64,
}

/// Maps zoom to a detail bucket.
#[derive(Clone, Copy, Debug, Default)]
pub struct LodSelector {
    config: LodConfig,
}

impl LodSelector {
    /// Creates a selector over a validated table.
    pub fn new(config: LodConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The bucket for `zoom`. NaN selects the least detailed bucket.
    #[must_use]
    pub fn bucket(&self, zoom: f64) -> LodBucket {
        self.config
            .buckets
            .iter()
            .rev()
            .find(|b| zoom >= b.min_zoom)
            .copied()
            .unwrap_or(self.config.buckets[0])
    }

    /// Selects level, cap and buffer for `zoom` under `aggressiveness`.
    #[must_use]
    pub fn select(&self, zoom: f64, aggressiveness: CullingAggressiveness) -> LodSelection {
        let bucket = self.bucket(zoom);
        LodSelection {
            level: bucket.level,
            zoom_bucket: zoom_bucket(zoom),
            max_features: scaled_cap(bucket.max_features, aggressiveness.feature_scale),
            buffer_fraction: self.buffer_fraction(zoom) * aggressiveness.buffer_scale,
        }
    }

    /// Unscaled buffer fraction, linear between the wide and tight zooms.
    #[must_use]
    pub fn buffer_fraction(&self, zoom: f64) -> f64 {
        let c = &self.config;
        if zoom.is_nan() || zoom <= c.wide_zoom {
            return c.max_buffer;
        }
        if zoom >= c.tight_zoom {
            return c.min_buffer;
        }
        let t = (zoom - c.wide_zoom) / (c.tight_zoom - c.wide_zoom);
        c.max_buffer + (c.min_buffer - c.max_buffer) * t
    }
}

/// Integer zoom bucket used in cache keys.
#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "clamped to 0..=MAX_ZOOM_BUCKET before the cast"
)]
pub fn zoom_bucket(zoom: f64) -> u8 {
    if zoom.is_nan() {
        return 0;
    }
    zoom.floor().clamp(0.0, f64::from(MAX_ZOOM_BUCKET)) as u8
}

fn scaled_cap(max_features: usize, feature_scale: f64) -> usize {
    let scale = feature_scale.clamp(0.0, 1.0);
    #[expect(
        clippy::cast_possible_truncation,
        reason = "scaled cap never exceeds the unscaled usize cap"
    )]
    let cap = (max_features as f64 * scale).floor() as usize;
    cap.min(max_features)
}
