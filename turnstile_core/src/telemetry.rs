// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Point-in-time engine metrics for dashboards and logs.

use core::fmt;

use crate::lod::LodLevel;

/// Snapshot returned by [`Engine::telemetry`](crate::engine::Engine::telemetry).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Telemetry {
    /// Frame rate averaged over the sampler's degradation window.
    pub fps: f64,
    /// Last memory reading, if the platform reports one.
    pub memory_mb: Option<f64>,
    /// Entities in running streams.
    pub active_animation_count: usize,
    /// Features published by the latest culling pass of each source.
    pub visible_feature_count: usize,
    /// Features dropped by the latest culling pass of each source.
    pub culled_feature_count: usize,
    /// Render cost of the most recently observed frame.
    pub render_time_ms: f64,
    /// Detail level of the latest culling pass.
    pub current_lod: Option<LodLevel>,
    /// Active target frame rate.
    pub target_fps: u32,
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1} fps (target {}), render {:.2} ms, {} animated, {} visible / {} culled",
            self.fps,
            self.target_fps,
            self.render_time_ms,
            self.active_animation_count,
            self.visible_feature_count,
            self.culled_feature_count,
        )?;
        if let Some(lod) = self.current_lod {
            write!(f, ", lod {}", lod.name())?;
        }
        if let Some(mb) = self.memory_mb {
            write!(f, ", {mb:.0} MB")?;
        }
        Ok(())
    }
}
