// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame clock types exchanged between backends and the engine.
//!
//! - [`FrameTick`]: a frame opportunity delivered by the backend tick source
//! - [`FrameFeedback`]: post-frame observations fed back to the engine
//!
//! # Data flow
//!
//! 1. The backend produces a [`FrameTick`] from its pacing mechanism.
//! 2. [`Engine::on_frame`](crate::engine::Engine::on_frame) samples the tick,
//!    re-evaluates quality, drains culling intents and runs every due task.
//! 3. After publishing, the caller constructs [`FrameFeedback`] from the
//!    frame's start and end times and hands it to
//!    [`Engine::observe`](crate::engine::Engine::observe) so render cost feeds
//!    the sampler.

use crate::time::{Duration, HostTime};

/// A frame opportunity delivered by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameTick {
    /// Current host time when the tick was generated.
    pub now: HostTime,
    /// Display refresh interval, if the backend knows it.
    ///
    /// Used to count dropped frames; when absent the sampler assumes 60 Hz.
    pub refresh_interval: Option<Duration>,
    /// Monotonically increasing frame counter.
    pub frame_index: u64,
}

impl FrameTick {
    /// Creates a tick with an unknown refresh interval.
    #[must_use]
    pub const fn new(now: HostTime, frame_index: u64) -> Self {
        Self {
            now,
            refresh_interval: None,
            frame_index,
        }
    }
}

/// Render-cost observations for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameFeedback {
    /// Host time when frame work began (usually the tick's `now`).
    pub build_start: HostTime,
    /// Host time when all layer data for the frame had been published.
    pub submitted_at: HostTime,
}

impl FrameFeedback {
    /// Returns the time spent building the frame.
    #[must_use]
    pub const fn render_time(&self) -> Duration {
        self.submitted_at.saturating_duration_since(self.build_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_time_saturates() {
        let fb = FrameFeedback {
            build_start: HostTime(2_000),
            submitted_at: HostTime(1_000),
        };
        assert_eq!(fb.render_time(), Duration::ZERO);

        let fb = FrameFeedback {
            build_start: HostTime(1_000),
            submitted_at: HostTime(4_500),
        };
        assert_eq!(fb.render_time(), Duration(3_500));
    }
}
