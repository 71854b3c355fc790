// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed-rate tick source.

use std::thread;

use turnstile_core::time::{Duration, HostTime};
use turnstile_core::timing::FrameTick;

use crate::time::now;

/// Produces [`FrameTick`]s on a fixed grid of deadlines.
///
/// When a caller falls behind, missed deadlines are skipped rather than
/// delivered in a burst; the gap shows up in the next tick's `now` and the
/// sampler counts it as dropped frames.
#[derive(Clone, Debug)]
pub struct FramePacer {
    interval: Duration,
    next_deadline: Option<HostTime>,
    frame_index: u64,
    missed: u64,
}

impl FramePacer {
    /// A pacer ticking at `fps` frames per second (60 if `fps` is zero).
    #[must_use]
    pub fn new(fps: u32) -> Self {
        let fps = if fps == 0 { 60 } else { fps };
        Self::with_interval(Duration::from_fps(fps))
    }

    /// A pacer with an explicit refresh interval.
    #[must_use]
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            next_deadline: None,
            frame_index: 0,
            missed: 0,
        }
    }

    /// The refresh interval reported on every tick.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Deadlines skipped because the caller was late.
    #[must_use]
    pub fn missed(&self) -> u64 {
        self.missed
    }

    /// Sleeps until the next deadline and returns its tick.
    pub fn wait(&mut self) -> FrameTick {
        if let Some(deadline) = self.next_deadline {
            let current = now();
            if current < deadline {
                let remaining = deadline.saturating_duration_since(current);
                thread::sleep(std::time::Duration::from_nanos(remaining.nanos()));
            }
        }
        self.tick_at(now())
    }

    /// Produces the tick for host time `now` and schedules the next deadline.
    pub fn tick_at(&mut self, now: HostTime) -> FrameTick {
        let interval = self.interval.nanos().max(1);
        let next = match self.next_deadline {
            None => now.saturating_add(self.interval),
            Some(deadline) if now < deadline => deadline.saturating_add(self.interval),
            Some(deadline) => {
                // Skip every deadline that already passed.
                let behind = now.saturating_duration_since(deadline).nanos() / interval;
                self.missed += behind;
                HostTime(
                    deadline
                        .nanos()
                        .saturating_add((behind + 1).saturating_mul(interval)),
                )
            }
        };
        self.next_deadline = Some(next);

        let tick = FrameTick {
            now,
            refresh_interval: Some(self.interval),
            frame_index: self.frame_index,
        };
        self.frame_index += 1;
        tick
    }
}

#[cfg(test)]
mod tests {
    use turnstile_core::time::{Duration, HostTime};

    use super::FramePacer;

    #[test]
    fn ticks_carry_interval_and_index() {
        let mut pacer = FramePacer::new(50);
        let a = pacer.tick_at(HostTime::from_millis(0));
        let b = pacer.tick_at(HostTime::from_millis(20));
        assert_eq!((a.frame_index, b.frame_index), (0, 1));
        assert_eq!(b.refresh_interval, Some(Duration::from_millis(20)));
        assert_eq!(pacer.missed(), 0);
    }

    #[test]
    fn late_caller_skips_missed_deadlines() {
        let mut pacer = FramePacer::with_interval(Duration::from_millis(10));
        pacer.tick_at(HostTime::from_millis(0));
        // Serves the 10 ms slot late and skips the 20 and 30 ms slots.
        pacer.tick_at(HostTime::from_millis(35));
        assert_eq!(pacer.missed(), 2);
        // Next deadline is 40 ms, so an early call does not add misses.
        pacer.tick_at(HostTime::from_millis(38));
        assert_eq!(pacer.missed(), 2);
    }

    #[test]
    fn zero_fps_defaults_to_sixty() {
        assert_eq!(FramePacer::new(0).interval(), Duration::from_fps(60));
    }

    #[test]
    fn wait_does_not_run_ahead() {
        let mut pacer = FramePacer::with_interval(Duration::from_millis(2));
        let first = pacer.wait();
        let second = pacer.wait();
        assert!(
            second.now.saturating_duration_since(first.now) >= Duration::from_millis(1),
            "second tick came too early"
        );
    }
}
