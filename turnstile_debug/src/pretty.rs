// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are printed in milliseconds of host time.

use std::io::Write;

use turnstile_core::time::HostTime;
use turnstile_core::trace::{
    CullPassEvent, FrameSummary, FrameTickEvent, QualityChangeEvent, RenderFeedbackEvent,
    StreamPublishEvent, TaskFailureEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    /// Print per-stream and per-source lines, not just summaries.
    verbose: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            verbose: true,
        }
    }

    /// Limits output to ticks, summaries, quality changes and failures.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.verbose = false;
        self
    }

    /// Consumes the sink, returning its writer.
    pub fn into_writer(self) -> W {
        self.writer
    }
}

fn ms(t: HostTime) -> f64 {
    t.nanos() as f64 / 1e6
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_frame_tick(&mut self, e: &FrameTickEvent) {
        if !self.verbose {
            return;
        }
        let _ = writeln!(
            self.writer,
            "[tick] frame={} now={:.3}ms",
            e.frame_index,
            ms(e.now),
        );
    }

    fn on_quality_change(&mut self, e: &QualityChangeEvent) {
        let _ = writeln!(
            self.writer,
            "[quality] frame={} {} -> {} fps ({:?})",
            e.frame_index, e.change.from_fps, e.change.to_fps, e.change.reason,
        );
    }

    fn on_stream_publish(&mut self, e: &StreamPublishEvent<'_>) {
        if !self.verbose {
            return;
        }
        let _ = writeln!(
            self.writer,
            "[stream] frame={} {} features={}",
            e.frame_index, e.stream, e.features,
        );
    }

    fn on_cull_pass(&mut self, e: &CullPassEvent<'_>) {
        if !self.verbose {
            return;
        }
        let origin = if e.cache_hit { "cache" } else { "culled" };
        let status = if e.published { "ok" } else { "REJECTED" };
        let _ = writeln!(
            self.writer,
            "[cull] frame={} {} lod={} visible={} dropped={} {origin} {status}",
            e.frame_index,
            e.name,
            e.level.name(),
            e.visible,
            e.culled,
        );
    }

    fn on_task_failure(&mut self, e: &TaskFailureEvent<'_>) {
        let _ = writeln!(
            self.writer,
            "[failure] frame={} {} {:?} after {} attempts: {}",
            e.frame_index, e.owner, e.tag, e.attempts, e.error,
        );
    }

    fn on_render_feedback(&mut self, e: &RenderFeedbackEvent) {
        if !self.verbose {
            return;
        }
        let _ = writeln!(
            self.writer,
            "[render] frame={} {:.3}ms",
            e.frame_index,
            e.render_time.as_millis_f64(),
        );
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        let lod = s.lod.map_or("-", |l| l.name());
        let _ = writeln!(
            self.writer,
            "[summary] frame={} target={}fps tasks={}/{} streams={} ({} features) \
             cull={} visible={} dropped={} lod={lod}",
            s.frame_index,
            s.target_fps,
            s.tasks_ran - s.tasks_failed,
            s.tasks_ran,
            s.streams_published,
            s.features_published,
            s.cull_passes,
            s.visible,
            s.culled,
        );
    }
}
