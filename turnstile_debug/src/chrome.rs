// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`ChromeTraceSink`] collects engine events as they happen and
//! [`write_to`](ChromeTraceSink::write_to) emits them as
//! [Chrome Trace Event Format][spec] JSON, suitable for loading into
//! `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
//!
//! Instant events mark ticks, publishes, cull passes, quality changes and
//! failures; render feedback becomes a complete (`X`) slice starting at the
//! frame's tick; frame summaries become counter (`C`) tracks.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use turnstile_core::time::HostTime;
use turnstile_core::trace::{
    CullPassEvent, FrameSummary, FrameTickEvent, QualityChangeEvent, RenderFeedbackEvent,
    StreamPublishEvent, TaskFailureEvent, TraceSink,
};

const TID_FRAME: u32 = 0;
const TID_ANIMATION: u32 = 1;
const TID_CULLING: u32 = 2;

/// Collects trace events in memory for JSON export.
#[derive(Debug, Default)]
pub struct ChromeTraceSink {
    events: Vec<Value>,
    frame_start: HostTime,
}

impl ChromeTraceSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Writes the collected events as a JSON array.
    pub fn write_to(&self, writer: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(writer, &self.events)?;
        Ok(())
    }

    fn instant(&mut self, name: &str, cat: &str, tid: u32, ts: f64, args: Value) {
        self.events.push(json!({
            "ph": "i",
            "name": name,
            "cat": cat,
            "ts": ts,
            "pid": 0,
            "tid": tid,
            "s": "t",
            "args": args,
        }));
    }

    fn frame_ts(&self) -> f64 {
        to_us(self.frame_start)
    }
}

fn to_us(t: HostTime) -> f64 {
    t.nanos() as f64 / 1000.0
}

impl TraceSink for ChromeTraceSink {
    fn on_frame_tick(&mut self, e: &FrameTickEvent) {
        self.frame_start = e.now;
        self.events.push(json!({
            "ph": "i",
            "name": "FrameTick",
            "cat": "Frame",
            "ts": to_us(e.now),
            "pid": 0,
            "tid": TID_FRAME,
            "s": "g",
            "args": {
                "frame_index": e.frame_index,
                "refresh_ms": e.refresh_interval.map(|r| r.as_millis_f64()),
            }
        }));
    }

    fn on_quality_change(&mut self, e: &QualityChangeEvent) {
        let args = json!({
            "frame_index": e.frame_index,
            "from_fps": e.change.from_fps,
            "to_fps": e.change.to_fps,
            "reason": format!("{:?}", e.change.reason),
        });
        self.instant("QualityChange", "Rate", TID_FRAME, to_us(e.change.at), args);
    }

    fn on_stream_publish(&mut self, e: &StreamPublishEvent<'_>) {
        let args = json!({
            "frame_index": e.frame_index,
            "features": e.features,
        });
        let ts = self.frame_ts();
        self.instant(e.stream, "Animation", TID_ANIMATION, ts, args);
    }

    fn on_cull_pass(&mut self, e: &CullPassEvent<'_>) {
        let args = json!({
            "frame_index": e.frame_index,
            "source": e.source.0,
            "lod": e.level.name(),
            "visible": e.visible,
            "culled": e.culled,
            "cache_hit": e.cache_hit,
            "published": e.published,
        });
        let ts = self.frame_ts();
        self.instant(e.name, "Culling", TID_CULLING, ts, args);
    }

    fn on_task_failure(&mut self, e: &TaskFailureEvent<'_>) {
        let args = json!({
            "frame_index": e.frame_index,
            "owner": e.owner,
            "kind": format!("{:?}", e.tag),
            "attempts": e.attempts,
            "error": e.error.to_string(),
        });
        let ts = self.frame_ts();
        self.instant("TaskFailure", "Registry", TID_FRAME, ts, args);
    }

    fn on_render_feedback(&mut self, e: &RenderFeedbackEvent) {
        self.events.push(json!({
            "ph": "X",
            "name": "Render",
            "cat": "Frame",
            "ts": self.frame_ts(),
            "dur": e.render_time.nanos() as f64 / 1000.0,
            "pid": 0,
            "tid": TID_FRAME,
            "args": { "frame_index": e.frame_index },
        }));
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        self.events.push(json!({
            "ph": "C",
            "name": "Features",
            "ts": to_us(s.now),
            "pid": 0,
            "args": {
                "visible": s.visible,
                "culled": s.culled,
                "animated": s.features_published,
            }
        }));
        self.events.push(json!({
            "ph": "C",
            "name": "TargetFps",
            "ts": to_us(s.now),
            "pid": 0,
            "args": { "fps": s.target_fps },
        }));
    }
}
