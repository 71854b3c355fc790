// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the frame loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! [`Engine`](crate::engine::Engine) calls at each stage of a frame. All
//! method bodies default to no-ops, so implementing only the events you care
//! about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.
//!
//! [`FrameSummaryBuilder`] accumulates what happened during a frame and
//! produces a [`FrameSummary`] at the end.
//!
//! Event payloads that carry names borrow them from the engine for the
//! duration of the call; sinks copy what they keep.

use crate::cache::SourceId;
use crate::culling::CullPass;
use crate::error::TaskError;
use crate::lod::LodLevel;
use crate::rate::QualityChange;
use crate::registry::{RunSummary, TaskTag};
use crate::time::{Duration, HostTime};
use crate::timing::FrameTick;

/// Emitted when the engine receives a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTickEvent {
    /// Monotonic frame counter.
    pub frame_index: u64,
    /// Host time when the tick was generated.
    pub now: HostTime,
    /// Refresh interval, if known.
    pub refresh_interval: Option<Duration>,
}

impl From<&FrameTick> for FrameTickEvent {
    fn from(tick: &FrameTick) -> Self {
        Self {
            frame_index: tick.frame_index,
            now: tick.now,
            refresh_interval: tick.refresh_interval,
        }
    }
}

/// Emitted when the rate controller changes level.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QualityChangeEvent {
    /// Frame counter.
    pub frame_index: u64,
    /// The transition.
    pub change: QualityChange,
}

/// Emitted when an animation stream publishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamPublishEvent<'a> {
    /// Frame counter.
    pub frame_index: u64,
    /// Stream name.
    pub stream: &'a str,
    /// Features published.
    pub features: usize,
}

/// Emitted for each source a culling pass handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CullPassEvent<'a> {
    /// Frame counter.
    pub frame_index: u64,
    /// Source id.
    pub source: SourceId,
    /// Source name.
    pub name: &'a str,
    /// Selected level.
    pub level: LodLevel,
    /// Features emitted.
    pub visible: usize,
    /// Features dropped.
    pub culled: usize,
    /// Whether the result came from cache.
    pub cache_hit: bool,
    /// Whether the sink accepted it.
    pub published: bool,
}

/// Emitted when the registry drops a task after its retry budget ran out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TaskFailureEvent<'a> {
    /// Frame counter.
    pub frame_index: u64,
    /// Owner id.
    pub owner: &'a str,
    /// Task kind.
    pub tag: TaskTag,
    /// Consecutive failures.
    pub attempts: u32,
    /// Last error.
    pub error: &'a TaskError,
}

/// Emitted when render feedback arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderFeedbackEvent {
    /// Frame counter of the most recent tick.
    pub frame_index: u64,
    /// Time spent building the frame.
    pub render_time: Duration,
}

/// Per-frame summary produced by [`FrameSummaryBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSummary {
    /// Frame counter.
    pub frame_index: u64,
    /// Host time of the tick.
    pub now: HostTime,
    /// Target rate after this frame's evaluation.
    pub target_fps: u32,
    /// Detail level after this frame's culling pass.
    pub lod: Option<LodLevel>,
    /// Task callbacks run.
    pub tasks_ran: usize,
    /// Task callbacks that failed.
    pub tasks_failed: usize,
    /// Streams that published.
    pub streams_published: usize,
    /// Features across those publishes.
    pub features_published: usize,
    /// Sources culled.
    pub cull_passes: usize,
    /// Visible features across culled sources.
    pub visible: usize,
    /// Dropped features across culled sources.
    pub culled: usize,
    /// Whether the rate controller changed level.
    pub quality_changed: bool,
}

/// Receives trace events from the frame loop.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a tick is received.
    fn on_frame_tick(&mut self, e: &FrameTickEvent) {
        _ = e;
    }

    /// Called when the quality level changes.
    fn on_quality_change(&mut self, e: &QualityChangeEvent) {
        _ = e;
    }

    /// Called for each stream publish.
    fn on_stream_publish(&mut self, e: &StreamPublishEvent<'_>) {
        _ = e;
    }

    /// Called for each culled source.
    fn on_cull_pass(&mut self, e: &CullPassEvent<'_>) {
        _ = e;
    }

    /// Called when a task is dropped.
    fn on_task_failure(&mut self, e: &TaskFailureEvent<'_>) {
        _ = e;
    }

    /// Called when render feedback arrives.
    fn on_render_feedback(&mut self, e: &RenderFeedbackEvent) {
        _ = e;
    }

    /// Called with a per-frame summary.
    fn on_frame_summary(&mut self, s: &FrameSummary) {
        _ = s;
    }
}

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

macro_rules! dispatch {
    ($self:ident, $method:ident, $event:expr) => {{
        #[cfg(feature = "trace")]
        if let Some(s) = &mut $self.sink {
            s.$method($event);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = $event;
        }
    }};
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`FrameTickEvent`].
    #[inline]
    pub fn frame_tick(&mut self, e: &FrameTickEvent) {
        dispatch!(self, on_frame_tick, e);
    }

    /// Emits a [`QualityChangeEvent`].
    #[inline]
    pub fn quality_change(&mut self, e: &QualityChangeEvent) {
        dispatch!(self, on_quality_change, e);
    }

    /// Emits a [`StreamPublishEvent`].
    #[inline]
    pub fn stream_publish(&mut self, e: &StreamPublishEvent<'_>) {
        dispatch!(self, on_stream_publish, e);
    }

    /// Emits a [`CullPassEvent`].
    #[inline]
    pub fn cull_pass(&mut self, e: &CullPassEvent<'_>) {
        dispatch!(self, on_cull_pass, e);
    }

    /// Emits a [`TaskFailureEvent`].
    #[inline]
    pub fn task_failure(&mut self, e: &TaskFailureEvent<'_>) {
        dispatch!(self, on_task_failure, e);
    }

    /// Emits a [`RenderFeedbackEvent`].
    #[inline]
    pub fn render_feedback(&mut self, e: &RenderFeedbackEvent) {
        dispatch!(self, on_render_feedback, e);
    }

    /// Emits a [`FrameSummary`].
    #[inline]
    pub fn frame_summary(&mut self, s: &FrameSummary) {
        dispatch!(self, on_frame_summary, s);
    }
}

/// Collects per-frame counts and produces a [`FrameSummary`].
#[derive(Debug)]
pub struct FrameSummaryBuilder {
    tick: FrameTickEvent,
    tasks: RunSummary,
    streams_published: usize,
    features_published: usize,
    cull_passes: usize,
    visible: usize,
    culled: usize,
    quality_changed: bool,
}

impl FrameSummaryBuilder {
    /// Starts building a summary for the given tick.
    #[must_use]
    pub fn new(tick: &FrameTickEvent) -> Self {
        Self {
            tick: *tick,
            tasks: RunSummary::default(),
            streams_published: 0,
            features_published: 0,
            cull_passes: 0,
            visible: 0,
            culled: 0,
            quality_changed: false,
        }
    }

    /// Records the registry run.
    pub fn tasks(&mut self, summary: RunSummary) {
        self.tasks = summary;
    }

    /// Records one stream publish.
    pub fn stream_published(&mut self, features: usize) {
        self.streams_published += 1;
        self.features_published += features;
    }

    /// Records one culled source.
    pub fn cull_pass(&mut self, pass: &CullPass) {
        self.cull_passes += 1;
        self.visible += pass.stats.emitted;
        self.culled += pass.stats.culled();
    }

    /// Records a quality change.
    pub fn quality_changed(&mut self) {
        self.quality_changed = true;
    }

    /// Consumes the builder and produces the final [`FrameSummary`].
    #[must_use]
    pub fn finish(self, target_fps: u32, lod: Option<LodLevel>) -> FrameSummary {
        FrameSummary {
            frame_index: self.tick.frame_index,
            now: self.tick.now,
            target_fps,
            lod,
            tasks_ran: self.tasks.ran,
            tasks_failed: self.tasks.failed,
            streams_published: self.streams_published,
            features_published: self.features_published,
            cull_passes: self.cull_passes,
            visible: self.visible,
            culled: self.culled,
            quality_changed: self.quality_changed,
        }
    }
}
