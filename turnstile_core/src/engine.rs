// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The frame engine: one owner for every component.
//!
//! [`Engine`] constructs the registry, sampler, rate controller, animation
//! scheduler and culling pipeline once, and drives them from a single
//! [`on_frame`](Engine::on_frame) call per host tick:
//!
//! 1. sample the tick and, when due, the memory probe;
//! 2. react to resource exhaustion (memory ceiling or task ceiling) with a
//!    forced cleanup;
//! 3. let the [`AdaptiveRateController`] re-evaluate;
//! 4. run every due task in the [`ResourceRegistry`], which includes each
//!    animation stream's frame task;
//! 5. drain culling intents and run pending passes.
//!
//! Everything the registry's callbacks may touch lives in [`Stage`], a field
//! disjoint from the registry itself, so callbacks receive `&mut Stage<S>`
//! while the registry iterates.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use log::{info, warn};

use crate::animation::{AnimationHost, AnimationScheduler, EntitySpec, StartReport};
use crate::cache::SourceId;
use crate::culling::{CullPass, CullingConfig, CullingPipeline};
use crate::error::{ConfigError, TaskError};
use crate::geo::{Feature, Viewport};
use crate::rate::{AdaptiveRateController, QualityChange, RateControllerConfig};
use crate::registry::{
    ResourceRegistry, RetryPolicy, RunSummary, TaskContext, TaskFailure, TaskHandle, TaskKind,
    TaskOptions,
};
use crate::sampler::{MemoryProbe, NoMemoryProbe, PerformanceSampler, SamplerConfig};
use crate::sink::LayerSink;
use crate::telemetry::Telemetry;
use crate::time::{Duration, HostTime};
use crate::timing::{FrameFeedback, FrameTick};
use crate::trace::{
    CullPassEvent, FrameSummary, FrameSummaryBuilder, FrameTickEvent, QualityChangeEvent,
    RenderFeedbackEvent, StreamPublishEvent, TaskFailureEvent, Tracer,
};

/// Upper bound accepted for [`EngineConfig::max_tasks`].
const MAX_TASK_CEILING: usize = 1 << 16;

/// Engine configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct EngineConfig {
    /// Performance sampling.
    pub sampler: SamplerConfig,
    /// Quality ladder and hysteresis.
    pub rate: RateControllerConfig,
    /// Culling, LOD and cache.
    pub culling: CullingConfig,
    /// Retry policy for tasks scheduled without explicit options.
    pub retry: RetryPolicy,
    /// Live task count above which the engine prunes non-essential tasks.
    pub max_tasks: usize,
}

impl EngineConfig {
    /// Defaults for a mains-powered host.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            sampler: SamplerConfig::standard(),
            rate: RateControllerConfig::standard(),
            culling: CullingConfig::standard(),
            retry: RetryPolicy::standard(),
            max_tasks: 256,
        }
    }

    /// [`standard`](Self::standard) with the battery-saver quality ladder.
    #[must_use]
    pub const fn battery_saver() -> Self {
        Self {
            rate: RateControllerConfig::battery_saver(),
            ..Self::standard()
        }
    }

    /// Validates every nested configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sampler.validate()?;
        self.rate.validate()?;
        self.culling.validate()?;
        if self.max_tasks == 0 || self.max_tasks > MAX_TASK_CEILING {
            return Err(ConfigError::Capacity {
                name: "max_tasks",
                value: self.max_tasks,
                max: MAX_TASK_CEILING,
            });
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Why the engine ran a forced cleanup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exhaustion {
    /// Resident memory exceeded the sampler's ceiling.
    Memory,
    /// More live tasks than [`EngineConfig::max_tasks`].
    Tasks,
}

/// What a forced cleanup did.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Cleanup {
    /// Trigger.
    pub reason: Exhaustion,
    /// Cached culling results dropped.
    pub cache_entries: usize,
    /// Non-essential tasks cancelled.
    pub pruned_tasks: usize,
    /// The forced quality step, `None` if already at the bottom.
    pub step_down: Option<QualityChange>,
}

/// Everything that happened during one [`Engine::on_frame`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrameReport {
    /// Rate controller transition, if any.
    pub quality_change: Option<QualityChange>,
    /// Forced cleanup, if one ran.
    pub cleanup: Option<Cleanup>,
    /// Registry run counts.
    pub tasks: RunSummary,
    /// Tasks dropped this frame after exhausting their retries.
    pub failures: Vec<TaskFailure>,
    /// Culling passes run this frame.
    pub cull_passes: Vec<CullPass>,
}

/// The state registry callbacks operate on.
pub struct Stage<S> {
    animation: AnimationScheduler,
    culling: CullingPipeline,
    sampler: PerformanceSampler,
    controller: AdaptiveRateController,
    sink: S,
    probe: Box<dyn MemoryProbe>,
}

impl<S: fmt::Debug> fmt::Debug for Stage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("animation", &self.animation)
            .field("culling", &self.culling)
            .field("sampler", &self.sampler)
            .field("controller", &self.controller)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}

impl<S> Stage<S> {
    /// Animation streams.
    #[must_use]
    pub fn animation(&self) -> &AnimationScheduler {
        &self.animation
    }

    /// Culling pipeline.
    #[must_use]
    pub fn culling(&self) -> &CullingPipeline {
        &self.culling
    }

    /// Culling pipeline, for data updates from host tasks.
    pub fn culling_mut(&mut self) -> &mut CullingPipeline {
        &mut self.culling
    }

    /// Performance sampler.
    #[must_use]
    pub fn sampler(&self) -> &PerformanceSampler {
        &self.sampler
    }

    /// Rate controller.
    #[must_use]
    pub fn controller(&self) -> &AdaptiveRateController {
        &self.controller
    }

    /// The layer sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The layer sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

impl<S: LayerSink> AnimationHost for Stage<S> {
    fn animation_parts(&mut self) -> (&mut AnimationScheduler, &mut dyn LayerSink, Duration) {
        let interval = self.controller.target_frame_interval();
        (&mut self.animation, &mut self.sink, interval)
    }
}

/// Owns and drives every component.
pub struct Engine<S> {
    config: EngineConfig,
    registry: ResourceRegistry<Stage<S>>,
    stage: Stage<S>,
    frame_index: u64,
    render_time: Duration,
    last_cleanup: Option<HostTime>,
}

impl<S: fmt::Debug> fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("stage", &self.stage)
            .field("frame_index", &self.frame_index)
            .field("render_time", &self.render_time)
            .field("last_cleanup", &self.last_cleanup)
            .finish()
    }
}

impl<S: LayerSink + 'static> Engine<S> {
    /// Builds an engine publishing to `sink`.
    pub fn new(config: EngineConfig, sink: S) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            registry: ResourceRegistry::new(config.retry),
            stage: Stage {
                animation: AnimationScheduler::new(),
                culling: CullingPipeline::new(config.culling)?,
                sampler: PerformanceSampler::new(config.sampler),
                controller: AdaptiveRateController::new(config.rate),
                sink,
                probe: Box::new(NoMemoryProbe),
            },
            frame_index: 0,
            render_time: Duration::ZERO,
            last_cleanup: None,
        })
    }

    /// Installs the platform's memory probe.
    #[must_use]
    pub fn with_memory_probe(mut self, probe: impl MemoryProbe + 'static) -> Self {
        self.stage.probe = Box::new(probe);
        self
    }

    /// Runs one frame.
    pub fn on_frame(&mut self, tick: &FrameTick, tracer: &mut Tracer<'_>) -> FrameReport {
        let now = tick.now;
        self.frame_index = tick.frame_index;
        let tick_event = FrameTickEvent::from(tick);
        tracer.frame_tick(&tick_event);
        let mut summary = FrameSummaryBuilder::new(&tick_event);
        let mut report = FrameReport::default();

        let stage = &mut self.stage;
        stage.sampler.record_frame(tick);
        stage.sampler.record_memory(now, stage.probe.as_mut());

        if let Some(cleanup) = self.check_exhaustion(now) {
            if let Some(change) = cleanup.step_down {
                self.quality_event(tracer, &mut summary, change);
            }
            report.cleanup = Some(cleanup);
        }

        let stage = &mut self.stage;
        if let Some(change) = stage.controller.evaluate(now, &stage.sampler) {
            self.quality_event(tracer, &mut summary, change);
            report.quality_change = Some(change);
        } else if let Some(cleanup) = &report.cleanup {
            report.quality_change = cleanup.step_down;
        }

        report.tasks = self.registry.run_due(now, &mut self.stage);
        summary.tasks(report.tasks);
        report.failures = self.registry.take_failures();
        for failure in &report.failures {
            self.stage.animation.mark_failed(&failure.owner);
            tracer.task_failure(&TaskFailureEvent {
                frame_index: self.frame_index,
                owner: &failure.owner,
                tag: failure.tag,
                attempts: failure.attempts,
                error: &failure.error,
            });
        }
        for publish in self.stage.animation.publishes_at(now) {
            summary.stream_published(publish.features);
            tracer.stream_publish(&StreamPublishEvent {
                frame_index: self.frame_index,
                stream: &publish.stream,
                features: publish.features,
            });
        }

        let stage = &mut self.stage;
        let aggressiveness = stage.controller.culling_aggressiveness();
        report.cull_passes = stage.culling.process(now, aggressiveness, &mut stage.sink);
        for pass in &report.cull_passes {
            summary.cull_pass(pass);
            tracer.cull_pass(&CullPassEvent {
                frame_index: self.frame_index,
                source: pass.source,
                name: stage.culling.source_name(pass.source).unwrap_or_default(),
                level: pass.level,
                visible: pass.stats.emitted,
                culled: pass.stats.culled(),
                cache_hit: pass.cache_hit,
                published: pass.published,
            });
        }

        let finished: FrameSummary = summary.finish(
            stage.controller.target_fps(),
            stage.culling.stats().current_lod,
        );
        tracer.frame_summary(&finished);
        report
    }

    /// Feeds back the cost of the frame just rendered.
    pub fn observe(&mut self, feedback: &FrameFeedback, tracer: &mut Tracer<'_>) {
        self.render_time = feedback.render_time();
        self.stage.sampler.record_render_time(feedback);
        tracer.render_feedback(&RenderFeedbackEvent {
            frame_index: self.frame_index,
            render_time: self.render_time,
        });
    }

    /// Records a camera change; culling recomputes on a later frame.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.stage.culling.set_viewport(viewport);
    }

    /// Current metrics.
    #[must_use]
    pub fn telemetry(&self) -> Telemetry {
        let stage = &self.stage;
        let culling = stage.culling.stats();
        Telemetry {
            fps: stage
                .sampler
                .moving_average(self.config.sampler.degraded_window)
                .map_or(0.0, |s| s.fps),
            memory_mb: stage.sampler.memory_mb(),
            active_animation_count: stage.animation.active_count(),
            visible_feature_count: culling.visible,
            culled_feature_count: culling.culled,
            render_time_ms: self.render_time.as_millis_f64(),
            current_lod: culling.current_lod,
            target_fps: stage.controller.target_fps(),
        }
    }

    /// Starts or restarts an animation stream.
    pub fn start_stream(
        &mut self,
        name: &str,
        specs: impl IntoIterator<Item = EntitySpec>,
    ) -> StartReport {
        self.stage
            .animation
            .start_stream(&mut self.registry, name, &mut self.stage.sink, specs)
    }

    /// Stops an animation stream and clears its layer.
    pub fn stop_stream(&mut self, name: &str) -> bool {
        self.stage
            .animation
            .stop_stream(&mut self.registry, name, &mut self.stage.sink)
    }

    /// Stops every animation stream.
    pub fn stop_all_streams(&mut self) {
        self.stage
            .animation
            .stop_all(&mut self.registry, &mut self.stage.sink);
    }

    /// Registers a culled feature source.
    pub fn register_source(&mut self, name: impl Into<String>, features: Vec<Feature>) -> SourceId {
        self.stage.culling.register_source(name, features)
    }

    /// Replaces a source's data.
    pub fn replace_source_data(&mut self, id: SourceId, features: Vec<Feature>) -> bool {
        self.stage.culling.replace_source_data(id, features)
    }

    /// Unregisters a source.
    pub fn remove_source(&mut self, id: SourceId) -> bool {
        self.stage.culling.remove_source(id)
    }

    /// Switches the quality ladder, restarting at its top level.
    pub fn set_rate_config(&mut self, rate: RateControllerConfig) -> Result<(), ConfigError> {
        rate.validate()?;
        self.config.rate = rate;
        self.stage.controller = AdaptiveRateController::new(rate);
        self.stage.culling.invalidate_settings();
        info!("rate ladder replaced, target {} fps", self.stage.controller.target_fps());
        Ok(())
    }

    /// Schedules a host task with the engine's default retry policy.
    pub fn schedule(
        &mut self,
        owner: impl Into<String>,
        kind: TaskKind,
        callback: impl FnMut(&mut Stage<S>, &TaskContext<'_>) -> Result<(), TaskError> + 'static,
    ) -> TaskHandle {
        self.registry.schedule(owner, kind, callback)
    }

    /// Schedules a host task with explicit options.
    pub fn schedule_with(
        &mut self,
        owner: impl Into<String>,
        kind: TaskKind,
        options: TaskOptions,
        callback: impl FnMut(&mut Stage<S>, &TaskContext<'_>) -> Result<(), TaskError> + 'static,
    ) -> TaskHandle {
        self.registry.schedule_with(owner, kind, options, callback)
    }

    /// Cancels every task whose owner starts with `prefix`.
    pub fn cancel_owner(&mut self, prefix: &str) -> usize {
        self.registry.cancel_all(Some(prefix))
    }

    /// Stops all streams, cancels all tasks and drops cached results.
    pub fn teardown(&mut self) {
        self.stop_all_streams();
        let cancelled = self.registry.cancel_all(None);
        self.stage.culling.clear_cache();
        info!("engine torn down, {cancelled} host tasks cancelled");
    }

    /// The task registry.
    #[must_use]
    pub fn registry(&self) -> &ResourceRegistry<Stage<S>> {
        &self.registry
    }

    /// Component state.
    #[must_use]
    pub fn stage(&self) -> &Stage<S> {
        &self.stage
    }

    /// Component state, mutably.
    pub fn stage_mut(&mut self) -> &mut Stage<S> {
        &mut self.stage
    }

    /// The layer sink.
    #[must_use]
    pub fn sink(&self) -> &S {
        &self.stage.sink
    }

    /// The layer sink, mutably.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.stage.sink
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn check_exhaustion(&mut self, now: HostTime) -> Option<Cleanup> {
        let reason = if self.stage.sampler.is_memory_exhausted() {
            Exhaustion::Memory
        } else if self.registry.len() > self.config.max_tasks {
            Exhaustion::Tasks
        } else {
            return None;
        };
        let cooldown = self.config.rate.cooldown;
        if self
            .last_cleanup
            .is_some_and(|at| now.saturating_duration_since(at) < cooldown)
        {
            return None;
        }
        self.last_cleanup = Some(now);

        let cache_entries = self.stage.culling.stats().cache.entries;
        self.stage.culling.clear_cache();
        let pruned_tasks = self.registry.prune_non_essential();
        let step_down = self.stage.controller.force_step_down(now);
        warn!(
            "{reason:?} exhausted: dropped {cache_entries} cached results, pruned {pruned_tasks} tasks, now {} fps",
            self.stage.controller.target_fps()
        );
        Some(Cleanup {
            reason,
            cache_entries,
            pruned_tasks,
            step_down,
        })
    }

    fn quality_event(
        &self,
        tracer: &mut Tracer<'_>,
        summary: &mut FrameSummaryBuilder,
        change: QualityChange,
    ) {
        summary.quality_changed();
        tracer.quality_change(&QualityChangeEvent {
            frame_index: self.frame_index,
            change,
        });
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use kurbo::Point;

    use super::*;
    use crate::geo::GeoBounds;
    use crate::lod::LodLevel;
    use crate::rate::ChangeReason;
    use crate::registry::TaskTag;
    use crate::sink::RecordingSink;

    fn engine() -> Engine<RecordingSink> {
        Engine::new(EngineConfig::standard(), RecordingSink::new()).unwrap()
    }

    fn tick(ms: u64, index: u64) -> FrameTick {
        FrameTick::new(HostTime::from_millis(ms), index)
    }

    fn route() -> Vec<Point> {
        vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]
    }

    #[test]
    fn rejects_invalid_config() {
        let config = EngineConfig {
            max_tasks: 0,
            ..EngineConfig::standard()
        };
        assert!(Engine::new(config, RecordingSink::new()).is_err());
        assert!(EngineConfig::battery_saver().validate().is_ok());
    }

    #[test]
    fn frame_runs_streams_and_culling() {
        let mut engine = engine();
        engine.start_stream("shuttle", vec![EntitySpec::new("s1", route(), 0.05)]);
        engine.register_source(
            "gates",
            vec![
                Feature::point("g1", Point::new(0.5, 0.5), "gate"),
                Feature::point("g2", Point::new(50.0, 50.0), "gate"),
            ],
        );
        engine.set_viewport(Viewport {
            bounds: GeoBounds::new(1.0, 0.0, 1.0, 0.0),
            zoom: 17.0,
        });

        let report = engine.on_frame(&tick(0, 0), &mut Tracer::none());
        assert_eq!(report.tasks.ran, 1);
        assert_eq!(report.cull_passes.len(), 1);
        assert_eq!(engine.sink().layer("gates").unwrap().len(), 1);
        assert_eq!(engine.sink().publish_count("shuttle"), 1);

        let t = engine.telemetry();
        assert_eq!(t.active_animation_count, 1);
        assert_eq!((t.visible_feature_count, t.culled_feature_count), (1, 1));
        assert_eq!(t.current_lod, Some(LodLevel::High));
        assert_eq!(t.target_fps, 60);
    }

    #[test]
    fn observe_reports_render_time() {
        let mut engine = engine();
        engine.observe(
            &FrameFeedback {
                build_start: HostTime::from_millis(100),
                submitted_at: HostTime::from_millis(104),
            },
            &mut Tracer::none(),
        );
        assert_eq!(engine.telemetry().render_time_ms, 4.0);
    }

    #[test]
    fn memory_exhaustion_forces_cleanup_once_per_cooldown() {
        let mut engine = engine().with_memory_probe(|| Some(900.0));
        engine.schedule(
            "poller",
            TaskKind::Interval(Duration::from_secs(1)),
            |_, _| Ok(()),
        );

        let report = engine.on_frame(&tick(0, 0), &mut Tracer::none());
        let cleanup = report.cleanup.unwrap();
        assert_eq!(cleanup.reason, Exhaustion::Memory);
        assert_eq!(cleanup.pruned_tasks, 1);
        assert_eq!(cleanup.step_down.unwrap().reason, ChangeReason::Forced);
        assert_eq!(engine.telemetry().target_fps, 45);
        assert!(!engine.registry().contains("poller", TaskTag::Interval));

        let again = engine.on_frame(&tick(16, 1), &mut Tracer::none());
        assert!(again.cleanup.is_none(), "cleanup is rate limited");
        assert_eq!(engine.telemetry().target_fps, 45, "no double step");
    }

    #[test]
    fn task_ceiling_keeps_essential_tasks() {
        let config = EngineConfig {
            max_tasks: 2,
            ..EngineConfig::standard()
        };
        let mut engine = Engine::new(config, RecordingSink::new()).unwrap();
        engine.start_stream("patrol", vec![EntitySpec::new("p", route(), 0.1)]);
        for owner in ["a", "b"] {
            engine.schedule(owner, TaskKind::Interval(Duration::from_secs(1)), |_, _| {
                Ok(())
            });
        }

        let report = engine.on_frame(&tick(0, 0), &mut Tracer::none());
        let cleanup = report.cleanup.unwrap();
        assert_eq!(cleanup.reason, Exhaustion::Tasks);
        assert_eq!(cleanup.pruned_tasks, 2);
        assert_eq!(engine.registry().len(), 1);
        assert_eq!(engine.sink().publish_count("patrol"), 1);
    }

    #[test]
    fn exhausted_stream_is_marked_failed() {
        let mut engine = engine();
        engine.start_stream("crowd-flow", vec![EntitySpec::new("c", route(), 0.1)]);
        engine.start_stream("patrol", vec![EntitySpec::new("p", route(), 0.1)]);
        engine.sink_mut().fail_next("crowd-flow", 10);

        let mut failures = Vec::new();
        for i in 0..5 {
            failures.extend(engine.on_frame(&tick(i * 17, i), &mut Tracer::none()).failures);
        }
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].owner, "anim/crowd-flow");
        assert_eq!(
            engine.stage().animation().stream_state("crowd-flow"),
            Some(crate::animation::StreamState::Failed)
        );
        assert_eq!(engine.sink().publish_count("patrol"), 5);
        assert_eq!(engine.telemetry().active_animation_count, 1);
    }

    #[test]
    fn teardown_leaves_nothing_scheduled() {
        let mut engine = engine();
        engine.start_stream("shuttle", vec![EntitySpec::new("s", route(), 0.1)]);
        engine.schedule("poller", TaskKind::Timeout(Duration::from_secs(3)), |_, _| Ok(()));
        engine.teardown();
        assert!(engine.registry().is_empty());
        assert_eq!(engine.telemetry().active_animation_count, 0);
        assert!(engine.sink().layer("shuttle").unwrap().is_empty());
    }

    #[test]
    fn switching_ladders_restarts_at_top() {
        let mut engine = engine();
        engine
            .set_rate_config(RateControllerConfig::battery_saver())
            .unwrap();
        assert_eq!(engine.telemetry().target_fps, 30);
    }
}
