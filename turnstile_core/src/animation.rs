// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Route-following entity streams driven by the shared frame clock.
//!
//! A *stream* is a named group of [`AnimatedEntity`]s published together as
//! one [`FeatureCollection`] (e.g. `"crowd-flow"`, `"patrol"`, `"shuttle"`).
//! Each stream owns exactly one [`TaskKind::Frame`] task in the
//! [`ResourceRegistry`], filed under `anim/<name>`, which calls
//! [`AnimationScheduler::tick_stream`] every frame.
//!
//! # Tick
//!
//! An accepted tick advances every entity by `speed` in its direction,
//! interpolates its position along the route, and publishes the stream's
//! collection exactly once. A tick that arrives sooner than the target frame
//! interval after the previous accepted tick is throttled: nothing is
//! advanced or published, but the frame task stays scheduled.
//!
//! # Failure
//!
//! A failing tick (sink rejection, non-finite position) publishes nothing and
//! returns `Err` to the registry. Stream tasks use
//! [`RetryPolicy::next_frame`], so the stream retries on the very next frame.
//! When the retry budget is exhausted the registry drops the task and the
//! engine calls [`AnimationScheduler::mark_failed`]; other streams keep
//! running.
//!
//! [`RetryPolicy::next_frame`]: crate::registry::RetryPolicy::next_frame

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use kurbo::Point;
use log::{debug, info, warn};

use crate::error::{EntityError, TaskError};
use crate::geo::{Feature, FeatureCollection, FeatureProperties, Geometry};
use crate::path::{Parameterization, Route};
use crate::pool::Pool;
use crate::registry::{ResourceRegistry, RetryPolicy, TaskHandle, TaskKind, TaskOptions, TaskTag};
use crate::sink::LayerSink;
use crate::time::{Duration, HostTime};

/// Prefix of every stream's registry owner id.
pub const OWNER_PREFIX: &str = "anim/";

/// Progress within this distance of 1.0 counts as a completed lap.
const LAP_EPSILON: f64 = 1e-9;

/// Ticks arriving this much early still count as on time.
const THROTTLE_SLACK: Duration = Duration::from_millis(1);

/// Idle output buffers retained across ticks.
const POOL_CAPACITY: usize = 8;

/// Registry owner id for stream `name`.
#[must_use]
pub fn owner_id(name: &str) -> String {
    format!("{OWNER_PREFIX}{name}")
}

/// What happens at the end of the route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LoopMode {
    /// Jump back to the start, keeping any overshoot.
    #[default]
    Loop,
    /// Reverse direction, reflecting any overshoot.
    Bounce,
}

/// Direction of travel along the route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Towards the last point.
    #[default]
    Forward,
    /// Towards the first point.
    Backward,
}

impl Direction {
    const fn sign(self) -> f64 {
        match self {
            Self::Forward => 1.0,
            Self::Backward => -1.0,
        }
    }
}

/// An entity record as supplied by a simulator.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntitySpec {
    /// Identifier, unique within the stream.
    pub id: String,
    /// Route vertices.
    pub route: Vec<Point>,
    /// Progress per accepted tick, in `[0, 1]`.
    pub speed: f64,
    /// End-of-route behavior.
    pub mode: LoopMode,
    /// Category carried into feature properties.
    pub tag: String,
    /// Progress parameterization.
    pub parameterization: Parameterization,
    /// Starting progress, in `[0, 1]`.
    pub initial_progress: f64,
}

impl EntitySpec {
    /// A looping entity starting at the route's first point.
    #[must_use]
    pub fn new(id: impl Into<String>, route: Vec<Point>, speed: f64) -> Self {
        Self {
            id: id.into(),
            route,
            speed,
            mode: LoopMode::Loop,
            tag: String::new(),
            parameterization: Parameterization::Uniform,
            initial_progress: 0.0,
        }
    }

    /// Sets the end-of-route behavior.
    #[must_use]
    pub fn with_mode(mut self, mode: LoopMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the tag.
    #[must_use]
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    /// Sets the starting progress.
    #[must_use]
    pub fn with_progress(mut self, progress: f64) -> Self {
        self.initial_progress = progress;
        self
    }

    /// Sets the parameterization.
    #[must_use]
    pub fn with_parameterization(mut self, parameterization: Parameterization) -> Self {
        self.parameterization = parameterization;
        self
    }
}

/// A validated, moving entity.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimatedEntity {
    id: String,
    route: Route,
    progress: f64,
    speed: f64,
    mode: LoopMode,
    direction: Direction,
    tag: String,
    parameterization: Parameterization,
}

impl AnimatedEntity {
    /// Validates `spec`.
    pub fn from_spec(spec: EntitySpec) -> Result<Self, EntityError> {
        let EntitySpec {
            id,
            route,
            speed,
            mode,
            tag,
            parameterization,
            initial_progress,
        } = spec;

        if !speed.is_finite() || !(0.0..=1.0).contains(&speed) {
            return Err(EntityError::Speed { id, speed });
        }
        if !initial_progress.is_finite() || !(0.0..=1.0).contains(&initial_progress) {
            return Err(EntityError::Progress {
                id,
                progress: initial_progress,
            });
        }
        let route = match Route::new(route) {
            Ok(route) => route,
            Err(source) => return Err(EntityError::Route { id, source }),
        };

        Ok(Self {
            id,
            route,
            progress: initial_progress,
            speed,
            mode,
            direction: Direction::Forward,
            tag,
            parameterization,
        })
    }

    /// Identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Progress in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.progress
    }

    /// Current direction of travel.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// The entity's route.
    #[must_use]
    pub fn route(&self) -> &Route {
        &self.route
    }

    /// Current position on the route.
    #[must_use]
    pub fn position(&self) -> Point {
        self.route.position(self.progress, self.parameterization)
    }

    /// Advances progress by one tick.
    pub fn advance(&mut self) {
        (self.progress, self.direction) = self.stepped();
    }

    /// Progress and direction one tick ahead, without moving.
    #[must_use]
    pub fn stepped(&self) -> (f64, Direction) {
        let mut direction = self.direction;
        let mut t = self.progress + self.speed * direction.sign();
        match self.mode {
            LoopMode::Loop => {
                if t >= 1.0 - LAP_EPSILON {
                    t -= 1.0;
                    if t < LAP_EPSILON {
                        t = 0.0;
                    }
                }
            }
            LoopMode::Bounce => {
                if t >= 1.0 {
                    t = 2.0 - t;
                    direction = Direction::Backward;
                } else if t <= 0.0 {
                    t = -t;
                    direction = Direction::Forward;
                }
            }
        }
        (t.clamp(0.0, 1.0), direction)
    }

    fn to_feature(&self, progress: f64, position: Point) -> Feature {
        Feature {
            id: self.id.clone(),
            geometry: Geometry::Point(position),
            properties: FeatureProperties {
                tag: self.tag.clone(),
                progress: Some(progress),
            },
        }
    }
}

/// Lifecycle state of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamState {
    /// Ticking.
    Running,
    /// Its frame task exhausted the retry budget.
    Failed,
}

/// Per-stream counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Entities in the stream.
    pub entities: usize,
    /// Ticks that published.
    pub accepted: u64,
    /// Ticks skipped by the rate limit.
    pub throttled: u64,
    /// Ticks that returned an error.
    pub failed: u64,
}

/// Result of [`AnimationScheduler::start_stream`].
#[derive(Clone, Debug, PartialEq)]
pub struct StartReport {
    /// Stream name.
    pub stream: String,
    /// Entities accepted.
    pub accepted: usize,
    /// Entities rejected, with reasons.
    pub rejected: Vec<EntityError>,
    /// The stream's frame task, or `None` if no entity was valid.
    pub handle: Option<TaskHandle>,
}

/// Result of one [`AnimationScheduler::tick_stream`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The collection was published.
    Published {
        /// Features in the collection.
        features: usize,
    },
    /// Too soon after the previous accepted tick.
    Throttled,
    /// The stream has failed and no longer ticks.
    Inactive,
}

/// A successful publish during the most recent frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamPublish {
    /// Stream name.
    pub stream: String,
    /// Features published.
    pub features: usize,
}

/// Access the frame task needs from the registry's context.
pub trait AnimationHost {
    /// The scheduler, the sink to publish to, and the controller's target
    /// frame interval.
    fn animation_parts(&mut self) -> (&mut AnimationScheduler, &mut dyn LayerSink, Duration);
}

#[derive(Debug)]
struct Stream {
    entities: Vec<AnimatedEntity>,
    state: StreamState,
    last_accepted: Option<HostTime>,
    stats: StreamStats,
}

/// Owner of all animated streams.
#[derive(Debug)]
pub struct AnimationScheduler {
    streams: BTreeMap<String, Stream>,
    pool: Pool<FeatureCollection>,
    frame_at: Option<HostTime>,
    frame_publishes: Vec<StreamPublish>,
    /// Pending `(progress, direction)` per entity, committed after publish.
    steps: Vec<(f64, Direction)>,
}

impl Default for AnimationScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationScheduler {
    /// Creates a scheduler with no streams.
    #[must_use]
    pub fn new() -> Self {
        Self {
            streams: BTreeMap::new(),
            pool: Pool::new(POOL_CAPACITY),
            frame_at: None,
            frame_publishes: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Validates `specs` and (re)starts stream `name`.
    ///
    /// Invalid specs are rejected individually; the rest start. Restarting a
    /// running stream replaces its entities and its frame task. If no spec is
    /// valid, a running stream of the same name is stopped and its layer
    /// cleared through `sink`.
    pub fn start_stream<C: AnimationHost>(
        &mut self,
        registry: &mut ResourceRegistry<C>,
        name: &str,
        sink: &mut dyn LayerSink,
        specs: impl IntoIterator<Item = EntitySpec>,
    ) -> StartReport {
        let mut seen = BTreeSet::new();
        let mut entities = Vec::new();
        let mut rejected = Vec::new();
        for spec in specs {
            if !seen.insert(spec.id.clone()) {
                rejected.push(EntityError::Duplicate(spec.id));
                continue;
            }
            match AnimatedEntity::from_spec(spec) {
                Ok(entity) => entities.push(entity),
                Err(err) => {
                    warn!("stream {name}: rejected entity: {err}");
                    rejected.push(err);
                }
            }
        }

        let owner = owner_id(name);
        if entities.is_empty() {
            self.stop_stream(registry, name, sink);
            warn!("stream {name}: no valid entities, not started");
            return StartReport {
                stream: name.into(),
                accepted: 0,
                rejected,
                handle: None,
            };
        }

        let accepted = entities.len();
        self.streams.insert(
            name.into(),
            Stream {
                entities,
                state: StreamState::Running,
                last_accepted: None,
                stats: StreamStats {
                    entities: accepted,
                    ..StreamStats::default()
                },
            },
        );

        let stream = String::from(name);
        let options = TaskOptions {
            retry: RetryPolicy::next_frame(),
            essential: true,
        };
        let handle = registry.schedule_with(owner, TaskKind::Frame, options, move |host: &mut C, cx| {
            let (scheduler, sink, interval) = host.animation_parts();
            scheduler.tick_stream(&stream, cx.now, interval, sink).map(|_| ())
        });
        info!("stream {name}: started with {accepted} entities");

        StartReport {
            stream: name.into(),
            accepted,
            rejected,
            handle: Some(handle),
        }
    }

    /// Stops stream `name`, cancelling its task and clearing its layer.
    ///
    /// Returns whether the stream existed. Stopping twice is a no-op.
    pub fn stop_stream<C>(
        &mut self,
        registry: &mut ResourceRegistry<C>,
        name: &str,
        sink: &mut dyn LayerSink,
    ) -> bool {
        let owner = owner_id(name);
        for tag in [TaskTag::Frame, TaskTag::Timeout, TaskTag::Interval] {
            registry.cancel(&owner, tag);
        }
        if self.streams.remove(name).is_none() {
            return false;
        }
        if let Err(err) = sink.set_layer_data(name, &FeatureCollection::empty()) {
            warn!("stream {name}: clearing layer failed: {err}");
        }
        debug!("stream {name}: stopped");
        true
    }

    /// Stops every stream and cancels every animation task.
    pub fn stop_all<C>(&mut self, registry: &mut ResourceRegistry<C>, sink: &mut dyn LayerSink) {
        let names: Vec<String> = self.streams.keys().cloned().collect();
        for name in names {
            self.stop_stream(registry, &name, sink);
        }
        registry.cancel_all(Some(OWNER_PREFIX));
        self.pool.shrink();
    }

    /// Advances stream `name` if at least `interval` has passed since its
    /// last accepted tick, and publishes it.
    pub fn tick_stream(
        &mut self,
        name: &str,
        now: HostTime,
        interval: Duration,
        sink: &mut dyn LayerSink,
    ) -> Result<TickOutcome, TaskError> {
        if self.frame_at != Some(now) {
            self.frame_at = Some(now);
            self.frame_publishes.clear();
        }

        let Some(stream) = self.streams.get_mut(name) else {
            return Err(TaskError::MissingOwner(owner_id(name)));
        };
        if stream.state == StreamState::Failed {
            return Ok(TickOutcome::Inactive);
        }
        if let Some(last) = stream.last_accepted {
            let due = interval.saturating_sub(THROTTLE_SLACK);
            if now.saturating_duration_since(last) < due {
                stream.stats.throttled += 1;
                return Ok(TickOutcome::Throttled);
            }
        }

        // Entities only move once the sink has taken the frame.
        let mut out = self.pool.acquire();
        out.features.reserve(stream.entities.len());
        self.steps.clear();
        for entity in &stream.entities {
            let (progress, direction) = entity.stepped();
            let position = entity.route.position(progress, entity.parameterization);
            if !position.is_finite() {
                self.pool.release(out);
                stream.stats.failed += 1;
                return Err(TaskError::NonFinitePosition(entity.id.clone()));
            }
            out.features.push(entity.to_feature(progress, position));
            self.steps.push((progress, direction));
        }

        let result = sink.set_layer_data(name, &out);
        let features = out.len();
        self.pool.release(out);
        if let Err(err) = result {
            stream.stats.failed += 1;
            return Err(err.into());
        }

        for (entity, &(progress, direction)) in stream.entities.iter_mut().zip(&self.steps) {
            entity.progress = progress;
            entity.direction = direction;
        }
        stream.last_accepted = Some(now);
        stream.stats.accepted += 1;
        self.frame_publishes.push(StreamPublish {
            stream: name.into(),
            features,
        });
        Ok(TickOutcome::Published { features })
    }

    /// Marks the stream filed under registry owner `owner` as failed.
    ///
    /// Returns `false` if `owner` is not an animation owner or the stream is
    /// gone.
    pub fn mark_failed(&mut self, owner: &str) -> bool {
        let Some(name) = owner.strip_prefix(OWNER_PREFIX) else {
            return false;
        };
        match self.streams.get_mut(name) {
            Some(stream) => {
                stream.state = StreamState::Failed;
                warn!("stream {name}: failed, retry budget exhausted");
                true
            }
            None => false,
        }
    }

    /// Entities in running streams.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.streams
            .values()
            .filter(|s| s.state == StreamState::Running)
            .map(|s| s.entities.len())
            .sum()
    }

    /// State of stream `name`, or `None` if it is not started.
    #[must_use]
    pub fn stream_state(&self, name: &str) -> Option<StreamState> {
        self.streams.get(name).map(|s| s.state)
    }

    /// Counters of stream `name`.
    #[must_use]
    pub fn stream_stats(&self, name: &str) -> Option<StreamStats> {
        self.streams.get(name).map(|s| s.stats)
    }

    /// Names of all started streams.
    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    /// Entity `id` of stream `name`.
    #[must_use]
    pub fn entity(&self, name: &str, id: &str) -> Option<&AnimatedEntity> {
        self.streams.get(name)?.entities.iter().find(|e| e.id == id)
    }

    /// Publishes made during the frame at `now`.
    #[must_use]
    pub fn publishes_at(&self, now: HostTime) -> &[StreamPublish] {
        if self.frame_at == Some(now) {
            &self.frame_publishes
        } else {
            &[]
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::sink::RecordingSink;

    struct Host {
        anim: AnimationScheduler,
        sink: RecordingSink,
        interval: Duration,
    }

    impl Host {
        fn new() -> Self {
            Self {
                anim: AnimationScheduler::new(),
                sink: RecordingSink::new(),
                interval: Duration::ZERO,
            }
        }
    }

    impl AnimationHost for Host {
        fn animation_parts(&mut self) -> (&mut AnimationScheduler, &mut dyn LayerSink, Duration) {
            (&mut self.anim, &mut self.sink, self.interval)
        }
    }

    fn line() -> Vec<Point> {
        vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]
    }

    fn entity(spec: EntitySpec) -> AnimatedEntity {
        AnimatedEntity::from_spec(spec).unwrap()
    }

    #[test]
    fn loop_wraps_exactly_to_start() {
        let mut e = entity(EntitySpec::new("a", line(), 0.1));
        for _ in 0..10 {
            e.advance();
        }
        assert_eq!(e.progress(), 0.0);
        assert_eq!(e.position(), Point::new(0.0, 0.0));
    }

    #[test]
    fn loop_keeps_overshoot() {
        let mut e = entity(EntitySpec::new("a", line(), 0.3).with_progress(0.8));
        e.advance();
        assert!((e.progress() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn bounce_reflects_overshoot_and_turns() {
        let mut e = entity(
            EntitySpec::new("b", line(), 0.3)
                .with_mode(LoopMode::Bounce)
                .with_progress(0.8),
        );
        e.advance();
        assert!((e.progress() - 0.9).abs() < 1e-12, "1.1 reflects to 0.9");
        assert_eq!(e.direction(), Direction::Backward);
        for _ in 0..3 {
            e.advance();
        }
        // 0.6, 0.3, 0.0 → lands on the start and turns.
        assert_eq!(e.direction(), Direction::Forward);
        assert!(e.progress() >= 0.0 && e.progress() < 1e-9);
    }

    #[test]
    fn progress_stays_in_unit_interval() {
        let mut e = entity(EntitySpec::new("c", line(), 1.0).with_mode(LoopMode::Bounce));
        for _ in 0..25 {
            e.advance();
            assert!((0.0..=1.0).contains(&e.progress()));
        }
        let mut still = entity(EntitySpec::new("d", line(), 0.0).with_progress(0.4));
        still.advance();
        assert_eq!(still.progress(), 0.4);
    }

    #[test]
    fn invalid_specs_are_rejected_individually() {
        let mut reg: ResourceRegistry<Host> = ResourceRegistry::default();
        let mut host = Host::new();
        let report = host.anim.start_stream(
            &mut reg,
            "crowd-flow",
            &mut host.sink,
            vec![
                EntitySpec::new("ok", line(), 0.1),
                EntitySpec::new("short", vec![Point::ZERO], 0.1),
                EntitySpec::new("fast", line(), 1.5),
                EntitySpec::new("nan", line(), f64::NAN),
                EntitySpec::new("late", line(), 0.1).with_progress(2.0),
                EntitySpec::new("ok", line(), 0.2),
            ],
        );
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected.len(), 5);
        assert!(matches!(report.rejected[0], EntityError::Route { .. }));
        assert_eq!(report.rejected[4], EntityError::Duplicate("ok".into()));
        assert!(report.handle.is_some());
        assert_eq!(host.anim.active_count(), 1);
    }

    #[test]
    fn all_invalid_does_not_schedule() {
        let mut reg: ResourceRegistry<Host> = ResourceRegistry::default();
        let mut host = Host::new();
        let report = host.anim.start_stream(
            &mut reg,
            "patrol",
            &mut host.sink,
            vec![EntitySpec::new("x", vec![], 0.1)],
        );
        assert_eq!(report.handle, None);
        assert!(reg.is_empty());
        assert_eq!(host.anim.stream_state("patrol"), None);
        assert_eq!(host.sink.publish_count("patrol"), 0, "nothing to clear");
    }

    #[test]
    fn restart_with_only_invalid_specs_clears_the_layer() {
        let mut reg: ResourceRegistry<Host> = ResourceRegistry::default();
        let mut host = Host::new();
        host.anim.start_stream(
            &mut reg,
            "patrol",
            &mut host.sink,
            vec![EntitySpec::new("p", line(), 0.1)],
        );
        reg.run_due(HostTime::from_millis(0), &mut host);
        assert_eq!(host.sink.layer("patrol").unwrap().len(), 1);

        let report = host.anim.start_stream(
            &mut reg,
            "patrol",
            &mut host.sink,
            vec![EntitySpec::new("g", vec![], 0.1)],
        );
        assert_eq!(report.handle, None);
        assert_eq!(host.anim.stream_state("patrol"), None);
        assert!(host.sink.layer("patrol").unwrap().is_empty(), "stale markers left");
        assert_eq!(reg.stats_for(&owner_id("patrol")).total(), 0);
    }

    #[test]
    fn each_accepted_tick_publishes_once() {
        let mut reg: ResourceRegistry<Host> = ResourceRegistry::default();
        let mut host = Host::new();
        host.anim.start_stream(
            &mut reg,
            "shuttle",
            &mut host.sink,
            vec![
                EntitySpec::new("s1", line(), 0.1).with_tag("north-loop"),
                EntitySpec::new("s2", line(), 0.2),
            ],
        );

        for frame in 0..5 {
            reg.run_due(HostTime::from_millis(frame * 16), &mut host);
        }
        assert_eq!(host.sink.publish_count("shuttle"), 5);
        let layer = host.sink.layer("shuttle").unwrap();
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.features[0].properties.tag, "north-loop");
        assert!(host.anim.publishes_at(HostTime::from_millis(64)).len() == 1);
    }

    #[test]
    fn throttled_ticks_skip_rendering_but_keep_the_task() {
        let mut reg: ResourceRegistry<Host> = ResourceRegistry::default();
        let mut host = Host::new();
        host.interval = Duration::from_fps(30);
        host.anim.start_stream(
            &mut reg,
            "crowd-flow",
            &mut host.sink,
            vec![EntitySpec::new("a", line(), 0.01)],
        );

        // 60 Hz ticks against a 30 fps target: every other tick publishes.
        for frame in 0..10_u64 {
            reg.run_due(HostTime(frame * Duration::from_fps(60).nanos()), &mut host);
        }
        let stats = host.anim.stream_stats("crowd-flow").unwrap();
        assert_eq!(stats.accepted, 5);
        assert_eq!(stats.throttled, 5);
        assert_eq!(host.sink.publish_count("crowd-flow"), 5);
        assert!(reg.contains(&owner_id("crowd-flow"), TaskTag::Frame));
    }

    #[test]
    fn restart_replaces_the_task() {
        let mut reg: ResourceRegistry<Host> = ResourceRegistry::default();
        let mut host = Host::new();
        let first = host.anim.start_stream(
            &mut reg,
            "patrol",
            &mut host.sink,
            vec![EntitySpec::new("p", line(), 0.1)],
        );
        let second = host.anim.start_stream(
            &mut reg,
            "patrol",
            &mut host.sink,
            vec![EntitySpec::new("q", line(), 0.1)],
        );
        assert_ne!(first.handle, second.handle);
        assert_eq!(reg.stats_for(&owner_id("patrol")).frames, 1);
        assert!(host.anim.entity("patrol", "p").is_none());
        assert!(host.anim.entity("patrol", "q").is_some());
    }

    #[test]
    fn stop_clears_layer_and_task() {
        let mut reg: ResourceRegistry<Host> = ResourceRegistry::default();
        let mut host = Host::new();
        host.anim.start_stream(
            &mut reg,
            "patrol",
            &mut host.sink,
            vec![EntitySpec::new("p", line(), 0.1)],
        );
        reg.run_due(HostTime::from_millis(0), &mut host);
        assert_eq!(host.sink.layer("patrol").unwrap().len(), 1);

        assert!(host.anim.stop_stream(&mut reg, "patrol", &mut host.sink));
        assert!(!host.anim.stop_stream(&mut reg, "patrol", &mut host.sink));
        assert!(host.sink.layer("patrol").unwrap().is_empty());
        assert_eq!(reg.stats_for(&owner_id("patrol")).total(), 0);
        assert_eq!(host.anim.active_count(), 0);
    }

    #[test]
    fn sink_failure_recovers_next_frame() {
        let mut reg: ResourceRegistry<Host> = ResourceRegistry::default();
        let mut host = Host::new();
        host.anim.start_stream(
            &mut reg,
            "crowd-flow",
            &mut host.sink,
            vec![EntitySpec::new("a", line(), 0.1)],
        );
        host.sink.fail_next("crowd-flow", 1);

        let failed = reg.run_due(HostTime::from_millis(0), &mut host);
        assert_eq!(failed.failed, 1);
        let entity = host.anim.entity("crowd-flow", "a").unwrap();
        assert_eq!(entity.progress(), 0.0, "rejected frame does not move entities");
        let ok = reg.run_due(HostTime::from_millis(16), &mut host);
        assert_eq!(ok.failed, 0);
        assert_eq!(host.sink.publish_count("crowd-flow"), 1);
        let entity = host.anim.entity("crowd-flow", "a").unwrap();
        assert!((entity.progress() - 0.1).abs() < 1e-12, "no step skipped");
        let layer = host.sink.layer("crowd-flow").unwrap();
        assert_eq!(layer.features[0].properties.progress, Some(entity.progress()));
        assert_eq!(host.anim.stream_state("crowd-flow"), Some(StreamState::Running));
    }

    #[test]
    fn mark_failed_only_touches_animation_owners() {
        let mut reg: ResourceRegistry<Host> = ResourceRegistry::default();
        let mut host = Host::new();
        host.anim.start_stream(
            &mut reg,
            "shuttle",
            &mut host.sink,
            vec![EntitySpec::new("s", line(), 0.1)],
        );
        assert!(!host.anim.mark_failed("telemetry"));
        assert!(!host.anim.mark_failed("anim/ghost"));
        assert!(host.anim.mark_failed("anim/shuttle"));
        assert_eq!(host.anim.stream_state("shuttle"), Some(StreamState::Failed));
        assert_eq!(host.anim.active_count(), 0);
        assert_eq!(
            host.anim
                .tick_stream("shuttle", HostTime::ZERO, Duration::ZERO, &mut host.sink),
            Ok(TickOutcome::Inactive)
        );
    }
}
