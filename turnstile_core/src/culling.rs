// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The culling pipeline: intents in, culled collections out.
//!
//! [`CullingPipeline`] owns the registered feature sources, the
//! [`LodSelector`] and the [`FeatureCache`]. Viewport changes, data
//! replacement and settings changes only mark intents (see [`dirty`]); the
//! frame loop calls [`process`](CullingPipeline::process) every tick, which
//! runs at most once per [`CullingConfig::interval`] and only when something
//! is pending.
//!
//! For each pending source a pass:
//!
//! 1. selects the LOD bucket and buffer for the current zoom under the active
//!    [`CullingAggressiveness`],
//! 2. serves the result from cache if a fresh record for the same viewport
//!    exists, or culls and caches it otherwise,
//! 3. publishes it to the [`LayerSink`] under the source's name.
//!
//! [`dirty`]: crate::dirty

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use log::{debug, warn};
use understory_dirty::{Channel, CycleHandling, DirtyTracker};

use crate::cache::{CacheConfig, CacheKey, CacheStats, FeatureCache, SourceId, ViewFingerprint};
use crate::cull::{CullStats, cull_features};
use crate::dirty;
use crate::error::ConfigError;
use crate::geo::{Feature, Viewport};
use crate::lod::{LodConfig, LodLevel, LodSelector};
use crate::rate::CullingAggressiveness;
use crate::sink::LayerSink;
use crate::time::{Duration, HostTime};

/// Pipeline configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CullingConfig {
    /// Minimum spacing between passes.
    pub interval: Duration,
    /// LOD threshold table.
    pub lod: LodConfig,
    /// Result cache.
    pub cache: CacheConfig,
}

impl CullingConfig {
    /// 100 ms debounce with the standard LOD table and cache.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            interval: Duration::from_millis(100),
            lod: LodConfig::standard(),
            cache: CacheConfig::standard(),
        }
    }

    /// Validates the nested configs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.lod.validate()?;
        self.cache.validate()
    }
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// What one source's pass did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CullPass {
    /// The source.
    pub source: SourceId,
    /// Selected detail level.
    pub level: LodLevel,
    /// Integer zoom bucket.
    pub zoom_bucket: u8,
    /// Counts for the published result.
    pub stats: CullStats,
    /// Whether the result came from cache.
    pub cache_hit: bool,
    /// Whether the sink accepted it.
    pub published: bool,
}

/// Aggregate pipeline counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullingStats {
    /// Registered sources.
    pub sources: usize,
    /// Passes run since creation.
    pub passes: u64,
    /// Features emitted by each source's latest pass, summed.
    pub visible: usize,
    /// Features dropped by each source's latest pass, summed.
    pub culled: usize,
    /// Level selected by the latest pass.
    pub current_lod: Option<LodLevel>,
    /// Cache counters.
    pub cache: CacheStats,
}

#[derive(Debug)]
struct Source {
    name: String,
    features: Vec<Feature>,
    last: CullStats,
}

/// Viewport culling, LOD capping and caching for registered sources.
#[derive(Debug)]
pub struct CullingPipeline {
    config: CullingConfig,
    selector: LodSelector,
    cache: FeatureCache,
    sources: BTreeMap<u32, Source>,
    next_id: u32,
    intents: DirtyTracker<u32>,
    /// Set on every mark, cleared by a drain.
    pending: bool,
    /// Sources whose pass is in progress.
    busy: BTreeSet<u32>,
    viewport: Option<Viewport>,
    aggressiveness: Option<CullingAggressiveness>,
    last_run: Option<HostTime>,
    current_lod: Option<LodLevel>,
    passes: u64,
}

impl CullingPipeline {
    /// Creates an empty pipeline.
    pub fn new(config: CullingConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            selector: LodSelector::new(config.lod)?,
            cache: FeatureCache::new(config.cache),
            config,
            sources: BTreeMap::new(),
            next_id: 0,
            intents: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            pending: false,
            busy: BTreeSet::new(),
            viewport: None,
            aggressiveness: None,
            last_run: None,
            current_lod: None,
            passes: 0,
        })
    }

    /// Registers a named source. It is culled on the next pass.
    pub fn register_source(&mut self, name: impl Into<String>, features: Vec<Feature>) -> SourceId {
        let id = self.next_id;
        self.next_id += 1;
        self.sources.insert(
            id,
            Source {
                name: name.into(),
                features,
                last: CullStats::default(),
            },
        );
        self.mark(id, dirty::DATA);
        SourceId(id)
    }

    /// Replaces a source's features and purges its cached results.
    ///
    /// Returns `false` for an unknown source.
    pub fn replace_source_data(&mut self, id: SourceId, features: Vec<Feature>) -> bool {
        let Some(source) = self.sources.get_mut(&id.0) else {
            return false;
        };
        source.features = features;
        self.cache.purge_source(id);
        self.mark(id.0, dirty::DATA);
        true
    }

    /// Unregisters a source, dropping its cache entries and pending intents.
    pub fn remove_source(&mut self, id: SourceId) -> bool {
        if self.sources.remove(&id.0).is_none() {
            return false;
        }
        self.cache.purge_source(id);
        self.intents.remove_key(id.0);
        true
    }

    /// Looks up a source by name.
    #[must_use]
    pub fn source_id(&self, name: &str) -> Option<SourceId> {
        self.sources
            .iter()
            .find(|(_, s)| s.name == name)
            .map(|(&id, _)| SourceId(id))
    }

    /// Name a source was registered under.
    #[must_use]
    pub fn source_name(&self, id: SourceId) -> Option<&str> {
        self.sources.get(&id.0).map(|s| s.name.as_str())
    }

    /// Records a camera change. Identical viewports are ignored.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        if self.viewport == Some(viewport) {
            return;
        }
        self.viewport = Some(viewport);
        self.mark_all(dirty::VIEWPORT);
    }

    /// The current viewport, if one was set.
    #[must_use]
    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    /// Drops every cached result and schedules a pass for every source.
    pub fn invalidate_settings(&mut self) {
        self.cache.clear();
        self.mark_all(dirty::SETTINGS);
    }

    /// Drops every cached result without scheduling passes.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Runs pending passes if the debounce interval has elapsed.
    pub fn process(
        &mut self,
        now: HostTime,
        aggressiveness: CullingAggressiveness,
        sink: &mut dyn LayerSink,
    ) -> Vec<CullPass> {
        if self.aggressiveness != Some(aggressiveness) {
            if self.aggressiveness.is_some() {
                self.mark_all(dirty::SETTINGS);
            }
            self.aggressiveness = Some(aggressiveness);
        }

        let Some(viewport) = self.viewport else {
            return Vec::new();
        };
        if self
            .last_run
            .is_some_and(|last| now.saturating_duration_since(last) < self.config.interval)
        {
            return Vec::new();
        }

        let pending = self.drain_intents();
        if pending.is_empty() {
            return Vec::new();
        }
        self.last_run = Some(now);
        self.cache.purge_expired(now);

        let selection = self.selector.select(viewport.zoom, aggressiveness);
        let fingerprint = ViewFingerprint::new(&viewport, aggressiveness);
        self.current_lod = Some(selection.level);

        let mut passes = Vec::with_capacity(pending.len());
        for id in pending {
            if !self.busy.insert(id) {
                self.mark(id, dirty::DATA);
                continue;
            }
            let Some(source) = self.sources.get_mut(&id) else {
                self.busy.remove(&id);
                continue;
            };

            let key = CacheKey {
                source: SourceId(id),
                lod: selection.level,
                zoom_bucket: selection.zoom_bucket,
            };
            let (features, stats, cache_hit) = match self.cache.get(&key, fingerprint, now) {
                Some(record) => (Rc::clone(&record.features), record.stats, true),
                None => {
                    let (culled, stats) = cull_features(&source.features, &viewport, &selection);
                    let culled = Rc::new(culled);
                    self.cache
                        .insert(key, Rc::clone(&culled), stats, fingerprint, now);
                    (culled, stats, false)
                }
            };

            let published = match sink.set_layer_data(&source.name, &features) {
                Ok(()) => {
                    source.last = stats;
                    true
                }
                Err(err) => {
                    warn!("culling pass for {} not published: {err}", source.name);
                    self.intents.mark(id, dirty::DATA);
                    self.pending = true;
                    false
                }
            };
            debug!(
                "culled {}: {} -> {} at {} (cache {})",
                source.name,
                stats.input,
                stats.emitted,
                selection.level.name(),
                if cache_hit { "hit" } else { "miss" }
            );

            self.busy.remove(&id);
            self.passes += 1;
            passes.push(CullPass {
                source: SourceId(id),
                level: selection.level,
                zoom_bucket: selection.zoom_bucket,
                stats,
                cache_hit,
                published,
            });
        }
        passes
    }

    /// Whether any source awaits a pass.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Aggregate counters.
    #[must_use]
    pub fn stats(&self) -> CullingStats {
        let (visible, culled) = self
            .sources
            .values()
            .fold((0, 0), |(v, c), s| (v + s.last.emitted, c + s.last.culled()));
        CullingStats {
            sources: self.sources.len(),
            passes: self.passes,
            visible,
            culled,
            current_lod: self.current_lod,
            cache: self.cache.stats(),
        }
    }

    fn mark(&mut self, id: u32, channel: Channel) {
        self.intents.mark(id, channel);
        self.pending = true;
    }

    fn mark_all(&mut self, channel: Channel) {
        for &id in self.sources.keys() {
            self.intents.mark(id, channel);
            self.pending = true;
        }
    }

    fn drain_intents(&mut self) -> BTreeSet<u32> {
        self.pending = false;
        let mut pending = BTreeSet::new();
        for channel in [dirty::VIEWPORT, dirty::DATA, dirty::SETTINGS] {
            pending.extend(self.intents.drain(channel).deterministic().run());
        }
        pending
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;

    use kurbo::Point;

    use super::*;
    use crate::geo::GeoBounds;
    use crate::sink::RecordingSink;

    fn ms(v: u64) -> HostTime {
        HostTime::from_millis(v)
    }

    fn grid(n: usize) -> Vec<Feature> {
        (0..n)
            .map(|i| {
                let x = (i % 100) as f64 / 10.0;
                let y = (i / 100) as f64 / 10.0;
                Feature::point(format!("g{i}"), Point::new(x, y), "grid")
            })
            .collect()
    }

    fn view(zoom: f64) -> Viewport {
        Viewport {
            bounds: GeoBounds::new(5.0, 0.0, 5.0, 0.0),
            zoom,
        }
    }

    fn pipeline() -> CullingPipeline {
        CullingPipeline::new(CullingConfig::default()).unwrap()
    }

    #[test]
    fn nothing_runs_without_a_viewport() {
        let mut p = pipeline();
        p.register_source("zones", grid(100));
        let mut sink = RecordingSink::new();
        assert!(p.process(ms(0), CullingAggressiveness::FULL, &mut sink).is_empty());
        assert!(p.has_pending(), "intent survives until a viewport arrives");
    }

    #[test]
    fn viewport_change_publishes_capped_subset() {
        let mut p = pipeline();
        let id = p.register_source("zones", grid(10_000));
        p.set_viewport(view(12.5));
        let mut sink = RecordingSink::new();
        let passes = p.process(ms(0), CullingAggressiveness::FULL, &mut sink);

        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].source, id);
        assert_eq!(passes[0].level, LodLevel::Low);
        assert!(passes[0].stats.emitted <= 150);
        assert!(passes[0].published);
        assert_eq!(sink.layer("zones").unwrap().len(), passes[0].stats.emitted);
        assert!(!p.has_pending());
    }

    #[test]
    fn passes_are_debounced_and_coalesced() {
        let mut p = pipeline();
        p.register_source("zones", grid(100));
        p.set_viewport(view(14.0));
        let mut sink = RecordingSink::new();
        assert_eq!(p.process(ms(0), CullingAggressiveness::FULL, &mut sink).len(), 1);

        // A burst of camera moves inside the debounce window.
        for i in 1..10_u32 {
            let mut v = view(14.0);
            v.bounds.north += f64::from(i) * 0.01;
            p.set_viewport(v);
            assert!(p.process(ms(i.into()), CullingAggressiveness::FULL, &mut sink).is_empty());
        }
        let passes = p.process(ms(100), CullingAggressiveness::FULL, &mut sink);
        assert_eq!(passes.len(), 1, "burst coalesces into one pass");
        assert_eq!(sink.publish_count("zones"), 2);
    }

    #[test]
    fn returning_to_a_viewport_hits_the_cache() {
        let mut p = pipeline();
        p.register_source("zones", grid(1_000));
        let mut sink = RecordingSink::new();

        p.set_viewport(view(16.0));
        let first = p.process(ms(0), CullingAggressiveness::FULL, &mut sink);
        p.set_viewport(view(17.0));
        p.process(ms(200), CullingAggressiveness::FULL, &mut sink);
        p.set_viewport(view(16.0));
        let again = p.process(ms(400), CullingAggressiveness::FULL, &mut sink);

        assert!(!first[0].cache_hit);
        assert!(again[0].cache_hit);
        assert!(again[0].published);
        assert_eq!(again[0].stats, first[0].stats);
        assert_eq!(p.stats().cache.hits, 1);

        // The cached layer is exactly what a fresh cull would produce.
        let selection = LodSelector::default().select(16.0, CullingAggressiveness::FULL);
        let (fresh, fresh_stats) = cull_features(&grid(1_000), &view(16.0), &selection);
        assert_eq!(sink.layer("zones").unwrap(), &fresh);
        assert_eq!(again[0].stats, fresh_stats);
    }

    #[test]
    fn data_replacement_purges_cache() {
        let mut p = pipeline();
        let id = p.register_source("zones", grid(500));
        p.set_viewport(view(16.0));
        let mut sink = RecordingSink::new();
        p.process(ms(0), CullingAggressiveness::FULL, &mut sink);

        assert!(p.replace_source_data(id, grid(10)));
        let passes = p.process(ms(200), CullingAggressiveness::FULL, &mut sink);
        assert_eq!(passes.len(), 1);
        assert!(!passes[0].cache_hit);
        assert_eq!(passes[0].stats.input, 10);
        assert!(!p.replace_source_data(SourceId(99), grid(1)));
    }

    #[test]
    fn aggressiveness_change_reculls_with_smaller_cap() {
        let mut p = pipeline();
        p.register_source("zones", grid(10_000));
        p.set_viewport(view(16.0));
        let mut sink = RecordingSink::new();
        let full = p.process(ms(0), CullingAggressiveness::FULL, &mut sink);
        let squeezed = CullingAggressiveness {
            buffer_scale: 0.5,
            feature_scale: 0.4,
        };
        let reduced = p.process(ms(200), squeezed, &mut sink);
        assert_eq!(reduced.len(), 1, "aggressiveness change triggers a pass");
        assert!(reduced[0].stats.emitted <= 200);
        assert!(reduced[0].stats.emitted < full[0].stats.emitted);
    }

    #[test]
    fn failed_publish_is_retried_next_pass() {
        let mut p = pipeline();
        p.register_source("zones", grid(100));
        p.set_viewport(view(14.0));
        let mut sink = RecordingSink::new();
        sink.fail_next("zones", 1);
        let passes = p.process(ms(0), CullingAggressiveness::FULL, &mut sink);
        assert!(!passes[0].published);
        assert!(p.has_pending());
        let retry = p.process(ms(100), CullingAggressiveness::FULL, &mut sink);
        assert!(retry[0].published);
        assert!(retry[0].cache_hit, "retry reuses the computed result");
    }

    #[test]
    fn removed_source_is_forgotten() {
        let mut p = pipeline();
        let id = p.register_source("zones", grid(100));
        assert_eq!(p.source_id("zones"), Some(id));
        assert!(p.remove_source(id));
        assert!(!p.remove_source(id));
        p.set_viewport(view(14.0));
        let mut sink = RecordingSink::new();
        assert!(p.process(ms(0), CullingAggressiveness::FULL, &mut sink).is_empty());
        assert_eq!(p.stats().sources, 0);
    }
}
