// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Short-lived cache of culled feature sets.
//!
//! Entries are keyed by [`CacheKey`] `(source, lod, zoom_bucket)`. Because two
//! different viewports can share a key, each [`FeatureRecord`] also carries a
//! [`ViewFingerprint`] of the exact bounds and culling scales it was computed
//! for. A lookup with a different fingerprint is treated like an expired entry:
//! the record is dropped and the caller recomputes. A hit therefore always
//! returns exactly what a fresh run would produce.
//!
//! Records expire [`CacheConfig::ttl`] after creation. Each source keeps at
//! most [`CacheConfig::per_source_limit`] records; the least recently used is
//! evicted first. Mutating a source's data purges all of its records.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;

use log::debug;

use crate::cull::CullStats;
use crate::error::ConfigError;
use crate::geo::{FeatureCollection, Viewport};
use crate::lod::LodLevel;
use crate::rate::CullingAggressiveness;
use crate::time::{Duration, HostTime};

/// Identifier of a registered feature source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SourceId(pub u32);

/// Structured cache key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheKey {
    /// Feature source.
    pub source: SourceId,
    /// Detail bucket.
    pub lod: LodLevel,
    /// Integer zoom.
    pub zoom_bucket: u8,
}

/// Bit-exact identity of the inputs a record was computed from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ViewFingerprint([u64; 6]);

impl ViewFingerprint {
    /// Fingerprints the viewport bounds and culling scales.
    #[must_use]
    pub fn new(viewport: &Viewport, aggressiveness: CullingAggressiveness) -> Self {
        let b = viewport.bounds;
        Self([
            b.north.to_bits(),
            b.south.to_bits(),
            b.east.to_bits(),
            b.west.to_bits(),
            aggressiveness.buffer_scale.to_bits(),
            aggressiveness.feature_scale.to_bits(),
        ])
    }
}

/// A cached culling result.
#[derive(Clone, Debug)]
pub struct FeatureRecord {
    /// The culled collection, shared with whoever published it.
    pub features: Rc<FeatureCollection>,
    /// Counts from the run that produced it.
    pub stats: CullStats,
    /// Creation time; the TTL runs from here.
    pub created: HostTime,
    /// Last hit, for LRU eviction.
    pub last_used: HostTime,
    /// Inputs the record is valid for.
    pub fingerprint: ViewFingerprint,
}

/// Cache tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CacheConfig {
    /// Maximum record age.
    pub ttl: Duration,
    /// Records retained per source.
    pub per_source_limit: usize,
}

impl CacheConfig {
    /// Five-second TTL, eight records per source.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            per_source_limit: 8,
        }
    }

    /// Checks the per-source limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const MAX: usize = 1024;
        if self.per_source_limit == 0 || self.per_source_limit > MAX {
            return Err(ConfigError::Capacity {
                name: "per_source_limit",
                value: self.per_source_limit,
                max: MAX,
            });
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Cache counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Live records.
    pub entries: usize,
    /// Lookups served from cache.
    pub hits: u64,
    /// Lookups that found nothing usable.
    pub misses: u64,
    /// Records dropped for age or fingerprint mismatch.
    pub stale: u64,
    /// Records dropped by the per-source limit.
    pub evictions: u64,
}

/// TTL + per-source LRU cache of culled collections.
#[derive(Debug, Default)]
pub struct FeatureCache {
    config: CacheConfig,
    entries: BTreeMap<CacheKey, FeatureRecord>,
    stats: CacheStats,
}

impl FeatureCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Looks up `key`, returning the record only if it is fresh and was
    /// computed for `fingerprint`.
    pub fn get(
        &mut self,
        key: &CacheKey,
        fingerprint: ViewFingerprint,
        now: HostTime,
    ) -> Option<&FeatureRecord> {
        let usable = match self.entries.get(key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(record) => !self.is_expired(record, now) && record.fingerprint == fingerprint,
        };

        if !usable {
            self.entries.remove(key);
            self.stats.stale += 1;
            self.stats.misses += 1;
            return None;
        }

        self.stats.hits += 1;
        let record = self.entries.get_mut(key)?;
        record.last_used = now;
        Some(record)
    }

    /// Stores a result, evicting the source's least recently used records
    /// beyond the per-source limit.
    pub fn insert(
        &mut self,
        key: CacheKey,
        features: Rc<FeatureCollection>,
        stats: CullStats,
        fingerprint: ViewFingerprint,
        now: HostTime,
    ) {
        self.entries.insert(
            key,
            FeatureRecord {
                features,
                stats,
                created: now,
                last_used: now,
                fingerprint,
            },
        );

        loop {
            let mut count = 0_usize;
            let mut oldest: Option<(CacheKey, HostTime)> = None;
            for (k, record) in self.entries.iter().filter(|(k, _)| k.source == key.source) {
                count += 1;
                if oldest.is_none_or(|(_, used)| record.last_used < used) {
                    oldest = Some((*k, record.last_used));
                }
            }
            if count <= self.config.per_source_limit {
                break;
            }
            let Some((victim, _)) = oldest else { break };
            self.entries.remove(&victim);
            self.stats.evictions += 1;
        }
    }

    /// Drops every record of `source`. Returns the number removed.
    pub fn purge_source(&mut self, source: SourceId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| k.source != source);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("purged {removed} cached results for {source:?}");
        }
        removed
    }

    /// Drops every expired record. Returns the number removed.
    pub fn purge_expired(&mut self, now: HostTime) -> usize {
        let before = self.entries.len();
        let ttl = self.config.ttl;
        self.entries
            .retain(|_, r| now.saturating_duration_since(r.created) <= ttl);
        let removed = before - self.entries.len();
        self.stats.stale += removed as u64;
        removed
    }

    /// Drops everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of live records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }

    fn is_expired(&self, record: &FeatureRecord, now: HostTime) -> bool {
        now.saturating_duration_since(record.created) > self.config.ttl
    }
}

#[cfg(test)]
mod tests {
    use kurbo::Point;

    use super::*;
    use crate::geo::{Feature, GeoBounds};

    fn key(source: u32, zoom_bucket: u8) -> CacheKey {
        CacheKey {
            source: SourceId(source),
            lod: LodLevel::High,
            zoom_bucket,
        }
    }

    fn viewport() -> Viewport {
        Viewport {
            bounds: GeoBounds::new(1.0, 0.0, 1.0, 0.0),
            zoom: 16.0,
        }
    }

    fn fp() -> ViewFingerprint {
        ViewFingerprint::new(&viewport(), CullingAggressiveness::FULL)
    }

    fn collection() -> Rc<FeatureCollection> {
        Rc::new(FeatureCollection::from(alloc::vec![Feature::point(
            "a",
            Point::new(0.5, 0.5),
            "t"
        )]))
    }

    fn ms(v: u64) -> HostTime {
        HostTime::from_millis(v)
    }

    #[test]
    fn hit_within_ttl_returns_same_collection() {
        let mut cache = FeatureCache::default();
        let data = collection();
        cache.insert(key(1, 16), Rc::clone(&data), CullStats::default(), fp(), ms(0));

        let record = cache.get(&key(1, 16), fp(), ms(4_000)).unwrap();
        assert!(Rc::ptr_eq(&record.features, &data));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let mut cache = FeatureCache::default();
        cache.insert(key(1, 16), collection(), CullStats::default(), fp(), ms(0));
        assert!(cache.get(&key(1, 16), fp(), ms(5_001)).is_none());
        let stats = cache.stats();
        assert_eq!((stats.misses, stats.stale, stats.entries), (1, 1, 0));
    }

    #[test]
    fn different_viewport_is_a_miss() {
        let mut cache = FeatureCache::default();
        cache.insert(key(1, 16), collection(), CullStats::default(), fp(), ms(0));
        let mut moved = viewport();
        moved.bounds.north = 1.5;
        let other = ViewFingerprint::new(&moved, CullingAggressiveness::FULL);
        assert!(cache.get(&key(1, 16), other, ms(10)).is_none());
        assert!(cache.is_empty(), "mismatched record is dropped");
    }

    #[test]
    fn per_source_limit_evicts_least_recently_used() {
        let mut cache = FeatureCache::new(CacheConfig {
            per_source_limit: 2,
            ..CacheConfig::standard()
        });
        cache.insert(key(1, 10), collection(), CullStats::default(), fp(), ms(0));
        cache.insert(key(1, 11), collection(), CullStats::default(), fp(), ms(1));
        // Touch zoom 10 so zoom 11 becomes the LRU.
        assert!(cache.get(&key(1, 10), fp(), ms(2)).is_some());
        cache.insert(key(1, 12), collection(), CullStats::default(), fp(), ms(3));
        // Another source does not count against source 1.
        cache.insert(key(2, 10), collection(), CullStats::default(), fp(), ms(4));

        assert_eq!(cache.len(), 3);
        assert!(cache.get(&key(1, 11), fp(), ms(5)).is_none());
        assert!(cache.get(&key(1, 10), fp(), ms(5)).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn purge_source_and_expired() {
        let mut cache = FeatureCache::default();
        cache.insert(key(1, 10), collection(), CullStats::default(), fp(), ms(0));
        cache.insert(key(1, 11), collection(), CullStats::default(), fp(), ms(0));
        cache.insert(key(2, 10), collection(), CullStats::default(), fp(), ms(4_000));
        assert_eq!(cache.purge_source(SourceId(1)), 2);
        assert_eq!(cache.purge_source(SourceId(1)), 0);
        assert_eq!(cache.purge_expired(ms(8_000)), 0);
        assert_eq!(cache.purge_expired(ms(9_001)), 1);
        assert!(cache.is_empty());
    }
}
