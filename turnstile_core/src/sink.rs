// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host contract for platform integrations.
//!
//! The engine never renders anything itself. A host provides:
//!
//! - **Tick source**: produces [`FrameTick`] values from a platform mechanism
//!   (a display link, `requestAnimationFrame`, a fixed-rate pacer). Not
//!   abstracted by a trait because setup and lifecycle differ per platform.
//!
//! - **Time**: a `now() -> HostTime` function reading the monotonic clock.
//!
//! - **Memory probe**: a [`MemoryProbe`] that reports resident memory, or
//!   `None` where the platform cannot introspect.
//!
//! - **Layer sink**: implements [`LayerSink`] to push feature collections into
//!   the map's named layer sources.
//!
//! [`FrameTick`]: crate::timing::FrameTick
//! [`MemoryProbe`]: crate::sampler::MemoryProbe

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::SinkError;
use crate::geo::FeatureCollection;

/// Receives published feature collections for named map layer sources.
///
/// Called at most once per accepted animation tick per stream and once per
/// culling pass per source.
///
/// # Frame loop pseudocode
///
/// ```rust,ignore
/// fn on_frame(tick: FrameTick) {
///     let build_start = now();
///     // Animation streams and culling passes publish through the sink.
///     engine.on_frame(&tick, &mut tracer);
///     // Report render cost so the sampler sees it.
///     engine.observe(&FrameFeedback { build_start, submitted_at: now() });
/// }
/// ```
pub trait LayerSink {
    /// Replaces the data of layer source `source` with `collection`.
    fn set_layer_data(
        &mut self,
        source: &str,
        collection: &FeatureCollection,
    ) -> Result<(), SinkError>;
}

/// One call received by a [`RecordingSink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publish {
    /// Layer source name.
    pub source: String,
    /// Number of features published.
    pub features: usize,
}

/// In-memory sink for tests and headless runs.
///
/// Keeps the latest collection per source and a log of every accepted
/// publish. Failures can be injected per source.
#[derive(Debug, Default)]
pub struct RecordingSink {
    layers: BTreeMap<String, FeatureCollection>,
    log: Vec<Publish>,
    failures: BTreeMap<String, u32>,
    known: Option<BTreeSet<String>>,
}

impl RecordingSink {
    /// A sink that accepts any source name.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects sources not in `names` with
    /// [`SinkError::UnknownSource`].
    #[must_use]
    pub fn with_sources<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            known: Some(names.into_iter().map(ToString::to_string).collect()),
            ..Self::default()
        }
    }

    /// Makes the next `count` publishes to `source` fail.
    pub fn fail_next(&mut self, source: &str, count: u32) {
        self.failures.insert(source.to_string(), count);
    }

    /// Latest collection published to `source`.
    #[must_use]
    pub fn layer(&self, source: &str) -> Option<&FeatureCollection> {
        self.layers.get(source)
    }

    /// Every accepted publish, oldest first.
    #[must_use]
    pub fn log(&self) -> &[Publish] {
        &self.log
    }

    /// Number of accepted publishes to `source`.
    #[must_use]
    pub fn publish_count(&self, source: &str) -> usize {
        self.log.iter().filter(|p| p.source == source).count()
    }

    /// Forgets the publish log, keeping layer contents.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }
}

impl LayerSink for RecordingSink {
    fn set_layer_data(
        &mut self,
        source: &str,
        collection: &FeatureCollection,
    ) -> Result<(), SinkError> {
        if let Some(known) = &self.known
            && !known.contains(source)
        {
            return Err(SinkError::UnknownSource(source.to_string()));
        }
        if let Some(remaining) = self.failures.get_mut(source)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(SinkError::Rejected {
                source_id: source.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        self.layers.insert(source.to_string(), collection.clone());
        self.log.push(Publish {
            source: source.to_string(),
            features: collection.len(),
        });
        Ok(())
    }
}
