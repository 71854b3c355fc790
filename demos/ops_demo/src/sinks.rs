// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer and trace sinks used by the demo loop.

use std::collections::BTreeMap;

use turnstile_core::error::SinkError;
use turnstile_core::geo::FeatureCollection;
use turnstile_core::sink::LayerSink;
use turnstile_core::trace::{
    CullPassEvent, FrameSummary, FrameTickEvent, QualityChangeEvent, RenderFeedbackEvent,
    StreamPublishEvent, TaskFailureEvent, TraceSink,
};
use turnstile_debug::chrome::ChromeTraceSink;
use turnstile_debug::pretty::PrettyPrintSink;

/// Stand-in for the map: remembers the latest feature count per layer.
#[derive(Debug, Default)]
pub(crate) struct ConsoleSink {
    layers: BTreeMap<String, usize>,
    reject: BTreeMap<String, u32>,
    publishes: u64,
}

impl ConsoleSink {
    /// Makes the next `count` publishes to `source` fail.
    pub(crate) fn reject_next(&mut self, source: &str, count: u32) {
        self.reject.insert(source.to_owned(), count);
    }

    /// Features currently shown across all layers.
    pub(crate) fn total_features(&self) -> usize {
        self.layers.values().sum()
    }

    pub(crate) fn publishes(&self) -> u64 {
        self.publishes
    }

    pub(crate) fn layers(&self) -> impl Iterator<Item = (&str, usize)> {
        self.layers.iter().map(|(name, count)| (name.as_str(), *count))
    }
}

impl LayerSink for ConsoleSink {
    fn set_layer_data(
        &mut self,
        source: &str,
        collection: &FeatureCollection,
    ) -> Result<(), SinkError> {
        if let Some(remaining) = self.reject.get_mut(source)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(SinkError::Rejected {
                source_id: source.to_owned(),
                reason: "layer is reloading".into(),
            });
        }
        tracing::trace!(source, features = collection.len(), "layer updated");
        self.layers.insert(source.to_owned(), collection.len());
        self.publishes += 1;
        Ok(())
    }
}

/// Forwards every event to the enabled diagnostic sinks.
#[derive(Debug, Default)]
pub(crate) struct Fanout {
    pub(crate) pretty: Option<PrettyPrintSink>,
    pub(crate) chrome: Option<ChromeTraceSink>,
}

macro_rules! forward {
    ($self:ident, $method:ident, $event:expr) => {
        if let Some(pretty) = &mut $self.pretty {
            pretty.$method($event);
        }
        if let Some(chrome) = &mut $self.chrome {
            chrome.$method($event);
        }
    };
}

impl TraceSink for Fanout {
    fn on_frame_tick(&mut self, e: &FrameTickEvent) {
        forward!(self, on_frame_tick, e);
    }

    fn on_quality_change(&mut self, e: &QualityChangeEvent) {
        forward!(self, on_quality_change, e);
    }

    fn on_stream_publish(&mut self, e: &StreamPublishEvent<'_>) {
        forward!(self, on_stream_publish, e);
    }

    fn on_cull_pass(&mut self, e: &CullPassEvent<'_>) {
        forward!(self, on_cull_pass, e);
    }

    fn on_task_failure(&mut self, e: &TaskFailureEvent<'_>) {
        forward!(self, on_task_failure, e);
    }

    fn on_render_feedback(&mut self, e: &RenderFeedbackEvent) {
        forward!(self, on_render_feedback, e);
    }

    fn on_frame_summary(&mut self, s: &FrameSummary) {
        forward!(self, on_frame_summary, s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_then_accepts() {
        let mut sink = ConsoleSink::default();
        sink.reject_next("shuttle", 1);
        let empty = FeatureCollection::empty();
        assert!(sink.set_layer_data("shuttle", &empty).is_err());
        assert!(sink.set_layer_data("shuttle", &empty).is_ok());
        assert_eq!(sink.publishes(), 1);
        assert_eq!(sink.total_features(), 0);
    }
}
