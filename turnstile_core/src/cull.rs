// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Viewport culling and deterministic downsampling.
//!
//! [`cull_features`] keeps the features that intersect the buffered viewport,
//! then thins them with a fixed stride if they exceed the LOD cap. The output
//! is always a subset of the input in input order, so two runs over the same
//! data and viewport produce identical collections.

use alloc::vec::Vec;

use crate::geo::{Feature, FeatureCollection, Viewport};
use crate::lod::LodSelection;

/// Counts from one culling run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CullStats {
    /// Features considered.
    pub input: usize,
    /// Features intersecting the buffered viewport.
    pub visible: usize,
    /// Features emitted after downsampling.
    pub emitted: usize,
}

impl CullStats {
    /// Features dropped by either the viewport test or the cap.
    #[must_use]
    pub const fn culled(&self) -> usize {
        self.input - self.emitted
    }
}

/// Culls `features` against `viewport` under `selection`.
#[must_use]
pub fn cull_features(
    features: &[Feature],
    viewport: &Viewport,
    selection: &LodSelection,
) -> (FeatureCollection, CullStats) {
    let buffered = viewport.bounds.expanded(selection.buffer_fraction);
    let visible: Vec<&Feature> = features
        .iter()
        .filter(|f| f.geometry.intersects(buffered))
        .collect();

    let stride = downsample_stride(visible.len(), selection.max_features);
    let kept: Vec<Feature> = if stride == 0 {
        Vec::new()
    } else {
        visible.iter().step_by(stride).map(|&f| f.clone()).collect()
    };

    let stats = CullStats {
        input: features.len(),
        visible: visible.len(),
        emitted: kept.len(),
    };
    (kept.into(), stats)
}

/// Stride that brings `len` items down to at most `cap`.
///
/// Returns 1 when no thinning is needed and 0 when `cap` is 0 (emit nothing).
#[must_use]
pub fn downsample_stride(len: usize, cap: usize) -> usize {
    if cap == 0 {
        return 0;
    }
    if len <= cap { 1 } else { len.div_ceil(cap) }
}

#[cfg(test)]
mod tests {
    use alloc::format;
    use alloc::vec;

    use kurbo::Point;

    use super::*;
    use crate::geo::{GeoBounds, Geometry, rect_contains};
    use crate::lod::LodLevel;

    fn selection(cap: usize, buffer: f64) -> LodSelection {
        LodSelection {
            level: LodLevel::High,
            zoom_bucket: 16,
            max_features: cap,
            buffer_fraction: buffer,
        }
    }

    fn grid(n: usize) -> Vec<Feature> {
        (0..n)
            .map(|i| {
                let x = (i % 100) as f64 / 100.0;
                let y = (i / 100) as f64 / 100.0;
                Feature::point(format!("f{i}"), Point::new(x, y), "grid")
            })
            .collect()
    }

    #[test]
    fn stride_keeps_count_under_cap() {
        for len in [0, 1, 499, 500, 501, 999, 1000, 1001, 5000] {
            let stride = downsample_stride(len, 500);
            assert!(len.div_ceil(stride) <= 500, "len {len} stride {stride}");
        }
        assert_eq!(downsample_stride(10, 0), 0);
        assert_eq!(downsample_stride(10, 20), 1);
    }

    #[test]
    fn result_is_a_subset_inside_the_buffer() {
        let features = grid(10_000);
        let viewport = Viewport {
            bounds: GeoBounds::new(0.5, 0.3, 0.5, 0.3),
            zoom: 16.0,
        };
        let sel = selection(100, 0.1);
        let (out, stats) = cull_features(&features, &viewport, &sel);

        assert!(out.len() <= 100);
        assert_eq!(stats.emitted, out.len());
        assert_eq!(stats.culled(), stats.input - out.len());
        let buffered = viewport.bounds.expanded(0.1);
        for f in &out.features {
            assert!(features.contains(f), "culled set is a subset");
            let Geometry::Point(p) = f.geometry else {
                panic!("grid only holds points");
            };
            assert!(rect_contains(buffered, p));
        }
    }

    #[test]
    fn downsampling_is_deterministic() {
        let features = grid(3_000);
        let viewport = Viewport {
            bounds: GeoBounds::new(1.0, 0.0, 1.0, 0.0),
            zoom: 16.0,
        };
        let sel = selection(50, 0.0);
        let (a, _) = cull_features(&features, &viewport, &sel);
        let (b, _) = cull_features(&features, &viewport, &sel);
        assert_eq!(a, b);
        assert_eq!(a.features[0].id, "f0", "stride starts at the first visible feature");
    }

    #[test]
    fn nothing_visible_yields_empty_collection() {
        let features = vec![Feature::point("far", Point::new(50.0, 50.0), "x")];
        let viewport = Viewport {
            bounds: GeoBounds::new(1.0, 0.0, 1.0, 0.0),
            zoom: 12.0,
        };
        let (out, stats) = cull_features(&features, &viewport, &selection(10, 0.2));
        assert!(out.is_empty());
        assert_eq!((stats.input, stats.visible, stats.emitted), (1, 0, 0));
    }
}
