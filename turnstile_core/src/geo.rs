// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geographic primitives: bounds, viewport state and feature collections.
//!
//! Coordinates are `kurbo::Point`s with `x` = longitude and `y` = latitude, so
//! the map's bounding boxes are plain [`Rect`]s with `x0 = west`,
//! `x1 = east`, `y0 = south`, `y1 = north`. All containment tests here are
//! edge-inclusive: a feature touching the viewport border counts as visible.

use alloc::string::String;
use alloc::vec::Vec;

use kurbo::{Point, Rect};

/// Visible map region as reported by the external map view.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoBounds {
    /// Northern latitude.
    pub north: f64,
    /// Southern latitude.
    pub south: f64,
    /// Eastern longitude.
    pub east: f64,
    /// Western longitude.
    pub west: f64,
}

impl GeoBounds {
    /// Creates bounds from the four edges.
    #[must_use]
    pub const fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Converts to a normalized rectangle in `(lng, lat)` space.
    #[must_use]
    pub fn to_rect(self) -> Rect {
        Rect::new(self.west, self.south, self.east, self.north).abs()
    }

    /// Returns bounds grown by `fraction` of their width and height on every
    /// side. A fraction of `0.25` turns a 1°×1° box into 1.5°×1.5°.
    #[must_use]
    pub fn expanded(self, fraction: f64) -> Rect {
        let rect = self.to_rect();
        let fraction = fraction.max(0.0);
        rect.inflate(rect.width() * fraction, rect.height() * fraction)
    }

    /// Whether all four edges are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.north.is_finite()
            && self.south.is_finite()
            && self.east.is_finite()
            && self.west.is_finite()
    }
}

/// Camera state pushed on every move or zoom end.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Viewport {
    /// Visible region.
    pub bounds: GeoBounds,
    /// Web-map zoom level (0 = whole world).
    pub zoom: f64,
}

/// Edge-inclusive point-in-rectangle test.
#[must_use]
pub fn rect_contains(rect: Rect, p: Point) -> bool {
    p.x >= rect.x0 && p.x <= rect.x1 && p.y >= rect.y0 && p.y <= rect.y1
}

/// Edge-inclusive rectangle overlap test.
#[must_use]
pub fn rects_overlap(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// Feature geometry, following the GeoJSON shapes the map layers accept.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Geometry {
    /// A single position.
    Point(Point),
    /// An open polyline.
    LineString(Vec<Point>),
    /// A closed polygon given by its exterior ring.
    Polygon(Vec<Point>),
}

impl Geometry {
    /// Axis-aligned bounding box, or `None` for an empty line or ring.
    #[must_use]
    pub fn bounding_box(&self) -> Option<Rect> {
        match self {
            Self::Point(p) => Some(Rect::from_points(*p, *p)),
            Self::LineString(points) | Self::Polygon(points) => {
                let (first, rest) = points.split_first()?;
                Some(
                    rest.iter()
                        .fold(Rect::from_points(*first, *first), |r, p| r.union_pt(*p)),
                )
            }
        }
    }

    /// Conservative visibility test against `bounds`.
    ///
    /// Points use exact containment. Lines and polygons use bounding-box
    /// overlap, which may admit a shape whose box clips a corner of the
    /// viewport while the shape itself does not. It never rejects a shape that
    /// does intersect.
    #[must_use]
    pub fn intersects(&self, bounds: Rect) -> bool {
        match self {
            Self::Point(p) => rect_contains(bounds, *p),
            _ => self
                .bounding_box()
                .is_some_and(|bbox| rects_overlap(bbox, bounds)),
        }
    }
}

/// Per-feature attributes carried through to the map layer.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureProperties {
    /// Stream-specific category (e.g. `"gate-7"`, `"north-loop"`).
    pub tag: String,
    /// Route progress for animated markers.
    pub progress: Option<f64>,
}

/// One renderable feature.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Feature {
    /// Identifier, unique within its source.
    pub id: String,
    /// Geometry in `(lng, lat)` coordinates.
    pub geometry: Geometry,
    /// Attributes.
    pub properties: FeatureProperties,
}

impl Feature {
    /// Creates a point feature with a tag and no progress.
    #[must_use]
    pub fn point(id: impl Into<String>, position: Point, tag: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            geometry: Geometry::Point(position),
            properties: FeatureProperties {
                tag: tag.into(),
                progress: None,
            },
        }
    }
}

/// The unit of data handed to the layer sink.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FeatureCollection {
    /// Features in publish order.
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// An empty collection, used to clear a layer.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            features: Vec::new(),
        }
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the collection holds no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Clears the collection, keeping its allocation.
    pub fn clear(&mut self) {
        self.features.clear();
    }
}

impl From<Vec<Feature>> for FeatureCollection {
    fn from(features: Vec<Feature>) -> Self {
        Self { features }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    fn unit_box() -> Rect {
        GeoBounds::new(1.0, 0.0, 1.0, 0.0).to_rect()
    }

    #[test]
    fn bounds_normalize_to_rect() {
        let r = GeoBounds::new(10.0, 20.0, -5.0, 5.0).to_rect();
        assert_eq!(r, Rect::new(-5.0, 10.0, 5.0, 20.0), "swapped edges normalize");
    }

    #[test]
    fn expansion_grows_each_side() {
        let r = GeoBounds::new(1.0, 0.0, 1.0, 0.0).expanded(0.25);
        assert_eq!(r, Rect::new(-0.25, -0.25, 1.25, 1.25));
        let same = GeoBounds::new(1.0, 0.0, 1.0, 0.0).expanded(-1.0);
        assert_eq!(same, unit_box(), "negative fraction is ignored");
    }

    #[test]
    fn containment_is_edge_inclusive() {
        let r = unit_box();
        assert!(rect_contains(r, Point::new(1.0, 1.0)));
        assert!(rect_contains(r, Point::new(0.0, 0.5)));
        assert!(!rect_contains(r, Point::new(1.0001, 0.5)));
        assert!(rects_overlap(r, Rect::new(1.0, 1.0, 2.0, 2.0)), "corner touch");
        assert!(!rects_overlap(r, Rect::new(1.5, 0.0, 2.0, 1.0)));
    }

    #[test]
    fn line_crossing_viewport_is_visible() {
        // Both endpoints outside, the segment crosses the box.
        let line = Geometry::LineString(vec![Point::new(-1.0, 0.5), Point::new(2.0, 0.5)]);
        assert!(line.intersects(unit_box()));

        let far = Geometry::Polygon(vec![
            Point::new(5.0, 5.0),
            Point::new(6.0, 5.0),
            Point::new(6.0, 6.0),
        ]);
        assert!(!far.intersects(unit_box()));
        assert_eq!(Geometry::LineString(vec![]).bounding_box(), None);
        assert!(!Geometry::Polygon(vec![]).intersects(unit_box()));
    }
}
