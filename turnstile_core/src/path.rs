// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Route polylines and progress → position interpolation.
//!
//! Two parameterizations are offered:
//!
//! - [`position_at`] treats every segment as an equal share of progress,
//!   regardless of its length. A route with 4 segments spends `t ∈ [0, 0.25)`
//!   on the first one even if it is ten times longer than the others. This is
//!   what the animation streams use by default.
//! - [`position_at_distance`] maps progress onto travelled distance using the
//!   cumulative segment lengths precomputed by [`Route::new`], so markers move
//!   at constant ground speed.
//!
//! Both clamp: `t <= 0` (or NaN) yields the first point, `t >= 1` the last
//! point exactly.

use alloc::vec::Vec;

use kurbo::Point;
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::error::RouteError;

/// How entity progress maps onto a route.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parameterization {
    /// Equal progress per segment.
    #[default]
    Uniform,
    /// Equal progress per unit of distance.
    ArcLength,
}

/// An immutable polyline with at least two finite points.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    points: Vec<Point>,
    /// `cumulative[i]` is the distance from the start to `points[i]`.
    cumulative: Vec<f64>,
}

impl Route {
    /// Validates `points` and precomputes cumulative segment lengths.
    pub fn new(points: Vec<Point>) -> Result<Self, RouteError> {
        if points.len() < 2 {
            return Err(RouteError::TooShort(points.len()));
        }
        if let Some(index) = points.iter().position(|p| !p.is_finite()) {
            return Err(RouteError::NonFinite { index });
        }

        let mut cumulative = Vec::with_capacity(points.len());
        let mut travelled = 0.0;
        cumulative.push(0.0);
        for pair in points.windows(2) {
            travelled += pair[0].distance(pair[1]);
            cumulative.push(travelled);
        }

        Ok(Self { points, cumulative })
    }

    /// The route's vertices.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Number of segments (always at least 1).
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.points.len() - 1
    }

    /// Total polyline length in coordinate units.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.cumulative.last().copied().unwrap_or(0.0)
    }

    /// First vertex.
    #[must_use]
    pub fn first(&self) -> Point {
        self.points[0]
    }

    /// Last vertex.
    #[must_use]
    pub fn last(&self) -> Point {
        self.points[self.points.len() - 1]
    }

    /// Interpolates using the given parameterization.
    #[must_use]
    pub fn position(&self, t: f64, parameterization: Parameterization) -> Point {
        match parameterization {
            Parameterization::Uniform => position_at(self, t),
            Parameterization::ArcLength => position_at_distance(self, t),
        }
    }
}

/// Position at progress `t` with equal progress per segment.
///
/// Segment index is `floor(t * n)` clamped to `[0, n - 1]` for `n` segments;
/// the remainder, scaled back into `[0, 1]`, is the fraction along that
/// segment.
#[must_use]
pub fn position_at(route: &Route, t: f64) -> Point {
    if t.is_nan() || t <= 0.0 {
        return route.first();
    }
    if t >= 1.0 {
        return route.last();
    }

    let n = route.segment_count();
    let scaled = t * n as f64;
    #[expect(
        clippy::cast_possible_truncation,
        reason = "scaled is in (0, n) so its floor fits in usize"
    )]
    let index = (scaled.floor() as usize).min(n - 1);
    let local = (scaled - index as f64).clamp(0.0, 1.0);

    route.points[index].lerp(route.points[index + 1], local)
}

/// Position at progress `t` measured along the route's length.
///
/// Degenerate routes whose points all coincide fall back to [`position_at`].
#[must_use]
pub fn position_at_distance(route: &Route, t: f64) -> Point {
    if t.is_nan() || t <= 0.0 {
        return route.first();
    }
    if t >= 1.0 {
        return route.last();
    }

    let total = route.length();
    if total <= 0.0 {
        return position_at(route, t);
    }

    let target = t * total;
    // First vertex strictly beyond the target distance; the segment ends there.
    let end = route
        .cumulative
        .partition_point(|&d| d <= target)
        .clamp(1, route.points.len() - 1);
    let start = end - 1;
    let span = route.cumulative[end] - route.cumulative[start];
    let local = if span > 0.0 {
        ((target - route.cumulative[start]) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };

    route.points[start].lerp(route.points[end], local)
}
