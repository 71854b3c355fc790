// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Synthetic stadium: entity streams, facility features and camera moves.

use std::f64::consts::TAU;

use kurbo::Point;
use rand::Rng;
use rand::rngs::SmallRng;
use turnstile_core::animation::{EntitySpec, LoopMode};
use turnstile_core::geo::{Feature, GeoBounds, Viewport};
use turnstile_core::path::Parameterization;

/// Stadium center in `(lng, lat)`.
pub(crate) const CENTER: Point = Point::new(-0.2795, 51.5560);

/// Half-width of the venue footprint in degrees.
const RADIUS: f64 = 0.004;

fn on_ring(angle: f64, scale: f64) -> Point {
    Point::new(
        CENTER.x + RADIUS * scale * angle.cos(),
        CENTER.y + RADIUS * scale * 0.6 * angle.sin(),
    )
}

/// Walkers leaving the stands towards one of eight gates.
pub(crate) fn crowd_flow(rng: &mut SmallRng, count: usize) -> Vec<EntitySpec> {
    (0..count)
        .map(|i| {
            let angle = rng.gen_range(0.0..TAU);
            let gate = (angle / TAU * 8.0).round() / 8.0 * TAU;
            let route = vec![
                on_ring(angle, 0.35),
                on_ring(angle, 0.7),
                on_ring(gate, 1.0),
                on_ring(gate, 1.3),
            ];
            EntitySpec::new(format!("walker-{i}"), route, rng.gen_range(0.002..0.01))
                .with_tag("egress")
                .with_progress(rng.gen_range(0.0..1.0))
        })
        .collect()
}

/// Guards pacing perimeter segments back and forth.
pub(crate) fn patrols(rng: &mut SmallRng, count: usize) -> Vec<EntitySpec> {
    (0..count)
        .map(|i| {
            let start = rng.gen_range(0.0..TAU);
            let route = (0..5)
                .map(|k| on_ring(start + f64::from(k) * 0.15, 1.1))
                .collect();
            EntitySpec::new(format!("guard-{i}"), route, rng.gen_range(0.005..0.02))
                .with_mode(LoopMode::Bounce)
                .with_tag("security")
        })
        .collect()
}

/// Shuttles circling the outer ring road at constant ground speed.
pub(crate) fn shuttles(count: usize) -> Vec<EntitySpec> {
    let ring: Vec<Point> = (0..=24)
        .map(|k| on_ring(f64::from(k) / 24.0 * TAU, 1.6))
        .collect();
    (0..count)
        .map(|i| {
            let phase = i as f64 / count as f64;
            EntitySpec::new(format!("shuttle-{i}"), ring.clone(), 0.004)
                .with_tag("transit")
                .with_parameterization(Parameterization::ArcLength)
                .with_progress(phase)
        })
        .collect()
}

/// Static venue features with a randomized occupancy tag.
pub(crate) fn facilities(rng: &mut SmallRng, count: usize) -> Vec<Feature> {
    const KINDS: [&str; 4] = ["kiosk", "restroom", "first-aid", "seat-block"];
    (0..count)
        .map(|i| {
            let angle = rng.gen_range(0.0..TAU);
            let scale = rng.gen_range(0.2..1.5);
            let kind = KINDS[rng.gen_range(0..KINDS.len())];
            Feature::point(format!("{kind}-{i}"), on_ring(angle, scale), kind)
        })
        .collect()
}

/// Camera positions the demo cycles through: overview, concourse, gate.
pub(crate) fn camera_stops() -> [Viewport; 3] {
    let around = |half_width: f64, zoom: f64| Viewport {
        bounds: GeoBounds::new(
            CENTER.y + half_width * 0.6,
            CENTER.y - half_width * 0.6,
            CENTER.x + half_width,
            CENTER.x - half_width,
        ),
        zoom,
    };
    [
        around(RADIUS * 2.0, 13.5),
        around(RADIUS * 0.8, 16.2),
        around(RADIUS * 0.3, 18.4),
    ]
}
