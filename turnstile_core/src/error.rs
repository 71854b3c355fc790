// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types shared across the engine.
//!
//! None of these cross the scheduling boundary as panics. Invalid input is
//! rejected where it enters (route and entity validation), task failures are
//! returned to the [`ResourceRegistry`](crate::registry::ResourceRegistry)
//! which owns the retry policy, and cache staleness is never an error at all.

use alloc::string::String;

use thiserror::Error;

/// A route that cannot be animated.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RouteError {
    /// Fewer than two points were supplied.
    #[error("route needs at least 2 points, got {0}")]
    TooShort(usize),
    /// A coordinate was NaN or infinite.
    #[error("route point {index} is not finite")]
    NonFinite {
        /// Index of the offending point.
        index: usize,
    },
}

/// An entity record rejected at stream start.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum EntityError {
    /// The entity's route is malformed.
    #[error("entity {id}: {source}")]
    Route {
        /// Entity id from the simulator.
        id: String,
        /// Underlying route problem.
        source: RouteError,
    },
    /// Speed must be finite and within `[0, 1]` progress units per tick.
    #[error("entity {id}: speed {speed} is outside [0, 1]")]
    Speed {
        /// Entity id from the simulator.
        id: String,
        /// The rejected speed.
        speed: f64,
    },
    /// Initial progress must be finite and within `[0, 1]`.
    #[error("entity {id}: initial progress {progress} is outside [0, 1]")]
    Progress {
        /// Entity id from the simulator.
        id: String,
        /// The rejected progress value.
        progress: f64,
    },
    /// Two records in one stream share an id.
    #[error("entity {0} appears more than once in the stream")]
    Duplicate(String),
}

/// A publish rejected by the external map layer.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The map has no layer source with this name (yet).
    #[error("unknown layer source {0}")]
    UnknownSource(String),
    /// The rendering layer refused the data for another reason.
    #[error("layer source {source_id} rejected data: {reason}")]
    Rejected {
        /// Layer source that rejected the data.
        source_id: String,
        /// Reason reported by the renderer.
        reason: String,
    },
}

/// Why a scheduled callback failed.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TaskError {
    /// Publishing to the layer sink failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
    /// Interpolation produced a non-finite coordinate.
    #[error("entity {0} produced a non-finite position")]
    NonFinitePosition(String),
    /// The callback refers to state that no longer exists.
    #[error("owner {0} is no longer registered")]
    MissingOwner(String),
    /// Free-form failure reported by a caller-supplied callback.
    #[error("{0}")]
    Callback(String),
}

/// Configuration that would break an invariant.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// LOD zoom thresholds must strictly increase with detail.
    #[error("LOD thresholds must strictly increase ({lower} then {upper})")]
    LodThresholds {
        /// The earlier (less detailed) threshold.
        lower: f64,
        /// The later (more detailed) threshold that failed to exceed it.
        upper: f64,
    },
    /// The quality level table is empty or not sorted by fps.
    #[error("quality levels must be non-empty and strictly increasing in fps")]
    QualityLevels,
    /// A scale factor fell outside `(0, 1]`.
    #[error("{name} must be within (0, 1], got {value}")]
    Scale {
        /// Name of the offending field.
        name: &'static str,
        /// The rejected value.
        value: f64,
    },
    /// A window or capacity was zero or too large.
    #[error("{name} must be within 1..={max}, got {value}")]
    Capacity {
        /// Name of the offending field.
        name: &'static str,
        /// The rejected value.
        value: usize,
        /// Largest accepted value.
        max: usize,
    },
}
