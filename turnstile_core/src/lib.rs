// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Adaptive animation scheduling and render optimization for live
//! operations maps.
//!
//! `turnstile_core` drives many concurrent route animations off one shared
//! frame clock, measures live performance, and feeds the measurement back
//! into a control loop that adjusts target frame rate, viewport culling and
//! level of detail. Every scheduled unit of work is tracked centrally so
//! nothing leaks when scenes are torn down and rebuilt. It is `no_std`
//! compatible (with `alloc`) and never renders anything itself.
//!
//! # Architecture
//!
//! ```text
//!   Backend (tick source)
//!       │
//!       ▼
//!   FrameTick ──► Engine::on_frame()
//!                   ├─► PerformanceSampler ──► AdaptiveRateController
//!                   │                            │ target fps, aggressiveness
//!                   ├─► ResourceRegistry::run_due() ◄┘
//!                   │       └─► AnimationScheduler::tick_stream() ──► LayerSink
//!                   └─► CullingPipeline::process() ─────────────────► LayerSink
//!                                                                       │
//!                 ┌─────────────────────────────────────────────────────┘
//!                 ▼
//!   FrameFeedback ──► Engine::observe()
//! ```
//!
//! **[`registry`]**: owner-keyed timeouts, intervals and frame callbacks
//! with replace-on-reuse, bulk cancellation and a central retry policy.
//!
//! **[`path`]**: routes and progress-to-position interpolation.
//!
//! **[`sampler`]**: ring buffer of frame, render and memory measurements.
//!
//! **[`rate`]**: quality ladder with cooldown and recovery hysteresis.
//!
//! **[`animation`]**: named entity streams advanced by frame tasks.
//!
//! **[`culling`]**: viewport culling ([`cull`]), LOD capping ([`lod`]) and
//! a short-lived result cache ([`cache`]), driven by intents in [`dirty`].
//!
//! **[`engine`]**: owns every component and wires them per frame.
//!
//! **[`sink`]**: the [`LayerSink`](sink::LayerSink) trait hosts implement to
//! receive feature collections.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! frame-loop instrumentation, with a zero-overhead
//! [`Tracer`](trace::Tracer) wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `serde` (disabled by default): Derives `Serialize`/`Deserialize` for
//!   configuration and feature types.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod animation;
pub mod cache;
pub mod cull;
pub mod culling;
pub mod dirty;
pub mod engine;
pub mod error;
pub mod geo;
pub mod lod;
pub mod path;
pub mod pool;
pub mod rate;
pub mod registry;
pub mod sampler;
pub mod sink;
pub mod telemetry;
pub mod time;
pub mod timing;
pub mod trace;
