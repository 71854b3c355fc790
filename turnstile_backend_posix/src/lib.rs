// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! POSIX host glue for turnstile.
//!
//! This crate provides the platform half of the host contract described in
//! [`turnstile_core::sink`]:
//!
//! - [`now`]: `CLOCK_MONOTONIC` host time
//! - [`ProcMemoryProbe`]: resident memory from `/proc/self/status`
//! - [`FramePacer`]: a fixed-rate tick source for headless runs

mod memory;
mod pacer;
mod time;

pub use memory::{ProcMemoryProbe, parse_vm_rss_kb};
pub use pacer::FramePacer;
pub use time::now;
