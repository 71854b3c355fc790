// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Resident memory from procfs.

use std::fs;
use std::path::PathBuf;

use log::debug;
use turnstile_core::sampler::MemoryProbe;

const KIB_PER_MIB: f64 = 1024.0;

/// Reads `VmRSS` from `/proc/self/status`.
///
/// Reports `None` where procfs is unavailable, so the sampler treats memory
/// as unknown instead of failing.
#[derive(Clone, Debug)]
pub struct ProcMemoryProbe {
    path: PathBuf,
    warned: bool,
}

impl Default for ProcMemoryProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcMemoryProbe {
    /// Probe for the current process.
    #[must_use]
    pub fn new() -> Self {
        Self::with_path("/proc/self/status")
    }

    /// Probe reading a status file at `path`.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            warned: false,
        }
    }
}

impl MemoryProbe for ProcMemoryProbe {
    fn resident_mb(&mut self) -> Option<f64> {
        let status = match fs::read_to_string(&self.path) {
            Ok(status) => status,
            Err(err) => {
                if !self.warned {
                    self.warned = true;
                    debug!("memory probe disabled, {}: {err}", self.path.display());
                }
                return None;
            }
        };
        let kib = parse_vm_rss_kb(&status)?;
        Some(kib as f64 / KIB_PER_MIB)
    }
}

/// Extracts the `VmRSS` value, in KiB, from a `/proc/<pid>/status` dump.
#[must_use]
pub fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let mut fields = line["VmRSS:".len()..].split_whitespace();
    let value = fields.next()?.parse().ok()?;
    match fields.next() {
        Some("kB") | None => Some(value),
        Some(_) => None,
    }
}
