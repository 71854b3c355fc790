// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bounded free-list of reusable buffers.
//!
//! Each animation stream builds a fresh [`FeatureCollection`] every accepted
//! tick. Instead of allocating one per tick, buffers are acquired from a
//! [`Pool`] and released once published. The pool keeps at most `capacity`
//! idle values; releases beyond that are dropped, so a burst of streams cannot
//! grow the pool without bound.
//!
//! [`FeatureCollection`]: crate::geo::FeatureCollection

use alloc::vec::Vec;

use crate::geo::FeatureCollection;

/// A value that can be returned to a [`Pool`] and handed out again.
pub trait Recycle: Default {
    /// Clears the value's contents, keeping any allocation.
    fn recycle(&mut self);
}

impl Recycle for FeatureCollection {
    fn recycle(&mut self) {
        self.clear();
    }
}

impl<T> Recycle for Vec<T> {
    fn recycle(&mut self) {
        self.clear();
    }
}

/// Pool statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Values currently idle in the free list.
    pub idle: usize,
    /// Acquisitions served from the free list.
    pub reused: u64,
    /// Acquisitions that had to allocate.
    pub allocated: u64,
    /// Releases dropped because the free list was full.
    pub discarded: u64,
}

/// A typed free list with a capacity cap.
#[derive(Debug)]
pub struct Pool<T> {
    free: Vec<T>,
    capacity: usize,
    stats: PoolStats,
}

impl<T: Recycle> Pool<T> {
    /// Creates an empty pool that retains at most `capacity` idle values.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            capacity,
            stats: PoolStats::default(),
        }
    }

    /// Takes an empty value from the free list, or creates one.
    pub fn acquire(&mut self) -> T {
        if let Some(value) = self.free.pop() {
            self.stats.reused += 1;
            value
        } else {
            self.stats.allocated += 1;
            T::default()
        }
    }

    /// Returns a value to the pool. It is recycled before being stored.
    pub fn release(&mut self, mut value: T) {
        if self.free.len() >= self.capacity {
            self.stats.discarded += 1;
            return;
        }
        value.recycle();
        self.free.push(value);
    }

    /// Drops every idle value.
    pub fn shrink(&mut self) {
        self.free.clear();
        self.free.shrink_to_fit();
    }

    /// Returns current statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.free.len(),
            ..self.stats
        }
    }
}
