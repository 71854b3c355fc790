// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Culling intent channels.
//!
//! External events never recompute anything directly. They mark a source's
//! key (its [`SourceId`](crate::cache::SourceId) value) dirty on one of these
//! channels of an [`understory_dirty`] tracker, and the next culling pass
//! drains them. Marking the same key twice before a drain coalesces into one
//! recomputation.
//!
//! All channels are local-only: there are no dependency edges between
//! sources.

use understory_dirty::Channel;

/// The viewport or zoom changed; every source needs a fresh pass.
pub const VIEWPORT: Channel = Channel::new(0);

/// A source's feature data was replaced; its cache entries are already purged.
pub const DATA: Channel = Channel::new(1);

/// Culling settings or aggressiveness changed; cached results may not apply.
pub const SETTINGS: Channel = Channel::new(2);
