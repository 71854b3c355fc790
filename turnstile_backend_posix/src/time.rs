// Copyright 2026 the Turnstile Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host clock reads.

use rustix::time::{ClockId, Timespec, clock_gettime};
use turnstile_core::time::HostTime;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// Returns the current `CLOCK_MONOTONIC` time in nanoseconds.
#[must_use]
pub fn now() -> HostTime {
    timespec_to_host_time(clock_gettime(ClockId::Monotonic))
}

fn timespec_to_host_time(timespec: Timespec) -> HostTime {
    let seconds = u64::try_from(timespec.tv_sec).unwrap_or(0);
    let nanos = u64::try_from(timespec.tv_nsec)
        .unwrap_or(0)
        .min(999_999_999);

    let nanos_u128 = u128::from(seconds)
        .saturating_mul(NANOS_PER_SECOND)
        .saturating_add(u128::from(nanos));
    HostTime(u64::try_from(nanos_u128).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use rustix::time::Timespec;
    use turnstile_core::time::HostTime;

    use super::{now, timespec_to_host_time};

    #[test]
    fn now_is_monotonic_non_decreasing() {
        let first = now();
        let second = now();
        assert!(second >= first, "monotonic clock should not go backwards");
    }

    #[test]
    fn timespec_conversion_combines_fields() {
        let t = timespec_to_host_time(Timespec {
            tv_sec: 3,
            tv_nsec: 250,
        });
        assert_eq!(t, HostTime(3_000_000_250));
    }

    #[test]
    fn negative_fields_clamp_to_zero() {
        let t = timespec_to_host_time(Timespec {
            tv_sec: -1,
            tv_nsec: -5,
        });
        assert_eq!(t, HostTime(0));
    }

    #[test]
    fn conversion_saturates_on_large_values() {
        let t = timespec_to_host_time(Timespec {
            tv_sec: i64::MAX,
            tv_nsec: 999_999_999,
        });
        assert_eq!(t, HostTime(u64::MAX));
    }
}
