// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Time sources for congestion controllers.
//!
//! Timestamps are expressed as the time elapsed since the epoch of the clock,
//! so a freshly created controller starts with every timestamp at zero.

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;

/// A `Clock` is a source of nondecreasing timestamps.
pub trait Clock: Send + Sync {
    /// Return the time elapsed since the epoch of the clock.
    fn now(&self) -> Duration;
}

impl fmt::Debug for dyn Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clock(now={:?})", self.now())
    }
}

/// A clock backed by `Instant`.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Create a clock with the given epoch.
    pub const fn new(epoch: Instant) -> Self {
        Self { epoch }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// A clock which only moves when told to.
///
/// It is intended to drive controllers deterministically in tests, benchmarks
/// and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Elapsed nanoseconds.
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Duration) -> Self {
        Self {
            nanos: AtomicU64::new(start.as_nanos() as u64),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, d: Duration) {
        self.nanos.fetch_add(d.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Move the clock to `t`. Earlier times are ignored to keep the clock
    /// nondecreasing.
    pub fn set(&self, t: Duration) {
        self.nanos.fetch_max(t.as_nanos() as u64, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Relaxed))
    }
}
