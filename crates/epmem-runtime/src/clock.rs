//! Timing instrumentation.
//!
//! The scheduler never reads the system time directly; it asks an injected
//! [`Clock`].  Production code uses [`SystemClock`]; tests drive a
//! [`ManualClock`] by hand.  Elapsed time per [`Phase`] is accumulated in
//! [`CycleTimers`].
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use epmem_runtime::clock::{Clock, CycleTimers, ManualClock, Phase};
//!
//! let clock = ManualClock::default();
//! let mut timers = CycleTimers::default();
//!
//! let start = clock.now();
//! clock.advance(Duration::from_millis(3));
//! timers.add(Phase::Record, clock.now().saturating_sub(start));
//!
//! assert_eq!(timers.get(Phase::Record).calls, 1);
//! assert_eq!(timers.get(Phase::Record).total, Duration::from_millis(3));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

/// Monotonic time source.
pub trait Clock: Send {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;
}

/// [`Clock`] backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven [`Clock`]; clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Timers
// ─────────────────────────────────────────────────────────────────────────────

/// The timed parts of a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Record,
    Retrieve,
    Navigate,
    /// The whole `on_cycle` call.
    Cycle,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Record, Phase::Retrieve, Phase::Navigate, Phase::Cycle];

    pub fn name(self) -> &'static str {
        match self {
            Phase::Record => "record",
            Phase::Retrieve => "retrieve",
            Phase::Navigate => "navigate",
            Phase::Cycle => "cycle",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Accumulated time for one [`Phase`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimerStat {
    pub calls: u64,
    pub total: Duration,
    pub last: Duration,
}

impl TimerStat {
    pub fn mean(&self) -> Duration {
        if self.calls == 0 {
            Duration::ZERO
        } else {
            let nanos = self.total.as_nanos() / u128::from(self.calls);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }
}

/// Per-phase accumulators.
#[derive(Debug, Clone, Default)]
pub struct CycleTimers {
    stats: [TimerStat; 4],
}

impl CycleTimers {
    pub fn add(&mut self, phase: Phase, elapsed: Duration) {
        let stat = &mut self.stats[phase.slot()];
        stat.calls += 1;
        stat.total += elapsed;
        stat.last = elapsed;
    }

    pub fn get(&self, phase: Phase) -> TimerStat {
        self.stats[phase.slot()]
    }

    /// `(name, stat)` pairs for every phase.
    pub fn snapshot(&self) -> Vec<(&'static str, TimerStat)> {
        Phase::ALL.iter().map(|p| (p.name(), self.get(*p))).collect()
    }

    pub fn reset(&mut self) {
        self.stats = Default::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let other = clock.clone();
        clock.advance(Duration::from_secs(2));
        assert_eq!(other.now(), Duration::from_secs(2));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::default();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn timers_accumulate_per_phase() {
        let mut timers = CycleTimers::default();
        timers.add(Phase::Retrieve, Duration::from_millis(4));
        timers.add(Phase::Retrieve, Duration::from_millis(2));
        let stat = timers.get(Phase::Retrieve);
        assert_eq!(stat.calls, 2);
        assert_eq!(stat.total, Duration::from_millis(6));
        assert_eq!(stat.last, Duration::from_millis(2));
        assert_eq!(stat.mean(), Duration::from_millis(3));
        assert_eq!(timers.get(Phase::Record), TimerStat::default());
    }

    #[test]
    fn snapshot_lists_every_phase_and_reset_clears() {
        let mut timers = CycleTimers::default();
        timers.add(Phase::Cycle, Duration::from_millis(1));
        let names: Vec<&str> = timers.snapshot().iter().map(|(n, _)| *n).collect();
        assert_eq!(names, vec!["record", "retrieve", "navigate", "cycle"]);
        timers.reset();
        assert_eq!(timers.get(Phase::Cycle).calls, 0);
    }

    #[test]
    fn mean_survives_call_counts_beyond_u32() {
        let stat = TimerStat {
            calls: 1 << 32,
            total: Duration::from_secs(1 << 32),
            last: Duration::ZERO,
        };
        assert_eq!(stat.mean(), Duration::from_secs(1));
    }

    #[test]
    fn mean_of_unused_timer_is_zero() {
        assert_eq!(TimerStat::default().mean(), Duration::ZERO);
    }
}
