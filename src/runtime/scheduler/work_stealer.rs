//! Work stealing for load balancing across worker threads.
//!
//! An idle worker picks a pseudo-random victim and takes the least important
//! task it is allowed to run from the victim's ready queue.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use super::queue::{PriorityTaskQueue, ReadyEntry};

/// Statistics about work stealing operations.
#[derive(Debug, Default)]
pub struct StealStats {
    /// Number of successful steals.
    pub steal_successes: AtomicUsize,
    /// Number of failed steal attempts.
    pub steal_failures: AtomicUsize,
    /// Total number of steal attempts.
    pub total_attempts: AtomicUsize,
}

impl StealStats {
    /// Record a successful steal.
    #[inline]
    pub fn record_success(&self) {
        self.steal_successes.fetch_add(1, Ordering::Relaxed);
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed steal attempt.
    #[inline]
    pub fn record_failure(&self) {
        self.steal_failures.fetch_add(1, Ordering::Relaxed);
        self.total_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Fraction of attempts that found a task.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_attempts.load(Ordering::Relaxed);
        if total == 0 {
            return 1.0;
        }
        let successes = self.steal_successes.load(Ordering::Relaxed);
        successes as f64 / total as f64
    }
}

/// Victim selection and steal bookkeeping.
#[derive(Debug)]
pub struct WorkStealer {
    stats: StealStats,
    /// Random state for victim selection.
    rng_state: AtomicU64,
}

impl WorkStealer {
    #[inline]
    pub fn new() -> Self {
        Self {
            stats: StealStats::default(),
            rng_state: AtomicU64::new(1),
        }
    }

    /// Steal one task for `thief` from any other worker's queue.
    ///
    /// Every victim is visited at most once, starting from a random one.
    pub fn steal(
        &self,
        thief: usize,
        queues: &[PriorityTaskQueue],
    ) -> Option<ReadyEntry> {
        let num_workers = queues.len();
        if num_workers < 2 {
            return None;
        }

        let start = (self.next_rand() % num_workers as u64) as usize;
        for offset in 0..num_workers {
            let victim = (start + offset) % num_workers;
            if victim == thief {
                continue;
            }
            if let Some(entry) = queues[victim].steal_for(thief) {
                self.stats.record_success();
                return Some(entry);
            }
        }

        self.stats.record_failure();
        None
    }

    /// Simple LCG random number generator.
    #[inline]
    fn next_rand(&self) -> u64 {
        // LCG parameters (from Numerical Recipes)
        let state = self.rng_state.fetch_add(1, Ordering::Relaxed);
        let mixed = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        mixed >> 33
    }

    /// Get steal statistics.
    #[inline]
    pub fn stats(&self) -> &StealStats {
        &self.stats
    }
}

impl Default for WorkStealer {
    fn default() -> Self {
        Self::new()
    }
}
