//! Run-time options, statistics and cooperative cancellation
//!
//! Every public entry point takes an [`Options`] record; nothing in the crate
//! reads process-global state. The record carries the RNG seed for the
//! generic-vector search, the LLL reduction parameter, the triangulation ray
//! budget, the scalar counting strategy, a shared cancellation flag and a
//! shared statistics block.
//!
//! Cancellation is cooperative: the flag is polled at the top of the cone
//! decomposer's work-list loop, at each parametric vertex in the enumerator,
//! and at each recursive entry of the existential eliminator. Raising the
//! flag makes the current operation unwind with `CoreError::Cancelled`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Scalar counting strategy.
///
/// Both strategies must agree on every input; `ToddLocal` evaluates each
/// unimodular cone's contribution through the Todd expansion instead of the
/// truncated-series quotient.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CountStrategy {
    /// Truncated Taylor division of `(1+t)^n` by the ray-weight factors.
    TruncatedSeries,
    /// Local Todd-polynomial evaluation per unimodular cone.
    ToddLocal,
}

/// Shared cooperative cancellation flag.
///
/// Clones observe the same underlying flag, so a caller can keep one clone
/// and hand another to a long-running operation.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create a fresh, unraised flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag; the running operation unwinds at its next check site.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether the flag has been raised.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Shared operation counters.
///
/// `base_cones` counts unimodular cones emitted by the decomposer over the
/// lifetime of the record; operations only ever increment.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    base_cones: Arc<AtomicU64>,
}

impl Stats {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one emitted unimodular cone.
    #[inline]
    pub fn record_base_cone(&self) {
        self.base_cones.fetch_add(1, Ordering::Relaxed);
    }

    /// Unimodular cones emitted so far.
    pub fn base_cones(&self) -> u64 {
        self.base_cones.load(Ordering::Relaxed)
    }
}

/// Options threaded through every public call.
#[derive(Clone, Debug)]
pub struct Options {
    /// Seed of the RNG owned by the counter's generic-vector search.
    pub seed: u64,
    /// LLL reduction parameter `δ = lll_delta.0 / lll_delta.1`.
    pub lll_delta: (i64, i64),
    /// Ray-count budget passed to cone triangulation (`0` = unbudgeted).
    pub max_rays: usize,
    /// Scalar counting strategy.
    pub strategy: CountStrategy,
    /// Cooperative cancellation flag.
    pub cancel: CancelFlag,
    /// Shared operation counters.
    pub stats: Stats,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            seed: 0,
            lll_delta: (3, 4),
            max_rays: 0,
            strategy: CountStrategy::TruncatedSeries,
            cancel: CancelFlag::new(),
            stats: Stats::new(),
        }
    }
}

impl Options {
    /// Default options with an explicit RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_is_shared_across_clones() {
        let a = CancelFlag::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }

    #[test]
    fn stats_accumulate() {
        let s = Stats::new();
        s.record_base_cone();
        s.record_base_cone();
        assert_eq!(s.base_cones(), 2);
    }
}
