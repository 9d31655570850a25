//! Progress reporting and cooperative cancellation for long-running analyses.
//!
//! An analysis receives something implementing [`Pacer`] and calls
//! [`Pacer::checkpoint`] at convenient points. The caller keeps the matching
//! [`Handle`] and may poll progress or abort from another thread. [`Silent`]
//! is the zero-cost choice when nobody is watching.

use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Returned by [`Pacer::checkpoint`] once the computation has been aborted.
#[derive(Debug)]
pub struct Interrupted;

impl std::error::Error for Interrupted {}

impl Display for Interrupted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("computation was aborted")
    }
}

/// Progress sink plus abort flag, threaded through long-running computations.
pub trait Pacer: Send + Sync {
    /// true once the owner of the handle asked the computation to stop.
    fn aborted(&self) -> bool;

    /// Record fractional progress within this pacer's range. `fraction` is in
    /// [0, 1] relative to the range, not the whole computation.
    fn report(&mut self, fraction: f64);

    /// Split off a pacer covering the next `span` fraction of this range.
    /// Spans handed out by successive calls must not sum past 1.
    fn sub(&mut self, span: f64) -> Self
    where
        Self: Sized;

    /// Report progress, failing with [`Interrupted`] if aborted.
    fn checkpoint(&mut self, fraction: f64) -> Result<(), Interrupted> {
        if self.aborted() {
            return Err(Interrupted);
        }
        self.report(fraction);
        Ok(())
    }
}

/// Pacer that records nothing and can never be aborted.
#[derive(Debug, Default, Clone, Copy)]
pub struct Silent;

impl Pacer for Silent {
    fn aborted(&self) -> bool {
        false
    }

    fn report(&mut self, _fraction: f64) {}

    fn sub(&mut self, _span: f64) -> Self {
        Silent
    }
}

/// Shared state behind a [`Tracker`]: poll progress, request an abort.
#[derive(Debug, Default)]
pub struct Handle {
    aborted: AtomicBool,
    // f64 bits; non-negative floats keep their ordering as u64 bit patterns,
    // so fetch_max gives monotone progress without a lock.
    progress: AtomicU64,
}

impl Handle {
    /// Ask the computation to stop at its next checkpoint.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    /// Has an abort been requested?
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Overall progress in [0, 1].
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::Relaxed))
    }

    fn record(&self, value: f64) {
        self.progress.fetch_max(value.to_bits(), Ordering::Relaxed);
    }
}

/// Pacer bound to a [`Handle`], covering the sub-range `[lo, hi]` of the
/// overall computation.
#[derive(Debug)]
pub struct Tracker {
    state: Arc<Handle>,
    lo: f64,
    hi: f64,
    handed_out: f64,
}

/// Create a connected `(Handle, Tracker)` pair covering the full range.
pub fn tracker() -> (Arc<Handle>, Tracker) {
    let state: Arc<Handle> = Default::default();
    let pacer = Tracker {
        state: state.clone(),
        lo: 0.0,
        hi: 1.0,
        handed_out: 0.0,
    };
    (state, pacer)
}

impl Pacer for Tracker {
    fn aborted(&self) -> bool {
        self.state.is_aborted()
    }

    fn report(&mut self, fraction: f64) {
        debug_assert!((0.0..=1.0).contains(&fraction));
        let global = self.lo + (self.hi - self.lo) * fraction.clamp(0.0, 1.0);
        self.state.record(global);
    }

    fn sub(&mut self, span: f64) -> Self {
        debug_assert!((0.0..=1.0).contains(&span));
        debug_assert!(self.handed_out + span <= 1.0 + 1e-9);
        let width = self.hi - self.lo;
        let lo = self.lo + width * self.handed_out;
        self.handed_out = (self.handed_out + span).min(1.0);
        Tracker {
            state: self.state.clone(),
            lo,
            hi: self.lo + width * self.handed_out,
            handed_out: 0.0,
        }
    }
}
