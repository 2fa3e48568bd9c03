//! Aggregate statistics for one transfer run.

use std::fmt;
use std::time::{Duration, Instant};

/// Mutable accumulator owned by the orchestrator for the duration of a run.
///
/// Created at transfer start, finalized with `finish`, never persisted.
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// Successful network requests (pages read or batches submitted).
    pub requests: u64,
    /// Records read, written or deleted.
    pub records: u64,
    /// Backoff sleeps performed.
    pub retries: u64,
    /// Records dropped under the skip policy.
    pub skipped: u64,
    /// Highest capacity units reported by a single request.
    pub peak_consumed_capacity: f64,
    /// Highest consumed/provisioned ratio observed (`None` when unmetered).
    pub peak_pressure: Option<f64>,
    pub elapsed: Duration,
    started: Instant,
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::start()
    }
}

impl TransferStats {
    pub fn start() -> Self {
        Self {
            requests: 0,
            records: 0,
            retries: 0,
            skipped: 0,
            peak_consumed_capacity: 0.0,
            peak_pressure: None,
            elapsed: Duration::ZERO,
            started: Instant::now(),
        }
    }

    pub fn observe_capacity(&mut self, consumed: Option<f64>, ratio: Option<f64>) {
        if let Some(consumed) = consumed {
            self.peak_consumed_capacity = self.peak_consumed_capacity.max(consumed);
        }
        if let Some(ratio) = ratio {
            self.peak_pressure = Some(self.peak_pressure.map_or(ratio, |p| p.max(ratio)));
        }
    }

    /// Fold another run (e.g. a nested drain or a parallel segment) into this one.
    ///
    /// Elapsed time is not summed; the outer run measures its own wall clock.
    pub fn absorb(&mut self, other: &TransferStats) {
        self.requests += other.requests;
        self.records += other.records;
        self.retries += other.retries;
        self.skipped += other.skipped;
        self.observe_capacity(Some(other.peak_consumed_capacity), other.peak_pressure);
    }

    /// Stamp the elapsed wall-clock time.
    pub fn finish(mut self) -> Self {
        self.elapsed = self.started.elapsed();
        self
    }

    /// Records per second over the elapsed time.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            0.0
        } else {
            self.records as f64 / secs
        }
    }
}

impl fmt::Display for TransferStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} records in {:.2} seconds (~{:.2} rps) in {} request(s), {} retries",
            self.records,
            self.elapsed.as_secs_f64(),
            self.rate(),
            self.requests,
            self.retries
        )?;
        if self.skipped > 0 {
            write!(f, ", {} skipped", self.skipped)?;
        }
        write!(f, ", max consumed capacity: {}", self.peak_consumed_capacity)?;
        if let Some(pressure) = self.peak_pressure {
            write!(f, " ({:.0}% of provisioned)", pressure * 100.0)?;
        }
        Ok(())
    }
}
