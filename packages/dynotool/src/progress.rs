//! Incremental progress reporting for long-running transfers.
//!
//! The engine reports through `ProgressSink`; rendering is the caller's
//! choice. `DotProgress` reproduces the classic one-glyph-per-request
//! terminal display:
//!
//! | glyph | meaning                                   |
//! |-------|-------------------------------------------|
//! | `.`   | page/batch done, nominal or unmetered     |
//! | `*`   | page done, consumed capacity >= 65%       |
//! | `!`   | page done, consumed capacity >= 90%       |
//! | `<`   | throttled or partially processed, backing off |

use std::fmt;
use std::io::Write;
use std::time::Duration;

use crate::scanner::Pressure;

/// States an operation moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Describing,
    ConfirmingIntent,
    Reading,
    Scanning,
    Writing,
    Deleting,
    CreatingDestination,
    WaitingActive,
    WaitingDeleted,
    Finalizing,
    Done,
    Aborted,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Describing => "describing",
            Phase::ConfirmingIntent => "confirming",
            Phase::Reading => "reading",
            Phase::Scanning => "scanning",
            Phase::Writing => "writing",
            Phase::Deleting => "deleting",
            Phase::CreatingDestination => "creating destination",
            Phase::WaitingActive => "waiting for ACTIVE",
            Phase::WaitingDeleted => "waiting for deletion",
            Phase::Finalizing => "finalizing",
            Phase::Done => "done",
            Phase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Observer for transfer progress. All methods default to no-ops.
pub trait ProgressSink: Send + Sync {
    fn on_phase(&self, _operation: &str, _phase: Phase) {}

    /// A page of `records` was read at the given capacity pressure.
    fn on_page(&self, _records: usize, _pressure: Pressure) {}

    /// A batch of `submitted` requests came back with `unprocessed` left over.
    fn on_batch(&self, _submitted: usize, _unprocessed: usize) {}

    /// Retry number `attempt` after sleeping `delay`.
    fn on_retry(&self, _attempt: u32, _delay: Duration) {}

    /// A single record was written outside of a batch.
    fn on_record(&self) {}
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {}

/// Glyph-per-request display on stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct DotProgress;

impl DotProgress {
    fn emit(&self, glyph: &str) {
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(glyph.as_bytes());
        let _ = err.flush();
    }
}

impl ProgressSink for DotProgress {
    fn on_phase(&self, operation: &str, phase: Phase) {
        tracing::info!(operation, %phase, "phase");
        if matches!(phase, Phase::Done | Phase::Aborted) {
            self.emit("\n");
        }
    }

    fn on_page(&self, _records: usize, pressure: Pressure) {
        let mut buf = [0u8; 4];
        self.emit(pressure.glyph().encode_utf8(&mut buf));
    }

    fn on_batch(&self, _submitted: usize, unprocessed: usize) {
        self.emit(if unprocessed == 0 { "." } else { "<" });
    }

    fn on_retry(&self, _attempt: u32, _delay: Duration) {
        self.emit("<");
    }

    fn on_record(&self) {
        self.emit(".");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::WaitingActive.to_string(), "waiting for ACTIVE");
        assert_eq!(Phase::ConfirmingIntent.to_string(), "confirming");
    }

    #[test]
    fn test_silent_progress_is_noop() {
        let sink: &dyn ProgressSink = &SilentProgress;
        sink.on_phase("export", Phase::Scanning);
        sink.on_page(10, Pressure::Critical);
        sink.on_retry(1, Duration::from_secs(1));
    }
}
