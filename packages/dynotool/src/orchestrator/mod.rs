//! TransferOrchestrator: every bulk command as a composition of the
//! scanner, the batch drivers, the codec and a target.
//!
//! Each operation walks a fixed sequence of `Phase`s and reports them to
//! the progress sink; a failing operation reports `Phase::Aborted` and
//! returns the error without cleaning up partial output.

mod copy;
mod export;
mod import;
mod inspect;
mod mutate;

pub use copy::CopyMode;
pub use export::ExportMode;
pub use import::parse_records;
pub use inspect::{render_info, TableSummary};
pub use mutate::{AlwaysConfirm, Confirm, ConfirmPrompt};

use crate::admin::{TableAdmin, WaitPolicy};
use crate::batch::{BatchDeleter, BatchWriter};
use crate::client::{TableClient, MAX_BATCH_WRITE};
use crate::codec::UnencodablePolicy;
use crate::error::{DynoError, Result};
use crate::progress::{Phase, ProgressSink};
use crate::retry::{RetryPolicy, Sleeper};
use crate::scanner::{PaginatedScanner, ScanOptions};
use crate::target::ObjectStore;
use crate::types::{ScanFilter, Segment, TableSchema};

/// Tunables for one orchestrator, resolved from config and flags.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSettings {
    pub retry: RetryPolicy,
    /// Requests per batch write.
    pub batch_size: usize,
    /// Records evaluated per scan request (service default when unset).
    pub page_size: Option<u32>,
    pub wait: WaitPolicy,
    pub on_unencodable: UnencodablePolicy,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            batch_size: MAX_BATCH_WRITE,
            page_size: None,
            wait: WaitPolicy::default(),
            on_unencodable: UnencodablePolicy::Abort,
        }
    }
}

pub struct TransferOrchestrator<'a> {
    client: &'a dyn TableClient,
    objects: Option<&'a dyn ObjectStore>,
    settings: TransferSettings,
    sleeper: &'a dyn Sleeper,
    progress: &'a dyn ProgressSink,
}

impl<'a> TransferOrchestrator<'a> {
    pub fn new(
        client: &'a dyn TableClient,
        settings: TransferSettings,
        sleeper: &'a dyn Sleeper,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            client,
            objects: None,
            settings,
            sleeper,
            progress,
        }
    }

    /// Enable `s3://` targets.
    pub fn with_object_store(mut self, objects: &'a dyn ObjectStore) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    pub fn admin(&self) -> TableAdmin<'a> {
        TableAdmin::new(self.client, self.settings.wait, self.sleeper)
    }

    // ── Building blocks ─────────────────────────────────────────────

    fn scanner(&self) -> PaginatedScanner<'_> {
        PaginatedScanner::new(self.client, &self.settings.retry, self.sleeper, self.progress)
    }

    fn writer(&self, table: &str) -> Result<BatchWriter<'_>> {
        BatchWriter::new(
            self.client,
            table,
            self.settings.batch_size,
            &self.settings.retry,
            self.sleeper,
            self.progress,
        )
    }

    fn deleter<'s>(&'s self, schema: &'s TableSchema) -> Result<BatchDeleter<'s>> {
        BatchDeleter::new(
            self.client,
            schema,
            self.settings.batch_size,
            &self.settings.retry,
            self.sleeper,
            self.progress,
        )
    }

    fn object_store(&self) -> Result<&'a dyn ObjectStore> {
        self.objects
            .ok_or_else(|| DynoError::Config("bucket targets need an object store".to_string()))
    }

    fn scan_options(
        &self,
        schema: &TableSchema,
        segment: Option<Segment>,
        filter: Option<ScanFilter>,
        max_items: Option<u64>,
    ) -> ScanOptions {
        let read_capacity = schema.read_capacity();
        if read_capacity.is_none() {
            tracing::info!(table = schema.name.as_str(), "table is unmetered, pressure reporting disabled");
        }
        ScanOptions {
            segment,
            filter,
            max_items,
            page_size: self.settings.page_size,
            read_capacity,
        }
    }

    fn phase(&self, operation: &str, phase: Phase) {
        self.progress.on_phase(operation, phase);
    }

    /// Run one operation, closing it with `Done` or `Aborted`.
    fn run<T>(&self, operation: &str, body: impl FnOnce() -> Result<T>) -> Result<T> {
        match body() {
            Ok(value) => {
                self.phase(operation, Phase::Done);
                Ok(value)
            }
            Err(err) => {
                tracing::error!(operation, code = err.code(), error = %err, "operation aborted");
                self.phase(operation, Phase::Aborted);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::progress::{Phase, ProgressSink};
    use crate::retry::Sleeper;

    #[derive(Default)]
    pub struct Recorder(pub Mutex<Vec<Duration>>);

    impl Sleeper for Recorder {
        fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    /// Captures phase transitions.
    #[derive(Default)]
    pub struct Phases(pub Mutex<Vec<Phase>>);

    impl ProgressSink for Phases {
        fn on_phase(&self, _operation: &str, phase: Phase) {
            self.0.lock().unwrap().push(phase);
        }
    }
}
