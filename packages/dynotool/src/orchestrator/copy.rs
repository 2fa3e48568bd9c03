//! Copy: Describing(source) -> CreatingDestination -> WaitingActive ->
//! Reading -> Writing -> Done.

use super::TransferOrchestrator;
use crate::error::{DynoError, Result};
use crate::progress::Phase;
use crate::retry::{with_retry, Backoff};
use crate::stats::TransferStats;
use crate::types::{TableSchema, TableStatus, TaggedRecord, WriteRequest};

const OPERATION: &str = "copy";

/// How records move from source to destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CopyMode {
    /// Read the whole source into memory, then put records one at a time.
    #[default]
    Buffered,
    /// Feed each scanned page straight into batch writes. Bounded memory.
    Streaming,
}

impl<'a> TransferOrchestrator<'a> {
    /// Copy `source` into a new table named `destination` with the same
    /// definition. Refuses to touch an existing destination.
    pub fn copy(&self, source: &str, destination: &str, mode: CopyMode) -> Result<TransferStats> {
        self.run(OPERATION, || {
            self.phase(OPERATION, Phase::Describing);
            let admin = self.admin();
            let schema = admin.describe(source)?;
            if admin.try_describe(destination)?.is_some() {
                return Err(DynoError::TableExists(destination.to_string()));
            }

            self.phase(OPERATION, Phase::CreatingDestination);
            let definition = schema.definition_for(destination);
            tracing::info!(source, destination, ?definition, "creating destination table");
            admin.create(&definition)?;

            self.phase(OPERATION, Phase::WaitingActive);
            admin.wait_until(destination, TableStatus::Active)?;

            let stats = match mode {
                CopyMode::Buffered => self.copy_buffered(&schema, destination)?,
                CopyMode::Streaming => self.copy_streaming(&schema, destination)?,
            };
            tracing::info!(source, destination, %stats, "copy finished");
            Ok(stats)
        })
    }

    fn copy_buffered(&self, schema: &TableSchema, destination: &str) -> Result<TransferStats> {
        self.phase(OPERATION, Phase::Reading);
        let options = self.scan_options(schema, None, None, None);
        let mut records: Vec<TaggedRecord> = Vec::new();
        let mut stats = self.scanner().drain(&schema.name, &options, |page, _| {
            records.extend(page.records);
            Ok(())
        })?;
        tracing::info!(source = schema.name.as_str(), records = records.len(), "source loaded");

        self.phase(OPERATION, Phase::Writing);
        let mut backoff = Backoff::new(&self.settings.retry, self.sleeper);
        for record in &records {
            with_retry(&mut backoff, "PutItem", self.progress, || {
                self.client.put_item(destination, record)
            })?;
            self.progress.on_record();
            stats.requests += 1;
        }
        stats.retries += backoff.total_retries();
        Ok(stats.finish())
    }

    fn copy_streaming(&self, schema: &TableSchema, destination: &str) -> Result<TransferStats> {
        self.phase(OPERATION, Phase::Scanning);
        let options = self.scan_options(schema, None, None, None);
        let writer = self.writer(destination)?;
        let mut written = TransferStats::start();
        let mut stats = self.scanner().drain(&schema.name, &options, |page, _| {
            let batch = writer.drain(page.records.into_iter().map(WriteRequest::Put))?;
            written.absorb(&batch);
            Ok(())
        })?;
        stats.records = written.records;
        stats.requests += written.requests;
        stats.retries += written.retries;
        Ok(stats.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Fault, MemoryClient};
    use crate::orchestrator::test_support::{Phases, Recorder};
    use crate::orchestrator::TransferSettings;
    use crate::progress::SilentProgress;
    use crate::types::TaggedValue;
    use std::time::Duration;

    fn seeded(count: usize) -> MemoryClient {
        let client = MemoryClient::new().with_page_size(7);
        client.create_table_with(TableSchema::simple("A", "pk", Some("sk"))).unwrap();
        for i in 0..count {
            let mut record = TaggedRecord::new();
            record.insert("pk".into(), TaggedValue::S(format!("p{}", i % 3)));
            record.insert("sk".into(), TaggedValue::S(format!("s{:03}", i)));
            record.insert("payload".into(), TaggedValue::N(i.to_string()));
            client.insert("A", record).unwrap();
        }
        client
    }

    #[test]
    fn test_copy_to_existing_table_writes_nothing() {
        let client = seeded(10);
        client.create_table_with(TableSchema::simple("B", "pk", None)).unwrap();
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);

        let err = orchestrator.copy("A", "B", CopyMode::Buffered).unwrap_err();

        assert!(matches!(err, DynoError::TableExists(ref name) if name == "B"));
        let calls = client.calls();
        assert_eq!(calls.creates, 0);
        assert_eq!(calls.puts, 0);
        assert_eq!(calls.batch_writes, 0);
        assert!(client.items("B").is_empty());
    }

    #[test]
    fn test_copy_missing_source() {
        let client = MemoryClient::new();
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);
        let err = orchestrator.copy("nope", "B", CopyMode::Buffered).unwrap_err();
        assert!(matches!(err, DynoError::TableNotFound(_)));
    }

    #[test]
    fn test_buffered_copy_puts_each_record() {
        let client = seeded(20).with_activation_delay(1);
        let sleeper = Recorder::default();
        let phases = Phases::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &phases);

        let stats = orchestrator.copy("A", "B", CopyMode::Buffered).unwrap();

        assert_eq!(stats.records, 20);
        assert_eq!(client.calls().puts, 20);
        assert_eq!(client.items("B"), client.items("A"));
        assert_eq!(client.schema("B").unwrap().key_schema, client.schema("A").unwrap().key_schema);
        assert_eq!(
            *phases.0.lock().unwrap(),
            vec![
                Phase::Describing,
                Phase::CreatingDestination,
                Phase::WaitingActive,
                Phase::Reading,
                Phase::Writing,
                Phase::Done
            ]
        );
    }

    #[test]
    fn test_buffered_copy_retries_throttled_put() {
        let client = seeded(3);
        client.script_put(vec![Fault::Ok, Fault::Throttle]);
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);

        let stats = orchestrator.copy("A", "B", CopyMode::Buffered).unwrap();

        assert_eq!(client.items("B").len(), 3);
        assert_eq!(client.calls().puts, 4);
        assert_eq!(stats.retries, 1);
        assert!(sleeper.0.lock().unwrap().contains(&Duration::from_secs(1)));
    }

    #[test]
    fn test_streaming_copy_uses_batches() {
        let client = seeded(20);
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);

        let stats = orchestrator.copy("A", "B", CopyMode::Streaming).unwrap();

        assert_eq!(stats.records, 20);
        assert_eq!(client.calls().puts, 0);
        assert_eq!(client.calls().batch_sizes, vec![7, 7, 6]);
        assert_eq!(client.items("B"), client.items("A"));
    }

    #[test]
    fn test_streaming_copy_summary_is_stamped() {
        let client = seeded(20);
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);

        let stats = orchestrator.copy("A", "B", CopyMode::Streaming).unwrap();

        assert!(stats.elapsed > Duration::ZERO);
        assert!(stats.rate() > 0.0);
        assert_eq!(stats.requests, 3 + 3);
        assert!(stats.to_string().starts_with("20 records in "));
    }
}
