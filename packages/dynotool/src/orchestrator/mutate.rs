//! Destructive operations: truncate (delete every record) and wipe
//! (delete and recreate the table).
//!
//! Both pass through a `Confirm` gate before touching data. Declining
//! aborts with `ConfirmationDeclined`; non-interactive callers opt in
//! explicitly with `AlwaysConfirm`.

use super::TransferOrchestrator;
use crate::error::{DynoError, Result};
use crate::progress::Phase;
use crate::stats::TransferStats;
use crate::types::{ScanFilter, TableSchema, TableStatus, TaggedRecord};

/// What the operator is asked to approve.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmPrompt {
    pub operation: &'static str,
    pub table: String,
    /// Approximate item count reported by describe.
    pub approximate_items: i64,
    /// Records in the first page that will be deleted (truncate only).
    pub page_items: usize,
    /// One record that will be deleted (truncate only).
    pub sample: Option<TaggedRecord>,
    pub filtered: bool,
}

/// Confirmation gate invoked once before any destructive call.
pub trait Confirm {
    fn confirm(&self, prompt: &ConfirmPrompt) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&ConfirmPrompt) -> bool,
{
    fn confirm(&self, prompt: &ConfirmPrompt) -> bool {
        self(prompt)
    }
}

/// Approves everything. Only for explicit `--yes` style opt-in.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&self, _prompt: &ConfirmPrompt) -> bool {
        true
    }
}

impl<'a> TransferOrchestrator<'a> {
    /// Delete every record of `table`, or only those matching `filter`.
    ///
    /// The scan and the deletes interleave page by page. Confirmation is
    /// requested when the first non-empty page arrives, so an empty table
    /// (or a filter matching nothing) finishes without prompting.
    pub fn truncate(
        &self,
        table: &str,
        filter: Option<ScanFilter>,
        confirm: &dyn Confirm,
    ) -> Result<TransferStats> {
        const OPERATION: &str = "truncate";
        self.run(OPERATION, || {
            self.phase(OPERATION, Phase::Describing);
            let schema = self.admin().describe(table)?;
            let deleter = self.deleter(&schema)?;
            let filtered = filter.is_some();
            let options = self.scan_options(&schema, None, filter, None);

            let mut confirmed = false;
            let mut deleted = TransferStats::start();
            self.phase(OPERATION, Phase::Scanning);
            let scanned = self.scanner().drain(table, &options, |page, _| {
                let Some(first) = page.records.first() else {
                    return Ok(());
                };
                if !confirmed {
                    self.phase(OPERATION, Phase::ConfirmingIntent);
                    let prompt = ConfirmPrompt {
                        operation: OPERATION,
                        table: table.to_string(),
                        approximate_items: schema.item_count,
                        page_items: page.records.len(),
                        sample: Some(first.clone()),
                        filtered,
                    };
                    if !confirm.confirm(&prompt) {
                        return Err(DynoError::ConfirmationDeclined);
                    }
                    confirmed = true;
                    self.phase(OPERATION, Phase::Deleting);
                }
                let batch = deleter.drain(&page.records)?;
                deleted.absorb(&batch);
                Ok(())
            })?;

            if !confirmed {
                tracing::info!(table, filtered, "nothing to delete");
            }
            let mut stats = scanned;
            stats.records = deleted.records;
            stats.requests += deleted.requests;
            stats.retries += deleted.retries;
            tracing::info!(table, %stats, "truncate finished");
            Ok(stats)
        })
    }

    /// Drop `table` and recreate it empty with the same definition.
    pub fn wipe(&self, table: &str, confirm: &dyn Confirm) -> Result<TableSchema> {
        const OPERATION: &str = "wipe";
        self.run(OPERATION, || {
            self.phase(OPERATION, Phase::Describing);
            let admin = self.admin();
            let schema = admin.describe(table)?;
            let definition = schema.definition_for(table);

            self.phase(OPERATION, Phase::ConfirmingIntent);
            let prompt = ConfirmPrompt {
                operation: OPERATION,
                table: table.to_string(),
                approximate_items: schema.item_count,
                page_items: 0,
                sample: None,
                filtered: false,
            };
            if !confirm.confirm(&prompt) {
                return Err(DynoError::ConfirmationDeclined);
            }

            self.phase(OPERATION, Phase::Deleting);
            admin.delete(table)?;
            self.phase(OPERATION, Phase::WaitingDeleted);
            admin.wait_until(table, TableStatus::Deleted)?;

            self.phase(OPERATION, Phase::CreatingDestination);
            admin.create(&definition)?;
            self.phase(OPERATION, Phase::WaitingActive);
            admin.wait_until(table, TableStatus::Active)?;
            tracing::info!(table, "table recreated");
            Ok(definition)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::wire::parse_filter;
    use crate::memory::{Fault, MemoryClient};
    use crate::orchestrator::test_support::{Phases, Recorder};
    use crate::orchestrator::TransferSettings;
    use crate::progress::SilentProgress;
    use crate::types::TaggedValue;
    use std::cell::RefCell;

    fn seeded(count: usize) -> MemoryClient {
        let client = MemoryClient::new().with_page_size(10);
        client.create_table_with(TableSchema::simple("events", "id", None)).unwrap();
        for i in 0..count {
            let mut record = TaggedRecord::new();
            record.insert("id".into(), TaggedValue::S(format!("e{:03}", i)));
            let kind = if i % 2 == 0 { "even" } else { "odd" };
            record.insert("kind".into(), TaggedValue::S(kind.into()));
            client.insert("events", record).unwrap();
        }
        client
    }

    #[test]
    fn test_truncate_deletes_everything() {
        let client = seeded(45);
        let sleeper = Recorder::default();
        let phases = Phases::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &phases);

        let stats = orchestrator.truncate("events", None, &AlwaysConfirm).unwrap();

        assert_eq!(stats.records, 45);
        assert!(client.items("events").is_empty());
        assert_eq!(
            *phases.0.lock().unwrap(),
            vec![
                Phase::Describing,
                Phase::Scanning,
                Phase::ConfirmingIntent,
                Phase::Deleting,
                Phase::Done
            ]
        );
    }

    #[test]
    fn test_truncate_declined_deletes_nothing() {
        let client = seeded(5);
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);
        let seen = RefCell::new(None);
        let decline = |prompt: &ConfirmPrompt| {
            *seen.borrow_mut() = Some(prompt.clone());
            false
        };

        let err = orchestrator.truncate("events", None, &decline).unwrap_err();

        assert!(matches!(err, DynoError::ConfirmationDeclined));
        assert_eq!(client.items("events").len(), 5);
        assert_eq!(client.calls().batch_writes, 0);
        let prompt = seen.borrow().clone().unwrap();
        assert_eq!(prompt.page_items, 5);
        assert!(prompt.sample.is_some());
    }

    #[test]
    fn test_truncate_empty_table_never_prompts() {
        let client = seeded(0);
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);
        let refuse = |_: &ConfirmPrompt| -> bool { panic!("must not prompt") };

        let stats = orchestrator.truncate("events", None, &refuse).unwrap();

        assert_eq!(stats.records, 0);
    }

    #[test]
    fn test_truncate_with_filter() {
        let client = seeded(20);
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);
        let filter = parse_filter(r#"{"expression": "kind = :k", "values": {":k": {"S": "odd"}}}"#).unwrap();

        let stats = orchestrator.truncate("events", Some(filter), &AlwaysConfirm).unwrap();

        assert_eq!(stats.records, 10);
        let left = client.items("events");
        assert_eq!(left.len(), 10);
        assert!(left.iter().all(|r| r.get("kind") == Some(&TaggedValue::S("even".into()))));
    }

    #[test]
    fn test_truncate_retries_throttled_scan() {
        let client = seeded(3);
        client.script_scan(vec![Fault::Throttle, Fault::Throttle]);
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);

        let stats = orchestrator.truncate("events", None, &AlwaysConfirm).unwrap();

        assert_eq!(stats.records, 3);
        assert_eq!(stats.retries, 2);
        assert_eq!(client.calls().scans, 3);
    }

    #[test]
    fn test_wipe_recreates_empty_table() {
        let client = seeded(12).with_activation_delay(2);
        let sleeper = Recorder::default();
        let phases = Phases::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &phases);

        let definition = orchestrator.wipe("events", &AlwaysConfirm).unwrap();

        assert_eq!(definition.name, "events");
        assert!(client.has_table("events"));
        assert!(client.items("events").is_empty());
        assert_eq!(client.calls().deletes, 1);
        assert_eq!(client.calls().creates, 1);
        assert_eq!(phases.0.lock().unwrap().last(), Some(&Phase::Done));
    }

    #[test]
    fn test_wipe_declined_keeps_table() {
        let client = seeded(3);
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);
        let err = orchestrator.wipe("events", &|_: &ConfirmPrompt| false).unwrap_err();
        assert!(matches!(err, DynoError::ConfirmationDeclined));
        assert_eq!(client.calls().deletes, 0);
        assert_eq!(client.items("events").len(), 3);
    }
}
