//! Export: Describing -> Scanning (interleaved with Writing) -> Finalizing -> Done.
//!
//! Pages are written as they arrive; only one page is held in memory.
//! A failed export leaves whatever was written so far in place.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use rayon::prelude::*;

use super::TransferOrchestrator;
use crate::codec::{FormatWriter, OutputFormat};
use crate::error::{DynoError, Result};
use crate::progress::Phase;
use crate::stats::TransferStats;
use crate::target::{page_object_key, segment_path, Target};
use crate::types::{Segment, TableSchema};

const OPERATION: &str = "export";

/// How the table is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportMode {
    /// One scanner, one output.
    #[default]
    Sequential,
    /// N independent in-process scanners, one output per segment.
    Segmented(u32),
}

impl<'a> TransferOrchestrator<'a> {
    /// Export `table` to a file or bucket.
    ///
    /// Segmented file exports write `<stem>-<segment>.<ext>` next to the
    /// requested path; bucket exports write one object per page.
    pub fn export(
        &self,
        table: &str,
        target: &Target,
        format: &OutputFormat,
        mode: ExportMode,
    ) -> Result<TransferStats> {
        self.run(OPERATION, || {
            self.phase(OPERATION, Phase::Describing);
            let schema = self.admin().describe(table)?;
            tracing::info!(
                table,
                target = %target,
                format = %format,
                read_capacity = ?schema.read_capacity(),
                "exporting"
            );

            match (target, mode) {
                (Target::File(path), ExportMode::Sequential) => {
                    let file = BufWriter::new(File::create(path)?);
                    self.phase(OPERATION, Phase::Scanning);
                    let (stats, _) = self.drain_into(&schema, file, format, None, None)?;
                    Ok(stats)
                }
                (Target::File(path), ExportMode::Segmented(total)) => {
                    self.export_segmented_files(&schema, path, format, total)
                }
                (Target::Bucket(bucket), ExportMode::Sequential) => {
                    self.phase(OPERATION, Phase::Scanning);
                    self.drain_to_bucket(&schema, bucket, format, None)
                }
                (Target::Bucket(bucket), ExportMode::Segmented(total)) => {
                    self.export_segmented_bucket(&schema, bucket, format, total)
                }
            }
        })
    }

    /// Lossless export in the native tagged form.
    pub fn backup(&self, table: &str, target: &Target) -> Result<TransferStats> {
        self.export(table, target, &OutputFormat::Native, ExportMode::Sequential)
    }

    /// Stream `table` (at most `max_items` records) into `out`.
    pub fn export_to_writer<W: Write>(
        &self,
        table: &str,
        out: W,
        format: &OutputFormat,
        max_items: Option<u64>,
    ) -> Result<(TransferStats, W)> {
        self.run(OPERATION, || {
            self.phase(OPERATION, Phase::Describing);
            let schema = self.admin().describe(table)?;
            self.phase(OPERATION, Phase::Scanning);
            self.drain_into(&schema, out, format, None, max_items)
        })
    }

    /// Drain one segment (or the whole table) into page objects of `bucket`.
    pub fn export_segment_to_bucket(
        &self,
        table: &str,
        bucket: &str,
        format: &OutputFormat,
        segment: Option<Segment>,
    ) -> Result<TransferStats> {
        self.run(OPERATION, || {
            self.phase(OPERATION, Phase::Describing);
            let schema = self.admin().describe(table)?;
            self.phase(OPERATION, Phase::Scanning);
            self.drain_to_bucket(&schema, bucket, format, segment)
        })
    }

    // ── Sinks ───────────────────────────────────────────────────────

    fn drain_into<W: Write>(
        &self,
        schema: &TableSchema,
        out: W,
        format: &OutputFormat,
        segment: Option<Segment>,
        max_items: Option<u64>,
    ) -> Result<(TransferStats, W)> {
        let options = self.scan_options(schema, segment, None, max_items);
        let mut writer = FormatWriter::new(out, format.clone(), self.settings.on_unencodable);
        writer.begin()?;

        let mut stats = self.scanner().drain(&schema.name, &options, |page, _| {
            for record in &page.records {
                writer.write(record)?;
            }
            Ok(())
        })?;

        self.phase(OPERATION, Phase::Finalizing);
        stats.records = writer.written() as u64;
        stats.skipped = writer.skipped() as u64;
        let out = writer.finish()?;
        tracing::info!(table = schema.name.as_str(), segment = ?segment, %stats, "export finished");
        Ok((stats, out))
    }

    fn drain_to_bucket(
        &self,
        schema: &TableSchema,
        bucket: &str,
        format: &OutputFormat,
        segment: Option<Segment>,
    ) -> Result<TransferStats> {
        if !format.is_line_oriented() {
            return Err(DynoError::UnsupportedFormat(format!(
                "{} (bucket exports take line-json or native)",
                format.name()
            )));
        }
        let store = self.object_store()?;
        let options = self.scan_options(schema, segment, None, None);
        let mut page_number = 0u64;
        let mut written = 0u64;
        let mut skipped = 0u64;

        let mut stats = self.scanner().drain(&schema.name, &options, |page, _| {
            page_number += 1;
            let mut writer = FormatWriter::new(Vec::new(), format.clone(), self.settings.on_unencodable);
            for record in &page.records {
                writer.write(record)?;
            }
            written += writer.written() as u64;
            skipped += writer.skipped() as u64;
            let body = writer.finish()?;
            if !body.is_empty() {
                let key = page_object_key(&schema.name, page_number, segment);
                store.put_object(bucket, &key, body)?;
                tracing::debug!(bucket, key = key.as_str(), "page object written");
            }
            Ok(())
        })?;

        self.phase(OPERATION, Phase::Finalizing);
        stats.records = written;
        stats.skipped = skipped;
        Ok(stats)
    }

    fn export_segmented_files(
        &self,
        schema: &TableSchema,
        base: &Path,
        format: &OutputFormat,
        total: u32,
    ) -> Result<TransferStats> {
        let segments = Segment::all(total)?;
        let mut stats = TransferStats::start();
        self.phase(OPERATION, Phase::Scanning);

        let parts = segments
            .into_par_iter()
            .map(|segment| -> Result<TransferStats> {
                let path = segment_path(base, segment);
                let file = BufWriter::new(File::create(&path)?);
                let (part, _) = self.drain_into(schema, file, format, Some(segment), None)?;
                tracing::info!(segment = segment.index, path = %path.display(), records = part.records, "segment exported");
                Ok(part)
            })
            .collect::<Result<Vec<_>>>()?;

        for part in &parts {
            stats.absorb(part);
        }
        Ok(stats.finish())
    }

    fn export_segmented_bucket(
        &self,
        schema: &TableSchema,
        bucket: &str,
        format: &OutputFormat,
        total: u32,
    ) -> Result<TransferStats> {
        let segments = Segment::all(total)?;
        let mut stats = TransferStats::start();
        self.phase(OPERATION, Phase::Scanning);

        let parts = segments
            .into_par_iter()
            .map(|segment| self.drain_to_bucket(schema, bucket, format, Some(segment)))
            .collect::<Result<Vec<_>>>()?;

        for part in &parts {
            stats.absorb(part);
        }
        Ok(stats.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::output::DelimitedLayout;
    use crate::codec::UnencodablePolicy;
    use crate::memory::{MemoryClient, MemoryObjectStore};
    use crate::orchestrator::test_support::{Phases, Recorder};
    use crate::orchestrator::TransferSettings;
    use crate::progress::SilentProgress;
    use crate::target::ObjectStore;
    use crate::types::{TaggedRecord, TaggedValue};

    fn seeded(count: usize) -> MemoryClient {
        let client = MemoryClient::new().with_page_size(4);
        client.create_table_with(TableSchema::simple("users", "id", None)).unwrap();
        for i in 0..count {
            let mut record = TaggedRecord::new();
            record.insert("id".into(), TaggedValue::S(format!("u{:02}", i)));
            record.insert("age".into(), TaggedValue::N((20 + i).to_string()));
            client.insert("users", record).unwrap();
        }
        client
    }

    #[test]
    fn test_json_array_export_is_valid_json() {
        let client = seeded(6);
        let sleeper = Recorder::default();
        let phases = Phases::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &phases);

        let (stats, out) = orchestrator
            .export_to_writer("users", Vec::new(), &OutputFormat::JsonArray, None)
            .unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 6);
        assert_eq!(parsed[0]["id"], "u00");
        assert_eq!(stats.records, 6);
        assert_eq!(
            *phases.0.lock().unwrap(),
            vec![Phase::Describing, Phase::Scanning, Phase::Finalizing, Phase::Done]
        );
    }

    #[test]
    fn test_empty_table_json_array() {
        let client = seeded(0);
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);
        let (_, out) = orchestrator
            .export_to_writer("users", Vec::new(), &OutputFormat::JsonArray, None)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[\n\n]");
    }

    #[test]
    fn test_missing_table_aborts() {
        let client = MemoryClient::new();
        let sleeper = Recorder::default();
        let phases = Phases::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &phases);
        let err = orchestrator
            .export_to_writer("nope", Vec::new(), &OutputFormat::LineJson, None)
            .unwrap_err();
        assert!(matches!(err, DynoError::TableNotFound(_)));
        assert_eq!(phases.0.lock().unwrap().last(), Some(&Phase::Aborted));
    }

    #[test]
    fn test_skip_policy_counts_skipped_records() {
        let client = seeded(3);
        let mut bad = TaggedRecord::new();
        bad.insert("id".into(), TaggedValue::S("zz".into()));
        bad.insert("tags".into(), TaggedValue::Ss(vec!["a".into()]));
        client.insert("users", bad).unwrap();
        let layout = DelimitedLayout::new(vec!["id".into(), "tags".into()], b',').unwrap();
        let settings = TransferSettings {
            on_unencodable: UnencodablePolicy::Skip,
            ..TransferSettings::default()
        };
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, settings, &sleeper, &SilentProgress);

        let (stats, out) = orchestrator
            .export_to_writer("users", Vec::new(), &OutputFormat::Delimited(layout), None)
            .unwrap();

        assert_eq!(stats.records, 3);
        assert_eq!(stats.skipped, 1);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 4);
    }

    #[test]
    fn test_bucket_export_one_object_per_page() {
        let client = seeded(10);
        let store = MemoryObjectStore::new();
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress)
            .with_object_store(&store);

        let stats = orchestrator
            .export(
                "users",
                &Target::Bucket("dumps".into()),
                &OutputFormat::Native,
                ExportMode::Sequential,
            )
            .unwrap();

        assert_eq!(stats.records, 10);
        assert_eq!(
            store.list_objects("dumps").unwrap(),
            vec!["users_1-1.json", "users_2-1.json", "users_3-1.json"]
        );
    }

    #[test]
    fn test_bucket_export_rejects_json_array() {
        let client = seeded(1);
        let store = MemoryObjectStore::new();
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress)
            .with_object_store(&store);
        let err = orchestrator
            .export(
                "users",
                &Target::Bucket("dumps".into()),
                &OutputFormat::JsonArray,
                ExportMode::Sequential,
            )
            .unwrap_err();
        assert!(matches!(err, DynoError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_segmented_file_export_covers_table() {
        let client = seeded(25);
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("users.json");
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);

        let stats = orchestrator
            .export(
                "users",
                &Target::File(base.clone()),
                &OutputFormat::LineJson,
                ExportMode::Segmented(3),
            )
            .unwrap();

        let mut lines = 0;
        for index in 0..3 {
            let path = segment_path(&base, Segment::new(index, 3).unwrap());
            lines += std::fs::read_to_string(path).unwrap().lines().count();
        }
        assert_eq!(lines, 25);
        assert_eq!(stats.records, 25);
    }
}
