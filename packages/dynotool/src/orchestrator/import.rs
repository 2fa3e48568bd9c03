//! Import: Describing -> Reading -> Writing -> Done.
//!
//! The whole source is parsed before the first write, so a malformed
//! record anywhere in the input aborts the run with nothing written.

use serde_json::Value;

use super::TransferOrchestrator;
use crate::codec::{self, wire, OutputFormat};
use crate::error::{DynoError, Result};
use crate::progress::Phase;
use crate::stats::TransferStats;
use crate::target::Target;
use crate::types::{TaggedRecord, WriteRequest};

const OPERATION: &str = "import";

impl<'a> TransferOrchestrator<'a> {
    /// Load every record from `source` and batch-write it into `table`.
    pub fn import(&self, table: &str, source: &Target, format: &OutputFormat) -> Result<TransferStats> {
        self.run(OPERATION, || {
            if let OutputFormat::Delimited(_) = format {
                return Err(DynoError::UnsupportedFormat(
                    "delimited-row input cannot be imported".to_string(),
                ));
            }
            self.phase(OPERATION, Phase::Describing);
            self.admin().describe(table)?;

            self.phase(OPERATION, Phase::Reading);
            let records = self.read_source(source, format)?;
            tracing::info!(table, source = %source, records = records.len(), "input loaded");

            self.phase(OPERATION, Phase::Writing);
            let writer = self.writer(table)?;
            let stats = writer.drain(records.into_iter().map(WriteRequest::Put))?;
            tracing::info!(table, %stats, "import finished");
            Ok(stats)
        })
    }

    fn read_source(&self, source: &Target, format: &OutputFormat) -> Result<Vec<TaggedRecord>> {
        match source {
            Target::File(path) => {
                let text = std::fs::read_to_string(path)?;
                parse_records(&text, format)
            }
            Target::Bucket(bucket) => {
                let store = self.object_store()?;
                let mut records = Vec::new();
                for key in store.list_objects(bucket)? {
                    tracing::debug!(bucket = bucket.as_str(), key = key.as_str(), "reading object");
                    let body = store.get_object(bucket, &key)?;
                    let text = String::from_utf8(body).map_err(|e| DynoError::MalformedRecord {
                        line: 1,
                        reason: format!("{}: {}", key, e),
                    })?;
                    let parsed = parse_records(&text, format).map_err(|err| match err {
                        DynoError::MalformedRecord { line, reason } => DynoError::MalformedRecord {
                            line,
                            reason: format!("{}: {}", key, reason),
                        },
                        other => other,
                    })?;
                    records.extend(parsed);
                }
                Ok(records)
            }
        }
    }
}

/// Parse import input into tagged records.
///
/// Line numbers in `MalformedRecord` are 1-based; for json-array input
/// they count array elements.
pub fn parse_records(text: &str, format: &OutputFormat) -> Result<Vec<TaggedRecord>> {
    match format {
        OutputFormat::LineJson => parse_lines(text, |value| {
            codec::record_from_json(value).map(|plain| codec::encode(&plain))
        }),
        OutputFormat::Native => parse_lines(text, |value| wire::record_from_json(&value)),
        OutputFormat::JsonArray => {
            let doc: Value = serde_json::from_str(text).map_err(|e| DynoError::MalformedRecord {
                line: e.line(),
                reason: e.to_string(),
            })?;
            let items = match doc {
                Value::Array(items) => items,
                other => {
                    return Err(DynoError::MalformedRecord {
                        line: 1,
                        reason: format!("expected a JSON array, found {}", codec::json_kind(&other)),
                    })
                }
            };
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| {
                    codec::record_from_json(item)
                        .map(|plain| codec::encode(&plain))
                        .map_err(|e| malformed(index + 1, e))
                })
                .collect()
        }
        OutputFormat::Delimited(_) => Err(DynoError::UnsupportedFormat(
            "delimited-row input cannot be imported".to_string(),
        )),
    }
}

fn parse_lines<F>(text: &str, mut convert: F) -> Result<Vec<TaggedRecord>>
where
    F: FnMut(Value) -> Result<TaggedRecord>,
{
    let mut records = Vec::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| malformed(index + 1, e.into()))?;
        records.push(convert(value).map_err(|e| malformed(index + 1, e))?);
    }
    Ok(records)
}

/// Wrap a per-record failure with its position. Unknown tags keep their
/// own error so the offending tag stays visible.
fn malformed(line: usize, err: DynoError) -> DynoError {
    match err {
        DynoError::UnsupportedTag(_) => err,
        other => DynoError::MalformedRecord {
            line,
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryClient, MemoryObjectStore};
    use crate::orchestrator::test_support::{Phases, Recorder};
    use crate::orchestrator::TransferSettings;
    use crate::progress::SilentProgress;
    use crate::target::ObjectStore;
    use crate::types::{TableSchema, TaggedValue};
    use std::io::Write;

    fn empty_table() -> MemoryClient {
        let client = MemoryClient::new();
        client.create_table_with(TableSchema::simple("users", "id", None)).unwrap();
        client
    }

    #[test]
    fn test_parse_line_json_keeps_number_text() {
        let records = parse_records("{\"id\":\"a\",\"n\":1.10}\n\n{\"id\":\"b\"}\n", &OutputFormat::LineJson).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("n"), Some(&TaggedValue::N("1.10".into())));
    }

    #[test]
    fn test_parse_reports_line_number() {
        let err = parse_records("{\"id\":\"a\"}\n{\"id\":\n", &OutputFormat::LineJson).unwrap_err();
        assert!(matches!(err, DynoError::MalformedRecord { line: 2, .. }));

        let err = parse_records("{\"id\":\"a\"}\n[1]\n", &OutputFormat::LineJson).unwrap_err();
        assert!(matches!(err, DynoError::MalformedRecord { line: 2, .. }));
    }

    #[test]
    fn test_parse_json_array() {
        let records = parse_records("[\n  {\"id\":\"a\"},\n  {\"id\":\"b\"}\n]", &OutputFormat::JsonArray).unwrap();
        assert_eq!(records.len(), 2);
        let err = parse_records("{\"id\":\"a\"}", &OutputFormat::JsonArray).unwrap_err();
        assert!(matches!(err, DynoError::MalformedRecord { line: 1, .. }));
    }

    #[test]
    fn test_parse_native_unknown_tag() {
        let err = parse_records("{\"id\":{\"S\":\"a\"},\"v\":{\"XX\":1}}\n", &OutputFormat::Native).unwrap_err();
        assert!(matches!(err, DynoError::UnsupportedTag(_)));
    }

    #[test]
    fn test_import_file_writes_in_batches() {
        let client = empty_table();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..60 {
            writeln!(file, "{{\"id\":\"u{:02}\",\"n\":{}}}", i, i).unwrap();
        }
        let sleeper = Recorder::default();
        let phases = Phases::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &phases);

        let stats = orchestrator
            .import("users", &Target::File(file.path().to_path_buf()), &OutputFormat::LineJson)
            .unwrap();

        assert_eq!(stats.records, 60);
        assert_eq!(client.calls().batch_sizes, vec![25, 25, 10]);
        assert_eq!(
            *phases.0.lock().unwrap(),
            vec![Phase::Describing, Phase::Reading, Phase::Writing, Phase::Done]
        );
    }

    #[test]
    fn test_malformed_input_writes_nothing() {
        let client = empty_table();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{{\"id\":\"a\"}}").unwrap();
        writeln!(file, "not json").unwrap();
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);

        let err = orchestrator
            .import("users", &Target::File(file.path().to_path_buf()), &OutputFormat::LineJson)
            .unwrap_err();

        assert!(matches!(err, DynoError::MalformedRecord { line: 2, .. }));
        assert_eq!(client.calls().batch_writes, 0);
    }

    #[test]
    fn test_delimited_import_unsupported() {
        let client = empty_table();
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);
        let layout = crate::codec::output::DelimitedLayout::new(vec!["id".into()], b',').unwrap();
        let err = orchestrator
            .import("users", &Target::File("x.csv".into()), &OutputFormat::Delimited(layout))
            .unwrap_err();
        assert!(matches!(err, DynoError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_import_from_bucket_reads_every_object() {
        let client = empty_table();
        let store = MemoryObjectStore::new();
        store
            .put_object("dumps", "users_1-1.json", b"{\"id\":{\"S\":\"a\"}}\n{\"id\":{\"S\":\"b\"}}".to_vec())
            .unwrap();
        store.put_object("dumps", "users_2-1.json", b"{\"id\":{\"S\":\"c\"}}".to_vec()).unwrap();
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress)
            .with_object_store(&store);

        let stats = orchestrator
            .import("users", &Target::Bucket("dumps".into()), &OutputFormat::Native)
            .unwrap();

        assert_eq!(stats.records, 3);
        assert_eq!(client.items("users").len(), 3);
    }
}
