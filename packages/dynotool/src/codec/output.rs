//! Output encodings for exported records.
//!
//! `encode_for_output` renders one record as a self-contained fragment;
//! `FormatWriter` owns the stream-level syntax around those fragments
//! (the `[` / `]` of a JSON array, the header of a delimited file) and
//! applies the unencodable-record policy.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::codec::{decode, record_to_json, wire};
use crate::error::{DynoError, Result};
use crate::types::{PlainRecord, PlainValue, TaggedRecord};

/// Column projection for delimited rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelimitedLayout {
    pub columns: Vec<String>,
    pub delimiter: u8,
}

impl DelimitedLayout {
    pub fn new(columns: Vec<String>, delimiter: u8) -> Result<Self> {
        if columns.is_empty() {
            return Err(DynoError::InvalidArgument(
                "delimited-row output needs at least one column".to_string(),
            ));
        }
        Ok(Self { columns, delimiter })
    }
}

/// Supported record encodings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON object per line.
    LineJson,
    /// A single JSON array, streamed element by element.
    JsonArray,
    /// Header row plus one delimited row per record.
    Delimited(DelimitedLayout),
    /// One tagged (wire-form) JSON object per line. Lossless.
    Native,
}

impl OutputFormat {
    /// Parse a format name. `delimited-row` gets its layout separately.
    pub fn parse(name: &str, layout: Option<DelimitedLayout>) -> Result<Self> {
        match name {
            "line-json" | "jsonl" => Ok(OutputFormat::LineJson),
            "json-array" | "json" => Ok(OutputFormat::JsonArray),
            "native" => Ok(OutputFormat::Native),
            "delimited-row" | "csv" => layout.map(OutputFormat::Delimited).ok_or_else(|| {
                DynoError::InvalidArgument("delimited-row output needs a column list".to_string())
            }),
            other => Err(DynoError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::LineJson => "line-json",
            OutputFormat::JsonArray => "json-array",
            OutputFormat::Delimited(_) => "delimited-row",
            OutputFormat::Native => "native",
        }
    }

    /// Extension appended to file targets given without one.
    pub fn default_extension(&self) -> &'static str {
        match self {
            OutputFormat::Delimited(_) => "csv",
            _ => "json",
        }
    }

    /// True when every record is a standalone line (safe to split across objects).
    pub fn is_line_oriented(&self) -> bool {
        matches!(self, OutputFormat::LineJson | OutputFormat::Native)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What to do with a record that cannot be decoded or encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnencodablePolicy {
    /// Fail the whole transfer on the first bad record.
    #[default]
    Abort,
    /// Log the record and continue.
    Skip,
}

impl FromStr for UnencodablePolicy {
    type Err = DynoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "abort" => Ok(UnencodablePolicy::Abort),
            "skip" => Ok(UnencodablePolicy::Skip),
            other => Err(DynoError::InvalidArgument(format!(
                "unknown unencodable policy '{}', expected abort or skip",
                other
            ))),
        }
    }
}

// ── Fragments ───────────────────────────────────────────────────────

/// Render one record as a fragment of the target encoding.
///
/// `prior_index` is the number of records already written to the stream;
/// json-array uses it to decide whether a separating comma is needed.
/// Returns `Ok(None)` when a delimited row cannot be formed from the
/// record (a projected cell holds a collection); that record is skipped.
pub fn encode_for_output(
    record: &PlainRecord,
    format: &OutputFormat,
    prior_index: usize,
) -> Result<Option<String>> {
    match format {
        OutputFormat::LineJson => {
            let json = serde_json::to_string(&record_to_json(record)?)?;
            Ok(Some(format!("{}\n", json)))
        }
        OutputFormat::JsonArray => {
            let json = serde_json::to_string(&record_to_json(record)?)?;
            if prior_index == 0 {
                Ok(Some(format!("  {}", json)))
            } else {
                Ok(Some(format!(",\n  {}", json)))
            }
        }
        OutputFormat::Delimited(layout) => delimited_row(record, layout),
        OutputFormat::Native => {
            let tagged = crate::codec::encode(record);
            Ok(Some(encode_native(&tagged)?))
        }
    }
}

/// One tagged record per line.
pub fn encode_native(record: &TaggedRecord) -> Result<String> {
    Ok(format!("{}\n", serde_json::to_string(&wire::record_to_json(record))?))
}

fn delimited_row(record: &PlainRecord, layout: &DelimitedLayout) -> Result<Option<String>> {
    let mut cells = Vec::with_capacity(layout.columns.len());
    for column in &layout.columns {
        match record.get(column) {
            None => cells.push(String::new()),
            Some(value) => match delimited_cell(value) {
                Some(cell) => cells.push(cell),
                None => {
                    tracing::warn!(
                        column = column.as_str(),
                        "skipping record: column holds a collection and cannot form a row"
                    );
                    return Ok(None);
                }
            },
        }
    }
    delimited_line(&cells, layout.delimiter).map(Some)
}

fn delimited_cell(value: &PlainValue) -> Option<String> {
    match value {
        PlainValue::Null => Some(String::new()),
        PlainValue::Bool(b) => Some(b.to_string()),
        PlainValue::Number(n) => Some(n.clone()),
        PlainValue::String(s) => Some(s.clone()),
        PlainValue::Binary(b) => Some(STANDARD.encode(b)),
        PlainValue::StringSet(_)
        | PlainValue::NumberSet(_)
        | PlainValue::BinarySet(_)
        | PlainValue::List(_)
        | PlainValue::Map(_) => None,
    }
}

fn delimited_line(cells: &[String], delimiter: u8) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(cells)?;
    let bytes = writer
        .into_inner()
        .map_err(|e| DynoError::Io(e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| DynoError::Encoding(e.to_string()))
}

// ── Stream Writer ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Skipped,
}

/// Streams records into `out` in one output format.
///
/// Call `begin` once, `write` per record, then `finish`. Nothing is
/// buffered beyond the underlying writer.
pub struct FormatWriter<W: Write> {
    out: W,
    format: OutputFormat,
    policy: UnencodablePolicy,
    written: usize,
    skipped: usize,
}

impl<W: Write> FormatWriter<W> {
    pub fn new(out: W, format: OutputFormat, policy: UnencodablePolicy) -> Self {
        Self {
            out,
            format,
            policy,
            written: 0,
            skipped: 0,
        }
    }

    /// Write the stream prologue (`[` or the header row).
    pub fn begin(&mut self) -> Result<()> {
        match &self.format {
            OutputFormat::JsonArray => self.out.write_all(b"[\n")?,
            OutputFormat::Delimited(layout) => {
                let header = delimited_line(&layout.columns, layout.delimiter)?;
                self.out.write_all(header.as_bytes())?;
            }
            OutputFormat::LineJson | OutputFormat::Native => {}
        }
        Ok(())
    }

    /// Encode and write one record.
    pub fn write(&mut self, record: &TaggedRecord) -> Result<WriteOutcome> {
        let fragment = match self.render(record) {
            Ok(fragment) => fragment,
            Err(err) if self.policy == UnencodablePolicy::Skip && is_record_error(&err) => {
                tracing::warn!(error = %err, record = ?record_keys(record), "skipping unencodable record");
                None
            }
            Err(err) => return Err(err),
        };

        match fragment {
            Some(fragment) => {
                self.out.write_all(fragment.as_bytes())?;
                self.written += 1;
                Ok(WriteOutcome::Written)
            }
            None => {
                self.skipped += 1;
                Ok(WriteOutcome::Skipped)
            }
        }
    }

    fn render(&self, record: &TaggedRecord) -> Result<Option<String>> {
        if self.format == OutputFormat::Native {
            return encode_native(record).map(Some);
        }
        let plain = decode(record)?;
        encode_for_output(&plain, &self.format, self.written)
    }

    /// Write the epilogue, flush, and hand back the writer.
    pub fn finish(mut self) -> Result<W> {
        if self.format == OutputFormat::JsonArray {
            self.out.write_all(b"\n]")?;
        }
        self.out.flush()?;
        Ok(self.out)
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

fn is_record_error(err: &DynoError) -> bool {
    matches!(err, DynoError::Encoding(_) | DynoError::UnsupportedTag(_))
}

fn record_keys(record: &TaggedRecord) -> Vec<&str> {
    record.keys().map(String::as_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaggedValue;

    fn tagged(pairs: &[(&str, TaggedValue)]) -> TaggedRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn layout(columns: &[&str]) -> OutputFormat {
        OutputFormat::Delimited(
            DelimitedLayout::new(columns.iter().map(|c| c.to_string()).collect(), b',').unwrap(),
        )
    }

    fn render(format: OutputFormat, records: &[TaggedRecord]) -> String {
        let mut writer = FormatWriter::new(Vec::new(), format, UnencodablePolicy::Abort);
        writer.begin().unwrap();
        for record in records {
            writer.write(record).unwrap();
        }
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn test_json_array_empty() {
        let text = render(OutputFormat::JsonArray, &[]);
        assert_eq!(text, "[\n\n]");
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, serde_json::json!([]));
    }

    #[test]
    fn test_json_array_single_has_no_trailing_comma() {
        let text = render(OutputFormat::JsonArray, &[tagged(&[("id", TaggedValue::S("a".into()))])]);
        assert_eq!(text, "[\n  {\"id\":\"a\"}\n]");
        assert!(!text.contains(','));
    }

    #[test]
    fn test_json_array_many_is_valid() {
        let records: Vec<TaggedRecord> = (0..3)
            .map(|i| tagged(&[("n", TaggedValue::N(i.to_string()))]))
            .collect();
        let parsed: serde_json::Value =
            serde_json::from_str(&render(OutputFormat::JsonArray, &records)).unwrap();
        assert_eq!(parsed, serde_json::json!([{"n": 0}, {"n": 1}, {"n": 2}]));
    }

    #[test]
    fn test_line_json_one_object_per_line() {
        let records = vec![
            tagged(&[("id", TaggedValue::S("a".into()))]),
            tagged(&[("id", TaggedValue::S("b".into())), ("ok", TaggedValue::Bool(true))]),
        ];
        let text = render(OutputFormat::LineJson, &records);
        assert_eq!(text, "{\"id\":\"a\"}\n{\"id\":\"b\",\"ok\":true}\n");
    }

    #[test]
    fn test_delimited_missing_column_is_empty_cell() {
        let record = tagged(&[("id", TaggedValue::S("a".into())), ("extra", TaggedValue::N("9".into()))]);
        let text = render(layout(&["id", "name", "age"]), &[record]);
        assert_eq!(text, "id,name,age\na,,\n");
    }

    #[test]
    fn test_delimited_quotes_per_standard_rules() {
        let record = tagged(&[("id", TaggedValue::S("a,b".into())), ("note", TaggedValue::S("say \"hi\"".into()))]);
        let text = render(layout(&["id", "note"]), &[record]);
        assert_eq!(text, "id,note\n\"a,b\",\"say \"\"hi\"\"\"\n");
    }

    #[test]
    fn test_delimited_collection_cell_skips_row() {
        let mut writer = FormatWriter::new(Vec::new(), layout(&["id", "tags"]), UnencodablePolicy::Abort);
        writer.begin().unwrap();
        let bad = tagged(&[("id", TaggedValue::S("a".into())), ("tags", TaggedValue::Ss(vec!["x".into()]))]);
        let good = tagged(&[("id", TaggedValue::S("b".into()))]);
        assert_eq!(writer.write(&bad).unwrap(), WriteOutcome::Skipped);
        assert_eq!(writer.write(&good).unwrap(), WriteOutcome::Written);
        assert_eq!(writer.skipped(), 1);
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        assert_eq!(text, "id,tags\nb,\n");
    }

    #[test]
    fn test_delimited_custom_delimiter() {
        let format = OutputFormat::Delimited(DelimitedLayout::new(vec!["a".into(), "b".into()], b'\t').unwrap());
        let record = tagged(&[("a", TaggedValue::N("1".into())), ("b", TaggedValue::Bool(false))]);
        assert_eq!(render(format, &[record]), "a\tb\n1\tfalse\n");
    }

    #[test]
    fn test_unencodable_aborts_by_default() {
        let bad = tagged(&[("n", TaggedValue::N("not-a-number".into()))]);
        let mut writer = FormatWriter::new(Vec::new(), OutputFormat::LineJson, UnencodablePolicy::Abort);
        writer.begin().unwrap();
        assert!(matches!(writer.write(&bad), Err(DynoError::Encoding(_))));
    }

    #[test]
    fn test_unencodable_skipped_when_requested() {
        let bad = tagged(&[("n", TaggedValue::N("not-a-number".into()))]);
        let good = tagged(&[("n", TaggedValue::N("2".into()))]);
        let mut writer = FormatWriter::new(Vec::new(), OutputFormat::JsonArray, UnencodablePolicy::Skip);
        writer.begin().unwrap();
        assert_eq!(writer.write(&bad).unwrap(), WriteOutcome::Skipped);
        assert_eq!(writer.write(&good).unwrap(), WriteOutcome::Written);
        let text = String::from_utf8(writer.finish().unwrap()).unwrap();
        // The skipped record must not leave a dangling separator.
        assert_eq!(text, "[\n  {\"n\":2}\n]");
    }

    #[test]
    fn test_native_is_tagged() {
        let record = tagged(&[("s", TaggedValue::Ss(vec!["x".into()]))]);
        assert_eq!(render(OutputFormat::Native, &[record]), "{\"s\":{\"SS\":[\"x\"]}}\n");
    }

    #[test]
    fn test_parse_format_names() {
        assert_eq!(OutputFormat::parse("line-json", None).unwrap(), OutputFormat::LineJson);
        assert_eq!(OutputFormat::parse("json-array", None).unwrap(), OutputFormat::JsonArray);
        assert!(matches!(
            OutputFormat::parse("parquet", None),
            Err(DynoError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            OutputFormat::parse("delimited-row", None),
            Err(DynoError::InvalidArgument(_))
        ));
    }
}
