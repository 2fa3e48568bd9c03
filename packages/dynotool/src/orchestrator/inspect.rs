//! Read-only commands: list, info, head.

use std::fmt;
use std::io::Write;

use super::TransferOrchestrator;
use crate::codec::OutputFormat;
use crate::error::Result;
use crate::stats::TransferStats;
use crate::types::{BillingMode, TableSchema, TableStatus};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One row of `list` output.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSummary {
    pub name: String,
    pub status: TableStatus,
    pub item_count: i64,
    pub size_bytes: i64,
}

impl From<&TableSchema> for TableSummary {
    fn from(schema: &TableSchema) -> Self {
        Self {
            name: schema.name.clone(),
            status: schema.status.clone(),
            item_count: schema.item_count,
            size_bytes: schema.size_bytes,
        }
    }
}

impl fmt::Display for TableSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<40} {} ~{:>10} records ({:.2} mb)",
            self.name,
            self.status,
            self.item_count,
            self.size_bytes as f64 / BYTES_PER_MB
        )
    }
}

impl<'a> TransferOrchestrator<'a> {
    /// Summaries of every table, following list pagination to the end.
    /// Tables that vanish between list and describe are left out.
    pub fn list(&self) -> Result<Vec<TableSummary>> {
        let admin = self.admin();
        let mut summaries = Vec::new();
        for name in admin.list_all()? {
            match admin.try_describe(&name)? {
                Some(schema) => summaries.push(TableSummary::from(&schema)),
                None => tracing::debug!(table = name.as_str(), "table disappeared while listing"),
            }
        }
        Ok(summaries)
    }

    pub fn info(&self, table: &str) -> Result<TableSchema> {
        self.admin().describe(table)
    }

    /// First `limit` records of `table` as line-json.
    pub fn head<W: Write>(&self, table: &str, limit: u64, out: W) -> Result<(TransferStats, W)> {
        self.export_to_writer(table, out, &OutputFormat::LineJson, Some(limit))
    }
}

/// Human-readable `info` report.
pub fn render_info(schema: &TableSchema) -> String {
    let mut lines = vec![
        format!("Table {} is {}", schema.name, schema.status),
        format!(
            "   Contains roughly {} items and {:.2} MB",
            schema.item_count,
            schema.size_bytes as f64 / BYTES_PER_MB
        ),
    ];
    let keys: Vec<String> = schema
        .key_schema
        .iter()
        .map(|k| format!("{} ({})", k.attribute, k.key_type.as_str()))
        .collect();
    lines.push(format!("   Key: {}", keys.join(", ")));
    match schema.billing_mode {
        BillingMode::PayPerRequest => lines.push("   Billing: on-demand".to_string()),
        BillingMode::Provisioned => lines.push(format!(
            "   Throughput: {} read / {} write capacity units",
            schema.throughput.read_capacity, schema.throughput.write_capacity
        )),
    }
    for index in &schema.global_indexes {
        lines.push(format!("   Global index: {}", index.name));
    }
    for index in &schema.local_indexes {
        lines.push(format!("   Local index: {}", index.name));
    }
    if let Some(stream) = schema.stream.as_ref().filter(|s| s.enabled) {
        lines.push(format!(
            "   Stream: {}",
            stream.view_type.as_deref().unwrap_or("enabled")
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryClient;
    use crate::orchestrator::test_support::Recorder;
    use crate::orchestrator::TransferSettings;
    use crate::progress::SilentProgress;
    use crate::types::{TaggedRecord, TaggedValue};

    fn client() -> MemoryClient {
        let client = MemoryClient::new().with_list_page(2).with_page_size(8);
        for name in ["alpha", "beta", "gamma"] {
            client.create_table_with(TableSchema::simple(name, "id", None)).unwrap();
        }
        for i in 0..30 {
            let mut record = TaggedRecord::new();
            record.insert("id".into(), TaggedValue::S(format!("r{:02}", i)));
            client.insert("beta", record).unwrap();
        }
        client
    }

    #[test]
    fn test_list_paginates_fully() {
        let client = client();
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);

        let summaries = orchestrator.list().unwrap();

        let names: Vec<&str> = summaries.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);
        assert_eq!(summaries[1].item_count, 30);
        assert!(summaries[0].to_string().starts_with("alpha"));
    }

    #[test]
    fn test_head_limits_records() {
        let client = client();
        let sleeper = Recorder::default();
        let orchestrator = TransferOrchestrator::new(&client, TransferSettings::default(), &sleeper, &SilentProgress);

        let (stats, out) = orchestrator.head("beta", 20, Vec::new()).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 20);
        assert_eq!(text.lines().next(), Some("{\"id\":\"r00\"}"));
        assert_eq!(stats.records, 20);
        assert_eq!(stats.requests, 3);
    }

    #[test]
    fn test_render_info() {
        let schema = TableSchema::simple("users", "id", Some("ts"));
        let text = render_info(&schema);
        assert!(text.starts_with("Table users is ACTIVE"));
        assert!(text.contains("id (HASH), ts (RANGE)"));
        assert!(text.contains("5 read / 5 write"));
    }
}
