//! The database collaborator.
//!
//! Every component receives an explicit `&dyn TableClient`; there is no
//! process-wide client. Calls are blocking and each one is a single
//! round trip: no retries happen below this trait, so the drivers above
//! it own the backoff policy.

use crate::error::Result;
use crate::types::{PageResult, ScanFilter, Segment, TableSchema, TableStatus, TaggedRecord, WriteRequest};

/// Hard per-request limit of the batch write API.
pub const MAX_BATCH_WRITE: usize = 25;

/// Parameters of one scan round trip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanRequest {
    pub table: String,
    /// Exclusive start key from the previous page.
    pub continuation: Option<TaggedRecord>,
    pub segment: Option<Segment>,
    pub filter: Option<ScanFilter>,
    /// Upper bound on records evaluated by this request.
    pub limit: Option<u32>,
}

impl ScanRequest {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }
}

/// One page of table names.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TableNamePage {
    pub names: Vec<String>,
    /// Last name of this page when more pages follow.
    pub last_evaluated: Option<String>,
}

/// Narrow contract the engine needs from the database service.
pub trait TableClient: Send + Sync {
    /// Describe a table; `Ok(None)` when it does not exist.
    fn describe_table(&self, table: &str) -> Result<Option<TableSchema>>;

    /// One page of table names starting after `start`.
    fn list_tables(&self, start: Option<&str>) -> Result<TableNamePage>;

    fn scan(&self, request: &ScanRequest) -> Result<PageResult>;

    fn put_item(&self, table: &str, item: &TaggedRecord) -> Result<()>;

    /// Submit up to `MAX_BATCH_WRITE` mutations; returns the subset the
    /// service did not apply.
    fn batch_write(&self, table: &str, requests: &[WriteRequest]) -> Result<Vec<WriteRequest>>;

    /// Create a table from `schema` (its `name` is the new table's name).
    fn create_table(&self, schema: &TableSchema) -> Result<TableStatus>;

    fn delete_table(&self, table: &str) -> Result<()>;
}
