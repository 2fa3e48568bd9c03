//! In-process implementations of the collaborator traits.
//!
//! `MemoryClient` is a small table store with enough of the service's
//! behavior to drive the engine end to end: paged scans with
//! continuation keys, static segments, batch limits, create/delete with
//! an optional activation delay. Faults can be scripted per operation so
//! tests observe throttling, partial batches and fatal errors
//! deterministically.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use crate::client::{ScanRequest, TableClient, TableNamePage, MAX_BATCH_WRITE};
use crate::codec::wire;
use crate::error::{DynoError, Result};
use crate::launcher::RemoteInvoker;
use crate::target::ObjectStore;
use crate::types::{
    PageResult, ScanFilter, Segment, TableSchema, TableStatus, TaggedRecord, TaggedValue, WriteRequest,
};

/// Items evaluated per scan request when the caller sets no limit.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Table names returned per list request.
pub const DEFAULT_LIST_PAGE: usize = 100;

// ── Fault scripting ─────────────────────────────────────────────────

/// Scripted outcome of the next call to an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Behave normally.
    Ok,
    /// Reject with `ProvisionedThroughputExceededException`.
    Throttle,
    /// Reject with the given non-retryable service code.
    Fatal(String),
    /// Batch writes only: apply all but the last `n` requests and return those.
    Unprocessed(usize),
}

/// Calls observed by the store, failed ones included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallLog {
    pub scans: usize,
    pub puts: usize,
    pub batch_writes: usize,
    /// Request count of every batch write, in call order.
    pub batch_sizes: Vec<usize>,
    pub creates: usize,
    pub deletes: usize,
    pub describes: usize,
    pub list_tables: usize,
}

// ── Table store ─────────────────────────────────────────────────────

struct StoredTable {
    schema: TableSchema,
    items: BTreeMap<String, TaggedRecord>,
    /// Describe calls left before a freshly created table reports ACTIVE.
    pending_polls: u32,
}

#[derive(Default)]
struct State {
    tables: BTreeMap<String, StoredTable>,
    scan_faults: VecDeque<Fault>,
    batch_faults: VecDeque<Fault>,
    put_faults: VecDeque<Fault>,
    calls: CallLog,
}

pub struct MemoryClient {
    state: Mutex<State>,
    page_size: usize,
    list_page: usize,
    capacity_per_item: f64,
    activation_delay: u32,
}

impl Default for MemoryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: DEFAULT_PAGE_SIZE,
            list_page: DEFAULT_LIST_PAGE,
            capacity_per_item: 0.5,
            activation_delay: 0,
        }
    }

    /// Cap on items evaluated per scan, mirroring the service's 1 MB page limit.
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size.max(1);
        self
    }

    pub fn with_list_page(mut self, size: usize) -> Self {
        self.list_page = size.max(1);
        self
    }

    /// Consumed capacity reported per evaluated item.
    pub fn with_capacity_per_item(mut self, units: f64) -> Self {
        self.capacity_per_item = units;
        self
    }

    /// Number of describe calls a created table stays in CREATING.
    pub fn with_activation_delay(mut self, polls: u32) -> Self {
        self.activation_delay = polls;
        self
    }

    /// Register a table directly, ACTIVE immediately.
    pub fn create_table_with(&self, schema: TableSchema) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.tables.contains_key(&schema.name) {
            return Err(in_use(&schema.name));
        }
        let schema = TableSchema {
            status: TableStatus::Active,
            ..schema
        };
        state.tables.insert(
            schema.name.clone(),
            StoredTable {
                schema,
                items: BTreeMap::new(),
                pending_polls: 0,
            },
        );
        Ok(())
    }

    /// Store a record without consulting the fault script or the call log.
    pub fn insert(&self, table: &str, record: TaggedRecord) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let stored = state.tables.get_mut(table).ok_or_else(|| not_found("PutItem", table))?;
        let key = render_key(&stored.schema, &record, "PutItem")?;
        stored.items.insert(key, record);
        Ok(())
    }

    /// Snapshot of a table's records in key order; empty if the table is absent.
    pub fn items(&self, table: &str) -> Vec<TaggedRecord> {
        let state = self.state.lock().unwrap();
        state
            .tables
            .get(table)
            .map(|t| t.items.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.state.lock().unwrap().tables.contains_key(table)
    }

    /// Schema as last created, bypassing the call log.
    pub fn schema(&self, table: &str) -> Option<TableSchema> {
        let state = self.state.lock().unwrap();
        state.tables.get(table).map(|t| t.schema.clone())
    }

    pub fn script_scan(&self, faults: Vec<Fault>) {
        self.state.lock().unwrap().scan_faults.extend(faults);
    }

    pub fn script_batch(&self, faults: Vec<Fault>) {
        self.state.lock().unwrap().batch_faults.extend(faults);
    }

    pub fn script_put(&self, faults: Vec<Fault>) {
        self.state.lock().unwrap().put_faults.extend(faults);
    }

    pub fn calls(&self) -> CallLog {
        self.state.lock().unwrap().calls.clone()
    }

    fn capacity(&self, evaluated: usize) -> Option<f64> {
        if self.capacity_per_item > 0.0 {
            Some(evaluated as f64 * self.capacity_per_item)
        } else {
            None
        }
    }
}

impl TableClient for MemoryClient {
    fn describe_table(&self, table: &str) -> Result<Option<TableSchema>> {
        let mut state = self.state.lock().unwrap();
        state.calls.describes += 1;
        let Some(stored) = state.tables.get_mut(table) else {
            return Ok(None);
        };
        if stored.pending_polls > 0 {
            stored.pending_polls -= 1;
        } else {
            stored.schema.status = TableStatus::Active;
        }
        let mut schema = stored.schema.clone();
        schema.item_count = stored.items.len() as i64;
        schema.size_bytes = stored
            .items
            .values()
            .map(|r| wire::record_to_json(r).to_string().len() as i64)
            .sum();
        Ok(Some(schema))
    }

    fn list_tables(&self, start: Option<&str>) -> Result<TableNamePage> {
        let mut state = self.state.lock().unwrap();
        state.calls.list_tables += 1;
        let mut names: Vec<String> = state
            .tables
            .keys()
            .filter(|name| start.map_or(true, |s| name.as_str() > s))
            .take(self.list_page + 1)
            .cloned()
            .collect();
        let last_evaluated = if names.len() > self.list_page {
            names.truncate(self.list_page);
            names.last().cloned()
        } else {
            None
        };
        Ok(TableNamePage { names, last_evaluated })
    }

    fn scan(&self, request: &ScanRequest) -> Result<PageResult> {
        let mut state = self.state.lock().unwrap();
        state.calls.scans += 1;
        match state.scan_faults.pop_front() {
            Some(Fault::Throttle) => return Err(throttled("Scan")),
            Some(Fault::Fatal(code)) => return Err(injected("Scan", &code)),
            _ => {}
        }

        let stored = state
            .tables
            .get(&request.table)
            .ok_or_else(|| not_found("Scan", &request.table))?;
        let start = match &request.continuation {
            Some(token) => Some(render_key(&stored.schema, token, "Scan")?),
            None => None,
        };
        let limit = request
            .limit
            .map_or(self.page_size, |l| (l as usize).min(self.page_size))
            .max(1);

        let mut candidates = stored
            .items
            .iter()
            .filter(|(key, _)| start.as_ref().map_or(true, |s| key.as_str() > s.as_str()))
            .filter(|(key, _)| request.segment.map_or(true, |seg| segment_of(key, seg.total) == seg.index))
            .peekable();

        let mut records = Vec::new();
        let mut scanned = 0usize;
        let mut last_key = None;
        while scanned < limit {
            let Some((key, record)) = candidates.next() else {
                break;
            };
            scanned += 1;
            last_key = Some(key);
            if matches_filter(request.filter.as_ref(), record)? {
                records.push(record.clone());
            }
        }
        let continuation = match (last_key, candidates.peek()) {
            (Some(key), Some(_)) => {
                let last = &stored.items[key];
                Some(stored.schema.key_of(last)?)
            }
            _ => None,
        };

        Ok(PageResult {
            count: records.len(),
            records,
            continuation,
            consumed_capacity: self.capacity(scanned),
            scanned_count: scanned,
        })
    }

    fn put_item(&self, table: &str, item: &TaggedRecord) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.puts += 1;
        match state.put_faults.pop_front() {
            Some(Fault::Throttle) => return Err(throttled("PutItem")),
            Some(Fault::Fatal(code)) => return Err(injected("PutItem", &code)),
            _ => {}
        }
        let stored = state.tables.get_mut(table).ok_or_else(|| not_found("PutItem", table))?;
        let key = render_key(&stored.schema, item, "PutItem")?;
        stored.items.insert(key, item.clone());
        Ok(())
    }

    fn batch_write(&self, table: &str, requests: &[WriteRequest]) -> Result<Vec<WriteRequest>> {
        let mut state = self.state.lock().unwrap();
        state.calls.batch_writes += 1;
        state.calls.batch_sizes.push(requests.len());
        let fault = state.batch_faults.pop_front();
        match &fault {
            Some(Fault::Throttle) => return Err(throttled("BatchWriteItem")),
            Some(Fault::Fatal(code)) => return Err(injected("BatchWriteItem", code)),
            _ => {}
        }
        if requests.is_empty() || requests.len() > MAX_BATCH_WRITE {
            return Err(DynoError::from_service(
                "BatchWriteItem",
                Some("ValidationException"),
                format!("batch must hold 1..={} requests, got {}", MAX_BATCH_WRITE, requests.len()),
            ));
        }

        let stored = state
            .tables
            .get_mut(table)
            .ok_or_else(|| not_found("BatchWriteItem", table))?;
        // Validate the whole batch before applying any of it.
        let keyed = requests
            .iter()
            .map(|request| {
                let record = match request {
                    WriteRequest::Put(record) | WriteRequest::Delete(record) => record,
                };
                render_key(&stored.schema, record, "BatchWriteItem").map(|key| (key, request))
            })
            .collect::<Result<Vec<_>>>()?;

        let held = match fault {
            Some(Fault::Unprocessed(n)) => n.min(keyed.len()),
            _ => 0,
        };
        let applied = keyed.len() - held;
        for (key, request) in &keyed[..applied] {
            match request {
                WriteRequest::Put(record) => {
                    stored.items.insert(key.clone(), record.clone());
                }
                WriteRequest::Delete(_) => {
                    stored.items.remove(key);
                }
            }
        }
        Ok(requests[applied..].to_vec())
    }

    fn create_table(&self, schema: &TableSchema) -> Result<TableStatus> {
        let mut state = self.state.lock().unwrap();
        state.calls.creates += 1;
        if state.tables.contains_key(&schema.name) {
            return Err(in_use(&schema.name));
        }
        let status = if self.activation_delay > 0 {
            TableStatus::Creating
        } else {
            TableStatus::Active
        };
        let mut stored_schema = schema.clone();
        stored_schema.status = status.clone();
        state.tables.insert(
            schema.name.clone(),
            StoredTable {
                schema: stored_schema,
                items: BTreeMap::new(),
                pending_polls: self.activation_delay,
            },
        );
        Ok(status)
    }

    fn delete_table(&self, table: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.deletes += 1;
        state
            .tables
            .remove(table)
            .map(|_| ())
            .ok_or_else(|| not_found("DeleteTable", table))
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Sort key of a record: its key attributes in wire form, hash key first.
fn render_key(schema: &TableSchema, record: &TaggedRecord, operation: &str) -> Result<String> {
    let mut parts = Vec::with_capacity(schema.key_schema.len());
    for attribute in schema.key_attributes() {
        let value = record.get(&attribute).ok_or_else(|| {
            DynoError::from_service(
                operation,
                Some("ValidationException"),
                format!("missing key attribute '{}'", attribute),
            )
        })?;
        parts.push(render_scalar(value));
    }
    Ok(parts.join("\u{1f}"))
}

fn render_scalar(value: &TaggedValue) -> String {
    match value {
        TaggedValue::S(s) | TaggedValue::N(s) => s.clone(),
        other => wire::value_to_json(other).to_string(),
    }
}

fn segment_of(key: &str, total: u32) -> u32 {
    let digest = blake3::hash(key.as_bytes());
    let bytes = digest.as_bytes();
    let head = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    head % total.max(1)
}

/// Evaluate a conjunction of `attr = :value` comparisons.
fn matches_filter(filter: Option<&ScanFilter>, record: &TaggedRecord) -> Result<bool> {
    let Some(filter) = filter else {
        return Ok(true);
    };
    for clause in split_conjunction(&filter.expression) {
        let (lhs, rhs) = clause
            .split_once('=')
            .map(|(l, r)| (l.trim(), r.trim()))
            .filter(|(l, r)| !l.is_empty() && r.starts_with(':') && !r.contains(' '))
            .ok_or_else(|| unsupported_filter(&filter.expression))?;
        let attribute = if lhs.starts_with('#') {
            filter
                .names
                .get(lhs)
                .map(String::as_str)
                .ok_or_else(|| unsupported_filter(&filter.expression))?
        } else {
            lhs
        };
        let expected = filter
            .values
            .get(rhs)
            .ok_or_else(|| unsupported_filter(&filter.expression))?;
        if record.get(attribute) != Some(expected) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn split_conjunction(expression: &str) -> Vec<String> {
    let mut clauses = vec![String::new()];
    for token in expression.split_whitespace() {
        if token.eq_ignore_ascii_case("and") {
            clauses.push(String::new());
        } else if let Some(current) = clauses.last_mut() {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(token);
        }
    }
    clauses
}

fn unsupported_filter(expression: &str) -> DynoError {
    DynoError::from_service(
        "Scan",
        Some("ValidationException"),
        format!("unsupported filter expression: {}", expression),
    )
}

fn throttled(operation: &str) -> DynoError {
    DynoError::from_service(
        operation,
        Some("ProvisionedThroughputExceededException"),
        "injected throttle",
    )
}

fn injected(operation: &str, code: &str) -> DynoError {
    DynoError::from_service(operation, Some(code), "injected fault")
}

fn not_found(operation: &str, table: &str) -> DynoError {
    DynoError::from_service(
        operation,
        Some("ResourceNotFoundException"),
        format!("Requested resource not found: Table: {} not found", table),
    )
}

fn in_use(table: &str) -> DynoError {
    DynoError::from_service(
        "CreateTable",
        Some("ResourceInUseException"),
        format!("Table already exists: {}", table),
    )
}

// ── Object store ────────────────────────────────────────────────────

/// Buckets of named objects, created on first write.
#[derive(Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets.lock().unwrap().get(bucket).map_or(0, |b| b.len())
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body);
        Ok(())
    }

    fn list_objects(&self, bucket: &str) -> Result<Vec<String>> {
        let buckets = self.buckets.lock().unwrap();
        let objects = buckets.get(bucket).ok_or_else(|| {
            DynoError::from_service("ListObjectsV2", Some("NoSuchBucket"), format!("bucket {} does not exist", bucket))
        })?;
        Ok(objects.keys().cloned().collect())
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let buckets = self.buckets.lock().unwrap();
        buckets
            .get(bucket)
            .and_then(|b| b.get(key))
            .cloned()
            .ok_or_else(|| DynoError::from_service("GetObject", Some("NoSuchKey"), format!("{}/{}", bucket, key)))
    }
}

// ── Remote invoker ──────────────────────────────────────────────────

/// Records every invocation and answers with a fixed status code.
pub struct MemoryInvoker {
    status: u16,
    invocations: Mutex<Vec<(String, serde_json::Value)>>,
}

impl Default for MemoryInvoker {
    fn default() -> Self {
        Self::new(202)
    }
}

impl MemoryInvoker {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// `(function name, decoded payload)` pairs in call order.
    pub fn invocations(&self) -> Vec<(String, serde_json::Value)> {
        self.invocations.lock().unwrap().clone()
    }
}

impl RemoteInvoker for MemoryInvoker {
    fn invoke_async(&self, function: &str, payload: &[u8]) -> Result<u16> {
        let value: serde_json::Value = serde_json::from_slice(payload)?;
        self.invocations.lock().unwrap().push((function.to_string(), value));
        Ok(self.status)
    }
}
