//! Core data model shared by the codec, the drivers and the orchestrator.
//!
//! Two record shapes flow through the engine:
//! - `TaggedRecord`: attribute name -> `TaggedValue`, the wire form the
//!   service exchanges on scan, put and batch operations.
//! - `PlainRecord`: attribute name -> `PlainValue`, the untagged form
//!   consumed by the output encoders and produced by the input parsers.
//!
//! Records are `BTreeMap`s so rendered output is deterministic.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DynoError, Result};

// ── Values ──────────────────────────────────────────────────────────

/// A value in the service's self-describing wire form.
///
/// Numbers are kept as decimal text so no precision is lost between
/// scan and output. Sets are non-empty and homogeneous by construction
/// of the variants.
#[derive(Debug, Clone, PartialEq)]
pub enum TaggedValue {
    S(String),
    N(String),
    B(Vec<u8>),
    Bool(bool),
    Null,
    Ss(Vec<String>),
    Ns(Vec<String>),
    Bs(Vec<Vec<u8>>),
    L(Vec<TaggedValue>),
    M(BTreeMap<String, TaggedValue>),
}

impl TaggedValue {
    /// Wire tag of this value (`S`, `N`, `BOOL`, ...).
    pub fn tag(&self) -> &'static str {
        match self {
            TaggedValue::S(_) => "S",
            TaggedValue::N(_) => "N",
            TaggedValue::B(_) => "B",
            TaggedValue::Bool(_) => "BOOL",
            TaggedValue::Null => "NULL",
            TaggedValue::Ss(_) => "SS",
            TaggedValue::Ns(_) => "NS",
            TaggedValue::Bs(_) => "BS",
            TaggedValue::L(_) => "L",
            TaggedValue::M(_) => "M",
        }
    }
}

pub type TaggedRecord = BTreeMap<String, TaggedValue>;

/// A value with its storage tag stripped.
///
/// Set types survive decoding as their own variants; encoders that
/// cannot represent a set lower it to a list.
#[derive(Debug, Clone, PartialEq)]
pub enum PlainValue {
    Null,
    Bool(bool),
    /// Decimal text, exactly as stored.
    Number(String),
    String(String),
    Binary(Vec<u8>),
    StringSet(Vec<String>),
    NumberSet(Vec<String>),
    BinarySet(Vec<Vec<u8>>),
    List(Vec<PlainValue>),
    Map(BTreeMap<String, PlainValue>),
}

pub type PlainRecord = BTreeMap<String, PlainValue>;

// ── Pages & Requests ────────────────────────────────────────────────

/// One disjoint static shard of a full-table scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub index: u32,
    pub total: u32,
}

impl Segment {
    /// Validate and build a segment. `index` must be in `[0, total)`.
    pub fn new(index: u32, total: u32) -> Result<Self> {
        if total == 0 || index >= total {
            return Err(DynoError::InvalidArgument(format!(
                "segment {} of {} is out of range",
                index, total
            )));
        }
        Ok(Self { index, total })
    }

    /// All segments of a `total`-way fan-out.
    pub fn all(total: u32) -> Result<Vec<Segment>> {
        (0..total).map(|index| Segment::new(index, total)).collect()
    }
}

/// Server-side filter applied to a scan.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanFilter {
    pub expression: String,
    /// Expression attribute names (`#n` -> `attr`).
    pub names: BTreeMap<String, String>,
    /// Expression attribute values (`:v` -> tagged value).
    pub values: TaggedRecord,
}

/// One response unit of a paginated read.
///
/// Absence of `continuation` means the scan (or this segment of it) is
/// exhausted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PageResult {
    pub records: Vec<TaggedRecord>,
    pub continuation: Option<TaggedRecord>,
    /// Capacity units reported for this request, when the service returned them.
    pub consumed_capacity: Option<f64>,
    /// Records returned after filtering.
    pub count: usize,
    /// Records evaluated before filtering.
    pub scanned_count: usize,
}

/// A single mutation inside a batch write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Put(TaggedRecord),
    /// Key attributes of the record to delete.
    Delete(TaggedRecord),
}

// ── Table Schema ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Hash,
    Range,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Hash => "HASH",
            KeyType::Range => "RANGE",
        }
    }
}

impl FromStr for KeyType {
    type Err = DynoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "HASH" => Ok(KeyType::Hash),
            "RANGE" => Ok(KeyType::Range),
            other => Err(DynoError::InvalidArgument(format!("unknown key type {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyElement {
    pub attribute: String,
    pub key_type: KeyType,
}

/// Scalar attribute types allowed in key definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    S,
    N,
    B,
}

impl ScalarType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::S => "S",
            ScalarType::N => "N",
            ScalarType::B => "B",
        }
    }
}

impl FromStr for ScalarType {
    type Err = DynoError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "S" => Ok(ScalarType::S),
            "N" => Ok(ScalarType::N),
            "B" => Ok(ScalarType::B),
            other => Err(DynoError::InvalidArgument(format!("unknown attribute type {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDefinition {
    pub name: String,
    pub attribute_type: ScalarType,
}

/// Provisioned read/write capacity units. Zero means on-demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Throughput {
    pub read_capacity: i64,
    pub write_capacity: i64,
}

impl Throughput {
    pub fn is_metered(&self) -> bool {
        self.read_capacity > 0 || self.write_capacity > 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Projection {
    /// `ALL`, `KEYS_ONLY` or `INCLUDE`.
    pub projection_type: Option<String>,
    pub non_key_attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    pub name: String,
    pub key_schema: Vec<KeyElement>,
    pub projection: Projection,
    /// Global indexes on provisioned tables carry their own throughput.
    pub throughput: Option<Throughput>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub enabled: bool,
    /// `NEW_IMAGE`, `OLD_IMAGE`, `NEW_AND_OLD_IMAGES` or `KEYS_ONLY`.
    pub view_type: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingMode {
    Provisioned,
    PayPerRequest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Creating,
    Active,
    Deleting,
    Updating,
    /// Returned by the wait helper once describe reports not-found.
    Deleted,
    Other(String),
}

impl TableStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "CREATING" => TableStatus::Creating,
            "ACTIVE" => TableStatus::Active,
            "DELETING" => TableStatus::Deleting,
            "UPDATING" => TableStatus::Updating,
            other => TableStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TableStatus::Creating => "CREATING",
            TableStatus::Active => "ACTIVE",
            TableStatus::Deleting => "DELETING",
            TableStatus::Updating => "UPDATING",
            TableStatus::Deleted => "DELETED",
            TableStatus::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for TableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table metadata as reported by describe, and the input to create.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    pub name: String,
    pub status: TableStatus,
    pub key_schema: Vec<KeyElement>,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub billing_mode: BillingMode,
    pub throughput: Throughput,
    pub global_indexes: Vec<IndexSchema>,
    pub local_indexes: Vec<IndexSchema>,
    pub stream: Option<StreamSpec>,
    pub item_count: i64,
    pub size_bytes: i64,
}

impl TableSchema {
    /// Minimal provisioned schema with the given key attributes, all typed `S`.
    ///
    /// Mostly useful for tests and the in-memory store.
    pub fn simple(name: &str, hash_key: &str, range_key: Option<&str>) -> Self {
        let mut key_schema = vec![KeyElement {
            attribute: hash_key.to_string(),
            key_type: KeyType::Hash,
        }];
        let mut attribute_definitions = vec![AttributeDefinition {
            name: hash_key.to_string(),
            attribute_type: ScalarType::S,
        }];
        if let Some(range_key) = range_key {
            key_schema.push(KeyElement {
                attribute: range_key.to_string(),
                key_type: KeyType::Range,
            });
            attribute_definitions.push(AttributeDefinition {
                name: range_key.to_string(),
                attribute_type: ScalarType::S,
            });
        }
        Self {
            name: name.to_string(),
            status: TableStatus::Active,
            key_schema,
            attribute_definitions,
            billing_mode: BillingMode::Provisioned,
            throughput: Throughput {
                read_capacity: 5,
                write_capacity: 5,
            },
            global_indexes: Vec::new(),
            local_indexes: Vec::new(),
            stream: None,
            item_count: 0,
            size_bytes: 0,
        }
    }

    /// Names of the key attributes, hash key first.
    pub fn key_attributes(&self) -> Vec<String> {
        let mut keys: Vec<&KeyElement> = self.key_schema.iter().collect();
        keys.sort_by_key(|k| match k.key_type {
            KeyType::Hash => 0,
            KeyType::Range => 1,
        });
        keys.into_iter().map(|k| k.attribute.clone()).collect()
    }

    /// Provisioned read capacity, or `None` for on-demand tables.
    pub fn read_capacity(&self) -> Option<f64> {
        if self.billing_mode == BillingMode::PayPerRequest || self.throughput.read_capacity <= 0 {
            None
        } else {
            Some(self.throughput.read_capacity as f64)
        }
    }

    /// Create-table definition for a table named `name` with this schema.
    ///
    /// Runtime-only fields (status, counts, size) are reset.
    pub fn definition_for(&self, name: &str) -> TableSchema {
        TableSchema {
            name: name.to_string(),
            status: TableStatus::Creating,
            item_count: 0,
            size_bytes: 0,
            ..self.clone()
        }
    }

    /// Project the key attributes out of a full record.
    pub fn key_of(&self, record: &TaggedRecord) -> Result<TaggedRecord> {
        let mut key = TaggedRecord::new();
        for element in &self.key_schema {
            let value = record.get(&element.attribute).ok_or_else(|| {
                DynoError::Encoding(format!(
                    "record is missing key attribute '{}' of table '{}'",
                    element.attribute, self.name
                ))
            })?;
            key.insert(element.attribute.clone(), value.clone());
        }
        Ok(key)
    }
}
