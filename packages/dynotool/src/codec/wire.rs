//! Tagged JSON form of wire values: `{"S": "x"}`, `{"N": "1"}`, `{"M": {...}}`.
//!
//! This is the `native` backup format. Parsing is strict: exactly one tag
//! per value, and an unknown tag fails with `UnsupportedTag` so files
//! written by a newer service version are never silently misread.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::codec::json_kind;
use crate::error::{DynoError, Result};
use crate::types::{ScanFilter, TaggedRecord, TaggedValue};

/// Render a tagged record as a JSON object of tagged values.
pub fn record_to_json(record: &TaggedRecord) -> Value {
    Value::Object(
        record
            .iter()
            .map(|(name, value)| (name.clone(), value_to_json(value)))
            .collect(),
    )
}

pub fn value_to_json(value: &TaggedValue) -> Value {
    let body = match value {
        TaggedValue::S(s) | TaggedValue::N(s) => Value::String(s.clone()),
        TaggedValue::B(b) => Value::String(STANDARD.encode(b)),
        TaggedValue::Bool(b) => Value::Bool(*b),
        TaggedValue::Null => Value::Bool(true),
        TaggedValue::Ss(items) | TaggedValue::Ns(items) => {
            Value::Array(items.iter().cloned().map(Value::String).collect())
        }
        TaggedValue::Bs(items) => {
            Value::Array(items.iter().map(|b| Value::String(STANDARD.encode(b))).collect())
        }
        TaggedValue::L(items) => Value::Array(items.iter().map(value_to_json).collect()),
        TaggedValue::M(map) => record_to_json(map),
    };
    let mut object = Map::with_capacity(1);
    object.insert(value.tag().to_string(), body);
    Value::Object(object)
}

/// Parse a JSON object of tagged values.
pub fn record_from_json(value: &Value) -> Result<TaggedRecord> {
    let object = value.as_object().ok_or_else(|| {
        DynoError::Encoding(format!("expected a tagged record object, found {}", json_kind(value)))
    })?;
    object
        .iter()
        .map(|(name, value)| Ok((name.clone(), value_from_json(value)?)))
        .collect()
}

/// Parse one tagged value.
pub fn value_from_json(value: &Value) -> Result<TaggedValue> {
    let object = value
        .as_object()
        .filter(|o| o.len() == 1)
        .ok_or_else(|| DynoError::Encoding("tagged value must have exactly one tag".to_string()))?;
    let (tag, body) = object
        .iter()
        .next()
        .ok_or_else(|| DynoError::Encoding("tagged value must have exactly one tag".to_string()))?;

    Ok(match tag.as_str() {
        "S" => TaggedValue::S(expect_str(tag, body)?.to_string()),
        "N" => TaggedValue::N(expect_str(tag, body)?.to_string()),
        "B" => TaggedValue::B(decode_b64(expect_str(tag, body)?)?),
        "BOOL" => TaggedValue::Bool(
            body.as_bool()
                .ok_or_else(|| bad_body(tag, body))?,
        ),
        "NULL" => TaggedValue::Null,
        "SS" => TaggedValue::Ss(non_empty(tag, string_items(tag, body)?)?),
        "NS" => TaggedValue::Ns(non_empty(tag, string_items(tag, body)?)?),
        "BS" => TaggedValue::Bs(non_empty(
            tag,
            string_items(tag, body)?
                .iter()
                .map(|s| decode_b64(s))
                .collect::<Result<Vec<_>>>()?,
        )?),
        "L" => TaggedValue::L(
            body.as_array()
                .ok_or_else(|| bad_body(tag, body))?
                .iter()
                .map(value_from_json)
                .collect::<Result<_>>()?,
        ),
        "M" => TaggedValue::M(record_from_json(body)?),
        other => return Err(DynoError::UnsupportedTag(other.to_string())),
    })
}

fn expect_str<'a>(tag: &str, body: &'a Value) -> Result<&'a str> {
    body.as_str().ok_or_else(|| bad_body(tag, body))
}

fn string_items(tag: &str, body: &Value) -> Result<Vec<String>> {
    body.as_array()
        .ok_or_else(|| bad_body(tag, body))?
        .iter()
        .map(|item| expect_str(tag, item).map(str::to_string))
        .collect()
}

fn non_empty<T>(tag: &str, items: Vec<T>) -> Result<Vec<T>> {
    if items.is_empty() {
        return Err(DynoError::Encoding(format!("empty {} set", tag)));
    }
    Ok(items)
}

fn decode_b64(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| DynoError::Encoding(format!("invalid base64 binary: {}", e)))
}

fn bad_body(tag: &str, body: &Value) -> DynoError {
    DynoError::Encoding(format!("tag {} cannot hold a {}", tag, json_kind(body)))
}

/// Raw `--filter` document; values stay in tagged JSON form until checked.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterDocument {
    expression: String,
    #[serde(default)]
    names: BTreeMap<String, String>,
    #[serde(default)]
    values: Map<String, Value>,
}

/// Parse a scan filter document:
/// `{"expression": "...", "names": {"#n": "a"}, "values": {":v": {"S": "x"}}}`.
pub fn parse_filter(text: &str) -> Result<ScanFilter> {
    let doc: FilterDocument = serde_json::from_str(text)
        .map_err(|e| DynoError::InvalidArgument(format!("invalid filter: {}", e)))?;
    if doc.expression.trim().is_empty() {
        return Err(DynoError::InvalidArgument("filter expression is empty".into()));
    }
    Ok(ScanFilter {
        expression: doc.expression,
        names: doc.names,
        values: record_from_json(&Value::Object(doc.values))?,
    })
}
