//! RecordCodec: tagged wire values <-> plain values <-> output encodings.
//!
//! - `decode` strips tags (`TaggedRecord` -> `PlainRecord`)
//! - `encode` restores them (`PlainRecord` -> `TaggedRecord`), the inverse
//!   used by import
//! - `plain_to_json` / `plain_from_json` bridge plain values and JSON,
//!   lowering what JSON cannot express (sets -> arrays, binary -> base64)
//! - `wire` handles the tagged JSON form (`{"S": "x"}`) used by backups
//! - `output` renders plain records to line-json, json-array and
//!   delimited rows

pub mod output;
pub mod wire;

pub use output::{encode_for_output, FormatWriter, OutputFormat, UnencodablePolicy, WriteOutcome};

use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{Map, Number, Value};

use crate::error::{DynoError, Result};
use crate::types::{PlainRecord, PlainValue, TaggedRecord, TaggedValue};

// ── Decode ──────────────────────────────────────────────────────────

/// Strip tags from every attribute of a record.
pub fn decode(record: &TaggedRecord) -> Result<PlainRecord> {
    record
        .iter()
        .map(|(name, value)| Ok((name.clone(), decode_value(value)?)))
        .collect()
}

/// Strip tags from one value, recursing into lists and maps.
pub fn decode_value(value: &TaggedValue) -> Result<PlainValue> {
    Ok(match value {
        TaggedValue::S(s) => PlainValue::String(s.clone()),
        TaggedValue::N(n) => PlainValue::Number(n.clone()),
        TaggedValue::B(b) => PlainValue::Binary(b.clone()),
        TaggedValue::Bool(b) => PlainValue::Bool(*b),
        TaggedValue::Null => PlainValue::Null,
        TaggedValue::Ss(items) => PlainValue::StringSet(non_empty_set("SS", items)?.clone()),
        TaggedValue::Ns(items) => PlainValue::NumberSet(non_empty_set("NS", items)?.clone()),
        TaggedValue::Bs(items) => PlainValue::BinarySet(non_empty_set("BS", items)?.clone()),
        TaggedValue::L(items) => {
            PlainValue::List(items.iter().map(decode_value).collect::<Result<_>>()?)
        }
        TaggedValue::M(map) => PlainValue::Map(decode(map)?),
    })
}

fn non_empty_set<'a, T>(tag: &str, items: &'a Vec<T>) -> Result<&'a Vec<T>> {
    if items.is_empty() {
        return Err(DynoError::Encoding(format!("empty {} set", tag)));
    }
    Ok(items)
}

// ── Encode ──────────────────────────────────────────────────────────

/// Restore storage tags on a plain record.
pub fn encode(record: &PlainRecord) -> TaggedRecord {
    record
        .iter()
        .map(|(name, value)| (name.clone(), encode_value(value)))
        .collect()
}

/// Restore the storage tag of one value.
///
/// Empty sets cannot exist on the wire and become empty lists.
pub fn encode_value(value: &PlainValue) -> TaggedValue {
    match value {
        PlainValue::Null => TaggedValue::Null,
        PlainValue::Bool(b) => TaggedValue::Bool(*b),
        PlainValue::Number(n) => TaggedValue::N(n.clone()),
        PlainValue::String(s) => TaggedValue::S(s.clone()),
        PlainValue::Binary(b) => TaggedValue::B(b.clone()),
        PlainValue::StringSet(items) if items.is_empty() => TaggedValue::L(Vec::new()),
        PlainValue::NumberSet(items) if items.is_empty() => TaggedValue::L(Vec::new()),
        PlainValue::BinarySet(items) if items.is_empty() => TaggedValue::L(Vec::new()),
        PlainValue::StringSet(items) => TaggedValue::Ss(items.clone()),
        PlainValue::NumberSet(items) => TaggedValue::Ns(items.clone()),
        PlainValue::BinarySet(items) => TaggedValue::Bs(items.clone()),
        PlainValue::List(items) => TaggedValue::L(items.iter().map(encode_value).collect()),
        PlainValue::Map(map) => TaggedValue::M(encode(map)),
    }
}

// ── JSON bridge ─────────────────────────────────────────────────────

/// Render a plain record as a JSON object.
pub fn record_to_json(record: &PlainRecord) -> Result<Value> {
    let mut object = Map::with_capacity(record.len());
    for (name, value) in record {
        object.insert(name.clone(), plain_to_json(value)?);
    }
    Ok(Value::Object(object))
}

/// Render a plain value as JSON.
///
/// Sets are lowered to sorted arrays and binary to base64 text. Numbers
/// are emitted verbatim; text that is not a valid JSON number fails with
/// `Encoding`.
pub fn plain_to_json(value: &PlainValue) -> Result<Value> {
    Ok(match value {
        PlainValue::Null => Value::Null,
        PlainValue::Bool(b) => Value::Bool(*b),
        PlainValue::Number(n) => Value::Number(json_number(n)?),
        PlainValue::String(s) => Value::String(s.clone()),
        PlainValue::Binary(b) => Value::String(STANDARD.encode(b)),
        PlainValue::StringSet(items) => {
            let mut items = items.clone();
            items.sort();
            Value::Array(items.into_iter().map(Value::String).collect())
        }
        PlainValue::NumberSet(items) => {
            let mut numbers = items.iter().map(|n| json_number(n)).collect::<Result<Vec<_>>>()?;
            numbers.sort_by(|a, b| {
                let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal)
            });
            Value::Array(numbers.into_iter().map(Value::Number).collect())
        }
        PlainValue::BinarySet(items) => {
            let mut encoded: Vec<String> = items.iter().map(|b| STANDARD.encode(b)).collect();
            encoded.sort();
            Value::Array(encoded.into_iter().map(Value::String).collect())
        }
        PlainValue::List(items) => {
            Value::Array(items.iter().map(plain_to_json).collect::<Result<_>>()?)
        }
        PlainValue::Map(map) => record_to_json(map)?,
    })
}

fn json_number(text: &str) -> Result<Number> {
    Number::from_str(text.trim())
        .map_err(|_| DynoError::Encoding(format!("number '{}' is not representable in JSON", text)))
}

/// Parse a JSON object into a plain record.
pub fn record_from_json(value: Value) -> Result<PlainRecord> {
    match value {
        Value::Object(object) => Ok(object
            .into_iter()
            .map(|(name, value)| (name, plain_from_json(value)))
            .collect()),
        other => Err(DynoError::Encoding(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

/// Convert JSON into a plain value. Number text is preserved exactly.
pub fn plain_from_json(value: Value) -> PlainValue {
    match value {
        Value::Null => PlainValue::Null,
        Value::Bool(b) => PlainValue::Bool(b),
        Value::Number(n) => PlainValue::Number(n.to_string()),
        Value::String(s) => PlainValue::String(s),
        Value::Array(items) => PlainValue::List(items.into_iter().map(plain_from_json).collect()),
        Value::Object(object) => PlainValue::Map(
            object
                .into_iter()
                .map(|(name, value)| (name, plain_from_json(value)))
                .collect(),
        ),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample() -> TaggedRecord {
        let mut inner = BTreeMap::new();
        inner.insert("flag".to_string(), TaggedValue::Bool(true));
        inner.insert("nothing".to_string(), TaggedValue::Null);

        let mut record = TaggedRecord::new();
        record.insert("id".into(), TaggedValue::S("user#1".into()));
        record.insert("balance".into(), TaggedValue::N("12345678901234567890.000000001".into()));
        record.insert("avatar".into(), TaggedValue::B(vec![0, 159, 146, 150]));
        record.insert("tags".into(), TaggedValue::Ss(vec!["b".into(), "a".into()]));
        record.insert("scores".into(), TaggedValue::Ns(vec!["10".into(), "2.5".into()]));
        record.insert(
            "history".into(),
            TaggedValue::L(vec![TaggedValue::N("1".into()), TaggedValue::M(inner)]),
        );
        record
    }

    #[test]
    fn test_decode_strips_tags() {
        let plain = decode(&sample()).unwrap();
        assert_eq!(plain["id"], PlainValue::String("user#1".into()));
        assert_eq!(
            plain["balance"],
            PlainValue::Number("12345678901234567890.000000001".into())
        );
        assert_eq!(plain["tags"], PlainValue::StringSet(vec!["b".into(), "a".into()]));
        match &plain["history"] {
            PlainValue::List(items) => {
                assert_eq!(items[0], PlainValue::Number("1".into()));
                assert!(matches!(items[1], PlainValue::Map(_)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decode_then_encode_is_identity() {
        let record = sample();
        assert_eq!(encode(&decode(&record).unwrap()), record);
    }

    #[test]
    fn test_decode_rejects_empty_set() {
        let mut record = TaggedRecord::new();
        record.insert("s".into(), TaggedValue::Ss(Vec::new()));
        assert!(matches!(decode(&record), Err(DynoError::Encoding(_))));
    }

    #[test]
    fn test_number_precision_survives_json() {
        let plain = decode(&sample()).unwrap();
        let json = record_to_json(&plain).unwrap();
        let text = serde_json::to_string(&json).unwrap();
        assert!(text.contains("12345678901234567890.000000001"));

        let back = record_from_json(serde_json::from_str(&text).unwrap()).unwrap();
        assert_eq!(
            back["balance"],
            PlainValue::Number("12345678901234567890.000000001".into())
        );
    }

    #[test]
    fn test_sets_lowered_to_sorted_arrays() {
        let value = plain_to_json(&PlainValue::StringSet(vec!["b".into(), "a".into()])).unwrap();
        assert_eq!(value, serde_json::json!(["a", "b"]));
    }

    #[test]
    fn test_binary_rendered_as_base64() {
        let value = plain_to_json(&PlainValue::Binary(b"hi".to_vec())).unwrap();
        assert_eq!(value, Value::String("aGk=".into()));
    }

    #[test]
    fn test_unrepresentable_number_fails() {
        let err = plain_to_json(&PlainValue::Number("NaN".into())).unwrap_err();
        assert!(matches!(err, DynoError::Encoding(_)));
    }

    #[test]
    fn test_record_from_json_requires_object() {
        assert!(record_from_json(serde_json::json!([1, 2])).is_err());
        let record = record_from_json(serde_json::json!({"a": [1, "x"], "b": null})).unwrap();
        assert_eq!(
            record["a"],
            PlainValue::List(vec![PlainValue::Number("1".into()), PlainValue::String("x".into())])
        );
        assert_eq!(record["b"], PlainValue::Null);
    }
}
