//! Property tests: decoding a tagged record and restoring its tags is
//! value-preserving, and the native wire form is lossless.

use std::collections::BTreeMap;

use dynotool::codec::{decode, encode, wire};
use dynotool::{TaggedRecord, TaggedValue};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

fn number() -> impl Strategy<Value = String> {
    "-?[1-9][0-9]{0,24}(\\.[0-9]{1,6})?"
}

fn attribute_name() -> impl Strategy<Value = String> {
    "[a-zA-Z_][a-zA-Z0-9_]{0,11}"
}

fn scalar() -> impl Strategy<Value = TaggedValue> {
    prop_oneof![
        any::<String>().prop_map(TaggedValue::S),
        number().prop_map(TaggedValue::N),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(TaggedValue::B),
        any::<bool>().prop_map(TaggedValue::Bool),
        Just(TaggedValue::Null),
        prop::collection::vec("[a-z]{0,8}", 1..5).prop_map(TaggedValue::Ss),
        prop::collection::vec(number(), 1..5).prop_map(TaggedValue::Ns),
        prop::collection::vec(prop::collection::vec(any::<u8>(), 0..8), 1..4).prop_map(TaggedValue::Bs),
    ]
}

fn value() -> impl Strategy<Value = TaggedValue> {
    scalar().prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(TaggedValue::L),
            prop::collection::btree_map(attribute_name(), inner, 0..4).prop_map(TaggedValue::M),
        ]
    })
}

fn record() -> impl Strategy<Value = TaggedRecord> {
    prop::collection::btree_map(attribute_name(), value(), 0..8)
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn decode_then_encode_preserves_record(record in record()) {
        let plain = decode(&record).unwrap();
        prop_assert_eq!(encode(&plain), record);
    }

    #[test]
    fn native_form_is_lossless(record in record()) {
        let json = wire::record_to_json(&record);
        let text = serde_json::to_string(&json).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(wire::record_from_json(&parsed).unwrap(), record);
    }

    #[test]
    fn numbers_keep_their_digits(digits in number()) {
        let mut record = BTreeMap::new();
        record.insert("n".to_string(), TaggedValue::N(digits.clone()));
        let plain = decode(&record).unwrap();
        let json = dynotool::codec::record_to_json(&plain).unwrap();
        prop_assert_eq!(json["n"].to_string(), digits);
    }
}
