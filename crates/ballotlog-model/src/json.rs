// SPDX-License-Identifier: Apache-2.0

use serde_json::{Map, Value};

/// Recursively sorts the keys of every object in `value`, producing the
/// canonical form spec §6 calls "sorted keys, UTF-8, no ASCII-only
/// escaping" (serde_json never escapes non-ASCII by default, so only the
/// key ordering needs help).
pub(crate) fn sort_keys_deep(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, sort_keys_deep(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys_deep).collect()),
        other => other,
    }
}

/// Serializes `value` as stable JSON: sorted keys, UTF-8, compact.
pub fn to_stable_json_bytes(value: &Value) -> Vec<u8> {
    let sorted = sort_keys_deep(value.clone());
    serde_json::to_vec(&sorted).expect("serializing a JSON Value cannot fail")
}
