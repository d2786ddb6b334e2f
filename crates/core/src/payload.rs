// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Payload and metadata maps

use serde_json::Value;

/// Ordered string-keyed map of JSON-compatible values.
///
/// Used for both event payloads and metadata. Values are restricted to what
/// JSON can carry: strings, numbers, booleans, null, nested maps and lists.
pub type Payload = serde_json::Map<String, Value>;

/// Resolve a dotted path (`"user.address.city"`) inside a payload.
///
/// Every intermediate segment must be an object. Returns `None` when any
/// segment is absent.
pub fn resolve_path<'a>(data: &'a Payload, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = data.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Build a payload from `(key, value)` pairs
pub fn payload_from<K, V, I>(pairs: I) -> Payload
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Payload {
        match json!({
            "status": "critical",
            "container": { "name": "db", "limits": { "cpu": 2 } },
            "tags": ["a", "b"],
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn resolves_top_level_key() {
        assert_eq!(resolve_path(&sample(), "status"), Some(&json!("critical")));
    }

    #[test]
    fn resolves_nested_key() {
        assert_eq!(
            resolve_path(&sample(), "container.limits.cpu"),
            Some(&json!(2))
        );
    }

    #[test]
    fn missing_segment_is_none() {
        assert_eq!(resolve_path(&sample(), "container.image"), None);
        assert_eq!(resolve_path(&sample(), "nope"), None);
    }

    #[test]
    fn non_object_intermediate_is_none() {
        assert_eq!(resolve_path(&sample(), "tags.0"), None);
        assert_eq!(resolve_path(&sample(), "status.len"), None);
    }

    #[test]
    fn payload_from_pairs() {
        let p = payload_from([("a", json!(1)), ("b", json!("x"))]);
        assert_eq!(p.len(), 2);
        assert_eq!(p["b"], json!("x"));
    }
}
