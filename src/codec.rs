// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Canonical serialization for cached records.
//!
//! Every record is written in its canonical form: JSON with object keys sorted
//! recursively (arrays keep their order, but objects nested inside them are
//! sorted too). Two records that differ only in key insertion order therefore
//! produce identical bytes, which matters because sorted-set members are
//! indexed by their content.
//!
//! The canonical writer walks the value itself instead of relying on the
//! iteration order of `serde_json::Map`, so the output does not change if
//! some other crate in the build turns on `preserve_order`.
//!
//! Reading is the inverse with an explicit fallback: text that is not JSON
//! comes back as [`Decoded::Raw`] instead of an error.

use std::fmt::Write as _;

use serde_json::Value;

/// A value read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// The stored text parsed as JSON.
    Structured(Value),
    /// The stored text was not JSON and is returned verbatim.
    Raw(String),
}

impl Decoded {
    /// Convert to a JSON value; raw text becomes a JSON string.
    pub fn into_value(self) -> Value {
        match self {
            Self::Structured(value) => value,
            Self::Raw(text) => Value::String(text),
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Structured(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// The textual form: raw text as-is, JSON strings unquoted, anything
    /// else in canonical form.
    pub fn to_text(&self) -> String {
        match self {
            Self::Raw(text) => text.clone(),
            Self::Structured(Value::String(text)) => text.clone(),
            Self::Structured(value) => encode(value),
        }
    }

    /// Look up a top-level attribute of a structured object.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.as_value().and_then(|value| value.get(name))
    }

    /// Numeric view (numbers, or text that parses as a number).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Structured(Value::Number(n)) => n.as_f64(),
            Self::Structured(Value::String(s)) | Self::Raw(s) => s.trim().parse().ok(),
            Self::Structured(_) => None,
        }
    }
}

impl From<Value> for Decoded {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// Encode a value for storage.
///
/// Strings are stored as-is (no quotes) and other scalars as their JSON text.
/// Objects and arrays are written in canonical form.
///
/// ```
/// use coord_cache::codec::encode;
/// use serde_json::json;
///
/// assert_eq!(encode(&json!({"b": 1, "a": 2})), r#"{"a":2,"b":1}"#);
/// assert_eq!(encode(&json!("plain")), "plain");
/// ```
pub fn encode(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Object(_) | Value::Array(_) => {
            let mut out = String::new();
            write_canonical(value, &mut out);
            out
        }
        other => other.to_string(),
    }
}

/// Decode stored text, falling back to [`Decoded::Raw`] for non-JSON input.
pub fn decode(raw: &str) -> Decoded {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) => Decoded::Structured(value),
        Err(_) => Decoded::Raw(raw.to_string()),
    }
}

/// Return a copy of `value` whose objects are rebuilt in sorted key order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        leaf => {
            // Display for Value is compact JSON
            let _ = write!(out, "{}", leaf);
        }
    }
}

fn write_json_string(text: &str, out: &mut String) {
    let _ = write!(out, "{}", Value::String(text.to_string()));
}

/// Characters with special meaning in store MATCH patterns.
const GLOB_SPECIAL: &[char] = &['*', '?', '[', ']', '\\'];

/// Build a MATCH pattern that finds members containing `filter`.
///
/// An object filter matches members whose canonical text contains the
/// filter's `"key":value` pairs (adjacent in sorted-key order), so
/// `{"side":"buy"}` becomes `*"side":"buy"*`. Other values match on their
/// encoded text. Glob metacharacters in the filter are escaped.
pub fn filter_pattern(filter: &Value) -> String {
    let encoded = encode(filter);
    let inner = match filter {
        Value::Object(_) => encoded
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(&encoded),
        _ => encoded.as_str(),
    };

    let mut pattern = String::with_capacity(inner.len() + 2);
    pattern.push('*');
    for c in inner.trim().chars() {
        if GLOB_SPECIAL.contains(&c) {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_order_does_not_change_bytes() {
        let a: Value = serde_json::from_str(r#"{"z":1,"a":{"y":2,"b":3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"b":3,"y":2},"z":1}"#).unwrap();
        assert_eq!(encode(&a), encode(&b));
        assert_eq!(encode(&a), r#"{"a":{"b":3,"y":2},"z":1}"#);
    }

    #[test]
    fn test_arrays_keep_order_but_nested_objects_sorted() {
        let value = json!([{"b": 1, "a": 2}, 3, "x"]);
        assert_eq!(encode(&value), r#"[{"a":2,"b":1},3,"x"]"#);
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(encode(&json!("20240101")), "20240101");
        assert_eq!(encode(&json!(12.5)), "12.5");
        assert_eq!(encode(&json!(true)), "true");
        assert_eq!(encode(&Value::Null), "null");
    }

    #[test]
    fn test_decode_roundtrip_structured() {
        let value = json!({"id": 1, "tags": ["a", "b"], "nested": {"k": null}});
        assert_eq!(decode(&encode(&value)), Decoded::Structured(value));
    }

    #[test]
    fn test_decode_falls_back_to_raw() {
        assert_eq!(decode("not json"), Decoded::Raw("not json".into()));
        assert_eq!(decode("{broken"), Decoded::Raw("{broken".into()));
    }

    #[test]
    fn test_decoded_text_and_numbers() {
        assert_eq!(decode("plain").to_text(), "plain");
        assert_eq!(decode("\"quoted\"").to_text(), "quoted");
        assert_eq!(decode("42").as_f64(), Some(42.0));
        assert_eq!(decode("1.5e2").as_f64(), Some(150.0));
        assert_eq!(decode(r#"{"a":1}"#).attribute("a"), Some(&json!(1)));
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let value = json!({"b": [{"d": 1, "c": 2}], "a": 0});
        let once = canonicalize(&value);
        assert_eq!(canonicalize(&once), once);
        assert_eq!(encode(&once), encode(&value));
    }

    #[test]
    fn test_filter_pattern_for_object() {
        assert_eq!(filter_pattern(&json!({"side": "buy"})), r#"*"side":"buy"*"#);
    }

    #[test]
    fn test_filter_pattern_escapes_glob_chars() {
        assert_eq!(filter_pattern(&json!("a*b?")), r"*a\*b\?*");
        assert_eq!(filter_pattern(&json!({"tags": ["x"]})), r#"*"tags":\["x"\]*"#);
    }
}
