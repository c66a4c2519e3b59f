/*!
 * Serde utilities for event records.
 *
 * Records may be written by producers other than this crate, so a few fields
 * are read leniently: `null` where an object is expected, and counters stored
 * as strings or floats.
 */

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Deserialize a field that may be `null` as the type's default value.
///
/// ```rust
/// use serde::Deserialize;
/// use relay_core::utils::serde::deserialize_null_default;
///
/// #[derive(Deserialize)]
/// struct Record {
///     #[serde(default, deserialize_with = "deserialize_null_default")]
///     metadata: serde_json::Map<String, serde_json::Value>,
/// }
///
/// let record: Record = serde_json::from_str(r#"{"metadata": null}"#).unwrap();
/// assert!(record.metadata.is_empty());
/// ```
pub fn deserialize_null_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    let value: Option<T> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

/// Read a non-negative counter that may be represented as a number or string.
///
/// - Integer numbers are returned as-is (negative values are rejected)
/// - Floating-point numbers are truncated
/// - Strings are parsed as integers, then as floats
/// - Anything else yields `None`
pub fn value_as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().filter(|f| *f >= 0.0).map(|f| f as u64)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize, Debug, PartialEq)]
    struct TestStruct {
        #[serde(default, deserialize_with = "deserialize_null_default")]
        value: Vec<i32>,
    }

    #[test]
    fn test_null_becomes_default() {
        let result: TestStruct = serde_json::from_str(r#"{"value": null}"#).unwrap();
        assert!(result.value.is_empty());
    }

    #[test]
    fn test_missing_becomes_default() {
        let result: TestStruct = serde_json::from_str(r#"{}"#).unwrap();
        assert!(result.value.is_empty());
    }

    #[test]
    fn test_present_value_kept() {
        let result: TestStruct = serde_json::from_str(r#"{"value": [1, 2]}"#).unwrap();
        assert_eq!(result.value, vec![1, 2]);
    }

    #[test]
    fn test_value_as_count() {
        assert_eq!(value_as_count(&json!(3)), Some(3));
        assert_eq!(value_as_count(&json!("4")), Some(4));
        assert_eq!(value_as_count(&json!(2.9)), Some(2));
        assert_eq!(value_as_count(&json!(-1)), None);
        assert_eq!(value_as_count(&json!("many")), None);
        assert_eq!(value_as_count(&json!(null)), None);
    }
}
