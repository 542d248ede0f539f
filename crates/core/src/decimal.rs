//! Decimal-safe JSON boundary.
//!
//! Documents leaving the store render every number as a string so clients
//! never round-trip through a lossy float. Numeric fields coming back in may
//! therefore be either JSON numbers or numeric strings.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Recursively replace every JSON number with its decimal string form.
pub fn stringify_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::String(n.to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(stringify_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, stringify_numbers(v)))
                .collect(),
        ),
        other => other,
    }
}

fn parse_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Whole floats within `i64` range; anything else would be clamped by `as`.
fn whole_f64_to_i64(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole_f64_to_i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_f64_to_i64))
        }
        _ => None,
    }
}

/// `deserialize_with` helpers accepting numbers or numeric strings.
pub mod lenient {
    use serde::de::Error as _;

    use super::*;

    pub fn f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parse_f64(&value).ok_or_else(|| D::Error::custom(format!("expected a number, got {value}")))
    }

    pub fn i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parse_integer(&value)
            .ok_or_else(|| D::Error::custom(format!("expected an integer, got {value}")))
    }

    pub fn u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let value = Value::deserialize(deserializer)?;
        parse_integer(&value)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                D::Error::custom(format!("expected a non-negative integer, got {value}"))
            })
    }

    pub fn u32_vec<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u32>, D::Error> {
        let values = Vec::<Value>::deserialize(deserializer)?;
        values
            .iter()
            .map(|value| {
                parse_integer(value)
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| {
                        D::Error::custom(format!("expected a non-negative integer, got {value}"))
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Deserialize)]
    struct Timed {
        #[serde(deserialize_with = "lenient::f64")]
        start: f64,
        #[serde(deserialize_with = "lenient::u32")]
        id: u32,
        #[serde(deserialize_with = "lenient::u32_vec")]
        refs: Vec<u32>,
    }

    #[test]
    fn numbers_become_strings_at_every_depth() {
        let value = json!({
            "created_at": 1700000000,
            "chapters": [{"start_time": 12.5, "title": "Intro"}],
            "published": true
        });

        assert_eq!(
            stringify_numbers(value),
            json!({
                "created_at": "1700000000",
                "chapters": [{"start_time": "12.5", "title": "Intro"}],
                "published": true
            })
        );
    }

    #[test]
    fn lenient_fields_accept_strings_and_numbers() {
        let from_strings: Timed =
            serde_json::from_value(json!({"start": "12.5", "id": "3", "refs": ["1", 2]})).unwrap();
        assert_eq!(from_strings.start, 12.5);
        assert_eq!(from_strings.id, 3);
        assert_eq!(from_strings.refs, vec![1, 2]);

        let from_numbers: Timed =
            serde_json::from_value(json!({"start": 4, "id": 2.0, "refs": []})).unwrap();
        assert_eq!(from_numbers.start, 4.0);
        assert_eq!(from_numbers.id, 2);
    }

    #[test]
    fn lenient_fields_reject_garbage() {
        let err = serde_json::from_value::<Timed>(json!({"start": "soon", "id": 1, "refs": []}));
        assert!(err.is_err());

        let negative = serde_json::from_value::<Timed>(json!({"start": 1, "id": -1, "refs": []}));
        assert!(negative.is_err());
    }

    #[test]
    fn out_of_range_integers_are_rejected_not_clamped() {
        assert_eq!(parse_integer(&json!(1e30)), None);
        assert_eq!(parse_integer(&json!("1e30")), None);
        assert_eq!(parse_integer(&json!(-1e30)), None);
        assert_eq!(parse_integer(&json!("12.0")), Some(12));

        let huge = serde_json::from_value::<Timed>(json!({"start": 1, "id": 1, "refs": [1e30]}));
        assert!(huge.is_err());
    }
}
