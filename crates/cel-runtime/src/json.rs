//! CEL-JSON conversion.
//!
//! Lossy where the mapping demands it: integers beyond ±(2^53−1) become
//! decimal strings, non-finite doubles become the strings `"NaN"`,
//! `"Infinity"`, and `"-Infinity"`, bytes become base64, timestamps become
//! RFC 3339, and durations become decimal-seconds strings with an `s`
//! suffix.

use base64::Engine;
use serde_json::{Map as JsonMap, Number, Value as Json};

use crate::value::{ErrorValue, Value};
use crate::wire::stringify_key;

/// The largest integer magnitude JSON numbers represent exactly.
const MAX_SAFE_JSON_INT: i64 = (1 << 53) - 1;

/// Convert a value to its CEL-JSON form.
pub fn convert_to_json(value: &Value) -> Result<Json, ErrorValue> {
    match value {
        Value::Null => Ok(Json::Null),
        Value::Bool(b) => Ok(Json::Bool(*b)),
        Value::Int(i) => {
            if (-MAX_SAFE_JSON_INT..=MAX_SAFE_JSON_INT).contains(i) {
                Ok(Json::Number(Number::from(*i)))
            } else {
                Ok(Json::String(i.to_string()))
            }
        }
        Value::UInt(u) => {
            if *u <= MAX_SAFE_JSON_INT as u64 {
                Ok(Json::Number(Number::from(*u)))
            } else {
                Ok(Json::String(u.to_string()))
            }
        }
        Value::Double(d) => {
            if d.is_nan() {
                Ok(Json::String("NaN".to_string()))
            } else if d.is_infinite() {
                Ok(Json::String(
                    if d.is_sign_positive() { "Infinity" } else { "-Infinity" }.to_string(),
                ))
            } else {
                Number::from_f64(*d)
                    .map(Json::Number)
                    .ok_or_else(|| ErrorValue::internal("finite double failed JSON conversion"))
            }
        }
        Value::String(s) => Ok(Json::String(s.to_string())),
        Value::Bytes(b) => Ok(Json::String(
            base64::engine::general_purpose::STANDARD.encode(b),
        )),
        Value::Duration(d) => Ok(Json::String(d.format_seconds())),
        Value::Timestamp(t) => t
            .to_rfc3339()
            .map(Json::String)
            .ok_or_else(|| ErrorValue::out_of_range("timestamp outside the RFC 3339 range")),
        Value::List(items) => {
            let mut array = Vec::with_capacity(items.len());
            for item in items.iter() {
                array.push(convert_to_json(item)?);
            }
            Ok(Json::Array(array))
        }
        Value::Map(map) => {
            let mut object = JsonMap::with_capacity(map.len());
            for (key, entry) in map.iter() {
                object.insert(stringify_key(key), convert_to_json(entry)?);
            }
            Ok(Json::Object(object))
        }
        Value::Struct(s) => {
            let mut object = JsonMap::new();
            let mut failure = None;
            s.for_each_field(|name, field_value| match convert_to_json(&field_value) {
                Ok(json) => {
                    object.insert(name.to_string(), json);
                    true
                }
                Err(error) => {
                    failure = Some(error);
                    false
                }
            });
            match failure {
                Some(error) => Err(error),
                None => Ok(Json::Object(object)),
            }
        }
        Value::Enum(e) => Ok(Json::Number(Number::from(e.value))),
        Value::Type(_) | Value::Opaque(_) | Value::Optional(_) | Value::Error(_)
        | Value::Unknown(_) => Err(ErrorValue::unimplemented(format!(
            "JSON conversion is not supported for {}",
            value.value_type()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::value::{Duration, Timestamp};

    #[test]
    fn test_primitives() {
        assert_eq!(convert_to_json(&Value::Null).unwrap(), Json::Null);
        assert_eq!(convert_to_json(&Value::Bool(true)).unwrap(), json!(true));
        assert_eq!(convert_to_json(&Value::Int(42)).unwrap(), json!(42));
        assert_eq!(convert_to_json(&Value::Double(1.5)).unwrap(), json!(1.5));
        assert_eq!(convert_to_json(&Value::from("x")).unwrap(), json!("x"));
    }

    #[test]
    fn test_large_integers_become_strings() {
        let big = (1i64 << 53) + 1;
        assert_eq!(
            convert_to_json(&Value::Int(big)).unwrap(),
            json!(big.to_string())
        );
        assert_eq!(
            convert_to_json(&Value::Int(-big)).unwrap(),
            json!((-big).to_string())
        );
        assert_eq!(
            convert_to_json(&Value::UInt(u64::MAX)).unwrap(),
            json!(u64::MAX.to_string())
        );
        // The boundary itself stays numeric.
        assert_eq!(
            convert_to_json(&Value::Int((1 << 53) - 1)).unwrap(),
            json!((1i64 << 53) - 1)
        );
    }

    #[test]
    fn test_non_finite_doubles() {
        assert_eq!(
            convert_to_json(&Value::Double(f64::NAN)).unwrap(),
            json!("NaN")
        );
        assert_eq!(
            convert_to_json(&Value::Double(f64::INFINITY)).unwrap(),
            json!("Infinity")
        );
        assert_eq!(
            convert_to_json(&Value::Double(f64::NEG_INFINITY)).unwrap(),
            json!("-Infinity")
        );
    }

    #[test]
    fn test_bytes_base64() {
        assert_eq!(
            convert_to_json(&Value::from(vec![104u8, 105])).unwrap(),
            json!("aGk=")
        );
    }

    #[test]
    fn test_time_values() {
        assert_eq!(
            convert_to_json(&Value::Duration(Duration::new(3, 500_000_000))).unwrap(),
            json!("3.500s")
        );
        assert_eq!(
            convert_to_json(&Value::Timestamp(Timestamp::new(1_609_459_200, 0))).unwrap(),
            json!("2021-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_containers() {
        assert_eq!(
            convert_to_json(&Value::list_of([1, 2])).unwrap(),
            json!([1, 2])
        );
        assert_eq!(
            convert_to_json(&Value::map_of([("a", 1i64)])).unwrap(),
            json!({"a": 1})
        );
        // Non-string keys stringify.
        assert_eq!(
            convert_to_json(&Value::map_of([(7i64, true)])).unwrap(),
            json!({"7": true})
        );
        assert_eq!(
            convert_to_json(&Value::map_of([(true, 1i64)])).unwrap(),
            json!({"true": 1})
        );
    }

    #[test]
    fn test_unsupported() {
        use cel_runtime_common::Type;
        let err = convert_to_json(&Value::Type(Type::Int)).unwrap_err();
        assert_eq!(err.code, crate::value::ErrorCode::Unimplemented);
    }
}
