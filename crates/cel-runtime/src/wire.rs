//! Canonical wire forms.
//!
//! Every serializable value encodes as the protobuf encoding of its
//! canonical well-known type: primitives as the wrapper messages,
//! duration/timestamp as their messages, lists as `ListValue`, maps as
//! `Struct` with stringified keys, and bridged structs as the host message
//! itself. Values without a wire form (types, opaques, optionals, errors,
//! unknowns) answer a distinguished `unimplemented` error.

use prost::Message;
use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor};

use crate::bridge::{make_type_url, set_field_by_name};
use crate::value::{ErrorValue, MapKey, Value};

/// A serialized value wrapped with its type URL, the payload of
/// `google.protobuf.Any`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnyValue {
    /// Type URL, e.g. `type.googleapis.com/google.protobuf.Int64Value`.
    pub type_url: String,
    /// The serialized canonical message.
    pub value: Vec<u8>,
}

impl AnyValue {
    /// Encode as a `google.protobuf.Any` message.
    pub fn encode_to_vec(&self) -> Vec<u8> {
        prost_reflect::prost_types::Any {
            type_url: self.type_url.clone(),
            value: self.value.clone(),
        }
        .encode_to_vec()
    }
}

/// Serialize a value into its canonical wire form.
pub fn serialize(value: &Value) -> Result<Vec<u8>, ErrorValue> {
    match value {
        Value::Null => Ok(json_value_message(value)?.encode_to_vec()),
        Value::Bool(b) => {
            wrapper_bytes("google.protobuf.BoolValue", prost_reflect::Value::Bool(*b))
        }
        Value::Int(i) => wrapper_bytes("google.protobuf.Int64Value", prost_reflect::Value::I64(*i)),
        Value::UInt(u) => {
            wrapper_bytes("google.protobuf.UInt64Value", prost_reflect::Value::U64(*u))
        }
        Value::Double(d) => {
            wrapper_bytes("google.protobuf.DoubleValue", prost_reflect::Value::F64(*d))
        }
        Value::String(s) => wrapper_bytes(
            "google.protobuf.StringValue",
            prost_reflect::Value::String(s.to_string()),
        ),
        Value::Bytes(b) => wrapper_bytes(
            "google.protobuf.BytesValue",
            prost_reflect::Value::Bytes(prost::bytes::Bytes::copy_from_slice(b)),
        ),
        Value::Duration(d) => {
            let descriptor = well_known("google.protobuf.Duration")?;
            let mut message = DynamicMessage::new(descriptor);
            set_field_by_name(&mut message, "seconds", prost_reflect::Value::I64(d.seconds));
            set_field_by_name(&mut message, "nanos", prost_reflect::Value::I32(d.nanos));
            Ok(message.encode_to_vec())
        }
        Value::Timestamp(t) => {
            let descriptor = well_known("google.protobuf.Timestamp")?;
            let mut message = DynamicMessage::new(descriptor);
            set_field_by_name(&mut message, "seconds", prost_reflect::Value::I64(t.seconds));
            set_field_by_name(&mut message, "nanos", prost_reflect::Value::I32(t.nanos));
            Ok(message.encode_to_vec())
        }
        Value::List(_) => {
            let json = crate::json::convert_to_json(value)?;
            Ok(json_to_list_message(&json)?.encode_to_vec())
        }
        Value::Map(_) => {
            let json = crate::json::convert_to_json(value)?;
            Ok(json_to_struct_message(&json)?.encode_to_vec())
        }
        Value::Struct(s) => {
            let mut out = Vec::new();
            s.serialize_to(&mut out)?;
            Ok(out)
        }
        // The numeric value is the canonical form of an enum.
        Value::Enum(e) => wrapper_bytes(
            "google.protobuf.Int64Value",
            prost_reflect::Value::I64(e.value),
        ),
        Value::Type(_) | Value::Opaque(_) | Value::Optional(_) | Value::Error(_)
        | Value::Unknown(_) => Err(unsupported(value)),
    }
}

/// The size of the canonical wire form, or the same `unimplemented` error
/// as [`serialize`].
pub fn serialized_size(value: &Value) -> Result<usize, ErrorValue> {
    serialize(value).map(|bytes| bytes.len())
}

/// Wrap a value's serialization with its type URL.
pub fn convert_to_any(value: &Value, prefix: &str) -> Result<AnyValue, ErrorValue> {
    let type_url = match value {
        Value::Null => make_type_url(prefix, "google.protobuf.Value"),
        Value::Bool(_) => make_type_url(prefix, "google.protobuf.BoolValue"),
        Value::Int(_) | Value::Enum(_) => make_type_url(prefix, "google.protobuf.Int64Value"),
        Value::UInt(_) => make_type_url(prefix, "google.protobuf.UInt64Value"),
        Value::Double(_) => make_type_url(prefix, "google.protobuf.DoubleValue"),
        Value::String(_) => make_type_url(prefix, "google.protobuf.StringValue"),
        Value::Bytes(_) => make_type_url(prefix, "google.protobuf.BytesValue"),
        Value::Duration(_) => make_type_url(prefix, "google.protobuf.Duration"),
        Value::Timestamp(_) => make_type_url(prefix, "google.protobuf.Timestamp"),
        Value::List(_) => make_type_url(prefix, "google.protobuf.ListValue"),
        Value::Map(_) => make_type_url(prefix, "google.protobuf.Struct"),
        Value::Struct(s) => s.type_url(prefix),
        Value::Type(_) | Value::Opaque(_) | Value::Optional(_) | Value::Error(_)
        | Value::Unknown(_) => return Err(unsupported(value)),
    };
    Ok(AnyValue {
        type_url,
        value: serialize(value)?,
    })
}

fn unsupported(value: &Value) -> ErrorValue {
    ErrorValue::unimplemented(format!(
        "serialization is not supported for {}",
        value.value_type()
    ))
}

fn well_known(name: &str) -> Result<MessageDescriptor, ErrorValue> {
    DescriptorPool::global()
        .get_message_by_name(name)
        .ok_or_else(|| ErrorValue::internal(format!("missing well-known descriptor: {}", name)))
}

fn wrapper_bytes(name: &str, value: prost_reflect::Value) -> Result<Vec<u8>, ErrorValue> {
    let descriptor = well_known(name)?;
    let mut message = DynamicMessage::new(descriptor);
    set_field_by_name(&mut message, "value", value);
    Ok(message.encode_to_vec())
}

// ==================== JSON-shaped messages ====================

/// Build a `google.protobuf.Value`, `Struct`, or `ListValue` message for
/// a value, per the descriptor requested. The value is first projected
/// through the CEL-JSON mapping, so maps gain stringified keys and lists
/// gain JSON-shaped elements.
pub(crate) fn value_to_json_message(
    descriptor: &MessageDescriptor,
    value: &Value,
) -> Result<DynamicMessage, ErrorValue> {
    let json = crate::json::convert_to_json(value)?;
    match descriptor.full_name() {
        "google.protobuf.Value" => json_to_value_message(&json),
        "google.protobuf.Struct" => json_to_struct_message(&json),
        "google.protobuf.ListValue" => json_to_list_message(&json),
        other => Err(ErrorValue::internal(format!(
            "not a JSON-shaped message: {}",
            other
        ))),
    }
}

fn json_value_message(value: &Value) -> Result<DynamicMessage, ErrorValue> {
    json_to_value_message(&crate::json::convert_to_json(value)?)
}

fn json_to_value_message(json: &serde_json::Value) -> Result<DynamicMessage, ErrorValue> {
    let descriptor = well_known("google.protobuf.Value")?;
    let mut message = DynamicMessage::new(descriptor);
    match json {
        serde_json::Value::Null => {
            set_field_by_name(
                &mut message,
                "null_value",
                prost_reflect::Value::EnumNumber(0),
            );
        }
        serde_json::Value::Bool(b) => {
            set_field_by_name(&mut message, "bool_value", prost_reflect::Value::Bool(*b));
        }
        serde_json::Value::Number(n) => {
            let double = n
                .as_f64()
                .ok_or_else(|| ErrorValue::internal("JSON number outside the double range"))?;
            set_field_by_name(
                &mut message,
                "number_value",
                prost_reflect::Value::F64(double),
            );
        }
        serde_json::Value::String(s) => {
            set_field_by_name(
                &mut message,
                "string_value",
                prost_reflect::Value::String(s.clone()),
            );
        }
        serde_json::Value::Array(_) => {
            set_field_by_name(
                &mut message,
                "list_value",
                prost_reflect::Value::Message(json_to_list_message(json)?),
            );
        }
        serde_json::Value::Object(_) => {
            set_field_by_name(
                &mut message,
                "struct_value",
                prost_reflect::Value::Message(json_to_struct_message(json)?),
            );
        }
    }
    Ok(message)
}

fn json_to_list_message(json: &serde_json::Value) -> Result<DynamicMessage, ErrorValue> {
    let serde_json::Value::Array(items) = json else {
        return Err(ErrorValue::internal("expected a JSON array"));
    };
    let descriptor = well_known("google.protobuf.ListValue")?;
    let mut message = DynamicMessage::new(descriptor);
    let mut values = Vec::with_capacity(items.len());
    for item in items {
        values.push(prost_reflect::Value::Message(json_to_value_message(item)?));
    }
    set_field_by_name(&mut message, "values", prost_reflect::Value::List(values));
    Ok(message)
}

fn json_to_struct_message(json: &serde_json::Value) -> Result<DynamicMessage, ErrorValue> {
    let serde_json::Value::Object(entries) = json else {
        return Err(ErrorValue::internal("expected a JSON object"));
    };
    let descriptor = well_known("google.protobuf.Struct")?;
    let mut message = DynamicMessage::new(descriptor);
    let mut fields = std::collections::HashMap::with_capacity(entries.len());
    for (key, entry) in entries {
        fields.insert(
            prost_reflect::MapKey::String(key.clone()),
            prost_reflect::Value::Message(json_to_value_message(entry)?),
        );
    }
    set_field_by_name(&mut message, "fields", prost_reflect::Value::Map(fields));
    Ok(message)
}

pub(crate) fn stringify_key(key: &MapKey) -> String {
    match key {
        MapKey::Bool(b) => b.to_string(),
        MapKey::Int(i) => i.to_string(),
        MapKey::UInt(u) => u.to_string(),
        MapKey::String(s) => s.to_string(),
    }
}
