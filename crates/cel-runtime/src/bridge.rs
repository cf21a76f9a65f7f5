//! Bridging host record types into the value model.
//!
//! Every host record format implements [`StructValueOps`], a narrow vtable
//! giving the evaluator field access, presence tests, iteration, and the
//! `qualify` fast-path for chained selection. The supplied bridge,
//! [`ProtoStructValue`], adapts `prost_reflect::DynamicMessage`:
//!
//! - scalar fields map to the corresponding CEL primitives;
//! - repeated and map fields materialize native lists/maps, with wrapper
//!   element types reduced to their primitive so elements are never null;
//! - the well-known types unwrap (`Timestamp`/`Duration`, the wrapper
//!   messages, `Struct`/`Value`/`ListValue`, and `Any` via the carried
//!   type URL).
//!
//! Writes travel through the struct builder (`reflect` module) and reuse
//! the checked conversions here: narrowing overflow is `out of range`,
//! kind mismatch is `invalid argument`, and neither silently truncates.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use prost::Message;
use prost_reflect::{DynamicMessage, FieldDescriptor, Kind as FieldKind, MessageDescriptor, ReflectMessage};

use cel_runtime_common::Type;

use crate::memory::{Handle, MemoryManager};
use crate::value::{Duration, EnumValue, ErrorValue, MapKey, Timestamp, Value, ValueMap};

// Conversions below a bridged field materialize under the
// reference-counting discipline; the outermost allocation of a field
// access or deserialization goes through the caller's manager.
fn shared_list(items: Vec<Value>) -> Value {
    let items: Arc<[Value]> = Arc::from(items);
    Value::List(items.into())
}

fn shared_map(map: ValueMap) -> Value {
    Value::Map(Arc::new(map).into())
}

/// Default prefix for type URLs.
pub const TYPE_URL_PREFIX: &str = "type.googleapis.com";

/// Build a type URL from a prefix and a fully qualified name.
pub fn make_type_url(prefix: &str, full_name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        format!("/{}", full_name)
    } else {
        format!("{}/{}", prefix, full_name)
    }
}

/// One step of a chained selection `a.b[2]["k"].c`.
#[derive(Debug, Clone, PartialEq)]
pub enum Qualifier {
    /// Field selection by name.
    FieldName(Arc<str>),
    /// Field selection by number.
    FieldNumber(i32),
    /// List index.
    Index(i64),
    /// Map key.
    Key(MapKey),
}

/// The capability interface every struct bridge implements.
pub trait StructValueOps: Send + Sync {
    /// Fully qualified type name of the record.
    fn type_name(&self) -> &str;

    /// The struct type; kind `struct`.
    fn struct_type(&self) -> Type {
        Type::struct_type(self.type_name())
    }

    /// Field access by name. Missing fields produce a `not found` error
    /// value.
    fn get_field_by_name(&self, name: &str) -> Value;

    /// Field access by number.
    fn get_field_by_number(&self, number: i32) -> Value;

    /// Presence test by name, following the host format's presence rules.
    fn has_field_by_name(&self, name: &str) -> Value;

    /// Presence test by number.
    fn has_field_by_number(&self, number: i32) -> Value;

    /// Number of set fields.
    fn field_count(&self) -> usize;

    /// Visit set fields in schema-declared order until the callback
    /// returns `false`.
    fn for_each_field(&self, f: &mut dyn FnMut(&str, Value) -> bool);

    /// Consume a prefix of the qualifier chain, returning the resulting
    /// value and how many qualifiers were consumed. When `presence_test`
    /// is set, the final consumed qualifier answers a `has` test instead
    /// of producing the value.
    ///
    /// The default implementation consumes the first qualifier through
    /// field access and leaves the rest to the caller.
    fn qualify(&self, qualifiers: &[Qualifier], presence_test: bool) -> (Value, usize) {
        let Some(first) = qualifiers.first() else {
            return (
                Value::error(ErrorValue::internal("empty qualifier chain")),
                0,
            );
        };
        let test = presence_test && qualifiers.len() == 1;
        let value = match first {
            Qualifier::FieldName(name) => {
                if test {
                    self.has_field_by_name(name)
                } else {
                    self.get_field_by_name(name)
                }
            }
            Qualifier::FieldNumber(number) => {
                if test {
                    self.has_field_by_number(*number)
                } else {
                    self.get_field_by_number(*number)
                }
            }
            other => Value::error(ErrorValue::invalid_argument(format!(
                "cannot apply qualifier {:?} to {}",
                other,
                self.type_name()
            ))),
        };
        (value, 1)
    }

    /// Serialize in the host wire format. Bridges without a wire form
    /// answer `unimplemented`.
    fn serialize_to(&self, _out: &mut Vec<u8>) -> Result<(), ErrorValue> {
        Err(ErrorValue::unimplemented(format!(
            "serialization is not supported for {}",
            self.type_name()
        )))
    }

    /// The type URL used when packing into `Any`.
    fn type_url(&self, prefix: &str) -> String {
        make_type_url(prefix, self.type_name())
    }

    /// Structural equality against another bridge value.
    fn equals(&self, other: &dyn StructValueOps) -> bool {
        if self.type_name() != other.type_name() || self.field_count() != other.field_count() {
            return false;
        }
        let mut equal = true;
        self.for_each_field(&mut |name, value| {
            let other_value = other.get_field_by_name(name);
            if other_value.is_error() || other_value != value {
                equal = false;
                return false;
            }
            true
        });
        equal
    }

    /// Deterministic rendering for diagnostics.
    fn debug_string(&self) -> String {
        let mut out = format!("{}{{", self.type_name());
        let mut first = true;
        self.for_each_field(&mut |name, value| {
            if !first {
                out.push_str(", ");
            }
            first = false;
            out.push_str(name);
            out.push_str(": ");
            out.push_str(&value.debug_string());
            true
        });
        out.push('}');
        out
    }

    /// Downcast support for same-bridge equality fast paths.
    fn as_any(&self) -> &dyn Any;
}

/// A shared handle to a bridge-backed struct value.
#[derive(Clone)]
pub struct StructValue {
    ops: Arc<dyn StructValueOps>,
}

impl StructValue {
    /// Wrap a bridge implementation.
    pub fn new(ops: impl StructValueOps + 'static) -> Self {
        Self { ops: Arc::new(ops) }
    }

    /// The bridge implementation.
    pub fn ops(&self) -> &dyn StructValueOps {
        self.ops.as_ref()
    }

    /// Fully qualified type name.
    pub fn type_name(&self) -> &str {
        self.ops.type_name()
    }

    /// The struct type.
    pub fn struct_type(&self) -> Type {
        self.ops.struct_type()
    }

    /// Field access by name.
    pub fn get_field_by_name(&self, name: &str) -> Value {
        self.ops.get_field_by_name(name)
    }

    /// Field access by number.
    pub fn get_field_by_number(&self, number: i32) -> Value {
        self.ops.get_field_by_number(number)
    }

    /// Presence test by name.
    pub fn has_field_by_name(&self, name: &str) -> Value {
        self.ops.has_field_by_name(name)
    }

    /// Presence test by number.
    pub fn has_field_by_number(&self, number: i32) -> Value {
        self.ops.has_field_by_number(number)
    }

    /// Number of set fields.
    pub fn field_count(&self) -> usize {
        self.ops.field_count()
    }

    /// Visit set fields in schema order until the callback returns `false`.
    pub fn for_each_field(&self, mut f: impl FnMut(&str, Value) -> bool) {
        self.ops.for_each_field(&mut f);
    }

    /// Chained-selection fast path; see [`StructValueOps::qualify`].
    pub fn qualify(&self, qualifiers: &[Qualifier], presence_test: bool) -> (Value, usize) {
        self.ops.qualify(qualifiers, presence_test)
    }

    /// Serialize in the host wire format.
    pub fn serialize_to(&self, out: &mut Vec<u8>) -> Result<(), ErrorValue> {
        self.ops.serialize_to(out)
    }

    /// The type URL used when packing into `Any`.
    pub fn type_url(&self, prefix: &str) -> String {
        self.ops.type_url(prefix)
    }

    /// Deterministic rendering for diagnostics.
    pub fn debug_string(&self) -> String {
        self.ops.debug_string()
    }
}

impl PartialEq for StructValue {
    fn eq(&self, other: &Self) -> bool {
        self.ops.equals(other.ops.as_ref())
    }
}

impl fmt::Debug for StructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug_string())
    }
}

// ==================== Chained qualification ====================

/// Apply a qualifier chain to any value, materializing intermediates as
/// needed. Struct values get first crack at the chain through their
/// `qualify` fast-path; containers are walked natively.
pub fn qualify_value(value: &Value, qualifiers: &[Qualifier], presence_test: bool) -> Value {
    let mut current = value.clone();
    let mut remaining = qualifiers;
    while !remaining.is_empty() {
        if let Some(short_circuit) = Value::propagate([&current]) {
            return short_circuit;
        }
        let test_here = presence_test && remaining.len() == 1;
        match &current {
            Value::Struct(s) => {
                let (value, consumed) = s.qualify(remaining, presence_test);
                current = value;
                remaining = &remaining[consumed..];
            }
            Value::List(_) => match &remaining[0] {
                Qualifier::Index(i) => {
                    current = if test_here {
                        match &current {
                            Value::List(items) => {
                                Value::Bool(*i >= 0 && (*i as usize) < items.len())
                            }
                            _ => unreachable!(),
                        }
                    } else {
                        current.get_index(*i)
                    };
                    remaining = &remaining[1..];
                }
                other => {
                    return Value::error(ErrorValue::invalid_argument(format!(
                        "cannot apply qualifier {:?} to list",
                        other
                    )))
                }
            },
            Value::Map(_) => {
                let key = match &remaining[0] {
                    Qualifier::Key(key) => key.to_value(),
                    // `a.b` where `a` is a map selects by string key.
                    Qualifier::FieldName(name) => Value::from(name.as_ref()),
                    Qualifier::Index(i) => Value::Int(*i),
                    other => {
                        return Value::error(ErrorValue::invalid_argument(format!(
                            "cannot apply qualifier {:?} to map",
                            other
                        )))
                    }
                };
                current = if test_here {
                    current.has_key(&key)
                } else {
                    current.get_key(&key)
                };
                remaining = &remaining[1..];
            }
            other => {
                return Value::error(ErrorValue::unimplemented(format!(
                    "cannot qualify value of type {}",
                    other.value_type()
                )));
            }
        }
    }
    current
}

// ==================== Protobuf bridge ====================

/// A protobuf message exposed as a struct value.
#[derive(Clone)]
pub struct ProtoStructValue {
    message: Handle<DynamicMessage>,
    type_name: Arc<str>,
}

impl ProtoStructValue {
    /// Wrap a dynamic message under the reference-counting discipline.
    pub fn new(message: DynamicMessage) -> Self {
        Self::from_handle(Arc::new(message).into())
    }

    /// Wrap a dynamic message, placing it through `memory`.
    pub fn new_in(message: DynamicMessage, memory: &MemoryManager) -> Self {
        Self::from_handle(memory.allocate(message))
    }

    fn from_handle(message: Handle<DynamicMessage>) -> Self {
        let type_name = Arc::from(message.descriptor().full_name());
        Self { message, type_name }
    }

    /// The underlying message.
    pub fn message(&self) -> &DynamicMessage {
        &self.message
    }

    /// The message descriptor.
    pub fn descriptor(&self) -> MessageDescriptor {
        self.message.descriptor()
    }

    fn field_value(&self, field: &FieldDescriptor) -> Value {
        // Unset singular message fields (wrappers and otherwise) read as
        // null; scalar fields read their default.
        if !field.is_list() && !field.is_map() {
            if let FieldKind::Message(_) = field.kind() {
                if !self.message.has_field(field) {
                    return Value::Null;
                }
            }
        }
        proto_field_to_value(field, self.message.get_field(field).as_ref())
    }
}

impl StructValueOps for ProtoStructValue {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn get_field_by_name(&self, name: &str) -> Value {
        match self.descriptor().get_field_by_name(name) {
            Some(field) => self.field_value(&field),
            None => Value::error(ErrorValue::no_such_field(name)),
        }
    }

    fn get_field_by_number(&self, number: i32) -> Value {
        match self.descriptor().get_field(number as u32) {
            Some(field) => self.field_value(&field),
            None => Value::error(ErrorValue::no_such_field(number)),
        }
    }

    fn has_field_by_name(&self, name: &str) -> Value {
        match self.descriptor().get_field_by_name(name) {
            Some(field) => Value::Bool(self.message.has_field(&field)),
            None => Value::error(ErrorValue::no_such_field(name)),
        }
    }

    fn has_field_by_number(&self, number: i32) -> Value {
        match self.descriptor().get_field(number as u32) {
            Some(field) => Value::Bool(self.message.has_field(&field)),
            None => Value::error(ErrorValue::no_such_field(number)),
        }
    }

    fn field_count(&self) -> usize {
        self.descriptor()
            .fields()
            .filter(|field| self.message.has_field(field))
            .count()
    }

    fn for_each_field(&self, f: &mut dyn FnMut(&str, Value) -> bool) {
        for field in self.descriptor().fields() {
            if !self.message.has_field(&field) {
                continue;
            }
            if !f(field.name(), self.field_value(&field)) {
                break;
            }
        }
    }

    fn serialize_to(&self, out: &mut Vec<u8>) -> Result<(), ErrorValue> {
        out.extend_from_slice(&self.message.encode_to_vec());
        Ok(())
    }

    fn equals(&self, other: &dyn StructValueOps) -> bool {
        if let Some(other) = other.as_any().downcast_ref::<ProtoStructValue>() {
            self.type_name == other.type_name && self.message == other.message
        } else {
            self.type_name() == other.type_name()
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl fmt::Debug for ProtoStructValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtoStructValue")
            .field("type_name", &self.type_name)
            .finish()
    }
}

// ==================== Proto-to-value conversion ====================

/// Convert one field's proto representation into a value, honoring the
/// repeated/map shape of the field.
pub(crate) fn proto_field_to_value(
    field: &FieldDescriptor,
    value: &prost_reflect::Value,
) -> Value {
    if field.is_map() {
        if let prost_reflect::Value::Map(entries) = value {
            let map: ValueMap = entries
                .iter()
                .map(|(key, value)| {
                    (
                        proto_map_key_to_key(key),
                        proto_scalar_to_value(&map_value_kind(field), value),
                    )
                })
                .collect();
            return shared_map(map);
        }
        return shared_map(ValueMap::new());
    }
    if field.is_list() {
        if let prost_reflect::Value::List(items) = value {
            let kind = field.kind();
            return shared_list(
                items
                    .iter()
                    .map(|item| proto_scalar_to_value(&kind, item))
                    .collect(),
            );
        }
        return shared_list(Vec::new());
    }
    proto_scalar_to_value(&field.kind(), value)
}

fn map_value_kind(field: &FieldDescriptor) -> FieldKind {
    match field.kind() {
        FieldKind::Message(entry) => entry
            .get_field_by_name("value")
            .map(|f| f.kind())
            .unwrap_or(FieldKind::String),
        other => other,
    }
}

fn proto_map_key_to_key(key: &prost_reflect::MapKey) -> MapKey {
    match key {
        prost_reflect::MapKey::Bool(b) => MapKey::Bool(*b),
        prost_reflect::MapKey::I32(i) => MapKey::Int(i64::from(*i)),
        prost_reflect::MapKey::I64(i) => MapKey::Int(*i),
        prost_reflect::MapKey::U32(u) => MapKey::UInt(u64::from(*u)),
        prost_reflect::MapKey::U64(u) => MapKey::UInt(*u),
        prost_reflect::MapKey::String(s) => MapKey::String(Arc::from(s.as_str())),
    }
}

// Scalar (non-repeated) conversion; messages route through the well-known
// type unwrapping.
fn proto_scalar_to_value(kind: &FieldKind, value: &prost_reflect::Value) -> Value {
    match value {
        prost_reflect::Value::Bool(b) => Value::Bool(*b),
        prost_reflect::Value::I32(i) => Value::Int(i64::from(*i)),
        prost_reflect::Value::I64(i) => Value::Int(*i),
        prost_reflect::Value::U32(u) => Value::UInt(u64::from(*u)),
        prost_reflect::Value::U64(u) => Value::UInt(*u),
        prost_reflect::Value::F32(f) => Value::Double(f64::from(*f)),
        prost_reflect::Value::F64(f) => Value::Double(*f),
        prost_reflect::Value::String(s) => Value::from(s.as_str()),
        prost_reflect::Value::Bytes(b) => Value::from(b.as_ref()),
        prost_reflect::Value::EnumNumber(number) => match kind {
            FieldKind::Enum(desc) => Value::Enum(EnumValue::new(
                Type::enum_type(desc.full_name()),
                i64::from(*number),
            )),
            _ => Value::Int(i64::from(*number)),
        },
        prost_reflect::Value::Message(message) => unwrap_message(message.clone()),
        prost_reflect::Value::List(items) => shared_list(
            items
                .iter()
                .map(|item| proto_scalar_to_value(kind, item))
                .collect(),
        ),
        prost_reflect::Value::Map(_) => Value::error(ErrorValue::internal(
            "unexpected map value outside a map field",
        )),
    }
}

/// Unwrap a message into a value under the reference-counting discipline;
/// see [`unwrap_message_in`].
pub fn unwrap_message(message: DynamicMessage) -> Value {
    unwrap_message_in(message, &MemoryManager::reference_counting())
}

/// Unwrap a message into a value, folding the well-known types into their
/// native shapes. Messages outside the table become struct values whose
/// storage is placed through `memory`.
pub fn unwrap_message_in(message: DynamicMessage, memory: &MemoryManager) -> Value {
    let descriptor = message.descriptor();
    match descriptor.full_name() {
        "google.protobuf.Timestamp" => Value::Timestamp(Timestamp::new(
            get_i64_field(&message, "seconds"),
            get_i64_field(&message, "nanos") as i32,
        )),
        "google.protobuf.Duration" => Value::Duration(Duration::new(
            get_i64_field(&message, "seconds"),
            get_i64_field(&message, "nanos") as i32,
        )),
        "google.protobuf.Int32Value" | "google.protobuf.Int64Value" => {
            Value::Int(get_i64_field(&message, "value"))
        }
        "google.protobuf.UInt32Value" | "google.protobuf.UInt64Value" => {
            Value::UInt(get_u64_field(&message, "value"))
        }
        "google.protobuf.FloatValue" | "google.protobuf.DoubleValue" => {
            Value::Double(get_f64_field(&message, "value"))
        }
        "google.protobuf.BoolValue" => {
            let field = descriptor.get_field_by_name("value");
            let value = field
                .map(|f| matches!(message.get_field(&f).as_ref(), prost_reflect::Value::Bool(true)))
                .unwrap_or(false);
            Value::Bool(value)
        }
        "google.protobuf.StringValue" => {
            match message
                .descriptor()
                .get_field_by_name("value")
                .map(|f| message.get_field(&f).into_owned())
            {
                Some(prost_reflect::Value::String(s)) => Value::from(s),
                _ => Value::from(""),
            }
        }
        "google.protobuf.BytesValue" => {
            match message
                .descriptor()
                .get_field_by_name("value")
                .map(|f| message.get_field(&f).into_owned())
            {
                Some(prost_reflect::Value::Bytes(b)) => Value::from(b.as_ref()),
                _ => Value::from(&b""[..]),
            }
        }
        "google.protobuf.Value" => unwrap_json_value(&message),
        "google.protobuf.Struct" => unwrap_json_struct(&message),
        "google.protobuf.ListValue" => unwrap_json_list(&message),
        "google.protobuf.Any" => unwrap_any(&message),
        _ => Value::Struct(StructValue::new(ProtoStructValue::new_in(message, memory))),
    }
}

fn get_i64_field(message: &DynamicMessage, name: &str) -> i64 {
    match message.descriptor().get_field_by_name(name) {
        Some(field) => match message.get_field(&field).as_ref() {
            prost_reflect::Value::I64(v) => *v,
            prost_reflect::Value::I32(v) => i64::from(*v),
            _ => 0,
        },
        None => 0,
    }
}

fn get_u64_field(message: &DynamicMessage, name: &str) -> u64 {
    match message.descriptor().get_field_by_name(name) {
        Some(field) => match message.get_field(&field).as_ref() {
            prost_reflect::Value::U64(v) => *v,
            prost_reflect::Value::U32(v) => u64::from(*v),
            _ => 0,
        },
        None => 0,
    }
}

fn get_f64_field(message: &DynamicMessage, name: &str) -> f64 {
    match message.descriptor().get_field_by_name(name) {
        Some(field) => match message.get_field(&field).as_ref() {
            prost_reflect::Value::F64(v) => *v,
            prost_reflect::Value::F32(v) => f64::from(*v),
            _ => 0.0,
        },
        None => 0.0,
    }
}

// google.protobuf.Value carries a oneof over null/number/string/bool/
// struct/list; an empty oneof reads as null.
fn unwrap_json_value(message: &DynamicMessage) -> Value {
    let descriptor = message.descriptor();
    for name in [
        "null_value",
        "number_value",
        "string_value",
        "bool_value",
        "struct_value",
        "list_value",
    ] {
        let Some(field) = descriptor.get_field_by_name(name) else {
            continue;
        };
        if !message.has_field(&field) {
            continue;
        }
        let value = message.get_field(&field);
        return match value.as_ref() {
            prost_reflect::Value::F64(f) => Value::Double(*f),
            prost_reflect::Value::String(s) => Value::from(s.as_str()),
            prost_reflect::Value::Bool(b) => Value::Bool(*b),
            prost_reflect::Value::Message(m)
                if m.descriptor().full_name() == "google.protobuf.Struct" =>
            {
                unwrap_json_struct(m)
            }
            prost_reflect::Value::Message(m) => unwrap_json_list(m),
            _ => Value::Null,
        };
    }
    Value::Null
}

fn unwrap_json_struct(message: &DynamicMessage) -> Value {
    let Some(field) = message.descriptor().get_field_by_name("fields") else {
        return shared_map(ValueMap::new());
    };
    match message.get_field(&field).as_ref() {
        prost_reflect::Value::Map(entries) => {
            let map: ValueMap = entries
                .iter()
                .map(|(key, value)| {
                    let value = match value {
                        prost_reflect::Value::Message(m) => unwrap_json_value(m),
                        _ => Value::Null,
                    };
                    (proto_map_key_to_key(key), value)
                })
                .collect();
            shared_map(map)
        }
        _ => shared_map(ValueMap::new()),
    }
}

fn unwrap_json_list(message: &DynamicMessage) -> Value {
    let Some(field) = message.descriptor().get_field_by_name("values") else {
        return shared_list(Vec::new());
    };
    match message.get_field(&field).as_ref() {
        prost_reflect::Value::List(items) => shared_list(
            items
                .iter()
                .map(|item| match item {
                    prost_reflect::Value::Message(m) => unwrap_json_value(m),
                    _ => Value::Null,
                })
                .collect(),
        ),
        _ => shared_list(Vec::new()),
    }
}

// Any unwraps through the message's own descriptor pool; an unrecognized
// type URL surfaces as `unimplemented`, matching the original behavior of
// comparison and serialization on unresolved Any values.
fn unwrap_any(message: &DynamicMessage) -> Value {
    let descriptor = message.descriptor();
    let type_url = match descriptor
        .get_field_by_name("type_url")
        .map(|f| message.get_field(&f).into_owned())
    {
        Some(prost_reflect::Value::String(s)) => s,
        _ => String::new(),
    };
    let payload = match descriptor
        .get_field_by_name("value")
        .map(|f| message.get_field(&f).into_owned())
    {
        Some(prost_reflect::Value::Bytes(b)) => b,
        _ => Default::default(),
    };
    let full_name = type_url.rsplit('/').next().unwrap_or("");
    let pool = descriptor.parent_pool();
    let Some(inner_descriptor) = pool.get_message_by_name(full_name) else {
        return Value::error(ErrorValue::unimplemented(format!(
            "unrecognized type URL: {}",
            type_url
        )));
    };
    match DynamicMessage::decode(inner_descriptor, payload) {
        Ok(inner) => unwrap_message(inner),
        Err(err) => Value::error(ErrorValue::invalid_argument(format!(
            "malformed Any payload for {}: {}",
            type_url, err
        ))),
    }
}

// ==================== Value-to-proto conversion ====================

/// Convert a value into the proto representation a field expects,
/// checking kinds and numeric ranges. `Ok(None)` means "leave the field
/// unset" (null written to a message-typed field).
pub(crate) fn value_to_proto_field(
    field: &FieldDescriptor,
    value: &Value,
) -> Result<Option<prost_reflect::Value>, ErrorValue> {
    if field.is_map() {
        let Value::Map(map) = value else {
            return Err(field_mismatch(field, value));
        };
        let value_kind = map_value_kind(field);
        let key_kind = match field.kind() {
            FieldKind::Message(entry) => entry
                .get_field_by_name("key")
                .map(|f| f.kind())
                .unwrap_or(FieldKind::String),
            other => other,
        };
        let mut entries = HashMap::with_capacity(map.len());
        for (key, entry_value) in map.iter() {
            let proto_key = key_to_proto_map_key(&key_kind, key)
                .ok_or_else(|| field_mismatch(field, value))?;
            let proto_value = value_to_proto_scalar(&value_kind, entry_value)
                .map_err(|e| e.contextualize(field))?;
            entries.insert(proto_key, proto_value);
        }
        return Ok(Some(prost_reflect::Value::Map(entries)));
    }
    if field.is_list() {
        let Value::List(items) = value else {
            return Err(field_mismatch(field, value));
        };
        let kind = field.kind();
        let mut elements = Vec::with_capacity(items.len());
        for item in items.iter() {
            elements.push(value_to_proto_scalar(&kind, item).map_err(|e| e.contextualize(field))?);
        }
        return Ok(Some(prost_reflect::Value::List(elements)));
    }
    if value.is_null() {
        return match field.kind() {
            // Null clears presence-bearing message fields.
            FieldKind::Message(_) => Ok(None),
            _ => Err(field_mismatch(field, value)),
        };
    }
    value_to_proto_scalar(&field.kind(), value)
        .map(Some)
        .map_err(|e| e.contextualize(field))
}

struct ConversionFailure {
    error: ErrorValue,
}

impl ConversionFailure {
    fn mismatch(expected: impl fmt::Display, value: &Value) -> Self {
        Self {
            error: ErrorValue::invalid_argument(format!(
                "expected {}, got {}",
                expected,
                value.value_type()
            )),
        }
    }

    fn out_of_range(target: &str, value: &Value) -> Self {
        Self {
            error: ErrorValue::out_of_range(format!(
                "value {} out of range for {}",
                value.debug_string(),
                target
            )),
        }
    }

    fn contextualize(self, field: &FieldDescriptor) -> ErrorValue {
        ErrorValue::new(
            self.error.code,
            format!("field {}: {}", field.name(), self.error.message),
        )
    }
}

fn field_mismatch(field: &FieldDescriptor, value: &Value) -> ErrorValue {
    ErrorValue::invalid_argument(format!(
        "field {}: incompatible value of type {}",
        field.name(),
        value.value_type()
    ))
}

fn key_to_proto_map_key(kind: &FieldKind, key: &MapKey) -> Option<prost_reflect::MapKey> {
    Some(match (kind, key) {
        (FieldKind::Bool, MapKey::Bool(b)) => prost_reflect::MapKey::Bool(*b),
        (FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32, MapKey::Int(i)) => {
            prost_reflect::MapKey::I32(i32::try_from(*i).ok()?)
        }
        (FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64, MapKey::Int(i)) => {
            prost_reflect::MapKey::I64(*i)
        }
        (FieldKind::Uint32 | FieldKind::Fixed32, MapKey::UInt(u)) => {
            prost_reflect::MapKey::U32(u32::try_from(*u).ok()?)
        }
        (FieldKind::Uint64 | FieldKind::Fixed64, MapKey::UInt(u)) => {
            prost_reflect::MapKey::U64(*u)
        }
        (FieldKind::String, MapKey::String(s)) => prost_reflect::MapKey::String(s.to_string()),
        _ => return None,
    })
}

fn value_to_proto_scalar(
    kind: &FieldKind,
    value: &Value,
) -> Result<prost_reflect::Value, ConversionFailure> {
    match kind {
        FieldKind::Bool => match value {
            Value::Bool(b) => Ok(prost_reflect::Value::Bool(*b)),
            other => Err(ConversionFailure::mismatch("bool", other)),
        },
        FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32 => match value {
            Value::Int(i) => i32::try_from(*i)
                .map(prost_reflect::Value::I32)
                .map_err(|_| ConversionFailure::out_of_range("int32", value)),
            other => Err(ConversionFailure::mismatch("int", other)),
        },
        FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64 => match value {
            Value::Int(i) => Ok(prost_reflect::Value::I64(*i)),
            other => Err(ConversionFailure::mismatch("int", other)),
        },
        FieldKind::Uint32 | FieldKind::Fixed32 => match value {
            Value::UInt(u) => u32::try_from(*u)
                .map(prost_reflect::Value::U32)
                .map_err(|_| ConversionFailure::out_of_range("uint32", value)),
            other => Err(ConversionFailure::mismatch("uint", other)),
        },
        FieldKind::Uint64 | FieldKind::Fixed64 => match value {
            Value::UInt(u) => Ok(prost_reflect::Value::U64(*u)),
            other => Err(ConversionFailure::mismatch("uint", other)),
        },
        FieldKind::Float => match value {
            Value::Double(d) => Ok(prost_reflect::Value::F32(*d as f32)),
            other => Err(ConversionFailure::mismatch("double", other)),
        },
        FieldKind::Double => match value {
            Value::Double(d) => Ok(prost_reflect::Value::F64(*d)),
            other => Err(ConversionFailure::mismatch("double", other)),
        },
        FieldKind::String => match value {
            Value::String(s) => Ok(prost_reflect::Value::String(s.to_string())),
            other => Err(ConversionFailure::mismatch("string", other)),
        },
        FieldKind::Bytes => match value {
            Value::Bytes(b) => Ok(prost_reflect::Value::Bytes(
                prost::bytes::Bytes::copy_from_slice(b),
            )),
            other => Err(ConversionFailure::mismatch("bytes", other)),
        },
        FieldKind::Enum(descriptor) => match value {
            Value::Int(i) => i32::try_from(*i)
                .map(prost_reflect::Value::EnumNumber)
                .map_err(|_| ConversionFailure::out_of_range("enum", value)),
            Value::Enum(e) => {
                if e.enum_type == Type::enum_type(descriptor.full_name()) {
                    i32::try_from(e.value)
                        .map(prost_reflect::Value::EnumNumber)
                        .map_err(|_| ConversionFailure::out_of_range("enum", value))
                } else {
                    Err(ConversionFailure::mismatch(descriptor.full_name(), value))
                }
            }
            other => Err(ConversionFailure::mismatch("enum", other)),
        },
        FieldKind::Message(descriptor) => value_to_proto_message(descriptor, value)
            .map(prost_reflect::Value::Message),
    }
}

fn value_to_proto_message(
    descriptor: &MessageDescriptor,
    value: &Value,
) -> Result<DynamicMessage, ConversionFailure> {
    let full_name = descriptor.full_name();
    match full_name {
        "google.protobuf.Timestamp" => match value {
            Value::Timestamp(t) => {
                Ok(new_seconds_nanos_message(descriptor, t.seconds, t.nanos))
            }
            other => Err(ConversionFailure::mismatch(full_name, other)),
        },
        "google.protobuf.Duration" => match value {
            Value::Duration(d) => {
                Ok(new_seconds_nanos_message(descriptor, d.seconds, d.nanos))
            }
            other => Err(ConversionFailure::mismatch(full_name, other)),
        },
        "google.protobuf.Int32Value" => match value {
            Value::Int(i) => {
                let narrow = i32::try_from(*i)
                    .map_err(|_| ConversionFailure::out_of_range("int32", value))?;
                Ok(new_wrapper_message(
                    descriptor,
                    prost_reflect::Value::I32(narrow),
                ))
            }
            other => Err(ConversionFailure::mismatch(full_name, other)),
        },
        "google.protobuf.Int64Value" => match value {
            Value::Int(i) => Ok(new_wrapper_message(
                descriptor,
                prost_reflect::Value::I64(*i),
            )),
            other => Err(ConversionFailure::mismatch(full_name, other)),
        },
        "google.protobuf.UInt32Value" => match value {
            Value::UInt(u) => {
                let narrow = u32::try_from(*u)
                    .map_err(|_| ConversionFailure::out_of_range("uint32", value))?;
                Ok(new_wrapper_message(
                    descriptor,
                    prost_reflect::Value::U32(narrow),
                ))
            }
            other => Err(ConversionFailure::mismatch(full_name, other)),
        },
        "google.protobuf.UInt64Value" => match value {
            Value::UInt(u) => Ok(new_wrapper_message(
                descriptor,
                prost_reflect::Value::U64(*u),
            )),
            other => Err(ConversionFailure::mismatch(full_name, other)),
        },
        "google.protobuf.FloatValue" => match value {
            Value::Double(d) => Ok(new_wrapper_message(
                descriptor,
                prost_reflect::Value::F32(*d as f32),
            )),
            other => Err(ConversionFailure::mismatch(full_name, other)),
        },
        "google.protobuf.DoubleValue" => match value {
            Value::Double(d) => Ok(new_wrapper_message(
                descriptor,
                prost_reflect::Value::F64(*d),
            )),
            other => Err(ConversionFailure::mismatch(full_name, other)),
        },
        "google.protobuf.BoolValue" => match value {
            Value::Bool(b) => Ok(new_wrapper_message(
                descriptor,
                prost_reflect::Value::Bool(*b),
            )),
            other => Err(ConversionFailure::mismatch(full_name, other)),
        },
        "google.protobuf.StringValue" => match value {
            Value::String(s) => Ok(new_wrapper_message(
                descriptor,
                prost_reflect::Value::String(s.to_string()),
            )),
            other => Err(ConversionFailure::mismatch(full_name, other)),
        },
        "google.protobuf.BytesValue" => match value {
            Value::Bytes(b) => Ok(new_wrapper_message(
                descriptor,
                prost_reflect::Value::Bytes(prost::bytes::Bytes::copy_from_slice(b)),
            )),
            other => Err(ConversionFailure::mismatch(full_name, other)),
        },
        "google.protobuf.Value" | "google.protobuf.Struct" | "google.protobuf.ListValue" => {
            crate::wire::value_to_json_message(descriptor, value).map_err(|error| {
                ConversionFailure { error }
            })
        }
        "google.protobuf.Any" => match crate::wire::convert_to_any(value, TYPE_URL_PREFIX) {
            Ok(any) => {
                let mut message = DynamicMessage::new(descriptor.clone());
                set_field_by_name(&mut message, "type_url", prost_reflect::Value::String(any.type_url));
                set_field_by_name(
                    &mut message,
                    "value",
                    prost_reflect::Value::Bytes(prost::bytes::Bytes::from(any.value)),
                );
                Ok(message)
            }
            Err(error) => Err(ConversionFailure { error }),
        },
        _ => match value {
            Value::Struct(s) => {
                if s.type_name() != full_name {
                    return Err(ConversionFailure::mismatch(full_name, value));
                }
                match s.ops().as_any().downcast_ref::<ProtoStructValue>() {
                    Some(proto) => Ok(proto.message().clone()),
                    None => Err(ConversionFailure::mismatch(full_name, value)),
                }
            }
            other => Err(ConversionFailure::mismatch(full_name, other)),
        },
    }
}

fn new_seconds_nanos_message(
    descriptor: &MessageDescriptor,
    seconds: i64,
    nanos: i32,
) -> DynamicMessage {
    let mut message = DynamicMessage::new(descriptor.clone());
    set_field_by_name(&mut message, "seconds", prost_reflect::Value::I64(seconds));
    set_field_by_name(&mut message, "nanos", prost_reflect::Value::I32(nanos));
    message
}

fn new_wrapper_message(
    descriptor: &MessageDescriptor,
    value: prost_reflect::Value,
) -> DynamicMessage {
    let mut message = DynamicMessage::new(descriptor.clone());
    set_field_by_name(&mut message, "value", value);
    message
}

pub(crate) fn set_field_by_name(
    message: &mut DynamicMessage,
    name: &str,
    value: prost_reflect::Value,
) {
    if let Some(field) = message.descriptor().get_field_by_name(name) {
        message.set_field(&field, value);
    }
}
