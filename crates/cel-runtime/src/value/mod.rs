//! Runtime values.
//!
//! `Value` is the discriminated union over every CEL runtime shape:
//! primitives, containers, time types, schema-backed structs, host
//! extensions, and the error/unknown values that carry failure and
//! deferred resolution through an evaluation.
//!
//! # Creating values
//!
//! Primitives convert through `Into`:
//!
//! ```rust
//! use cel_runtime::Value;
//!
//! let v: Value = 42.into();
//! let v: Value = "hello".into();
//! let list = Value::list_of([1, 2, 3]);
//! let map = Value::map_of([("a", 1i64), ("b", 2i64)]);
//! ```
//!
//! Containers with type parameters, checked strings, and range-checked
//! time values come from `ValueFactory` and the builders it hands out.
//!
//! # Errors and unknowns
//!
//! Both are values. Operations consuming inputs call [`Value::propagate`]
//! first: the leftmost error wins, errors beat unknowns, and unknowns
//! merge by set union.

mod error;
mod map;
mod opaque;
mod optional;
mod time;
mod unknown;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use cel_runtime_common::{Kind, Type};

pub use error::{
    ErrorCode, ErrorValue, FUNCTION_RESULT_PAYLOAD_URL, MISSING_ATTRIBUTE_PAYLOAD_URL,
};
pub use map::{MapKey, ValueMap};
pub use opaque::{OpaqueValue, OpaqueValueInterface};
pub use optional::OptionalValue;
pub use time::{Duration, Timestamp};
pub use unknown::{AttributeSelector, AttributeTrail, FunctionResult, UnknownValue};

use crate::bridge::StructValue;
use crate::memory::Handle;

/// A CEL runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Int(i64),
    /// Unsigned 64-bit integer.
    UInt(u64),
    /// IEEE-754 binary64.
    Double(f64),
    /// UTF-8 string; `Arc` for cheap copies.
    String(Arc<str>),
    /// Byte sequence; `Arc` for cheap copies.
    Bytes(Arc<[u8]>),
    /// Signed nanosecond interval.
    Duration(Duration),
    /// Instant with nanosecond resolution.
    Timestamp(Timestamp),
    /// Ordered sequence; storage placed through the allocating manager.
    List(Handle<[Value]>),
    /// Unordered key-value pairs; storage placed through the allocating
    /// manager.
    Map(Handle<ValueMap>),
    /// Schema-backed record, bridged from a host format.
    Struct(StructValue),
    /// A type as a value.
    Type(Type),
    /// Enumeration constant: enum type plus numeric value.
    Enum(EnumValue),
    /// Host extension value.
    Opaque(OpaqueValue),
    /// Present-or-absent optional.
    Optional(OptionalValue),
    /// Evaluation error.
    Error(Arc<ErrorValue>),
    /// Deferred-resolution marker.
    Unknown(Arc<UnknownValue>),
}

/// An enum constant with its type. The numeric value is canonical; names
/// resolve through the reflector.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    /// The enum type (kind `enum`).
    pub enum_type: Type,
    /// The numeric value.
    pub value: i64,
}

impl EnumValue {
    /// Create an enum constant.
    pub fn new(enum_type: Type, value: i64) -> Self {
        Self { enum_type, value }
    }
}

// ==================== Constructors ====================

impl Value {
    /// Create a list from items convertible to values. Literal
    /// constructors use the reference-counting discipline; use
    /// `ValueFactory::list_value` to allocate under a chosen manager.
    pub fn list_of<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        let items: Arc<[Value]> = Arc::from(
            items.into_iter().map(Into::into).collect::<Vec<_>>(),
        );
        Value::List(items.into())
    }

    /// Create a map from key-value pairs, under the reference-counting
    /// discipline; use `ValueFactory::map_value` to allocate under a
    /// chosen manager.
    pub fn map_of<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<MapKey>,
        V: Into<Value>,
    {
        Value::Map(
            Arc::new(ValueMap::from_entries(
                entries.into_iter().map(|(k, v)| (k.into(), v.into())),
            ))
            .into(),
        )
    }

    /// Create an error value.
    pub fn error(error: impl Into<ErrorValue>) -> Self {
        Value::Error(Arc::new(error.into()))
    }

    /// Create an unknown value.
    pub fn unknown(unknown: UnknownValue) -> Self {
        Value::Unknown(Arc::new(unknown))
    }

    /// The absent optional.
    pub fn optional_none() -> Self {
        Value::Optional(OptionalValue::none())
    }

    /// A present optional.
    pub fn optional_of(value: Value) -> Self {
        Value::Optional(OptionalValue::of(value))
    }
}

// ==================== Kind and type ====================

impl Value {
    /// The kind tag of this value. Constant time.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Null => Kind::Null,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) => Kind::Int,
            Value::UInt(_) => Kind::UInt,
            Value::Double(_) => Kind::Double,
            Value::String(_) => Kind::String,
            Value::Bytes(_) => Kind::Bytes,
            Value::Duration(_) => Kind::Duration,
            Value::Timestamp(_) => Kind::Timestamp,
            Value::List(_) => Kind::List,
            Value::Map(_) => Kind::Map,
            Value::Struct(_) => Kind::Struct,
            Value::Type(_) => Kind::Type,
            Value::Enum(_) => Kind::Enum,
            Value::Opaque(_) => Kind::Opaque,
            Value::Optional(_) => Kind::Optional,
            Value::Error(_) => Kind::Error,
            Value::Unknown(_) => Kind::Unknown,
        }
    }

    /// The type classifying this value. Constant time apart from the
    /// present-optional case, which reflects its payload.
    pub fn value_type(&self) -> Type {
        match self {
            Value::Null => Type::Null,
            Value::Bool(_) => Type::Bool,
            Value::Int(_) => Type::Int,
            Value::UInt(_) => Type::UInt,
            Value::Double(_) => Type::Double,
            Value::String(_) => Type::String,
            Value::Bytes(_) => Type::Bytes,
            Value::Duration(_) => Type::Duration,
            Value::Timestamp(_) => Type::Timestamp,
            Value::List(_) => Type::list(Type::Dyn),
            Value::Map(_) => Type::map(Type::Dyn, Type::Dyn),
            Value::Struct(s) => s.struct_type(),
            Value::Type(_) => Type::TypeType,
            Value::Enum(e) => e.enum_type.clone(),
            Value::Opaque(o) => o.opaque_type(),
            Value::Optional(o) => match o.value() {
                None => Type::optional(Type::Dyn),
                Some(inner) => Type::optional(inner.value_type()),
            },
            Value::Error(_) => Type::Error,
            Value::Unknown(_) => Type::Unknown,
        }
    }

    /// True for error values.
    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// True for unknown values.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown(_))
    }

    /// True for null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

// ==================== Propagation ====================

impl Value {
    /// Apply the error/unknown precedence rules to a set of operands, in
    /// evaluation order: the leftmost error wins, an error beats any
    /// unknown, and multiple unknowns merge into one carrying the union of
    /// their trails. Returns `None` when every operand is a plain value.
    pub fn propagate<'a>(operands: impl IntoIterator<Item = &'a Value>) -> Option<Value> {
        let mut merged: Option<UnknownValue> = None;
        for operand in operands {
            match operand {
                Value::Error(_) => return Some(operand.clone()),
                Value::Unknown(unknown) => {
                    merged = Some(match merged {
                        None => unknown.as_ref().clone(),
                        Some(acc) => acc.merge(unknown),
                    });
                }
                _ => {}
            }
        }
        merged.map(Value::unknown)
    }
}

/// Accumulator for the propagation rules, used by builders that consume a
/// stream of values before producing a container.
#[derive(Debug, Default)]
pub(crate) struct PropagationState {
    error: Option<Value>,
    unknown: Option<UnknownValue>,
}

impl PropagationState {
    /// Absorb `value` if it is an error or unknown; returns true if it was
    /// absorbed (and must not be stored as an element).
    pub fn absorb(&mut self, value: &Value) -> bool {
        match value {
            Value::Error(_) => {
                if self.error.is_none() {
                    self.error = Some(value.clone());
                }
                true
            }
            Value::Unknown(unknown) => {
                self.unknown = Some(match self.unknown.take() {
                    None => unknown.as_ref().clone(),
                    Some(acc) => acc.merge(unknown),
                });
                true
            }
            _ => false,
        }
    }

    /// Record an error unless one is already held.
    pub fn record(&mut self, error: ErrorValue) {
        if self.error.is_none() {
            self.error = Some(Value::error(error));
        }
    }

    /// The value that short-circuits the operation, if any.
    pub fn take(&mut self) -> Option<Value> {
        if let Some(error) = self.error.take() {
            return Some(error);
        }
        self.unknown.take().map(Value::unknown)
    }
}

// ==================== Equality ====================

impl Value {
    /// CEL equality with propagation: an error or unknown operand is
    /// returned as-is; otherwise the result is a bool value.
    pub fn equal(&self, other: &Value) -> Value {
        if let Some(short_circuit) = Value::propagate([self, other]) {
            return short_circuit;
        }
        Value::Bool(self == other)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            // IEEE 754: NaN != NaN.
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                if a.len() != b.len() {
                    return false;
                }
                a.iter()
                    .all(|(key, value)| b.get_with_numeric_coercion(key) == Some(value))
            }
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Opaque(a), Value::Opaque(b)) => a == b,
            (Value::Optional(a), Value::Optional(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Unknown(a), Value::Unknown(b)) => a == b,
            // Cross-kind equality holds only between numeric kinds.
            (Value::Int(a), Value::UInt(b)) => *a >= 0 && *a as u64 == *b,
            (Value::UInt(a), Value::Int(b)) => *b >= 0 && *a == *b as u64,
            (Value::Int(a), Value::Double(b)) => int_equals_double(*a, *b),
            (Value::Double(a), Value::Int(b)) => int_equals_double(*b, *a),
            (Value::UInt(a), Value::Double(b)) => uint_equals_double(*a, *b),
            (Value::Double(a), Value::UInt(b)) => uint_equals_double(*b, *a),
            _ => false,
        }
    }
}

// An int equals a double only when the double is the exact image of the
// int; out-of-range doubles compare unequal, never error.
fn int_equals_double(i: i64, d: f64) -> bool {
    if d.is_nan() || d.fract() != 0.0 {
        return false;
    }
    d >= -9_223_372_036_854_775_808.0 && d < 9_223_372_036_854_775_808.0 && d as i64 == i
}

fn uint_equals_double(u: u64, d: f64) -> bool {
    if d.is_nan() || d.fract() != 0.0 {
        return false;
    }
    d >= 0.0 && d < 18_446_744_073_709_551_616.0 && d as u64 == u
}

// ==================== Comparison ====================

impl Value {
    /// Partial ordering for same-kind orderable values and cross-numeric
    /// pairs. `None` for everything else (and for NaN).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
            (Value::Timestamp(a), Value::Timestamp(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::UInt(b)) => {
                if *a < 0 {
                    Some(Ordering::Less)
                } else {
                    (*a as u64).partial_cmp(b)
                }
            }
            (Value::UInt(a), Value::Int(b)) => {
                if *b < 0 {
                    Some(Ordering::Greater)
                } else {
                    a.partial_cmp(&(*b as u64))
                }
            }
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::UInt(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::UInt(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }
}

// ==================== Zero values ====================

impl Value {
    /// True for the kind's neutral element: false, zero numerics, empty
    /// string/bytes/containers, zero duration, epoch timestamp, absent
    /// optional, the type `dyn`, and null.
    pub fn is_zero_value(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(i) => *i == 0,
            Value::UInt(u) => *u == 0,
            Value::Double(d) => *d == 0.0,
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Duration(d) => d.is_zero(),
            Value::Timestamp(t) => *t == Timestamp::epoch(),
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            Value::Struct(s) => s.field_count() == 0,
            Value::Type(t) => *t == Type::Dyn,
            Value::Enum(e) => e.value == 0,
            Value::Opaque(_) => false,
            Value::Optional(o) => !o.has_value(),
            Value::Error(_) | Value::Unknown(_) => false,
        }
    }
}

// ==================== Serialization and conversion ====================

impl Value {
    /// The canonical wire form; see the `wire` module. Values without a
    /// wire form answer `unimplemented`.
    pub fn serialize(&self) -> Result<Vec<u8>, ErrorValue> {
        crate::wire::serialize(self)
    }

    /// Append the canonical wire form to `out`.
    pub fn serialize_to(&self, out: &mut Vec<u8>) -> Result<(), ErrorValue> {
        let bytes = crate::wire::serialize(self)?;
        out.extend_from_slice(&bytes);
        Ok(())
    }

    /// The size of the canonical wire form.
    pub fn serialized_size(&self) -> Result<usize, ErrorValue> {
        crate::wire::serialized_size(self)
    }

    /// Wrap the serialization with a type URL.
    pub fn convert_to_any(&self, prefix: &str) -> Result<crate::wire::AnyValue, ErrorValue> {
        crate::wire::convert_to_any(self, prefix)
    }

    /// The CEL-JSON form; see the `json` module.
    pub fn convert_to_json(&self) -> Result<serde_json::Value, ErrorValue> {
        crate::json::convert_to_json(self)
    }
}

// ==================== Sizes and container access ====================

impl Value {
    /// Emptiness of a sized value as a bool value, with the same kind
    /// coverage as [`Value::size`].
    pub fn is_empty(&self) -> Value {
        match self.size() {
            Value::Int(n) => Value::Bool(n == 0),
            other => other,
        }
    }

    /// The size of a sized value as an int value: code points for strings,
    /// bytes for byte sequences, entries for containers. Other kinds
    /// answer `unimplemented`.
    pub fn size(&self) -> Value {
        if let Some(short_circuit) = Value::propagate([self]) {
            return short_circuit;
        }
        match self {
            Value::String(s) => Value::Int(s.chars().count() as i64),
            Value::Bytes(b) => Value::Int(b.len() as i64),
            Value::List(items) => Value::Int(items.len() as i64),
            Value::Map(map) => Value::Int(map.len() as i64),
            other => Value::error(ErrorValue::unimplemented(format!(
                "size is not supported on {}",
                other.value_type()
            ))),
        }
    }

    /// Positional list access. Out-of-bounds indexes produce an
    /// `out of range` error value.
    pub fn get_index(&self, index: i64) -> Value {
        let mut scratch = Value::Null;
        self.get_index_into(index, &mut scratch).clone()
    }

    /// Positional list access through a caller-provided scratch slot. The
    /// returned borrow aliases either the list storage or the scratch;
    /// callers must not assume which.
    pub fn get_index_into<'a>(&'a self, index: i64, scratch: &'a mut Value) -> &'a Value {
        match self {
            Value::Error(_) | Value::Unknown(_) => self,
            Value::List(items) => {
                if index < 0 || index as usize >= items.len() {
                    *scratch =
                        Value::error(ErrorValue::index_out_of_bounds(index, items.len()));
                    scratch
                } else {
                    &items[index as usize]
                }
            }
            other => {
                *scratch = Value::error(ErrorValue::unimplemented(format!(
                    "index access is not supported on {}",
                    other.value_type()
                )));
                scratch
            }
        }
    }

    /// Map lookup. A missing key produces a `not found` error value; a key
    /// of a non-key kind produces `invalid argument`.
    pub fn get_key(&self, key: &Value) -> Value {
        let mut scratch = Value::Null;
        self.get_key_into(key, &mut scratch).clone()
    }

    /// Map lookup through a caller-provided scratch slot, with the same
    /// aliasing contract as [`Value::get_index_into`].
    pub fn get_key_into<'a>(&'a self, key: &Value, scratch: &'a mut Value) -> &'a Value {
        if let Some(short_circuit) = Value::propagate([self, key]) {
            *scratch = short_circuit;
            return scratch;
        }
        match self {
            Value::Map(map) => match MapKey::from_value(key) {
                Some(map_key) => match map.get_with_numeric_coercion(&map_key) {
                    Some(value) => value,
                    None => {
                        *scratch = Value::error(ErrorValue::no_such_key(key.debug_string()));
                        scratch
                    }
                },
                None => {
                    *scratch = Value::error(ErrorValue::invalid_argument(format!(
                        "invalid map key type: {}",
                        key.value_type()
                    )));
                    scratch
                }
            },
            other => {
                *scratch = Value::error(ErrorValue::unimplemented(format!(
                    "key access is not supported on {}",
                    other.value_type()
                )));
                scratch
            }
        }
    }

    /// Map lookup distinguishing absence from failure: `Ok(None)` when the
    /// key is simply not present.
    pub fn find_key(&self, key: &Value) -> Result<Option<Value>, Value> {
        if let Some(short_circuit) = Value::propagate([self, key]) {
            return Err(short_circuit);
        }
        match self {
            Value::Map(map) => match MapKey::from_value(key) {
                Some(map_key) => Ok(map.get_with_numeric_coercion(&map_key).cloned()),
                None => Err(Value::error(ErrorValue::invalid_argument(format!(
                    "invalid map key type: {}",
                    key.value_type()
                )))),
            },
            _ => Err(Value::error(ErrorValue::unimplemented(format!(
                "key access is not supported on {}",
                self.value_type()
            )))),
        }
    }

    /// Membership test returning a bool value; key-kind misuse is an
    /// `invalid argument` error value.
    pub fn has_key(&self, key: &Value) -> Value {
        match self.find_key(key) {
            Ok(found) => Value::Bool(found.is_some()),
            Err(short_circuit) => short_circuit,
        }
    }

    /// The keys of a map, as a list value in the map's iteration order.
    pub fn list_keys(&self) -> Value {
        if let Some(short_circuit) = Value::propagate([self]) {
            return short_circuit;
        }
        match self {
            Value::Map(map) => {
                let keys: Arc<[Value]> =
                    Arc::from(map.keys().map(MapKey::to_value).collect::<Vec<_>>());
                Value::List(keys.into())
            }
            other => Value::error(ErrorValue::unimplemented(format!(
                "list_keys is not supported on {}",
                other.value_type()
            ))),
        }
    }

    /// Visit list elements until the callback returns `false`.
    pub fn for_each_element(&self, mut f: impl FnMut(usize, &Value) -> bool) {
        if let Value::List(items) = self {
            for (i, item) in items.iter().enumerate() {
                if !f(i, item) {
                    break;
                }
            }
        }
    }
}

// ==================== String and bytes accessors ====================

impl Value {
    /// Substring containment for strings, subsequence containment for
    /// bytes. The argument must match the receiver's kind; other
    /// receivers answer `unimplemented`.
    pub fn contains(&self, needle: &Value) -> Value {
        if let Some(short_circuit) = Value::propagate([self, needle]) {
            return short_circuit;
        }
        match (self, needle) {
            (Value::String(s), Value::String(n)) => Value::Bool(s.contains(&**n)),
            (Value::Bytes(b), Value::Bytes(n)) => Value::Bool(
                n.is_empty() || b.windows(n.len()).any(|window| window == &**n),
            ),
            _ => self.sequence_accessor_failure("contains", needle),
        }
    }

    /// Prefix test for strings and bytes.
    pub fn starts_with(&self, prefix: &Value) -> Value {
        if let Some(short_circuit) = Value::propagate([self, prefix]) {
            return short_circuit;
        }
        match (self, prefix) {
            (Value::String(s), Value::String(p)) => Value::Bool(s.starts_with(&**p)),
            (Value::Bytes(b), Value::Bytes(p)) => Value::Bool(b.starts_with(p)),
            _ => self.sequence_accessor_failure("starts_with", prefix),
        }
    }

    /// Suffix test for strings and bytes.
    pub fn ends_with(&self, suffix: &Value) -> Value {
        if let Some(short_circuit) = Value::propagate([self, suffix]) {
            return short_circuit;
        }
        match (self, suffix) {
            (Value::String(s), Value::String(x)) => Value::Bool(s.ends_with(&**x)),
            (Value::Bytes(b), Value::Bytes(x)) => Value::Bool(b.ends_with(x)),
            _ => self.sequence_accessor_failure("ends_with", suffix),
        }
    }

    // A string/bytes receiver with a mismatched argument is misuse; any
    // other receiver simply lacks the operation.
    fn sequence_accessor_failure(&self, operation: &str, argument: &Value) -> Value {
        match self {
            Value::String(_) | Value::Bytes(_) => {
                Value::error(ErrorValue::invalid_argument(format!(
                    "{} expects {}, got {}",
                    operation,
                    self.value_type(),
                    argument.value_type()
                )))
            }
            other => Value::error(ErrorValue::unimplemented(format!(
                "{} is not supported on {}",
                operation,
                other.value_type()
            ))),
        }
    }
}

// ==================== Debug rendering ====================

impl Value {
    /// Deterministic textual rendering for diagnostics and golden tests.
    pub fn debug_string(&self) -> String {
        self.to_string()
    }
}

/// Render a double in the canonical form: shortest round-trip decimal,
/// `.0` forced onto integral finite values, `nan`, `+infinity`,
/// `-infinity`.
fn format_double(d: f64) -> String {
    if d.is_nan() {
        "nan".to_string()
    } else if d.is_infinite() {
        if d.is_sign_positive() {
            "+infinity".to_string()
        } else {
            "-infinity".to_string()
        }
    } else if d.fract() == 0.0 {
        format!("{:.1}", d)
    } else {
        format!("{}", d)
    }
}

/// Quote a string with C-style escapes for control characters.
pub(crate) fn format_string_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c == '\u{7f}' => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Quote bytes, escaping control bytes and everything at or above 0x7F.
pub(crate) fn format_bytes_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 3);
    out.push_str("b\"");
    for &b in bytes {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7e => out.push(b as char),
            b => out.push_str(&format!("\\x{:02x}", b)),
        }
    }
    out.push('"');
    out
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::UInt(u) => write!(f, "{}u", u),
            Value::Double(d) => f.write_str(&format_double(*d)),
            Value::String(s) => f.write_str(&format_string_literal(s)),
            Value::Bytes(b) => f.write_str(&format_bytes_literal(b)),
            Value::Duration(d) => f.write_str(&d.format_seconds()),
            Value::Timestamp(t) => match t.to_rfc3339() {
                Some(text) => f.write_str(&text),
                None => write!(f, "timestamp({}, {})", t.seconds, t.nanos),
            },
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
            Value::Struct(s) => f.write_str(&s.debug_string()),
            Value::Type(t) => f.write_str(&t.name()),
            Value::Enum(e) => write!(f, "{}({})", e.enum_type.name(), e.value),
            Value::Opaque(o) => f.write_str(&o.debug_string()),
            Value::Optional(o) => match o.value() {
                None => f.write_str("optional.none()"),
                Some(value) => write!(f, "optional.of({})", value),
            },
            Value::Error(e) => write!(f, "error({})", e),
            Value::Unknown(u) => write!(f, "{}", u),
        }
    }
}

// ==================== From implementations ====================

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::UInt(u64::from(u))
    }
}

impl From<u64> for Value {
    fn from(u: u64) -> Self {
        Value::UInt(u)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<Arc<str>> for Value {
    fn from(s: Arc<str>) -> Self {
        Value::String(s)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Bytes(Arc::from(b))
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(Arc::from(b))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        let items: Arc<[Value]> = Arc::from(items);
        Value::List(items.into())
    }
}

impl From<ValueMap> for Value {
    fn from(map: ValueMap) -> Self {
        Value::Map(Arc::new(map).into())
    }
}

impl From<Duration> for Value {
    fn from(d: Duration) -> Self {
        Value::Duration(d)
    }
}

impl From<Timestamp> for Value {
    fn from(t: Timestamp) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Type> for Value {
    fn from(t: Type) -> Self {
        Value::Type(t)
    }
}

impl From<EnumValue> for Value {
    fn from(e: EnumValue) -> Self {
        Value::Enum(e)
    }
}

impl From<OptionalValue> for Value {
    fn from(o: OptionalValue) -> Self {
        Value::Optional(o)
    }
}

impl From<OpaqueValue> for Value {
    fn from(o: OpaqueValue) -> Self {
        Value::Opaque(o)
    }
}

impl From<StructValue> for Value {
    fn from(s: StructValue) -> Self {
        Value::Struct(s)
    }
}

impl From<ErrorValue> for Value {
    fn from(e: ErrorValue) -> Self {
        Value::Error(Arc::new(e))
    }
}

impl From<UnknownValue> for Value {
    fn from(u: UnknownValue) -> Self {
        Value::Unknown(Arc::new(u))
    }
}

// ==================== TryFrom implementations ====================

/// Error returned when extracting a native type from a value of a
/// different kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueTypeError {
    /// The expected kind name.
    pub expected: &'static str,
    /// The kind name actually found.
    pub found: String,
}

impl fmt::Display for ValueTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)
    }
}

impl std::error::Error for ValueTypeError {}

fn type_error(expected: &'static str, found: &Value) -> ValueTypeError {
    ValueTypeError {
        expected,
        found: found.kind().name().to_string(),
    }
}

macro_rules! impl_try_from_copy {
    ($target:ty, $expected:literal, $variant:ident) => {
        impl TryFrom<&Value> for $target {
            type Error = ValueTypeError;

            fn try_from(value: &Value) -> Result<Self, Self::Error> {
                match value {
                    Value::$variant(inner) => Ok(*inner),
                    other => Err(type_error($expected, other)),
                }
            }
        }
    };
}

impl_try_from_copy!(bool, "bool", Bool);
impl_try_from_copy!(i64, "int", Int);
impl_try_from_copy!(u64, "uint", UInt);
impl_try_from_copy!(f64, "double", Double);
impl_try_from_copy!(Duration, "duration", Duration);
impl_try_from_copy!(Timestamp, "timestamp", Timestamp);

impl<'a> TryFrom<&'a Value> for &'a str {
    type Error = ValueTypeError;

    fn try_from(value: &'a Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(s),
            other => Err(type_error("string", other)),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a [u8] {
    type Error = ValueTypeError;

    fn try_from(value: &'a Value) -> Result<Self, Self::Error> {
        match value {
            Value::Bytes(b) => Ok(b),
            other => Err(type_error("bytes", other)),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a [Value] {
    type Error = ValueTypeError;

    fn try_from(value: &'a Value) -> Result<Self, Self::Error> {
        match value {
            Value::List(items) => Ok(&**items),
            other => Err(type_error("list", other)),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a ValueMap {
    type Error = ValueTypeError;

    fn try_from(value: &'a Value) -> Result<Self, Self::Error> {
        match value {
            Value::Map(map) => Ok(&**map),
            other => Err(type_error("map", other)),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a OptionalValue {
    type Error = ValueTypeError;

    fn try_from(value: &'a Value) -> Result<Self, Self::Error> {
        match value {
            Value::Optional(o) => Ok(o),
            other => Err(type_error("optional", other)),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a ErrorValue {
    type Error = ValueTypeError;

    fn try_from(value: &'a Value) -> Result<Self, Self::Error> {
        match value {
            Value::Error(e) => Ok(e.as_ref()),
            other => Err(type_error("*error*", other)),
        }
    }
}

impl<'a> TryFrom<&'a Value> for &'a UnknownValue {
    type Error = ValueTypeError;

    fn try_from(value: &'a Value) -> Result<Self, Self::Error> {
        match value {
            Value::Unknown(u) => Ok(u.as_ref()),
            other => Err(type_error("*unknown*", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_type() {
        let values = [
            Value::Null,
            Value::Bool(true),
            Value::Int(1),
            Value::UInt(1),
            Value::Double(1.0),
            Value::from("s"),
            Value::from(vec![1u8]),
            Value::Duration(Duration::from_seconds(1)),
            Value::Timestamp(Timestamp::epoch()),
            Value::list_of([1, 2]),
            Value::map_of([("a", 1i64)]),
            Value::Type(Type::Int),
            Value::optional_none(),
        ];
        for value in values {
            assert_eq!(value.value_type().kind(), value.kind(), "{:?}", value);
        }
    }

    #[test]
    fn test_cross_numeric_equality() {
        assert_eq!(Value::Int(1), Value::UInt(1));
        assert_eq!(Value::Double(1.0), Value::Int(1));
        assert_eq!(Value::UInt(1), Value::Double(1.0));
        assert_ne!(Value::Int(-1), Value::UInt(1));
        assert_ne!(Value::Double(1.5), Value::Int(1));
        // NaN equals nothing, including itself.
        assert_ne!(Value::Double(f64::NAN), Value::Double(f64::NAN));
        assert_ne!(Value::Double(f64::NAN), Value::Int(0));
        // Out-of-range doubles compare unequal, never error.
        assert_ne!(Value::Double(1e300), Value::Int(i64::MAX));
        assert_ne!(Value::Double(-1.0), Value::UInt(0));
        // 2^63 as a double is exactly representable but exceeds i64.
        assert_ne!(Value::Double(9_223_372_036_854_775_808.0), Value::Int(i64::MAX));
    }

    #[test]
    fn test_non_numeric_cross_kind_is_false_not_error() {
        assert_ne!(Value::from("1"), Value::Int(1));
        assert_ne!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::Null, Value::Int(0));
    }

    #[test]
    fn test_equal_propagates_errors_and_unknowns() {
        let error = Value::error(ErrorValue::internal("boom"));
        let result = Value::Int(1).equal(&error);
        assert!(result.is_error());

        let unknown = Value::unknown(UnknownValue::from_attribute(AttributeTrail::new("x")));
        let result = unknown.equal(&Value::Int(1));
        assert!(result.is_unknown());

        // Error beats unknown regardless of position.
        let result = unknown.equal(&error);
        assert!(result.is_error());

        assert_eq!(Value::Int(1).equal(&Value::Int(1)), Value::Bool(true));
        assert_eq!(Value::Int(1).equal(&Value::Int(2)), Value::Bool(false));
    }

    #[test]
    fn test_propagate_merges_unknowns() {
        let a = Value::unknown(UnknownValue::from_attribute(AttributeTrail::new("a")));
        let b = Value::unknown(UnknownValue::from_attribute(AttributeTrail::new("b")));
        let merged = Value::propagate([&a, &Value::Int(1), &b]).unwrap();
        match merged {
            Value::Unknown(u) => assert_eq!(u.attributes().count(), 2),
            other => panic!("expected unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_propagate_leftmost_error_wins() {
        let first = Value::error(ErrorValue::internal("first"));
        let second = Value::error(ErrorValue::internal("second"));
        let result = Value::propagate([&first, &second]).unwrap();
        match result {
            Value::Error(e) => assert_eq!(e.message, "first"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_equality() {
        assert_eq!(
            Value::optional_none().equal(&Value::optional_none()),
            Value::Bool(true)
        );
        assert_eq!(
            Value::optional_of(Value::Int(1)).equal(&Value::optional_none()),
            Value::Bool(false)
        );
        assert_eq!(
            Value::optional_of(Value::Int(1)).equal(&Value::optional_of(Value::Int(1))),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_list_get() {
        let list = Value::list_of([1, 2, 3]);
        assert_eq!(list.get_index(0), Value::Int(1));
        assert_eq!(list.get_index(2), Value::Int(3));

        let out_of_bounds = list.get_index(3);
        match out_of_bounds {
            Value::Error(e) => assert_eq!(e.code, ErrorCode::OutOfRange),
            other => panic!("expected error, got {:?}", other),
        }
        assert!(list.get_index(-1).is_error());
    }

    #[test]
    fn test_list_get_scratch_aliasing() {
        let list = Value::list_of([10]);
        let mut scratch = Value::Null;
        // In-bounds reads alias storage and leave the scratch untouched.
        assert_eq!(list.get_index_into(0, &mut scratch), &Value::Int(10));
        assert_eq!(scratch, Value::Null);
        // Failed reads land in the scratch.
        assert!(list.get_index_into(9, &mut scratch).is_error());
    }

    #[test]
    fn test_map_get_and_has() {
        let map = Value::map_of([("a", 1i64)]);
        assert_eq!(map.get_key(&Value::from("a")), Value::Int(1));

        let missing = map.get_key(&Value::from("b"));
        match missing {
            Value::Error(e) => assert_eq!(e.code, ErrorCode::NotFound),
            other => panic!("expected error, got {:?}", other),
        }

        assert_eq!(map.has_key(&Value::from("a")), Value::Bool(true));
        assert_eq!(map.has_key(&Value::from("b")), Value::Bool(false));

        let bad_key = map.get_key(&Value::Double(1.5));
        match bad_key {
            Value::Error(e) => assert_eq!(e.code, ErrorCode::InvalidArgument),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_map_numeric_key_equality() {
        let map = Value::map_of([(1i64, "one")]);
        assert_eq!(map.get_key(&Value::UInt(1)), Value::from("one"));
        assert_eq!(
            Value::map_of([(1i64, 10i64)]),
            Value::map_of([(1u64, 10i64)])
        );
    }

    #[test]
    fn test_list_keys() {
        let map = Value::map_of([("b", 2i64), ("a", 1i64)]);
        let keys = map.list_keys();
        assert_eq!(keys, Value::list_of(["a", "b"]));
    }

    #[test]
    fn test_size() {
        assert_eq!(Value::from("héllo").size(), Value::Int(5));
        assert_eq!(Value::from("héllo".as_bytes()).size(), Value::Int(6));
        assert_eq!(Value::list_of([1, 2]).size(), Value::Int(2));
        assert_eq!(Value::map_of([("a", 1i64)]).size(), Value::Int(1));
        assert!(Value::Int(1).size().is_error());
    }

    #[test]
    fn test_zero_values() {
        assert!(Value::Null.is_zero_value());
        assert!(Value::Bool(false).is_zero_value());
        assert!(Value::Int(0).is_zero_value());
        assert!(Value::from("").is_zero_value());
        assert!(Value::list_of(Vec::<Value>::new()).is_zero_value());
        assert!(Value::Timestamp(Timestamp::epoch()).is_zero_value());
        assert!(Value::Duration(Duration::from_seconds(0)).is_zero_value());
        assert!(Value::optional_none().is_zero_value());
        assert!(Value::Type(Type::Dyn).is_zero_value());

        assert!(!Value::Bool(true).is_zero_value());
        assert!(!Value::Int(1).is_zero_value());
        assert!(!Value::Type(Type::Int).is_zero_value());
        assert!(!Value::optional_of(Value::Int(0)).is_zero_value());
    }

    #[test]
    fn test_debug_strings() {
        assert_eq!(Value::Null.debug_string(), "null");
        assert_eq!(Value::Int(-3).debug_string(), "-3");
        assert_eq!(Value::UInt(42).debug_string(), "42u");
        assert_eq!(Value::Double(1.0).debug_string(), "1.0");
        assert_eq!(Value::Double(1.5).debug_string(), "1.5");
        assert_eq!(Value::Double(f64::NAN).debug_string(), "nan");
        assert_eq!(Value::Double(f64::INFINITY).debug_string(), "+infinity");
        assert_eq!(Value::Double(f64::NEG_INFINITY).debug_string(), "-infinity");
        assert_eq!(Value::from("a\"b\n").debug_string(), "\"a\\\"b\\n\"");
        assert_eq!(
            Value::from(vec![0x68u8, 0x69, 0xff]).debug_string(),
            "b\"hi\\xff\""
        );
        assert_eq!(Value::list_of([1, 2]).debug_string(), "[1, 2]");
        assert_eq!(
            Value::map_of([("a", 1i64)]).debug_string(),
            "{\"a\": 1}"
        );
        assert_eq!(Value::Type(Type::Int).debug_string(), "int");
        assert_eq!(
            Value::Duration(Duration::new(3, 500_000_000)).debug_string(),
            "3.500s"
        );
    }

    #[test]
    fn test_debug_string_deterministic() {
        let value = Value::map_of([("b", 2i64), ("a", 1i64)]);
        assert_eq!(value.debug_string(), value.debug_string());
    }

    #[test]
    fn test_compare() {
        assert_eq!(Value::Int(1).compare(&Value::Int(2)), Some(Ordering::Less));
        assert_eq!(
            Value::Int(-1).compare(&Value::UInt(0)),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::UInt(1).compare(&Value::Int(-1)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::Double(1.5).compare(&Value::Int(1)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Double(f64::NAN).compare(&Value::Double(1.0)), None);
        assert_eq!(Value::from("a").compare(&Value::Int(1)), None);
        assert_eq!(
            Value::Timestamp(Timestamp::new(1, 0))
                .compare(&Value::Timestamp(Timestamp::new(2, 0))),
            Some(Ordering::Less)
        );
    }

    #[test]
    fn test_string_contains_family() {
        let haystack = Value::from("héllo world");
        assert_eq!(haystack.contains(&Value::from("llo w")), Value::Bool(true));
        assert_eq!(haystack.contains(&Value::from("xyz")), Value::Bool(false));
        assert_eq!(haystack.contains(&Value::from("")), Value::Bool(true));
        assert_eq!(
            haystack.starts_with(&Value::from("héllo")),
            Value::Bool(true)
        );
        assert_eq!(haystack.starts_with(&Value::from("world")), Value::Bool(false));
        assert_eq!(haystack.ends_with(&Value::from("world")), Value::Bool(true));
        assert_eq!(haystack.ends_with(&Value::from("héllo")), Value::Bool(false));
    }

    #[test]
    fn test_bytes_contains_family() {
        let haystack = Value::from(vec![0u8, 1, 2, 3, 255]);
        assert_eq!(
            haystack.contains(&Value::from(vec![2u8, 3])),
            Value::Bool(true)
        );
        assert_eq!(
            haystack.contains(&Value::from(vec![3u8, 2])),
            Value::Bool(false)
        );
        assert_eq!(
            haystack.contains(&Value::from(Vec::<u8>::new())),
            Value::Bool(true)
        );
        assert_eq!(
            haystack.starts_with(&Value::from(vec![0u8, 1])),
            Value::Bool(true)
        );
        assert_eq!(
            haystack.ends_with(&Value::from(vec![3u8, 255])),
            Value::Bool(true)
        );
        assert_eq!(
            haystack.ends_with(&Value::from(vec![0u8])),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_contains_family_kind_errors() {
        // Mismatched argument kind against a sequence receiver.
        let mixed = Value::from("text").contains(&Value::from(vec![1u8]));
        match mixed {
            Value::Error(e) => assert_eq!(e.code, ErrorCode::InvalidArgument),
            other => panic!("expected error, got {:?}", other),
        }

        // Non-sequence receivers lack the operation entirely.
        let unsupported = Value::Int(1).starts_with(&Value::from("1"));
        match unsupported {
            Value::Error(e) => assert_eq!(e.code, ErrorCode::Unimplemented),
            other => panic!("expected error, got {:?}", other),
        }

        // Error operands propagate ahead of kind checks.
        let error = Value::error(ErrorValue::internal("boom"));
        assert!(Value::from("text").ends_with(&error).is_error());
        assert!(error.contains(&Value::from("x")).is_error());
    }

    #[test]
    fn test_serialization_methods() {
        let value = Value::Int(3);
        let bytes = value.serialize().unwrap();
        assert_eq!(value.serialized_size().unwrap(), bytes.len());

        let mut out = Vec::new();
        value.serialize_to(&mut out).unwrap();
        assert_eq!(out, bytes);

        let any = value.convert_to_any("type.googleapis.com").unwrap();
        assert_eq!(
            any.type_url,
            "type.googleapis.com/google.protobuf.Int64Value"
        );
        assert_eq!(value.convert_to_json().unwrap(), serde_json::json!(3));
    }

    #[test]
    fn test_is_empty() {
        assert_eq!(Value::from("").is_empty(), Value::Bool(true));
        assert_eq!(Value::list_of([1]).is_empty(), Value::Bool(false));
        assert_eq!(Value::map_of([("a", 1i64)]).is_empty(), Value::Bool(false));
        assert!(Value::Int(1).is_empty().is_error());
    }

    #[test]
    fn test_try_from_extraction() {
        let value = Value::Int(42);
        assert_eq!(i64::try_from(&value), Ok(42));

        let value = Value::from("hello");
        assert_eq!(<&str>::try_from(&value), Ok("hello"));

        let err = i64::try_from(&Value::from("hello")).unwrap_err();
        assert_eq!(err.expected, "int");
        assert_eq!(err.found, "string");
    }
}
