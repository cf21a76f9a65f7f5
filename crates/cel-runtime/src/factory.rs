//! Value construction.
//!
//! `ValueFactory` is the checked entry point for values: it validates
//! UTF-8 on the checked string path, enforces the duration/timestamp
//! bounds, vends the builtin zero-value singletons, and carries the
//! memory manager and type factory alongside every evaluation.
//!
//! Primitive values are constructed inline; list, map, and struct storage
//! is placed through the factory's memory manager, as is the output of
//! every builder the reflector hands out against this factory.

use std::sync::{Arc, OnceLock};

use cel_runtime_common::{Kind, Type, TypeFactory};

use crate::bridge::{ProtoStructValue, StructValue, StructValueOps};
use crate::memory::{Handle, MemoryManager};
use crate::value::{
    Duration, EnumValue, ErrorValue, OpaqueValueInterface, OptionalValue, Timestamp, Value,
    ValueMap,
};

/// Factory for runtime values.
#[derive(Debug)]
pub struct ValueFactory {
    types: TypeFactory,
    memory: MemoryManager,
}

impl ValueFactory {
    /// Create a factory under the given memory discipline.
    pub fn new(memory: MemoryManager) -> Self {
        Self {
            types: TypeFactory::new(),
            memory,
        }
    }

    /// The type factory carried by this value factory.
    pub fn type_factory(&self) -> &TypeFactory {
        &self.types
    }

    /// The memory manager carried by this factory. Evaluations allocate
    /// scratch through it; handles must not outlive their manager's
    /// evaluation.
    pub fn memory_manager(&self) -> &MemoryManager {
        &self.memory
    }

    /// Allocate evaluation-scoped scratch under the active discipline.
    pub fn allocate_scratch<T>(&self, value: T) -> Handle<T> {
        self.memory.allocate(value)
    }

    // ==================== Primitives ====================

    /// The null value.
    pub fn null_value(&self) -> Value {
        Value::Null
    }

    /// A bool value.
    pub fn bool_value(&self, value: bool) -> Value {
        Value::Bool(value)
    }

    /// An int value.
    pub fn int_value(&self, value: i64) -> Value {
        Value::Int(value)
    }

    /// A uint value.
    pub fn uint_value(&self, value: u64) -> Value {
        Value::UInt(value)
    }

    /// A double value.
    pub fn double_value(&self, value: f64) -> Value {
        Value::Double(value)
    }

    /// A string value from text that is already valid UTF-8. This is the
    /// unchecked constructor; Rust's type system carries the validity
    /// proof.
    pub fn string_value(&self, value: impl Into<Arc<str>>) -> Value {
        Value::String(value.into())
    }

    /// The checked string constructor: validates UTF-8 and answers
    /// `invalid argument` for malformed input. This is the byte-to-string
    /// coercion site.
    pub fn string_value_from_bytes(&self, bytes: &[u8]) -> Result<Value, ErrorValue> {
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(Value::String(Arc::from(text))),
            Err(_) => Err(ErrorValue::malformed_utf8()),
        }
    }

    /// A bytes value.
    pub fn bytes_value(&self, value: impl Into<Arc<[u8]>>) -> Value {
        Value::Bytes(value.into())
    }

    // ==================== Time ====================

    /// A duration value, rejected with `out of range` beyond ±10,000
    /// years.
    pub fn duration_value(&self, duration: Duration) -> Result<Value, ErrorValue> {
        if !duration.is_in_range() {
            return Err(ErrorValue::out_of_range(format!(
                "duration out of range: {}s",
                duration.seconds
            )));
        }
        Ok(Value::Duration(duration))
    }

    /// A duration from whole seconds, range-checked.
    pub fn duration_from_seconds(&self, seconds: i64) -> Result<Value, ErrorValue> {
        self.duration_value(Duration::from_seconds(seconds))
    }

    /// A timestamp value, rejected with `out of range` beyond ±10,000
    /// years from the epoch.
    pub fn timestamp_value(&self, timestamp: Timestamp) -> Result<Value, ErrorValue> {
        if !timestamp.is_in_range() {
            return Err(ErrorValue::out_of_range(format!(
                "timestamp out of range: {}s",
                timestamp.seconds
            )));
        }
        Ok(Value::Timestamp(timestamp))
    }

    /// A timestamp from whole seconds since the epoch, range-checked.
    pub fn timestamp_from_seconds(&self, seconds: i64) -> Result<Value, ErrorValue> {
        self.timestamp_value(Timestamp::from_seconds(seconds))
    }

    // ==================== Composite ====================

    /// A type value.
    pub fn type_value(&self, ty: Type) -> Value {
        Value::Type(ty)
    }

    /// An enum value; the type must have kind `enum`.
    pub fn enum_value(&self, enum_type: Type, value: i64) -> Result<Value, ErrorValue> {
        if enum_type.kind() != Kind::Enum {
            return Err(ErrorValue::invalid_argument(format!(
                "expected an enum type, got {}",
                enum_type
            )));
        }
        Ok(Value::Enum(EnumValue::new(enum_type, value)))
    }

    /// The absent optional.
    pub fn optional_none(&self) -> Value {
        Value::Optional(OptionalValue::none())
    }

    /// A present optional.
    pub fn optional_of(&self, value: Value) -> Value {
        Value::Optional(OptionalValue::of(value))
    }

    /// A list value whose storage is placed through the factory's memory
    /// manager. Builders obtained from the reflector remain the checked
    /// construction path; this is the direct one for pre-validated
    /// elements.
    pub fn list_value(&self, items: impl IntoIterator<Item = Value>) -> Value {
        Value::List(self.memory.allocate_slice(items.into_iter().collect()))
    }

    /// A map value whose storage is placed through the factory's memory
    /// manager. Entries are taken as-is; the map builder is the checked
    /// path.
    pub fn map_value(&self, map: ValueMap) -> Value {
        Value::Map(self.memory.allocate(map))
    }

    /// A host extension value.
    pub fn opaque_value(&self, value: impl OpaqueValueInterface + 'static) -> Value {
        Value::Opaque(crate::value::OpaqueValue::new(value))
    }

    /// A struct value over a bridge implementation.
    pub fn struct_value(&self, ops: impl StructValueOps + 'static) -> Value {
        Value::Struct(StructValue::new(ops))
    }

    /// A value from a protobuf message, unwrapping well-known types into
    /// their native shapes. Struct storage is placed through the
    /// factory's memory manager.
    pub fn message_value(&self, message: prost_reflect::DynamicMessage) -> Value {
        crate::bridge::unwrap_message_in(message, &self.memory)
    }

    /// A struct value from a protobuf message without well-known-type
    /// unwrapping, placed through the factory's memory manager.
    pub fn raw_message_value(&self, message: prost_reflect::DynamicMessage) -> Value {
        Value::Struct(StructValue::new(ProtoStructValue::new_in(
            message,
            &self.memory,
        )))
    }

    // ==================== Zero-value singletons ====================

    /// The empty string value.
    pub fn empty_string(&self) -> Value {
        static EMPTY: OnceLock<Value> = OnceLock::new();
        EMPTY.get_or_init(|| Value::String(Arc::from(""))).clone()
    }

    /// The empty bytes value.
    pub fn empty_bytes(&self) -> Value {
        static EMPTY: OnceLock<Value> = OnceLock::new();
        EMPTY
            .get_or_init(|| Value::Bytes(Arc::from(&b""[..])))
            .clone()
    }

    /// The empty `list(dyn)` value. Process-lifetime singletons are
    /// reference-counted regardless of the factory's discipline.
    pub fn empty_list(&self) -> Value {
        static EMPTY: OnceLock<Value> = OnceLock::new();
        EMPTY
            .get_or_init(|| {
                let items: Arc<[Value]> = Arc::from(Vec::new());
                Value::List(items.into())
            })
            .clone()
    }

    /// The empty `map(dyn, dyn)` value.
    pub fn empty_map(&self) -> Value {
        static EMPTY: OnceLock<Value> = OnceLock::new();
        EMPTY
            .get_or_init(|| Value::Map(Arc::new(ValueMap::new()).into()))
            .clone()
    }

    /// The default error value, used where an error is required but none
    /// was supplied.
    pub fn default_error_value(&self) -> Value {
        static DEFAULT: OnceLock<Value> = OnceLock::new();
        DEFAULT
            .get_or_init(|| Value::error(ErrorValue::internal("default error")))
            .clone()
    }

    /// The zero value of a type, if the kind has one.
    pub fn zero_value(&self, ty: &Type) -> Option<Value> {
        Some(match ty.kind() {
            Kind::Null => Value::Null,
            Kind::Bool => Value::Bool(false),
            Kind::Int => Value::Int(0),
            Kind::UInt => Value::UInt(0),
            Kind::Double => Value::Double(0.0),
            Kind::String => self.empty_string(),
            Kind::Bytes => self.empty_bytes(),
            Kind::Duration => Value::Duration(Duration::from_seconds(0)),
            Kind::Timestamp => Value::Timestamp(Timestamp::epoch()),
            Kind::List => self.empty_list(),
            Kind::Map => self.empty_map(),
            Kind::Optional => self.optional_none(),
            Kind::Type => Value::Type(Type::Dyn),
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> ValueFactory {
        ValueFactory::new(MemoryManager::reference_counting())
    }

    #[test]
    fn test_checked_string_constructor() {
        let factory = factory();
        assert_eq!(
            factory.string_value_from_bytes(b"hello").unwrap(),
            Value::from("hello")
        );
        // 4-byte U+10FFFF is the highest valid scalar.
        assert!(factory
            .string_value_from_bytes("\u{10FFFF}".as_bytes())
            .is_ok());
        // Overlong encoding of '/'.
        let err = factory
            .string_value_from_bytes(&[0xC0, 0xAF])
            .unwrap_err();
        assert_eq!(err.code, crate::value::ErrorCode::InvalidArgument);
        // Lone surrogate half.
        assert!(factory
            .string_value_from_bytes(&[0xED, 0xA0, 0x80])
            .is_err());
        // Truncated multi-byte sequence.
        assert!(factory.string_value_from_bytes(&[0xE2, 0x82]).is_err());
    }

    #[test]
    fn test_duration_bounds() {
        let factory = factory();
        let max = factory
            .duration_from_seconds(Duration::MAX_SECONDS)
            .unwrap();
        assert_eq!(max, Value::Duration(Duration::from_seconds(315_576_000_000)));

        let err = factory
            .duration_from_seconds(Duration::MAX_SECONDS + 1)
            .unwrap_err();
        assert_eq!(err.code, crate::value::ErrorCode::OutOfRange);

        // One nanosecond beyond the bound.
        assert!(factory
            .duration_value(Duration::new(Duration::MAX_SECONDS, 1))
            .is_err());
        assert!(factory
            .duration_value(Duration::new(Duration::MIN_SECONDS, -1))
            .is_err());
    }

    #[test]
    fn test_timestamp_bounds() {
        let factory = factory();
        assert!(factory
            .timestamp_from_seconds(Timestamp::MAX_SECONDS)
            .is_ok());
        assert!(factory
            .timestamp_from_seconds(Timestamp::MIN_SECONDS)
            .is_ok());
        assert!(factory
            .timestamp_value(Timestamp::new(Timestamp::MAX_SECONDS, 1))
            .is_err());
        assert!(factory
            .timestamp_from_seconds(Timestamp::MIN_SECONDS - 1)
            .is_err());
    }

    #[test]
    fn test_enum_value_requires_enum_type() {
        let factory = factory();
        let enum_type = Type::enum_type("my.pkg.Color");
        let value = factory.enum_value(enum_type.clone(), 2).unwrap();
        assert_eq!(value.kind(), Kind::Enum);
        assert_eq!(value.value_type(), enum_type);

        assert!(factory.enum_value(Type::Int, 2).is_err());
    }

    #[test]
    fn test_zero_value_singletons_share_storage() {
        let factory = factory();
        let a = factory.empty_string();
        let b = factory.empty_string();
        match (&a, &b) {
            (Value::String(a), Value::String(b)) => assert!(Arc::ptr_eq(a, b)),
            _ => panic!("expected strings"),
        }
        assert!(a.is_zero_value());
        assert!(factory.empty_list().is_zero_value());
        assert!(factory.empty_map().is_zero_value());
    }

    #[test]
    fn test_zero_values_by_type() {
        let factory = factory();
        assert_eq!(factory.zero_value(&Type::Bool), Some(Value::Bool(false)));
        assert_eq!(
            factory.zero_value(&Type::optional(Type::Dyn)),
            Some(factory.optional_none())
        );
        assert_eq!(factory.zero_value(&Type::Error), None);
        let ts = factory.zero_value(&Type::Timestamp).unwrap();
        assert!(ts.is_zero_value());
    }

    #[test]
    fn test_factory_carries_memory_manager() {
        let factory = ValueFactory::new(MemoryManager::pooling());
        assert!(factory.memory_manager().is_pooling());
        let scratch = factory.allocate_scratch(Value::Int(42));
        assert_eq!(*scratch, Value::Int(42));
        assert!(scratch.is_pooled());
    }

    #[test]
    fn test_container_construction_follows_discipline() {
        let pooled = ValueFactory::new(MemoryManager::pooling());
        let list = pooled.list_value([Value::Int(1), Value::Int(2)]);
        assert_eq!(list.get_index(1), Value::Int(2));
        match &list {
            Value::List(items) => assert!(items.is_pooled()),
            other => panic!("expected list, got {:?}", other),
        }

        let map = pooled.map_value(ValueMap::from_entries([(
            crate::value::MapKey::from("a"),
            Value::Int(1),
        )]));
        assert_eq!(map.get_key(&Value::from("a")), Value::Int(1));
        match &map {
            Value::Map(entries) => assert!(entries.is_pooled()),
            other => panic!("expected map, got {:?}", other),
        }

        let counted = factory();
        let list = counted.list_value([Value::Int(1)]);
        match &list {
            Value::List(items) => assert!(!items.is_pooled()),
            other => panic!("expected list, got {:?}", other),
        }
    }
}
