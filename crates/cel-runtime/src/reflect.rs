//! Runtime schema reflection: builders and deserialization.
//!
//! `TypeReflector` extends the static introspection side with value
//! construction: it hands out list, map, and struct builders, resolves
//! enum-constant names to values, and deserializes payloads by type URL.
//! Reflectors stack: a chain consults each provider in order and the
//! first answer wins, so host schemas (protobuf, user extensions) layer.

use std::sync::Arc;

use prost_reflect::{DynamicMessage, MessageDescriptor, ReflectMessage};

use cel_runtime_common::{
    ProtoTypeRegistry, StructTypeField, Type, TypeIntrospector,
};

use crate::bridge::{unwrap_message_in, value_to_proto_field, ProtoStructValue, StructValue};
use crate::factory::ValueFactory;
use crate::memory::MemoryManager;
use crate::value::{ErrorValue, MapKey, PropagationState, Value, ValueMap};

/// Runtime schema authority: builder handout and deserialization on top of
/// [`TypeIntrospector`].
///
/// Builders and deserialization take the value factory so the storage they
/// produce is placed through the factory's memory manager.
pub trait TypeReflector: TypeIntrospector {
    /// A builder for `list(element)` values.
    fn new_list_builder(&self, factory: &ValueFactory, element: Type) -> ListValueBuilder {
        ListValueBuilder::new(factory.memory_manager().clone(), element)
    }

    /// A builder for `map(key, value)` values; the key type must be a
    /// valid map key kind.
    fn new_map_builder(
        &self,
        factory: &ValueFactory,
        key: Type,
        value: Type,
    ) -> Result<MapValueBuilder, ErrorValue> {
        MapValueBuilder::new(factory.memory_manager().clone(), key, value)
    }

    /// A builder for the struct type `name`, or `None` when this reflector
    /// does not know the type.
    fn new_struct_builder(
        &self,
        factory: &ValueFactory,
        name: &str,
    ) -> Result<Option<Box<dyn StructValueBuilder>>, ErrorValue>;

    /// Resolve a name to a value; used to translate enum-constant names
    /// (`my.pkg.Color.RED`) to their numeric values.
    fn find_value(&self, name: &str) -> Option<Value>;

    /// Deserialize `bytes` according to `type_url`. `Ok(None)` when the
    /// type URL is unrecognized by this reflector.
    fn deserialize_value(
        &self,
        factory: &ValueFactory,
        type_url: &str,
        bytes: &[u8],
    ) -> Result<Option<Value>, ErrorValue>;
}

// ==================== Container builders ====================

/// Single-use accumulator producing an immutable list value.
///
/// Error and unknown inputs short-circuit: they are never stored as
/// elements, and `build` returns the propagated value instead of the
/// container (leftmost error first, merged unknowns otherwise).
#[derive(Debug)]
pub struct ListValueBuilder {
    memory: MemoryManager,
    element: Type,
    items: Vec<Value>,
    state: PropagationState,
}

impl ListValueBuilder {
    fn new(memory: MemoryManager, element: Type) -> Self {
        Self {
            memory,
            element,
            items: Vec::new(),
            state: PropagationState::default(),
        }
    }

    /// Append an element. Elements must satisfy the list's element type
    /// (or the element type is `dyn`).
    pub fn add(&mut self, value: Value) {
        if self.state.absorb(&value) {
            return;
        }
        if !self.element.is_assignable_from(&value.value_type()) {
            self.state.record(ErrorValue::invalid_argument(format!(
                "expected element of type {}, got {}",
                self.element,
                value.value_type()
            )));
            return;
        }
        self.items.push(value);
    }

    /// Reserve capacity for `additional` more elements.
    pub fn reserve(&mut self, additional: usize) {
        self.items.reserve(additional);
    }

    /// Number of accumulated elements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether no elements have accumulated.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Produce the list value, or the short-circuiting error/unknown. The
    /// storage is placed through the builder's memory manager.
    pub fn build(mut self) -> Value {
        if let Some(short_circuit) = self.state.take() {
            return short_circuit;
        }
        Value::List(self.memory.allocate_slice(self.items))
    }
}

/// Single-use accumulator producing an immutable map value.
#[derive(Debug)]
pub struct MapValueBuilder {
    memory: MemoryManager,
    key: Type,
    value: Type,
    entries: ValueMap,
    state: PropagationState,
}

impl MapValueBuilder {
    fn new(memory: MemoryManager, key: Type, value: Type) -> Result<Self, ErrorValue> {
        if !key.kind().is_valid_map_key() {
            return Err(ErrorValue::invalid_argument(format!(
                "invalid map key type: {}",
                key
            )));
        }
        Ok(Self {
            memory,
            key,
            value,
            entries: ValueMap::new(),
            state: PropagationState::default(),
        })
    }

    /// Insert a pair. Duplicate keys (under key-kind equality, including
    /// int/uint coercion) are an `invalid argument` error; so are keys of
    /// a non-key kind, NaN doubles included.
    pub fn put(&mut self, key: Value, value: Value) {
        if self.state.absorb(&key) || self.state.absorb(&value) {
            return;
        }
        let Some(map_key) = MapKey::from_value(&key) else {
            self.state.record(ErrorValue::invalid_argument(format!(
                "invalid map key type: {}",
                key.value_type()
            )));
            return;
        };
        if !self.key.is_assignable_from(&key.value_type()) {
            self.state.record(ErrorValue::invalid_argument(format!(
                "expected key of type {}, got {}",
                self.key,
                key.value_type()
            )));
            return;
        }
        if !self.value.is_assignable_from(&value.value_type()) {
            self.state.record(ErrorValue::invalid_argument(format!(
                "expected value of type {}, got {}",
                self.value,
                value.value_type()
            )));
            return;
        }
        if self.entries.contains_key(&map_key) {
            self.state.record(ErrorValue::invalid_argument(format!(
                "duplicate map key: {}",
                key.debug_string()
            )));
            return;
        }
        self.entries.insert(map_key, value);
    }

    /// Number of accumulated entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entries have accumulated.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Produce the map value, or the short-circuiting error/unknown. The
    /// storage is placed through the builder's memory manager.
    pub fn build(mut self) -> Value {
        if let Some(short_circuit) = self.state.take() {
            return short_circuit;
        }
        Value::Map(self.memory.allocate(self.entries))
    }
}

/// Single-use accumulator producing a struct value.
pub trait StructValueBuilder {
    /// Set a field by name. Unknown fields are `not found`; kind
    /// mismatches are `invalid argument`; narrowing overflow is
    /// `out of range`.
    fn set_field_by_name(&mut self, name: &str, value: Value) -> Result<(), ErrorValue>;

    /// Set a field by number, with the same error contract.
    fn set_field_by_number(&mut self, number: i32, value: Value) -> Result<(), ErrorValue>;

    /// Produce the struct value (well-known types unwrap to their native
    /// shapes).
    fn build(self: Box<Self>) -> Result<Value, ErrorValue>;
}

struct ProtoStructValueBuilder {
    message: DynamicMessage,
    memory: MemoryManager,
}

impl ProtoStructValueBuilder {
    fn new(descriptor: MessageDescriptor, memory: MemoryManager) -> Self {
        Self {
            message: DynamicMessage::new(descriptor),
            memory,
        }
    }

    fn set_field(
        &mut self,
        field: prost_reflect::FieldDescriptor,
        value: Value,
    ) -> Result<(), ErrorValue> {
        match value_to_proto_field(&field, &value)? {
            Some(proto_value) => self
                .message
                .try_set_field(&field, proto_value)
                .map_err(|err| ErrorValue::internal(format!("set_field failed: {}", err))),
            None => {
                self.message.clear_field(&field);
                Ok(())
            }
        }
    }
}

impl StructValueBuilder for ProtoStructValueBuilder {
    fn set_field_by_name(&mut self, name: &str, value: Value) -> Result<(), ErrorValue> {
        let field = self
            .message
            .descriptor()
            .get_field_by_name(name)
            .ok_or_else(|| ErrorValue::no_such_field(name))?;
        self.set_field(field, value)
    }

    fn set_field_by_number(&mut self, number: i32, value: Value) -> Result<(), ErrorValue> {
        let field = self
            .message
            .descriptor()
            .get_field(number as u32)
            .ok_or_else(|| ErrorValue::no_such_field(number))?;
        self.set_field(field, value)
    }

    fn build(self: Box<Self>) -> Result<Value, ErrorValue> {
        Ok(unwrap_message_in(self.message, &self.memory))
    }
}

// ==================== Protobuf reflector ====================

/// The supplied reflector over protobuf descriptors.
#[derive(Debug, Clone, Default)]
pub struct ProtoTypeReflector {
    registry: ProtoTypeRegistry,
}

impl ProtoTypeReflector {
    /// A reflector over the global descriptor pool (well-known types
    /// only).
    pub fn new() -> Self {
        Self::default()
    }

    /// A reflector over an existing registry.
    pub fn from_registry(registry: ProtoTypeRegistry) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    pub fn registry(&self) -> &ProtoTypeRegistry {
        &self.registry
    }

    /// Add host schemas from a serialized `FileDescriptorSet`.
    pub fn add_file_descriptor_set(
        &mut self,
        bytes: &[u8],
    ) -> Result<(), cel_runtime_common::RegistryError> {
        self.registry.add_file_descriptor_set(bytes)
    }
}

impl TypeIntrospector for ProtoTypeReflector {
    fn find_type(&self, name: &str) -> Option<Type> {
        self.registry.find_type(name)
    }

    fn find_struct_field(&self, type_name: &str, field: &str) -> Option<StructTypeField> {
        self.registry.find_struct_field(type_name, field)
    }

    fn find_struct_field_by_number(
        &self,
        type_name: &str,
        number: i32,
    ) -> Option<StructTypeField> {
        self.registry.find_struct_field_by_number(type_name, number)
    }
}

impl TypeReflector for ProtoTypeReflector {
    fn new_struct_builder(
        &self,
        factory: &ValueFactory,
        name: &str,
    ) -> Result<Option<Box<dyn StructValueBuilder>>, ErrorValue> {
        match self.registry.get_message(name) {
            Some(descriptor) => Ok(Some(Box::new(ProtoStructValueBuilder::new(
                descriptor,
                factory.memory_manager().clone(),
            )))),
            None => Ok(None),
        }
    }

    fn find_value(&self, name: &str) -> Option<Value> {
        // Enum constants resolve as `<enum type>.<CONSTANT>`.
        if let Some((enum_name, constant)) = name.rsplit_once('.') {
            if let Some(number) = self.registry.get_enum_value(enum_name, constant) {
                return Some(Value::Enum(crate::value::EnumValue::new(
                    Type::enum_type(enum_name),
                    number,
                )));
            }
        }
        self.find_type(name).map(Value::Type)
    }

    fn deserialize_value(
        &self,
        factory: &ValueFactory,
        type_url: &str,
        bytes: &[u8],
    ) -> Result<Option<Value>, ErrorValue> {
        let full_name = type_url.rsplit('/').next().unwrap_or(type_url);
        let Some(descriptor) = self.registry.get_message(full_name) else {
            return Ok(None);
        };
        let message = DynamicMessage::decode(descriptor, bytes).map_err(|err| {
            ErrorValue::invalid_argument(format!("malformed payload for {}: {}", type_url, err))
        })?;
        Ok(Some(unwrap_message_in(message, factory.memory_manager())))
    }
}

// ==================== Provider chain ====================

/// A stack of reflectors consulted in order; the first answer wins.
#[derive(Clone, Default)]
pub struct TypeReflectorChain {
    providers: Vec<Arc<dyn TypeReflector + Send + Sync>>,
}

impl TypeReflectorChain {
    /// An empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider at the end of the chain.
    pub fn push(&mut self, provider: Arc<dyn TypeReflector + Send + Sync>) {
        self.providers.push(provider);
    }

    /// Builder-style append.
    pub fn with(mut self, provider: Arc<dyn TypeReflector + Send + Sync>) -> Self {
        self.push(provider);
        self
    }
}

impl TypeIntrospector for TypeReflectorChain {
    fn find_type(&self, name: &str) -> Option<Type> {
        self.providers.iter().find_map(|p| p.find_type(name))
    }

    fn find_struct_field(&self, type_name: &str, field: &str) -> Option<StructTypeField> {
        self.providers
            .iter()
            .find_map(|p| p.find_struct_field(type_name, field))
    }

    fn find_struct_field_by_number(
        &self,
        type_name: &str,
        number: i32,
    ) -> Option<StructTypeField> {
        self.providers
            .iter()
            .find_map(|p| p.find_struct_field_by_number(type_name, number))
    }
}

impl TypeReflector for TypeReflectorChain {
    fn new_struct_builder(
        &self,
        factory: &ValueFactory,
        name: &str,
    ) -> Result<Option<Box<dyn StructValueBuilder>>, ErrorValue> {
        for provider in &self.providers {
            if let Some(builder) = provider.new_struct_builder(factory, name)? {
                return Ok(Some(builder));
            }
        }
        Ok(None)
    }

    fn find_value(&self, name: &str) -> Option<Value> {
        self.providers.iter().find_map(|p| p.find_value(name))
    }

    fn deserialize_value(
        &self,
        factory: &ValueFactory,
        type_url: &str,
        bytes: &[u8],
    ) -> Result<Option<Value>, ErrorValue> {
        for provider in &self.providers {
            if let Some(value) = provider.deserialize_value(factory, type_url, bytes)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}

// Kept for bridges that construct struct values directly from messages.
impl From<DynamicMessage> for StructValue {
    fn from(message: DynamicMessage) -> Self {
        StructValue::new(ProtoStructValue::new(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{AttributeTrail, UnknownValue};

    fn reflector() -> ProtoTypeReflector {
        ProtoTypeReflector::new()
    }

    fn factory() -> ValueFactory {
        ValueFactory::new(MemoryManager::reference_counting())
    }

    #[test]
    fn test_list_builder() {
        let mut builder = reflector().new_list_builder(&factory(), Type::Int);
        builder.reserve(3);
        builder.add(Value::Int(1));
        builder.add(Value::Int(2));
        assert_eq!(builder.len(), 2);
        assert_eq!(builder.build(), Value::list_of([1, 2]));
    }

    #[test]
    fn test_list_builder_element_type_mismatch() {
        let mut builder = reflector().new_list_builder(&factory(), Type::Int);
        builder.add(Value::from("nope"));
        let result = builder.build();
        match result {
            Value::Error(e) => assert_eq!(e.code, crate::value::ErrorCode::InvalidArgument),
            other => panic!("expected error, got {:?}", other),
        }

        // dyn accepts anything.
        let mut builder = reflector().new_list_builder(&factory(), Type::Dyn);
        builder.add(Value::from("ok"));
        builder.add(Value::Int(1));
        assert!(matches!(builder.build(), Value::List(_)));
    }

    #[test]
    fn test_list_builder_short_circuits_errors() {
        let mut builder = reflector().new_list_builder(&factory(), Type::Dyn);
        builder.add(Value::Int(1));
        builder.add(Value::error(ErrorValue::internal("boom")));
        builder.add(Value::Int(2));
        let result = builder.build();
        assert!(result.is_error());
    }

    #[test]
    fn test_list_builder_merges_unknowns() {
        let mut builder = reflector().new_list_builder(&factory(), Type::Dyn);
        builder.add(Value::unknown(UnknownValue::from_attribute(
            AttributeTrail::new("a"),
        )));
        builder.add(Value::unknown(UnknownValue::from_attribute(
            AttributeTrail::new("b"),
        )));
        match builder.build() {
            Value::Unknown(u) => assert_eq!(u.attributes().count(), 2),
            other => panic!("expected unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_map_builder() {
        let mut builder = reflector()
            .new_map_builder(&factory(), Type::String, Type::Int)
            .unwrap();
        builder.put(Value::from("a"), Value::Int(1));
        builder.put(Value::from("b"), Value::Int(2));
        assert_eq!(builder.len(), 2);
        assert_eq!(
            builder.build(),
            Value::map_of([("a", 1i64), ("b", 2i64)])
        );
    }

    #[test]
    fn test_map_builder_duplicate_key() {
        let mut builder = reflector()
            .new_map_builder(&factory(), Type::String, Type::Dyn)
            .unwrap();
        builder.put(Value::from("a"), Value::Int(1));
        builder.put(Value::from("a"), Value::Int(2));
        match builder.build() {
            Value::Error(e) => {
                assert_eq!(e.code, crate::value::ErrorCode::InvalidArgument);
                assert!(e.message.contains("duplicate"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_map_builder_rejects_nan_and_bad_key_kinds() {
        let mut builder = reflector().new_map_builder(&factory(), Type::Dyn, Type::Dyn).unwrap();
        builder.put(Value::Double(f64::NAN), Value::Int(1));
        match builder.build() {
            Value::Error(e) => assert_eq!(e.code, crate::value::ErrorCode::InvalidArgument),
            other => panic!("expected error, got {:?}", other),
        }

        // Double key types are rejected at builder construction.
        assert!(reflector().new_map_builder(&factory(), Type::Double, Type::Dyn).is_err());
    }

    #[test]
    fn test_struct_builder_wrapper_type() {
        let reflector = reflector();
        let mut builder = reflector
            .new_struct_builder(&factory(), "google.protobuf.Int32Value")
            .unwrap()
            .unwrap();
        builder.set_field_by_name("value", Value::Int(7)).unwrap();
        // Wrappers unwrap to their primitive on build.
        assert_eq!(builder.build().unwrap(), Value::Int(7));
    }

    #[test]
    fn test_struct_builder_narrowing_out_of_range() {
        let reflector = reflector();
        let mut builder = reflector
            .new_struct_builder(&factory(), "google.protobuf.Int32Value")
            .unwrap()
            .unwrap();
        let min_err = builder
            .set_field_by_name("value", Value::Int(i64::from(i32::MIN) - 1))
            .unwrap_err();
        assert_eq!(min_err.code, crate::value::ErrorCode::OutOfRange);
        let max_err = builder
            .set_field_by_name("value", Value::Int(i64::from(i32::MAX) + 1))
            .unwrap_err();
        assert_eq!(max_err.code, crate::value::ErrorCode::OutOfRange);

        // The exact boundaries are accepted.
        assert!(builder
            .set_field_by_name("value", Value::Int(i64::from(i32::MAX)))
            .is_ok());
        assert!(builder
            .set_field_by_name("value", Value::Int(i64::from(i32::MIN)))
            .is_ok());
    }

    #[test]
    fn test_struct_builder_errors() {
        let reflector = reflector();
        let mut builder = reflector
            .new_struct_builder(&factory(), "google.protobuf.Timestamp")
            .unwrap()
            .unwrap();
        let err = builder
            .set_field_by_name("missing", Value::Int(0))
            .unwrap_err();
        assert_eq!(err.code, crate::value::ErrorCode::NotFound);

        let err = builder
            .set_field_by_name("seconds", Value::from("mismatch"))
            .unwrap_err();
        assert_eq!(err.code, crate::value::ErrorCode::InvalidArgument);

        assert!(reflector.new_struct_builder(&factory(), "no.such.Message").unwrap().is_none());
    }

    #[test]
    fn test_struct_builder_by_number() {
        let reflector = reflector();
        let mut builder = reflector
            .new_struct_builder(&factory(), "google.protobuf.Duration")
            .unwrap()
            .unwrap();
        // Duration: seconds = 1, nanos = 2.
        builder.set_field_by_number(1, Value::Int(3)).unwrap();
        builder.set_field_by_number(2, Value::Int(500)).unwrap();
        assert_eq!(
            builder.build().unwrap(),
            Value::Duration(crate::value::Duration::new(3, 500))
        );
    }

    #[test]
    fn test_deserialize_value() {
        let reflector = reflector();
        let bytes = crate::wire::serialize(&Value::Int(9)).unwrap();
        let value = reflector
            .deserialize_value(&factory(), "type.googleapis.com/google.protobuf.Int64Value", &bytes)
            .unwrap()
            .unwrap();
        assert_eq!(value, Value::Int(9));

        // Unrecognized URLs are absence, not failure.
        assert!(reflector
            .deserialize_value(&factory(), "type.googleapis.com/no.such.Type", b"")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_find_value_enum_constant() {
        let reflector = reflector();
        let value = reflector
            .find_value("google.protobuf.NullValue.NULL_VALUE")
            .unwrap();
        match value {
            Value::Enum(e) => {
                assert_eq!(e.enum_type, Type::enum_type("google.protobuf.NullValue"));
                assert_eq!(e.value, 0);
            }
            other => panic!("expected enum, got {:?}", other),
        }
        assert!(reflector.find_value("no.such.Enum.NOPE").is_none());
    }

    #[test]
    fn test_builders_allocate_under_the_factory_discipline() {
        let pooled = ValueFactory::new(MemoryManager::pooling());

        let mut builder = reflector().new_list_builder(&pooled, Type::Dyn);
        builder.add(Value::Int(1));
        match builder.build() {
            Value::List(items) => assert!(items.is_pooled()),
            other => panic!("expected list, got {:?}", other),
        }

        let mut builder = reflector()
            .new_map_builder(&pooled, Type::String, Type::Dyn)
            .unwrap();
        builder.put(Value::from("a"), Value::Int(1));
        match builder.build() {
            Value::Map(map) => assert!(map.is_pooled()),
            other => panic!("expected map, got {:?}", other),
        }

        // The reference-counting discipline shares through strong counts.
        let counted = factory();
        let mut builder = reflector().new_list_builder(&counted, Type::Dyn);
        builder.add(Value::Int(1));
        match builder.build() {
            Value::List(items) => assert!(!items.is_pooled()),
            other => panic!("expected list, got {:?}", other),
        }
    }

    #[test]
    fn test_reflector_chain_first_match_wins() {
        let chain = TypeReflectorChain::new().with(Arc::new(ProtoTypeReflector::new()));
        assert_eq!(chain.find_type("int"), Some(Type::Int));
        assert!(chain
            .new_struct_builder(&factory(), "google.protobuf.BoolValue")
            .unwrap()
            .is_some());
        assert!(chain.new_struct_builder(&factory(), "no.such.Message").unwrap().is_none());
    }
}
