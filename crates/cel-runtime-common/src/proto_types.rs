//! Static schema introspection over protobuf descriptors.
//!
//! `TypeIntrospector` is the name-to-type side of the schema: it can name
//! types and describe struct fields, but cannot build values. The runtime
//! crate layers value construction (`TypeReflector`) on top of it.
//!
//! `ProtoTypeRegistry` implements the trait over a
//! `prost_reflect::DescriptorPool`, which ships the well-known types in its
//! global pool; host schemas are added as serialized `FileDescriptorSet`s.

use std::sync::Arc;

use prost::Message;
use prost_reflect::{DescriptorPool, EnumDescriptor, FieldDescriptor, Kind, MessageDescriptor};
use thiserror::Error;

use crate::Type;

/// Schema description of one struct field: name, field number, and type.
#[derive(Debug, Clone, PartialEq)]
pub struct StructTypeField {
    /// The field name.
    pub name: Arc<str>,
    /// The field number in the host schema.
    pub number: i32,
    /// The field's CEL type.
    pub ty: Type,
}

/// Name-to-type and field-schema lookup.
///
/// Implementations answer from static schema information only; absence is
/// `None`, not an error.
pub trait TypeIntrospector {
    /// Find the type for a fully qualified name.
    fn find_type(&self, name: &str) -> Option<Type>;

    /// Find the schema of field `field` in struct type `type_name`.
    fn find_struct_field(&self, type_name: &str, field: &str) -> Option<StructTypeField>;

    /// Find the schema of the field with `number` in struct type `type_name`.
    fn find_struct_field_by_number(&self, type_name: &str, number: i32)
        -> Option<StructTypeField>;
}

/// Errors raised while loading schemas into a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The bytes were not a valid `FileDescriptorSet`.
    #[error("malformed file descriptor set: {0}")]
    MalformedDescriptorSet(#[from] prost::DecodeError),
    /// The descriptor set was inconsistent with the pool contents.
    #[error("rejected file descriptor set: {0}")]
    RejectedDescriptorSet(#[from] prost_reflect::DescriptorError),
}

/// Registry of protobuf type information.
#[derive(Debug, Clone)]
pub struct ProtoTypeRegistry {
    pool: DescriptorPool,
}

impl ProtoTypeRegistry {
    /// Create a registry backed by the global pool, which carries the
    /// well-known types (`google.protobuf.Timestamp`, wrappers, `Any`, …).
    pub fn new() -> Self {
        Self {
            pool: DescriptorPool::global(),
        }
    }

    /// Create a registry from an existing descriptor pool.
    pub fn from_pool(pool: DescriptorPool) -> Self {
        Self { pool }
    }

    /// Add host schemas from a serialized `FileDescriptorSet`.
    ///
    /// Dependencies must be added before dependents.
    pub fn add_file_descriptor_set(&mut self, bytes: &[u8]) -> Result<(), RegistryError> {
        let fds = prost_reflect::prost_types::FileDescriptorSet::decode(bytes)?;
        self.pool.add_file_descriptor_set(fds)?;
        Ok(())
    }

    /// Get a message descriptor by fully qualified name.
    pub fn get_message(&self, name: &str) -> Option<MessageDescriptor> {
        self.pool.get_message_by_name(name)
    }

    /// Get an enum descriptor by fully qualified name.
    pub fn get_enum(&self, name: &str) -> Option<EnumDescriptor> {
        self.pool.get_enum_by_name(name)
    }

    /// Resolve an enum constant to its numeric value.
    pub fn get_enum_value(&self, enum_name: &str, value_name: &str) -> Option<i64> {
        let enum_desc = self.get_enum(enum_name)?;
        let value = enum_desc.get_value_by_name(value_name)?;
        Some(i64::from(value.number()))
    }

    /// Resolve a numeric enum value to its constant name.
    pub fn get_enum_value_name(&self, enum_name: &str, number: i32) -> Option<String> {
        let enum_desc = self.get_enum(enum_name)?;
        let value = enum_desc.get_value(number)?;
        Some(value.name().to_string())
    }

    /// The CEL type of one message field.
    pub fn field_type(&self, field: &FieldDescriptor) -> Type {
        if field.is_map() {
            // Map fields present as a synthetic entry message with key and
            // value fields.
            if let Kind::Message(map_entry) = field.kind() {
                let key = map_entry
                    .get_field_by_name("key")
                    .map(|f| scalar_field_type(&f.kind()))
                    .unwrap_or(Type::Dyn);
                let value = map_entry
                    .get_field_by_name("value")
                    .map(|f| unwrapped_field_type(&f.kind()))
                    .unwrap_or(Type::Dyn);
                return Type::map(key, value);
            }
            return Type::map(Type::Dyn, Type::Dyn);
        }
        if field.is_list() {
            // Repeated wrapper fields hold the primitive, never null.
            return Type::list(unwrapped_field_type(&field.kind()));
        }
        scalar_field_type(&field.kind())
    }

    /// The underlying descriptor pool.
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    fn field_schema(&self, field: FieldDescriptor) -> StructTypeField {
        StructTypeField {
            name: Arc::from(field.name()),
            number: field.number() as i32,
            ty: self.field_type(&field),
        }
    }
}

impl Default for ProtoTypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeIntrospector for ProtoTypeRegistry {
    fn find_type(&self, name: &str) -> Option<Type> {
        if let Some(ty) = crate::builtin_type_by_name(name) {
            return Some(ty);
        }
        if let Some(message) = self.get_message(name) {
            return Some(message_type(message.full_name()));
        }
        self.get_enum(name).map(|e| Type::enum_type(e.full_name()))
    }

    fn find_struct_field(&self, type_name: &str, field: &str) -> Option<StructTypeField> {
        let message = self.get_message(type_name)?;
        let field = message.get_field_by_name(field)?;
        Some(self.field_schema(field))
    }

    fn find_struct_field_by_number(
        &self,
        type_name: &str,
        number: i32,
    ) -> Option<StructTypeField> {
        let message = self.get_message(type_name)?;
        let field = message.get_field(number as u32)?;
        Some(self.field_schema(field))
    }
}

/// Map a message name to its CEL type, folding the well-known types.
pub fn message_type(full_name: &str) -> Type {
    match full_name {
        "google.protobuf.Timestamp" => Type::Timestamp,
        "google.protobuf.Duration" => Type::Duration,
        "google.protobuf.BoolValue" => Type::BoolWrapper,
        "google.protobuf.Int32Value" | "google.protobuf.Int64Value" => Type::IntWrapper,
        "google.protobuf.UInt32Value" | "google.protobuf.UInt64Value" => Type::UIntWrapper,
        "google.protobuf.FloatValue" | "google.protobuf.DoubleValue" => Type::DoubleWrapper,
        "google.protobuf.StringValue" => Type::StringWrapper,
        "google.protobuf.BytesValue" => Type::BytesWrapper,
        "google.protobuf.Any" => Type::Any,
        "google.protobuf.Struct" => Type::map(Type::String, Type::Dyn),
        "google.protobuf.Value" => Type::Dyn,
        "google.protobuf.ListValue" => Type::list(Type::Dyn),
        _ => Type::struct_type(full_name),
    }
}

fn scalar_field_type(kind: &Kind) -> Type {
    match kind {
        Kind::Bool => Type::Bool,
        Kind::Int32
        | Kind::Sint32
        | Kind::Sfixed32
        | Kind::Int64
        | Kind::Sint64
        | Kind::Sfixed64 => Type::Int,
        Kind::Uint32 | Kind::Fixed32 | Kind::Uint64 | Kind::Fixed64 => Type::UInt,
        Kind::Float | Kind::Double => Type::Double,
        Kind::String => Type::String,
        Kind::Bytes => Type::Bytes,
        Kind::Message(msg) => message_type(msg.full_name()),
        Kind::Enum(desc) => Type::enum_type(desc.full_name()),
    }
}

// Same as `scalar_field_type` but with wrapper messages reduced to their
// primitive, used for repeated elements and map values.
fn unwrapped_field_type(kind: &Kind) -> Type {
    let ty = scalar_field_type(kind);
    ty.unwrap_wrapper().unwrap_or(ty)
}
