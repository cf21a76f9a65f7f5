//! Runtime value model for the Common Expression Language.
//!
//! This crate implements the value side of a CEL evaluation: the
//! discriminated [`Value`] union, the factories that construct values
//! under a chosen memory discipline, the reflector that hands out
//! container and struct builders and deserializes by type URL, the
//! protobuf struct bridge, and the activation consulted for variable
//! bindings. The shared type vocabulary lives in `cel-runtime-common`.
//!
//! # Quick start
//!
//! ```
//! use cel_runtime::{MemoryManager, Value, ValueFactory};
//!
//! let factory = ValueFactory::new(MemoryManager::reference_counting());
//! let list = Value::list_of([1, 2, 3]);
//! assert_eq!(list.get_index(1), Value::Int(2));
//! assert_eq!(list.size(), Value::Int(3));
//!
//! // Errors are values, not panics.
//! assert!(list.get_index(3).is_error());
//!
//! // Checked constructors validate.
//! assert!(factory.string_value_from_bytes(&[0xC0, 0xAF]).is_err());
//! ```
//!
//! # Error and unknown propagation
//!
//! Evaluation failures travel as [`ErrorValue`]s and deferred inputs as
//! [`UnknownValue`]s. Operations consuming values apply
//! [`Value::propagate`]: the leftmost error wins, errors beat unknowns,
//! and unknowns merge by set union.

pub mod activation;
pub mod bridge;
pub mod factory;
pub mod json;
pub mod memory;
pub mod reflect;
pub mod value;
pub mod wire;

pub use activation::{Activation, BindingsActivation, EmptyActivation, ScopedActivation};
pub use bridge::{
    qualify_value, ProtoStructValue, Qualifier, StructValue, StructValueOps, TYPE_URL_PREFIX,
};
pub use factory::ValueFactory;
pub use json::convert_to_json;
pub use memory::{Handle, MemoryManager};
pub use reflect::{
    ListValueBuilder, MapValueBuilder, ProtoTypeReflector, StructValueBuilder, TypeReflector,
    TypeReflectorChain,
};
pub use value::{
    AttributeSelector, AttributeTrail, Duration, EnumValue, ErrorCode, ErrorValue, FunctionResult,
    MapKey, OpaqueValue, OpaqueValueInterface, OptionalValue, Timestamp, UnknownValue, Value,
    ValueMap, ValueTypeError,
};
pub use wire::{convert_to_any, serialize, serialized_size, AnyValue};

// Re-export the shared vocabulary so embedders need a single dependency.
pub use cel_runtime_common::{
    FunctionOverload, Kind, ProtoTypeRegistry, StructTypeField, Type, TypeFactory,
    TypeIntrospector,
};
