//! Shared vocabulary of the CEL runtime: the kind taxonomy, the type model,
//! type construction and interning, and static schema introspection.
//!
//! This crate holds everything the runtime and a host's type checker agree
//! on without touching values:
//!
//! - **[`Kind`]**: the closed tag discriminating every type and value.
//! - **[`Type`]**: one canonical type per kind, with parameterized list,
//!   map, and optional variants, and struct/enum types named by the host
//!   schema.
//! - **[`TypeFactory`]**: the sole constructor for parameterized types;
//!   interns `list`, `map`, and `optional` per instance so equal arguments
//!   yield identical handles.
//! - **[`TypeIntrospector`] / [`ProtoTypeRegistry`]**: name-to-type and
//!   field-schema lookup over protobuf descriptors.
//!
//! # Example
//!
//! ```
//! use cel_runtime_common::{Kind, Type, TypeFactory};
//!
//! let factory = TypeFactory::new();
//! let ty = factory.list_type(Type::Int);
//! assert_eq!(ty.kind(), Kind::List);
//! assert_eq!(ty.name(), "list(int)");
//! ```

mod decls;
mod kind;
mod proto_types;
mod type_factory;
mod types;

pub use decls::FunctionOverload;
pub use kind::Kind;
pub use proto_types::{
    message_type, ProtoTypeRegistry, RegistryError, StructTypeField, TypeIntrospector,
};
pub use type_factory::{builtin_type_by_name, simple_type, TypeError, TypeFactory};
pub use types::Type;
