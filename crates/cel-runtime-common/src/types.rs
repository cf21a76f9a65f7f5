//! The CEL type model.
//!
//! One canonical `Type` per [`Kind`], with parameterized variants for
//! containers and optionals. Types are immutable, value-equal, and hashable;
//! parameterized variants share their parameters through `Arc`, so the
//! interning performed by `TypeFactory` gives handle identity on top of
//! value equality.

use std::fmt;
use std::sync::Arc;

use crate::Kind;

/// A CEL type.
///
/// Simple types are unit variants; parameterized types carry `Arc`'d
/// parameters so clones share one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// The type of `null`.
    Null,
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// Unsigned 64-bit integer.
    UInt,
    /// IEEE-754 binary64.
    Double,
    /// Byte sequence.
    Bytes,
    /// UTF-8 string.
    String,
    /// `google.protobuf.Duration`.
    Duration,
    /// `google.protobuf.Timestamp`.
    Timestamp,
    /// Homogeneous list: `list(E)`.
    List(Arc<Type>),
    /// Key-value map: `map(K, V)`. Key kinds are restricted; the factory
    /// enforces the restriction.
    Map(Arc<Type>, Arc<Type>),
    /// `optional_type(E)`.
    Optional(Arc<Type>),
    /// Struct type identified by a host-provided fully qualified name.
    Struct(Arc<str>),
    /// Enum type identified by a fully qualified name.
    Enum(Arc<str>),
    /// Host extension type with optional type parameters.
    Opaque {
        /// The extension type's name.
        name: Arc<str>,
        /// Type parameters, possibly empty.
        params: Arc<[Type]>,
    },
    /// The type of types.
    TypeType,
    /// Nullable bool.
    BoolWrapper,
    /// Nullable int.
    IntWrapper,
    /// Nullable uint.
    UIntWrapper,
    /// Nullable double.
    DoubleWrapper,
    /// Nullable bytes.
    BytesWrapper,
    /// Nullable string.
    StringWrapper,
    /// The type of error values. Not user-addressable.
    Error,
    /// The type of unknown values. Not user-addressable.
    Unknown,
    /// The top type.
    Dyn,
    /// `google.protobuf.Any`.
    Any,
}

impl Type {
    /// Create a list type. Prefer `TypeFactory::list_type` for interning.
    pub fn list(elem: Type) -> Self {
        Type::List(Arc::new(elem))
    }

    /// Create a map type without key-kind validation. Prefer
    /// `TypeFactory::map_type`, which validates.
    pub fn map(key: Type, value: Type) -> Self {
        Type::Map(Arc::new(key), Arc::new(value))
    }

    /// Create an optional type. Prefer `TypeFactory::optional_type`.
    pub fn optional(elem: Type) -> Self {
        Type::Optional(Arc::new(elem))
    }

    /// Create a struct type from a fully qualified name.
    pub fn struct_type(name: impl Into<Arc<str>>) -> Self {
        Type::Struct(name.into())
    }

    /// Create an enum type from a fully qualified name.
    pub fn enum_type(name: impl Into<Arc<str>>) -> Self {
        Type::Enum(name.into())
    }

    /// Create an opaque extension type.
    pub fn opaque(name: impl Into<Arc<str>>, params: &[Type]) -> Self {
        Type::Opaque {
            name: name.into(),
            params: Arc::from(params),
        }
    }

    /// The kind tag of this type.
    pub fn kind(&self) -> Kind {
        match self {
            Type::Null => Kind::Null,
            Type::Bool => Kind::Bool,
            Type::Int => Kind::Int,
            Type::UInt => Kind::UInt,
            Type::Double => Kind::Double,
            Type::Bytes => Kind::Bytes,
            Type::String => Kind::String,
            Type::Duration => Kind::Duration,
            Type::Timestamp => Kind::Timestamp,
            Type::List(_) => Kind::List,
            Type::Map(_, _) => Kind::Map,
            Type::Optional(_) => Kind::Optional,
            Type::Struct(_) => Kind::Struct,
            Type::Enum(_) => Kind::Enum,
            Type::Opaque { .. } => Kind::Opaque,
            Type::TypeType => Kind::Type,
            Type::BoolWrapper => Kind::BoolWrapper,
            Type::IntWrapper => Kind::IntWrapper,
            Type::UIntWrapper => Kind::UIntWrapper,
            Type::DoubleWrapper => Kind::DoubleWrapper,
            Type::BytesWrapper => Kind::BytesWrapper,
            Type::StringWrapper => Kind::StringWrapper,
            Type::Error => Kind::Error,
            Type::Unknown => Kind::Unknown,
            Type::Dyn => Kind::Dyn,
            Type::Any => Kind::Any,
        }
    }

    /// Canonical textual name, e.g. `list(int)` or
    /// `google.protobuf.Timestamp`.
    pub fn name(&self) -> String {
        match self {
            Type::List(elem) => format!("list({})", elem.name()),
            Type::Map(key, value) => format!("map({}, {})", key.name(), value.name()),
            Type::Optional(elem) => format!("optional_type({})", elem.name()),
            Type::Struct(name) | Type::Enum(name) => name.to_string(),
            Type::Opaque { name, params } => {
                if params.is_empty() {
                    name.to_string()
                } else {
                    let params = params
                        .iter()
                        .map(Type::name)
                        .collect::<Vec<_>>()
                        .join(", ");
                    format!("{}({})", name, params)
                }
            }
            simple => simple.kind().name().to_string(),
        }
    }

    /// Deterministic rendering for diagnostics. Same as `name()`.
    pub fn debug_string(&self) -> String {
        self.name()
    }

    /// Element type of a list or optional, if this is one.
    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::List(elem) | Type::Optional(elem) => Some(elem),
            _ => None,
        }
    }

    /// Key type of a map, if this is one.
    pub fn key(&self) -> Option<&Type> {
        match self {
            Type::Map(key, _) => Some(key),
            _ => None,
        }
    }

    /// Value type of a map, if this is one.
    pub fn value(&self) -> Option<&Type> {
        match self {
            Type::Map(_, value) => Some(value),
            _ => None,
        }
    }

    /// Returns true if this is one of the six primitive types.
    pub fn is_primitive(&self) -> bool {
        self.kind().is_primitive()
    }

    /// Returns true for int, uint, and double.
    pub fn is_numeric(&self) -> bool {
        self.kind().is_numeric()
    }

    /// Returns true for the nullable-primitive wrapper types.
    pub fn is_wrapper(&self) -> bool {
        self.kind().is_wrapper()
    }

    /// The primitive type a wrapper type wraps.
    pub fn unwrap_wrapper(&self) -> Option<Type> {
        Some(match self {
            Type::BoolWrapper => Type::Bool,
            Type::IntWrapper => Type::Int,
            Type::UIntWrapper => Type::UInt,
            Type::DoubleWrapper => Type::Double,
            Type::BytesWrapper => Type::Bytes,
            Type::StringWrapper => Type::String,
            _ => return None,
        })
    }

    /// Returns true if a value of type `other` can appear where this type
    /// is expected. `dyn` is compatible with everything; container
    /// parameters recurse; wrappers accept their primitive and null.
    pub fn is_assignable_from(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        if matches!(self, Type::Dyn) || matches!(other, Type::Dyn) {
            return true;
        }
        match (self, other) {
            (Type::List(a), Type::List(b)) => a.is_assignable_from(b),
            (Type::Map(ak, av), Type::Map(bk, bv)) => {
                ak.is_assignable_from(bk) && av.is_assignable_from(bv)
            }
            (Type::Optional(a), Type::Optional(b)) => a.is_assignable_from(b),
            (wrapper, Type::Null) if wrapper.is_wrapper() => true,
            (wrapper, other) if wrapper.is_wrapper() => match wrapper.unwrap_wrapper() {
                Some(inner) => inner.is_assignable_from(other),
                None => false,
            },
            (this, wrapper) if wrapper.is_wrapper() => match wrapper.unwrap_wrapper() {
                Some(inner) => this.is_assignable_from(&inner),
                None => false,
            },
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
