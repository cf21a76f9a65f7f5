//! Construction and interning of types.
//!
//! `TypeFactory` is the sole constructor embedders should use for
//! parameterized types. `list`, `map`, and `optional` types are interned per
//! factory instance: two calls with equal arguments return handles sharing
//! one parameter allocation, so equality checks can short-circuit on
//! pointer identity before falling back to structural comparison.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use thiserror::Error;

use crate::{Kind, Type};

/// Errors raised while constructing types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The requested map key type is outside {bool, int, uint, string, dyn}.
    #[error("invalid map key type: {0}")]
    InvalidMapKey(String),
}

/// Factory for types, with per-instance interning of parameterized types.
#[derive(Debug, Default)]
pub struct TypeFactory {
    lists: Mutex<HashMap<Type, Type>>,
    maps: Mutex<HashMap<(Type, Type), Type>>,
    optionals: Mutex<HashMap<Type, Type>>,
}

impl TypeFactory {
    /// Create a new factory with empty interning caches.
    pub fn new() -> Self {
        Self::default()
    }

    /// The builtin singleton type for a non-parameterized kind.
    ///
    /// Returns `None` for kinds that require parameters or a host name
    /// (list, map, optional, struct, enum, opaque).
    pub fn simple_type(&self, kind: Kind) -> Option<Type> {
        simple_type(kind)
    }

    /// The interned `list(elem)` type.
    pub fn list_type(&self, elem: Type) -> Type {
        let mut cache = self.lists.lock().expect("list cache poisoned");
        cache
            .entry(elem.clone())
            .or_insert_with(|| Type::list(elem))
            .clone()
    }

    /// The interned `map(key, value)` type.
    ///
    /// The key type must be bool, int, uint, string, or dyn.
    pub fn map_type(&self, key: Type, value: Type) -> Result<Type, TypeError> {
        if !key.kind().is_valid_map_key() {
            return Err(TypeError::InvalidMapKey(key.name()));
        }
        let mut cache = self.maps.lock().expect("map cache poisoned");
        Ok(cache
            .entry((key.clone(), value.clone()))
            .or_insert_with(|| Type::map(key, value))
            .clone())
    }

    /// The interned `optional_type(elem)` type.
    pub fn optional_type(&self, elem: Type) -> Type {
        let mut cache = self.optionals.lock().expect("optional cache poisoned");
        cache
            .entry(elem.clone())
            .or_insert_with(|| Type::optional(elem))
            .clone()
    }

    /// A struct type for a host-provided fully qualified name.
    pub fn struct_type(&self, name: &str) -> Type {
        Type::struct_type(name)
    }

    /// An enum type for a fully qualified name.
    pub fn enum_type(&self, name: &str) -> Type {
        Type::enum_type(name)
    }
}

/// The builtin singleton type for a non-parameterized kind.
pub fn simple_type(kind: Kind) -> Option<Type> {
    Some(match kind {
        Kind::Null => Type::Null,
        Kind::Bool => Type::Bool,
        Kind::Int => Type::Int,
        Kind::UInt => Type::UInt,
        Kind::Double => Type::Double,
        Kind::Bytes => Type::Bytes,
        Kind::String => Type::String,
        Kind::Duration => Type::Duration,
        Kind::Timestamp => Type::Timestamp,
        Kind::Type => Type::TypeType,
        Kind::BoolWrapper => Type::BoolWrapper,
        Kind::IntWrapper => Type::IntWrapper,
        Kind::UIntWrapper => Type::UIntWrapper,
        Kind::DoubleWrapper => Type::DoubleWrapper,
        Kind::BytesWrapper => Type::BytesWrapper,
        Kind::StringWrapper => Type::StringWrapper,
        Kind::Error => Type::Error,
        Kind::Unknown => Type::Unknown,
        Kind::Dyn => Type::Dyn,
        Kind::Any => Type::Any,
        Kind::List | Kind::Map | Kind::Optional | Kind::Struct | Kind::Enum | Kind::Opaque => {
            return None
        }
    })
}

/// Look up a builtin type by its canonical name, e.g. `"int"` or
/// `"google.protobuf.Timestamp"`.
pub fn builtin_type_by_name(name: &str) -> Option<Type> {
    builtin_name_table().get(name).cloned()
}

fn builtin_name_table() -> &'static HashMap<&'static str, Type> {
    static TABLE: OnceLock<HashMap<&'static str, Type>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = HashMap::new();
        for kind in [
            Kind::Null,
            Kind::Bool,
            Kind::Int,
            Kind::UInt,
            Kind::Double,
            Kind::Bytes,
            Kind::String,
            Kind::Type,
            Kind::Dyn,
            Kind::Any,
            Kind::BoolWrapper,
            Kind::IntWrapper,
            Kind::UIntWrapper,
            Kind::DoubleWrapper,
            Kind::BytesWrapper,
            Kind::StringWrapper,
        ] {
            table.insert(kind.name(), simple_type(kind).expect("simple kind"));
        }
        // Duration and timestamp answer to both the proto name and the
        // short name the checker uses.
        table.insert("google.protobuf.Duration", Type::Duration);
        table.insert("duration", Type::Duration);
        table.insert("google.protobuf.Timestamp", Type::Timestamp);
        table.insert("timestamp", Type::Timestamp);
        // Aliases for the 32-bit wrapper messages.
        table.insert("google.protobuf.Int32Value", Type::IntWrapper);
        table.insert("google.protobuf.UInt32Value", Type::UIntWrapper);
        table.insert("google.protobuf.FloatValue", Type::DoubleWrapper);
        table.insert("list", Type::list(Type::Dyn));
        table.insert("map", Type::map(Type::Dyn, Type::Dyn));
        table
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn list_elem(ty: &Type) -> &Arc<Type> {
        match ty {
            Type::List(elem) => elem,
            _ => panic!("expected list type"),
        }
    }

    #[test]
    fn test_list_interning_gives_handle_identity() {
        let factory = TypeFactory::new();
        let a = factory.list_type(Type::Int);
        let b = factory.list_type(Type::Int);
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(list_elem(&a), list_elem(&b)));

        let c = factory.list_type(Type::UInt);
        assert_ne!(a, c);
    }

    #[test]
    fn test_map_interning_and_key_validation() {
        let factory = TypeFactory::new();
        let a = factory.map_type(Type::String, Type::Int).unwrap();
        let b = factory.map_type(Type::String, Type::Int).unwrap();
        assert_eq!(a, b);
        match (&a, &b) {
            (Type::Map(ak, av), Type::Map(bk, bv)) => {
                assert!(Arc::ptr_eq(ak, bk));
                assert!(Arc::ptr_eq(av, bv));
            }
            _ => panic!("expected map types"),
        }

        let err = factory.map_type(Type::Double, Type::Int).unwrap_err();
        assert_eq!(err, TypeError::InvalidMapKey("double".to_string()));
        assert!(factory.map_type(Type::Dyn, Type::Dyn).is_ok());
    }

    #[test]
    fn test_optional_interning() {
        let factory = TypeFactory::new();
        let a = factory.optional_type(Type::Int);
        let b = factory.optional_type(Type::Int);
        match (&a, &b) {
            (Type::Optional(ae), Type::Optional(be)) => assert!(Arc::ptr_eq(ae, be)),
            _ => panic!("expected optional types"),
        }
    }

    #[test]
    fn test_interning_is_per_factory() {
        let f1 = TypeFactory::new();
        let f2 = TypeFactory::new();
        let a = f1.list_type(Type::Int);
        let b = f2.list_type(Type::Int);
        // Equal but not identical: each factory owns its cache.
        assert_eq!(a, b);
        assert!(!Arc::ptr_eq(list_elem(&a), list_elem(&b)));
    }

    #[test]
    fn test_simple_type_table() {
        let factory = TypeFactory::new();
        assert_eq!(factory.simple_type(Kind::Int), Some(Type::Int));
        assert_eq!(factory.simple_type(Kind::Dyn), Some(Type::Dyn));
        assert_eq!(factory.simple_type(Kind::List), None);
        assert_eq!(factory.simple_type(Kind::Struct), None);
    }

    #[test]
    fn test_builtin_type_by_name() {
        assert_eq!(builtin_type_by_name("int"), Some(Type::Int));
        assert_eq!(builtin_type_by_name("duration"), Some(Type::Duration));
        assert_eq!(
            builtin_type_by_name("google.protobuf.Int32Value"),
            Some(Type::IntWrapper)
        );
        assert_eq!(builtin_type_by_name("no.such.Type"), None);
    }
}
