//! Function overload declarations.
//!
//! The runtime only *consumes* these through the `Activation` contract:
//! overload selection and dispatch belong to the evaluator's function
//! registry, outside this core.

use crate::Type;

/// A single function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionOverload {
    /// Unique identifier, e.g. `"equals_int64_uint64"`.
    pub id: String,
    /// Parameter types, receiver first for member functions.
    pub params: Vec<Type>,
    /// Return type.
    pub result: Type,
    /// Whether this is a member function (`receiver.method(args)`).
    pub is_member: bool,
}

impl FunctionOverload {
    /// Create a standalone function overload.
    pub fn function(id: impl Into<String>, params: Vec<Type>, result: Type) -> Self {
        Self {
            id: id.into(),
            params,
            result,
            is_member: false,
        }
    }

    /// Create a member function overload; `params[0]` is the receiver type.
    pub fn method(id: impl Into<String>, params: Vec<Type>, result: Type) -> Self {
        Self {
            id: id.into(),
            params,
            result,
            is_member: true,
        }
    }

    /// The receiver type for member overloads.
    pub fn receiver_type(&self) -> Option<&Type> {
        if self.is_member {
            self.params.first()
        } else {
            None
        }
    }

    /// The argument types, excluding the receiver for member overloads.
    pub fn arg_types(&self) -> &[Type] {
        if self.is_member && !self.params.is_empty() {
            &self.params[1..]
        } else {
            &self.params
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_overload() {
        let overload =
            FunctionOverload::function("size_list", vec![Type::list(Type::Dyn)], Type::Int);
        assert!(!overload.is_member);
        assert!(overload.receiver_type().is_none());
        assert_eq!(overload.arg_types().len(), 1);
    }

    #[test]
    fn test_method_overload() {
        let overload = FunctionOverload::method(
            "string_contains_string",
            vec![Type::String, Type::String],
            Type::Bool,
        );
        assert!(overload.is_member);
        assert_eq!(overload.receiver_type(), Some(&Type::String));
        assert_eq!(overload.arg_types(), &[Type::String]);
    }
}
