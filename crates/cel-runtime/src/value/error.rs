//! Error values.
//!
//! Evaluation never panics or returns a host-level `Err` for user input;
//! failures travel through the expression as first-class error values with
//! a closed code set. Operations that consume values propagate the leftmost
//! error eagerly, and errors take precedence over unknowns.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Payload key marking an error produced by a missing attribute.
pub const MISSING_ATTRIBUTE_PAYLOAD_URL: &str =
    "type.googleapis.com/google.api.expr.runtime.MissingAttribute";

/// Payload key marking an error standing in for an unknown function result.
pub const FUNCTION_RESULT_PAYLOAD_URL: &str =
    "type.googleapis.com/google.api.expr.runtime.FunctionResult";

/// The closed set of error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Type mismatch, malformed UTF-8, duplicate map key.
    InvalidArgument,
    /// Missing map key, missing field, unknown enum name.
    NotFound,
    /// Duration/timestamp outside bounds, narrowing overflow, index out of
    /// bounds.
    OutOfRange,
    /// Operation unsupported by the value.
    Unimplemented,
    /// Invariant violation; should not occur in a correctly-built pipeline.
    Internal,
    /// Attribute resolution deferred.
    Unavailable,
}

impl ErrorCode {
    /// Stable lowercase name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::InvalidArgument => "invalid argument",
            ErrorCode::NotFound => "not found",
            ErrorCode::OutOfRange => "out of range",
            ErrorCode::Unimplemented => "unimplemented",
            ErrorCode::Internal => "internal",
            ErrorCode::Unavailable => "unavailable",
        }
    }
}

/// A structured evaluation error carried as a value.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorValue {
    /// The error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payloads keyed by URL.
    pub payloads: BTreeMap<String, Arc<[u8]>>,
}

impl ErrorValue {
    /// Create an error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            payloads: BTreeMap::new(),
        }
    }

    /// Attach a structured payload keyed by URL.
    pub fn with_payload(mut self, url: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        self.payloads.insert(url.into(), bytes.into());
        self
    }

    /// An invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    /// An out of range error.
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::OutOfRange, message)
    }

    /// An unimplemented-operation error.
    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unimplemented, message)
    }

    /// An internal invariant-violation error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Missing map key.
    pub fn no_such_key(key: impl fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("no such key: {}", key))
    }

    /// Missing struct field.
    pub fn no_such_field(field: impl fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("no such field: {}", field))
    }

    /// Unknown type or enum name.
    pub fn not_found(name: impl fmt::Display) -> Self {
        Self::new(ErrorCode::NotFound, format!("not found: {}", name))
    }

    /// List index outside `0..size`.
    pub fn index_out_of_bounds(index: i64, size: usize) -> Self {
        Self::new(
            ErrorCode::OutOfRange,
            format!("index {} out of bounds for size {}", index, size),
        )
    }

    /// A checked string constructor saw malformed UTF-8.
    pub fn malformed_utf8() -> Self {
        Self::invalid_argument("string value is not valid UTF-8")
    }

    /// An attribute could not be resolved; carries the missing-attribute
    /// payload marker.
    pub fn missing_attribute(attribute: impl fmt::Display) -> Self {
        let attribute = attribute.to_string();
        Self::new(
            ErrorCode::Unavailable,
            format!("MissingAttributeError: {}", attribute),
        )
        .with_payload(
            MISSING_ATTRIBUTE_PAYLOAD_URL,
            attribute.into_bytes().into_boxed_slice(),
        )
    }

    /// Returns true if this error carries the missing-attribute marker.
    pub fn is_missing_attribute(&self) -> bool {
        self.payloads.contains_key(MISSING_ATTRIBUTE_PAYLOAD_URL)
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.name(), self.message)
    }
}

impl std::error::Error for ErrorValue {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_codes() {
        assert_eq!(
            ErrorValue::invalid_argument("bad").code,
            ErrorCode::InvalidArgument
        );
        assert_eq!(ErrorValue::no_such_key("k").code, ErrorCode::NotFound);
        assert_eq!(
            ErrorValue::index_out_of_bounds(3, 3).code,
            ErrorCode::OutOfRange
        );
        assert_eq!(
            ErrorValue::unimplemented("nope").code,
            ErrorCode::Unimplemented
        );
        assert_eq!(ErrorValue::internal("bug").code, ErrorCode::Internal);
    }

    #[test]
    fn test_display() {
        let err = ErrorValue::index_out_of_bounds(3, 3);
        assert_eq!(
            err.to_string(),
            "out of range: index 3 out of bounds for size 3"
        );
    }

    #[test]
    fn test_missing_attribute_payload() {
        let err = ErrorValue::missing_attribute("request.user");
        assert_eq!(err.code, ErrorCode::Unavailable);
        assert!(err.is_missing_attribute());
        assert_eq!(
            err.payloads[MISSING_ATTRIBUTE_PAYLOAD_URL].as_ref(),
            b"request.user"
        );

        assert!(!ErrorValue::internal("x").is_missing_attribute());
    }
}
