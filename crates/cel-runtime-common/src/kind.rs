//! The closed kind taxonomy shared by types and values.
//!
//! Every `Type` and every runtime value carries exactly one `Kind`. The set
//! is closed: evaluators dispatch on it with exhaustive matches and rely on
//! there being no open variants.

use std::fmt;

/// The kind of a CEL type or value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    /// The null type / null value.
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
    /// Signed nanosecond-resolution interval.
    Duration,
    /// Absolute instant with nanosecond resolution.
    Timestamp,
    /// Ordered sequence of values.
    List,
    /// Unordered key-value pairs.
    Map,
    /// Named record with typed fields.
    Struct,
    /// A type used as a value.
    Type,
    /// Named enumeration constant.
    Enum,
    /// Host-supplied extension value.
    Opaque,
    /// Present-or-absent wrapper over any type.
    Optional,
    /// Nullable bool (`google.protobuf.BoolValue`).
    BoolWrapper,
    /// Nullable int (`google.protobuf.Int64Value`).
    IntWrapper,
    /// Nullable uint (`google.protobuf.UInt64Value`).
    UIntWrapper,
    /// Nullable double (`google.protobuf.DoubleValue`).
    DoubleWrapper,
    /// Nullable bytes (`google.protobuf.BytesValue`).
    BytesWrapper,
    /// Nullable string (`google.protobuf.StringValue`).
    StringWrapper,
    /// Evaluation error carried as a value.
    Error,
    /// Deferred-resolution marker carried as a value.
    Unknown,
    /// The top type; every value satisfies it.
    Dyn,
    /// Serialization wrapper (type URL + bytes).
    Any,
}

impl Kind {
    /// Canonical lowercase name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Kind::Null => "null_type",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::UInt => "uint",
            Kind::Double => "double",
            Kind::Bytes => "bytes",
            Kind::String => "string",
            Kind::Duration => "duration",
            Kind::Timestamp => "timestamp",
            Kind::List => "list",
            Kind::Map => "map",
            Kind::Struct => "struct",
            Kind::Type => "type",
            Kind::Enum => "enum",
            Kind::Opaque => "opaque",
            Kind::Optional => "optional",
            Kind::BoolWrapper => "google.protobuf.BoolValue",
            Kind::IntWrapper => "google.protobuf.Int64Value",
            Kind::UIntWrapper => "google.protobuf.UInt64Value",
            Kind::DoubleWrapper => "google.protobuf.DoubleValue",
            Kind::BytesWrapper => "google.protobuf.BytesValue",
            Kind::StringWrapper => "google.protobuf.StringValue",
            Kind::Error => "*error*",
            Kind::Unknown => "*unknown*",
            Kind::Dyn => "dyn",
            Kind::Any => "google.protobuf.Any",
        }
    }

    /// Returns true for bool, int, uint, double, bytes, and string.
    pub fn is_primitive(self) -> bool {
        matches!(
            self,
            Kind::Bool | Kind::Int | Kind::UInt | Kind::Double | Kind::Bytes | Kind::String
        )
    }

    /// Returns true for int, uint, and double.
    pub fn is_numeric(self) -> bool {
        matches!(self, Kind::Int | Kind::UInt | Kind::Double)
    }

    /// Returns true for the six nullable-primitive wrapper kinds.
    pub fn is_wrapper(self) -> bool {
        matches!(
            self,
            Kind::BoolWrapper
                | Kind::IntWrapper
                | Kind::UIntWrapper
                | Kind::DoubleWrapper
                | Kind::BytesWrapper
                | Kind::StringWrapper
        )
    }

    /// Returns true for the kinds permitted as map keys.
    pub fn is_valid_map_key(self) -> bool {
        matches!(
            self,
            Kind::Bool | Kind::Int | Kind::UInt | Kind::String | Kind::Dyn
        )
    }

    /// Maps a wrapper kind to the primitive kind it wraps.
    pub fn unwrap_wrapper(self) -> Option<Kind> {
        match self {
            Kind::BoolWrapper => Some(Kind::Bool),
            Kind::IntWrapper => Some(Kind::Int),
            Kind::UIntWrapper => Some(Kind::UInt),
            Kind::DoubleWrapper => Some(Kind::Double),
            Kind::BytesWrapper => Some(Kind::Bytes),
            Kind::StringWrapper => Some(Kind::String),
            _ => None,
        }
    }

    /// Maps a primitive kind to its wrapper kind.
    pub fn wrap_primitive(self) -> Option<Kind> {
        match self {
            Kind::Bool => Some(Kind::BoolWrapper),
            Kind::Int => Some(Kind::IntWrapper),
            Kind::UInt => Some(Kind::UIntWrapper),
            Kind::Double => Some(Kind::DoubleWrapper),
            Kind::Bytes => Some(Kind::BytesWrapper),
            Kind::String => Some(Kind::StringWrapper),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
