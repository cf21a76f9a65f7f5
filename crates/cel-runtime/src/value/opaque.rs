//! Host-supplied opaque values.
//!
//! An opaque value carries host data the runtime cannot inspect. The host
//! supplies the type, equality, and debug rendering; everything else
//! (serialization, JSON) answers `unimplemented`.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use cel_runtime_common::Type;

/// The capability interface a host implements for an extension value.
pub trait OpaqueValueInterface: Send + Sync {
    /// The extension type of this value. Must have kind `opaque`.
    fn opaque_type(&self) -> Type;

    /// Host-defined equality. `other` is only ever another opaque value;
    /// downcast through [`OpaqueValueInterface::as_any`].
    fn opaque_equals(&self, other: &dyn OpaqueValueInterface) -> bool;

    /// Deterministic rendering for diagnostics.
    fn debug_string(&self) -> String;

    /// Downcast support for host-side equality.
    fn as_any(&self) -> &dyn Any;
}

/// A shared handle to a host extension value.
#[derive(Clone)]
pub struct OpaqueValue {
    inner: Arc<dyn OpaqueValueInterface>,
}

impl OpaqueValue {
    /// Wrap a host value.
    pub fn new(inner: impl OpaqueValueInterface + 'static) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// The extension type.
    pub fn opaque_type(&self) -> Type {
        self.inner.opaque_type()
    }

    /// The host implementation.
    pub fn interface(&self) -> &dyn OpaqueValueInterface {
        self.inner.as_ref()
    }

    /// Deterministic rendering for diagnostics.
    pub fn debug_string(&self) -> String {
        self.inner.debug_string()
    }
}

impl PartialEq for OpaqueValue {
    fn eq(&self, other: &Self) -> bool {
        self.inner.opaque_equals(other.inner.as_ref())
    }
}

impl fmt::Debug for OpaqueValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.debug_string())
    }
}
