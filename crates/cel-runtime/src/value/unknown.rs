//! Unknown values.
//!
//! An unknown stands for a subexpression whose inputs were deliberately
//! left unresolved. It records *which* inputs: a set of attribute trails
//! (variable plus selector path) and a set of function-result markers.
//! Unlike errors, unknowns merge: when two meet, the result carries the
//! union of both sets.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::MapKey;

/// One selector step within an attribute trail.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum AttributeSelector {
    /// Field access, `.name`.
    Field(Arc<str>),
    /// List index, `[i]`.
    Index(i64),
    /// Map key, `[k]`.
    Key(MapKey),
}

impl fmt::Display for AttributeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeSelector::Field(name) => write!(f, ".{}", name),
            AttributeSelector::Index(i) => write!(f, "[{}]", i),
            AttributeSelector::Key(key) => write!(f, "[{}]", key),
        }
    }
}

/// A path identifying a piece of input whose value is not yet available:
/// a variable name followed by field/index/key selectors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AttributeTrail {
    /// The root variable.
    pub variable: Arc<str>,
    /// Selector steps applied to the root.
    pub selectors: Vec<AttributeSelector>,
}

impl AttributeTrail {
    /// A trail consisting of just a variable.
    pub fn new(variable: impl Into<Arc<str>>) -> Self {
        Self {
            variable: variable.into(),
            selectors: Vec::new(),
        }
    }

    /// Extend the trail with a field selector.
    pub fn field(mut self, name: impl Into<Arc<str>>) -> Self {
        self.selectors.push(AttributeSelector::Field(name.into()));
        self
    }

    /// Extend the trail with an index selector.
    pub fn index(mut self, index: i64) -> Self {
        self.selectors.push(AttributeSelector::Index(index));
        self
    }

    /// Extend the trail with a map-key selector.
    pub fn key(mut self, key: impl Into<MapKey>) -> Self {
        self.selectors.push(AttributeSelector::Key(key.into()));
        self
    }
}

impl fmt::Display for AttributeTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.variable)?;
        for selector in &self.selectors {
            write!(f, "{}", selector)?;
        }
        Ok(())
    }
}

/// Marker for a function call whose result was deferred.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FunctionResult {
    /// The function name.
    pub function: Arc<str>,
    /// The resolved overload identifier.
    pub overload_id: Arc<str>,
}

impl FunctionResult {
    /// Create a marker for one call site.
    pub fn new(function: impl Into<Arc<str>>, overload_id: impl Into<Arc<str>>) -> Self {
        Self {
            function: function.into(),
            overload_id: overload_id.into(),
        }
    }
}

/// The set of deferred inputs a subexpression depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownValue {
    attributes: BTreeSet<AttributeTrail>,
    function_results: BTreeSet<FunctionResult>,
}

impl UnknownValue {
    /// An unknown with no recorded inputs.
    pub fn new() -> Self {
        Self::default()
    }

    /// An unknown carrying a single attribute trail.
    pub fn from_attribute(attribute: AttributeTrail) -> Self {
        let mut unknown = Self::new();
        unknown.attributes.insert(attribute);
        unknown
    }

    /// An unknown carrying a single function-result marker.
    pub fn from_function_result(result: FunctionResult) -> Self {
        let mut unknown = Self::new();
        unknown.function_results.insert(result);
        unknown
    }

    /// The recorded attribute trails.
    pub fn attributes(&self) -> impl Iterator<Item = &AttributeTrail> {
        self.attributes.iter()
    }

    /// The recorded function-result markers.
    pub fn function_results(&self) -> impl Iterator<Item = &FunctionResult> {
        self.function_results.iter()
    }

    /// Whether the trail is recorded here.
    pub fn contains_attribute(&self, attribute: &AttributeTrail) -> bool {
        self.attributes.contains(attribute)
    }

    /// Union of both sets.
    pub fn merge(&self, other: &UnknownValue) -> UnknownValue {
        UnknownValue {
            attributes: self
                .attributes
                .union(&other.attributes)
                .cloned()
                .collect(),
            function_results: self
                .function_results
                .union(&other.function_results)
                .cloned()
                .collect(),
        }
    }
}

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown{{attributes: [")?;
        for (i, attribute) in self.attributes.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", attribute)?;
        }
        write!(f, "], functions: [")?;
        for (i, result) in self.function_results.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}#{}", result.function, result.overload_id)?;
        }
        write!(f, "]}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trail_rendering() {
        let trail = AttributeTrail::new("request")
            .field("headers")
            .key("x-user")
            .index(0);
        assert_eq!(trail.to_string(), "request.headers[\"x-user\"][0]");
    }

    #[test]
    fn test_merge_is_set_union() {
        let a = UnknownValue::from_attribute(AttributeTrail::new("a"));
        let b = UnknownValue::from_attribute(AttributeTrail::new("b"));
        let merged = a.merge(&b);
        assert_eq!(merged.attributes().count(), 2);

        // Merging with itself changes nothing.
        let again = merged.merge(&a);
        assert_eq!(again, merged);
    }

    #[test]
    fn test_merge_function_results() {
        let a = UnknownValue::from_function_result(FunctionResult::new("now", "now_timestamp"));
        let b = UnknownValue::from_attribute(AttributeTrail::new("x"));
        let merged = a.merge(&b);
        assert_eq!(merged.function_results().count(), 1);
        assert_eq!(merged.attributes().count(), 1);
    }

    #[test]
    fn test_contains_attribute() {
        let trail = AttributeTrail::new("request").field("user");
        let unknown = UnknownValue::from_attribute(trail.clone());
        assert!(unknown.contains_attribute(&trail));
        assert!(!unknown.contains_attribute(&AttributeTrail::new("request")));
    }
}
