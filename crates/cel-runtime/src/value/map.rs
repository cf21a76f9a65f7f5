//! Map storage and keys.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::Value;

/// A map key. CEL restricts keys to bool, int, uint, and string.
///
/// Ordering is derived so `ValueMap` iteration is deterministic for a value
/// and all of its copies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    UInt(u64),
    String(Arc<str>),
}

impl MapKey {
    /// Build a key from a value, or `None` if the value's kind cannot key a
    /// map.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(MapKey::Bool(*b)),
            Value::Int(i) => Some(MapKey::Int(*i)),
            Value::UInt(u) => Some(MapKey::UInt(*u)),
            Value::String(s) => Some(MapKey::String(s.clone())),
            _ => None,
        }
    }

    /// Convert back to a value.
    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::UInt(u) => Value::UInt(*u),
            MapKey::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_value(), f)
    }
}

macro_rules! impl_map_key_from {
    ($($from:ty => $variant:ident($conv:expr)),* $(,)?) => {
        $(impl From<$from> for MapKey {
            fn from(value: $from) -> Self {
                MapKey::$variant($conv(value))
            }
        })*
    };
}

impl_map_key_from! {
    bool => Bool(std::convert::identity),
    i32 => Int(i64::from),
    i64 => Int(std::convert::identity),
    u32 => UInt(u64::from),
    u64 => UInt(std::convert::identity),
    &str => String(Arc::from),
    String => String(Arc::from),
    Arc<str> => String(std::convert::identity),
}

/// Unordered key-value pairs with deterministic iteration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueMap {
    entries: BTreeMap<MapKey, Value>,
}

impl ValueMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a map from key-value pairs. Later duplicates overwrite
    /// earlier ones; builders reject duplicates before reaching here.
    pub fn from_entries(entries: impl IntoIterator<Item = (MapKey, Value)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Look up a key exactly.
    pub fn get(&self, key: &MapKey) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Look up a key, coercing between int and uint keys whose
    /// mathematical value matches.
    pub fn get_with_numeric_coercion(&self, key: &MapKey) -> Option<&Value> {
        if let Some(value) = self.entries.get(key) {
            return Some(value);
        }
        match key {
            MapKey::Int(i) if *i >= 0 => self.entries.get(&MapKey::UInt(*i as u64)),
            MapKey::UInt(u) if *u <= i64::MAX as u64 => self.entries.get(&MapKey::Int(*u as i64)),
            _ => None,
        }
    }

    /// Insert a pair, replacing any existing entry for the key.
    pub fn insert(&mut self, key: MapKey, value: Value) -> Option<Value> {
        self.entries.insert(key, value)
    }

    /// Whether the key is present (with numeric coercion).
    pub fn contains_key(&self, key: &MapKey) -> bool {
        self.get_with_numeric_coercion(key).is_some()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&MapKey, &Value)> {
        self.entries.iter()
    }

    /// Iterate over keys.
    pub fn keys(&self) -> impl Iterator<Item = &MapKey> {
        self.entries.keys()
    }

    /// Iterate over values.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.values()
    }

    /// Visit entries until the callback returns `false`.
    pub fn for_each(&self, mut f: impl FnMut(&MapKey, &Value) -> bool) {
        for (key, value) in &self.entries {
            if !f(key, value) {
                break;
            }
        }
    }
}

impl FromIterator<(MapKey, Value)> for ValueMap {
    fn from_iter<I: IntoIterator<Item = (MapKey, Value)>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}
