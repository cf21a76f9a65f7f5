//! Variable bindings consulted during evaluation.
//!
//! The `Activation` trait resolves identifier names to values and function
//! names to overload declarations. The runtime only consumes the overload
//! side; dispatch belongs to the evaluator's function registry.
//!
//! `BindingsActivation` stores eager values and lazy thunks; a thunk runs
//! on first access and its result is cached for the rest of the
//! activation's life.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use cel_runtime_common::FunctionOverload;

use crate::value::Value;

/// Resolution of names during evaluation.
pub trait Activation: Send + Sync {
    /// Resolve a variable name to its bound value, or `None` when the
    /// name is unbound.
    fn find_variable(&self, name: &str) -> Option<Value>;

    /// The overloads registered for a function name; empty when none.
    fn find_function_overloads(&self, _name: &str) -> Vec<FunctionOverload> {
        Vec::new()
    }

    /// Presence check without producing the value.
    fn has_variable(&self, name: &str) -> bool {
        self.find_variable(name).is_some()
    }
}

enum Binding {
    Eager(Value),
    Lazy {
        thunk: Box<dyn Fn() -> Value + Send + Sync>,
        cell: OnceLock<Value>,
    },
}

impl Binding {
    fn value(&self) -> Value {
        match self {
            Binding::Eager(value) => value.clone(),
            Binding::Lazy { thunk, cell } => cell.get_or_init(|| thunk()).clone(),
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Eager(value) => f.debug_tuple("Eager").field(value).finish(),
            Binding::Lazy { cell, .. } => f
                .debug_struct("Lazy")
                .field("resolved", &cell.get().is_some())
                .finish(),
        }
    }
}

/// A mutable activation backed by name-keyed bindings.
#[derive(Debug, Default)]
pub struct BindingsActivation {
    variables: HashMap<String, Binding>,
    functions: HashMap<String, Vec<FunctionOverload>>,
}

impl BindingsActivation {
    /// An activation with no bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a name to a value.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.variables
            .insert(name.into(), Binding::Eager(value.into()));
    }

    /// Bind a name to a thunk evaluated on first access; the result is
    /// cached within this activation.
    pub fn bind_lazy(
        &mut self,
        name: impl Into<String>,
        thunk: impl Fn() -> Value + Send + Sync + 'static,
    ) {
        self.variables.insert(
            name.into(),
            Binding::Lazy {
                thunk: Box::new(thunk),
                cell: OnceLock::new(),
            },
        );
    }

    /// Register function overloads under a name.
    pub fn bind_function(
        &mut self,
        name: impl Into<String>,
        overloads: impl IntoIterator<Item = FunctionOverload>,
    ) {
        self.functions
            .insert(name.into(), overloads.into_iter().collect());
    }

    /// Remove a variable binding.
    pub fn unbind(&mut self, name: &str) {
        self.variables.remove(name);
    }

    /// Number of variable bindings.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether there are no variable bindings.
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl Activation for BindingsActivation {
    fn find_variable(&self, name: &str) -> Option<Value> {
        self.variables.get(name).map(Binding::value)
    }

    fn find_function_overloads(&self, name: &str) -> Vec<FunctionOverload> {
        self.functions.get(name).cloned().unwrap_or_default()
    }

    fn has_variable(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }
}

/// An activation with no bindings at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyActivation;

impl EmptyActivation {
    /// Create the empty activation.
    pub fn new() -> Self {
        Self
    }
}

impl Activation for EmptyActivation {
    fn find_variable(&self, _name: &str) -> Option<Value> {
        None
    }

    fn has_variable(&self, _name: &str) -> bool {
        false
    }
}

/// An activation layering local bindings over a parent; locals shadow.
/// Used for comprehension scopes.
pub struct ScopedActivation<'a> {
    parent: &'a dyn Activation,
    local: HashMap<String, Value>,
}

impl<'a> ScopedActivation<'a> {
    /// A scope over `parent` with no local bindings yet.
    pub fn new(parent: &'a dyn Activation) -> Self {
        Self {
            parent,
            local: HashMap::new(),
        }
    }

    /// Builder-style local binding.
    pub fn with_binding(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.local.insert(name.into(), value.into());
        self
    }

    /// Insert a local binding, shadowing the parent.
    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.local.insert(name.into(), value.into());
    }
}

impl Activation for ScopedActivation<'_> {
    fn find_variable(&self, name: &str) -> Option<Value> {
        self.local
            .get(name)
            .cloned()
            .or_else(|| self.parent.find_variable(name))
    }

    fn find_function_overloads(&self, name: &str) -> Vec<FunctionOverload> {
        self.parent.find_function_overloads(name)
    }

    fn has_variable(&self, name: &str) -> bool {
        self.local.contains_key(name) || self.parent.has_variable(name)
    }
}

impl<T: Activation + ?Sized> Activation for &T {
    fn find_variable(&self, name: &str) -> Option<Value> {
        (**self).find_variable(name)
    }

    fn find_function_overloads(&self, name: &str) -> Vec<FunctionOverload> {
        (**self).find_function_overloads(name)
    }

    fn has_variable(&self, name: &str) -> bool {
        (**self).has_variable(name)
    }
}

impl<T: Activation + ?Sized> Activation for Arc<T> {
    fn find_variable(&self, name: &str) -> Option<Value> {
        (**self).find_variable(name)
    }

    fn find_function_overloads(&self, name: &str) -> Vec<FunctionOverload> {
        (**self).find_function_overloads(name)
    }

    fn has_variable(&self, name: &str) -> bool {
        (**self).has_variable(name)
    }
}

impl<T: Activation + ?Sized> Activation for Box<T> {
    fn find_variable(&self, name: &str) -> Option<Value> {
        (**self).find_variable(name)
    }

    fn find_function_overloads(&self, name: &str) -> Vec<FunctionOverload> {
        (**self).find_function_overloads(name)
    }

    fn has_variable(&self, name: &str) -> bool {
        (**self).has_variable(name)
    }
}
