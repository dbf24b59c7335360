//! Dynamic values flowing through instrumented object graphs.
//!
//! Everything the profiler can see is a [`Value`]. Objects and functions are
//! reference types shared through `Arc`, and their identity is the identity
//! of that allocation.

use std::fmt;
use std::sync::Arc;

use crate::builtins::ErrorObject;
use crate::deferred::Deferred;
use crate::function::{Callable, NativeFunction};
use crate::object::Object;

/// Shared handle to an object.
pub type ObjectRef = Arc<dyn Object>;

/// Shared handle to a callable.
pub type FunctionRef = Arc<dyn Callable>;

/// Result of invoking a callable or reading a property.
pub type CallResult = Result<Value, Thrown>;

/// A symbol used as a property key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    /// The synchronous iteration protocol factory.
    Iterator,
    /// The asynchronous iteration protocol factory.
    AsyncIterator,
    /// Any other symbol, compared by name.
    Named(Arc<str>),
}

impl Symbol {
    /// Create a named symbol.
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Symbol::Named(name.into())
    }

    /// Check if this symbol is one of the iteration protocol factories.
    pub fn is_iteration(&self) -> bool {
        matches!(self, Symbol::Iterator | Symbol::AsyncIterator)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Iterator => write!(f, "@@iterator"),
            Symbol::AsyncIterator => write!(f, "@@asyncIterator"),
            Symbol::Named(name) => write!(f, "@@{}", name),
        }
    }
}

/// Key of an object property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// A string-named property.
    String(String),
    /// A symbol-keyed property.
    Symbol(Symbol),
}

impl PropertyKey {
    /// Get the string name, if this is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(s) => Some(s),
            PropertyKey::Symbol(_) => None,
        }
    }

    /// Check if this key is the given symbol.
    pub fn is_symbol(&self, symbol: &Symbol) -> bool {
        matches!(self, PropertyKey::Symbol(s) if s == symbol)
    }

    /// Parse this key as an array index.
    pub fn as_index(&self) -> Option<usize> {
        self.as_str().and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", s),
            PropertyKey::Symbol(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::String(s)
    }
}

impl From<Symbol> for PropertyKey {
    fn from(s: Symbol) -> Self {
        PropertyKey::Symbol(s)
    }
}

impl From<usize> for PropertyKey {
    fn from(index: usize) -> Self {
        PropertyKey::String(index.to_string())
    }
}

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// The absent value.
    #[default]
    Undefined,
    /// The null value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A number.
    Number(f64),
    /// A string.
    String(Arc<str>),
    /// A symbol.
    Symbol(Symbol),
    /// A reference to an object.
    Object(ObjectRef),
    /// A reference to a callable.
    Function(FunctionRef),
}

impl Value {
    /// Create a string value.
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::String(s.into())
    }

    /// Create an object value from an object implementation.
    pub fn object(object: impl Object) -> Self {
        Value::Object(Arc::new(object))
    }

    /// Create a function value from a closure.
    pub fn function<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> CallResult + Send + Sync + 'static,
    {
        Value::Function(Arc::new(NativeFunction::new(name, body)))
    }

    /// Create a value holding a deferred result.
    pub fn deferred(deferred: Arc<Deferred>) -> Self {
        Value::Object(deferred)
    }

    /// Get the object reference, if this is an object.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get the function reference, if this is a function.
    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Get the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the number, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the boolean, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Check if this is `undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Check if this is `undefined` or `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Truthiness of the value.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// The `typeof` tag of the value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "object",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Object(o) if o.is_callable() => "function",
            Value::Object(_) => "object",
            Value::Function(_) => "function",
        }
    }

    /// Downcast an object value to its concrete implementation.
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_object()
            .and_then(|o| o.as_any().downcast_ref::<T>())
    }

    /// Get the deferred result, if this value is one.
    pub fn as_deferred(&self) -> Option<&Deferred> {
        self.downcast_ref::<Deferred>()
    }

    /// Read a property, using this value as the receiver.
    ///
    /// Reading from `undefined` or `null` throws a `TypeError`; other
    /// primitives and plain functions have no properties.
    pub fn get(&self, key: impl Into<PropertyKey>) -> CallResult {
        let key = key.into();
        match self {
            Value::Object(o) => o.get(&key, self),
            Value::Undefined | Value::Null => Err(Thrown::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                self, key
            ))),
            _ => Ok(Value::Undefined),
        }
    }

    /// Write a property on an object value.
    ///
    /// Returns `false` when the write was rejected.
    pub fn set(&self, key: impl Into<PropertyKey>, value: Value) -> Result<bool, Thrown> {
        match self {
            Value::Object(o) => o.set(key.into(), value),
            _ => Ok(false),
        }
    }

    /// Invoke this value with an explicit receiver.
    pub fn call(&self, this: &Value, args: &[Value]) -> CallResult {
        match self {
            Value::Function(f) => f.call(this, args),
            Value::Object(o) if o.is_callable() => o.invoke(this, args),
            other => Err(Thrown::type_error(format!("{} is not a function", other))),
        }
    }

    /// Read a method and invoke it with this value as the receiver.
    pub fn call_method(&self, key: impl Into<PropertyKey>, args: &[Value]) -> CallResult {
        let key = key.into();
        let method = self.get(key.clone())?;
        if method.is_undefined() {
            return Err(Thrown::type_error(format!("{} is not a function", key)));
        }
        method.call(self, args)
    }

    /// Check if two values refer to the same object or function.
    pub fn same_ref(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            _ => self.same_ref(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::Symbol(s) => write!(f, "Symbol({})", s),
            Value::Object(o) => write!(f, "{}", o.describe()),
            Value::Function(func) => write!(f, "function {}()", func.name()),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{:?}", s),
            other => write!(f, "{}", other),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Value::Object(o)
    }
}

impl From<FunctionRef> for Value {
    fn from(f: FunctionRef) -> Self {
        Value::Function(f)
    }
}

/// A value thrown out of a call or property read.
///
/// The payload is carried unmodified; instrumentation never replaces it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("uncaught {0}")]
pub struct Thrown(pub Value);

impl Thrown {
    /// Throw an arbitrary value.
    pub fn new(value: impl Into<Value>) -> Self {
        Self(value.into())
    }

    /// Throw a new `Error` object with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self(Value::object(ErrorObject::new("Error", message)))
    }

    /// Throw a new `TypeError` object with the given message.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self(Value::object(ErrorObject::new("TypeError", message)))
    }

    /// The thrown value.
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Consume and return the thrown value.
    pub fn into_value(self) -> Value {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::PlainObject;

    #[test]
    fn test_property_key_display() {
        assert_eq!(PropertyKey::from("fetch").to_string(), "fetch");
        assert_eq!(PropertyKey::from(Symbol::Iterator).to_string(), "@@iterator");
        assert_eq!(
            PropertyKey::from(Symbol::named("tag")).to_string(),
            "@@tag"
        );
    }

    #[test]
    fn test_value_equality_is_identity_for_references() {
        let a = Value::object(PlainObject::new());
        let b = Value::object(PlainObject::new());

        assert_eq!(a, a.clone());
        assert_ne!(a, b);
        assert_eq!(Value::from(1), Value::Number(1.0));
        assert_eq!(Value::from("x"), Value::string("x"));
    }

    #[test]
    fn test_get_on_undefined_throws_type_error() {
        let err = Value::Undefined.get("x").unwrap_err();
        let message = err.value().get("message").unwrap();
        assert_eq!(
            message.as_str(),
            Some("Cannot read properties of undefined (reading 'x')")
        );
    }

    #[test]
    fn test_call_non_function_throws() {
        let result = Value::from(3).call(&Value::Undefined, &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_call_method_binds_receiver() {
        let object = PlainObject::new()
            .with("name", Value::from("svc"))
            .with(
                "whoami",
                Value::function("whoami", |this, _| this.get("name")),
            )
            .into_value();

        let result = object.call_method("whoami", &[]).unwrap();
        assert_eq!(result.as_str(), Some("svc"));
    }

    #[test]
    fn test_type_name() {
        assert_eq!(Value::Null.type_name(), "object");
        assert_eq!(Value::function("f", |_, _| Ok(Value::Undefined)).type_name(), "function");
        assert_eq!(Value::object(PlainObject::new()).type_name(), "object");
    }
}
