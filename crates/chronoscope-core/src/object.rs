//! Objects and the reflective primitives the profiler relies on.
//!
//! The [`Object`] trait is the seam every object implementation plugs into:
//! property reads with an explicit receiver, own-property descriptors and a
//! structural [`ObjectClass`]. This module also provides the ordinary
//! dictionary and array objects.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

use crate::classify::ObjectClass;
use crate::function::NativeFunction;
use crate::value::{CallResult, FunctionRef, ObjectRef, PropertyKey, Symbol, Thrown, Value};

/// Attributes of an own property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDescriptor {
    /// Whether the value may be changed by assignment.
    pub writable: bool,
    /// Whether the property shows up in key enumeration.
    pub enumerable: bool,
    /// Whether the property may be deleted or redefined.
    pub configurable: bool,
    /// Whether the property is computed by a getter.
    pub accessor: bool,
}

impl PropertyDescriptor {
    /// A writable, enumerable, configurable data property.
    pub const fn data() -> Self {
        Self {
            writable: true,
            enumerable: true,
            configurable: true,
            accessor: false,
        }
    }

    /// A data property that can neither be written nor redefined.
    pub const fn locked() -> Self {
        Self {
            writable: false,
            enumerable: true,
            configurable: false,
            accessor: false,
        }
    }

    /// A configurable accessor property.
    pub const fn getter() -> Self {
        Self {
            writable: false,
            enumerable: true,
            configurable: true,
            accessor: true,
        }
    }

    /// Check if the property is neither configurable nor writable.
    pub fn is_locked(&self) -> bool {
        !self.configurable && !self.writable
    }
}

/// An object reachable from a [`Value`].
pub trait Object: Send + Sync + 'static {
    /// Read a property. `receiver` is the value the read was made through
    /// and is the `this` for accessors.
    fn get(&self, key: &PropertyKey, receiver: &Value) -> CallResult;

    /// Get the descriptor of an own property.
    fn get_own_property(&self, _key: &PropertyKey) -> Result<Option<PropertyDescriptor>, Thrown> {
        Ok(None)
    }

    /// Write a property. Returns `false` when the write was rejected.
    fn set(&self, _key: PropertyKey, _value: Value) -> Result<bool, Thrown> {
        Ok(false)
    }

    /// Own enumerable keys, in definition order.
    fn keys(&self) -> Vec<PropertyKey> {
        Vec::new()
    }

    /// Structural class of this object.
    fn class(&self) -> ObjectClass {
        ObjectClass::Ordinary
    }

    /// Whether this object can be invoked directly.
    fn is_callable(&self) -> bool {
        false
    }

    /// Invoke this object directly.
    fn invoke(&self, _this: &Value, _args: &[Value]) -> CallResult {
        Err(Thrown::type_error(format!("{} is not a function", self.describe())))
    }

    /// Short description used when the object is printed.
    fn describe(&self) -> String {
        "[object Object]".to_string()
    }

    /// Access the concrete type for downcasting.
    fn as_any(&self) -> &dyn Any;
}

#[derive(Clone)]
enum Slot {
    Data(Value),
    Getter(FunctionRef),
}

#[derive(Clone)]
struct Property {
    key: PropertyKey,
    slot: Slot,
    descriptor: PropertyDescriptor,
}

/// An ordered dictionary object.
///
/// Reads fall back to the prototype when a key is not an own property.
#[derive(Default)]
pub struct PlainObject {
    properties: RwLock<Vec<Property>>,
    prototype: Option<ObjectRef>,
    class_name: Option<String>,
}

impl PlainObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a writable, configurable data property.
    pub fn with(self, key: impl Into<PropertyKey>, value: Value) -> Self {
        self.with_property(key, value, PropertyDescriptor::data())
    }

    /// Add a non-writable, non-configurable data property.
    pub fn with_constant(self, key: impl Into<PropertyKey>, value: Value) -> Self {
        self.with_property(key, value, PropertyDescriptor::locked())
    }

    /// Add a data property with explicit attributes.
    pub fn with_property(
        self,
        key: impl Into<PropertyKey>,
        value: Value,
        descriptor: PropertyDescriptor,
    ) -> Self {
        self.put(key.into(), Slot::Data(value), descriptor);
        self
    }

    /// Add an accessor property computed by `getter` on every read.
    pub fn with_getter<F>(self, key: impl Into<PropertyKey>, getter: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> CallResult + Send + Sync + 'static,
    {
        let key = key.into();
        let getter: FunctionRef = Arc::new(NativeFunction::new(format!("get {}", key), getter));
        self.put(key, Slot::Getter(getter), PropertyDescriptor::getter());
        self
    }

    /// Set the prototype consulted for keys that are not own properties.
    pub fn with_prototype(mut self, prototype: ObjectRef) -> Self {
        self.prototype = Some(prototype);
        self
    }

    /// Set the class name used when the object is printed.
    pub fn with_class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = Some(name.into());
        self
    }

    /// Wrap this object into a [`Value`].
    pub fn into_value(self) -> Value {
        Value::object(self)
    }

    /// Define or replace an own property.
    pub fn define(&self, key: impl Into<PropertyKey>, value: Value, descriptor: PropertyDescriptor) {
        self.put(key.into(), Slot::Data(value), descriptor);
    }

    /// Make every own property non-writable and non-configurable.
    pub fn freeze(&self) {
        for property in self.properties.write().iter_mut() {
            property.descriptor.configurable = false;
            if !property.descriptor.accessor {
                property.descriptor.writable = false;
            }
        }
    }

    /// Number of own properties.
    pub fn len(&self) -> usize {
        self.properties.read().len()
    }

    /// Check if there are no own properties.
    pub fn is_empty(&self) -> bool {
        self.properties.read().is_empty()
    }

    fn put(&self, key: PropertyKey, slot: Slot, descriptor: PropertyDescriptor) {
        let mut properties = self.properties.write();
        if let Some(existing) = properties.iter_mut().find(|p| p.key == key) {
            existing.slot = slot;
            existing.descriptor = descriptor;
        } else {
            properties.push(Property {
                key,
                slot,
                descriptor,
            });
        }
    }

    fn own_slot(&self, key: &PropertyKey) -> Option<Slot> {
        self.properties
            .read()
            .iter()
            .find(|p| &p.key == key)
            .map(|p| p.slot.clone())
    }
}

impl Object for PlainObject {
    fn get(&self, key: &PropertyKey, receiver: &Value) -> CallResult {
        // Release the lock before running a getter, it may read back into us.
        match self.own_slot(key) {
            Some(Slot::Data(value)) => Ok(value),
            Some(Slot::Getter(getter)) => getter.call(receiver, &[]),
            None => match &self.prototype {
                Some(prototype) => prototype.get(key, receiver),
                None => Ok(Value::Undefined),
            },
        }
    }

    fn get_own_property(&self, key: &PropertyKey) -> Result<Option<PropertyDescriptor>, Thrown> {
        Ok(self
            .properties
            .read()
            .iter()
            .find(|p| &p.key == key)
            .map(|p| p.descriptor))
    }

    fn set(&self, key: PropertyKey, value: Value) -> Result<bool, Thrown> {
        let mut properties = self.properties.write();
        match properties.iter_mut().find(|p| p.key == key) {
            Some(property) => {
                if !property.descriptor.writable || property.descriptor.accessor {
                    return Ok(false);
                }
                property.slot = Slot::Data(value);
            }
            None => properties.push(Property {
                key,
                slot: Slot::Data(value),
                descriptor: PropertyDescriptor::data(),
            }),
        }
        Ok(true)
    }

    fn keys(&self) -> Vec<PropertyKey> {
        self.properties
            .read()
            .iter()
            .filter(|p| p.descriptor.enumerable)
            .map(|p| p.key.clone())
            .collect()
    }

    fn describe(&self) -> String {
        match &self.class_name {
            Some(name) => format!("[object {}]", name),
            None => "[object Object]".to_string(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Largest index an array element can be written at.
pub const MAX_ARRAY_INDEX: usize = (u32::MAX - 1) as usize;

/// An index-addressed sequence with `length` and the iteration protocol.
#[derive(Default)]
pub struct ArrayObject {
    elements: RwLock<Vec<Value>>,
}

impl ArrayObject {
    /// Create an empty array.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an array holding the given values.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        Self {
            elements: RwLock::new(values.into_iter().collect()),
        }
    }

    /// Append a value.
    pub fn push(&self, value: Value) {
        self.elements.write().push(value);
    }

    /// Get the element at `index`.
    pub fn element(&self, index: usize) -> Option<Value> {
        self.elements.read().get(index).cloned()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.read().len()
    }

    /// Check if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.read().is_empty()
    }

    /// Copy out all elements.
    pub fn to_vec(&self) -> Vec<Value> {
        self.elements.read().clone()
    }
}

impl Object for ArrayObject {
    fn get(&self, key: &PropertyKey, _receiver: &Value) -> CallResult {
        if key.is_symbol(&Symbol::Iterator) {
            return Ok(Value::function("values", |this, _| {
                let source = this
                    .as_object()
                    .filter(|o| o.as_any().is::<ArrayObject>())
                    .ok_or_else(|| Thrown::type_error("values called on a non-array receiver"))?;
                Ok(Value::object(ArrayIterator::new(Arc::clone(source))))
            }));
        }
        if key.as_str() == Some("length") {
            return Ok(Value::from(self.len()));
        }
        Ok(key
            .as_index()
            .and_then(|index| self.element(index))
            .unwrap_or_default())
    }

    fn get_own_property(&self, key: &PropertyKey) -> Result<Option<PropertyDescriptor>, Thrown> {
        if key.as_str() == Some("length") {
            return Ok(Some(PropertyDescriptor {
                writable: true,
                enumerable: false,
                configurable: false,
                accessor: false,
            }));
        }
        Ok(key
            .as_index()
            .filter(|index| *index < self.len())
            .map(|_| PropertyDescriptor::data()))
    }

    fn set(&self, key: PropertyKey, value: Value) -> Result<bool, Thrown> {
        let Some(index) = key.as_index().filter(|index| *index <= MAX_ARRAY_INDEX) else {
            return Ok(false);
        };
        let mut elements = self.elements.write();
        if index >= elements.len() {
            let Some(len) = index.checked_add(1) else {
                return Ok(false);
            };
            elements.resize(len, Value::Undefined);
        }
        elements[index] = value;
        Ok(true)
    }

    fn keys(&self) -> Vec<PropertyKey> {
        (0..self.len()).map(PropertyKey::from).collect()
    }

    fn class(&self) -> ObjectClass {
        ObjectClass::Array
    }

    fn describe(&self) -> String {
        "[object Array]".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Iterator over an [`ArrayObject`].
///
/// `next` only works when invoked with the iterator itself as receiver.
pub struct ArrayIterator {
    source: ObjectRef,
    position: AtomicUsize,
}

impl ArrayIterator {
    fn new(source: ObjectRef) -> Self {
        Self {
            source,
            position: AtomicUsize::new(0),
        }
    }

    fn step(&self) -> Value {
        let index = self.position.fetch_add(1, Ordering::SeqCst);
        let element = self
            .source
            .as_any()
            .downcast_ref::<ArrayObject>()
            .and_then(|array| array.element(index));
        match element {
            Some(value) => iter_result(value, false),
            None => {
                self.position.store(usize::MAX / 2, Ordering::SeqCst);
                iter_result(Value::Undefined, true)
            }
        }
    }
}

impl Object for ArrayIterator {
    fn get(&self, key: &PropertyKey, _receiver: &Value) -> CallResult {
        if key.is_symbol(&Symbol::Iterator) {
            return Ok(Value::function("iterator", |this, _| Ok(this.clone())));
        }
        match key.as_str() {
            Some("next") => Ok(Value::function("next", |this, _| {
                let iterator = this
                    .downcast_ref::<ArrayIterator>()
                    .ok_or_else(|| Thrown::type_error("next called on incompatible receiver"))?;
                Ok(iterator.step())
            })),
            _ => Ok(Value::Undefined),
        }
    }

    fn describe(&self) -> String {
        "[object Array Iterator]".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Build an iteration step result `{ value, done }`.
pub fn iter_result(value: Value, done: bool) -> Value {
    PlainObject::new()
        .with("value", value)
        .with("done", Value::Bool(done))
        .into_value()
}

/// Drive the synchronous iteration protocol of `iterable` to completion.
pub fn collect_iter(iterable: &Value) -> Result<Vec<Value>, Thrown> {
    let factory = iterable.get(Symbol::Iterator)?;
    let iterator = factory.call(iterable, &[])?;
    let mut values = Vec::new();
    loop {
        let step = iterator.call_method("next", &[])?;
        if step.get("done")?.is_truthy() {
            return Ok(values);
        }
        values.push(step.get("value")?);
    }
}
