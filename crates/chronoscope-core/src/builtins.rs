//! Built-in runtime objects.
//!
//! These carry internal state that their methods reach through the
//! receiver. Calling a method with anything but the original object as
//! `this` fails with a `TypeError`, the same way host built-ins reject
//! forwarding wrappers.

use std::any::Any;

use bytes::Bytes;
use parking_lot::RwLock;

use crate::classify::{ElementType, NativeKind, ObjectClass};
use crate::function::arg;
use crate::object::{Object, PropertyDescriptor};
use crate::value::{CallResult, PropertyKey, Thrown, Value};

fn incompatible(type_name: &str, method: &str) -> Thrown {
    Thrown::type_error(format!(
        "Method {}.prototype.{} called on incompatible receiver",
        type_name, method
    ))
}

/// A hash-map collection keyed by value.
#[derive(Default)]
pub struct MapObject {
    entries: RwLock<Vec<(Value, Value)>>,
}

impl MapObject {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry.
    pub fn insert(&self, key: Value, value: Value) {
        let mut entries = self.entries.write();
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => entries.push((key, value)),
        }
    }

    /// Look up an entry.
    pub fn lookup(&self, key: &Value) -> Option<Value> {
        self.entries
            .read()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Remove an entry, returning whether it existed.
    pub fn remove(&self, key: &Value) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(k, _)| k != key);
        entries.len() != before
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn receiver<'a>(this: &'a Value, method: &str) -> Result<&'a MapObject, Thrown> {
        this.downcast_ref::<MapObject>()
            .ok_or_else(|| incompatible("Map", method))
    }
}

impl Object for MapObject {
    fn get(&self, key: &PropertyKey, receiver: &Value) -> CallResult {
        match key.as_str() {
            Some("size") => Ok(Value::from(Self::receiver(receiver, "size")?.len())),
            Some("get") => Ok(Value::function("get", |this, args| {
                Ok(Self::receiver(this, "get")?
                    .lookup(&arg(args, 0))
                    .unwrap_or_default())
            })),
            Some("set") => Ok(Value::function("set", |this, args| {
                Self::receiver(this, "set")?.insert(arg(args, 0), arg(args, 1));
                Ok(this.clone())
            })),
            Some("has") => Ok(Value::function("has", |this, args| {
                Ok(Value::Bool(
                    Self::receiver(this, "has")?.lookup(&arg(args, 0)).is_some(),
                ))
            })),
            Some("delete") => Ok(Value::function("delete", |this, args| {
                Ok(Value::Bool(Self::receiver(this, "delete")?.remove(&arg(args, 0))))
            })),
            _ => Ok(Value::Undefined),
        }
    }

    fn class(&self) -> ObjectClass {
        ObjectClass::Native(NativeKind::HashMap)
    }

    fn describe(&self) -> String {
        "[object Map]".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An error/exception object with a name and a message.
#[derive(Debug, Clone)]
pub struct ErrorObject {
    name: String,
    message: String,
}

impl ErrorObject {
    /// Create a new error object.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The error name, e.g. `TypeError`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Object for ErrorObject {
    fn get(&self, key: &PropertyKey, _receiver: &Value) -> CallResult {
        match key.as_str() {
            Some("name") => Ok(Value::from(self.name.as_str())),
            Some("message") => Ok(Value::from(self.message.as_str())),
            _ => Ok(Value::Undefined),
        }
    }

    fn get_own_property(&self, key: &PropertyKey) -> Result<Option<PropertyDescriptor>, Thrown> {
        Ok(matches!(key.as_str(), Some("message")).then(|| PropertyDescriptor {
            enumerable: false,
            ..PropertyDescriptor::data()
        }))
    }

    fn class(&self) -> ObjectClass {
        ObjectClass::Native(NativeKind::Error)
    }

    fn describe(&self) -> String {
        format!("{}: {}", self.name, self.message)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A built-in holding a primitive payload behind `valueOf`.
///
/// Used for dates, patterns, sets and weak collections.
pub struct NativeObject {
    kind: NativeKind,
    payload: Value,
}

impl NativeObject {
    /// Create a native object of the given kind.
    pub fn new(kind: NativeKind, payload: Value) -> Self {
        Self { kind, payload }
    }

    /// A date/time value holding milliseconds since the epoch.
    pub fn date(epoch_millis: f64) -> Self {
        Self::new(NativeKind::DateTime, Value::Number(epoch_millis))
    }

    /// A pattern matcher holding its source text.
    pub fn pattern(source: impl Into<String>) -> Self {
        Self::new(NativeKind::Pattern, Value::from(source.into()))
    }

    /// The native kind.
    pub fn kind(&self) -> NativeKind {
        self.kind
    }

    /// The internal payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }
}

impl Object for NativeObject {
    fn get(&self, key: &PropertyKey, _receiver: &Value) -> CallResult {
        let type_name = self.kind.type_name();
        match key.as_str() {
            Some("valueOf") => Ok(Value::function("valueOf", move |this, _| {
                this.downcast_ref::<NativeObject>()
                    .map(|native| native.payload.clone())
                    .ok_or_else(|| incompatible(type_name, "valueOf"))
            })),
            _ => Ok(Value::Undefined),
        }
    }

    fn class(&self) -> ObjectClass {
        ObjectClass::Native(self.kind)
    }

    fn describe(&self) -> String {
        format!("[object {}]", self.kind.type_name())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A raw binary buffer.
pub struct BufferObject {
    data: Bytes,
}

impl BufferObject {
    /// Create a buffer over the given bytes.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// The buffer contents.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }
}

impl Object for BufferObject {
    fn get(&self, key: &PropertyKey, _receiver: &Value) -> CallResult {
        match key.as_str() {
            Some("byteLength") => Ok(Value::from(self.data.len())),
            _ => Ok(Value::Undefined),
        }
    }

    fn class(&self) -> ObjectClass {
        ObjectClass::Native(NativeKind::Buffer)
    }

    fn describe(&self) -> String {
        "[object ArrayBuffer]".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A fixed-width binary array view (little-endian).
pub struct TypedArray {
    element: ElementType,
    data: Bytes,
}

impl TypedArray {
    /// Create a view of `element`-typed values over `data`.
    pub fn new(element: ElementType, data: impl Into<Bytes>) -> Self {
        Self {
            element,
            data: data.into(),
        }
    }

    /// Create an unsigned byte view.
    pub fn from_u8(data: Vec<u8>) -> Self {
        Self::new(ElementType::Uint8, data)
    }

    /// Create a 64-bit float view.
    pub fn from_f64(values: &[f64]) -> Self {
        let data: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(ElementType::Float64, data)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.data.len() / self.element.width()
    }

    /// Check if the view has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the element at `index`.
    pub fn element(&self, index: usize) -> Option<f64> {
        let width = self.element.width();
        let start = index.checked_mul(width)?;
        let end = start.checked_add(width)?;
        let raw = self.data.get(start..end)?;
        let value = match self.element {
            ElementType::Int8 => raw[0] as i8 as f64,
            ElementType::Uint8 => raw[0] as f64,
            ElementType::Int16 => i16::from_le_bytes([raw[0], raw[1]]) as f64,
            ElementType::Uint16 => u16::from_le_bytes([raw[0], raw[1]]) as f64,
            ElementType::Int32 => i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            ElementType::Uint32 => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            ElementType::Float32 => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f64,
            ElementType::Float64 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(raw);
                f64::from_le_bytes(bytes)
            }
        };
        Some(value)
    }
}

impl Object for TypedArray {
    fn get(&self, key: &PropertyKey, _receiver: &Value) -> CallResult {
        if key.as_str() == Some("length") {
            return Ok(Value::from(self.len()));
        }
        Ok(key
            .as_index()
            .and_then(|index| self.element(index))
            .map(Value::Number)
            .unwrap_or_default())
    }

    fn class(&self) -> ObjectClass {
        ObjectClass::BinaryView(self.element)
    }

    fn describe(&self) -> String {
        format!("[object {:?}Array]", self.element)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A generic byte viewer for arbitrary-layout reads.
pub struct ByteView {
    data: Bytes,
}

impl ByteView {
    /// Create a byte viewer over `data`.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }
}

impl Object for ByteView {
    fn get(&self, key: &PropertyKey, _receiver: &Value) -> CallResult {
        match key.as_str() {
            Some("byteLength") => Ok(Value::from(self.data.len())),
            Some("getUint8") => Ok(Value::function("getUint8", |this, args| {
                let view = this
                    .downcast_ref::<ByteView>()
                    .ok_or_else(|| incompatible("DataView", "getUint8"))?;
                let offset = arg(args, 0).as_number().unwrap_or(0.0) as usize;
                view.data
                    .get(offset)
                    .map(|b| Value::Number(*b as f64))
                    .ok_or_else(|| Thrown::new(Value::object(ErrorObject::new(
                        "RangeError",
                        "Offset is outside the bounds of the DataView",
                    ))))
            })),
            _ => Ok(Value::Undefined),
        }
    }

    fn class(&self) -> ObjectClass {
        ObjectClass::ByteView
    }

    fn describe(&self) -> String {
        "[object DataView]".to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_methods() {
        let map = Value::object(MapObject::new());

        map.call_method("set", &["k".into(), 1.into()]).unwrap();
        assert_eq!(map.call_method("get", &["k".into()]).unwrap(), Value::from(1));
        assert_eq!(map.call_method("has", &["k".into()]).unwrap(), Value::Bool(true));
        assert_eq!(map.get("size").unwrap(), Value::from(1));
        assert_eq!(map.call_method("delete", &["k".into()]).unwrap(), Value::Bool(true));
        assert_eq!(map.get("size").unwrap(), Value::from(0));
    }

    #[test]
    fn test_map_rejects_foreign_receiver() {
        let map = Value::object(MapObject::new());
        let get = map.get("get").unwrap();

        let err = get.call(&Value::Undefined, &["k".into()]).unwrap_err();
        assert_eq!(
            err.value().get("message").unwrap().as_str(),
            Some("Method Map.prototype.get called on incompatible receiver")
        );
    }

    #[test]
    fn test_error_object_describe() {
        let error = Value::object(ErrorObject::new("TypeError", "bad"));
        assert_eq!(error.to_string(), "TypeError: bad");
        assert_eq!(error.get("name").unwrap().as_str(), Some("TypeError"));
    }

    #[test]
    fn test_native_value_of() {
        let date = Value::object(NativeObject::date(1_700_000_000_000.0));
        assert_eq!(
            date.call_method("valueOf", &[]).unwrap(),
            Value::Number(1_700_000_000_000.0)
        );
    }

    #[test]
    fn test_typed_array_elements() {
        let view = Value::object(TypedArray::from_f64(&[1.5, -2.0]));

        assert_eq!(view.get("length").unwrap(), Value::from(2));
        assert_eq!(view.get(1usize).unwrap(), Value::Number(-2.0));
        assert!(view.get(2usize).unwrap().is_undefined());

        let ints = TypedArray::new(ElementType::Int16, vec![0xff, 0xff, 0x02, 0x00]);
        assert_eq!(ints.element(0), Some(-1.0));
        assert_eq!(ints.element(1), Some(2.0));
    }

    #[test]
    fn test_typed_array_huge_index_is_undefined() {
        let view = Value::object(TypedArray::from_f64(&[1.0]));

        assert!(view.get("2305843009213693951").unwrap().is_undefined());
        assert!(view.get("18446744073709551615").unwrap().is_undefined());
    }

    #[test]
    fn test_byte_view_bounds() {
        let view = Value::object(ByteView::new(vec![7u8]));

        assert_eq!(view.call_method("getUint8", &[0.into()]).unwrap(), Value::Number(7.0));
        assert!(view.call_method("getUint8", &[3.into()]).is_err());
    }
}
