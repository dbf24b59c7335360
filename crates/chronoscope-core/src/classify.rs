//! Value classification.
//!
//! Decides which values the profiler may look inside. The predicates here
//! are pure and total: they never read properties and never fail.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Built-in runtime types that must never be proxied or wrapped.
///
/// Their methods rely on receiving the original object, so a forwarding
/// wrapper would break them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeKind {
    /// Deferred result (promise-like).
    Deferred,
    /// Hash map collection.
    HashMap,
    /// Hash set collection.
    HashSet,
    /// Weakly keyed map.
    WeakMap,
    /// Weakly keyed set.
    WeakSet,
    /// Date/time value.
    DateTime,
    /// Pattern matcher (regular expression).
    Pattern,
    /// Raw binary buffer.
    Buffer,
    /// Error/exception.
    Error,
}

impl NativeKind {
    /// All native kinds, in declaration order.
    pub const ALL: [NativeKind; 9] = [
        NativeKind::Deferred,
        NativeKind::HashMap,
        NativeKind::HashSet,
        NativeKind::WeakMap,
        NativeKind::WeakSet,
        NativeKind::DateTime,
        NativeKind::Pattern,
        NativeKind::Buffer,
        NativeKind::Error,
    ];

    /// Constructor-style name of the kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            NativeKind::Deferred => "Promise",
            NativeKind::HashMap => "Map",
            NativeKind::HashSet => "Set",
            NativeKind::WeakMap => "WeakMap",
            NativeKind::WeakSet => "WeakSet",
            NativeKind::DateTime => "Date",
            NativeKind::Pattern => "RegExp",
            NativeKind::Buffer => "ArrayBuffer",
            NativeKind::Error => "Error",
        }
    }
}

impl std::fmt::Display for NativeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Element type of a fixed-width binary view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Signed 8-bit integers.
    Int8,
    /// Unsigned 8-bit integers.
    Uint8,
    /// Signed 16-bit integers.
    Int16,
    /// Unsigned 16-bit integers.
    Uint16,
    /// Signed 32-bit integers.
    Int32,
    /// Unsigned 32-bit integers.
    Uint32,
    /// 32-bit floats.
    Float32,
    /// 64-bit floats.
    Float64,
}

impl ElementType {
    /// Width of one element in bytes.
    pub fn width(&self) -> usize {
        match self {
            ElementType::Int8 | ElementType::Uint8 => 1,
            ElementType::Int16 | ElementType::Uint16 => 2,
            ElementType::Int32 | ElementType::Uint32 | ElementType::Float32 => 4,
            ElementType::Float64 => 8,
        }
    }
}

/// Structural class of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectClass {
    /// Dictionaries and ordinary instances.
    Ordinary,
    /// Index-addressed sequences.
    Array,
    /// A built-in runtime type.
    Native(NativeKind),
    /// A fixed-width binary array view.
    BinaryView(ElementType),
    /// A generic byte viewer for arbitrary-layout access.
    ByteView,
}

/// The set of native kinds excluded from wrapping.
///
/// Two presets exist: [`NativeAllowList::browser`] excludes every kind,
/// [`NativeAllowList::platform`] lets raw buffers through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeAllowList {
    kinds: BTreeSet<NativeKind>,
}

impl NativeAllowList {
    /// An empty list; every object is eligible for wrapping.
    pub fn empty() -> Self {
        Self {
            kinds: BTreeSet::new(),
        }
    }

    /// The full list of built-in kinds.
    pub fn browser() -> Self {
        Self {
            kinds: NativeKind::ALL.into_iter().collect(),
        }
    }

    /// The full list minus raw binary buffers.
    pub fn platform() -> Self {
        Self::browser().without(NativeKind::Buffer)
    }

    /// Add a kind to the list.
    pub fn with(mut self, kind: NativeKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    /// Remove a kind from the list.
    pub fn without(mut self, kind: NativeKind) -> Self {
        self.kinds.remove(&kind);
        self
    }

    /// Check if a kind is excluded.
    pub fn contains(&self, kind: NativeKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Iterate over the excluded kinds.
    pub fn iter(&self) -> impl Iterator<Item = NativeKind> + '_ {
        self.kinds.iter().copied()
    }

    /// Number of excluded kinds.
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Check if nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

impl Default for NativeAllowList {
    fn default() -> Self {
        Self::browser()
    }
}

/// The tagged classification of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Not an object and not callable.
    Primitive,
    /// Can be invoked.
    Callable,
    /// A built-in on the exclusion list.
    OpaqueNative(NativeKind),
    /// A fixed-width binary array view.
    BinaryView(ElementType),
    /// Any other object.
    PlainObject,
}

impl ValueKind {
    /// Check if values of this kind get a proxy node.
    pub fn is_proxyable(&self) -> bool {
        matches!(self, ValueKind::PlainObject)
    }
}

/// Check if a value is a fixed-width binary view.
///
/// Generic byte viewers are not binary views.
pub fn is_binary_view(value: &Value) -> bool {
    matches!(value, Value::Object(o) if matches!(o.class(), ObjectClass::BinaryView(_)))
}

/// Check if a value is a non-callable object.
pub fn is_plain_object(value: &Value) -> bool {
    matches!(value, Value::Object(o) if !o.is_callable())
}

/// Check if a value can be invoked.
pub fn is_callable(value: &Value) -> bool {
    match value {
        Value::Function(_) => true,
        Value::Object(o) => o.is_callable(),
        _ => false,
    }
}

/// Check if a value is a built-in whose kind is on the exclusion list.
pub fn is_opaque_native(value: &Value, natives: &NativeAllowList) -> bool {
    native_kind(value).is_some_and(|kind| natives.contains(kind))
}

/// Check if a value is a deferred result.
pub fn is_deferred(value: &Value) -> bool {
    native_kind(value) == Some(NativeKind::Deferred)
}

/// Get the native kind of a value, whether or not it is excluded.
pub fn native_kind(value: &Value) -> Option<NativeKind> {
    match value {
        Value::Object(o) => match o.class() {
            ObjectClass::Native(kind) => Some(kind),
            _ => None,
        },
        _ => None,
    }
}

/// Classify a value into its tagged variant.
pub fn classify(value: &Value, natives: &NativeAllowList) -> ValueKind {
    match value {
        Value::Function(_) => ValueKind::Callable,
        Value::Object(o) if o.is_callable() => ValueKind::Callable,
        Value::Object(o) => match o.class() {
            ObjectClass::Native(kind) if natives.contains(kind) => ValueKind::OpaqueNative(kind),
            ObjectClass::BinaryView(element) => ValueKind::BinaryView(element),
            _ => ValueKind::PlainObject,
        },
        _ => ValueKind::Primitive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::{BufferObject, ByteView, ErrorObject, MapObject, NativeObject, TypedArray};
    use crate::deferred::Deferred;
    use crate::object::{ArrayObject, PlainObject};

    #[test]
    fn test_binary_view_excludes_byte_view() {
        let view = Value::object(TypedArray::from_u8(vec![1, 2, 3]));
        let bytes = Value::object(ByteView::new(vec![1, 2, 3]));

        assert!(is_binary_view(&view));
        assert!(!is_binary_view(&bytes));
        assert!(!is_binary_view(&Value::from(1)));
    }

    #[test]
    fn test_plain_object_predicate() {
        assert!(is_plain_object(&Value::object(PlainObject::new())));
        assert!(is_plain_object(&Value::object(ArrayObject::new())));
        assert!(!is_plain_object(&Value::Null));
        assert!(!is_plain_object(&Value::from("text")));
        assert!(!is_plain_object(&Value::function("f", |_, _| Ok(Value::Undefined))));
    }

    #[test]
    fn test_callable_predicate() {
        assert!(is_callable(&Value::function("f", |_, _| Ok(Value::Undefined))));
        assert!(!is_callable(&Value::object(PlainObject::new())));
        assert!(!is_callable(&Value::Undefined));
    }

    #[test]
    fn test_opaque_native_uses_list() {
        let natives = NativeAllowList::browser();
        let map = Value::object(MapObject::new());
        let deferred = Value::deferred(Deferred::pending());
        let error = Value::object(ErrorObject::new("Error", "boom"));
        let date = Value::object(NativeObject::date(0.0));

        assert!(is_opaque_native(&map, &natives));
        assert!(is_opaque_native(&deferred, &natives));
        assert!(is_opaque_native(&error, &natives));
        assert!(is_opaque_native(&date, &natives));
        assert!(!is_opaque_native(&Value::object(PlainObject::new()), &natives));
        assert!(!is_opaque_native(&map, &NativeAllowList::empty()));
    }

    #[test]
    fn test_platform_preset_omits_buffer() {
        let buffer = Value::object(BufferObject::new(vec![0u8; 4]));

        assert!(is_opaque_native(&buffer, &NativeAllowList::browser()));
        assert!(!is_opaque_native(&buffer, &NativeAllowList::platform()));
        assert_eq!(NativeAllowList::browser().len(), 9);
        assert_eq!(NativeAllowList::platform().len(), 8);
    }

    #[test]
    fn test_classify() {
        let natives = NativeAllowList::default();

        assert_eq!(classify(&Value::from(1), &natives), ValueKind::Primitive);
        assert_eq!(
            classify(&Value::function("f", |_, _| Ok(Value::Undefined)), &natives),
            ValueKind::Callable
        );
        assert_eq!(
            classify(&Value::object(MapObject::new()), &natives),
            ValueKind::OpaqueNative(NativeKind::HashMap)
        );
        assert_eq!(
            classify(&Value::object(TypedArray::from_u8(vec![1])), &natives),
            ValueKind::BinaryView(ElementType::Uint8)
        );
        assert!(classify(&Value::object(PlainObject::new()), &natives).is_proxyable());
    }

    #[test]
    fn test_allow_list_deserializes_snake_case() {
        #[derive(Deserialize)]
        struct Holder {
            natives: NativeAllowList,
        }

        let holder: Holder = toml::from_str(r#"natives = ["deferred", "hash_map"]"#).unwrap();
        assert!(holder.natives.contains(NativeKind::Deferred));
        assert!(holder.natives.contains(NativeKind::HashMap));
        assert_eq!(holder.natives.len(), 2);
    }
}
