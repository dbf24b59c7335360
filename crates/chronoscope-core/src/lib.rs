//! Chronoscope Core - dynamic value model
//!
//! This crate provides the object world that the Chronoscope profiler
//! instruments. It includes:
//!
//! - [`Value`]: tagged dynamic values with shared object and function handles
//! - [`Object`] and [`Callable`]: the reflective seams implementations plug into
//! - [`Deferred`]: promise-like results observable through continuations
//! - [`classify`]: predicates deciding what may be wrapped
//! - [`InstrumentConfig`]: session configuration
//!
//! # Quick Start
//!
//! ```ignore
//! use chronoscope_core::prelude::*;
//!
//! let service = PlainObject::new()
//!     .with("fetch", Value::function("fetch", |_, args| Ok(arg(args, 0))))
//!     .into_value();
//!
//! let result = service.call_method("fetch", &["id".into()])?;
//! assert_eq!(result.as_str(), Some("id"));
//! ```
//!
//! # Native Objects
//!
//! Built-ins such as maps, errors and deferred results keep internal state
//! that their methods read through `this`. They are listed in a
//! [`NativeAllowList`] so the profiler hands them back untouched.

pub mod builtins;
pub mod classify;
pub mod config;
pub mod deferred;
pub mod error;
pub mod function;
pub mod object;
pub mod value;

// Re-export main types at crate root
pub use builtins::{BufferObject, ByteView, ErrorObject, MapObject, NativeObject, TypedArray};
pub use classify::{
    ElementType, NativeAllowList, NativeKind, ObjectClass, ValueKind, classify, is_binary_view,
    is_callable, is_deferred, is_opaque_native, is_plain_object,
};
pub use config::{DEFAULT_ROOT_PATH, EvalMode, InstrumentConfig};
pub use deferred::{Deferred, Settlement};
pub use error::{ConfigError, ConfigResult};
pub use function::{Callable, NativeFunction, arg};
pub use object::{
    ArrayIterator, ArrayObject, MAX_ARRAY_INDEX, Object, PlainObject, PropertyDescriptor,
    collect_iter, iter_result,
};
pub use value::{CallResult, FunctionRef, ObjectRef, PropertyKey, Symbol, Thrown, Value};

/// Prelude module for convenient imports.
///
/// # Example
///
/// ```ignore
/// use chronoscope_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::builtins::{ErrorObject, MapObject};
    pub use crate::config::{EvalMode, InstrumentConfig};
    pub use crate::deferred::{Deferred, Settlement};
    pub use crate::function::{Callable, arg};
    pub use crate::object::{ArrayObject, Object, PlainObject};
    pub use crate::value::{CallResult, PropertyKey, Symbol, Thrown, Value};
}
