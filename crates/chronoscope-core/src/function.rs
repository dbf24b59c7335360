//! Callables.

use crate::value::{CallResult, Value};

/// Something that can be invoked with a receiver and arguments.
pub trait Callable: Send + Sync + 'static {
    /// Invoke the callable.
    fn call(&self, this: &Value, args: &[Value]) -> CallResult;

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        "anonymous"
    }
}

type NativeBody = dyn Fn(&Value, &[Value]) -> CallResult + Send + Sync;

/// A callable backed by a Rust closure.
pub struct NativeFunction {
    name: String,
    body: Box<NativeBody>,
}

impl NativeFunction {
    /// Create a new native function.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> CallResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            body: Box::new(body),
        }
    }
}

impl Callable for NativeFunction {
    fn call(&self, this: &Value, args: &[Value]) -> CallResult {
        (self.body)(this, args)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeFunction")
            .field("name", &self.name)
            .finish()
    }
}

/// Get the argument at `index`, or `undefined` when absent.
pub fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}
