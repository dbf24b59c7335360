//! Transparent proxy nodes.
//!
//! A [`ProxyNode`] stands in for an object. Property reads are intercepted:
//! callable members come back as timed functions, nested objects as further
//! proxy nodes, iterator factories hand out instrumented iterators, and
//! everything else is forwarded raw. Writes are forwarded to the target.

use std::any::Any;
use std::sync::Arc;

use chronoscope_core::{
    CallResult, EvalMode, Object, ObjectClass, PropertyDescriptor, PropertyKey, Symbol, Thrown,
    Value, is_binary_view, is_callable, is_opaque_native, is_plain_object,
};
use chronoscope_timeline::InstrumentEvent;

use crate::context::InstrumentContext;
use crate::invoke::{BoundMember, call_timed, ensure_callable, wrap_function};

/// Transparent stand-in for an object.
///
/// Nodes are not cached: two reads of the same path produce distinct but
/// equivalent nodes over the same target.
pub struct ProxyNode {
    ctx: Arc<InstrumentContext>,
    target: Value,
    path: Arc<str>,
    mode: EvalMode,
}

impl ProxyNode {
    /// The proxied object.
    pub fn target(&self) -> &Value {
        &self.target
    }

    /// Path of the proxied object.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn target_object(&self) -> Option<&Arc<dyn Object>> {
        self.target.as_object()
    }

    fn child_path(&self, key: &PropertyKey) -> String {
        format!("{}.{}", self.path, key)
    }

    /// Intercept a read of an iteration protocol member.
    ///
    /// The factory always runs against the target. With iterator tracing
    /// off the iterator it returns is handed out as is.
    fn iteration_member(&self, key: &PropertyKey, symbol: &Symbol) -> CallResult {
        let factory = self.target.get(key.clone())?;
        if !is_callable(&factory) {
            return self.wrap_read(key, factory);
        }

        let target = self.target.clone();
        if !self.ctx.config().trace_iterators {
            return Ok(Value::function(symbol.to_string(), move |_, args| {
                factory.call(&target, args)
            }));
        }

        let ctx = Arc::clone(&self.ctx);
        let step_name = format!("{}.{}.next", self.path, symbol);
        let mode = self.mode;
        Ok(Value::function(symbol.to_string(), move |_, args| {
            let iterator = factory.call(&target, args)?;
            let next = iterator.get("next")?;
            if !is_callable(&next) {
                return Ok(iterator);
            }
            Ok(ctx.iterators().instrument(&ctx, iterator, &step_name, mode))
        }))
    }

    /// Forward a read, wrapping callables and nested objects.
    fn forward(&self, key: &PropertyKey, receiver: &Value) -> CallResult {
        let Some(target) = self.target_object() else {
            return Ok(Value::Undefined);
        };
        let value = target.get(key, receiver)?;
        self.wrap_read(key, value)
    }

    /// Wrap a value already read from the target under `key`.
    fn wrap_read(&self, key: &PropertyKey, value: Value) -> CallResult {
        // Locked properties must read back exactly what the target holds.
        if self
            .get_own_property(key)?
            .is_some_and(|descriptor| descriptor.is_locked())
        {
            return Ok(value);
        }

        if is_binary_view(&value) || key.is_symbol(&Symbol::Iterator) {
            return Ok(value);
        }

        if is_callable(&value) {
            let path = self.child_path(key);
            return Ok(Value::Function(Arc::new(BoundMember {
                ctx: Arc::clone(&self.ctx),
                original: value,
                path: path.into(),
                mode: self.mode,
            })));
        }

        if is_plain_object(&value) && !is_opaque_native(&value, self.ctx.natives()) {
            let path = self.child_path(key);
            return Ok(proxy_value(&self.ctx, value, &path, self.mode));
        }

        Ok(value)
    }
}

impl Object for ProxyNode {
    fn get(&self, key: &PropertyKey, receiver: &Value) -> CallResult {
        if let PropertyKey::Symbol(symbol) = key {
            if symbol.is_iteration() {
                return self.iteration_member(key, symbol);
            }
        }
        self.forward(key, receiver)
    }

    fn get_own_property(&self, key: &PropertyKey) -> Result<Option<PropertyDescriptor>, Thrown> {
        match self.target_object() {
            Some(target) => target.get_own_property(key),
            None => Ok(None),
        }
    }

    fn set(&self, key: PropertyKey, value: Value) -> Result<bool, Thrown> {
        self.target.set(key, value)
    }

    fn keys(&self) -> Vec<PropertyKey> {
        self.target_object().map(|o| o.keys()).unwrap_or_default()
    }

    fn class(&self) -> ObjectClass {
        self.target_object()
            .map(|o| o.class())
            .unwrap_or(ObjectClass::Ordinary)
    }

    fn is_callable(&self) -> bool {
        is_callable(&self.target)
    }

    fn invoke(&self, this: &Value, args: &[Value]) -> CallResult {
        ensure_callable(&self.target, &self.path)?;
        call_timed(&self.ctx, &self.target, &self.path, self.mode, this, args)
    }

    fn describe(&self) -> String {
        self.target.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for ProxyNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyNode")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .finish()
    }
}

/// Build a proxy node for `value`, unless it is excluded.
///
/// Opaque natives, binary views and non-objects are returned unchanged.
pub fn proxy_value(ctx: &Arc<InstrumentContext>, value: Value, path: &str, mode: EvalMode) -> Value {
    if !matches!(value, Value::Object(_))
        || is_opaque_native(&value, ctx.natives())
        || is_binary_view(&value)
    {
        return value;
    }

    tracing::debug!(path = %path, "Creating proxy");
    ctx.events().emit(InstrumentEvent::ProxyCreated {
        path: path.to_string(),
    });
    Value::object(ProxyNode {
        ctx: Arc::clone(ctx),
        target: value,
        path: path.into(),
        mode,
    })
}

/// Instrument a root value.
///
/// Callables are wrapped for timing directly, objects get a proxy node and
/// primitives are returned unchanged.
pub fn instrument(ctx: &Arc<InstrumentContext>, value: Value, path: &str, mode: EvalMode) -> Value {
    if is_callable(&value) && !is_opaque_native(&value, ctx.natives()) {
        return Value::Function(wrap_function(ctx, &value, path, mode));
    }
    proxy_value(ctx, value, path, mode)
}
