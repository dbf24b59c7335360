//! Chronoscope Proxy
//!
//! This crate provides the interception machinery of the Chronoscope call
//! profiler. It includes:
//!
//! - [`ProxyNode`]: transparent stand-in intercepting property reads
//! - [`TimedFunction`]: invocation wrapper recording one measurement per call
//! - [`WrapperCache`]: identity-keyed cache preventing stacked timers
//! - [`IteratorRegistry`]: per-step timing of iterator protocols
//! - [`InstrumentContext`]: state shared by every wrapper of a profiler
//!
//! # Interception
//!
//! Reading a member through a proxy node never records anything. Calling a
//! method read through it records one measurement named after the member's
//! dotted path. Plain objects returned from calls are proxied again under
//! the caller's path, so whole object graphs are covered.
//!
//! # Example
//!
//! ```ignore
//! use chronoscope_proxy::{InstrumentContext, instrument};
//!
//! let ctx = InstrumentContext::new(config, timeline, clock, events);
//! let sdk = instrument(&ctx, sdk, "library", EvalMode::Eager);
//!
//! sdk.get("users")?.call_method("list", &[])?;
//! // measurement "library.users.list" recorded
//! ```

pub mod cache;
pub mod context;
pub mod invoke;
pub mod iterator;
pub mod proxy;

// Re-export main types
pub use cache::{WrapperCache, identity};
pub use context::{CallTimer, InstrumentContext, TimerKind};
pub use invoke::{TimedFunction, call_timed, wrap_function};
pub use iterator::{InstrumentedIterator, IteratorRegistry};
pub use proxy::{ProxyNode, instrument, proxy_value};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::context::InstrumentContext;
    pub use crate::invoke::TimedFunction;
    pub use crate::proxy::{ProxyNode, instrument};
}
