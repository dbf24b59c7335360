//! Configuration types for the profiler.
//!
//! [`InstrumentConfig`] controls how values are wrapped and how timings are
//! recorded. It can be built in code or loaded from TOML:
//!
//! ```toml
//! root_path = "sdk"
//! eval_mode = "lazy"
//! natives = ["deferred", "hash_map", "error"]
//! trace_iterators = true
//! max_measurements = 50000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::classify::NativeAllowList;
use crate::error::{ConfigError, ConfigResult};

/// Path label used when no path is given for the root value.
pub const DEFAULT_ROOT_PATH: &str = "library";

/// When the duration of a completed call is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMode {
    /// Issue the measure request as soon as the call completes.
    #[default]
    Eager,
    /// Record the end mark at completion and resolve the measure request
    /// the next time measurements are read.
    Lazy,
}

/// Configuration for an instrumentation session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Path label of the root value.
    ///
    /// Defaults to `library`.
    pub root_path: String,

    /// When measure requests are issued.
    pub eval_mode: EvalMode,

    /// Built-in kinds that are never wrapped.
    pub natives: NativeAllowList,

    /// Whether iterator steps are timed.
    pub trace_iterators: bool,

    /// Maximum number of measurements retained by the timeline.
    ///
    /// Defaults to 100,000.
    pub max_measurements: usize,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            root_path: DEFAULT_ROOT_PATH.to_string(),
            eval_mode: EvalMode::Eager,
            natives: NativeAllowList::browser(),
            trace_iterators: true,
            max_measurements: 100_000,
        }
    }
}

impl InstrumentConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root path label.
    pub fn with_root_path(mut self, path: impl Into<String>) -> Self {
        self.root_path = path.into();
        self
    }

    /// Set the evaluation mode.
    pub fn with_eval_mode(mut self, mode: EvalMode) -> Self {
        self.eval_mode = mode;
        self
    }

    /// Set the native exclusion list.
    pub fn with_natives(mut self, natives: NativeAllowList) -> Self {
        self.natives = natives;
        self
    }

    /// Enable or disable iterator step timing.
    pub fn with_iterator_tracing(mut self, enabled: bool) -> Self {
        self.trace_iterators = enabled;
        self
    }

    /// Set the timeline capacity.
    pub fn with_max_measurements(mut self, max: usize) -> Self {
        self.max_measurements = max;
        self
    }

    /// Configuration matching the browser binding: every built-in kind is
    /// excluded and measures are issued eagerly.
    pub fn browser() -> Self {
        Self::default()
    }

    /// Configuration matching the platform binding: raw buffers are wrapped
    /// like plain objects and measures are resolved lazily.
    pub fn platform() -> Self {
        Self {
            eval_mode: EvalMode::Lazy,
            natives: NativeAllowList::platform(),
            ..Self::default()
        }
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        tracing::debug!(path = %path.display(), "Loading configuration");
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(
            root_path = %config.root_path,
            eval_mode = ?config.eval_mode,
            natives = config.natives.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.root_path.is_empty() {
            tracing::warn!("Rejecting configuration with an empty root_path");
            return Err(ConfigError::Invalid("root_path must not be empty".to_string()));
        }
        if self.max_measurements == 0 {
            return Err(ConfigError::Invalid(
                "max_measurements must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
