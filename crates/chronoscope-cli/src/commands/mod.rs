//! CLI subcommands.

pub mod aggregate;
pub mod call_stack;
pub mod sample;
pub mod summary;

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::OutputFormat;

/// Write `text` to `output`, or print it when no file is given.
pub(crate) fn emit_text(text: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Report written");
        }
        None => print!("{}", text),
    }
    Ok(())
}

/// Print `value` as JSON in the requested layout.
pub(crate) fn print_json<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    let json = if matches!(format, OutputFormat::JsonCompact) {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{}", json);
    Ok(())
}
