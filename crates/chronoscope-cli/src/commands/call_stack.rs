//! Call-stack command - Reconstruct call nesting from measurements.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use chronoscope::chronoscope_timeline::{call_stack, load_measurements_from, render_call_stack_csv};

use crate::OutputFormat;

/// Arguments for the call-stack command.
#[derive(Args)]
pub struct CallStackArgs {
    /// Measurements JSON file
    #[arg(required = true)]
    pub input: PathBuf,

    /// Write CSV to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Execute the call-stack command.
pub fn execute(args: CallStackArgs, format: OutputFormat) -> Result<()> {
    let measurements = load_measurements_from(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    let entries = call_stack(&measurements);

    let depth = entries.iter().map(|e| e.depth).max().unwrap_or(0);
    tracing::debug!(entries = entries.len(), max_depth = depth, "Built call stack");

    match (format, &args.output) {
        (OutputFormat::Human, _) | (_, Some(_)) => {
            super::emit_text(&render_call_stack_csv(&entries), args.output.as_deref())
        }
        (OutputFormat::Json | OutputFormat::JsonCompact, None) => {
            super::print_json(&entries, format)
        }
    }
}
