//! Aggregate command - Total time per measurement name.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use chronoscope::chronoscope_timeline::{aggregate, load_measurements_from, render_aggregate_csv};

use crate::OutputFormat;

/// Arguments for the aggregate command.
#[derive(Args)]
pub struct AggregateArgs {
    /// Measurements JSON file
    #[arg(required = true)]
    pub input: PathBuf,

    /// Write CSV to this file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Execute the aggregate command.
pub fn execute(args: AggregateArgs, format: OutputFormat) -> Result<()> {
    let measurements = load_measurements_from(&args.input)
        .with_context(|| format!("Failed to load {}", args.input.display()))?;
    let rows = aggregate(&measurements);

    tracing::debug!(
        measurements = measurements.len(),
        names = rows.len(),
        "Aggregated measurements"
    );

    match (format, &args.output) {
        (OutputFormat::Human, _) | (_, Some(_)) => {
            super::emit_text(&render_aggregate_csv(&rows), args.output.as_deref())
        }
        (OutputFormat::Json | OutputFormat::JsonCompact, None) => super::print_json(&rows, format),
    }
}
