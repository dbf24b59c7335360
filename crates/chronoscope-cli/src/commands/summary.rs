//! Summary command - Summarize timing lines from a log file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use chronoscope::chronoscope_timeline::{render_log_summary_markdown, summarize_log};

use crate::OutputFormat;

/// Arguments for the summary command.
#[derive(Args)]
pub struct SummaryArgs {
    /// Log file containing profiler output
    #[arg(required = true)]
    pub log: PathBuf,

    /// Only show failed calls
    #[arg(long)]
    pub failures: bool,
}

/// Execute the summary command.
pub fn execute(args: SummaryArgs, format: OutputFormat) -> Result<()> {
    let text = std::fs::read_to_string(&args.log)
        .with_context(|| format!("Failed to read {}", args.log.display()))?;

    let mut rows = summarize_log(&text);
    if args.failures {
        rows.retain(|row| row.failures > 0);
    }

    if rows.is_empty() {
        tracing::warn!(log = %args.log.display(), "No timing lines found");
    }

    match format {
        OutputFormat::Human => {
            print!("{}", render_log_summary_markdown(&rows));
            Ok(())
        }
        OutputFormat::Json | OutputFormat::JsonCompact => super::print_json(&rows, format),
    }
}
