//! Profiling reports.
//!
//! Offline analysis over exported measurements and log output: per-name
//! aggregation, call-stack reconstruction and log summaries, with CSV and
//! markdown renderers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ReportError, ReportResult};
use crate::timeline::{Measurement, as_millis_f64, from_millis_f64};

/// Unique identifier for a profiling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Measurement as found in exported JSON.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportedMeasurement {
    name: String,
    start_time: f64,
    duration: f64,
    #[serde(default)]
    end_time: Option<f64>,
}

fn to_duration(name: &str, ms: f64) -> ReportResult<Duration> {
    from_millis_f64(ms).ok_or_else(|| ReportError::InvalidTime {
        name: name.to_string(),
        value: ms,
    })
}

/// Parse exported measurements.
///
/// `undefined` literals are read as `null`, and a missing `endTime` is
/// derived from `startTime + duration`.
pub fn load_measurements(text: &str) -> ReportResult<Vec<Measurement>> {
    let text = text.replace("undefined", "null");
    let exported: Vec<ExportedMeasurement> = serde_json::from_str(&text)?;

    exported
        .into_iter()
        .map(|m| {
            let start_time = to_duration(&m.name, m.start_time)?;
            let duration = to_duration(&m.name, m.duration)?;
            let end_time = match m.end_time {
                Some(end) => to_duration(&m.name, end)?,
                None => start_time + duration,
            };
            Ok(Measurement {
                name: m.name,
                start_time,
                end_time,
                duration,
            })
        })
        .collect()
}

/// Read and parse an exported measurement file.
pub fn load_measurements_from(path: &Path) -> ReportResult<Vec<Measurement>> {
    let text = std::fs::read_to_string(path)?;
    load_measurements(&text)
}

/// Serialize measurements in the export format.
pub fn export_measurements(measurements: &[Measurement]) -> ReportResult<String> {
    Ok(serde_json::to_string_pretty(measurements)?)
}

/// Call count and total time for one measurement name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// Measurement name.
    pub name: String,
    /// Number of measurements.
    pub count: usize,
    /// Sum of durations.
    #[serde(with = "crate::timeline::millis")]
    pub total_duration: Duration,
}

/// Aggregate measurements by name, largest total duration first.
///
/// Names with equal totals keep the order they first appeared in.
pub fn aggregate(measurements: &[Measurement]) -> Vec<AggregateRow> {
    let mut rows: Vec<AggregateRow> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for m in measurements {
        match index.get(m.name.as_str()) {
            Some(&i) => {
                rows[i].count += 1;
                rows[i].total_duration += m.duration;
            }
            None => {
                index.insert(m.name.as_str(), rows.len());
                rows.push(AggregateRow {
                    name: m.name.clone(),
                    count: 1,
                    total_duration: m.duration,
                });
            }
        }
    }

    rows.sort_by(|a, b| b.total_duration.cmp(&a.total_duration));
    rows
}

/// A measurement placed in the reconstructed call stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackEntry {
    /// Measurement name.
    pub name: String,
    /// Nesting depth, 1 for outermost calls.
    pub depth: usize,
    /// Duration of the call.
    #[serde(with = "crate::timeline::millis")]
    pub duration: Duration,
    /// Start time of the call.
    #[serde(with = "crate::timeline::millis")]
    pub start_time: Duration,
}

impl StackEntry {
    /// Name indented four spaces per nesting level.
    pub fn indented_name(&self) -> String {
        format!("{}{}", "    ".repeat(self.depth.saturating_sub(1)), self.name)
    }
}

/// Reconstruct call nesting from measurement intervals.
///
/// Measurements are ordered by start time; a call is nested inside every
/// earlier call that has not ended before it starts.
pub fn call_stack(measurements: &[Measurement]) -> Vec<StackEntry> {
    let mut sorted: Vec<&Measurement> = measurements.iter().collect();
    sorted.sort_by_key(|m| m.start_time);

    let mut stack: Vec<Duration> = Vec::new();
    let mut entries = Vec::with_capacity(sorted.len());

    for m in sorted {
        while stack.last().is_some_and(|end| *end < m.start_time) {
            stack.pop();
        }
        stack.push(m.start_time + m.duration);
        entries.push(StackEntry {
            name: m.name.clone(),
            depth: stack.len(),
            duration: m.duration,
            start_time: m.start_time,
        });
    }

    entries
}

static LOG_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(Function|Async function|Iterator) ([\w\.@]+) (took|failed after) ([\d\.]+) ms(?: with error: (.*))?",
    )
    .ok()
});

/// Call count and total time for one name in a log summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSummaryRow {
    /// Function or method name.
    pub name: String,
    /// Number of logged calls.
    pub calls: usize,
    /// Total logged time in milliseconds.
    pub total_ms: f64,
    /// Number of logged calls that failed.
    pub failures: usize,
}

/// Summarize timing lines found in log output.
///
/// Rows are in order of first appearance. Lines that do not match the
/// timing format are ignored.
pub fn summarize_log(text: &str) -> Vec<LogSummaryRow> {
    let mut rows: Vec<LogSummaryRow> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    let Some(pattern) = LOG_LINE.as_ref() else {
        return rows;
    };

    for caps in pattern.captures_iter(text) {
        let name = &caps[2];
        let Ok(ms) = caps[4].parse::<f64>() else {
            tracing::debug!(value = &caps[4], "Skipping unparsable log duration");
            continue;
        };
        let failed = &caps[3] == "failed after";

        let i = *index.entry(name.to_string()).or_insert_with(|| {
            rows.push(LogSummaryRow {
                name: name.to_string(),
                calls: 0,
                total_ms: 0.0,
                failures: 0,
            });
            rows.len() - 1
        });
        rows[i].calls += 1;
        rows[i].total_ms += ms;
        if failed {
            rows[i].failures += 1;
        }
    }

    rows
}

/// Escape a CSV field.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn ms(duration: Duration) -> f64 {
    as_millis_f64(duration)
}

/// Render aggregate rows as CSV (`name,count,total_duration`).
pub fn render_aggregate_csv(rows: &[AggregateRow]) -> String {
    let mut output = String::from("name,count,total_duration\n");
    for row in rows {
        output.push_str(&format!(
            "{},{},{}\n",
            escape_field(&row.name),
            row.count,
            ms(row.total_duration)
        ));
    }
    output
}

/// Render a call stack as CSV (`name,duration,startTime`) with indented names.
pub fn render_call_stack_csv(entries: &[StackEntry]) -> String {
    let mut output = String::from("name,duration,startTime\n");
    for entry in entries {
        output.push_str(&format!(
            "{},{},{}\n",
            escape_field(&entry.indented_name()),
            ms(entry.duration),
            ms(entry.start_time)
        ));
    }
    output
}

/// Render a log summary as a markdown table.
pub fn render_log_summary_markdown(rows: &[LogSummaryRow]) -> String {
    let mut output = String::new();
    output.push_str("| Function/Method | Total Calls | Total Execution Time (ms) |\n");
    output.push_str("| --- | --- | --- |\n");
    for row in rows {
        output.push_str(&format!(
            "| {} | {} | {:.2} |\n",
            row.name, row.calls, row.total_ms
        ));
    }
    output
}

/// Complete report of a profiling session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileReport {
    /// Unique session ID.
    pub session_id: SessionId,
    /// Path label of the root value.
    pub root_path: String,
    /// All measurements, in recording order.
    pub measurements: Vec<Measurement>,
    /// Per-name aggregation.
    pub aggregate: Vec<AggregateRow>,
    /// Calls started but not yet measured.
    pub in_flight: usize,
}

impl ProfileReport {
    /// Build a report from a measurement snapshot.
    pub fn new(root_path: impl Into<String>, measurements: Vec<Measurement>) -> Self {
        let aggregate = aggregate(&measurements);
        Self {
            session_id: SessionId::new(),
            root_path: root_path.into(),
            measurements,
            aggregate,
            in_flight: 0,
        }
    }

    /// Set the number of calls still outstanding.
    pub fn with_in_flight(mut self, in_flight: usize) -> Self {
        self.in_flight = in_flight;
        self
    }

    /// Total time across all measurements.
    pub fn total_duration(&self) -> Duration {
        self.measurements.iter().map(|m| m.duration).sum()
    }

    /// Format as human-readable text.
    pub fn to_text(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Profile Report: {}\n", self.session_id));
        output.push_str(&format!("Root: {}\n", self.root_path));
        output.push_str(&format!("Measurements: {}\n", self.measurements.len()));
        output.push_str(&format!(
            "Total Time: {:.2} ms\n",
            ms(self.total_duration())
        ));
        if self.in_flight > 0 {
            output.push_str(&format!("In Flight: {}\n", self.in_flight));
        }

        if !self.aggregate.is_empty() {
            output.push_str("\nBy Name:\n");
            for row in &self.aggregate {
                output.push_str(&format!(
                    "  {:<40} {:>6} calls {:>10.2} ms\n",
                    row.name,
                    row.count,
                    ms(row.total_duration)
                ));
            }
        }

        output
    }

    /// Format as JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Format as pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(name: &str, start: u64, duration: u64) -> Measurement {
        Measurement::new(
            name,
            Duration::from_millis(start),
            Duration::from_millis(start + duration),
        )
    }

    #[test]
    fn test_session_id() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_load_measurements_tolerates_undefined() {
        let text = r#"[
            {"name": "library.a", "startTime": 1.5, "duration": 2, "endTime": undefined},
            {"name": "library.b", "startTime": 4, "duration": 1, "endTime": 5}
        ]"#;

        let measurements = load_measurements(text).unwrap();
        assert_eq!(measurements.len(), 2);
        assert_eq!(measurements[0].end_time, Duration::from_micros(3500));
        assert_eq!(measurements[1].end_time, Duration::from_millis(5));
    }

    #[test]
    fn test_load_measurements_rejects_negative() {
        let text = r#"[{"name": "x", "startTime": -1, "duration": 2}]"#;
        assert!(matches!(
            load_measurements(text),
            Err(ReportError::InvalidTime { .. })
        ));
        assert!(matches!(load_measurements("{"), Err(ReportError::Json(_))));
    }

    #[test]
    fn test_export_load_preserves_names() {
        let original = vec![m("library.a", 0, 3), m("library.b", 1, 1)];
        let loaded = load_measurements(&export_measurements(&original).unwrap()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_aggregate_sorted_by_total() {
        let rows = aggregate(&[
            m("a", 0, 1),
            m("b", 0, 5),
            m("a", 2, 1),
            m("c", 3, 2),
            m("a", 4, 1),
        ]);

        let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(rows[1].count, 3);
        assert_eq!(rows[1].total_duration, Duration::from_millis(3));
    }

    #[test]
    fn test_call_stack_depths() {
        let entries = call_stack(&[
            m("root.c", 20, 2),
            m("root.a", 0, 10),
            m("root.a.b", 2, 3),
            m("root.a.b.x", 3, 1),
        ]);

        let depths: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.depth)).collect();
        assert_eq!(
            depths,
            vec![("root.a", 1), ("root.a.b", 2), ("root.a.b.x", 3), ("root.c", 1)]
        );
        assert_eq!(entries[2].indented_name(), "        root.a.b.x");
    }

    #[test]
    fn test_summarize_log() {
        let log = "\
Function library.fetch took 1.50 ms.
noise line
Async function library.load failed after 2.25 ms with error: Error: boom
Function library.fetch took 0.50 ms.
Iterator library.items.@@iterator.next took 0.10 ms.
";
        let rows = summarize_log(log);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "library.fetch");
        assert_eq!(rows[0].calls, 2);
        assert!((rows[0].total_ms - 2.0).abs() < 1e-9);
        assert_eq!(rows[1].failures, 1);
        assert_eq!(rows[2].name, "library.items.@@iterator.next");
    }

    #[test]
    fn test_render_markdown() {
        let rows = summarize_log("Function a.b took 1 ms.\nFunction a.b took 2.333 ms.\n");
        let table = render_log_summary_markdown(&rows);
        assert!(table.starts_with("| Function/Method | Total Calls | Total Execution Time (ms) |"));
        assert!(table.contains("| a.b | 2 | 3.33 |"));
    }

    #[test]
    fn test_render_csv_escapes() {
        let csv = render_aggregate_csv(&aggregate(&[m("a,b", 0, 2)]));
        assert_eq!(csv, "name,count,total_duration\n\"a,b\",1,2\n");

        let csv = render_call_stack_csv(&call_stack(&[m("x", 0, 4), m("y", 1, 1)]));
        assert_eq!(csv, "name,duration,startTime\nx,4,0\n    y,1,1\n");
    }

    #[test]
    fn test_profile_report() {
        let report = ProfileReport::new("library", vec![m("library.a", 0, 2), m("library.a", 3, 1)])
            .with_in_flight(1);

        assert_eq!(report.total_duration(), Duration::from_millis(3));
        let text = report.to_text();
        assert!(text.contains("Root: library"));
        assert!(text.contains("In Flight: 1"));
        assert_eq!(report.to_json()["aggregate"][0]["count"], 2);
    }
}
