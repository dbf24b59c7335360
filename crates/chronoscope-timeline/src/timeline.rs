//! Mark/measure timeline.
//!
//! A timeline records named timestamps (marks) and named durations between
//! two marks (measurements). The profiler only ever writes to it; readers
//! take snapshots.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::clock::SharedClock;
use crate::error::{TimelineError, TimelineResult};

/// One recorded duration.
///
/// Times serialize as fractional milliseconds since the clock origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    /// Measurement name, the dotted path of the measured member.
    pub name: String,
    /// When the measured interval started.
    #[serde(with = "millis")]
    pub start_time: Duration,
    /// When the measured interval ended.
    #[serde(with = "millis")]
    pub end_time: Duration,
    /// Length of the interval.
    #[serde(with = "millis")]
    pub duration: Duration,
}

impl Measurement {
    /// Create a measurement spanning `start..end`.
    pub fn new(name: impl Into<String>, start_time: Duration, end_time: Duration) -> Self {
        Self {
            name: name.into(),
            start_time,
            end_time,
            duration: end_time.saturating_sub(start_time),
        }
    }

    /// Duration in fractional milliseconds.
    pub fn duration_ms(&self) -> f64 {
        as_millis_f64(self.duration)
    }
}

/// A duration in fractional milliseconds.
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_nanos() as f64 / 1_000_000.0
}

/// A duration from fractional milliseconds, rounded to the nanosecond.
///
/// Returns `None` for negative, infinite or NaN input.
pub fn from_millis_f64(ms: f64) -> Option<Duration> {
    if !ms.is_finite() || ms < 0.0 {
        return None;
    }
    let nanos = (ms * 1_000_000.0).round();
    if nanos > u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(nanos as u64))
}

/// A named timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mark {
    /// Mark name.
    pub name: String,
    /// When the mark was recorded.
    pub time: Duration,
}

/// A store for marks and measurements.
pub trait Timeline: Send + Sync {
    /// Record a mark at the current time.
    fn mark(&self, name: &str) -> TimelineResult<()>;

    /// Record a measurement between two previously recorded marks.
    fn measure(&self, name: &str, start_mark: &str, end_mark: &str) -> TimelineResult<Measurement>;

    /// Snapshot of all recorded measurements, in recording order.
    fn measurements(&self) -> Vec<Measurement>;

    /// Remove and return all recorded measurements.
    fn drain(&self) -> Vec<Measurement>;

    /// Remove all marks and measurements.
    fn clear(&self);
}

/// In-memory timeline.
///
/// Marks are consumed by the measure that pairs them, so the marks left
/// over belong to intervals that have not finished. Measurements are kept
/// up to a fixed capacity.
pub struct MemoryTimeline {
    clock: SharedClock,
    marks: RwLock<HashMap<String, Duration>>,
    measurements: RwLock<Vec<Measurement>>,
    capacity: usize,
}

impl MemoryTimeline {
    /// Default number of retained measurements.
    pub const DEFAULT_CAPACITY: usize = 100_000;

    /// Create a timeline reading time from `clock`.
    pub fn new(clock: SharedClock) -> Self {
        Self::with_capacity(clock, Self::DEFAULT_CAPACITY)
    }

    /// Create a timeline retaining at most `capacity` measurements.
    pub fn with_capacity(clock: SharedClock, capacity: usize) -> Self {
        Self {
            clock,
            marks: RwLock::new(HashMap::new()),
            measurements: RwLock::new(Vec::new()),
            capacity,
        }
    }

    /// The clock backing this timeline.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Marks that have not yet been paired by a measure, oldest first.
    pub fn pending_marks(&self) -> Vec<Mark> {
        let mut marks: Vec<Mark> = self
            .marks
            .read()
            .iter()
            .map(|(name, time)| Mark {
                name: name.clone(),
                time: *time,
            })
            .collect();
        marks.sort_by(|a, b| a.time.cmp(&b.time).then_with(|| a.name.cmp(&b.name)));
        marks
    }

    /// Measurements recorded under `name`.
    pub fn entries_by_name(&self, name: &str) -> Vec<Measurement> {
        self.measurements
            .read()
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    /// Number of recorded measurements.
    pub fn len(&self) -> usize {
        self.measurements.read().len()
    }

    /// Check if no measurements are recorded.
    pub fn is_empty(&self) -> bool {
        self.measurements.read().is_empty()
    }
}

impl Timeline for MemoryTimeline {
    fn mark(&self, name: &str) -> TimelineResult<()> {
        let now = self.clock.now();
        self.marks.write().insert(name.to_string(), now);
        Ok(())
    }

    fn measure(&self, name: &str, start_mark: &str, end_mark: &str) -> TimelineResult<Measurement> {
        let (start, end) = {
            let mut marks = self.marks.write();
            let start = *marks
                .get(start_mark)
                .ok_or_else(|| TimelineError::UnknownMark(start_mark.to_string()))?;
            let end = *marks
                .get(end_mark)
                .ok_or_else(|| TimelineError::UnknownMark(end_mark.to_string()))?;
            marks.remove(start_mark);
            marks.remove(end_mark);
            (start, end)
        };

        let measurement = Measurement::new(name, start, end);
        let mut measurements = self.measurements.write();
        if measurements.len() >= self.capacity {
            return Err(TimelineError::CapacityExceeded {
                capacity: self.capacity,
            });
        }
        measurements.push(measurement.clone());
        Ok(measurement)
    }

    fn measurements(&self) -> Vec<Measurement> {
        self.measurements.read().clone()
    }

    fn drain(&self) -> Vec<Measurement> {
        std::mem::take(&mut *self.measurements.write())
    }

    fn clear(&self) {
        self.marks.write().clear();
        self.measurements.write().clear();
    }
}

impl std::fmt::Debug for MemoryTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTimeline")
            .field("marks", &self.marks.read().len())
            .field("measurements", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Serde for `Duration` as fractional milliseconds.
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::as_millis_f64(*duration).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = f64::deserialize(deserializer)?;
        super::from_millis_f64(ms)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid millisecond value {}", ms)))
    }
}
