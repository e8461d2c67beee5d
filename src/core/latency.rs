//! Per-session stage timing for diagnostics.
//!
//! Measurements are only logged and aggregated; nothing reads them to make a
//! decision, so a missing or late `end` never affects the call.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyStage {
    /// First final segment of a turn until the turn is complete
    SttToTurn,
    /// Turn complete until the response text is ready
    Engine,
    /// Synthesis requested until the first audio chunk is sent
    TtsFirstChunk,
    /// Synthesis requested until the last audio chunk is sent
    TtsTotal,
}

impl LatencyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            LatencyStage::SttToTurn => "stt_to_turn",
            LatencyStage::Engine => "engine",
            LatencyStage::TtsFirstChunk => "tts_first_chunk",
            LatencyStage::TtsTotal => "tts_total",
        }
    }

    /// Stages a caller waits through between finishing a sentence and hearing audio.
    fn on_response_path(&self) -> bool {
        !matches!(self, LatencyStage::TtsTotal)
    }
}

impl fmt::Display for LatencyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An open measurement returned by [`LatencyTracker::start`].
#[derive(Debug)]
#[must_use = "a latency handle records nothing until passed to `end`"]
pub struct LatencyHandle {
    stage: LatencyStage,
    started: Instant,
}

impl LatencyHandle {
    pub fn stage(&self) -> LatencyStage {
        self.stage
    }
}

#[derive(Debug, Clone)]
pub struct LatencyMeasurement {
    pub stage: LatencyStage,
    pub start: Instant,
    pub end: Instant,
    pub duration: Duration,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageSummary {
    pub avg_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub stages: BTreeMap<LatencyStage, StageSummary>,
    /// Sum of the average stage latencies on the response path
    pub total_pipeline_avg_ms: f64,
    pub session_duration_secs: f64,
}

pub struct LatencyTracker {
    session_id: String,
    created: Instant,
    measurements: Mutex<Vec<LatencyMeasurement>>,
}

impl LatencyTracker {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            created: Instant::now(),
            measurements: Mutex::new(Vec::new()),
        }
    }

    pub fn start(&self, stage: LatencyStage) -> LatencyHandle {
        Self::start_at(stage, Instant::now())
    }

    /// Open a measurement that began earlier, e.g. when a turn's first segment arrived.
    pub fn start_at(stage: LatencyStage, started: Instant) -> LatencyHandle {
        LatencyHandle { stage, started }
    }

    pub fn end(&self, handle: LatencyHandle) -> Duration {
        self.end_with(handle, None)
    }

    pub fn end_with(&self, handle: LatencyHandle, metadata: Option<String>) -> Duration {
        let end = Instant::now();
        let duration = end.saturating_duration_since(handle.started);
        let measurement = LatencyMeasurement {
            stage: handle.stage,
            start: handle.started,
            end,
            duration,
            metadata,
        };
        self.log_measurement(&measurement);
        self.measurements.lock().push(measurement);
        duration
    }

    fn log_measurement(&self, measurement: &LatencyMeasurement) {
        let ms = measurement.duration.as_secs_f64() * 1000.0;
        let stage = measurement.stage.as_str();
        let meta = measurement.metadata.as_deref().unwrap_or("");
        let session = self.session_id.as_str();
        if ms < 100.0 {
            debug!(session, stage, duration_ms = ms, meta, "Latency");
        } else if ms < 500.0 {
            info!(session, stage, duration_ms = ms, meta, "Latency");
        } else if ms < 1000.0 {
            warn!(session, stage, duration_ms = ms, meta, "Latency");
        } else {
            error!(session, stage, duration_ms = ms, meta, "Latency");
        }
    }

    pub fn measurements(&self) -> Vec<LatencyMeasurement> {
        self.measurements.lock().clone()
    }

    /// Per-stage aggregates. Returns `None` before anything was measured.
    pub fn summary(&self) -> Option<LatencySummary> {
        let measurements = self.measurements.lock();
        if measurements.is_empty() {
            return None;
        }

        let mut by_stage: BTreeMap<LatencyStage, Vec<f64>> = BTreeMap::new();
        for m in measurements.iter() {
            by_stage
                .entry(m.stage)
                .or_default()
                .push(m.duration.as_secs_f64() * 1000.0);
        }

        let mut total = 0.0;
        let stages = by_stage
            .into_iter()
            .map(|(stage, durations)| {
                let count = durations.len();
                let avg = durations.iter().sum::<f64>() / count as f64;
                let min = durations.iter().copied().fold(f64::INFINITY, f64::min);
                let max = durations.iter().copied().fold(0.0, f64::max);
                if stage.on_response_path() {
                    total += avg;
                }
                (
                    stage,
                    StageSummary {
                        avg_ms: round1(avg),
                        min_ms: round1(min),
                        max_ms: round1(max),
                        count,
                    },
                )
            })
            .collect();

        Some(LatencySummary {
            stages,
            total_pipeline_avg_ms: round1(total),
            session_duration_secs: round1(self.created.elapsed().as_secs_f64()),
        })
    }

    pub fn log_summary(&self) {
        let Some(summary) = self.summary() else {
            info!(session = %self.session_id, "No latency measurements recorded");
            return;
        };
        for (stage, stats) in &summary.stages {
            info!(
                session = %self.session_id,
                stage = stage.as_str(),
                avg_ms = stats.avg_ms,
                min_ms = stats.min_ms,
                max_ms = stats.max_ms,
                count = stats.count,
                "Latency summary"
            );
        }
        info!(
            session = %self.session_id,
            total_pipeline_avg_ms = summary.total_pipeline_avg_ms,
            session_duration_secs = summary.session_duration_secs,
            "Latency totals"
        );
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tracker_has_no_summary() {
        let tracker = LatencyTracker::new("call-1");
        assert!(tracker.summary().is_none());
        tracker.log_summary();
    }

    #[test]
    fn test_end_records_duration() {
        let tracker = LatencyTracker::new("call-1");
        let started = Instant::now() - Duration::from_millis(120);
        let handle = LatencyTracker::start_at(LatencyStage::Engine, started);
        assert_eq!(handle.stage(), LatencyStage::Engine);

        let duration = tracker.end_with(handle, Some("tools=0".to_string()));
        assert!(duration >= Duration::from_millis(120));

        let measurements = tracker.measurements();
        assert_eq!(measurements.len(), 1);
        assert_eq!(measurements[0].metadata.as_deref(), Some("tools=0"));
    }

    #[test]
    fn test_summary_aggregates_per_stage() {
        let tracker = LatencyTracker::new("call-1");
        let now = Instant::now();
        for ms in [100, 300] {
            tracker.end(LatencyTracker::start_at(
                LatencyStage::Engine,
                now - Duration::from_millis(ms),
            ));
        }
        tracker.end(LatencyTracker::start_at(
            LatencyStage::TtsTotal,
            now - Duration::from_millis(2000),
        ));

        let summary = tracker.summary().unwrap();
        let engine = &summary.stages[&LatencyStage::Engine];
        assert_eq!(engine.count, 2);
        assert!(engine.min_ms >= 100.0 && engine.min_ms < 300.0);
        assert!(engine.max_ms >= 300.0);
        assert!(engine.avg_ms >= 200.0);

        // Total synthesis time is not on the response path
        assert!(summary.total_pipeline_avg_ms < 1000.0);
        assert_eq!(summary.stages[&LatencyStage::TtsTotal].count, 1);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(LatencyStage::SttToTurn.to_string(), "stt_to_turn");
        assert_eq!(LatencyStage::TtsFirstChunk.as_str(), "tts_first_chunk");
    }
}
