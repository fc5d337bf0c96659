//! Single recording analysis, from raw bytes to an [`AnalysisResult`].
use chrono::NaiveDate;
use log::debug;
use wobble_format::{EdfReader, FlowRecording};

use crate::{
    arousal::estimate_arousals,
    breath::segment_breaths,
    error::WobbleError,
    flow_limitation::flow_limitation_score,
    night::analyze_night,
    ventilation::minute_ventilation,
    waves::wave_metrics,
};

/// Shortest session worth analyzing when nothing else is configured.
pub const DEFAULT_MIN_DURATION_MINUTES: f64 = 30.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    /// Recordings shorter than this are rejected with [`WobbleError::TooShort`]
    pub min_duration_minutes: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_duration_minutes: DEFAULT_MIN_DURATION_MINUTES,
        }
    }
}

impl AnalysisConfig {
    pub fn with_min_duration(min_duration_minutes: f64) -> Self {
        Self {
            min_duration_minutes,
        }
    }
}

/// Scores for one night.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub recording_date: NaiveDate,
    pub filename: String,
    pub flow_limitation: f64,
    pub periodicity_index: f64,
    pub regularity_score: f64,
    /// Estimated arousals per hour
    pub arousal_index: f64,
    pub duration_minutes: f64,
    pub cycle_period_secs: Option<f64>,
    /// Mean drop of the breathing envelope over a cycle, in flow units
    pub cycle_depth: Option<f64>,
    /// Mean peak-to-peak length of the envelope cycles
    pub wave_period_secs: Option<f64>,
    pub periodic_breathing_minutes: f64,
    /// Share of the recording tagged as periodic breathing, 0 to 100
    pub periodic_breathing_percent: f64,
}

impl AnalysisResult {
    /// Mean of flow limitation, periodicity and regularity, averaged again
    /// with the arousal index.
    pub fn composite_score(&self) -> f64 {
        let breathing = self.flow_limitation + self.periodicity_index + self.regularity_score;
        (breathing / 3.0 + self.arousal_index) / 2.0
    }
}

/// Run every analysis stage over a decoded flow channel.
pub fn analyze_flow(
    filename: impl Into<String>,
    recording: &FlowRecording,
) -> Result<AnalysisResult, WobbleError> {
    let filename = filename.into();
    let flow = &recording.samples;
    let rate = recording.sampling_rate;

    let breaths = segment_breaths(flow, rate);
    let flow_limitation = flow_limitation_score(&breaths, flow);
    let arousal_index = estimate_arousals(&breaths, flow, rate, recording.duration_seconds());
    let night = analyze_night(&minute_ventilation(flow, rate))?;
    let waves = night
        .cycle_period_secs
        .and_then(|period| wave_metrics(flow, rate, period));

    debug!("Finished {filename}");
    Ok(AnalysisResult {
        recording_date: recording.recording_date,
        filename,
        flow_limitation,
        periodicity_index: night.periodicity_index,
        regularity_score: night.regularity_score,
        arousal_index,
        duration_minutes: recording.duration_minutes,
        cycle_period_secs: night.cycle_period_secs,
        cycle_depth: waves.as_ref().map(|w| w.cycle_depth),
        wave_period_secs: waves.as_ref().map(|w| w.wave_period_secs),
        periodic_breathing_minutes: waves.as_ref().map_or(0.0, |w| w.periodic_secs / 60.0),
        periodic_breathing_percent: waves.as_ref().map_or(0.0, |w| w.periodic_percent),
    })
}

/// Decode and analyze one recording buffer.
///
/// The duration check runs on the header alone, so short sessions are
/// rejected before any sample is decoded.
pub fn analyze_recording(
    filename: impl Into<String>,
    bytes: &[u8],
    config: &AnalysisConfig,
) -> Result<AnalysisResult, WobbleError> {
    let reader = EdfReader::from_bytes(bytes)?;
    let duration_minutes = reader.duration_minutes();
    if duration_minutes < config.min_duration_minutes {
        return Err(WobbleError::TooShort {
            duration_minutes,
            min_minutes: config.min_duration_minutes,
        });
    }
    let recording = reader.flow_recording()?;
    analyze_flow(filename, &recording)
}
