//! Estimated arousal index from surges in breathing rate or volume.
//!
//! Each breath is compared against a rolling baseline of roughly the previous
//! two minutes. A breath that is markedly faster or deeper than its baseline
//! counts as an event unless another event was flagged shortly before.
use itertools::Itertools;
use log::debug;

use crate::breath::Breath;

/// Fewer breaths (or surviving breath metrics) than this give an index of 0.
pub const MIN_BREATHS: usize = 10;
/// Breath intervals longer than this are treated as artifacts.
pub const MAX_BREATH_INTERVAL_SECS: f64 = 20.0;
/// Length of the look-back baseline.
pub const BASELINE_WINDOW_SECS: f64 = 120.0;
/// Breaths needed in the baseline before a breath is scored.
pub const MIN_BASELINE_BREATHS: usize = 5;
/// Relative rate increase above baseline that flags an event.
pub const RATE_THRESHOLD: f64 = 0.20;
/// Relative volume increase above baseline that flags an event.
pub const VOLUME_THRESHOLD: f64 = 0.30;
/// Minimum spacing between two flagged events.
pub const REFRACTORY_SECS: f64 = 15.0;

/// Rate and volume of a breath, measured against its predecessor.
#[derive(Debug, Clone, PartialEq)]
pub struct BreathMetric {
    /// Breath onset in seconds
    pub time: f64,
    /// Breaths per minute
    pub rate: f64,
    /// Integrated absolute inspiratory flow
    pub volume: f64,
}

/// Metrics for every breath after the first whose interval is plausible.
pub fn breath_metrics(breaths: &[Breath], flow: &[f64], sampling_rate: f64) -> Vec<BreathMetric> {
    breaths
        .iter()
        .tuple_windows()
        .filter_map(|(prev, breath)| {
            let interval = breath.start_time - prev.start_time;
            if interval <= 0.0 || interval > MAX_BREATH_INTERVAL_SECS {
                return None;
            }
            let volume = breath
                .inspiration(flow)
                .iter()
                .map(|f| f.abs())
                .sum::<f64>()
                / sampling_rate;
            Some(BreathMetric {
                time: breath.start_time,
                rate: 60.0 / interval,
                volume,
            })
        })
        .collect()
}

/// Onset times of flagged events.
pub fn arousal_events(metrics: &[BreathMetric]) -> Vec<f64> {
    let mut events: Vec<f64> = Vec::new();

    for (i, current) in metrics.iter().enumerate() {
        let lookback = (BASELINE_WINDOW_SECS / (60.0 / current.rate)).floor() as usize;
        let baseline = &metrics[i.saturating_sub(lookback)..i];
        if baseline.len() < MIN_BASELINE_BREATHS {
            continue;
        }

        let n = baseline.len() as f64;
        let baseline_rate = baseline.iter().map(|m| m.rate).sum::<f64>() / n;
        let baseline_volume = baseline.iter().map(|m| m.volume).sum::<f64>() / n;
        let rate_increase = (current.rate - baseline_rate) / baseline_rate;
        let volume_increase = (current.volume - baseline_volume) / baseline_volume;

        if rate_increase > RATE_THRESHOLD || volume_increase > VOLUME_THRESHOLD {
            let refractory = events
                .last()
                .is_some_and(|last| current.time - last < REFRACTORY_SECS);
            if !refractory {
                events.push(current.time);
            }
        }
    }
    events
}

/// Events per hour over the whole recording.
pub fn estimate_arousals(
    breaths: &[Breath],
    flow: &[f64],
    sampling_rate: f64,
    duration_secs: f64,
) -> f64 {
    if breaths.len() < MIN_BREATHS {
        debug!("Only {} breaths, skipping arousal estimate", breaths.len());
        return 0.0;
    }
    let metrics = breath_metrics(breaths, flow, sampling_rate);
    if metrics.len() < MIN_BREATHS {
        debug!("Only {} usable breath intervals", metrics.len());
        return 0.0;
    }

    let events = arousal_events(&metrics);
    let hours = duration_secs / 3600.0;
    debug!("{} arousal events over {hours:.2} hours", events.len());
    if hours > 0.0 {
        events.len() as f64 / hours
    } else {
        0.0
    }
}
