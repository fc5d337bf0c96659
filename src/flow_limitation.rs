//! Flow-limitation score from the flatness of inspiratory plateaus.
use log::debug;

use crate::breath::Breath;

/// Breaths with fewer inspiratory samples are ignored.
pub const MIN_INSPIRATION_SAMPLES: usize = 10;
/// Breaths whose inspiratory peak stays below this are treated as noise.
pub const MIN_PEAK_FLOW: f64 = 0.1;
/// Variance of the normalized top half at which flatness reaches zero.
const VARIANCE_CEILING: f64 = 0.05;

/// Flatness of one inspiration, 0 to 100.
///
/// The inspiration is normalized by its peak and the variance of the span
/// from the first to the last sample above half the peak is compared with
/// [`VARIANCE_CEILING`]. Returns `None` for breaths that do not qualify.
pub fn breath_flatness(inspiration: &[f64]) -> Option<f64> {
    if inspiration.len() < MIN_INSPIRATION_SAMPLES {
        return None;
    }
    let peak = inspiration.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if peak < MIN_PEAK_FLOW {
        return None;
    }
    let normalized: Vec<f64> = inspiration.iter().map(|f| f / peak).collect();

    let first = normalized.iter().position(|&f| f > 0.5)?;
    let last = normalized.iter().rposition(|&f| f > 0.5)?;
    let top_half = &normalized[first..=last];

    let n = top_half.len() as f64;
    let mean = top_half.iter().sum::<f64>() / n;
    let variance = top_half.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;

    Some(((VARIANCE_CEILING - variance) / VARIANCE_CEILING * 100.0).clamp(0.0, 100.0))
}

/// Mean flatness over all qualifying breaths, 0 when none qualify.
pub fn flow_limitation_score(breaths: &[Breath], flow: &[f64]) -> f64 {
    let scores: Vec<f64> = breaths
        .iter()
        .filter_map(|b| breath_flatness(b.inspiration(flow)))
        .collect();
    debug!(
        "{} of {} breaths qualify for flow limitation",
        scores.len(),
        breaths.len()
    );
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f64>() / scores.len() as f64
}
