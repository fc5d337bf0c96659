//! Coarse minute-ventilation series from sliding windows over the flow.
use log::debug;

/// Length of each ventilation window.
pub const WINDOW_SECS: f64 = 60.0;
/// Spacing between consecutive windows, and so between series samples.
pub const STEP_SECS: f64 = 5.0;

/// Minute ventilation estimate for one window.
///
/// Counts inhalation onsets and integrates the positive flow of each
/// inhalation, then scales tidal volume by breath count per minute.
fn window_ventilation(window: &[f64], sampling_rate: f64) -> f64 {
    let mut tidal_volume = 0.0;
    let mut breath_count = 0usize;
    let mut inhaling = false;

    for j in 1..window.len() {
        let (prev, cur) = (window[j - 1], window[j]);
        if cur > 0.0 && prev <= 0.0 {
            breath_count += 1;
            inhaling = true;
        }
        if inhaling && cur > 0.0 {
            tidal_volume += cur.abs() / sampling_rate;
        }
        if cur <= 0.0 {
            inhaling = false;
        }
    }
    tidal_volume * breath_count as f64 / 60.0
}

/// One ventilation value per [`STEP_SECS`], each over a [`WINDOW_SECS`] window.
///
/// Windows start while a full window still fits with samples to spare, so a
/// recording no longer than one window yields an empty series.
pub fn minute_ventilation(flow: &[f64], sampling_rate: f64) -> Vec<f64> {
    let window = (WINDOW_SECS * sampling_rate).floor() as usize;
    let step = (STEP_SECS * sampling_rate).floor() as usize;
    if window == 0 || step == 0 || flow.len() <= window {
        debug!("Flow too short for a ventilation window");
        return Vec::new();
    }

    let series: Vec<f64> = (0..flow.len() - window)
        .step_by(step)
        .map(|start| window_ventilation(&flow[start..start + window], sampling_rate))
        .collect();
    debug!("Built {} minute ventilation samples", series.len());
    series
}
