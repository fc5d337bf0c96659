//! Waxing and waning of the breathing envelope.
//!
//! The envelope is a rolling mean of absolute flow. Its peaks and troughs give
//! the depth and length of each periodic breathing cycle, and runs of cycles
//! that match the night's dominant period are tagged as periodic breathing.
use log::debug;

/// Width of the centered rolling mean over absolute flow.
pub const ENVELOPE_WINDOW_SECS: f64 = 30.0;
/// Closest two envelope peaks (or troughs) may be.
pub const MIN_PEAK_DISTANCE_SECS: f64 = 5.0;
/// Smallest envelope prominence counted as a peak, in flow units.
pub const MIN_PROMINENCE: f64 = 0.01;
/// Peak-to-peak intervals within this fraction of the dominant period count
/// towards the mean wave period.
pub const WAVE_PERIOD_TOLERANCE: f64 = 0.5;
/// Cycle lengths within this fraction of the dominant period are periodic.
pub const PERIODIC_PERIOD_TOLERANCE: f64 = 0.8;
/// Smallest cycle amplitude, as a fraction of the mean envelope.
pub const PERIODIC_AMPLITUDE_FRACTION: f64 = 0.001;
/// Consecutive matching cycles needed to tag a segment.
pub const MIN_PERIODIC_CYCLES: usize = 2;

/// Centered rolling mean of `|flow|` over [`ENVELOPE_WINDOW_SECS`].
///
/// Near either end the window is cut short and the mean taken over the
/// samples it still covers.
pub fn envelope(flow: &[f64], sampling_rate: f64) -> Vec<f64> {
    let n = flow.len();
    let window = ((ENVELOPE_WINDOW_SECS * sampling_rate) as usize).clamp(1, n.max(1));
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    for v in flow {
        prefix.push(prefix[prefix.len() - 1] + v.abs());
    }
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(window / 2);
            let hi = (i + (window - 1) - window / 2).min(n - 1);
            (prefix[hi + 1] - prefix[lo]) / (hi + 1 - lo) as f64
        })
        .collect()
}

/// Strict local maxima, taking the middle of flat tops. Endpoints never count.
fn local_maxima(x: &[f64]) -> Vec<usize> {
    let mut peaks = Vec::new();
    let mut i = 1;
    while i + 1 < x.len() {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead + 1 < x.len() && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Height of a peak above the higher of its two bases.
///
/// Each base is the lowest point reached walking away from the peak before
/// meeting a strictly higher sample or the end of the signal.
fn prominence(x: &[f64], peak: usize) -> f64 {
    let height = x[peak];
    let left = x[..peak]
        .iter()
        .rev()
        .take_while(|&&v| v <= height)
        .fold(height, |low, &v| low.min(v));
    let right = x[peak + 1..]
        .iter()
        .take_while(|&&v| v <= height)
        .fold(height, |low, &v| low.min(v));
    height - left.max(right)
}

/// Peaks at least `distance` samples apart and at least `min_prominence` high.
///
/// Where two peaks are too close the higher one wins.
pub fn find_peaks(x: &[f64], distance: usize, min_prominence: f64) -> Vec<usize> {
    let peaks = local_maxima(x);
    let mut keep = vec![true; peaks.len()];
    let mut by_height: Vec<usize> = (0..peaks.len()).collect();
    by_height.sort_by(|&a, &b| x[peaks[a]].total_cmp(&x[peaks[b]]));

    for &k in by_height.iter().rev() {
        if !keep[k] {
            continue;
        }
        for j in (0..k).rev() {
            if peaks[k] - peaks[j] >= distance {
                break;
            }
            keep[j] = false;
        }
        for j in k + 1..peaks.len() {
            if peaks[j] - peaks[k] >= distance {
                break;
            }
            keep[j] = false;
        }
    }

    peaks
        .into_iter()
        .zip(keep)
        .filter(|&(p, kept)| kept && prominence(x, p) >= min_prominence)
        .map(|(p, _)| p)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct WaveMetrics {
    /// Mean peak to trough drop of the envelope, in flow units
    pub cycle_depth: f64,
    /// Mean peak-to-peak interval near the dominant period, in seconds
    pub wave_period_secs: f64,
    /// Total length of tagged periodic segments, in seconds
    pub periodic_secs: f64,
    /// Periodic time as a share of the recording, 0 to 100
    pub periodic_percent: f64,
}

/// Envelope with its peaks and troughs.
struct Extrema {
    envelope: Vec<f64>,
    peaks: Vec<usize>,
    troughs: Vec<usize>,
}

impl Extrema {
    fn new(flow: &[f64], sampling_rate: f64) -> Self {
        let envelope = envelope(flow, sampling_rate);
        let distance = ((MIN_PEAK_DISTANCE_SECS * sampling_rate) as usize).max(1);
        let inverted: Vec<f64> = envelope.iter().map(|v| -v).collect();
        Self {
            peaks: find_peaks(&envelope, distance, MIN_PROMINENCE),
            troughs: find_peaks(&inverted, distance, MIN_PROMINENCE),
            envelope,
        }
    }

    /// Mean depth of each peak against its neighbouring troughs.
    ///
    /// Pairs further apart than 1.5 dominant periods are ignored. With no pair
    /// left the full range of the envelope stands in.
    fn cycle_depth(&self, sampling_rate: f64, dominant_secs: f64) -> f64 {
        let env = &self.envelope;
        let close = |a: usize, b: usize| {
            (b - a) as f64 / sampling_rate < dominant_secs * (1.0 + WAVE_PERIOD_TOLERANCE)
        };
        let mut depths = Vec::new();
        for &peak in &self.peaks {
            let after = self.troughs.partition_point(|&t| t <= peak);
            if let Some(&trough) = self.troughs.get(after) {
                if close(peak, trough) && env[peak] > env[trough] {
                    depths.push(env[peak] - env[trough]);
                }
            }
            let before = self.troughs.partition_point(|&t| t < peak);
            if let Some(&trough) = before.checked_sub(1).and_then(|i| self.troughs.get(i)) {
                if close(trough, peak) && env[peak] > env[trough] {
                    depths.push(env[peak] - env[trough]);
                }
            }
        }
        if depths.is_empty() {
            let max = env.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = env.iter().copied().fold(f64::INFINITY, f64::min);
            return max - min;
        }
        depths.iter().sum::<f64>() / depths.len() as f64
    }

    /// Mean peak-to-peak interval near `dominant_secs`, or the dominant
    /// period itself when none qualifies.
    fn wave_period(&self, sampling_rate: f64, dominant_secs: f64) -> f64 {
        let (lo, hi) = (
            dominant_secs * (1.0 - WAVE_PERIOD_TOLERANCE),
            dominant_secs * (1.0 + WAVE_PERIOD_TOLERANCE),
        );
        let intervals: Vec<f64> = self
            .peaks
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64 / sampling_rate)
            .filter(|p| (lo..=hi).contains(p))
            .collect();
        if intervals.is_empty() {
            return dominant_secs;
        }
        intervals.iter().sum::<f64>() / intervals.len() as f64
    }

    /// Start and end peak of every run of periodic cycles.
    ///
    /// A cycle runs from one peak to the next. It matches when its length is
    /// within [`PERIODIC_PERIOD_TOLERANCE`] of the dominant period and the
    /// envelope drops by at least [`PERIODIC_AMPLITUDE_FRACTION`] of its mean
    /// somewhere in between.
    fn periodic_segments(&self, sampling_rate: f64, dominant_secs: f64) -> Vec<(usize, usize)> {
        let env = &self.envelope;
        let mean = env.iter().sum::<f64>() / env.len() as f64;
        let min_amplitude = mean * PERIODIC_AMPLITUDE_FRACTION;
        let (lo, hi) = (
            dominant_secs * (1.0 - PERIODIC_PERIOD_TOLERANCE),
            dominant_secs * (1.0 + PERIODIC_PERIOD_TOLERANCE),
        );

        let mut segments = Vec::new();
        let mut run: Option<(usize, usize)> = None;
        for pair in self.peaks.windows(2) {
            let (start, end) = (pair[0], pair[1]);
            let period = (end - start) as f64 / sampling_rate;
            let lowest = self
                .troughs
                .iter()
                .filter(|&&t| t > start && t < end)
                .map(|&t| env[t])
                .min_by(f64::total_cmp);
            let deep_enough = lowest.is_some_and(|low| env[start] - low >= min_amplitude);

            if (lo..=hi).contains(&period) && deep_enough {
                let (first, cycles) = run.unwrap_or((start, 0));
                run = Some((first, cycles + 1));
            } else if let Some((first, cycles)) = run.take() {
                if cycles >= MIN_PERIODIC_CYCLES {
                    segments.push((first, start));
                }
            }
        }
        if let (Some((first, cycles)), Some(&last)) = (run, self.peaks.last()) {
            if cycles >= MIN_PERIODIC_CYCLES {
                segments.push((first, last));
            }
        }
        segments
    }
}

/// Depth, length and extent of periodic breathing cycles, given the night's
/// dominant cycle length.
///
/// Returns `None` for an empty flow or a dominant period that is not a
/// positive number of seconds.
pub fn wave_metrics(flow: &[f64], sampling_rate: f64, dominant_secs: f64) -> Option<WaveMetrics> {
    let valid_period = dominant_secs.is_finite() && dominant_secs > 0.0;
    if flow.is_empty() || sampling_rate <= 0.0 || !valid_period {
        debug!("No wave metrics without flow or a dominant period");
        return None;
    }
    let extrema = Extrema::new(flow, sampling_rate);
    debug!(
        "Envelope has {} peaks and {} troughs",
        extrema.peaks.len(),
        extrema.troughs.len()
    );

    let (cycle_depth, wave_period_secs) =
        if extrema.peaks.is_empty() || extrema.troughs.is_empty() {
            (0.0, dominant_secs)
        } else {
            (
                extrema.cycle_depth(sampling_rate, dominant_secs),
                extrema.wave_period(sampling_rate, dominant_secs),
            )
        };

    let segments = extrema.periodic_segments(sampling_rate, dominant_secs);
    let periodic_secs: f64 = segments
        .iter()
        .map(|(start, end)| (end - start) as f64 / sampling_rate)
        .sum();
    let total_secs = flow.len() as f64 / sampling_rate;
    let metrics = WaveMetrics {
        cycle_depth,
        wave_period_secs,
        periodic_secs,
        periodic_percent: periodic_secs / total_secs * 100.0,
    };
    debug!("{} periodic segments, {metrics:?}", segments.len());
    Some(metrics)
}
