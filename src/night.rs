//! Ventilatory control stability over a whole night.
//!
//! Works on the minute-ventilation series, one sample every
//! [`STEP_SECS`](crate::ventilation::STEP_SECS). Regularity comes from sample
//! entropy, periodicity from the share of spectral magnitude in the periodic
//! breathing band.
use log::debug;

use crate::{
    error::WobbleError,
    fft::{fft, zero_padded},
    ventilation::STEP_SECS,
};

/// Embedding dimension for sample entropy.
pub const EMBEDDING_DIM: usize = 2;
/// Tolerance as a fraction of the series' standard deviation.
pub const TOLERANCE_FACTOR: f64 = 0.2;
/// Sample entropy at which regularity bottoms out at 0.
const ENTROPY_CEILING: f64 = 2.5;

/// Periodic breathing band, in Hz.
pub const PERIODIC_BAND: (f64, f64) = (0.01, 0.03);
/// Cycle lengths searched for the dominant period, in seconds.
pub const CYCLE_PERIOD_RANGE: (f64, f64) = (30.0, 90.0);

#[derive(Debug, Clone, PartialEq)]
pub struct NightAnalysis {
    /// 0 to 100, higher is more repetitive
    pub regularity_score: f64,
    /// 0 to 100, higher is more power in the periodic band
    pub periodicity_index: f64,
    /// Strongest cycle length within [`CYCLE_PERIOD_RANGE`]
    pub cycle_period_secs: Option<f64>,
}

fn mean(data: &[f64]) -> f64 {
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation.
fn std_dev(data: &[f64]) -> f64 {
    let m = mean(data);
    (data.iter().map(|v| (v - m).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
}

/// Pairs of templates of `len` samples that stay within `r` of each other.
fn count_matches(data: &[f64], len: usize, r: f64) -> usize {
    let last = data.len().saturating_sub(len);
    let mut count = 0;
    for i in 0..last {
        for j in i + 1..last {
            if (0..len).all(|k| (data[i + k] - data[j + k]).abs() <= r) {
                count += 1;
            }
        }
    }
    count
}

/// Sample entropy `-ln(A / B)`.
///
/// `B` counts matching pairs of length `m`, `A` of length `m + 1`. When either
/// count is zero the entropy is defined as 0 rather than infinite or NaN.
pub fn sample_entropy(data: &[f64], m: usize, r: f64) -> f64 {
    let b = count_matches(data, m, r);
    let a = count_matches(data, m + 1, r);
    if a == 0 || b == 0 {
        return 0.0;
    }
    -(a as f64 / b as f64).ln()
}

/// Map sample entropy onto 0 to 100, where 0 entropy scores 100.
pub fn regularity_score(entropy: f64) -> f64 {
    (100.0 - entropy / ENTROPY_CEILING * 100.0).clamp(0.0, 100.0)
}

/// Spectral magnitudes of the positive half and the frequency of each bin.
fn magnitude_spectrum(detrended: &[f64]) -> Result<Vec<(f64, f64)>, WobbleError> {
    let padded = zero_padded(detrended);
    let n = padded.len();
    let spectrum = fft(&padded)?;
    Ok(spectrum[..n / 2]
        .iter()
        .enumerate()
        .map(|(i, c)| (i as f64 / (n as f64 * STEP_SECS), c.norm()))
        .collect())
}

/// Share of magnitude in [`PERIODIC_BAND`], scaled so that half the total
/// saturates at 100. A spectrum with no magnitude at all scores 0.
fn periodicity_index(spectrum: &[(f64, f64)]) -> f64 {
    let total: f64 = spectrum.iter().map(|(_, p)| p).sum();
    if total == 0.0 {
        return 0.0;
    }
    let (lo, hi) = PERIODIC_BAND;
    let band: f64 = spectrum
        .iter()
        .filter(|(f, _)| *f >= lo && *f <= hi)
        .map(|(_, p)| p)
        .sum();
    (band / total * 200.0).min(100.0)
}

/// Period of the strongest bin whose cycle falls within [`CYCLE_PERIOD_RANGE`].
fn cycle_period(spectrum: &[(f64, f64)]) -> Option<f64> {
    let (shortest, longest) = CYCLE_PERIOD_RANGE;
    let (lo, hi) = (1.0 / longest, 1.0 / shortest);
    let mut best: Option<(f64, f64)> = None;
    for &(f, p) in spectrum.iter().filter(|(f, _)| *f >= lo && *f <= hi) {
        if best.map_or(true, |(_, bp)| p > bp) {
            best = Some((f, p));
        }
    }
    best.filter(|(_, p)| *p > 0.0).map(|(f, _)| 1.0 / f)
}

/// Regularity, periodicity and dominant cycle of a minute-ventilation series.
pub fn analyze_night(minute_vent: &[f64]) -> Result<NightAnalysis, WobbleError> {
    if minute_vent.is_empty() {
        debug!("Empty ventilation series");
        return Ok(NightAnalysis {
            regularity_score: regularity_score(0.0),
            periodicity_index: 0.0,
            cycle_period_secs: None,
        });
    }

    let m = mean(minute_vent);
    let detrended: Vec<f64> = minute_vent.iter().map(|v| v - m).collect();

    let r = TOLERANCE_FACTOR * std_dev(minute_vent);
    let entropy = sample_entropy(&detrended, EMBEDDING_DIM, r);

    let spectrum = magnitude_spectrum(&detrended)?;
    let analysis = NightAnalysis {
        regularity_score: regularity_score(entropy),
        periodicity_index: periodicity_index(&spectrum),
        cycle_period_secs: cycle_period(&spectrum),
    };
    debug!("Sample entropy {entropy:.3}, {analysis:?}");
    Ok(analysis)
}

#[cfg(test)]
mod test {
    use std::f64::consts::PI;

    use pretty_assertions::assert_eq;
    use proptest::{
        prelude::*,
        test_runner::{RngAlgorithm, TestRng},
    };

    use super::*;

    /// Uniform values in [0, 1), the same on every run.
    fn noise(n: usize) -> Vec<f64> {
        let mut rng = TestRng::deterministic_rng(RngAlgorithm::ChaCha);
        (0..n).map(|_| rng.gen::<f64>()).collect()
    }

    #[test]
    fn test_sample_entropy_counts() {
        // templates of 2: (1,2) (2,1) (1,2), of 3: (1,2,1) (2,1,2)
        let data = [1.0, 2.0, 1.0, 2.0, 1.0];
        assert_eq!(count_matches(&data, 2, 0.1), 1);
        assert_eq!(count_matches(&data, 3, 0.1), 0);
        assert_eq!(sample_entropy(&data, 2, 0.1), 0.0);

        let data = [1.0, 2.0, 1.0, 2.0, 1.0, 2.0, 1.0];
        let (b, a) = (count_matches(&data, 2, 0.1), count_matches(&data, 3, 0.1));
        assert_eq!((b, a), (4, 2));
        assert_eq!(sample_entropy(&data, 2, 0.1), 2.0f64.ln());
    }

    #[test]
    fn test_regularity_bounds() {
        assert_eq!(regularity_score(0.0), 100.0);
        assert_eq!(regularity_score(1.25), 50.0);
        assert_eq!(regularity_score(2.5), 0.0);
        assert_eq!(regularity_score(4.0), 0.0);
    }

    #[test]
    fn test_empty_series() -> eyre::Result<()> {
        assert_eq!(
            analyze_night(&[])?,
            NightAnalysis {
                regularity_score: 100.0,
                periodicity_index: 0.0,
                cycle_period_secs: None,
            }
        );
        Ok(())
    }

    #[test]
    fn test_constant_series_has_no_periodicity() -> eyre::Result<()> {
        let analysis = analyze_night(&[6.0; 300])?;
        assert_eq!(analysis.periodicity_index, 0.0);
        assert_eq!(analysis.cycle_period_secs, None);
        Ok(())
    }

    #[test]
    fn test_periodic_breathing_is_detected() -> eyre::Result<()> {
        // 64 s cycles (0.0156 Hz) sampled every 5 s for ~85 minutes
        let series: Vec<f64> = (0..1024)
            .map(|i| 8.0 + 3.0 * (2.0 * PI * i as f64 * STEP_SECS / 64.0).sin())
            .collect();
        let analysis = analyze_night(&series)?;
        assert_eq!(analysis.periodicity_index, 100.0);
        assert!(analysis.regularity_score > 85.0, "{analysis:?}");
        let period = analysis.cycle_period_secs.unwrap();
        assert!((period - 64.0).abs() < 1e-9, "{period}");
        Ok(())
    }

    #[test]
    fn test_noise_is_not_periodic() -> eyre::Result<()> {
        let series: Vec<f64> = noise(1024).iter().map(|v| 8.0 + v).collect();
        let analysis = analyze_night(&series)?;
        // a flat spectrum puts about a fifth of its magnitude in the band
        assert!(analysis.periodicity_index < 50.0, "{analysis:?}");
        assert!(analysis.regularity_score < 30.0, "{analysis:?}");
        Ok(())
    }

    proptest! {
        #[test]
        fn proptest_scores_in_range(
            ref series in proptest::collection::vec(0.0f64..50.0, 0..150)
        ) {
            let analysis = analyze_night(series).unwrap();
            prop_assert!((0.0..=100.0).contains(&analysis.regularity_score));
            prop_assert!((0.0..=100.0).contains(&analysis.periodicity_index));
        }
    }
}
