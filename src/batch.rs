//! Running the pipeline over many recordings at once.
//!
//! Each recording is analyzed independently, so a failure in one never stops
//! the others. With the `parallel` feature the recordings are spread over the
//! `rayon` thread pool.
use log::{info, warn};
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    error::WobbleError,
    pipeline::{analyze_recording, AnalysisConfig, AnalysisResult},
};

/// Everything a batch produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Successful nights, oldest first
    pub results: Vec<AnalysisResult>,
    /// Recordings below the minimum duration
    pub skipped: usize,
    /// Filename and error message of every other failure
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    /// Number of recordings the batch looked at.
    pub fn total(&self) -> usize {
        self.results.len() + self.skipped + self.failed.len()
    }
}

fn analyze_one(
    name: &str,
    bytes: &[u8],
    config: &AnalysisConfig,
) -> Result<AnalysisResult, WobbleError> {
    let outcome = analyze_recording(name, bytes, config);
    match &outcome {
        Ok(result) => info!("Analyzed {name} ({:.0} minutes)", result.duration_minutes),
        Err(WobbleError::TooShort { duration_minutes, .. }) => {
            warn!("Skipping {name}, only {duration_minutes:.1} minutes")
        }
        Err(e) => warn!("Failed to analyze {name}: {e}"),
    }
    outcome
}

/// Analyze every `(filename, bytes)` pair and collect the outcomes.
///
/// Results are sorted by recording date; nights on the same date keep their
/// input order.
pub fn analyze_batch<B>(inputs: &[(String, B)], config: &AnalysisConfig) -> BatchReport
where
    B: AsRef<[u8]> + Sync,
{
    #[cfg(feature = "parallel")]
    let iter = inputs.par_iter();
    #[cfg(not(feature = "parallel"))]
    let iter = inputs.iter();

    let outcomes: Vec<_> = iter
        .map(|(name, bytes)| (name, analyze_one(name, bytes.as_ref(), config)))
        .collect();

    let mut report = BatchReport::default();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(result) => report.results.push(result),
            Err(WobbleError::TooShort { .. }) => report.skipped += 1,
            Err(e) => report.failed.push((name.clone(), e.to_string())),
        }
    }
    report.results.sort_by_key(|r| r.recording_date);
    info!(
        "Batch done: {} analyzed, {} skipped, {} failed",
        report.results.len(),
        report.skipped,
        report.failed.len()
    );
    report
}

/// Date-ordered collection of nights owned by the caller.
///
/// Results can be added one at a time as they come in or a whole batch at
/// once; either way the log stays sorted by recording date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NightLog {
    results: Vec<AnalysisResult>,
}

impl NightLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after any night with the same or an earlier date.
    pub fn insert(&mut self, result: AnalysisResult) {
        let index = self
            .results
            .partition_point(|r| r.recording_date <= result.recording_date);
        self.results.insert(index, result);
    }

    pub fn results(&self) -> &[AnalysisResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_inner(self) -> Vec<AnalysisResult> {
        self.results
    }
}

impl Extend<AnalysisResult> for NightLog {
    fn extend<T: IntoIterator<Item = AnalysisResult>>(&mut self, iter: T) {
        for result in iter {
            self.insert(result);
        }
    }
}

impl Extend<BatchReport> for NightLog {
    fn extend<T: IntoIterator<Item = BatchReport>>(&mut self, iter: T) {
        for report in iter {
            self.extend(report.results);
        }
    }
}
