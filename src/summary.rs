//! Grouping nights into periods split at comparison dates.
//!
//! A comparison date marks a change worth comparing across, such as a new
//! mask or pressure setting. Nights are grouped into the periods before,
//! between, and after those dates and each period is summarized separately.
use chrono::NaiveDate;
use itertools::Itertools;

use crate::pipeline::AnalysisResult;

/// Longest label kept for a comparison date, in characters.
pub const MAX_LABEL_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonDate {
    pub date: NaiveDate,
    pub label: Option<String>,
}

impl ComparisonDate {
    pub fn new(date: NaiveDate) -> Self {
        Self { date, label: None }
    }

    /// Attach a label, cut to [`MAX_LABEL_LEN`] characters.
    pub fn with_label(mut self, label: impl AsRef<str>) -> Self {
        self.label = Some(label.as_ref().chars().take(MAX_LABEL_LEN).collect());
        self
    }

    /// The label, or the date when there is none.
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.date.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSummary {
    /// Mean weighted by session duration
    pub weighted_mean: f64,
    /// Upper median
    pub median: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodSummary {
    /// Counted from 1 over the non-empty periods
    pub number: usize,
    pub label: String,
    /// Inclusive
    pub start: Option<NaiveDate>,
    /// Exclusive
    pub end: Option<NaiveDate>,
    pub sessions: usize,
    pub total_minutes: f64,
    pub flow_limitation: MetricSummary,
    pub periodicity_index: MetricSummary,
    pub regularity_score: MetricSummary,
    pub arousal_index: MetricSummary,
    pub composite_score: MetricSummary,
}

/// Plain means over every night.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverallMeans {
    pub flow_limitation: f64,
    pub periodicity_index: f64,
    pub regularity_score: f64,
    pub arousal_index: f64,
    pub composite_score: f64,
}

fn summarize(
    nights: &[&AnalysisResult],
    metric: impl Fn(&AnalysisResult) -> f64,
) -> MetricSummary {
    let total_minutes: f64 = nights.iter().map(|r| r.duration_minutes).sum();
    let weighted_mean = if total_minutes > 0.0 {
        nights
            .iter()
            .map(|&r| metric(r) * r.duration_minutes)
            .sum::<f64>()
            / total_minutes
    } else {
        nights.iter().map(|&r| metric(r)).sum::<f64>() / nights.len() as f64
    };
    let sorted: Vec<f64> = nights
        .iter()
        .map(|&r| metric(r))
        .sorted_by(f64::total_cmp)
        .collect();
    MetricSummary {
        weighted_mean,
        median: sorted[sorted.len() / 2],
    }
}

fn period(
    number: usize,
    label: String,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    nights: &[&AnalysisResult],
) -> PeriodSummary {
    PeriodSummary {
        number,
        label,
        start,
        end,
        sessions: nights.len(),
        total_minutes: nights.iter().map(|r| r.duration_minutes).sum(),
        flow_limitation: summarize(nights, |r| r.flow_limitation),
        periodicity_index: summarize(nights, |r| r.periodicity_index),
        regularity_score: summarize(nights, |r| r.regularity_score),
        arousal_index: summarize(nights, |r| r.arousal_index),
        composite_score: summarize(nights, AnalysisResult::composite_score),
    }
}

/// Summaries for every non-empty period.
///
/// With dates `d0 < d1 < .. < dn` the periods are `[.., d0)`, `[d0, d1)`, ..,
/// `[dn, ..)`. Without comparison dates every night lands in a single period.
pub fn period_summaries(
    results: &[AnalysisResult],
    comparisons: &[ComparisonDate],
) -> Vec<PeriodSummary> {
    let comparisons: Vec<&ComparisonDate> =
        comparisons.iter().sorted_by_key(|c| c.date).collect();

    let mut bounds: Vec<(String, Option<NaiveDate>, Option<NaiveDate>)> = Vec::new();
    match comparisons.first() {
        Some(first) => {
            let label = format!("Before {}", first.display_name());
            bounds.push((label, None, Some(first.date)));
        }
        None => bounds.push(("All nights".to_string(), None, None)),
    }
    for (from, to) in comparisons.iter().tuple_windows() {
        let label = format!("After {}", from.display_name());
        bounds.push((label, Some(from.date), Some(to.date)));
    }
    if let Some(last) = comparisons.last() {
        bounds.push((format!("After {}", last.display_name()), Some(last.date), None));
    }

    let mut summaries = Vec::new();
    for (label, start, end) in bounds {
        let nights: Vec<&AnalysisResult> = results
            .iter()
            .filter(|r| start.map_or(true, |s| r.recording_date >= s))
            .filter(|r| end.map_or(true, |e| r.recording_date < e))
            .collect();
        if nights.is_empty() {
            continue;
        }
        summaries.push(period(summaries.len() + 1, label, start, end, &nights));
    }
    summaries
}

/// Unweighted means over all nights, `None` when there are none.
pub fn overall_means(results: &[AnalysisResult]) -> Option<OverallMeans> {
    if results.is_empty() {
        return None;
    }
    let n = results.len() as f64;
    let mean = |metric: fn(&AnalysisResult) -> f64| results.iter().map(metric).sum::<f64>() / n;
    Some(OverallMeans {
        flow_limitation: mean(|r| r.flow_limitation),
        periodicity_index: mean(|r| r.periodicity_index),
        regularity_score: mean(|r| r.regularity_score),
        arousal_index: mean(|r| r.arousal_index),
        composite_score: mean(AnalysisResult::composite_score),
    })
}
