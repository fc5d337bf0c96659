//! `polars` DataFrame of analyzed nights
//!
//! One row per night, the flat table charting and reporting code consumes.
use chrono::NaiveDate;
use polars::{
    frame::DataFrame,
    prelude::{Column, DataType, NamedFrom},
    series::Series,
};

use crate::{error::WobbleError, pipeline::AnalysisResult};

/// Nights as a DataFrame with columns `date`, `filename`, `flow_limitation`,
/// `periodicity_index`, `regularity_score`, `arousal_index`,
/// `composite_score`, `duration_minutes`, `cycle_period_secs`, `cycle_depth`,
/// `wave_period_secs`, `periodic_breathing_minutes` and
/// `periodic_breathing_percent`.
///
/// The cycle columns are null for nights without a dominant cycle.
#[derive(Debug, Clone)]
pub struct NightsDataFrame(pub(crate) DataFrame);

impl NightsDataFrame {
    pub fn from_results(results: &[AnalysisResult]) -> Result<Self, WobbleError> {
        // Date columns are days since the Unix epoch, which is NaiveDate's default
        let epoch = NaiveDate::default();
        let days: Vec<i32> = results
            .iter()
            .map(|r| (r.recording_date - epoch).num_days() as i32)
            .collect();
        let date = Series::new("date".into(), days).cast(&DataType::Date)?;

        let filenames: Vec<&str> = results.iter().map(|r| r.filename.as_str()).collect();
        let metric = |name: &str, f: fn(&AnalysisResult) -> f64| {
            Column::from(Series::new(name.into(), results.iter().map(f).collect::<Vec<_>>()))
        };
        let optional = |name: &str, f: fn(&AnalysisResult) -> Option<f64>| {
            Column::from(Series::new(name.into(), results.iter().map(f).collect::<Vec<_>>()))
        };

        let df = DataFrame::new(vec![
            Column::from(date),
            Column::from(Series::new("filename".into(), filenames)),
            metric("flow_limitation", |r| r.flow_limitation),
            metric("periodicity_index", |r| r.periodicity_index),
            metric("regularity_score", |r| r.regularity_score),
            metric("arousal_index", |r| r.arousal_index),
            metric("composite_score", AnalysisResult::composite_score),
            metric("duration_minutes", |r| r.duration_minutes),
            optional("cycle_period_secs", |r| r.cycle_period_secs),
            optional("cycle_depth", |r| r.cycle_depth),
            optional("wave_period_secs", |r| r.wave_period_secs),
            metric("periodic_breathing_minutes", |r| r.periodic_breathing_minutes),
            metric("periodic_breathing_percent", |r| r.periodic_breathing_percent),
        ])?;
        Ok(Self(df))
    }

    pub fn into_inner(self) -> DataFrame {
        self.0
    }
}

/// Shorthand for [`NightsDataFrame::from_results`] unwrapped to a plain DataFrame.
pub fn results_to_dataframe(results: &[AnalysisResult]) -> Result<DataFrame, WobbleError> {
    Ok(NightsDataFrame::from_results(results)?.into_inner())
}
