//! Night-by-night analysis of CPAP flow waveforms.
//!
//! Each recording is decoded with [`wobble_format`], split into breaths, and
//! scored for flow limitation, estimated arousals, breathing regularity and
//! periodic breathing. The breathing envelope gives the depth and length of
//! each waxing and waning cycle, see [`waves`]. Results from many nights can
//! be grouped into periods with [`summary`] or exported as a `polars`
//! DataFrame with [`dataframe`].
pub use polars;
pub use wobble_format as format;

pub mod arousal;
pub mod batch;
pub mod breath;
pub mod dataframe;
pub mod error;
pub mod fft;
pub mod flow_limitation;
pub mod night;
pub mod pipeline;
pub mod summary;
pub mod ventilation;
pub mod waves;

pub use batch::{analyze_batch, BatchReport, NightLog};
pub use error::WobbleError;
pub use pipeline::{analyze_flow, analyze_recording, AnalysisConfig, AnalysisResult};

#[cfg(doctest)]
doc_comment::doctest!("../README.md", readme);
