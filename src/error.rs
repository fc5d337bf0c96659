use polars::error::PolarsError;
use wobble_format::FormatError;

#[derive(Debug, thiserror::Error)]
pub enum WobbleError {
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    #[error("Session lasts {duration_minutes:.1} minutes, below the {min_minutes} minute minimum")]
    TooShort {
        duration_minutes: f64,
        min_minutes: f64,
    },

    #[error("FFT input length {0} is not a power of two")]
    FftLength(usize),

    #[error("{0}")]
    IOError(#[from] std::io::Error),

    #[error("DataFrame error: {0}")]
    DataFrame(#[from] PolarsError),
}
