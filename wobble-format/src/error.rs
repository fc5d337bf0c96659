#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum FormatError {
    /// The buffer ends before the layout declared in the header does
    #[error("Recording is truncated, needed {needed} bytes but only {available} are present")]
    Truncated { needed: usize, available: usize },

    /// A fixed-width header field did not hold what its slot declares
    #[error("Failed to parse header field `{field}` from {value:?}")]
    InvalidField { field: &'static str, value: String },

    #[error("No flow channel found, expected a signal label containing \"flow\" or \"flw\"")]
    NoFlowChannel,

    /// The linear digital to physical mapping would divide by zero
    #[error("Signal {label:?} has an empty digital or physical range")]
    DegenerateRange { label: String },

    #[error("Invalid start date {0:?}, expected dd.mm.yy")]
    InvalidDate(String),

    #[error("Invalid data record duration {0}, must be positive")]
    InvalidRecordDuration(f64),

    #[error("Header declares {declared} bytes but its signal count requires {expected}")]
    HeaderLength { declared: usize, expected: usize },
}
