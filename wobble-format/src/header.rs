//! Fixed-width ASCII header of an EDF recording.
//!
//! The global header is always 256 bytes. It is followed by one 256 byte block
//! per signal, stored column-major: all labels, then all transducers, and so on.
use std::str::FromStr;

use chrono::NaiveDate;

use crate::FormatError;

/// Size of the global header, and of each signal's share of the signal block.
pub const HEADER_BLOCK_LEN: usize = 256;

// Global header field widths, in file order.
pub(crate) const VERSION_LEN: usize = 8;
pub(crate) const PATIENT_LEN: usize = 80;
pub(crate) const RECORDING_LEN: usize = 80;
pub(crate) const START_DATE_LEN: usize = 8;
pub(crate) const START_TIME_LEN: usize = 8;
pub(crate) const HEADER_BYTES_LEN: usize = 8;
pub(crate) const RESERVED_LEN: usize = 44;
pub(crate) const NUM_RECORDS_LEN: usize = 8;
pub(crate) const RECORD_DURATION_LEN: usize = 8;
pub(crate) const NUM_SIGNALS_LEN: usize = 4;

// Per-signal field widths, in file order.
pub(crate) const LABEL_LEN: usize = 16;
pub(crate) const TRANSDUCER_LEN: usize = 80;
pub(crate) const DIMENSION_LEN: usize = 8;
pub(crate) const NUMBER_LEN: usize = 8;
pub(crate) const PREFILTER_LEN: usize = 80;
pub(crate) const SIGNAL_RESERVED_LEN: usize = 32;

/// Two-digit years below this are 20xx, the rest 19xx.
///
/// Recordings made from 2085 onwards will be read as 1985+. Downstream
/// comparisons rely on this exact cutoff, so leave it alone.
pub const YEAR_CUTOFF: i32 = 85;

/// The global header of a recording.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveformHeader {
    pub version: String,
    pub patient_id: String,
    pub recording_id: String,
    /// `dd.mm.yy`
    pub start_date: String,
    /// `hh.mm.ss`
    pub start_time: String,
    pub header_bytes: usize,
    pub reserved: String,
    pub num_data_records: usize,
    /// Seconds covered by each data record
    pub record_duration: f64,
    pub num_signals: usize,
}

impl WaveformHeader {
    /// Header length implied by the signal count.
    pub fn expected_header_bytes(&self) -> usize {
        HEADER_BLOCK_LEN * (self.num_signals + 1)
    }

    /// Total recording length in minutes.
    pub fn duration_minutes(&self) -> f64 {
        self.num_data_records as f64 * self.record_duration / 60.0
    }

    /// Expand the `dd.mm.yy` start date.
    pub fn recording_date(&self) -> Result<NaiveDate, FormatError> {
        parse_start_date(&self.start_date)
    }
}

/// Metadata for one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDescriptor {
    pub label: String,
    pub transducer: String,
    pub physical_dimension: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: i32,
    pub digital_max: i32,
    pub prefiltering: String,
    pub samples_per_record: usize,
    pub reserved: String,
}

impl Default for SignalDescriptor {
    fn default() -> Self {
        Self {
            label: String::new(),
            transducer: String::new(),
            physical_dimension: String::new(),
            physical_min: -1.0,
            physical_max: 1.0,
            digital_min: i16::MIN as i32,
            digital_max: i16::MAX as i32,
            prefiltering: String::new(),
            samples_per_record: 1,
            reserved: String::new(),
        }
    }
}

impl SignalDescriptor {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn with_transducer(mut self, transducer: impl Into<String>) -> Self {
        self.transducer = transducer.into();
        self
    }

    pub fn with_dimension(mut self, dimension: impl Into<String>) -> Self {
        self.physical_dimension = dimension.into();
        self
    }

    pub fn with_physical_range(mut self, min: f64, max: f64) -> Self {
        self.physical_min = min;
        self.physical_max = max;
        self
    }

    pub fn with_digital_range(mut self, min: i32, max: i32) -> Self {
        self.digital_min = min;
        self.digital_max = max;
        self
    }

    pub fn with_samples_per_record(mut self, samples: usize) -> Self {
        self.samples_per_record = samples;
        self
    }

    /// Whether this channel carries airflow, judged by its label.
    pub fn is_flow(&self) -> bool {
        let label = self.label.trim().to_lowercase();
        label.contains("flow") || label.contains("flw")
    }

    /// Bytes this channel occupies in every data record.
    pub fn record_bytes(&self) -> usize {
        self.samples_per_record * 2
    }

    pub(crate) fn check_ranges(&self) -> Result<(), FormatError> {
        if self.digital_max == self.digital_min || self.physical_max == self.physical_min {
            return Err(FormatError::DegenerateRange {
                label: self.label.clone(),
            });
        }
        Ok(())
    }

    /// Linear mapping from a stored digital value into physical units.
    pub fn to_physical(&self, digital: i16) -> f64 {
        (digital as f64 - self.digital_min as f64) * (self.physical_max - self.physical_min)
            / (self.digital_max as f64 - self.digital_min as f64)
            + self.physical_min
    }
}

/// Walks a buffer one fixed-width field at a time.
pub(crate) struct FieldCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, width: usize) -> Result<&'a [u8], FormatError> {
        let end = self.pos + width;
        let field = self.buf.get(self.pos..end).ok_or(FormatError::Truncated {
            needed: end,
            available: self.buf.len(),
        })?;
        self.pos = end;
        Ok(field)
    }

    pub(crate) fn text(&mut self, width: usize) -> Result<String, FormatError> {
        let raw = self.take(width)?;
        Ok(String::from_utf8_lossy(raw)
            .trim_matches(|c: char| c.is_whitespace() || c == '\0')
            .to_string())
    }

    pub(crate) fn number<T: FromStr>(
        &mut self,
        field: &'static str,
        width: usize,
    ) -> Result<T, FormatError> {
        let value = self.text(width)?;
        value
            .parse()
            .map_err(|_| FormatError::InvalidField { field, value })
    }

    /// Read one field for each of `n` signals.
    pub(crate) fn texts(&mut self, n: usize, width: usize) -> Result<Vec<String>, FormatError> {
        (0..n).map(|_| self.text(width)).collect()
    }

    pub(crate) fn numbers<T: FromStr>(
        &mut self,
        n: usize,
        field: &'static str,
        width: usize,
    ) -> Result<Vec<T>, FormatError> {
        (0..n).map(|_| self.number(field, width)).collect()
    }

    /// Like [`FieldCursor::numbers`], but `inf` and `NaN` are rejected.
    pub(crate) fn finite_numbers(
        &mut self,
        n: usize,
        field: &'static str,
        width: usize,
    ) -> Result<Vec<f64>, FormatError> {
        (0..n)
            .map(|_| {
                let value = self.text(width)?;
                match value.parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(v),
                    _ => Err(FormatError::InvalidField { field, value }),
                }
            })
            .collect()
    }
}

pub(crate) fn parse_global_header(buf: &[u8]) -> Result<WaveformHeader, FormatError> {
    let mut cursor = FieldCursor::new(buf);
    let version = cursor.text(VERSION_LEN)?;
    let patient_id = cursor.text(PATIENT_LEN)?;
    let recording_id = cursor.text(RECORDING_LEN)?;
    let start_date = cursor.text(START_DATE_LEN)?;
    let start_time = cursor.text(START_TIME_LEN)?;
    let header_bytes = cursor.number("header bytes", HEADER_BYTES_LEN)?;
    let reserved = cursor.text(RESERVED_LEN)?;
    let num_data_records = cursor.number("data record count", NUM_RECORDS_LEN)?;
    let record_duration = cursor.number("data record duration", RECORD_DURATION_LEN)?;
    let num_signals = cursor.number("signal count", NUM_SIGNALS_LEN)?;
    Ok(WaveformHeader {
        version,
        patient_id,
        recording_id,
        start_date,
        start_time,
        header_bytes,
        reserved,
        num_data_records,
        record_duration,
        num_signals,
    })
}

/// Parse the column-major signal block that follows the global header.
pub(crate) fn parse_signal_block(
    buf: &[u8],
    n: usize,
) -> Result<Vec<SignalDescriptor>, FormatError> {
    let mut cursor = FieldCursor::new(buf);
    let labels = cursor.texts(n, LABEL_LEN)?;
    let transducers = cursor.texts(n, TRANSDUCER_LEN)?;
    let dimensions = cursor.texts(n, DIMENSION_LEN)?;
    let physical_mins = cursor.finite_numbers(n, "physical minimum", NUMBER_LEN)?;
    let physical_maxs = cursor.finite_numbers(n, "physical maximum", NUMBER_LEN)?;
    let digital_mins: Vec<i32> = cursor.numbers(n, "digital minimum", NUMBER_LEN)?;
    let digital_maxs: Vec<i32> = cursor.numbers(n, "digital maximum", NUMBER_LEN)?;
    let prefilters = cursor.texts(n, PREFILTER_LEN)?;
    let samples: Vec<usize> = cursor.numbers(n, "samples per record", NUMBER_LEN)?;
    let reserved = cursor.texts(n, SIGNAL_RESERVED_LEN)?;

    let mut signals = Vec::with_capacity(n);
    for i in 0..n {
        signals.push(SignalDescriptor {
            label: labels[i].clone(),
            transducer: transducers[i].clone(),
            physical_dimension: dimensions[i].clone(),
            physical_min: physical_mins[i],
            physical_max: physical_maxs[i],
            digital_min: digital_mins[i],
            digital_max: digital_maxs[i],
            prefiltering: prefilters[i].clone(),
            samples_per_record: samples[i],
            reserved: reserved[i].clone(),
        });
    }
    Ok(signals)
}

/// Expand a two-digit year with the fixed [`YEAR_CUTOFF`].
pub fn expand_year(year: i32) -> i32 {
    if year >= 100 {
        year
    } else if year < YEAR_CUTOFF {
        2000 + year
    } else {
        1900 + year
    }
}

pub(crate) fn parse_start_date(date: &str) -> Result<NaiveDate, FormatError> {
    let invalid = || FormatError::InvalidDate(date.to_string());
    let parts = date
        .split('.')
        .map(|p| p.trim().parse::<u32>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    let [day, month, year] = parts[..] else {
        return Err(invalid());
    };
    NaiveDate::from_ymd_opt(expand_year(year as i32), month, day).ok_or_else(invalid)
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_year_cutoff() {
        assert_eq!(expand_year(0), 2000);
        assert_eq!(expand_year(24), 2024);
        assert_eq!(expand_year(84), 2084);
        assert_eq!(expand_year(85), 1985);
        assert_eq!(expand_year(99), 1999);
    }

    #[test]
    fn test_start_date() -> eyre::Result<()> {
        assert_eq!(
            parse_start_date("03.11.24")?,
            NaiveDate::from_ymd_opt(2024, 11, 3).unwrap()
        );
        assert_eq!(
            parse_start_date("31.12.85")?,
            NaiveDate::from_ymd_opt(1985, 12, 31).unwrap()
        );
        assert!(matches!(
            parse_start_date("31.02.24"),
            Err(FormatError::InvalidDate(_))
        ));
        assert!(matches!(
            parse_start_date("2024-01-01"),
            Err(FormatError::InvalidDate(_))
        ));
        Ok(())
    }

    #[test]
    fn test_cursor_trims_padding() -> eyre::Result<()> {
        let buf = b"Flow    \0\0  12  ";
        let mut cursor = FieldCursor::new(buf);
        assert_eq!(cursor.text(10)?, "Flow");
        assert_eq!(cursor.number::<usize>("n", 6)?, 12);
        assert!(matches!(
            cursor.text(1),
            Err(FormatError::Truncated {
                needed: 17,
                available: 16
            })
        ));
        Ok(())
    }

    #[test]
    fn test_cursor_rejects_non_numeric() {
        let mut cursor = FieldCursor::new(b"12ab    ");
        assert_eq!(
            cursor.number::<usize>("data record count", 8),
            Err(FormatError::InvalidField {
                field: "data record count",
                value: "12ab".to_string()
            })
        );
    }

    #[test]
    fn test_physical_range_must_be_finite() {
        for raw in [&b"inf     "[..], b"NaN     ", b"-inf    "] {
            let mut cursor = FieldCursor::new(raw);
            assert_eq!(
                cursor.finite_numbers(1, "physical maximum", 8),
                Err(FormatError::InvalidField {
                    field: "physical maximum",
                    value: String::from_utf8_lossy(raw).trim().to_string()
                })
            );
        }
        let mut cursor = FieldCursor::new(b"-2.048  2.047   ");
        assert_eq!(
            cursor.finite_numbers(2, "physical maximum", 8),
            Ok(vec![-2.048, 2.047])
        );
    }

    #[test]
    fn test_flow_labels() {
        assert!(SignalDescriptor::new("Flow.40ms").is_flow());
        assert!(SignalDescriptor::new("  FLW ").is_flow());
        assert!(SignalDescriptor::new("Airflow").is_flow());
        assert!(!SignalDescriptor::new("Press.2s").is_flow());
    }

    #[test]
    fn test_to_physical() {
        let signal = SignalDescriptor::new("Flow")
            .with_physical_range(-100.0, 100.0)
            .with_digital_range(-2048, 2047);
        assert_eq!(signal.to_physical(-2048), -100.0);
        assert_eq!(signal.to_physical(2047), 100.0);
        assert_eq!(signal.to_physical(0), 2048.0 * 200.0 / 4095.0 - 100.0);
    }
}
