//! Writing EDF recordings.
//!
//! Produces exactly the layout [`crate::EdfReader`] expects, mostly for
//! building synthetic recordings.
use chrono::{Datelike, NaiveDate};

use crate::{
    header::{
        SignalDescriptor, DIMENSION_LEN, HEADER_BLOCK_LEN, HEADER_BYTES_LEN, LABEL_LEN,
        NUMBER_LEN, NUM_RECORDS_LEN, NUM_SIGNALS_LEN, PATIENT_LEN, PREFILTER_LEN,
        RECORDING_LEN, RECORD_DURATION_LEN, RESERVED_LEN, SIGNAL_RESERVED_LEN, START_DATE_LEN,
        START_TIME_LEN, TRANSDUCER_LEN, VERSION_LEN, YEAR_CUTOFF,
    },
    FormatError,
};

pub struct EdfWriter {
    patient_id: String,
    recording_id: String,
    start_date: NaiveDate,
    start_time: String,
    record_duration: f64,
    signals: Vec<(SignalDescriptor, Vec<i16>)>,
}

impl EdfWriter {
    pub fn new(start_date: NaiveDate, record_duration: f64) -> Self {
        Self {
            patient_id: "X".to_string(),
            recording_id: "X".to_string(),
            start_date,
            start_time: "00.00.00".to_string(),
            record_duration,
            signals: Vec::new(),
        }
    }

    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = patient_id.into();
        self
    }

    pub fn with_recording(mut self, recording_id: impl Into<String>) -> Self {
        self.recording_id = recording_id.into();
        self
    }

    /// Start time as `hh.mm.ss`
    pub fn with_start_time(mut self, start_time: impl Into<String>) -> Self {
        self.start_time = start_time.into();
        self
    }

    /// Append a channel and all of its digital samples.
    pub fn signal(mut self, descriptor: SignalDescriptor, samples: Vec<i16>) -> Self {
        self.signals.push((descriptor, samples));
        self
    }

    fn num_records(&self) -> Result<usize, FormatError> {
        let mut records = None;
        for (descriptor, samples) in &self.signals {
            let spr = descriptor.samples_per_record;
            if spr == 0 || samples.len() % spr != 0 {
                return Err(FormatError::InvalidField {
                    field: "samples per record",
                    value: format!("{} samples in records of {spr}", samples.len()),
                });
            }
            let n = samples.len() / spr;
            match records {
                Some(r) if r != n => {
                    return Err(FormatError::InvalidField {
                        field: "data record count",
                        value: format!("{:?} spans {n} records, expected {r}", descriptor.label),
                    });
                }
                _ => records = Some(n),
            }
        }
        Ok(records.unwrap_or(0))
    }

    pub fn finish(self) -> Result<Vec<u8>, FormatError> {
        if !(self.record_duration > 0.0 && self.record_duration.is_finite()) {
            return Err(FormatError::InvalidRecordDuration(self.record_duration));
        }
        let num_records = self.num_records()?;
        let header_bytes = HEADER_BLOCK_LEN * (self.signals.len() + 1);
        let record_bytes: usize = self.signals.iter().map(|(d, _)| d.record_bytes()).sum();
        let mut buf = Vec::with_capacity(header_bytes + num_records * record_bytes);

        put(&mut buf, "version", "0", VERSION_LEN)?;
        put(&mut buf, "patient id", &self.patient_id, PATIENT_LEN)?;
        put(&mut buf, "recording id", &self.recording_id, RECORDING_LEN)?;
        put(&mut buf, "start date", &format_start_date(self.start_date)?, START_DATE_LEN)?;
        put(&mut buf, "start time", &self.start_time, START_TIME_LEN)?;
        put(&mut buf, "header bytes", &header_bytes.to_string(), HEADER_BYTES_LEN)?;
        put(&mut buf, "reserved", "", RESERVED_LEN)?;
        put(&mut buf, "data record count", &num_records.to_string(), NUM_RECORDS_LEN)?;
        put_float(&mut buf, "data record duration", self.record_duration, RECORD_DURATION_LEN)?;
        put(&mut buf, "signal count", &self.signals.len().to_string(), NUM_SIGNALS_LEN)?;

        let descriptors: Vec<&SignalDescriptor> = self.signals.iter().map(|(d, _)| d).collect();
        for d in &descriptors {
            put(&mut buf, "label", &d.label, LABEL_LEN)?;
        }
        for d in &descriptors {
            put(&mut buf, "transducer", &d.transducer, TRANSDUCER_LEN)?;
        }
        for d in &descriptors {
            put(&mut buf, "physical dimension", &d.physical_dimension, DIMENSION_LEN)?;
        }
        for d in &descriptors {
            put_float(&mut buf, "physical minimum", d.physical_min, NUMBER_LEN)?;
        }
        for d in &descriptors {
            put_float(&mut buf, "physical maximum", d.physical_max, NUMBER_LEN)?;
        }
        for d in &descriptors {
            put(&mut buf, "digital minimum", &d.digital_min.to_string(), NUMBER_LEN)?;
        }
        for d in &descriptors {
            put(&mut buf, "digital maximum", &d.digital_max.to_string(), NUMBER_LEN)?;
        }
        for d in &descriptors {
            put(&mut buf, "prefiltering", &d.prefiltering, PREFILTER_LEN)?;
        }
        for d in &descriptors {
            let samples = d.samples_per_record.to_string();
            put(&mut buf, "samples per record", &samples, NUMBER_LEN)?;
        }
        for d in &descriptors {
            put(&mut buf, "reserved", &d.reserved, SIGNAL_RESERVED_LEN)?;
        }

        for record in 0..num_records {
            for (descriptor, samples) in &self.signals {
                let spr = descriptor.samples_per_record;
                for sample in &samples[record * spr..(record + 1) * spr] {
                    buf.extend_from_slice(&sample.to_le_bytes());
                }
            }
        }
        Ok(buf)
    }
}

/// Write `value` left-aligned and space padded into a `width` byte slot.
fn put(
    buf: &mut Vec<u8>,
    field: &'static str,
    value: &str,
    width: usize,
) -> Result<(), FormatError> {
    if value.len() > width || !value.is_ascii() {
        return Err(FormatError::InvalidField {
            field,
            value: value.to_string(),
        });
    }
    buf.extend_from_slice(value.as_bytes());
    buf.resize(buf.len() + width - value.len(), b' ');
    Ok(())
}

fn put_float(
    buf: &mut Vec<u8>,
    field: &'static str,
    value: f64,
    width: usize,
) -> Result<(), FormatError> {
    let text = fit_float(value, width).ok_or(FormatError::InvalidField {
        field,
        value: value.to_string(),
    })?;
    put(buf, field, &text, width)
}

/// Shortest rendering of `value` that fits in `width` characters, dropping
/// decimals when needed.
fn fit_float(value: f64, width: usize) -> Option<String> {
    let plain = value.to_string();
    if plain.len() <= width {
        return Some(plain);
    }
    (0..width)
        .rev()
        .map(|precision| format!("{value:.precision$}"))
        .find(|text| text.len() <= width)
}

fn format_start_date(date: NaiveDate) -> Result<String, FormatError> {
    let year = date.year();
    if !(1900 + YEAR_CUTOFF..2000 + YEAR_CUTOFF).contains(&year) {
        return Err(FormatError::InvalidDate(date.to_string()));
    }
    Ok(format!("{:02}.{:02}.{:02}", date.day(), date.month(), year % 100))
}
