//! Reading a flow channel out of an in-memory EDF recording.
use chrono::NaiveDate;
use log::debug;

use crate::{
    header::{
        parse_global_header, parse_signal_block, SignalDescriptor, WaveformHeader,
        HEADER_BLOCK_LEN,
    },
    FormatError,
};

/// A decoded flow channel, the input to every analysis stage.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRecording {
    /// Physical-unit samples in recording order
    pub samples: Vec<f64>,
    /// Samples per second
    pub sampling_rate: f64,
    pub recording_date: NaiveDate,
    pub duration_minutes: f64,
}

impl FlowRecording {
    pub fn duration_seconds(&self) -> f64 {
        self.duration_minutes * 60.0
    }
}

/// Parsed headers over a borrowed recording buffer.
///
/// Construction validates the header against the buffer, so the duration is
/// known before any sample is decoded.
#[derive(Debug)]
pub struct EdfReader<'a> {
    bytes: &'a [u8],
    header: WaveformHeader,
    signals: Vec<SignalDescriptor>,
}

impl<'a> EdfReader<'a> {
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, FormatError> {
        let global = bytes.get(..HEADER_BLOCK_LEN).ok_or(FormatError::Truncated {
            needed: HEADER_BLOCK_LEN,
            available: bytes.len(),
        })?;
        let header = parse_global_header(global)?;
        if !(header.record_duration > 0.0 && header.record_duration.is_finite()) {
            return Err(FormatError::InvalidRecordDuration(header.record_duration));
        }

        let expected = header.expected_header_bytes();
        let signal_block = bytes
            .get(HEADER_BLOCK_LEN..expected)
            .ok_or(FormatError::Truncated {
                needed: expected,
                available: bytes.len(),
            })?;
        if header.header_bytes != expected {
            return Err(FormatError::HeaderLength {
                declared: header.header_bytes,
                expected,
            });
        }
        let signals = parse_signal_block(signal_block, header.num_signals)?;

        let record_bytes: usize = signals.iter().map(SignalDescriptor::record_bytes).sum();
        let needed = record_bytes
            .checked_mul(header.num_data_records)
            .and_then(|data| data.checked_add(header.header_bytes))
            .unwrap_or(usize::MAX);
        if bytes.len() < needed {
            return Err(FormatError::Truncated {
                needed,
                available: bytes.len(),
            });
        }
        debug!(
            "EDF header: {} signals, {} records of {}s",
            header.num_signals, header.num_data_records, header.record_duration
        );

        Ok(Self {
            bytes,
            header,
            signals,
        })
    }

    pub fn header(&self) -> &WaveformHeader {
        &self.header
    }

    pub fn signals(&self) -> &[SignalDescriptor] {
        &self.signals
    }

    pub fn duration_minutes(&self) -> f64 {
        self.header.duration_minutes()
    }

    pub fn recording_date(&self) -> Result<NaiveDate, FormatError> {
        self.header.recording_date()
    }

    /// Index of the first channel labelled as flow.
    pub fn flow_channel(&self) -> Result<usize, FormatError> {
        self.signals
            .iter()
            .position(SignalDescriptor::is_flow)
            .ok_or(FormatError::NoFlowChannel)
    }

    /// Decode every sample of one channel into physical units.
    pub fn physical_samples(&self, channel: usize) -> Result<Vec<f64>, FormatError> {
        let signal = self.signals.get(channel).ok_or(FormatError::InvalidField {
            field: "signal index",
            value: channel.to_string(),
        })?;
        signal.check_ranges()?;

        let record_bytes: usize = self.signals.iter().map(SignalDescriptor::record_bytes).sum();
        let channel_offset: usize = self.signals[..channel]
            .iter()
            .map(SignalDescriptor::record_bytes)
            .sum();
        let width = signal.record_bytes();

        let mut samples =
            Vec::with_capacity(signal.samples_per_record * self.header.num_data_records);
        for record in 0..self.header.num_data_records {
            let start = self.header.header_bytes + record * record_bytes + channel_offset;
            let chunk = &self.bytes[start..start + width];
            samples.extend(
                chunk
                    .chunks_exact(2)
                    .map(|b| signal.to_physical(i16::from_le_bytes([b[0], b[1]]))),
            );
        }
        Ok(samples)
    }

    /// Decode the flow channel along with its rate, date and duration.
    pub fn flow_recording(&self) -> Result<FlowRecording, FormatError> {
        let channel = self.flow_channel()?;
        let signal = &self.signals[channel];
        let recording_date = self.recording_date()?;
        let samples = self.physical_samples(channel)?;
        debug!(
            "Decoded {} samples from channel {:?}",
            samples.len(),
            signal.label
        );
        Ok(FlowRecording {
            samples,
            sampling_rate: signal.samples_per_record as f64 / self.header.record_duration,
            recording_date,
            duration_minutes: self.duration_minutes(),
        })
    }
}

/// Decode the flow channel of a complete recording buffer.
pub fn decode_flow(bytes: &[u8]) -> Result<FlowRecording, FormatError> {
    EdfReader::from_bytes(bytes)?.flow_recording()
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::writer::EdfWriter;

    fn flow_signal() -> SignalDescriptor {
        SignalDescriptor::new("Flow")
            .with_physical_range(-100.0, 100.0)
            .with_digital_range(-2048, 2047)
            .with_samples_per_record(10)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_decode_single_record() -> eyre::Result<()> {
        let digital = vec![0i16, 1024, -1024, 0, 1024, -1024, 0, 1024, -1024, 0];
        let bytes = EdfWriter::new(date(2024, 3, 9), 1.0)
            .signal(flow_signal(), digital.clone())
            .finish()?;
        let recording = decode_flow(&bytes)?;

        let expected: Vec<f64> = digital
            .iter()
            .map(|&d| (d as f64 + 2048.0) * 200.0 / 4095.0 - 100.0)
            .collect();
        assert_eq!(recording.samples, expected);
        assert_eq!(recording.sampling_rate, 10.0);
        assert_eq!(recording.recording_date, date(2024, 3, 9));
        assert_eq!(recording.duration_minutes, 1.0 / 60.0);
        Ok(())
    }

    #[test]
    fn test_flow_channel_between_others() -> eyre::Result<()> {
        let pressure = SignalDescriptor::new("Press.2s").with_samples_per_record(2);
        let leak = SignalDescriptor::new("Leak.2s").with_samples_per_record(3);
        let flow = SignalDescriptor::new("Flow.40ms")
            .with_physical_range(-32768.0, 32767.0)
            .with_samples_per_record(4);
        let bytes = EdfWriter::new(date(2023, 1, 2), 2.0)
            .signal(pressure, vec![7, 7, 8, 8])
            .signal(flow, vec![1, 2, 3, 4, 5, 6, 7, 8])
            .signal(leak, vec![-1; 6])
            .finish()?;

        let reader = EdfReader::from_bytes(&bytes)?;
        assert_eq!(reader.flow_channel()?, 1);
        let recording = reader.flow_recording()?;
        assert_eq!(recording.samples, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(recording.sampling_rate, 2.0);
        assert_eq!(recording.duration_minutes, 4.0 / 60.0);
        Ok(())
    }

    #[test]
    fn test_missing_flow_channel() -> eyre::Result<()> {
        let bytes = EdfWriter::new(date(2023, 1, 2), 1.0)
            .signal(SignalDescriptor::new("SpO2"), vec![1, 2])
            .finish()?;
        assert_eq!(decode_flow(&bytes), Err(FormatError::NoFlowChannel));
        Ok(())
    }

    #[test]
    fn test_truncated_data() -> eyre::Result<()> {
        let mut bytes = EdfWriter::new(date(2023, 1, 2), 1.0)
            .signal(flow_signal(), vec![0; 20])
            .finish()?;
        bytes.truncate(bytes.len() - 1);
        assert_eq!(
            EdfReader::from_bytes(&bytes).unwrap_err(),
            FormatError::Truncated {
                needed: 512 + 40,
                available: 512 + 39
            }
        );
        assert!(matches!(
            EdfReader::from_bytes(&bytes[..100]),
            Err(FormatError::Truncated { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_bad_numeric_field() -> eyre::Result<()> {
        let mut bytes = EdfWriter::new(date(2023, 1, 2), 1.0)
            .signal(flow_signal(), vec![0; 10])
            .finish()?;
        // data record count lives at 236..244
        bytes[236..244].copy_from_slice(b"one     ");
        assert_eq!(
            EdfReader::from_bytes(&bytes).unwrap_err(),
            FormatError::InvalidField {
                field: "data record count",
                value: "one".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn test_infinite_physical_range() -> eyre::Result<()> {
        let bytes = EdfWriter::new(date(2023, 1, 2), 1.0)
            .signal(flow_signal(), vec![0; 10])
            .finish()?;
        // physical maximum of the only signal lives at 368..376
        for (raw, value) in [(b"inf     ", "inf"), (b"NaN     ", "NaN")] {
            let mut bytes = bytes.clone();
            bytes[368..376].copy_from_slice(raw);
            assert_eq!(
                decode_flow(&bytes),
                Err(FormatError::InvalidField {
                    field: "physical maximum",
                    value: value.to_string()
                })
            );
        }
        Ok(())
    }

    #[test]
    fn test_header_length_mismatch() -> eyre::Result<()> {
        let mut bytes = EdfWriter::new(date(2023, 1, 2), 1.0)
            .signal(flow_signal(), vec![0; 10])
            .finish()?;
        bytes[184..192].copy_from_slice(b"768     ");
        assert_eq!(
            EdfReader::from_bytes(&bytes).unwrap_err(),
            FormatError::HeaderLength {
                declared: 768,
                expected: 512
            }
        );
        Ok(())
    }

    #[test]
    fn test_degenerate_range() -> eyre::Result<()> {
        let flat = SignalDescriptor::new("Flow").with_digital_range(5, 5);
        let bytes = EdfWriter::new(date(2023, 1, 2), 1.0)
            .signal(flat, vec![5])
            .finish()?;
        assert_eq!(
            decode_flow(&bytes),
            Err(FormatError::DegenerateRange {
                label: "Flow".to_string()
            })
        );
        Ok(())
    }

    #[test]
    fn test_decoding_is_deterministic() -> eyre::Result<()> {
        let bytes = EdfWriter::new(date(2022, 6, 30), 1.0)
            .signal(flow_signal(), (0..50).map(|i| (i * 37 % 400) as i16 - 200).collect())
            .finish()?;
        assert_eq!(decode_flow(&bytes)?, decode_flow(&bytes)?);
        Ok(())
    }
}
