//! EDF container support for CPAP waveform recordings.
//!
//! A recording is a 256 byte ASCII header, one 256 byte block per signal and
//! then fixed-size data records of little-endian `i16` samples. Only what the
//! night analysis needs is exposed: the headers, the flow channel in physical
//! units, and a writer producing the same layout.
mod error;
pub mod header;
pub mod reader;
pub mod writer;

pub use error::FormatError;
pub use header::{expand_year, SignalDescriptor, WaveformHeader};
pub use reader::{decode_flow, EdfReader, FlowRecording};
pub use writer::EdfWriter;
