use std::f64::consts::PI;

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use wobble::{
    analyze_batch, analyze_flow, analyze_recording,
    summary::{period_summaries, ComparisonDate},
    AnalysisConfig, NightLog,
};
use wobble_format::{EdfWriter, FlowRecording, SignalDescriptor};

const RATE: f64 = 5.0;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// 4 s sinusoidal breaths, optionally with tidal volume waxing and waning
/// over `cycle_secs`.
fn breathing(minutes: usize, cycle_secs: Option<f64>) -> Vec<f64> {
    (0..minutes * 60 * RATE as usize)
        .map(|i| {
            let breath = (2.0 * PI * i as f64 / 20.0).sin();
            match cycle_secs {
                Some(cycle) => (1.0 + 0.8 * (2.0 * PI * i as f64 / RATE / cycle).sin()) * breath,
                None => breath,
            }
        })
        .collect()
}

fn edf(start: NaiveDate, flow: &[f64]) -> eyre::Result<Vec<u8>> {
    let digital: Vec<i16> = flow.iter().map(|f| (f * 1000.0).round() as i16).collect();
    let pressure = SignalDescriptor::new("Press.40ms")
        .with_dimension("cmH2O")
        .with_samples_per_record(1);
    let flow = SignalDescriptor::new("Flow.40ms")
        .with_dimension("L/s")
        .with_physical_range(-2.048, 2.047)
        .with_digital_range(-2048, 2047)
        .with_samples_per_record(RATE as usize);
    let records = digital.len() / RATE as usize;
    Ok(EdfWriter::new(start, 1.0)
        .with_patient("X X X X")
        .with_start_time("23.01.12")
        .signal(pressure, vec![0; records])
        .signal(flow, digital)
        .finish()?)
}

#[test]
fn test_analysis_is_deterministic() -> eyre::Result<()> {
    init();
    let bytes = edf(date(2024, 2, 3), &breathing(35, Some(80.0)))?;
    let config = AnalysisConfig::default();
    let first = analyze_recording("20240203_BRP.edf", &bytes, &config)?;
    let second = analyze_recording("20240203_BRP.edf", &bytes, &config)?;
    assert_eq!(first, second);
    assert_eq!(first.recording_date, date(2024, 2, 3));
    assert_eq!(first.duration_minutes, 35.0);
    Ok(())
}

#[test]
fn test_periodic_breathing_scores_high() -> eyre::Result<()> {
    init();
    let recording = |samples| FlowRecording {
        samples,
        sampling_rate: RATE,
        recording_date: date(2024, 2, 3),
        duration_minutes: 40.0,
    };
    let periodic = analyze_flow("periodic", &recording(breathing(40, Some(80.0))))?;
    let steady = analyze_flow("steady", &recording(breathing(40, None)))?;

    assert!(periodic.periodicity_index > 90.0, "{periodic:?}");
    assert!(steady.periodicity_index < periodic.periodicity_index, "{steady:?}");
    let cycle = periodic.cycle_period_secs.unwrap();
    assert!((cycle - 80.0).abs() < 1e-6, "{cycle}");
    assert!((0.0..=100.0).contains(&periodic.flow_limitation));

    // tidal volume swings between 0.2 and 1.8, the envelope by about 0.8
    let depth = periodic.cycle_depth.unwrap();
    assert!((0.6..0.9).contains(&depth), "{depth}");
    let wave = periodic.wave_period_secs.unwrap();
    assert!((wave - 80.0).abs() < 1.0, "{wave}");
    assert!(periodic.periodic_breathing_percent > 80.0, "{periodic:?}");
    assert!(periodic.periodic_breathing_minutes > 32.0, "{periodic:?}");
    assert_eq!(steady.periodic_breathing_minutes, 0.0);
    assert_eq!(steady.periodic_breathing_percent, 0.0);
    Ok(())
}

#[test]
fn test_batch_sorts_skips_and_reports_failures() -> eyre::Result<()> {
    init();
    let flow = breathing(31, None);
    let mut broken = edf(date(2024, 1, 3), &flow)?;
    // record count that is not a number
    broken[236..244].copy_from_slice(b"many    ");
    let inputs = vec![
        ("c.edf".to_string(), edf(date(2024, 1, 9), &flow)?),
        ("short.edf".to_string(), edf(date(2024, 1, 2), &breathing(5, None))?),
        ("a.edf".to_string(), edf(date(2024, 1, 1), &flow)?),
        ("broken.edf".to_string(), broken),
        ("b.edf".to_string(), edf(date(2024, 1, 5), &flow)?),
    ];

    let report = analyze_batch(&inputs, &AnalysisConfig::default());
    let names: Vec<_> = report.results.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(names, vec!["a.edf", "b.edf", "c.edf"]);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "broken.edf");
    assert_eq!(report.total(), inputs.len());

    let mut log = NightLog::new();
    log.extend([report]);
    let comparisons = [ComparisonDate::new(date(2024, 1, 5)).with_label("Higher pressure")];
    let periods = period_summaries(log.results(), &comparisons);
    assert_eq!(periods.len(), 2);
    assert_eq!(periods[0].sessions, 1);
    assert_eq!(periods[1].label, "After Higher pressure");
    assert_eq!(periods[1].sessions, 2);
    Ok(())
}
