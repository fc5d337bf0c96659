use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use eyre::eyre;
use log::{debug, warn};
use memmap2::Mmap;
use pico_args::Arguments;
use walkdir::WalkDir;
use wobble::{
    analyze_batch,
    dataframe::results_to_dataframe,
    summary::{overall_means, period_summaries, ComparisonDate, MetricSummary},
    AnalysisConfig,
};

const HELP: &str = "\
wobble-scan: analyze CPAP flow recordings night by night

USAGE:
  wobble-scan [OPTIONS] <PATH>...

OPTIONS:
  --min-duration <MINUTES>       Skip sessions shorter than this [default: 30]
  --min-size <BYTES>             Ignore files no larger than this [default: 512000]
  --suffix <TEXT>                Only read files whose name ends with this [default: BRP.edf]
  --compare <YYYY-MM-DD[=LABEL]> Split the summary at this date, may be repeated
  -h, --help                     Print this help

ARGS:
  <PATH>...  Recording files or directories searched recursively
";

struct Args {
    min_duration: f64,
    min_size: u64,
    suffix: String,
    comparisons: Vec<ComparisonDate>,
    paths: Vec<PathBuf>,
}

fn parse_comparison(s: &str) -> Result<ComparisonDate, eyre::Report> {
    let (date, label) = match s.split_once('=') {
        Some((date, label)) => (date, Some(label)),
        None => (s, None),
    };
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| eyre!("invalid comparison date {date:?}: {e}"))?;
    let comparison = ComparisonDate::new(date);
    Ok(match label {
        Some(label) => comparison.with_label(label),
        None => comparison,
    })
}

fn parse_args() -> eyre::Result<Args> {
    let mut args = Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }
    let parsed = Args {
        min_duration: args.opt_value_from_str("--min-duration")?.unwrap_or(30.0),
        min_size: args.opt_value_from_str("--min-size")?.unwrap_or(500 * 1024),
        suffix: args
            .opt_value_from_str("--suffix")?
            .unwrap_or_else(|| "BRP.edf".to_string()),
        comparisons: args.values_from_fn("--compare", parse_comparison)?,
        paths: args
            .finish()
            .into_iter()
            .map(PathBuf::from)
            .collect(),
    };
    if parsed.paths.is_empty() {
        return Err(eyre!("no input paths given\n\n{HELP}"));
    }
    Ok(parsed)
}

/// Recordings worth analyzing, and the entries that could not be read.
#[derive(Debug, Default)]
struct Found {
    recordings: Vec<PathBuf>,
    failed: Vec<(String, String)>,
}

impl Found {
    fn fail(&mut self, name: String, error: impl ToString) {
        let error = error.to_string();
        warn!("Skipping {name}: {error}");
        self.failed.push((name, error));
    }
}

/// Walk every input path for files ending in `suffix` and larger than
/// `min_size` bytes. Unreadable entries are recorded and the walk goes on.
fn find_recordings(paths: &[PathBuf], suffix: &str, min_size: u64) -> Found {
    let mut found = Found::default();
    for root in paths {
        for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let name = e.path().unwrap_or(root.as_path()).display().to_string();
                    found.fail(name, e);
                    continue;
                }
            };
            let matches_suffix = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(suffix));
            if !entry.file_type().is_file() || !matches_suffix {
                continue;
            }
            let size = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    found.fail(entry.path().display().to_string(), e);
                    continue;
                }
            };
            if size <= min_size {
                debug!("Ignoring {}, only {size} bytes", entry.path().display());
                continue;
            }
            found.recordings.push(entry.into_path());
        }
    }
    found
}

fn map_recording(path: &Path) -> io::Result<Mmap> {
    let file = File::open(path)?;
    // Recordings are only read, and nothing else is expected to write them mid-scan
    unsafe { Mmap::map(&file) }
}

fn format_metric(name: &str, metric: &MetricSummary) -> String {
    format!(
        "  {name:<20} mean {:>6.1}  median {:>6.1}",
        metric.weighted_mean, metric.median
    )
}

fn main() -> eyre::Result<()> {
    env_logger::init();
    let args = parse_args()?;

    let mut found = find_recordings(&args.paths, &args.suffix, args.min_size);
    if found.recordings.is_empty() {
        return Err(eyre!(
            "no {} files over {} bytes found",
            args.suffix,
            args.min_size
        ));
    }

    let recordings = std::mem::take(&mut found.recordings);
    let mut inputs = Vec::with_capacity(recordings.len());
    for path in &recordings {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        match map_recording(path) {
            Ok(mmap) => inputs.push((name, mmap)),
            Err(e) => found.fail(path.display().to_string(), e),
        }
    }

    let config = AnalysisConfig::with_min_duration(args.min_duration);
    let report = analyze_batch(&inputs, &config);
    for (name, error) in &report.failed {
        warn!("{name}: {error}");
    }

    println!("{}", results_to_dataframe(&report.results)?);

    for period in period_summaries(&report.results, &args.comparisons) {
        println!(
            "\nPeriod {}: {} ({} sessions, {:.1} hours)",
            period.number,
            period.label,
            period.sessions,
            period.total_minutes / 60.0
        );
        println!("{}", format_metric("Flow limitation", &period.flow_limitation));
        println!("{}", format_metric("Periodicity", &period.periodicity_index));
        println!("{}", format_metric("Regularity", &period.regularity_score));
        println!("{}", format_metric("Arousal index", &period.arousal_index));
        println!("{}", format_metric("Composite", &period.composite_score));
    }

    if let Some(means) = overall_means(&report.results) {
        println!(
            "\nOverall: flow limitation {:.1}, periodicity {:.1}, regularity {:.1}, \
             arousals {:.1}/h, composite {:.1}",
            means.flow_limitation,
            means.periodicity_index,
            means.regularity_score,
            means.arousal_index,
            means.composite_score
        );
    }
    println!(
        "\nProcessed {} sessions, skipped {} under {} minutes, {} failed",
        report.results.len(),
        report.skipped,
        args.min_duration,
        report.failed.len() + found.failed.len()
    );
    Ok(())
}

#[cfg(test)]
mod test {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_find_recordings_survives_unreadable_entries() -> eyre::Result<()> {
        let root = std::env::temp_dir().join(format!("wobble-scan-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);
        fs::create_dir_all(root.join("20240302"))?;
        fs::write(root.join("night_BRP.edf"), vec![0u8; 2000])?;
        fs::write(root.join("small_BRP.edf"), vec![0u8; 10])?;
        fs::write(root.join("notes.txt"), vec![0u8; 2000])?;
        fs::write(root.join("20240302").join("deeper_BRP.edf"), vec![0u8; 2000])?;
        #[cfg(unix)]
        std::os::unix::fs::symlink("/nonexistent", root.join("gone_BRP.edf"))?;

        let missing = root.join("no-such-card");
        let found = find_recordings(&[root.clone(), missing.clone()], "BRP.edf", 1000);
        assert_eq!(
            found.recordings,
            vec![
                root.join("20240302").join("deeper_BRP.edf"),
                root.join("night_BRP.edf"),
            ]
        );
        let failed: Vec<&str> = found.failed.iter().map(|(name, _)| name.as_str()).collect();
        let mut expected = Vec::new();
        #[cfg(unix)]
        expected.push(root.join("gone_BRP.edf").display().to_string());
        expected.push(missing.display().to_string());
        assert_eq!(failed, expected);

        fs::remove_dir_all(&root)?;
        Ok(())
    }
}
