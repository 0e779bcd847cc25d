//! edgethin-bench: CLI tool for thinning parameter experimentation and
//! diagnostics.
//!
//! Runs the five thinning phases over a JSON batch snapshot with
//! configurable parameters, printing per-phase diagnostics. Useful for:
//!
//! - Tuning the length factor and tolerance cap
//! - Comparing the topology-preserving simplifier against the identity
//! - Sizing the coordinate registry's buckets for a dataset
//! - Measuring per-phase durations to identify bottlenecks
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin edgethin-bench -- [OPTIONS] <SNAPSHOT>
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod snapshot;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use edgethin::diagnostics::ThinDiagnostics;
use edgethin::{SimplifierKind, ThinConfig};
use tracing_subscriber::EnvFilter;

use crate::snapshot::Snapshot;

/// Thinning parameter experimentation and diagnostics for edgethin.
///
/// Thins every table of a JSON batch snapshot and prints detailed
/// per-phase timing and count diagnostics.
#[derive(Parser)]
#[command(name = "edgethin-bench", version)]
struct Cli {
    /// Path to the input snapshot (JSON).
    snapshot_path: PathBuf,

    /// Tolerance as a fraction of each edge's length.
    #[arg(long, default_value_t = ThinConfig::DEFAULT_LENGTH_FACTOR)]
    length_factor: f64,

    /// Upper bound on the per-edge tolerance.
    #[arg(long, default_value_t = ThinConfig::DEFAULT_MAX_TOLERANCE)]
    max_tolerance: f64,

    /// Edge simplification strategy.
    #[arg(long, value_enum, default_value_t = CLI_DEFAULT_SIMPLIFIER)]
    simplifier: Simplifier,

    /// Low bits per axis used for coordinate bucketing.
    #[arg(
        long,
        default_value_t = ThinConfig::DEFAULT_BUCKET_BITS,
        value_parser = clap::value_parser!(u32).range(
            i64::from(ThinConfig::MIN_BUCKET_BITS)..=i64::from(ThinConfig::MAX_BUCKET_BITS)
        ),
    )]
    bucket_bits: u32,

    /// Keep detached polygons of rows that also have connected ones.
    #[arg(long)]
    keep_detached_islands: bool,

    /// Write the thinned snapshot to this file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Output diagnostics as JSON instead of human-readable report.
    #[arg(long)]
    json: bool,

    /// Full thinning config as a JSON string.
    ///
    /// When provided, all other thinning parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,
}

/// Simplification strategy selection.
#[derive(Clone, Copy, ValueEnum)]
enum Simplifier {
    /// Douglas-Peucker that never introduces self-intersections.
    TopologyPreserving,
    /// Leave edges untouched.
    Identity,
}

/// Maps a [`SimplifierKind`] to the local CLI [`Simplifier`] enum.
const fn simplifier_from_kind(kind: SimplifierKind) -> Simplifier {
    match kind {
        SimplifierKind::TopologyPreserving => Simplifier::TopologyPreserving,
        SimplifierKind::Identity => Simplifier::Identity,
    }
}

/// The CLI default simplifier, derived from [`ThinConfig::DEFAULT_SIMPLIFIER`]
/// so the two cannot silently diverge.
const CLI_DEFAULT_SIMPLIFIER: Simplifier = simplifier_from_kind(ThinConfig::DEFAULT_SIMPLIFIER);

/// Build a [`ThinConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored. Otherwise, a config is
/// assembled from the individual flags. Either way the result is
/// validated.
fn config_from_cli(cli: &Cli) -> Result<ThinConfig, String> {
    let config = if let Some(ref json) = cli.config_json {
        serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"))?
    } else {
        ThinConfig {
            length_factor: cli.length_factor,
            max_tolerance: cli.max_tolerance,
            simplifier: match cli.simplifier {
                Simplifier::TopologyPreserving => SimplifierKind::TopologyPreserving,
                Simplifier::Identity => SimplifierKind::Identity,
            },
            bucket_bits: cli.bucket_bits,
            keep_detached_islands: cli.keep_detached_islands,
        }
    };
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

/// Thin the snapshot `cli.runs` times, printing diagnostics for each run.
///
/// Fails on the first bad config, unreadable snapshot, thinning error or
/// unwritable `--output`.
fn run(cli: &Cli) -> Result<(), String> {
    let config = config_from_cli(cli)?;
    let input = snapshot::read(&cli.snapshot_path)?;

    eprintln!(
        "Snapshot: {} ({} tables, {} rows, {} coordinates)",
        cli.snapshot_path.display(),
        input.tables.len(),
        input.row_count(),
        input.coord_count(),
    );
    eprintln!("Config: {config:#?}");
    eprintln!("Runs: {}", cli.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for index in 0..cli.runs {
        if cli.runs > 1 {
            eprintln!("--- Run {}/{} ---", index + 1, cli.runs);
        }

        let (tables, diagnostics) =
            edgethin::diagnostics::thin_with_diagnostics(input.tables.clone(), &config)
                .map_err(|e| format!("Thinning error: {e}"))?;

        if cli.json {
            let json = serde_json::to_string_pretty(&diagnostics)
                .map_err(|e| format!("Error serializing diagnostics: {e}"))?;
            println!("{json}");
        } else {
            println!("{}", diagnostics.report());
        }

        // Write the thinned snapshot on the first run only.
        if index == 0
            && let Some(ref output_path) = cli.output
        {
            let bytes = snapshot::write(output_path, &Snapshot { tables })?;
            eprintln!("Snapshot written to {} ({bytes} bytes)", output_path.display());
        }

        all_diagnostics.push(diagnostics);

        if cli.runs > 1 {
            eprintln!();
        }
    }

    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    Ok(())
}

/// Function pointer type for extracting a phase duration from diagnostics.
type PhaseExtractor = fn(&ThinDiagnostics) -> std::time::Duration;

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[ThinDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    println!();
    println!("{:<16} {:>12}", "Phase", "Mean (ms)");
    println!("{}", "-".repeat(32));

    let phase_extractors: &[(&str, PhaseExtractor)] = &[
        ("Load", |d| d.load.duration),
        ("Find Nodes", |d| d.nodes.duration),
        ("Create Edges", |d| d.edges.duration),
        ("Simplify", |d| d.simplify.duration),
        ("Reconstruct", |d| d.reconstruct.duration),
    ];

    for (name, extractor) in phase_extractors {
        let phase_mean = all_diagnostics
            .iter()
            .map(|d| extractor(d).as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{name:<16} {phase_mean:>10.3}ms");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::ffi::OsStr;

    use super::*;

    #[test]
    fn default_flags_match_default_config() {
        let cli = Cli::parse_from(["edgethin-bench", "batch.json"]);
        assert_eq!(config_from_cli(&cli).unwrap(), ThinConfig::default());
    }

    #[test]
    fn config_json_overrides_flags() {
        let cli = Cli::parse_from([
            "edgethin-bench",
            "batch.json",
            "--length-factor",
            "0.5",
            "--config-json",
            r#"{"simplifier": "identity"}"#,
        ]);
        let config = config_from_cli(&cli).unwrap();
        assert_eq!(config.simplifier, SimplifierKind::Identity);
        assert!((config.length_factor - ThinConfig::DEFAULT_LENGTH_FACTOR).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cli = Cli::parse_from([
            "edgethin-bench",
            "batch.json",
            "--config-json",
            r#"{"max_tolerance": -1.0}"#,
        ]);
        assert!(config_from_cli(&cli).is_err());
    }

    #[test]
    fn unwritable_output_fails_the_run() {
        let input = std::env::temp_dir().join("edgethin-bench-unwritable-output.json");
        std::fs::write(&input, r#"{"tables": []}"#).unwrap();
        let missing_dir = std::env::temp_dir().join("edgethin-bench-missing-dir/out.json");

        let cli = Cli::parse_from([
            OsStr::new("edgethin-bench"),
            input.as_os_str(),
            OsStr::new("--output"),
            missing_dir.as_os_str(),
        ]);
        let err = run(&cli).unwrap_err();
        assert!(err.contains("edgethin-bench-missing-dir"), "{err}");

        std::fs::remove_file(&input).unwrap();
    }

    #[test]
    fn bucket_bits_out_of_range_fails_to_parse() {
        let result = Cli::try_parse_from(["edgethin-bench", "batch.json", "--bucket-bits", "0"]);
        assert!(result.is_err());
    }
}
