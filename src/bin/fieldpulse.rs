//! Fieldpulse CLI - Command-line interface for the reconciliation engine
//!
//! Commands:
//! - sweep: Aggregate cohort statistics over a record file
//! - classify: Count records per sub-protocol
//! - resolve: Resolve one canonical metric across records
//! - match: Propose (and optionally apply) identity links
//! - doctor: Diagnose input files and configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use fieldpulse::pipeline::{ReconcileProcessor, SweepOptions};
use fieldpulse::stats::StatExport;
use fieldpulse::store::{MemoryProfileStore, MemoryRecordStore, RecordQuery};
use fieldpulse::types::{AggregateStat, CanonicalProfile, RawRecord};
use fieldpulse::{ReconcileError, ENGINE_VERSION, PRODUCER_NAME};

/// Fieldpulse - reconcile multi-vendor performance telemetry
#[derive(Parser)]
#[command(name = "fieldpulse")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Reconcile multi-vendor athletic performance telemetry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate cohort statistics over a record file
    Sweep {
        /// Record file (use - for stdin)
        #[arg(short, long)]
        records: PathBuf,

        /// Profile file for tier cohorts (JSON array)
        #[arg(short, long)]
        profiles: Option<PathBuf>,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Page size used when draining the in-memory store
        #[arg(long, default_value = "1000")]
        page_size: usize,

        /// Skip vendor fields not covered by the metric catalog
        #[arg(long)]
        skip_unmapped: bool,

        /// Emit full-precision floats instead of rounding to 2 decimals
        #[arg(long)]
        full_precision: bool,
    },

    /// Count records per sub-protocol (including Unclassified)
    Classify {
        /// Record file (use - for stdin)
        #[arg(short, long)]
        records: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,
    },

    /// Resolve one canonical metric across records
    Resolve {
        /// Record file (use - for stdin)
        #[arg(short, long)]
        records: PathBuf,

        /// Canonical metric name, e.g. "CMJ Height (cm)"
        #[arg(short, long)]
        metric: String,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,
    },

    /// Propose identity links between records and profiles
    Match {
        /// Record file (use - for stdin)
        #[arg(short, long)]
        records: PathBuf,

        /// Profile file (JSON array)
        #[arg(short, long)]
        profiles: PathBuf,

        /// Input format
        #[arg(long, default_value = "ndjson")]
        input_format: InputFormat,

        /// Apply auto-accept proposals and write updated profiles
        #[arg(long)]
        apply: bool,

        /// Where to write updated profiles with --apply (use - for stdout)
        #[arg(long, default_value = "-")]
        output: PathBuf,
    },

    /// Diagnose input files and configuration
    Doctor {
        /// Record file to check
        #[arg(long)]
        records: Option<PathBuf>,

        /// Profile file to check
        #[arg(long)]
        profiles: Option<PathBuf>,

        /// Output report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, ValueEnum)]
enum InputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Sweep {
            records,
            profiles,
            input_format,
            page_size,
            skip_unmapped,
            full_precision,
        } => cmd_sweep(
            &records,
            profiles.as_deref(),
            input_format,
            page_size,
            skip_unmapped,
            full_precision,
        ),

        Commands::Classify {
            records,
            input_format,
        } => cmd_classify(&records, input_format),

        Commands::Resolve {
            records,
            metric,
            input_format,
        } => cmd_resolve(&records, &metric, input_format),

        Commands::Match {
            records,
            profiles,
            input_format,
            apply,
            output,
        } => cmd_match(&records, &profiles, input_format, apply, &output),

        Commands::Doctor {
            records,
            profiles,
            json,
        } => cmd_doctor(records.as_deref(), profiles.as_deref(), json),
    }
}

fn cmd_sweep(
    records_path: &Path,
    profiles_path: Option<&Path>,
    input_format: InputFormat,
    page_size: usize,
    skip_unmapped: bool,
    full_precision: bool,
) -> Result<(), CliError> {
    let records = load_records(records_path, &input_format)?;
    if records.is_empty() {
        return Err(CliError::NoRecords);
    }

    let profiles = match profiles_path {
        Some(path) => load_profiles(path)?,
        None => Vec::new(),
    };

    let store = MemoryRecordStore::new(records);
    let query = RecordQuery::new().with_page_size(page_size);
    let options = SweepOptions {
        include_unmapped: !skip_unmapped,
    };

    let mut processor = ReconcileProcessor::new();
    let summary = processor.sweep(&store, &query, &profiles, &options)?;

    let mut stats = processor.export();
    if !full_precision {
        round_export(&mut stats);
    }

    let report = serde_json::json!({
        "summary": &summary,
        "stats": stats,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    eprintln!(
        "swept {} records ({} unclassified)",
        summary.records, summary.unclassified
    );
    Ok(())
}

fn cmd_classify(records_path: &Path, input_format: InputFormat) -> Result<(), CliError> {
    let records = load_records(records_path, &input_format)?;
    if records.is_empty() {
        return Err(CliError::NoRecords);
    }

    let processor = ReconcileProcessor::new();
    let mut counts = std::collections::BTreeMap::<String, u64>::new();
    for record in &records {
        *counts
            .entry(processor.classify(record).to_string())
            .or_default() += 1;
    }

    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}

fn cmd_resolve(
    records_path: &Path,
    metric: &str,
    input_format: InputFormat,
) -> Result<(), CliError> {
    let records = load_records(records_path, &input_format)?;
    if records.is_empty() {
        return Err(CliError::NoRecords);
    }

    let processor = ReconcileProcessor::new();
    let mut resolved = 0usize;

    for record in &records {
        let value = processor.resolve_metric(record, metric)?;
        if value.is_some() {
            resolved += 1;
        }
        let line = serde_json::json!({
            "recorded_at": record.recorded_at,
            "device": record.device.as_str(),
            "value": value,
        });
        println!("{}", serde_json::to_string(&line)?);
    }

    eprintln!("resolved {}/{} records", resolved, records.len());
    Ok(())
}

fn cmd_match(
    records_path: &Path,
    profiles_path: &Path,
    input_format: InputFormat,
    apply: bool,
    output: &Path,
) -> Result<(), CliError> {
    let records = load_records(records_path, &input_format)?;
    let profiles = load_profiles(profiles_path)?;

    let store = MemoryRecordStore::new(records);
    let processor = ReconcileProcessor::new();
    let proposals = processor.propose_links(&store, &RecordQuery::new(), &profiles)?;

    println!("{}", serde_json::to_string_pretty(&proposals)?);

    if apply {
        let accepted: Vec<_> = proposals
            .iter()
            .filter(|p| p.auto_accept)
            .cloned()
            .collect();

        let mut profile_store = MemoryProfileStore::new(profiles);
        let applied = ReconcileProcessor::apply_links(&mut profile_store, &accepted)?;

        let updated = serde_json::to_string_pretty(&profile_store.into_profiles())?;
        if output.to_string_lossy() == "-" {
            print!("{}", updated);
        } else {
            fs::write(output, updated)?;
        }
        eprintln!("applied {} auto-accept links", applied);
    }

    Ok(())
}

fn cmd_doctor(
    records: Option<&Path>,
    profiles: Option<&Path>,
    json: bool,
) -> Result<(), CliError> {
    let mut checks: Vec<(String, bool, String)> = Vec::new();

    let processor = ReconcileProcessor::new();
    checks.push((
        "catalog".to_string(),
        true,
        format!("{} canonical metrics", processor.catalog().len()),
    ));

    if let Some(path) = records {
        match fs::read_to_string(path).map(|data| parse_ndjson(&data)) {
            Ok(Ok(parsed)) => checks.push((
                "records".to_string(),
                true,
                format!("{} records parsed", parsed.len()),
            )),
            Ok(Err(e)) => checks.push(("records".to_string(), false, e.to_string())),
            Err(e) => checks.push(("records".to_string(), false, e.to_string())),
        }
    }

    if let Some(path) = profiles {
        match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<Vec<CanonicalProfile>>(&data) {
                Ok(parsed) => {
                    let linked = parsed.iter().filter(|p| p.source_id.is_some()).count();
                    checks.push((
                        "profiles".to_string(),
                        true,
                        format!("{} profiles, {} linked", parsed.len(), linked),
                    ));
                }
                Err(e) => checks.push(("profiles".to_string(), false, e.to_string())),
            },
            Err(e) => checks.push(("profiles".to_string(), false, e.to_string())),
        }
    }

    let stdin_msg = if atty::is(atty::Stream::Stdin) {
        "stdin is a TTY (interactive mode)"
    } else {
        "stdin is a pipe (streaming ready)"
    };
    checks.push(("stdin".to_string(), true, stdin_msg.to_string()));

    if json {
        let report: Vec<_> = checks
            .iter()
            .map(|(name, ok, message)| {
                serde_json::json!({ "name": name, "ok": ok, "message": message })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "producer": PRODUCER_NAME,
                "version": ENGINE_VERSION,
                "checks": report,
            }))?
        );
    } else {
        println!("Fieldpulse Doctor Report");
        println!("========================");
        println!("Producer: {}", PRODUCER_NAME);
        println!("Version:  {}", ENGINE_VERSION);
        println!("\nChecks:");
        for (name, ok, message) in &checks {
            let icon = if *ok { "[OK]" } else { "[ERR]" };
            println!("  {} {}: {}", icon, name, message);
        }
    }

    if checks.iter().any(|(_, ok, _)| !ok) {
        Err(CliError::DoctorFailed)
    } else {
        Ok(())
    }
}

// Helper functions

fn read_input(path: &Path) -> Result<String, CliError> {
    if path.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

fn load_records(path: &Path, format: &InputFormat) -> Result<Vec<RawRecord>, CliError> {
    let data = read_input(path)?;
    match format {
        InputFormat::Ndjson => parse_ndjson(&data).map_err(CliError::from),
        InputFormat::Json => Ok(serde_json::from_str(&data)?),
    }
}

fn parse_ndjson(data: &str) -> Result<Vec<RawRecord>, serde_json::Error> {
    data.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(serde_json::from_str)
        .collect()
}

fn load_profiles(path: &Path) -> Result<Vec<CanonicalProfile>, CliError> {
    let data = read_input(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn round_export(export: &mut StatExport) {
    for metrics in export.values_mut() {
        for cohorts in metrics.values_mut() {
            for stat in cohorts.values_mut() {
                *stat = round_stat(*stat);
            }
        }
    }
}

fn round_stat(stat: AggregateStat) -> AggregateStat {
    let round2 = |v: f64| (v * 100.0).round() / 100.0;
    AggregateStat {
        count: stat.count,
        mean: round2(stat.mean),
        std: round2(stat.std),
        min: round2(stat.min),
        max: round2(stat.max),
    }
}

enum CliError {
    Io(io::Error),
    Json(serde_json::Error),
    Engine(ReconcileError),
    NoRecords,
    DoctorFailed,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Io(e) => write!(f, "{}", e),
            CliError::Json(e) => write!(f, "{}", e),
            CliError::Engine(e) => write!(f, "{}", e),
            CliError::NoRecords => write!(f, "no records in input"),
            CliError::DoctorFailed => write!(f, "one or more checks failed"),
        }
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        CliError::Io(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Json(e)
    }
}

impl From<ReconcileError> for CliError {
    fn from(e: ReconcileError) -> Self {
        CliError::Engine(e)
    }
}
