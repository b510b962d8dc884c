//! tally - resumable file manifests with content checksums.
//!
//! Usage:
//!   tally scan [ROOTS...]        Walk roots and checksum every file (resumes if interrupted)
//!   tally resume                 Resume the interrupted session
//!   tally checksum <LIST>        Checksum the paths listed in a candidate list
//!   tally diff <OLD> <NEW>       Compare two manifests
//!   tally verify <FILE>          Check a file against its .sha256 sidecar
//!   tally sidecar <FILE>         Write a .sha256 sidecar for a file
//!   tally history                List recorded manifests
//!   tally --help                 Show help

mod config;
mod logging;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, bail};
use tokio_util::sync::CancellationToken;

use filetally_checksum::{
    ChecksumEngine, ChecksumEvent, ChecksumJob, ChecksumProgress, EngineReport, HISTORY_FILE,
    JsonHistory, ScanSession, SessionConfig, SessionEvent, SessionMode, SessionOutcome,
    SessionStatus, Services, start_checksum, start_session,
};
use filetally_core::{ManifestKind, SidecarStatus, integrity};
use filetally_diff::{DiffEngine, DiffReport, DiffStatus, export_report};
use filetally_scan::WalkProgress;

use crate::config::TallyConfig;

#[derive(Parser)]
#[command(
    name = "tally",
    version,
    about = "Resumable file manifests with content checksums",
    long_about = "tally walks directory trees, records every file in a manifest and \
                  computes SHA-256 checksums for each one.\n\n\
                  Checksumming can be paused with Ctrl-C and resumed later, even \
                  after a restart. Two manifests can be compared with `tally diff`."
)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Walk roots and checksum every file, resuming an interrupted session first
    Scan {
        /// Roots to walk (defaults to the configured roots)
        roots: Vec<PathBuf>,

        /// Start a new walk even if an interrupted session exists
        #[arg(long)]
        fresh: bool,

        /// Directory for the generated manifests
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// Resume the interrupted session
    Resume,

    /// Checksum the paths listed in a candidate list
    Checksum {
        /// Candidate list (a path list manifest)
        list: PathBuf,

        /// Checksum manifest to create or resume (defaults to <LIST>.checksums.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare two manifests
    Diff {
        /// Older manifest
        old: PathBuf,

        /// Newer manifest
        new: PathBuf,

        /// Read both manifests as this kind instead of detecting it
        #[arg(short, long)]
        kind: Option<KindArg>,

        /// Write the differences to a CSV report
        #[arg(short, long)]
        export: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check a file against its .sha256 sidecar
    Verify {
        /// File to verify
        file: PathBuf,
    },

    /// Write a .sha256 sidecar for a file
    Sidecar {
        /// File to hash
        file: PathBuf,
    },

    /// List recorded manifests and their sidecar status
    History {
        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    /// One path per row
    List,
    /// Path, checksum and metadata per row
    Checksums,
}

impl From<KindArg> for ManifestKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::List => ManifestKind::SimpleList,
            KindArg::Checksums => ManifestKind::ChecksumManifest,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    logging::init(cli.verbose);
    let config = TallyConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Scan {
            roots,
            fresh,
            output_dir,
        } => {
            let mode = if fresh {
                SessionMode::Fresh
            } else {
                SessionMode::Auto
            };
            run_session(config, roots, output_dir, mode).await?;
        }
        Command::Resume => {
            run_session(config, Vec::new(), None, SessionMode::Resume).await?;
        }
        Command::Checksum { list, output } => {
            run_checksum(config, &list, output).await?;
        }
        Command::Diff {
            old,
            new,
            kind,
            export,
            format,
        } => {
            run_diff(&old, &new, kind, export.as_deref(), format)?;
        }
        Command::Verify { file } => {
            run_verify(&file)?;
        }
        Command::Sidecar { file } => {
            let digest = integrity::write_sidecar(&file)
                .with_context(|| format!("Failed to write sidecar for {}", file.display()))?;
            println!("{digest}  {}", integrity::sidecar_path(&file).display());
        }
        Command::History { format } => {
            run_history(&config, format)?;
        }
    }

    Ok(())
}

/// Open the file-backed services under the configured state directory.
fn open_services(config: &TallyConfig) -> Result<Services> {
    let state_dir = config.state_dir();
    std::fs::create_dir_all(&state_dir)
        .with_context(|| format!("Failed to create state directory {}", state_dir.display()))?;
    Ok(Services::in_dir(state_dir))
}

/// Cancel `cancel` on the first Ctrl-C.
fn pause_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("Pausing after the current file...");
            cancel.cancel();
        }
    });
}

/// Run or resume a scan session.
async fn run_session(
    config: TallyConfig,
    roots: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    mode: SessionMode,
) -> Result<()> {
    let services = open_services(&config)?;
    let output_dir = output_dir.unwrap_or_else(|| config.output_dir());

    let mut scan = config.scan.clone();
    if !roots.is_empty() {
        scan.roots = roots;
    }
    if scan.roots.is_empty() {
        scan.roots.push(PathBuf::from("."));
    }

    let session_config = SessionConfig::new(&output_dir)
        .with_scan(scan)
        .with_checksum(config.checksum.clone());
    let session = Arc::new(ScanSession::new(session_config, services).context("Invalid scan")?);

    if mode != SessionMode::Fresh {
        if let Some(list) = session.pending() {
            eprintln!("Resuming interrupted session {}", list.display());
        }
    }

    let cancel = CancellationToken::new();
    pause_on_ctrl_c(cancel.clone());

    let mut rx = start_session(session, mode, cancel);
    let mut outcome = None;
    while let Some(event) = rx.recv().await {
        match event {
            SessionEvent::Walk(progress) => print_walk_progress(&progress),
            SessionEvent::Checksum(progress) => print_checksum_progress(&progress),
            SessionEvent::Complete(result) => outcome = Some(result),
        }
    }
    eprintln!();

    let Some(outcome) = outcome else {
        bail!("Session ended without a result");
    };
    print_outcome(&outcome.context("Session failed")?);
    Ok(())
}

/// Checksum an existing candidate list.
async fn run_checksum(config: TallyConfig, list: &Path, output: Option<PathBuf>) -> Result<()> {
    let services = open_services(&config)?;
    let job = match output {
        Some(output) => ChecksumJob::from_list_to(list, output),
        None => ChecksumJob::from_list(list),
    }
    .with_context(|| format!("Failed to read candidate list {}", list.display()))?;

    let engine = Arc::new(ChecksumEngine::new(config.checksum.clone(), services));
    let cancel = CancellationToken::new();
    pause_on_ctrl_c(cancel.clone());

    let mut rx = start_checksum(engine, job, cancel);
    let mut report = None;
    while let Some(event) = rx.recv().await {
        match event {
            ChecksumEvent::Progress(progress) => print_checksum_progress(&progress),
            ChecksumEvent::Complete(result) => report = Some(result),
        }
    }
    eprintln!();

    let Some(report) = report else {
        bail!("Checksum run ended without a result");
    };
    print_report(&report.context("Checksum run failed")?);
    Ok(())
}

fn print_walk_progress(progress: &WalkProgress) {
    eprint!(
        "\rWalking: {} files, {} directories, {} warnings",
        progress.files_found, progress.dirs_walked, progress.warnings_count
    );
    let _ = std::io::stderr().flush();
}

fn print_checksum_progress(progress: &ChecksumProgress) {
    eprint!(
        "\rHashing: {}/{} files ({:.1}%), {} read, {:.0} files/s",
        progress.files_hashed,
        progress.files_total,
        progress.percentage(),
        format_size(progress.bytes_hashed),
        progress.files_per_second()
    );
    let _ = std::io::stderr().flush();
}

fn print_outcome(outcome: &SessionOutcome) {
    println!();
    println!("{}", "─".repeat(60));
    match outcome.status {
        SessionStatus::Completed => println!(" Session complete"),
        SessionStatus::Paused => println!(" Session paused (run `tally resume` to continue)"),
        SessionStatus::WalkCancelled => println!(" Walk cancelled, nothing was saved"),
    }
    println!("{}", "─".repeat(60));

    if !outcome.resumed && outcome.status != SessionStatus::WalkCancelled {
        println!(
            " Walked {} files in {:.2}s",
            outcome.files_found,
            outcome.walk_duration.as_secs_f64()
        );
    }
    if let Some(list) = &outcome.candidate_list {
        println!(" Candidate list: {}", list.display());
    }
    if !outcome.warnings.is_empty() {
        println!(" {} warning(s) during walk:", outcome.warnings.len());
        for warning in outcome.warnings.iter().take(10) {
            println!("   {}: {}", warning.path.display(), warning.message);
        }
        if outcome.warnings.len() > 10 {
            println!("   ... and {} more", outcome.warnings.len() - 10);
        }
    }
    if let Some(report) = &outcome.report {
        print_report(report);
    }
}

fn print_report(report: &EngineReport) {
    println!(" Checksum manifest: {}", report.output.display());
    println!(
        " {} of {} files recorded ({} this run, {} already done)",
        report.candidates - report.remaining - report.skipped,
        report.candidates,
        report.hashed,
        report.already_processed
    );
    println!(
        " {} hashed in {:.2}s",
        format_size(report.bytes_hashed),
        report.duration.as_secs_f64()
    );
    if report.errors > 0 {
        println!(" {} file(s) could not be read and were recorded as ERROR", report.errors);
    }
    if report.skipped > 0 {
        println!(" {} file(s) skipped: their names cannot be stored in a manifest", report.skipped);
    }
    println!(" Status: {}", report.status);
}

/// Compare two manifests.
fn run_diff(
    old: &Path,
    new: &Path,
    kind: Option<KindArg>,
    export: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let engine = match kind {
        Some(kind) => DiffEngine::with_kind(kind.into()),
        None => DiffEngine::new(),
    };
    let report = engine
        .compare_files(old, new)
        .context("Failed to compare manifests")?;

    match format {
        OutputFormat::Text => print_diff(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if let Some(path) = export {
        export_report(&report.entries, path)?;
        eprintln!("Report written to {}", path.display());
    }
    Ok(())
}

fn print_diff(report: &DiffReport) {
    println!();
    println!("{}", "─".repeat(70));
    println!(" Manifest comparison ({})", report.kind);
    println!("{}", "─".repeat(70));
    println!();

    if report.is_empty() {
        println!(" No differences found.");
    } else {
        for entry in &report.entries {
            println!(" {:<8} {}  ({})", entry.status, entry.path, entry.detail);
        }
        println!();
        println!(
            " {} added, {} changed, {} missing",
            report.count(DiffStatus::Added),
            report.count(DiffStatus::Changed),
            report.count(DiffStatus::Missing)
        );
    }
    if report.malformed > 0 {
        println!(" {} malformed row(s) skipped", report.malformed);
    }
}

/// Verify a file against its sidecar.
fn run_verify(file: &Path) -> Result<()> {
    let status = integrity::sidecar_status(file);
    println!("{status}: {}", file.display());
    match status {
        SidecarStatus::Verified => Ok(()),
        SidecarStatus::Error => {
            integrity::verify_sidecar(file)
                .with_context(|| format!("Failed to verify {}", file.display()))?;
            bail!("Verification failed: {status}")
        }
        other => bail!("Verification failed: {other}"),
    }
}

/// List recorded manifests.
fn run_history(config: &TallyConfig, format: OutputFormat) -> Result<()> {
    let history = JsonHistory::new(config.state_dir().join(HISTORY_FILE));
    let entries = history.entries();

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("No manifests recorded in {}", history.path().display());
                return Ok(());
            }
            for entry in &entries {
                let status = integrity::sidecar_status(&entry.file_path);
                println!(
                    "{}  {:<16}  {:<12}  {}",
                    entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    entry.kind,
                    status,
                    entry.file_path.display()
                );
            }
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
