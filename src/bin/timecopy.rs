//! # timecopy CLI
//!
//! Copies a hard-link based backup database from one volume to another.
//!
//! ## Usage
//! ```bash
//! # See what would happen
//! sudo timecopy --dry-run /Volumes/OldBackup /Volumes/NewBackup
//!
//! # Copy, logging every operation
//! sudo timecopy -v /Volumes/OldBackup /Volumes/NewBackup
//!
//! # Retrofit extended attributes onto an earlier copy
//! sudo timecopy --xattrs-only /Volumes/OldBackup /Volumes/NewBackup
//! ```
//!
//! ## Exit codes
//! - `0` success, possibly with per-entry failures listed in the summary
//! - `1` invalid arguments or unusable directories
//! - `2` the source holds no backup database
//! - `3` the destination chain turned out to be inconsistent
//! - `130` interrupted

use clap::Parser;
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use timecopy::utils::{format_bytes, summarize};
use timecopy::{
    DatabaseReport, InterruptFlag, ProgressEvent, Result, SnapshotMode, TimecopyBuilder,
    TimecopyError,
};
use tracing_subscriber::EnvFilter;

const EXIT_USAGE: u8 = 1;
const EXIT_NOT_A_DATABASE: u8 = 2;
const EXIT_INCONSISTENT: u8 = 3;
const EXIT_INTERRUPTED: u8 = 130;

/// Copy a backup database, preserving hard links between snapshots
#[derive(Parser)]
#[command(name = "timecopy")]
#[command(version)]
#[command(about = "Copy a hard-link based backup database to another volume")]
#[command(long_about = None)]
struct Cli {
    /// Volume holding the Backups.backupdb directory to copy
    source: PathBuf,

    /// Volume to copy the database onto
    target: PathBuf,

    /// Only show what would be done
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Log every operation
    #[arg(short, long)]
    verbose: bool,

    /// Do not copy owner and group
    #[arg(long)]
    no_owners: bool,

    /// Only copy extended attributes onto an existing copy
    #[arg(long)]
    xattrs_only: bool,

    /// Show a spinner naming the snapshot being copied
    #[arg(long)]
    progress: bool,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_logging(cli.verbose);

    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    match run(&cli) {
        Ok(report) => report_exit_code(&report),
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e.user_message());
            error_exit_code(&e)
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Main command runner
fn run(cli: &Cli) -> Result<DatabaseReport> {
    require_directory(&cli.source)?;
    require_directory(&cli.target)?;

    let interrupt = InterruptFlag::install()?;
    let spinner = cli.progress.then(new_spinner);

    let mut builder = TimecopyBuilder::new()
        .verbose(cli.verbose)
        .dry_run(cli.dry_run)
        .skip_ownership(cli.no_owners)
        .attributes_only(cli.xattrs_only)
        .interrupt(interrupt);
    if let Some(spinner) = &spinner {
        let spinner = spinner.clone();
        builder = builder.on_progress(move |event| {
            if let ProgressEvent::SnapshotStarted {
                chain,
                snapshot,
                mode,
            } = event
            {
                spinner.set_message(format!("{}/{} ({})", chain, snapshot, mode_label(*mode)));
            }
        });
    }

    if cli.dry_run && !cli.json {
        println!("{}", "Dry run: nothing will be written".yellow().bold());
    }

    let report = builder.build().copy_database(&cli.source, &cli.target);

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let report = report?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(report)
}

fn require_directory(path: &Path) -> Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        Err(TimecopyError::invalid_root(path, "not an existing directory"))
    }
}

fn new_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Scanning database...");
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

fn mode_label(mode: SnapshotMode) -> &'static str {
    match mode {
        SnapshotMode::Full => "full",
        SnapshotMode::Incremental => "incremental",
        SnapshotMode::Skipped => "already present",
        SnapshotMode::AttributesOnly => "attributes",
    }
}

fn print_summary(report: &DatabaseReport) {
    for chain in &report.chains {
        println!("{} {}", "Host".blue().bold(), chain.name.bold());
        for snapshot in &chain.snapshots {
            let marker = if snapshot.report.has_failures() {
                "!".red().bold()
            } else {
                "✓".green().bold()
            };
            println!(
                "  {} {} {} {}",
                marker,
                snapshot.name.yellow(),
                format!("[{}]", mode_label(snapshot.mode)).dimmed(),
                summarize(&snapshot.report)
            );
        }
        if let Some(latest) = &chain.latest {
            println!("  Latest -> {}", latest.cyan());
        }
    }

    if report.root.has_failures() {
        println!("{} database root: {}", "!".red().bold(), summarize(&report.root));
    }

    let totals = report.totals();
    let elapsed = (report.finished_at - report.started_at)
        .to_std()
        .unwrap_or_default();
    println!();
    println!("{}", "Summary".blue().bold());
    println!("  Files copied: {}", totals.files_copied.to_string().cyan());
    println!("  Bytes copied: {}", format_bytes(totals.bytes_copied).cyan());
    println!("  Hard links: {}", totals.hard_links.to_string().cyan());
    if report.bookkeeping_files > 0 {
        println!(
            "  Bookkeeping files: {}",
            report.bookkeeping_files.to_string().cyan()
        );
    }
    println!(
        "  Time: {}",
        format_duration(Duration::from_secs(elapsed.as_secs()))
            .to_string()
            .cyan()
    );

    let skipped = totals.skipped();
    if skipped > 0 {
        println!("  Skipped: {}", skipped.to_string().yellow());
        println!("    Unsupported: {}", totals.unsupported_skipped);
        println!("    Failed: {}", totals.failed);
    }
    if totals.consistency_errors > 0 {
        println!(
            "  {}: {}",
            "Consistency errors".red().bold(),
            totals.consistency_errors.to_string().red()
        );
    }
    if totals.metadata_warnings > 0 {
        println!(
            "  Metadata warnings: {}",
            totals.metadata_warnings.to_string().yellow()
        );
    }
    if report.interrupted {
        println!("{}", "Interrupted: partial snapshots were left in place".red().bold());
    }
}

fn report_exit_code(report: &DatabaseReport) -> ExitCode {
    if report.interrupted {
        ExitCode::from(EXIT_INTERRUPTED)
    } else if report.totals().consistency_errors > 0 {
        ExitCode::from(EXIT_INCONSISTENT)
    } else {
        ExitCode::SUCCESS
    }
}

fn error_exit_code(error: &TimecopyError) -> ExitCode {
    match error {
        TimecopyError::NotADatabase(_) => ExitCode::from(EXIT_NOT_A_DATABASE),
        TimecopyError::Interrupted => ExitCode::from(EXIT_INTERRUPTED),
        _ => ExitCode::from(EXIT_USAGE),
    }
}
