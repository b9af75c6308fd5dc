//! Snapshot chain orchestration
//!
//! [`Timecopy`] replicates a whole backup database: for every backed-up host
//! it walks the snapshot chain oldest first, copies the first snapshot in
//! full and every later one incrementally against its predecessor, then
//! points the host's `Latest` marker at the newest snapshot it completed.
//!
//! Snapshots that already exist at the destination are left alone, so an
//! interrupted run can simply be started again.

use crate::attributes::AttributeCopy;
use crate::copier::EntryCopier;
use crate::database::BackupDatabase;
use crate::entry::Entry;
use crate::error::{Result, TimecopyError};
use crate::full_copy::FullCopy;
use crate::incremental::{IncrementalCopy, IncrementalRoots};
use crate::interrupt::InterruptFlag;
use crate::latest::{update_latest, InvokingUserRemover, MarkerRemover};
use crate::metadata::{MetadataReplicator, OwnershipSetter, SystemOwnership};
use crate::types::*;
use crate::utils::summarize;
use crate::walker::record_failure;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Callback receiving [`ProgressEvent`]s
pub type ProgressCallback = Box<dyn Fn(&ProgressEvent) + Send + Sync>;

/// One host's snapshots, on both sides of the copy
#[derive(Debug, Clone)]
pub struct SnapshotChain {
    /// Chain name, usually the host name
    pub name: String,
    /// Host directory in the source database
    pub source_dir: PathBuf,
    /// Host directory in the destination database
    pub destination_dir: PathBuf,
    /// Snapshot names, oldest first
    pub snapshots: Vec<String>,
}

impl SnapshotChain {
    /// Create a chain; snapshot names are sorted so the oldest comes first
    pub fn new(
        name: impl Into<String>,
        source_dir: impl Into<PathBuf>,
        destination_dir: impl Into<PathBuf>,
        mut snapshots: Vec<String>,
    ) -> Self {
        snapshots.sort();
        snapshots.dedup();
        Self {
            name: name.into(),
            source_dir: source_dir.into(),
            destination_dir: destination_dir.into(),
            snapshots,
        }
    }
}

/// Source and destination of the last snapshot in place at the destination
struct Previous {
    source: PathBuf,
    destination: PathBuf,
}

/// Replicates backup databases
///
/// # Examples
///
/// ```rust,no_run
/// use timecopy::TimecopyBuilder;
/// use std::path::Path;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let timecopy = TimecopyBuilder::new().verbose(true).build();
/// let report = timecopy.copy_database(Path::new("/Volumes/Old"), Path::new("/Volumes/New"))?;
/// println!("{} files copied", report.totals().files_copied);
/// # Ok(())
/// # }
/// ```
pub struct Timecopy {
    options: CopyOptions,
    replicator: MetadataReplicator,
    interrupt: Option<InterruptFlag>,
    marker_remover: Box<dyn MarkerRemover>,
    progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for Timecopy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timecopy")
            .field("options", &self.options)
            .field("interrupt", &self.interrupt)
            .finish_non_exhaustive()
    }
}

impl Timecopy {
    /// Create an engine with `options` and default collaborators
    pub fn new(options: CopyOptions) -> Self {
        TimecopyBuilder::new().options(options).build()
    }

    /// Options in effect
    pub fn options(&self) -> &CopyOptions {
        &self.options
    }

    /// Replicate the database on `source_volume` onto `destination_volume`
    ///
    /// The destination database and host directories are created as needed.
    /// Per-entry failures are counted in the returned report rather than
    /// returned as errors; only unusable roots fail the call.
    pub fn copy_database(
        &self,
        source_volume: &Path,
        destination_volume: &Path,
    ) -> Result<DatabaseReport> {
        if !destination_volume.is_dir() {
            return Err(TimecopyError::invalid_root(
                destination_volume,
                "not an existing directory",
            ));
        }
        let source = BackupDatabase::open(source_volume)?;
        let destination_root = BackupDatabase::root_on(destination_volume);
        let started_at = Utc::now();
        info!("Copying {:?} to {:?}", source.root(), destination_root);

        let mut root = CopyReport::default();
        if !self.options.attributes_only {
            self.ensure_directory(source.root(), &destination_root, &mut root)?;
        }

        let mut chains = Vec::new();
        let mut interrupted = false;
        for host in source.hosts()? {
            let snapshots = source.snapshots(&host)?;
            if snapshots.is_empty() {
                info!("No snapshots for {}", host);
                continue;
            }
            let source_dir = source.host_dir(&host);
            let destination_dir = destination_root.join(&host);
            if !self.options.attributes_only {
                self.ensure_directory(&source_dir, &destination_dir, &mut root)?;
            }

            let chain = SnapshotChain::new(host, source_dir, destination_dir, snapshots);
            let report = self.copy_chain(&chain)?;
            if !self.options.attributes_only {
                // New snapshots and Latest changed the host directory's times
                self.finish_directory(&chain.source_dir, &chain.destination_dir, &mut root);
            }
            interrupted = report.interrupted;
            chains.push(report);
            if interrupted {
                break;
            }
        }

        let mut bookkeeping_files = 0;
        if !interrupted && !self.options.attributes_only {
            let bookkeeping = self.copy_bookkeeping(&source, &destination_root)?;
            bookkeeping_files = bookkeeping.files_copied;
            root.merge(&bookkeeping);
        }
        if !self.options.attributes_only {
            self.finish_directory(source.root(), &destination_root, &mut root);
        }

        Ok(DatabaseReport {
            source: source_volume.to_path_buf(),
            destination: destination_volume.to_path_buf(),
            chains,
            root,
            bookkeeping_files,
            interrupted,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Replicate one snapshot chain
    ///
    /// `chain.destination_dir` must already exist unless this is a dry run.
    /// An interrupt stops the chain and leaves `Latest` untouched; the
    /// returned report then has `interrupted` set.
    pub fn copy_chain(&self, chain: &SnapshotChain) -> Result<ChainReport> {
        let mut report = ChainReport {
            name: chain.name.clone(),
            ..Default::default()
        };
        let mut previous: Option<Previous> = None;
        let mut last_completed: Option<&str> = None;

        for name in &chain.snapshots {
            if self.interrupt.as_ref().is_some_and(InterruptFlag::is_raised) {
                report.interrupted = true;
                break;
            }

            let source = chain.source_dir.join(name);
            let destination = chain.destination_dir.join(name);
            let exists = Entry::stat_if_exists(&destination)?.is_some();
            let mode = match (&previous, exists) {
                _ if self.options.attributes_only => SnapshotMode::AttributesOnly,
                (_, true) => SnapshotMode::Skipped,
                (None, false) => SnapshotMode::Full,
                (Some(_), false) => SnapshotMode::Incremental,
            };

            self.notify(ProgressEvent::SnapshotStarted {
                chain: chain.name.clone(),
                snapshot: name.clone(),
                mode,
            });
            let started = Instant::now();
            let outcome = match mode {
                SnapshotMode::Skipped => {
                    info!("Skipping {} (already present at the destination)", name);
                    Ok(CopyReport::default())
                }
                SnapshotMode::AttributesOnly if !exists => {
                    warn!("Skipping attributes of {}: not present at the destination", name);
                    Ok(CopyReport::default())
                }
                SnapshotMode::AttributesOnly => {
                    info!("Copying extended attributes of {}", name);
                    let reference = previous.as_ref().map(|p| p.source.as_path());
                    let mut pass =
                        AttributeCopy::new(&source, &destination, reference, self.copier());
                    self.finish(pass.run(), &source, pass.into_report())
                }
                SnapshotMode::Full | SnapshotMode::Incremental => {
                    info!("Copying {} ({:?})", name, mode);
                    self.copy_snapshot(&source, &destination, previous.as_ref())
                }
            };
            let duration = started.elapsed();
            self.notify(ProgressEvent::SnapshotFinished {
                chain: chain.name.clone(),
                snapshot: name.clone(),
            });

            match outcome {
                Ok(counters) => {
                    info!(
                        "Finished {} in {}: {}",
                        name,
                        humantime::format_duration(round_to_millis(duration)),
                        summarize(&counters)
                    );
                    report.snapshots.push(snapshot_report(name, mode, counters, duration));
                }
                Err((counters, e)) if e.is_interrupt() => {
                    warn!("Interrupted while copying {}", name);
                    report.snapshots.push(snapshot_report(name, mode, counters, duration));
                    report.interrupted = true;
                    break;
                }
                Err((counters, e)) => {
                    // Without its root the snapshot cannot anchor the next one
                    error!("Giving up on {} and the rest of {}: {}", name, chain.name, e);
                    report.snapshots.push(snapshot_report(name, mode, counters, duration));
                    break;
                }
            }

            previous = Some(Previous {
                source,
                destination,
            });
            last_completed = Some(name);
        }

        if report.interrupted || self.options.attributes_only {
            return Ok(report);
        }
        if let Some(latest) = last_completed {
            match update_latest(
                &chain.destination_dir,
                latest,
                &self.options,
                self.marker_remover.as_ref(),
            ) {
                Ok(()) => report.latest = Some(latest.to_string()),
                Err(e) => error!("Cannot update Latest for {}: {}", chain.name, e),
            }
        }
        Ok(report)
    }

    /// Copy bookkeeping files missing from `destination_root`
    ///
    /// Files that cannot be copied are logged and counted in the returned
    /// report; `files_copied` is the number of files copied.
    pub fn copy_bookkeeping(
        &self,
        source: &BackupDatabase,
        destination_root: &Path,
    ) -> Result<CopyReport> {
        let mut copier = self.copier();
        for path in source.bookkeeping_files()? {
            let Some(file_name) = path.file_name() else {
                continue;
            };
            let destination = destination_root.join(file_name);
            if Entry::stat_if_exists(&destination)?.is_some() {
                continue;
            }
            let outcome = Entry::stat(&path).and_then(|entry| copier.copy_file(&entry, &destination));
            if let Err(e) = outcome {
                record_failure(copier.report_mut(), &path, &e);
            }
        }
        Ok(copier.into_report())
    }

    /// Create the snapshot root, then fill it with the chosen strategy
    fn copy_snapshot(
        &self,
        source: &Path,
        destination: &Path,
        previous: Option<&Previous>,
    ) -> std::result::Result<CopyReport, (CopyReport, TimecopyError)> {
        let root = match Entry::stat(source) {
            Ok(root) => root,
            Err(e) => return Err((CopyReport::default(), e)),
        };
        let mut copier = self.copier();
        if let Err(e) = copier.make_directory(&root, destination) {
            return Err((copier.into_report(), e));
        }

        let (outcome, mut counters) = match previous {
            None => {
                let mut strategy = FullCopy::new(source, destination, copier);
                (strategy.run(), strategy.into_report())
            }
            Some(previous) => {
                let roots = IncrementalRoots {
                    source: source.to_path_buf(),
                    reference: previous.source.clone(),
                    previous_destination: previous.destination.clone(),
                    destination: destination.to_path_buf(),
                };
                let mut strategy = IncrementalCopy::new(&roots, copier);
                (strategy.run(), strategy.into_report())
            }
        };

        if !self.options.dry_run {
            for e in self.replicator.finish_directory(&root, destination).failures {
                warn!("{}", e);
                counters.metadata_warnings += 1;
            }
        }
        self.finish(outcome, source, counters)
    }

    /// Pair a strategy outcome with its counters
    fn finish(
        &self,
        outcome: Result<()>,
        source: &Path,
        mut counters: CopyReport,
    ) -> std::result::Result<CopyReport, (CopyReport, TimecopyError)> {
        match outcome {
            Ok(()) => Ok(counters),
            Err(e) if e.is_interrupt() => Err((counters, e)),
            Err(e) => {
                record_failure(&mut counters, source, &e);
                Ok(counters)
            }
        }
    }

    /// Create `destination` as a copy of the directory `source` if it is missing
    fn ensure_directory(
        &self,
        source: &Path,
        destination: &Path,
        report: &mut CopyReport,
    ) -> Result<()> {
        if Entry::stat_if_exists(destination)?.is_some() {
            return Ok(());
        }
        let entry = Entry::stat(source)?;
        let mut copier = self.copier();
        let outcome = copier.make_directory(&entry, destination);
        report.merge(copier.report());
        outcome
    }

    /// Apply the final mode and times of a directory made by `ensure_directory`
    fn finish_directory(&self, source: &Path, destination: &Path, report: &mut CopyReport) {
        let entry = match Entry::stat(source) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("{}", e);
                report.metadata_warnings += 1;
                return;
            }
        };
        let mut copier = self.copier();
        copier.finish_directory(&entry, destination);
        report.merge(copier.report());
    }

    fn copier(&self) -> EntryCopier<'_> {
        EntryCopier::new(&self.options, &self.replicator).with_interrupt(self.interrupt.as_ref())
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(callback) = &self.progress {
            callback(&event);
        }
    }
}

fn round_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}

fn snapshot_report(
    name: &str,
    mode: SnapshotMode,
    report: CopyReport,
    duration: Duration,
) -> SnapshotReport {
    SnapshotReport {
        name: name.to_string(),
        mode,
        report,
        duration,
    }
}

/// Builder for [`Timecopy`]
///
/// # Examples
///
/// ```rust
/// use timecopy::TimecopyBuilder;
/// use std::time::Duration;
///
/// let timecopy = TimecopyBuilder::new()
///     .dry_run(true)
///     .skip_ownership(true)
///     .ownership_retry_delay(Duration::from_millis(100))
///     .build();
/// assert!(timecopy.options().dry_run);
/// ```
pub struct TimecopyBuilder {
    options: CopyOptions,
    interrupt: Option<InterruptFlag>,
    marker_remover: Option<Box<dyn MarkerRemover>>,
    ownership_setter: Option<Box<dyn OwnershipSetter>>,
    progress: Option<ProgressCallback>,
}

impl TimecopyBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self {
            options: CopyOptions::default(),
            interrupt: None,
            marker_remover: None,
            ownership_setter: None,
            progress: None,
        }
    }

    /// Replace all options at once
    pub fn options(mut self, options: CopyOptions) -> Self {
        self.options = options;
        self
    }

    /// Log every operation at `info`
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.options.verbose = verbose;
        self
    }

    /// Traverse and log without writing anything
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.options.dry_run = dry_run;
        self
    }

    /// Leave owner and group of copied entries alone
    pub fn skip_ownership(mut self, skip: bool) -> Self {
        self.options.skip_ownership = skip;
        self
    }

    /// Only copy extended attributes onto an existing destination
    pub fn attributes_only(mut self, attributes_only: bool) -> Self {
        self.options.attributes_only = attributes_only;
        self
    }

    /// Delay before retrying a denied ownership change
    pub fn ownership_retry_delay(mut self, delay: Duration) -> Self {
        self.options.ownership_retry_delay = delay;
        self
    }

    /// Stop at the next entry once `flag` is raised
    pub fn interrupt(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = Some(flag);
        self
    }

    /// Fallback used when `Latest` cannot be removed directly
    pub fn marker_remover(mut self, remover: Box<dyn MarkerRemover>) -> Self {
        self.marker_remover = Some(remover);
        self
    }

    /// How owner and group are applied
    pub fn ownership_setter(mut self, setter: Box<dyn OwnershipSetter>) -> Self {
        self.ownership_setter = Some(setter);
        self
    }

    /// Receive a [`ProgressEvent`] around every snapshot
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressEvent) + Send + Sync + 'static,
    {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Build the engine
    pub fn build(self) -> Timecopy {
        let ownership = self
            .ownership_setter
            .unwrap_or_else(|| Box::new(SystemOwnership));
        Timecopy {
            replicator: MetadataReplicator::with_ownership_setter(&self.options, ownership),
            options: self.options,
            interrupt: self.interrupt,
            marker_remover: self
                .marker_remover
                .unwrap_or_else(|| Box::new(InvokingUserRemover)),
            progress: self.progress,
        }
    }
}

impl Default for TimecopyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
