//! Run orchestration
//!
//! Wires enumeration → clustering → pre-flight → prompt → the scoring and
//! replication pools, and drains the result funnel. The first fatal error
//! cancels the remaining workers and surfaces; the "already copied"
//! shortcut is not an error.

use crate::config::{parse_shutter_speed, ClusterOpts, CopyOpts};
use crate::db::MetadataStore;
use crate::error::{Error, Result};
use crate::models::{MediaDescriptor, MediaKind, MediaLibrary, RunFacts};
use crate::services::cluster::cluster_media;
use crate::services::progress::ProgressReporter;
use crate::services::prompt::Prompter;
use crate::services::replication::ReplicationStage;
use crate::services::scoring::ScoringStage;
use crate::services::{CopyOutcome, DescriptorFailure, PipelineMessage};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What a finished run did, for the caller and for tests
#[derive(Debug, Default)]
pub struct RunReport {
    pub declined: bool,
    pub clusters: u64,
    pub copied_files: usize,
    pub copied_bytes: u64,
    pub already_copied: usize,
    pub photos_copied: usize,
    pub raws_copied: usize,
    pub videos_copied: usize,
    /// Errors observed after the first fatal one
    pub trailing_errors: Vec<String>,
}

impl RunReport {
    fn declined() -> Self {
        Self {
            declined: true,
            ..Default::default()
        }
    }

    fn record_copied(&mut self, kind: MediaKind, bytes: u64) {
        self.copied_files += 1;
        self.copied_bytes += bytes;
        match kind {
            MediaKind::Photo => self.photos_copied += 1,
            MediaKind::Raw => self.raws_copied += 1,
            MediaKind::Video => self.videos_copied += 1,
            MediaKind::Unknown => {}
        }
    }
}

/// Free space on the filesystem holding `dest`, probed against the nearest
/// existing ancestor so a not-yet-created destination can still be checked
/// without writing anything.
pub fn probe_free_space(dest: &Path) -> Result<u64> {
    let mut probe = dest;
    loop {
        if probe.as_os_str().is_empty() {
            break;
        }
        if probe.exists() {
            return fs2::available_space(probe).map_err(|e| {
                Error::Preflight(format!(
                    "free-space probe failed for {}: {}",
                    probe.display(),
                    e
                ))
            });
        }
        match probe.parent() {
            Some(parent) => probe = parent,
            None => break,
        }
    }
    fs2::available_space(Path::new("."))
        .map_err(|e| Error::Preflight(format!("free-space probe failed: {}", e)))
}

/// The `cluster` command: burst folders with score-prefixed photo names.
pub async fn run_cluster(opts: &ClusterOpts, prompter: &dyn Prompter) -> Result<RunReport> {
    opts.validate()?;
    let free_space = probe_free_space(&opts.to)?;
    run_cluster_with_free_space(opts, prompter, free_space).await
}

async fn run_cluster_with_free_space(
    opts: &ClusterOpts,
    prompter: &dyn Prompter,
    free_space: u64,
) -> Result<RunReport> {
    let library = Arc::new(MediaLibrary::from_glob(&opts.from)?);
    let facts = RunFacts::gather(library.iter(), free_space);
    if !facts.has_room() {
        return Err(Error::Preflight(format!(
            "not enough free space under {} to copy files: {} vs {} bytes",
            opts.to.display(),
            facts.free_space,
            facts.size
        )));
    }

    let plan = cluster_media(&library, opts.max_seconds_diff, opts.min_points);
    tracing::info!(
        media = library.len(),
        clustered = plan.media_count(),
        clusters = plan.cluster_count,
        "pre-flight complete"
    );

    let summary = facts.summary(plan.cluster_count);
    if opts.assume_yes {
        tracing::info!("{}", summary);
    } else if !prompter.confirm(&summary)? {
        tracing::info!("declined at prompt, nothing copied");
        return Ok(RunReport::declined());
    }

    let store = MetadataStore::open(&opts.to).await?;
    // Burst directories are single-writer idempotent creations; doing them
    // up front keeps the copy workers out of each other's way.
    for burst in 0..plan.cluster_count {
        tokio::fs::create_dir_all(opts.to.join(burst.to_string())).await?;
    }

    let progress = Arc::new(ProgressReporter::new(&facts, opts.show_progress));
    let cancel = CancellationToken::new();
    spawn_interrupt_listener(cancel.clone());
    let capacity = plan.media_count().max(1);

    let (scored_tx, scored_rx) = mpsc::channel::<PipelineMessage>(capacity);
    let (results_tx, results_rx) = mpsc::channel::<CopyOutcome>(capacity);

    let scoring = ScoringStage {
        workers: opts.score_workers,
        store: store.clone(),
        library: Arc::clone(&library),
        cancel: cancel.clone(),
    };
    let replication = ReplicationStage {
        workers: opts.copy_workers,
        root: opts.to.clone(),
        store: store.clone(),
        progress,
        cancel: cancel.clone(),
    };

    let cluster_count = plan.cluster_count;
    let scoring_handle = tokio::spawn(scoring.run(plan.descriptors, scored_tx));
    let replication_handle = tokio::spawn(replication.run(scored_rx, results_tx));

    let (report, fatal) = drain_results(results_rx, &cancel, cluster_count).await;

    let _ = scoring_handle.await;
    let _ = replication_handle.await;
    store.close().await;

    match fatal {
        Some(failure) => Err(failure.into_error()),
        None if cancel.is_cancelled() => Err(Error::Cancelled),
        None => Ok(report),
    }
}

/// The `copy` command: flat filtered replication, no clustering or scoring.
pub async fn run_copy(opts: &CopyOpts, prompter: &dyn Prompter) -> Result<RunReport> {
    opts.validate()?;
    let free_space = probe_free_space(&opts.to)?;
    run_copy_with_free_space(opts, prompter, free_space).await
}

async fn run_copy_with_free_space(
    opts: &CopyOpts,
    prompter: &dyn Prompter,
    free_space: u64,
) -> Result<RunReport> {
    let library = MediaLibrary::from_glob(&opts.from)?;
    let selected: Vec<MediaDescriptor> = library
        .iter()
        .filter(|d| selected_by_filters(d, opts))
        .cloned()
        .collect();

    let facts = RunFacts::gather(selected.iter(), free_space);
    if !facts.has_room() {
        return Err(Error::Preflight(format!(
            "not enough free space under {} to copy files: {} vs {} bytes",
            opts.to.display(),
            facts.free_space,
            facts.size
        )));
    }

    tracing::info!(
        matched = library.len(),
        selected = selected.len(),
        "copy pre-flight complete"
    );

    let summary = format!(
        "Badger 🦡\n\nBadger will copy {} of {} matched media files ({:.2} gigabytes) into {}.",
        selected.len(),
        library.len(),
        facts.size as f64 / 1e9,
        opts.to.display(),
    );
    if opts.assume_yes {
        tracing::info!("{}", summary);
    } else if !prompter.confirm(&summary)? {
        tracing::info!("declined at prompt, nothing copied");
        return Ok(RunReport::declined());
    }

    let store = MetadataStore::open(&opts.to).await?;
    let progress = Arc::new(ProgressReporter::new(&facts, opts.show_progress));
    let cancel = CancellationToken::new();
    spawn_interrupt_listener(cancel.clone());
    let capacity = selected.len().max(1);

    let (scored_tx, scored_rx) = mpsc::channel::<PipelineMessage>(capacity);
    let (results_tx, results_rx) = mpsc::channel::<CopyOutcome>(capacity);

    let replication = ReplicationStage {
        workers: opts.copy_workers,
        root: opts.to.clone(),
        store: store.clone(),
        progress,
        cancel: cancel.clone(),
    };

    let feeder_cancel = cancel.clone();
    let feeder = tokio::spawn(async move {
        for descriptor in selected {
            if feeder_cancel.is_cancelled() {
                break;
            }
            if scored_tx.send(Ok(descriptor)).await.is_err() {
                break;
            }
        }
    });
    let replication_handle = tokio::spawn(replication.run(scored_rx, results_tx));

    let (report, fatal) = drain_results(results_rx, &cancel, 0).await;

    let _ = feeder.await;
    let _ = replication_handle.await;
    store.close().await;

    match fatal {
        Some(failure) => Err(failure.into_error()),
        None if cancel.is_cancelled() => Err(Error::Cancelled),
        None => Ok(report),
    }
}

/// One run-scoped cancellation signal: an interrupt cancels every worker.
/// Workers finish their in-flight file before exiting so no half-written
/// destination is left behind.
fn spawn_interrupt_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling workers");
            cancel.cancel();
        }
    });
}

fn selected_by_filters(descriptor: &MediaDescriptor, opts: &CopyOpts) -> bool {
    if !opts.media.matches(descriptor.kind()) {
        return false;
    }
    if let Some(max_iso) = opts.max_iso {
        let iso = descriptor
            .exif()
            .and_then(|e| e.iso.as_ref())
            .and_then(|s| s.trim().parse::<i64>().ok());
        match iso {
            Some(iso) if iso <= max_iso => {}
            _ => return false,
        }
    }
    if let Some(min_speed) = &opts.min_shutter_speed {
        let Some(bound) = parse_shutter_speed(min_speed) else {
            return false;
        };
        let speed = descriptor
            .exif()
            .and_then(|e| e.shutter_speed.as_ref())
            .and_then(|s| parse_shutter_speed(s));
        // "At least 1/250" keeps exposures no longer than the bound.
        match speed {
            Some(speed) if speed <= bound => {}
            _ => return false,
        }
    }
    true
}

/// Fan the outcome funnel into a report. The channel closes when every
/// replication worker has finished, so nothing in flight can be missed.
async fn drain_results(
    mut results: mpsc::Receiver<CopyOutcome>,
    cancel: &CancellationToken,
    clusters: u64,
) -> (RunReport, Option<DescriptorFailure>) {
    let mut report = RunReport {
        clusters,
        ..Default::default()
    };
    let mut fatal: Option<DescriptorFailure> = None;

    while let Some(outcome) = results.recv().await {
        match outcome {
            CopyOutcome::Copied { kind, bytes } => report.record_copied(kind, bytes),
            CopyOutcome::AlreadyCopied { .. } => report.already_copied += 1,
            CopyOutcome::Cancelled => {}
            CopyOutcome::Failed(failure) => {
                tracing::error!(
                    source = %failure.source.display(),
                    error = %failure.error,
                    "pipeline error"
                );
                if fatal.is_none() {
                    cancel.cancel();
                    fatal = Some(failure);
                } else {
                    report.trailing_errors.push(failure.to_string());
                }
            }
        }
    }
    (report, fatal)
}
