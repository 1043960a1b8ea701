//! Replication stage
//!
//! I/O-bound half of the pipeline. A small fixed pool consumes scored
//! descriptors, streams bytes into the destination tree, upserts a
//! metadata row per copied file and feeds the progress reporter. Errors
//! never abort a worker here; every message produces exactly one outcome
//! on the result funnel, and the funnel closes when the stage finishes.

use crate::db::{insert_error_for_file, MetadataRow, MetadataStore};
use crate::error::Error;
use crate::models::MediaDescriptor;
use crate::services::progress::ProgressReporter;
use crate::services::{CopyOutcome, DescriptorFailure, PipelineMessage};
use futures::StreamExt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

const COPY_BUFFER_BYTES: usize = 1024 * 1024;
const COPY_RETRIES: u32 = 2;
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

pub struct ReplicationStage {
    pub workers: usize,
    pub root: PathBuf,
    pub store: MetadataStore,
    pub progress: Arc<ProgressReporter>,
    pub cancel: CancellationToken,
}

impl ReplicationStage {
    /// Consume scored messages until the input channel closes, sending one
    /// outcome per message into `results`.
    pub async fn run(
        self,
        input: mpsc::Receiver<PipelineMessage>,
        results: mpsc::Sender<CopyOutcome>,
    ) {
        let workers = self.workers.max(1);
        let stage = Arc::new(self);
        ReceiverStream::new(input)
            .for_each_concurrent(workers, |message| {
                let stage = Arc::clone(&stage);
                let results = results.clone();
                async move {
                    let outcome = stage.handle(message).await;
                    let _ = results.send(outcome).await;
                }
            })
            .await;
    }

    async fn handle(&self, message: PipelineMessage) -> CopyOutcome {
        let descriptor = match message {
            Ok(descriptor) => descriptor,
            Err(failure) => return CopyOutcome::Failed(failure),
        };
        // Cancellation lands between files; an in-flight copy always runs
        // to completion so no half-written destination is left behind.
        if self.cancel.is_cancelled() {
            return CopyOutcome::Cancelled;
        }
        match self.replicate(descriptor).await {
            Ok(outcome) => outcome,
            Err(failure) => CopyOutcome::Failed(failure),
        }
    }

    async fn replicate(
        &self,
        descriptor: MediaDescriptor,
    ) -> Result<CopyOutcome, DescriptorFailure> {
        let source = descriptor.source().to_path_buf();
        let kind = descriptor.kind();
        let destination = descriptor.destination_path(&self.root);

        let (descriptor, hash) = tokio::task::spawn_blocking(move || {
            let hash = descriptor.content_hash();
            let _ = descriptor.exif();
            (descriptor, hash)
        })
        .await
        .map_err(|e| DescriptorFailure::new(source.clone(), Error::Descriptor(e.to_string())))?;
        let hash = hash.map_err(|e| DescriptorFailure::new(source.clone(), e))?;

        // Already replicated by an earlier run: destination present and the
        // stored row still describes these source bytes.
        if tokio::fs::try_exists(&destination).await.unwrap_or(false) {
            if let Ok(Some(row)) = self.store.lookup(&descriptor.source_key()).await {
                if row.hash == hash {
                    tracing::debug!(
                        source = %source.display(),
                        destination = %destination.display(),
                        "destination up to date, skipping copy"
                    );
                    self.progress.record(kind, descriptor.size_bytes());
                    return Ok(CopyOutcome::AlreadyCopied { kind });
                }
            }
        }

        let metadata = tokio::fs::metadata(&source)
            .await
            .map_err(|e| DescriptorFailure::new(source.clone(), e.into()))?;
        if !metadata.is_file() {
            return Err(DescriptorFailure::new(
                source.clone(),
                Error::Descriptor(format!("{} is not a regular file", source.display())),
            ));
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DescriptorFailure::new(source.clone(), e.into()))?;
        }

        let bytes = copy_with_retry(&source, &destination)
            .await
            .map_err(|e| DescriptorFailure::new(source.clone(), e.into()))?;

        let row = MetadataRow::from_descriptor(&descriptor, &destination, &hash);
        self.store.insert(&row).await.map_err(|e| {
            DescriptorFailure::new(source.clone(), insert_error_for_file(&row.src, e))
        })?;

        self.progress.record(kind, bytes);
        tracing::debug!(
            source = %source.display(),
            destination = %destination.display(),
            bytes,
            "replicated"
        );
        Ok(CopyOutcome::Copied { kind, bytes })
    }
}

/// Stream the source into the destination through a fixed buffer. Only
/// interrupted-class errors are retried; disk-full, permission and decode
/// problems surface immediately.
async fn copy_with_retry(source: &Path, destination: &Path) -> std::io::Result<u64> {
    let mut attempt = 0;
    loop {
        match copy_bytes(source, destination).await {
            Ok(bytes) => return Ok(bytes),
            Err(e) if attempt < COPY_RETRIES && is_transient(&e) => {
                attempt += 1;
                tracing::warn!(
                    source = %source.display(),
                    error = %e,
                    attempt,
                    "transient copy error, retrying"
                );
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn is_transient(error: &std::io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut
    )
}

async fn copy_bytes(source: &Path, destination: &Path) -> std::io::Result<u64> {
    let mut reader = tokio::fs::File::open(source).await?;
    let mut writer = tokio::fs::File::create(destination).await?;
    let mut buffer = vec![0u8; COPY_BUFFER_BYTES];
    let mut total = 0u64;
    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read]).await?;
        total += read as u64;
    }
    writer.flush().await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunFacts;
    use tempfile::TempDir;

    fn reporter() -> Arc<ProgressReporter> {
        Arc::new(ProgressReporter::new(&RunFacts::default(), false))
    }

    async fn stage(root: &Path) -> ReplicationStage {
        ReplicationStage {
            workers: 2,
            root: root.to_path_buf(),
            store: MetadataStore::open_in_memory().await.unwrap(),
            progress: reporter(),
            cancel: CancellationToken::new(),
        }
    }

    fn descriptor(dir: &TempDir, name: &str, contents: &[u8], seq: u64) -> MediaDescriptor {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        let mut desc = MediaDescriptor::new(path, seq).unwrap();
        desc.set_burst_id(0);
        desc
    }

    #[tokio::test]
    async fn test_copies_bytes_and_persists_row() {
        let src_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let desc = descriptor(&src_dir, "clip.mp4", b"video bytes", 4);

        let stage = stage(out_dir.path()).await;
        let store = stage.store.clone();
        let (tx, rx) = mpsc::channel(2);
        let (results_tx, mut results_rx) = mpsc::channel(2);
        tx.send(Ok(desc.clone())).await.unwrap();
        drop(tx);
        stage.run(rx, results_tx).await;

        let outcome = results_rx.recv().await.unwrap();
        assert!(matches!(outcome, CopyOutcome::Copied { bytes: 11, .. }));

        let copied = std::fs::read(out_dir.path().join("0").join("4.mp4")).unwrap();
        assert_eq!(copied, b"video bytes");

        let row = store.lookup(&desc.source_key()).await.unwrap().unwrap();
        assert_eq!(row.media_type, "video");
        assert_eq!(row.cluster_id, 0);
        assert_eq!(row.blur, None);
    }

    #[tokio::test]
    async fn test_existing_destination_with_matching_hash_skipped() {
        let src_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let desc = descriptor(&src_dir, "clip.mp4", b"video bytes", 0);

        let stage = stage(out_dir.path()).await;
        let store = stage.store.clone();

        // First pass writes the destination and the row.
        let (tx, rx) = mpsc::channel(2);
        let (results_tx, mut results_rx) = mpsc::channel(2);
        tx.send(Ok(desc.clone())).await.unwrap();
        drop(tx);
        stage.run(rx, results_tx).await;
        assert!(matches!(
            results_rx.recv().await.unwrap(),
            CopyOutcome::Copied { .. }
        ));

        // Second pass must take the idempotency shortcut.
        let stage = ReplicationStage {
            workers: 2,
            root: out_dir.path().to_path_buf(),
            store,
            progress: reporter(),
            cancel: CancellationToken::new(),
        };
        let (tx, rx) = mpsc::channel(2);
        let (results_tx, mut results_rx) = mpsc::channel(2);
        tx.send(Ok(desc)).await.unwrap();
        drop(tx);
        stage.run(rx, results_tx).await;
        assert!(matches!(
            results_rx.recv().await.unwrap(),
            CopyOutcome::AlreadyCopied { .. }
        ));
    }

    #[tokio::test]
    async fn test_error_message_forwarded_to_funnel() {
        let out_dir = TempDir::new().unwrap();
        let stage = stage(out_dir.path()).await;

        let (tx, rx) = mpsc::channel(2);
        let (results_tx, mut results_rx) = mpsc::channel(2);
        tx.send(Err(DescriptorFailure::new(
            PathBuf::from("/media/broken.jpg"),
            Error::Descriptor("image decode failed".into()),
        )))
        .await
        .unwrap();
        drop(tx);
        stage.run(rx, results_tx).await;

        assert!(matches!(
            results_rx.recv().await.unwrap(),
            CopyOutcome::Failed(_)
        ));
    }

    #[tokio::test]
    async fn test_missing_source_fails_that_file_only() {
        let src_dir = TempDir::new().unwrap();
        let out_dir = TempDir::new().unwrap();
        let good = descriptor(&src_dir, "ok.mp4", b"bytes", 0);
        let mut gone = descriptor(&src_dir, "gone.mp4", b"bytes", 1);
        gone.set_burst_id(0);
        std::fs::remove_file(gone.source()).unwrap();

        let stage = stage(out_dir.path()).await;
        let (tx, rx) = mpsc::channel(4);
        let (results_tx, mut results_rx) = mpsc::channel(4);
        tx.send(Ok(gone)).await.unwrap();
        tx.send(Ok(good)).await.unwrap();
        drop(tx);
        stage.run(rx, results_tx).await;

        let mut copied = 0;
        let mut failed = 0;
        while let Some(outcome) = results_rx.recv().await {
            match outcome {
                CopyOutcome::Copied { .. } => copied += 1,
                CopyOutcome::Failed(_) => failed += 1,
                _ => {}
            }
        }
        assert_eq!(copied, 1);
        assert_eq!(failed, 1);
    }
}
