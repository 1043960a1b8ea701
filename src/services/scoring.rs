//! Scoring stage
//!
//! CPU-bound half of the pipeline. A pool of workers drains the clustered
//! descriptors, computes (or reuses) a sharpness score per photo and emits
//! pipeline messages downstream. Scores travel to raw companions by
//! emission: the photo's worker sends one extra message per raw sibling,
//! stamped with the photo's burst, sequence and score, so no shared score
//! map is needed.

use crate::db::MetadataStore;
use crate::error::Error;
use crate::models::{MediaDescriptor, MediaKind, MediaLibrary};
use crate::services::sharpness::sharpness_score;
use crate::services::{DescriptorFailure, PipelineMessage};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct ScoringStage {
    pub workers: usize,
    pub store: MetadataStore,
    pub library: Arc<MediaLibrary>,
    pub cancel: CancellationToken,
}

impl ScoringStage {
    /// Drain `inputs` through the worker pool into `output`. The channel
    /// closes when the last worker finishes and the sender drops.
    pub async fn run(self, inputs: Vec<MediaDescriptor>, output: mpsc::Sender<PipelineMessage>) {
        let workers = self.workers.max(1);
        let stage = Arc::new(self);
        stream::iter(inputs)
            .for_each_concurrent(workers, |descriptor| {
                let stage = Arc::clone(&stage);
                let output = output.clone();
                async move {
                    stage.process(descriptor, &output).await;
                }
            })
            .await;
    }

    async fn process(&self, descriptor: MediaDescriptor, output: &mpsc::Sender<PipelineMessage>) {
        if self.cancel.is_cancelled() {
            return;
        }

        match descriptor.kind() {
            // Forwarded untouched; no score applies.
            MediaKind::Video | MediaKind::Unknown => {
                let _ = output.send(Ok(descriptor)).await;
            }
            // A raw rides on its paired photo's broadcast. Without a paired
            // photo it is dropped entirely.
            MediaKind::Raw => {
                if !self.library.has_photo_companion(descriptor.basename_prefix()) {
                    tracing::warn!(
                        source = %descriptor.source().display(),
                        "raw file has no paired photo, skipping"
                    );
                }
            }
            MediaKind::Photo => match self.score_photo(descriptor).await {
                Ok(photo) => self.broadcast(photo, output).await,
                Err(failure) => {
                    let _ = output.send(Err(failure)).await;
                }
            },
        }
    }

    /// Score one photo, reusing the stored score when the metadata store
    /// already holds one for unchanged source bytes.
    async fn score_photo(
        &self,
        descriptor: MediaDescriptor,
    ) -> Result<MediaDescriptor, DescriptorFailure> {
        let source = descriptor.source().to_path_buf();

        let (descriptor, hash) = tokio::task::spawn_blocking(move || {
            let hash = descriptor.content_hash();
            // Memoise the EXIF summary on the same blocking thread.
            let _ = descriptor.exif();
            (descriptor, hash)
        })
        .await
        .map_err(|e| {
            DescriptorFailure::new(source.clone(), Error::Descriptor(e.to_string()))
        })?;
        let hash = hash.map_err(|e| DescriptorFailure::new(source.clone(), e))?;

        let stored = match self.store.lookup(&descriptor.source_key()).await {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(
                    source = %source.display(),
                    error = %e,
                    "metadata lookup failed, scoring afresh"
                );
                None
            }
        };

        let score = match stored {
            Some(row) if row.hash == hash && row.blur.is_some_and(|b| b >= 0) => {
                tracing::debug!(source = %source.display(), "reusing stored sharpness score");
                row.blur.unwrap_or_default()
            }
            _ => {
                let path = source.clone();
                tokio::task::spawn_blocking(move || sharpness_score(&path))
                    .await
                    .map_err(|e| {
                        DescriptorFailure::new(source.clone(), Error::Descriptor(e.to_string()))
                    })?
                    .map_err(|e| DescriptorFailure::new(source.clone(), e))?
            }
        };

        let mut descriptor = descriptor;
        descriptor.set_score(score);
        Ok(descriptor)
    }

    /// Emit the scored photo plus one stamped copy per raw companion.
    async fn broadcast(&self, photo: MediaDescriptor, output: &mpsc::Sender<PipelineMessage>) {
        let burst = photo.burst_id();
        let sequence = photo.sequence_id();
        let score = photo.score();

        for companion in self.library.raw_companions(photo.basename_prefix()) {
            let mut raw = companion.clone();
            raw.adopt_pairing(burst, sequence, score);
            let _ = output.send(Ok(raw)).await;
        }
        let _ = output.send(Ok(photo)).await;
    }
}
