//! Pipeline services: clustering, scoring, replication, progress, prompt
//! and the orchestrator that wires them together.

pub mod cluster;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod replication;
pub mod scoring;
pub mod sharpness;

use crate::error::Error;
use crate::models::MediaKind;
use std::path::PathBuf;

pub use cluster::{cluster_media, dbscan_1d, BurstPlan};
pub use pipeline::{run_cluster, run_copy, RunReport};
pub use progress::{ProgressReporter, ProgressView};
pub use prompt::{ConsolePrompter, Prompter};
pub use replication::ReplicationStage;
pub use scoring::ScoringStage;
pub use sharpness::{laplacian_variance, sharpness_score};

/// A failed descriptor travelling the error funnel
#[derive(Debug)]
pub struct DescriptorFailure {
    pub source: PathBuf,
    pub error: Error,
}

impl DescriptorFailure {
    pub fn new(source: PathBuf, error: Error) -> Self {
        Self { source, error }
    }

    pub fn into_error(self) -> Error {
        match self.error {
            // Already carries the path in its message.
            Error::Descriptor(message) => Error::Descriptor(message),
            other => Error::Descriptor(format!("{}: {}", self.source.display(), other)),
        }
    }
}

impl std::fmt::Display for DescriptorFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source.display(), self.error)
    }
}

/// Value flowing from the scoring stage to the replication stage: either a
/// descriptor ready to copy, or the failure that stopped it.
pub type PipelineMessage = Result<crate::models::MediaDescriptor, DescriptorFailure>;

/// Result of handling one pipeline message in the replication stage
#[derive(Debug)]
pub enum CopyOutcome {
    Copied { kind: MediaKind, bytes: u64 },
    AlreadyCopied { kind: MediaKind },
    Cancelled,
    Failed(DescriptorFailure),
}
