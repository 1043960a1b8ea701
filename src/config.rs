//! Run options for the cluster and copy commands

use crate::error::{Error, Result};
use crate::models::MediaKind;
use std::path::PathBuf;

/// Replication workers; I/O-bound, sized to saturate a single disk
/// without oversubscribing.
pub const DEFAULT_COPY_WORKERS: usize = 10;

/// Scoring workers; CPU-bound, leave one core for the rest of the run.
pub fn default_score_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

/// Options for `badger cluster`
#[derive(Debug, Clone)]
pub struct ClusterOpts {
    /// Source glob
    pub from: String,
    /// Destination directory
    pub to: PathBuf,
    /// Max seconds between captures for them to share a burst
    pub max_seconds_diff: f64,
    /// Minimum media count for a burst
    pub min_points: usize,
    /// Skip the confirmation prompt
    pub assume_yes: bool,
    pub score_workers: usize,
    pub copy_workers: usize,
    /// Render the live progress view while copying
    pub show_progress: bool,
}

impl ClusterOpts {
    pub fn new(from: impl Into<String>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            max_seconds_diff: 9.0,
            min_points: 2,
            assume_yes: false,
            score_workers: default_score_workers(),
            copy_workers: DEFAULT_COPY_WORKERS,
            show_progress: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.from.is_empty() {
            return Err(Error::Config("--from was length-zero".into()));
        }
        if self.to.as_os_str().is_empty() {
            return Err(Error::Config("--to was length-zero".into()));
        }
        if self.max_seconds_diff < 0.0 {
            return Err(Error::Config(
                "--max-seconds-diff must be nonnegative".into(),
            ));
        }
        if self.min_points == 0 {
            return Err(Error::Config("--min-points must be at least one".into()));
        }
        Ok(())
    }
}

/// Media-kind filter for `badger copy`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MediaFilter {
    All,
    Photo,
    Video,
    Raw,
    Unknown,
}

impl MediaFilter {
    pub fn matches(&self, kind: MediaKind) -> bool {
        match self {
            MediaFilter::All => true,
            MediaFilter::Photo => kind == MediaKind::Photo,
            MediaFilter::Video => kind == MediaKind::Video,
            MediaFilter::Raw => kind == MediaKind::Raw,
            MediaFilter::Unknown => kind == MediaKind::Unknown,
        }
    }
}

/// Options for `badger copy`
#[derive(Debug, Clone)]
pub struct CopyOpts {
    pub from: String,
    pub to: PathBuf,
    pub media: MediaFilter,
    /// Keep photos whose ISO rating is at most this
    pub max_iso: Option<i64>,
    /// Keep photos at least this fast, e.g. "1/250"
    pub min_shutter_speed: Option<String>,
    pub assume_yes: bool,
    pub copy_workers: usize,
    pub show_progress: bool,
}

impl CopyOpts {
    pub fn new(from: impl Into<String>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            media: MediaFilter::All,
            max_iso: None,
            min_shutter_speed: None,
            assume_yes: false,
            copy_workers: DEFAULT_COPY_WORKERS,
            show_progress: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.from.is_empty() {
            return Err(Error::Config("--from was length-zero".into()));
        }
        if self.to.as_os_str().is_empty() {
            return Err(Error::Config("--to was length-zero".into()));
        }
        if let Some(speed) = &self.min_shutter_speed {
            if parse_shutter_speed(speed).is_none() {
                return Err(Error::Config(format!(
                    "--min-shutter-speed '{}' is not a shutter speed (expected e.g. 1/250)",
                    speed
                )));
            }
        }
        Ok(())
    }
}

/// Parse a shutter speed string into seconds. Accepts "1/250" and plain
/// decimal forms like "0.004" or "2".
pub fn parse_shutter_speed(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Some((num, den)) = value.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    value.parse().ok().filter(|s: &f64| *s >= 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_from_rejected() {
        let opts = ClusterOpts::new("", "/tmp/out");
        assert!(matches!(opts.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_defaults_match_cli_contract() {
        let opts = ClusterOpts::new("/media/*.jpg", "/tmp/out");
        assert_eq!(opts.max_seconds_diff, 9.0);
        assert_eq!(opts.min_points, 2);
        assert_eq!(opts.copy_workers, 10);
        assert!(opts.score_workers >= 1);
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_parse_shutter_speed() {
        assert_eq!(parse_shutter_speed("1/250"), Some(1.0 / 250.0));
        assert_eq!(parse_shutter_speed("2"), Some(2.0));
        assert_eq!(parse_shutter_speed("1/0"), None);
        assert_eq!(parse_shutter_speed("fast"), None);
    }

    #[test]
    fn test_media_filter() {
        assert!(MediaFilter::All.matches(MediaKind::Video));
        assert!(MediaFilter::Photo.matches(MediaKind::Photo));
        assert!(!MediaFilter::Photo.matches(MediaKind::Raw));
    }
}
