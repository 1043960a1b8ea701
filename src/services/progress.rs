//! Copy progress reporting
//!
//! Monotonic counters behind one mutex, materialised into a view and
//! rendered in place after every update. Rendering is best-effort: a write
//! failure is logged and dropped, never propagated into the pipeline.

use crate::models::{MediaKind, RunFacts};
use parking_lot::Mutex;
use std::io::Write;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
struct KindCounts {
    photos: usize,
    raws: usize,
    videos: usize,
    unknown: usize,
}

struct ProgressState {
    total_bytes: u64,
    copied_bytes: u64,
    completed: KindCounts,
    start: Instant,
    last_update: Instant,
}

pub struct ProgressReporter {
    state: Mutex<ProgressState>,
    expected: KindCounts,
    render: bool,
}

impl ProgressReporter {
    pub fn new(facts: &RunFacts, render: bool) -> Self {
        let now = Instant::now();
        Self {
            state: Mutex::new(ProgressState {
                total_bytes: facts.size,
                copied_bytes: 0,
                completed: KindCounts::default(),
                start: now,
                last_update: now,
            }),
            expected: KindCounts {
                photos: facts.photo_count,
                raws: facts.raw_count,
                videos: facts.video_count,
                unknown: facts.unknown_count,
            },
            render,
        }
    }

    /// Record one completed file and render the updated view.
    pub fn record(&self, kind: MediaKind, bytes: u64) {
        let view = {
            let mut state = self.state.lock();
            state.copied_bytes += bytes;
            match kind {
                MediaKind::Photo => state.completed.photos += 1,
                MediaKind::Raw => state.completed.raws += 1,
                MediaKind::Video => state.completed.videos += 1,
                MediaKind::Unknown => state.completed.unknown += 1,
            }
            state.last_update = Instant::now();
            self.materialise(&state)
        };
        if self.render {
            view.render();
        }
    }

    pub fn view(&self) -> ProgressView {
        self.materialise(&self.state.lock())
    }

    fn materialise(&self, state: &ProgressState) -> ProgressView {
        let percentage = if state.total_bytes == 0 {
            0.0
        } else {
            (state.copied_bytes as f64 / state.total_bytes as f64) * 100.0
        };
        // Rate over the span from start to the last completed file, with a
        // guard so sub-second intervals report no rate rather than a wild
        // one.
        let elapsed = state
            .last_update
            .saturating_duration_since(state.start)
            .as_secs_f64();
        let rate_mb = if elapsed < 1.0 {
            0.0
        } else {
            state.copied_bytes as f64 / 1e6 / elapsed
        };
        ProgressView {
            percentage: (percentage * 100.0).round() / 100.0,
            rate_mb,
            copied_mb: state.copied_bytes / 1_000_000,
            total_mb: state.total_bytes / 1_000_000,
            remaining_mb: state.total_bytes.saturating_sub(state.copied_bytes) / 1_000_000,
            photos_done: state.completed.photos,
            photos_total: self.expected.photos,
            raws_done: state.completed.raws,
            raws_total: self.expected.raws,
            videos_done: state.completed.videos,
            videos_total: self.expected.videos,
        }
    }
}

/// Snapshot of copy progress, ready to print
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    pub percentage: f64,
    pub rate_mb: f64,
    pub copied_mb: u64,
    pub total_mb: u64,
    pub remaining_mb: u64,
    pub photos_done: usize,
    pub photos_total: usize,
    pub raws_done: usize,
    pub raws_total: usize,
    pub videos_done: usize,
    pub videos_total: usize,
}

impl ProgressView {
    pub fn render_text(&self) -> String {
        format!(
            "🦡\n\
             Clustered & Copied {:.2}% Media @ {:.1}MB/s\n\n\
             Copied:      {}MB\n\
             Total:       {}MB\n\
             Remaining:   {}MB\n\n\
             Photos:      {} / {}\n\
             Raw Images:  {} / {}\n\
             Videos:      {} / {}\n",
            self.percentage,
            self.rate_mb,
            self.copied_mb,
            self.total_mb,
            self.remaining_mb,
            self.photos_done,
            self.photos_total,
            self.raws_done,
            self.raws_total,
            self.videos_done,
            self.videos_total,
        )
    }

    /// Clear the terminal and draw in place.
    fn render(&self) {
        let mut stdout = std::io::stdout();
        let outcome = write!(stdout, "\x1b[H\x1b[2J{}", self.render_text())
            .and_then(|_| stdout.flush());
        if let Err(e) = outcome {
            tracing::debug!(error = %e, "progress render failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(size: u64, photos: usize, raws: usize, videos: usize) -> RunFacts {
        RunFacts {
            size,
            photo_count: photos,
            raw_count: raws,
            video_count: videos,
            ..Default::default()
        }
    }

    #[test]
    fn test_record_accumulates() {
        let reporter = ProgressReporter::new(&facts(1000, 2, 1, 0), false);
        reporter.record(MediaKind::Photo, 250);
        reporter.record(MediaKind::Raw, 250);

        let view = reporter.view();
        assert_eq!(view.percentage, 50.0);
        assert_eq!(view.photos_done, 1);
        assert_eq!(view.raws_done, 1);
        assert_eq!(view.videos_done, 0);
    }

    #[test]
    fn test_zero_total_does_not_divide_by_zero() {
        let reporter = ProgressReporter::new(&facts(0, 0, 0, 0), false);
        reporter.record(MediaKind::Video, 0);
        let view = reporter.view();
        assert_eq!(view.percentage, 0.0);
        assert_eq!(view.rate_mb, 0.0);
    }

    #[test]
    fn test_sub_second_rate_guard() {
        let reporter = ProgressReporter::new(&facts(10_000_000, 1, 0, 0), false);
        reporter.record(MediaKind::Photo, 10_000_000);
        // The run has been going for well under a second.
        assert_eq!(reporter.view().rate_mb, 0.0);
    }

    #[test]
    fn test_render_text_shape() {
        let reporter = ProgressReporter::new(&facts(2_000_000, 1, 0, 1), false);
        reporter.record(MediaKind::Photo, 1_000_000);
        let text = reporter.view().render_text();
        assert!(text.contains("Copied:      1MB"));
        assert!(text.contains("Remaining:   1MB"));
        assert!(text.contains("Photos:      1 / 1"));
        assert!(text.contains("Videos:      0 / 1"));
    }
}
