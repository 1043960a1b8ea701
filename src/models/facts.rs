//! Pre-flight facts about a run
//!
//! Computed once before the confirmation prompt: how much of each media
//! kind is on the table, and whether the destination filesystem has room
//! for all of it.

use crate::models::media::{MediaDescriptor, MediaKind};

#[derive(Debug, Clone, Default)]
pub struct RunFacts {
    pub count: usize,
    pub size: u64,
    pub photo_count: usize,
    pub photo_size: u64,
    pub raw_count: usize,
    pub raw_size: u64,
    pub video_count: usize,
    pub video_size: u64,
    pub unknown_count: usize,
    pub unknown_size: u64,
    /// Bytes available on the destination filesystem
    pub free_space: u64,
}

impl RunFacts {
    pub fn gather<'a>(
        descriptors: impl Iterator<Item = &'a MediaDescriptor>,
        free_space: u64,
    ) -> Self {
        let mut facts = RunFacts {
            free_space,
            ..Default::default()
        };
        for desc in descriptors {
            let size = desc.size_bytes();
            facts.count += 1;
            facts.size += size;
            match desc.kind() {
                MediaKind::Photo => {
                    facts.photo_count += 1;
                    facts.photo_size += size;
                }
                MediaKind::Raw => {
                    facts.raw_count += 1;
                    facts.raw_size += size;
                }
                MediaKind::Video => {
                    facts.video_count += 1;
                    facts.video_size += size;
                }
                MediaKind::Unknown => {
                    facts.unknown_count += 1;
                    facts.unknown_size += size;
                }
            }
        }
        facts
    }

    /// The space guard: a run may only proceed when the copy leaves the
    /// destination filesystem with nonnegative free space.
    pub fn has_room(&self) -> bool {
        self.free_space >= self.size
    }

    /// Human summary shown before the prompt
    pub fn summary(&self, cluster_count: u64) -> String {
        let gb = |bytes: u64| bytes as f64 / 1e9;
        let free_after = self.free_space.saturating_sub(self.size);
        format!(
            "Badger 🦡\n\n\
             {} media files ({:.2} gigabytes)\n\
             {} photos ({:.2} gigabytes)\n\
             {} raw images ({:.2} gigabytes)\n\
             {} videos ({:.2} gigabytes)\n\n\
             Badger will group this media into {} cluster-folders.\n\
             there will be {:.2} gigabytes free after copying",
            self.count,
            gb(self.size),
            self.photo_count,
            gb(self.photo_size),
            self.raw_count,
            gb(self.raw_size),
            self.video_count,
            gb(self.video_size),
            cluster_count,
            gb(free_after),
        )
    }
}
