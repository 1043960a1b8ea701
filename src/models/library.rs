//! Media library enumeration
//!
//! Expands the source glob into descriptors, assigning sequence ids in
//! enumeration order and eagerly indexing files by basename prefix so a
//! photo can find its raw companions. Nothing here touches file contents;
//! the only I/O is the stat performed per descriptor.

use crate::error::{Error, Result};
use crate::models::media::{MediaDescriptor, MediaKind};
use std::collections::HashMap;

pub struct MediaLibrary {
    entries: Vec<MediaDescriptor>,
    prefix_index: HashMap<String, Vec<usize>>,
}

impl MediaLibrary {
    /// Expand `pattern` and build the library. Zero matches fail; so does a
    /// single match, which almost always means a bare directory path or a
    /// disconnected device rather than a real glob.
    pub fn from_glob(pattern: &str) -> Result<Self> {
        let paths = glob::glob(pattern)
            .map_err(|e| Error::Config(format!("invalid --from glob '{}': {}", pattern, e)))?;

        let mut matches = Vec::new();
        for entry in paths {
            let path = entry.map_err(|e| Error::Config(format!("glob match failed: {}", e)))?;
            if path.is_file() {
                matches.push(path);
            }
        }

        if matches.is_empty() {
            return Err(Error::Config(
                "the '--from' glob you provided didn't match any files; is your device \
                 connected, and the glob valid and not just a directory path?"
                    .into(),
            ));
        }
        if matches.len() == 1 {
            return Err(Error::Config(
                "the '--from' glob only matched one file; is your device connected, and \
                 the glob valid and not just a directory path?"
                    .into(),
            ));
        }

        let mut entries = Vec::with_capacity(matches.len());
        for (idx, path) in matches.into_iter().enumerate() {
            entries.push(MediaDescriptor::new(path, idx as u64)?);
        }
        Ok(Self::from_descriptors(entries))
    }

    pub fn from_descriptors(entries: Vec<MediaDescriptor>) -> Self {
        let mut prefix_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, desc) in entries.iter().enumerate() {
            prefix_index
                .entry(desc.basename_prefix().to_string())
                .or_default()
                .push(idx);
        }
        Self {
            entries,
            prefix_index,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MediaDescriptor> {
        self.entries.iter()
    }

    /// Raw files sharing a basename prefix, in enumeration order
    pub fn raw_companions(&self, prefix: &str) -> Vec<&MediaDescriptor> {
        self.prefix_index
            .get(prefix)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| &self.entries[i])
                    .filter(|d| d.kind() == MediaKind::Raw)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether any photo shares this prefix; a raw with no such photo is
    /// never replicated.
    pub fn has_photo_companion(&self, prefix: &str) -> bool {
        self.prefix_index
            .get(prefix)
            .map(|indices| {
                indices
                    .iter()
                    .any(|&i| self.entries[i].kind() == MediaKind::Photo)
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) {
        let mut file = File::create(dir.path().join(name)).unwrap();
        file.write_all(b"contents").unwrap();
    }

    #[test]
    fn test_zero_matches_rejected() {
        let dir = TempDir::new().unwrap();
        let pattern = format!("{}/*", dir.path().display());
        let err = MediaLibrary::from_glob(&pattern);
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_single_match_rejected() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "only.jpg");
        let pattern = format!("{}/*", dir.path().display());
        let err = MediaLibrary::from_glob(&pattern);
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn test_sequence_ids_follow_enumeration_order() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "b.jpg");
        touch(&dir, "a.jpg");
        touch(&dir, "c.mp4");
        let pattern = format!("{}/*", dir.path().display());
        let library = MediaLibrary::from_glob(&pattern).unwrap();

        assert_eq!(library.len(), 3);
        // glob yields paths in sorted order
        let names: Vec<_> = library
            .iter()
            .map(|d| d.source().file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.jpg", "c.mp4"]);
        let ids: Vec<_> = library.iter().map(|d| d.sequence_id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_prefix_index_pairs_photo_and_raw() {
        let dir = TempDir::new().unwrap();
        touch(&dir, "IMG1.JPG");
        touch(&dir, "IMG1.RW2");
        touch(&dir, "IMG2.JPG");
        let pattern = format!("{}/*", dir.path().display());
        let library = MediaLibrary::from_glob(&pattern).unwrap();

        let photo = library
            .iter()
            .find(|d| d.kind() == MediaKind::Photo && d.basename_prefix().ends_with("IMG1"))
            .unwrap();
        let raws = library.raw_companions(photo.basename_prefix());
        assert_eq!(raws.len(), 1);
        assert!(library.has_photo_companion(photo.basename_prefix()));

        let lone_raw_prefix = format!("{}/IMG3", dir.path().display());
        assert!(!library.has_photo_companion(&lone_raw_prefix));
    }
}
