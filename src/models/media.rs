//! Per-file media descriptor
//!
//! A descriptor owns everything the pipeline needs to know about one source
//! file: its kind, its capture time, its content hash, its EXIF summary and
//! the destination name it will replicate to. Metadata accessors memoise so
//! each fact is computed at most once per run; clones carry filled cells
//! with them.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::UNIX_EPOCH;

/// Media classification derived from the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Raw,
    Video,
    Unknown,
}

impl MediaKind {
    fn from_extension(ext: &str) -> Self {
        match ext {
            "jpg" | "jpeg" | "png" => MediaKind::Photo,
            "rw2" | "raw" => MediaKind::Raw,
            "mp4" => MediaKind::Video,
            _ => MediaKind::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Raw => "raw",
            MediaKind::Video => "video",
            MediaKind::Unknown => "unknown",
        }
    }
}

/// Camera settings pulled from a photo's EXIF block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExifSummary {
    pub iso: Option<String>,
    pub aperture: Option<String>,
    pub shutter_speed: Option<String>,
}

/// One media file flowing through the pipeline
#[derive(Debug, Clone)]
pub struct MediaDescriptor {
    source: PathBuf,
    sequence_id: u64,
    kind: MediaKind,
    /// Lowercased extension including the dot, empty when the file has none
    extension: String,
    /// Source path stripped of its extension; pairs a photo with its raw
    basename_prefix: String,
    size_bytes: u64,
    mtime_epoch: i64,
    burst_id: Option<u64>,
    score: Option<i64>,
    capture: OnceLock<i64>,
    hash: OnceLock<String>,
    exif: OnceLock<Option<ExifSummary>>,
}

impl MediaDescriptor {
    /// Build a descriptor from a source path. Stats the file; a missing or
    /// unreadable source is fatal for the descriptor.
    pub fn new(source: PathBuf, sequence_id: u64) -> Result<Self> {
        let meta = std::fs::metadata(&source).map_err(|e| {
            Error::Descriptor(format!("{}: {}", source.display(), e))
        })?;
        let size_bytes = meta.len();
        let mtime_epoch = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let raw_ext = source
            .extension()
            .map(|e| e.to_string_lossy().to_string())
            .unwrap_or_default();
        let extension = if raw_ext.is_empty() {
            String::new()
        } else {
            format!(".{}", raw_ext.to_lowercase())
        };
        let source_str = source.to_string_lossy().to_string();
        let basename_prefix = if raw_ext.is_empty() {
            source_str
        } else {
            source_str[..source_str.len() - raw_ext.len() - 1].to_string()
        };
        let kind = MediaKind::from_extension(raw_ext.to_lowercase().as_str());

        Ok(Self {
            source,
            sequence_id,
            kind,
            extension,
            basename_prefix,
            size_bytes,
            mtime_epoch,
            burst_id: None,
            score: None,
            capture: OnceLock::new(),
            hash: OnceLock::new(),
            exif: OnceLock::new(),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Source path as the metadata-store key
    pub fn source_key(&self) -> String {
        self.source.to_string_lossy().to_string()
    }

    pub fn sequence_id(&self) -> u64 {
        self.sequence_id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn basename_prefix(&self) -> &str {
        &self.basename_prefix
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    pub fn mtime_epoch(&self) -> i64 {
        self.mtime_epoch
    }

    pub fn burst_id(&self) -> Option<u64> {
        self.burst_id
    }

    pub fn set_burst_id(&mut self, burst_id: u64) {
        self.burst_id = Some(burst_id);
    }

    pub fn score(&self) -> Option<i64> {
        self.score
    }

    pub fn set_score(&mut self, score: i64) {
        self.score = Some(score);
    }

    /// Adopt a paired photo's burst, sequence and score so the companion
    /// lands beside it under the same filename prefix.
    pub fn adopt_pairing(&mut self, burst_id: Option<u64>, sequence_id: u64, score: Option<i64>) {
        self.burst_id = burst_id;
        self.sequence_id = sequence_id;
        self.score = score;
    }

    /// Capture time in epoch seconds: EXIF datetime when decodable, the
    /// file mtime otherwise. Never negative.
    pub fn capture_epoch(&self) -> i64 {
        *self.capture.get_or_init(|| {
            read_exif_datetime(&self.source)
                .unwrap_or(self.mtime_epoch)
                .max(0)
        })
    }

    /// MD5 hex digest of the source bytes, computed at most once
    pub fn content_hash(&self) -> Result<String> {
        if let Some(hash) = self.hash.get() {
            return Ok(hash.clone());
        }
        let hash = hash_file(&self.source)
            .map_err(|e| Error::Descriptor(format!("{}: {}", self.source.display(), e)))?;
        let _ = self.hash.set(hash.clone());
        Ok(hash)
    }

    /// EXIF summary; photos only, decode failure yields an empty summary
    pub fn exif(&self) -> Option<&ExifSummary> {
        self.exif
            .get_or_init(|| {
                if self.kind == MediaKind::Photo {
                    Some(read_exif_summary(&self.source))
                } else {
                    None
                }
            })
            .as_ref()
    }

    /// Destination path under `root`: `<burst>/<score>_<sequence><ext>` when
    /// a score is set, `<burst>/<sequence><ext>` otherwise. Descriptors
    /// without a burst (the flat copy command) land directly under `root`.
    pub fn destination_path(&self, root: &Path) -> PathBuf {
        let name = match self.score {
            Some(score) => format!("{}_{}{}", score, self.sequence_id, self.extension),
            None => format!("{}{}", self.sequence_id, self.extension),
        };
        match self.burst_id {
            Some(burst) => root.join(burst.to_string()).join(name),
            None => root.join(name),
        }
    }

    pub fn destination_exists(&self, root: &Path) -> bool {
        self.destination_path(root).exists()
    }

    /// MD5 hex digest of the bytes already at the destination, when it
    /// exists. Unlike `content_hash` this is never memoised; the
    /// destination can change between runs.
    pub fn destination_hash(&self, root: &Path) -> Result<Option<String>> {
        let destination = self.destination_path(root);
        if !destination.exists() {
            return Ok(None);
        }
        hash_file(&destination)
            .map(Some)
            .map_err(|e| Error::Descriptor(format!("{}: {}", destination.display(), e)))
    }
}

fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        context.consume(&buffer[..read]);
    }
    Ok(format!("{:x}", context.compute()))
}

/// EXIF capture time in epoch seconds, if the container carries one
fn read_exif_datetime(path: &Path) -> Option<i64> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;

    for tag in [exif::Tag::DateTimeOriginal, exif::Tag::DateTime] {
        let Some(field) = exif.get_field(tag, exif::In::PRIMARY) else {
            continue;
        };
        if let exif::Value::Ascii(ref groups) = field.value {
            if let Some(bytes) = groups.first() {
                if let Ok(dt) = exif::DateTime::from_ascii(bytes) {
                    let parsed = chrono::NaiveDate::from_ymd_opt(
                        dt.year as i32,
                        dt.month as u32,
                        dt.day as u32,
                    )
                    .and_then(|d| {
                        d.and_hms_opt(dt.hour as u32, dt.minute as u32, dt.second as u32)
                    })
                    .map(|ndt| ndt.and_utc().timestamp());
                    if parsed.is_some() {
                        return parsed;
                    }
                }
            }
        }
    }
    None
}

fn read_exif_summary(path: &Path) -> ExifSummary {
    let Ok(file) = File::open(path) else {
        return ExifSummary::default();
    };
    let mut reader = BufReader::new(file);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut reader) else {
        tracing::debug!(path = %path.display(), "no EXIF block, summary left empty");
        return ExifSummary::default();
    };

    let field_string = |tag| {
        exif.get_field(tag, exif::In::PRIMARY)
            .map(|f| f.display_value().to_string())
    };

    ExifSummary {
        iso: field_string(exif::Tag::PhotographicSensitivity),
        aperture: field_string(exif::Tag::FNumber),
        shutter_speed: field_string(exif::Tag::ExposureTime),
    }
}
