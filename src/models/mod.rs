//! Data model: descriptors, the enumerated library, and run facts

pub mod facts;
pub mod library;
pub mod media;

pub use facts::RunFacts;
pub use library::MediaLibrary;
pub use media::{ExifSummary, MediaDescriptor, MediaKind};
