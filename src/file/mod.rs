//! File naming and archive packaging

pub mod archive;
pub mod paths;

// Re-export commonly used types
pub use archive::ArchiveAssembler;
pub use paths::{archive_filename, filename_for, manifest_filename, ARCHIVE_EXTENSION};
