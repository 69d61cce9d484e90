//! Filesystem adapters for gpdload.
//!
//! In clean-arch terms: this is where we touch the world. Fixtures are
//! written as pretty JSON files and wrapped into ZIP archives next to them.

mod archive;
mod fixture;

pub use archive::{
    ArchivePackager, INVALID_ENTRIES_EXTRA, INVALID_FORMAT_ENTRY, MOCK_BLOCK_BYTES, ZipPackager,
    archive_path, list_entries, read_entry,
};
pub use fixture::{Fixture, FixtureWriter, extract_iupds};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("source {0} is not a regular file")]
    NotAFile(PathBuf),

    #[error("archive {0} has no entry named {1:?}")]
    MissingEntry(PathBuf, String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
