//! ZIP packaging of fixture files.

use crate::AdapterError;
use anyhow::Context;
use gpdload_types::{ArchiveMode, PAYMENT_POSITIONS_ENTRY};
use std::ffi::OsString;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Extra entry that turns a valid archive into one with too many entries.
pub const INVALID_ENTRIES_EXTRA: (&str, &str) = ("file2.json", r#"{"name":"John","age":99}"#);

/// Entry name used when the archive must carry a non-JSON file.
pub const INVALID_FORMAT_ENTRY: &str = "invalid_format_file.txt";

/// Size of one padding entry in a mock archive.
pub const MOCK_BLOCK_BYTES: usize = 1024 * 1024;

const CONTENT_ENTRY: &str = "data.json";

/// Builds upload archives from fixture files on disk.
pub trait ArchivePackager {
    /// Writes `<source>.zip` next to `source` and returns its path.
    fn pack(&self, mode: ArchiveMode, source: &Path) -> Result<PathBuf, AdapterError>;
}

#[derive(Debug, Clone)]
pub struct ZipPackager {
    /// Deflate level for compressed entries.
    pub compression_level: i64,
}

impl Default for ZipPackager {
    fn default() -> Self {
        Self {
            compression_level: 9,
        }
    }
}

impl ArchivePackager for ZipPackager {
    fn pack(&self, mode: ArchiveMode, source: &Path) -> Result<PathBuf, AdapterError> {
        // Empty archives never read the source.
        let bytes = if mode == ArchiveMode::Empty {
            Vec::new()
        } else {
            read_source(source)?
        };

        let target = archive_path(source);
        let mut writer = self.create(&target)?;
        let options = self.deflated();

        match mode {
            ArchiveMode::Valid | ArchiveMode::InvalidEntries => {
                if mode == ArchiveMode::InvalidEntries || !is_ds_store(source) {
                    add_entry(&mut writer, PAYMENT_POSITIONS_ENTRY, &bytes, options)?;
                }
                if mode == ArchiveMode::InvalidEntries {
                    let (name, body) = INVALID_ENTRIES_EXTRA;
                    add_entry(&mut writer, name, body.as_bytes(), options)?;
                }
            }
            ArchiveMode::InvalidFormat => {
                add_entry(&mut writer, INVALID_FORMAT_ENTRY, &bytes, options)?;
            }
            ArchiveMode::Empty => {}
        }

        finish(writer, &target)?;
        debug!(archive = %target.display(), ?mode, "archive written");
        Ok(target)
    }
}

impl ZipPackager {
    /// Packs an in-memory document as `data.json` into `dir/test_<id>.zip`.
    pub fn pack_content(
        &self,
        dir: &Path,
        file_id: &str,
        json: &str,
    ) -> Result<PathBuf, AdapterError> {
        let target = dir.join(format!("test_{file_id}.zip"));
        let mut writer = self.create(&target)?;
        add_entry(&mut writer, CONTENT_ENTRY, json.as_bytes(), self.deflated())?;
        finish(writer, &target)?;
        Ok(target)
    }

    /// Writes an uncompressed archive of `size_mb` one-megabyte entries
    /// (`file0.txt`, `file1.txt`, ...) filled with the text `MOCK`.
    pub fn mock_zip(&self, target: &Path, size_mb: usize) -> Result<PathBuf, AdapterError> {
        let block = "MOCK".repeat(MOCK_BLOCK_BYTES / 4);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        let mut writer = self.create(target)?;
        for i in 0..size_mb {
            add_entry(&mut writer, &format!("file{i}.txt"), block.as_bytes(), options)?;
        }
        finish(writer, target)?;
        debug!(archive = %target.display(), size_mb, "mock archive written");
        Ok(target.to_path_buf())
    }

    fn deflated(&self) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(self.compression_level))
    }

    fn create(&self, target: &Path) -> Result<ZipWriter<File>, AdapterError> {
        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir {}", parent.display()))?;
        }
        let file =
            File::create(target).with_context(|| format!("create {}", target.display()))?;
        Ok(ZipWriter::new(file))
    }
}

/// `<source>.zip`, keeping the source's own extension (`test1.json.zip`).
pub fn archive_path(source: &Path) -> PathBuf {
    let mut name: OsString = source.as_os_str().to_owned();
    name.push(".zip");
    PathBuf::from(name)
}

/// Entry names of an archive, in central-directory order.
pub fn list_entries(path: &Path) -> Result<Vec<String>, AdapterError> {
    let mut archive = open(path)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .with_context(|| format!("read entry #{i} of {}", path.display()))?;
        names.push(entry.name().to_string());
    }
    Ok(names)
}

/// Raw bytes of one archive entry.
pub fn read_entry(path: &Path, name: &str) -> Result<Vec<u8>, AdapterError> {
    let mut archive = open(path)?;
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(AdapterError::MissingEntry(path.to_path_buf(), name.to_string()));
        }
        Err(err) => {
            return Err(anyhow::Error::new(err)
                .context(format!("read entry {name} of {}", path.display()))
                .into());
        }
    };
    let mut out = Vec::new();
    entry
        .read_to_end(&mut out)
        .with_context(|| format!("read entry {name} of {}", path.display()))?;
    Ok(out)
}

fn open(path: &Path) -> Result<ZipArchive<File>, AdapterError> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let archive =
        ZipArchive::new(file).with_context(|| format!("parse archive {}", path.display()))?;
    Ok(archive)
}

fn read_source(source: &Path) -> Result<Vec<u8>, AdapterError> {
    let meta = std::fs::metadata(source)
        .with_context(|| format!("stat {}", source.display()))?;
    if !meta.is_file() {
        return Err(AdapterError::NotAFile(source.to_path_buf()));
    }
    let bytes = std::fs::read(source).with_context(|| format!("read {}", source.display()))?;
    Ok(bytes)
}

fn is_ds_store(source: &Path) -> bool {
    source.file_name().is_some_and(|n| n == ".DS_Store")
}

fn add_entry(
    writer: &mut ZipWriter<File>,
    name: &str,
    bytes: &[u8],
    options: SimpleFileOptions,
) -> Result<(), AdapterError> {
    writer
        .start_file(name, options)
        .with_context(|| format!("start entry {name}"))?;
    writer
        .write_all(bytes)
        .with_context(|| format!("write entry {name}"))?;
    Ok(())
}

fn finish(writer: ZipWriter<File>, target: &Path) -> Result<(), AdapterError> {
    writer
        .finish()
        .with_context(|| format!("finalize {}", target.display()))?;
    Ok(())
}
