//! Archive packing and unpacking
//!
//! Packs a directory subtree into a single zip stream and materializes such
//! a stream back into a target directory. The container is a standard zip:
//! entries carry forward-slash relative paths and no custom metadata, so
//! archives interchange cleanly with the remote service and ordinary zip
//! tools.
//!
//! Packing uses deflate at the highest level for a deterministic size class;
//! byte-identity between runs is not a goal. Unpacking overwrites existing
//! files at the same relative path (last-write-wins) and never requires the
//! destination to be empty.
//!
//! ## Traversal guard
//!
//! Every entry's relative path is validated before anything is written: an
//! entry that would land outside the destination fails the whole extraction
//! with [`WorksyncError::InvalidArchive`]. Extraction is not atomic - a
//! failure mid-stream leaves the destination half-populated (but never
//! traversed out of), and callers re-run or discard the directory.

use crate::error::{Result, WorksyncError};
use std::fs::{self, File};
use std::io::{self, Read, Seek, Write};
use std::path::Path;
use tracing::{debug, trace};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Summary of a pack operation
#[derive(Debug, Clone, Copy, Default)]
pub struct PackSummary {
    /// Number of regular files added
    pub files: usize,
    /// Total uncompressed bytes read
    pub bytes: u64,
}

/// Forward-slash entry name for a relative path
fn zip_entry_name(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();
    for component in relative.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| {
                WorksyncError::internal(format!("non-UTF8 path in archive: {:?}", relative))
            })?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}

/// Pack a directory subtree into a zip stream
///
/// Walks `source` recursively and adds every regular file with its relative
/// path preserved. Directories are implied by their files' paths.
///
/// # Errors
///
/// Returns [`WorksyncError::NotFound`] if `source` is not a directory, and
/// I/O errors reading files or writing the stream.
pub fn pack_dir<W: Write + Seek>(source: &Path, writer: W) -> Result<PackSummary> {
    if !source.is_dir() {
        return Err(WorksyncError::not_found(format!(
            "archive source {:?}",
            source
        )));
    }

    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));

    let mut zip = ZipWriter::new(writer);
    let mut summary = PackSummary::default();

    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(source).map_err(|_| {
            WorksyncError::internal(format!("walked path {:?} escaped source", entry.path()))
        })?;
        let name = zip_entry_name(relative)?;
        trace!(entry = %name, "packing");

        zip.start_file(name, options)?;
        let mut file = File::open(entry.path())?;
        summary.bytes += io::copy(&mut file, &mut zip)?;
        summary.files += 1;
    }

    zip.finish()?;
    debug!(files = summary.files, bytes = summary.bytes, "packed {:?}", source);
    Ok(summary)
}

/// Pack a directory subtree into a zip file on disk
pub fn pack_dir_to_file(source: &Path, archive_path: &Path) -> Result<PackSummary> {
    let file = File::create(archive_path)?;
    pack_dir(source, file)
}

/// Unpack a zip stream into a target directory
///
/// Creates `dest` and all intermediate directories, then materializes every
/// entry at its relative path, overwriting files that already exist.
///
/// # Errors
///
/// - [`WorksyncError::InvalidArchive`] if any entry path would escape `dest`
/// - [`WorksyncError::CorruptArchive`] if the stream is not a readable zip
///
/// On error the destination may be left partially populated; callers treat
/// extraction as non-atomic and re-run or discard the directory.
pub fn unpack_into<R: Read + Seek>(reader: R, dest: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(reader)?;
    fs::create_dir_all(dest)?;

    let mut extracted = 0usize;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            WorksyncError::InvalidArchive(format!(
                "entry {:?} escapes the destination directory",
                entry.name()
            ))
        })?;
        let target = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        extracted += 1;
        trace!(entry = %entry.name(), "extracted");
    }

    debug!(files = extracted, "unpacked archive into {:?}", dest);
    Ok(extracted)
}

/// Unpack a zip file on disk into a target directory
pub fn unpack_file_into(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path)?;
    unpack_into(file, dest)
}
