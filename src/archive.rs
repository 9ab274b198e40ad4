//! CBZ materialization.
//!
//! Pages are written as a stored (uncompressed) zip with entries sorted by
//! name, so the same input files always produce the same entry order, sizes
//! and CRC32 values. The archive is built as `<name>.cbz_tmp`, every entry is
//! read back and checked, and only then is it renamed into place.

use crate::error::{DownloadError, Error, Result};
use crate::provider::{CBZ_EXTENSION, TMP_DIR_SUFFIX};
use crate::utils::TMP_FILE_EXTENSION;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// One entry of a written archive
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name (the staged file name)
    pub name: String,
    /// Uncompressed size in bytes
    pub size: u64,
    /// CRC32 of the entry data
    pub crc32: u32,
}

/// Result of [`write_cbz`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveManifest {
    /// Final archive path
    pub path: PathBuf,
    /// Entries in archive order
    pub entries: Vec<ArchiveEntry>,
}

/// Files of `dir` that belong in the archive, sorted by name
///
/// Partial `.tmp` files and subdirectories are skipped.
pub fn archive_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        if path
            .extension()
            .is_some_and(|ext| ext == TMP_FILE_EXTENSION)
        {
            continue;
        }
        files.push(path);
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Archive the staged pages of `tmp_dir` into `<manga_dir>/<dir_name>.cbz`
///
/// On success the temp directory is deleted. Blocking; run it off the async
/// workers.
pub fn write_cbz(tmp_dir: &Path, manga_dir: &Path, dir_name: &str) -> Result<ArchiveManifest> {
    let final_path = manga_dir.join(format!("{}.{}", dir_name, CBZ_EXTENSION));
    let tmp_path = manga_dir.join(format!("{}.{}{}", dir_name, CBZ_EXTENSION, TMP_DIR_SUFFIX));

    let inputs = archive_inputs(tmp_dir)?;
    debug!(
        tmp_dir = %tmp_dir.display(),
        files = inputs.len(),
        "Writing CBZ archive"
    );

    let entries = match write_entries(&inputs, &tmp_path).and_then(|entries| {
        verify_archive(&tmp_path, &entries)?;
        Ok(entries)
    }) {
        Ok(entries) => entries,
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e);
        }
    };

    std::fs::rename(&tmp_path, &final_path)?;
    std::fs::remove_dir_all(tmp_dir)?;

    info!(
        path = %final_path.display(),
        entries = entries.len(),
        "CBZ archive written"
    );

    Ok(ArchiveManifest {
        path: final_path,
        entries,
    })
}

fn write_entries(inputs: &[PathBuf], archive_path: &Path) -> Result<Vec<ArchiveEntry>> {
    let file = File::create(archive_path)?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(zip::DateTime::default());

    let mut entries = Vec::with_capacity(inputs.len());
    for input in inputs {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Other(format!("not a file: {}", input.display())))?;
        let data = std::fs::read(input)?;

        writer.start_file(name.as_str(), options)?;
        writer.write_all(&data)?;

        entries.push(ArchiveEntry {
            name,
            size: data.len() as u64,
            crc32: crc32fast::hash(&data),
        });
    }

    let mut inner = writer.finish()?;
    inner.flush()?;
    inner.get_ref().sync_all()?;

    Ok(entries)
}

/// Re-read an archive and compare each entry against the expected manifest
pub fn verify_archive(archive_path: &Path, expected: &[ArchiveEntry]) -> Result<()> {
    let mut archive = ZipArchive::new(File::open(archive_path)?)?;

    if archive.len() != expected.len() {
        return Err(DownloadError::ArchiveVerification {
            entry: archive_path.display().to_string(),
            reason: format!("{} entries, expected {}", archive.len(), expected.len()),
        }
        .into());
    }

    for (index, want) in expected.iter().enumerate() {
        let mut entry = archive.by_index(index)?;
        let mismatch = |reason: String| -> Error {
            DownloadError::ArchiveVerification {
                entry: want.name.clone(),
                reason,
            }
            .into()
        };

        if entry.name() != want.name {
            return Err(mismatch(format!("found entry {}", entry.name())));
        }
        if entry.compression() != CompressionMethod::Stored {
            return Err(mismatch(format!("compressed with {:?}", entry.compression())));
        }
        if entry.size() != want.size || entry.crc32() != want.crc32 {
            return Err(mismatch(format!(
                "header says {} bytes crc {:08x}, expected {} bytes crc {:08x}",
                entry.size(),
                entry.crc32(),
                want.size,
                want.crc32
            )));
        }

        let mut data = Vec::with_capacity(want.size as usize);
        entry.read_to_end(&mut data)?;
        let actual = crc32fast::hash(&data);
        if actual != want.crc32 {
            return Err(mismatch(format!(
                "data crc {:08x}, expected {:08x}",
                actual, want.crc32
            )));
        }
    }

    Ok(())
}
