//! Archive writers with pinned entry metadata
//!
//! Every entry gets the same timestamp, owner and a mode derived only from
//! the execute bit, so identical trees produce identical bytes.

use crate::error::{Error, Result};
use crate::types::ArchiveFormat;
use flate2::{Compression, GzBuilder};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Modification time stamped on every entry: 1980-01-01T00:00:00Z
///
/// This is the earliest time a zip entry can express, reused for tar so all
/// formats agree.
pub const FIXED_MTIME: u64 = 315_532_800;

/// Zip deflate level
const ZIP_LEVEL: i64 = 9;

/// A file to place in the archive
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    /// Name inside the archive (`/`-separated)
    pub name: String,
    /// File on disk
    pub source: PathBuf,
}

/// Write `entries` to `dest` in the given format, returning the count
pub(crate) fn write_archive(format: ArchiveFormat, dest: &Path, entries: &[Entry]) -> Result<usize> {
    let file = File::create(dest).map_err(|e| Error::packaging(dest, e))?;

    match format {
        ArchiveFormat::Zip => write_zip(file, dest, entries),
        ArchiveFormat::Tar => {
            let file = write_tar(file, dest, entries)?;
            file.sync_all().map_err(|e| Error::packaging(dest, e))?;
            Ok(entries.len())
        }
        ArchiveFormat::TarGz => {
            let encoder = GzBuilder::new().mtime(0).write(file, Compression::best());
            let encoder = write_tar(encoder, dest, entries)?;
            encoder.finish().map_err(|e| Error::packaging(dest, e))?;
            Ok(entries.len())
        }
    }
}

fn write_zip(file: File, dest: &Path, entries: &[Entry]) -> Result<usize> {
    let mut zip = ZipWriter::new(file);

    for entry in entries {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .compression_level(Some(ZIP_LEVEL))
            .last_modified_time(DateTime::default())
            .unix_permissions(entry_mode(&entry.source)?);

        zip.start_file(entry.name.as_str(), options)
            .map_err(|e| Error::packaging(dest, io::Error::other(e)))?;

        let mut source = File::open(&entry.source).map_err(|e| Error::packaging(&entry.source, e))?;
        io::copy(&mut source, &mut zip).map_err(|e| Error::packaging(&entry.source, e))?;
    }

    zip.finish()
        .map_err(|e| Error::packaging(dest, io::Error::other(e)))?;
    Ok(entries.len())
}

fn write_tar<W: Write>(writer: W, dest: &Path, entries: &[Entry]) -> Result<W> {
    let mut builder = tar::Builder::new(writer);
    builder.mode(tar::HeaderMode::Deterministic);

    for entry in entries {
        let metadata =
            std::fs::metadata(&entry.source).map_err(|e| Error::packaging(&entry.source, e))?;

        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(metadata.len());
        header.set_mode(entry_mode(&entry.source)?);
        header.set_mtime(FIXED_MTIME);
        header.set_uid(0);
        header.set_gid(0);

        let source = File::open(&entry.source).map_err(|e| Error::packaging(&entry.source, e))?;
        builder
            .append_data(&mut header, &entry.name, source)
            .map_err(|e| Error::packaging(&entry.source, e))?;
    }

    builder.into_inner().map_err(|e| Error::packaging(dest, e))
}

/// 0o755 for anything with an execute bit, 0o644 otherwise
#[cfg(unix)]
fn entry_mode(path: &Path) -> Result<u32> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)
        .map_err(|e| Error::packaging(path, e))?
        .permissions()
        .mode();
    Ok(if mode & 0o111 != 0 { 0o755 } else { 0o644 })
}

#[cfg(not(unix))]
fn entry_mode(_path: &Path) -> Result<u32> {
    Ok(0o644)
}
