//! # Packager
//!
//! Deterministic packaging of a source tree into a content-addressed archive.
//!
//! Packaging the same tree with the same options always yields a
//! byte-identical archive, and therefore the same content hash, no matter
//! when or where it was built. This is what makes hash-based change
//! detection of deployed code reliable:
//!
//! - tree entries are sorted by their relative path before writing
//! - every entry carries the same pinned timestamp ([`FIXED_MTIME`]),
//!   owner and a mode derived only from the execute bit
//! - compression settings are fixed (deflate level 9 for zip, best for gzip)
//!
//! ## Example
//!
//! ```no_run
//! use packager::{pack, ArchiveFormat, PackOptions};
//!
//! let artifact = pack(
//!     &PackOptions::new("./src")
//!         .exclude(["*.pyc", "__pycache__"])
//!         .include("./generated/shim.py")
//!         .prefix("python")
//!         .format(ArchiveFormat::Zip),
//! )?;
//!
//! println!("{} -> {}", artifact.path.display(), artifact.content_hash);
//! # Ok::<(), packager::Error>(())
//! ```

mod error;
mod glob;
mod types;
mod writer;

pub use error::{Error, Result};
pub use glob::ExcludeSet;
pub use types::{ArchiveFormat, Artifact, PackOptions};
pub use writer::FIXED_MTIME;

use blake3::Hasher;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use writer::Entry;

/// Package a source tree according to `options`
///
/// The tree is walked (dotfiles included), excluded paths are dropped,
/// the remaining files are sorted by relative path and written under
/// `prefix/` when a prefix is set. Each `include` file is then appended
/// under its base name, in the order given. An include replaces any
/// earlier entry with the same archive name, in every format. The source
/// tree is never modified.
pub fn pack(options: &PackOptions) -> Result<Artifact> {
    let format = options.effective_format()?;
    let excludes = ExcludeSet::new(&options.exclude)?;

    let destination = match &options.destination {
        Some(dest) => {
            if let Some(parent) = dest.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).map_err(|e| Error::packaging(parent, e))?;
            }
            dest.clone()
        }
        None => temp_destination(format)?,
    };

    let mut entries = collect_tree(&options.source_dir, &excludes, &destination)?;
    if let Some(prefix) = &options.prefix {
        for entry in &mut entries {
            entry.name = format!("{}/{}", prefix, entry.name);
        }
    }

    for include in &options.include {
        if !include.is_file() {
            return Err(Error::packaging(
                include,
                std::io::Error::new(std::io::ErrorKind::NotFound, "include file not found"),
            ));
        }
        let name = include
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                Error::packaging(
                    include,
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, "include has no file name"),
                )
            })?;
        let before = entries.len();
        entries.retain(|entry| entry.name != name);
        if entries.len() != before {
            log::debug!("Include {} replaces tree entry {}", include.display(), name);
        }
        entries.push(Entry {
            name,
            source: include.clone(),
        });
    }

    log::debug!(
        "Packing {} entries from {} into {} ({})",
        entries.len(),
        options.source_dir.display(),
        destination.display(),
        format
    );

    let count = writer::write_archive(format, &destination, &entries)?;
    let content_hash = hash_file(&destination)?;
    let size = std::fs::metadata(&destination)
        .map_err(|e| Error::packaging(&destination, e))?
        .len();

    Ok(Artifact {
        path: destination,
        content_hash,
        format,
        size,
        entries: count,
    })
}

/// Hash a file using BLAKE3, returning the hex digest
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| Error::packaging(path, e))?;
    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut hasher = Hasher::new();
    let mut buffer = [0u8; 64 * 1024];

    loop {
        let read = reader
            .read(&mut buffer)
            .map_err(|e| Error::packaging(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Hash an in-memory buffer the same way [`hash_file`] does
pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Walk the tree and return sorted, non-excluded file entries
fn collect_tree(root: &Path, excludes: &ExcludeSet, destination: &Path) -> Result<Vec<Entry>> {
    if !root.is_dir() {
        return Err(Error::packaging(
            root,
            std::io::Error::new(std::io::ErrorKind::NotFound, "source directory not found"),
        ));
    }

    let skip = destination.canonicalize().ok();
    let mut entries = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(true)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| {
            relative_name(root, e.path()).is_none_or(|rel| !excludes.is_excluded(&rel))
        });

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
            Error::packaging(path, e)
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        if let Some(skip) = &skip
            && entry.path().canonicalize().ok().as_ref() == Some(skip)
        {
            continue;
        }

        if let Some(name) = relative_name(root, entry.path()) {
            entries.push(Entry {
                name,
                source: entry.path().to_path_buf(),
            });
        }
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Relative path with `/` separators regardless of platform
fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// A persisted temp file carrying the format's extension
fn temp_destination(format: ArchiveFormat) -> Result<PathBuf> {
    let suffix = format!(".{}", format.extension());
    let file = tempfile::Builder::new()
        .prefix("fnship-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| Error::packaging(std::env::temp_dir(), e))?;
    let (_, path) = file
        .keep()
        .map_err(|e| Error::packaging(std::env::temp_dir(), e.error))?;
    Ok(path)
}
