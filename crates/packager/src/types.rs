//! Data types for the packager crate

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Archive formats the packager can produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArchiveFormat {
    /// Deflate-compressed zip (level 9)
    #[default]
    #[serde(rename = "zip")]
    Zip,
    /// Uncompressed tar stream
    #[serde(rename = "tar")]
    Tar,
    /// Gzip-compressed tar stream
    #[serde(rename = "tar.gz", alias = "tgz")]
    TarGz,
}

impl ArchiveFormat {
    /// File extension (without leading dot)
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
        }
    }

    /// Detect the format from a destination file name
    ///
    /// Only the allow-listed extensions are accepted; anything else is
    /// reported as [`Error::InvalidFormat`].
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(Self::TarGz)
        } else if name.ends_with(".tar") {
            Ok(Self::Tar)
        } else if name.ends_with(".zip") {
            Ok(Self::Zip)
        } else {
            Err(Error::InvalidFormat(path.display().to_string()))
        }
    }
}

impl FromStr for ArchiveFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "zip" => Ok(Self::Zip),
            "tar" => Ok(Self::Tar),
            "tar.gz" | "tgz" => Ok(Self::TarGz),
            other => Err(Error::InvalidFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// A packaged, content-addressed deployable unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Where the archive was written
    pub path: PathBuf,
    /// BLAKE3 hex digest of the archive bytes
    pub content_hash: String,
    /// Format of the archive
    pub format: ArchiveFormat,
    /// Archive size in bytes
    pub size: u64,
    /// Number of file entries written
    pub entries: usize,
}

impl Artifact {
    /// First 12 characters of the content hash, for display
    pub fn short_hash(&self) -> &str {
        let end = self.content_hash.len().min(12);
        &self.content_hash[..end]
    }
}

/// Options for a packaging run
#[derive(Debug, Clone, Default)]
pub struct PackOptions {
    /// Root of the tree to archive
    pub source_dir: PathBuf,
    /// Extra files appended under their base name after the tree contents
    pub include: Vec<PathBuf>,
    /// Glob patterns (relative to `source_dir`) to leave out
    pub exclude: Vec<String>,
    /// Directory prefix for every tree entry inside the archive
    pub prefix: Option<String>,
    /// Format used when no destination is given
    pub format: ArchiveFormat,
    /// Output file; a fresh temporary file when unset
    pub destination: Option<PathBuf>,
}

impl PackOptions {
    /// Create options for archiving `source_dir` with defaults
    pub fn new(source_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_dir: source_dir.into(),
            ..Self::default()
        }
    }

    /// Append a file under its base name
    pub fn include(mut self, path: impl Into<PathBuf>) -> Self {
        self.include.push(path.into());
        self
    }

    /// Add exclude glob patterns
    pub fn exclude<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Set the in-archive path prefix
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let trimmed = prefix.trim_matches('/');
        self.prefix = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    /// Set the archive format
    pub fn format(mut self, format: ArchiveFormat) -> Self {
        self.format = format;
        self
    }

    /// Write the archive to a fixed path
    pub fn destination(mut self, path: impl Into<PathBuf>) -> Self {
        self.destination = Some(path.into());
        self
    }

    /// The format that will actually be written
    ///
    /// A destination path wins over the `format` field, and must carry an
    /// allow-listed extension.
    pub fn effective_format(&self) -> Result<ArchiveFormat> {
        match &self.destination {
            Some(dest) => ArchiveFormat::from_path(dest),
            None => Ok(self.format),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ArchiveFormat::from_path(Path::new("out/code.zip")).unwrap(),
            ArchiveFormat::Zip
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("code.TAR")).unwrap(),
            ArchiveFormat::Tar
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("code.tgz")).unwrap(),
            ArchiveFormat::TarGz
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("code.tar.gz")).unwrap(),
            ArchiveFormat::TarGz
        );
    }

    #[test]
    fn test_format_rejects_unknown_extension() {
        let err = ArchiveFormat::from_path(Path::new("code.rar")).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(_)));
        assert!("7z".parse::<ArchiveFormat>().is_err());
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("zip".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::Zip);
        assert_eq!(" TGZ ".parse::<ArchiveFormat>().unwrap(), ArchiveFormat::TarGz);
    }

    #[test]
    fn test_prefix_is_trimmed() {
        let opts = PackOptions::new("src").prefix("/python/");
        assert_eq!(opts.prefix.as_deref(), Some("python"));

        let opts = PackOptions::new("src").prefix("/");
        assert_eq!(opts.prefix, None);
    }

    #[test]
    fn test_destination_overrides_format() {
        let opts = PackOptions::new("src")
            .format(ArchiveFormat::Zip)
            .destination("bundle.tar");
        assert_eq!(opts.effective_format().unwrap(), ArchiveFormat::Tar);
    }
}
