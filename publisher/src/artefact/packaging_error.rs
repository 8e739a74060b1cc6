//! Error types for artefact packaging operations.
//!
//! Covers a missing build root, manifest problems, and I/O failures while
//! walking the root or writing the `.tgz` archive.

use super::manifest::ManifestError;
use camino::Utf8PathBuf;
use std::path::PathBuf;
use thiserror::Error;

/// Errors arising from artefact packaging operations.
#[derive(Debug, Error)]
pub enum PackagingError {
    /// An I/O operation failed (reading source files, writing the archive).
    #[error("I/O error during packaging: {0}")]
    Io(#[from] std::io::Error),

    /// The build root does not exist or is not a directory.
    #[error("build root {0} is not a directory")]
    RootMissing(Utf8PathBuf),

    /// The root's `package.json` is unusable.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Walking the build root failed.
    #[error("failed to walk build root: {0}")]
    Walk(#[from] walkdir::Error),

    /// A file below the root has a non-UTF-8 path.
    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    /// A `files` entry resolved to a path outside the build root.
    #[error("{0} is outside the build root")]
    OutsideRoot(Utf8PathBuf),

    /// An entry of the manifest's `files` list is not a valid glob.
    #[error("invalid files pattern {pattern}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Parser message.
        reason: String,
    },
}
