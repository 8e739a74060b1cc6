//! Source expansion.
//!
//! Turns the configured source strings into typed [`ArtefactSource`]s for the
//! selected acquisition mode. Fresh-build entry globs are expanded here so a
//! run with no matching entry fails before anything is built.

use super::registry::PackageSpecifier;
use crate::config::{AcquisitionMode, ReleaseConfig};
use crate::error::{PublishError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use glob::{Pattern, glob};
use std::fmt;

/// One unit of acquisition work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtefactSource {
    /// Glob relative to the base directory.
    LocalPattern(String),
    /// Direct download URL.
    RemoteUrl(String),
    /// npm package to look up.
    NpmSpecifier(PackageSpecifier),
    /// Entry module to build and pack.
    FreshEntry(Utf8PathBuf),
}

impl fmt::Display for ArtefactSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalPattern(pattern) => f.write_str(pattern),
            Self::RemoteUrl(url) => f.write_str(url),
            Self::NpmSpecifier(specifier) => write!(f, "{specifier}"),
            Self::FreshEntry(entry) => write!(f, "{entry}"),
        }
    }
}

/// Expand `config.sources` for `config.mode`, preserving source order.
///
/// # Errors
///
/// Returns [`PublishError::Registry`] for a malformed npm specifier,
/// [`PublishError::InvalidPattern`] for a malformed entry glob, and
/// [`PublishError::EntryFileMissing`] when fresh mode matches no entry.
pub fn expand_sources(config: &ReleaseConfig) -> Result<Vec<ArtefactSource>> {
    match config.mode {
        AcquisitionMode::Local => Ok(config
            .sources
            .iter()
            .cloned()
            .map(ArtefactSource::LocalPattern)
            .collect()),
        AcquisitionMode::Remote => Ok(config
            .sources
            .iter()
            .cloned()
            .map(ArtefactSource::RemoteUrl)
            .collect()),
        AcquisitionMode::Npm => config
            .sources
            .iter()
            .map(|raw| {
                raw.parse()
                    .map(ArtefactSource::NpmSpecifier)
                    .map_err(PublishError::from)
            })
            .collect(),
        AcquisitionMode::Fresh => expand_entries(&config.base_dir, &config.sources),
    }
}

/// Resolve entry-module globs to distinct files, first match first.
fn expand_entries(base_dir: &Utf8Path, patterns: &[String]) -> Result<Vec<ArtefactSource>> {
    let mut entries: Vec<Utf8PathBuf> = Vec::new();
    for pattern in patterns {
        let matches = glob_in(base_dir, pattern)?;
        for path in matches.into_iter().filter(|path| path.is_file()) {
            if !entries.contains(&path) {
                entries.push(path);
            }
        }
    }

    if entries.is_empty() {
        return Err(PublishError::EntryFileMissing {
            patterns: patterns.to_vec(),
        });
    }
    log::debug!("found {} entry module(s)", entries.len());
    Ok(entries.into_iter().map(ArtefactSource::FreshEntry).collect())
}

/// Expand `pattern` relative to `base` in the glob crate's (sorted) order.
///
/// Absolute patterns are used as given. Special characters in `base` are
/// escaped so only `pattern` is interpreted.
///
/// # Errors
///
/// Returns [`PublishError::InvalidPattern`] for a malformed pattern and
/// [`PublishError::SourceUnreadable`] when a directory on the way cannot be
/// read.
pub fn glob_in(base: &Utf8Path, pattern: &str) -> Result<Vec<Utf8PathBuf>> {
    let full = if Utf8Path::new(pattern).is_absolute() {
        pattern.to_owned()
    } else {
        format!(
            "{}/{}",
            Pattern::escape(base.as_str().trim_end_matches('/')),
            pattern
        )
    };

    let walker = glob(&full).map_err(|error| PublishError::InvalidPattern {
        pattern: pattern.to_owned(),
        reason: error.to_string(),
    })?;
    let mut matches = Vec::new();
    for entry in walker {
        let path = entry.map_err(|error| PublishError::SourceUnreadable {
            path: Utf8PathBuf::from(error.path().to_string_lossy().into_owned()),
            source: error.into_error(),
        })?;
        match Utf8PathBuf::from_path_buf(path) {
            Ok(path) => matches.push(path),
            Err(path) => log::warn!("skipping non-UTF-8 path {}", path.display()),
        }
    }
    log::debug!("{full} matched {} path(s)", matches.len());
    Ok(matches)
}
