//! Artefact resolution strategies.
//!
//! Turns the configured sources into an ordered list of local archives. Work
//! inside a strategy fans out across the rayon pool; results are collected in
//! source order, so artefact order is stable from resolution through to the
//! upload outcomes. Every task runs to completion: a failing sibling does not
//! cancel the others, and the first failure in source order is reported once
//! all have finished.

use crate::artefact::download::{Downloader, file_name_from_url};
use crate::artefact::packaging::pack;
use crate::artefact::registry::{PackageSpecifier, RegistryLookup};
use crate::artefact::source::{ArtefactSource, expand_sources, glob_in};
use crate::builder::{Builder, find_pilet_root};
use crate::config::{AcquisitionMode, ReleaseConfig};
use crate::error::{PublishError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use rayon::prelude::*;

/// An archive ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artefact {
    /// Local archive path.
    pub path: Utf8PathBuf,
    /// The source it was resolved from.
    pub origin: String,
}

impl Artefact {
    /// Create an artefact.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, origin: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            origin: origin.into(),
        }
    }
}

/// Resolves sources to artefacts using injected collaborators.
pub struct Resolver<'a> {
    staging_dir: &'a Utf8Path,
    downloader: &'a dyn Downloader,
    registry: &'a dyn RegistryLookup,
    builder: Builder<'a>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver staging downloads and fresh packs below
    /// `staging_dir`.
    #[must_use]
    pub fn new(
        staging_dir: &'a Utf8Path,
        downloader: &'a dyn Downloader,
        registry: &'a dyn RegistryLookup,
        builder: Builder<'a>,
    ) -> Self {
        Self {
            staging_dir,
            downloader,
            registry,
            builder,
        }
    }

    /// Resolve `config.sources` for `config.mode`.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::NoArtefactsFound`] when nothing was resolved,
    /// [`PublishError::EntryFileMissing`] when fresh mode matches no entry,
    /// or the first acquisition failure in source order.
    pub fn resolve(&self, config: &ReleaseConfig) -> Result<Vec<Artefact>> {
        let sources = expand_sources(config)?;
        log::debug!("resolving {} {} source(s)", sources.len(), config.mode);

        let artefacts = match config.mode {
            AcquisitionMode::Local => self.resolve_local(&config.base_dir, &sources)?,
            AcquisitionMode::Remote => self.resolve_remote(&sources)?,
            AcquisitionMode::Npm => self.resolve_npm(&sources)?,
            AcquisitionMode::Fresh => self.resolve_fresh(&sources)?,
        };

        if artefacts.is_empty() {
            return Err(PublishError::NoArtefactsFound {
                sources: config.sources.clone(),
            });
        }
        log::info!("resolved {} artefact(s)", artefacts.len());
        Ok(artefacts)
    }

    fn resolve_local(
        &self,
        base_dir: &Utf8Path,
        sources: &[ArtefactSource],
    ) -> Result<Vec<Artefact>> {
        let patterns: Vec<&str> = sources
            .iter()
            .filter_map(|source| match source {
                ArtefactSource::LocalPattern(pattern) => Some(pattern.as_str()),
                _ => None,
            })
            .collect();

        let results: Vec<Result<Vec<Artefact>>> = patterns
            .par_iter()
            .map(|&pattern| {
                Ok(glob_in(base_dir, pattern)?
                    .into_iter()
                    .filter(|path| path.is_file())
                    .map(|path| Artefact::new(path, pattern))
                    .collect())
            })
            .collect();

        Ok(first_error(results)?.into_iter().flatten().collect())
    }

    fn resolve_remote(&self, sources: &[ArtefactSource]) -> Result<Vec<Artefact>> {
        let urls: Vec<&str> = sources
            .iter()
            .filter_map(|source| match source {
                ArtefactSource::RemoteUrl(url) => Some(url.as_str()),
                _ => None,
            })
            .collect();
        self.download_all(&urls)
    }

    fn resolve_npm(&self, sources: &[ArtefactSource]) -> Result<Vec<Artefact>> {
        let specifiers: Vec<&PackageSpecifier> = sources
            .iter()
            .filter_map(|source| match source {
                ArtefactSource::NpmSpecifier(specifier) => Some(specifier),
                _ => None,
            })
            .collect();

        // Every lookup finishes before the first download starts.
        let lookups: Vec<Result<String>> = specifiers
            .par_iter()
            .map(|specifier| Ok(self.registry.tarball_url(specifier)?))
            .collect();
        let urls = first_error(lookups)?;

        let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        self.download_all(&url_refs)
    }

    fn download_all(&self, urls: &[&str]) -> Result<Vec<Artefact>> {
        let results: Vec<Result<Artefact>> = urls
            .par_iter()
            .enumerate()
            .map(|(index, &url)| {
                let dir = self.slot_dir("download", index)?;
                let path = dir.join(file_name_from_url(url));
                self.downloader.download(url, path.as_std_path())?;
                Ok(Artefact::new(path, url))
            })
            .collect();
        first_error(results)
    }

    fn resolve_fresh(&self, sources: &[ArtefactSource]) -> Result<Vec<Artefact>> {
        let entries: Vec<&Utf8PathBuf> = sources
            .iter()
            .filter_map(|source| match source {
                ArtefactSource::FreshEntry(entry) => Some(entry),
                _ => None,
            })
            .collect();

        // Entries of one pilet share its output directory, so they build and
        // pack one after another; distinct pilets still run concurrently.
        let groups = group_by_root(&entries);
        let mut results: Vec<(usize, Result<Artefact>)> = groups
            .par_iter()
            .map(|group| {
                group
                    .iter()
                    .map(|&(index, entry)| (index, self.build_and_pack(index, entry)))
                    .collect::<Vec<_>>()
            })
            .flatten()
            .collect();
        results.sort_by_key(|&(index, _)| index);
        first_error(results.into_iter().map(|(_, result)| result).collect())
    }

    fn build_and_pack(&self, index: usize, entry: &Utf8Path) -> Result<Artefact> {
        let outcome = self
            .builder
            .build(entry)
            .map_err(|source| PublishError::BuildFailed {
                entry: entry.to_path_buf(),
                source,
            })?;
        let dir = self.slot_dir("fresh", index)?;
        let packed = pack(&outcome.root, &dir).map_err(|source| PublishError::PackagingFailed {
            root: outcome.root.clone(),
            source,
        })?;
        log::info!(
            "packed {} {} into {}",
            outcome.package_name,
            outcome.package_version,
            packed.archive_path
        );
        Ok(Artefact::new(packed.archive_path, entry.as_str()))
    }

    /// A staging directory private to one task.
    fn slot_dir(&self, kind: &str, index: usize) -> Result<Utf8PathBuf> {
        let dir = self.staging_dir.join(format!("{kind}-{index}"));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Group entries by pilet root, keeping source indices.
///
/// Groups appear in order of their first entry. An entry with no pilet root
/// forms its own group; its build reports the missing `package.json`.
fn group_by_root<'e>(entries: &[&'e Utf8PathBuf]) -> Vec<Vec<(usize, &'e Utf8Path)>> {
    let mut groups: Vec<(Utf8PathBuf, Vec<(usize, &'e Utf8Path)>)> = Vec::new();
    for (index, &entry) in entries.iter().enumerate() {
        let root = find_pilet_root(entry).unwrap_or_else(|_| entry.clone());
        match groups.iter_mut().find(|(key, _)| *key == root) {
            Some((_, members)) => members.push((index, entry.as_path())),
            None => groups.push((root, vec![(index, entry.as_path())])),
        }
    }
    groups.into_iter().map(|(_, members)| members).collect()
}

/// Unwrap ordered results, logging every failure and returning the first.
fn first_error<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut first = None;
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) => {
                log::warn!("{e}");
                first.get_or_insert(e);
            }
        }
    }
    match first {
        Some(e) => Err(e),
        None => Ok(values),
    }
}

#[cfg(test)]
#[path = "resolution_tests.rs"]
mod tests;
