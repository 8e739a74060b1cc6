//! Remote artefact downloads.
//!
//! Provides a trait-based abstraction for fetching artefact archives over
//! HTTP, enabling dependency injection for testing. The production
//! implementation shares the run's `ureq` agent, so custom trust material
//! applies to every download.

use std::path::Path;

/// File name used when a URL has no usable last path segment.
pub const FALLBACK_FILE_NAME: &str = "pilet.tgz";

/// Trait for downloading artefact files.
///
/// Implementations must be shareable across threads because downloads run
/// concurrently.
#[cfg_attr(test, mockall::automock)]
pub trait Downloader: Send + Sync {
    /// Download `url` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, the server answers with a
    /// non-success status, or the file cannot be written.
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}

/// Errors arising from artefact download operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// HTTP request failed.
    #[error("download failed for {url}: {reason}")]
    HttpError {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The requested artefact was not found (HTTP 404).
    #[error("artefact not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// I/O error writing the downloaded file.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTP-based downloader using `ureq`.
#[derive(Clone)]
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl HttpDownloader {
    /// Create a downloader sharing `agent`.
    #[must_use]
    pub fn new(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl Downloader for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        log::debug!("downloading {url}");
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| map_ureq_error(url, &e))?;
        check_status(url, response.status().as_u16())?;

        let mut file = std::fs::File::create(dest)?;
        std::io::copy(&mut response.into_body().as_reader(), &mut file)
            .map_err(DownloadError::Io)?;
        log::debug!("downloaded {url} to {}", dest.display());
        Ok(())
    }
}

/// Derive a local file name from a download URL.
///
/// Uses the last path segment with query and fragment removed, falling back
/// to [`FALLBACK_FILE_NAME`].
///
/// # Examples
///
/// ```
/// use pilet_publish::artefact::download::file_name_from_url;
///
/// assert_eq!(
///     file_name_from_url("https://cdn.example/pilets/cart-1.0.0.tgz?sig=abc"),
///     "cart-1.0.0.tgz"
/// );
/// assert_eq!(file_name_from_url("https://cdn.example/"), "pilet.tgz");
/// ```
#[must_use]
pub fn file_name_from_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or_default();
    let without_query = without_fragment.split('?').next().unwrap_or_default();
    let after_scheme = without_query
        .split_once("://")
        .map_or(without_query, |(_, rest)| rest);
    let Some((_, path)) = after_scheme.split_once('/') else {
        return FALLBACK_FILE_NAME.to_owned();
    };

    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
        .filter(|segment| !segment.contains('\\'))
        .map_or_else(|| FALLBACK_FILE_NAME.to_owned(), ToOwned::to_owned)
}

/// Map a non-success status to a [`DownloadError`].
fn check_status(url: &str, status: u16) -> Result<(), DownloadError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(DownloadError::NotFound {
            url: url.to_owned(),
        }),
        other => Err(DownloadError::HttpError {
            url: url.to_owned(),
            reason: format!("HTTP {other}"),
        }),
    }
}

/// Map a ureq error to a [`DownloadError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> DownloadError {
    match err {
        ureq::Error::StatusCode(404) => DownloadError::NotFound {
            url: url.to_owned(),
        },
        other => DownloadError::HttpError {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
