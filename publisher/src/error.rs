//! Error types for the pilet publishing pipeline.
//!
//! Fatal failures are grouped into precondition and resolution categories so
//! the CLI can map them onto distinct exit codes. Per-artefact upload failures
//! are not errors; they are recorded as [`crate::upload::UploadOutcome`]s and
//! folded into the batch verdict.

use crate::artefact::download::DownloadError;
use crate::artefact::packaging_error::PackagingError;
use crate::artefact::registry::RegistryError;
use crate::builder::BuildError;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Broad classification of a fatal error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration or environment is unusable; nothing was attempted.
    Precondition,
    /// No artefacts could be produced, so there is nothing to upload.
    Resolution,
    /// Anything else (I/O, client construction).
    Internal,
}

/// Errors that abort a publish run.
#[derive(Debug, Error)]
pub enum PublishError {
    /// No feed URL was configured.
    #[error("no feed URL configured; pass --url or set PILET_FEED_URL")]
    MissingFeedUrl,

    /// The feed URL is not an http(s) URL.
    #[error("invalid feed URL {url}: expected an http:// or https:// address")]
    InvalidFeedUrl {
        /// The rejected URL.
        url: String,
    },

    /// A certificate path was configured but the file does not exist.
    #[error("CA certificate not found at {path}")]
    CertificateNotFound {
        /// The configured certificate path.
        path: Utf8PathBuf,
    },

    /// The certificate file exists but could not be read.
    #[error("failed to read CA certificate at {path}")]
    CertificateUnreadable {
        /// The configured certificate path.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The certificate file was read but is not a usable certificate.
    #[error("invalid CA certificate at {path}: {reason}")]
    InvalidCertificate {
        /// The configured certificate path.
        path: Utf8PathBuf,
        /// Parser message.
        reason: String,
    },

    /// No API key was configured and interactive login is disabled.
    #[error("no API key configured; pass --api-key, set PILET_API_KEY, or use --interactive")]
    MissingApiKey,

    /// Interactive credential prompt failed or returned nothing.
    #[error("interactive login failed: {reason}")]
    CredentialPrompt {
        /// Description of the failure.
        reason: String,
    },

    /// Resolution finished without producing a single artefact.
    #[error("no artefacts found for sources: {}", .sources.join(", "))]
    NoArtefactsFound {
        /// The configured sources.
        sources: Vec<String>,
    },

    /// Fresh-build mode matched no entry modules.
    #[error("no entry module matches: {}", .patterns.join(", "))]
    EntryFileMissing {
        /// The configured entry patterns.
        patterns: Vec<String>,
    },

    /// A build root could not be packed.
    #[error("packaging {root} failed")]
    PackagingFailed {
        /// The build root that was being packed.
        root: Utf8PathBuf,
        /// The underlying packaging error.
        #[source]
        source: PackagingError,
    },

    /// Building an entry module failed (bundler or hook).
    #[error("build failed for {entry}")]
    BuildFailed {
        /// The entry module whose build failed.
        entry: Utf8PathBuf,
        /// The underlying build error.
        #[source]
        source: BuildError,
    },

    /// Downloading a remote artefact failed.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Looking up a package on the registry failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A glob pattern could not be parsed.
    #[error("invalid pattern {pattern}: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Parser message.
        reason: String,
    },

    /// A directory matched by a source pattern could not be read.
    #[error("failed to read {path} while expanding sources")]
    SourceUnreadable {
        /// The directory being read.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A command-line value was rejected.
    #[error("invalid value for {argument}: {reason}")]
    InvalidArgument {
        /// Name of the argument.
        argument: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PublishError {
    /// Classify the error for exit-code mapping.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingFeedUrl
            | Self::InvalidFeedUrl { .. }
            | Self::CertificateNotFound { .. }
            | Self::CertificateUnreadable { .. }
            | Self::InvalidCertificate { .. }
            | Self::MissingApiKey
            | Self::CredentialPrompt { .. }
            | Self::InvalidArgument { .. } => ErrorCategory::Precondition,
            Self::NoArtefactsFound { .. }
            | Self::EntryFileMissing { .. }
            | Self::PackagingFailed { .. }
            | Self::BuildFailed { .. }
            | Self::Download(_)
            | Self::Registry(_)
            | Self::InvalidPattern { .. }
            | Self::SourceUnreadable { .. } => ErrorCategory::Resolution,
            Self::Io(_) => ErrorCategory::Internal,
        }
    }

    /// Stable machine-readable code for the error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingFeedUrl => "missing_feed_url",
            Self::InvalidFeedUrl { .. } => "invalid_feed_url",
            Self::CertificateNotFound { .. } => "certificate_not_found",
            Self::CertificateUnreadable { .. } => "certificate_unreadable",
            Self::InvalidCertificate { .. } => "invalid_certificate",
            Self::MissingApiKey => "missing_api_key",
            Self::CredentialPrompt { .. } => "credential_prompt_failed",
            Self::NoArtefactsFound { .. } => "no_artefacts_found",
            Self::EntryFileMissing { .. } => "entry_file_missing",
            Self::PackagingFailed { .. } => "packaging_failed",
            Self::BuildFailed { .. } => "build_failed",
            Self::Download(_) => "download_failed",
            Self::Registry(_) => "registry_lookup_failed",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::SourceUnreadable { .. } => "source_unreadable",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::Io(_) => "io",
        }
    }

    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Precondition => 2,
            ErrorCategory::Resolution => 3,
            ErrorCategory::Internal => 4,
        }
    }
}

/// Result type alias using [`PublishError`].
pub type Result<T> = std::result::Result<T, PublishError>;
