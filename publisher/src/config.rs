//! Immutable release configuration.
//!
//! Command-line arguments are converted once into a [`ReleaseConfig`] that is
//! shared by reference with every pipeline stage.

use crate::auth::AuthScheme;
use crate::builder::BuildFlags;
use crate::cli::{DEFAULT_BUNDLER, DEFAULT_REGISTRY, PublishArgs, SourceKind};
use crate::error::{PublishError, Result};
use crate::hooks::HookSpec;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeMap;
use std::fmt;

/// How artefacts are acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    /// Build and pack entry modules.
    Fresh,
    /// Expand filesystem globs.
    Local,
    /// Download URLs.
    Remote,
    /// Resolve npm specifiers, then download their tarballs.
    Npm,
}

impl AcquisitionMode {
    /// Sources used when none are given, if the mode has any.
    #[must_use]
    pub fn default_sources(self) -> Vec<String> {
        match self {
            Self::Fresh => vec!["src/index.tsx".to_owned()],
            Self::Local => vec!["*.tgz".to_owned()],
            Self::Remote | Self::Npm => Vec::new(),
        }
    }
}

impl fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fresh => "fresh",
            Self::Local => "local",
            Self::Remote => "remote",
            Self::Npm => "npm",
        })
    }
}

/// Settings that only apply to fresh builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    /// Bundler program.
    pub bundler: String,
    /// Bundler toggles.
    pub flags: BuildFlags,
    /// Hook commands in registration order.
    pub hooks: Vec<HookSpec>,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            bundler: DEFAULT_BUNDLER.to_owned(),
            flags: BuildFlags::default(),
            hooks: Vec::new(),
        }
    }
}

/// Configuration for one publish run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseConfig {
    /// Globs, URLs, specifiers, or entry modules, in order.
    pub sources: Vec<String>,
    /// Acquisition strategy.
    pub mode: AcquisitionMode,
    /// Feed upload URL; empty when not configured.
    pub feed_url: String,
    /// Statically configured API key.
    pub api_key: Option<String>,
    /// How the key is presented.
    pub auth_scheme: AuthScheme,
    /// Custom CA certificate path.
    pub cert_path: Option<Utf8PathBuf>,
    /// Extra multipart form fields.
    pub fields: BTreeMap<String, String>,
    /// Extra request headers.
    pub headers: BTreeMap<String, String>,
    /// Allow prompting for a key.
    pub interactive: bool,
    /// Directory relative sources resolve against.
    pub base_dir: Utf8PathBuf,
    /// npm registry base URL.
    pub registry_url: String,
    /// Fresh build settings.
    pub build: BuildSettings,
    /// Suppress progress output.
    pub quiet: bool,
}

impl ReleaseConfig {
    /// Create a configuration with the mode's default sources and all other
    /// settings at their defaults.
    ///
    /// # Examples
    ///
    /// ```
    /// use pilet_publish::config::{AcquisitionMode, ReleaseConfig};
    ///
    /// let config = ReleaseConfig::new("https://feed.example/api", AcquisitionMode::Local);
    /// assert_eq!(config.sources, vec!["*.tgz".to_owned()]);
    /// assert!(!config.interactive);
    /// ```
    #[must_use]
    pub fn new(feed_url: impl Into<String>, mode: AcquisitionMode) -> Self {
        Self {
            sources: mode.default_sources(),
            mode,
            feed_url: feed_url.into(),
            api_key: None,
            auth_scheme: AuthScheme::default(),
            cert_path: None,
            fields: BTreeMap::new(),
            headers: BTreeMap::new(),
            interactive: false,
            base_dir: Utf8PathBuf::from("."),
            registry_url: DEFAULT_REGISTRY.to_owned(),
            build: BuildSettings::default(),
            quiet: false,
        }
    }

    /// Replace the sources.
    #[must_use]
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Convert parsed arguments into a configuration.
    ///
    /// `cwd` is used as the base directory when `--base-dir` is absent and to
    /// anchor a relative one.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::InvalidArgument`] when `--fresh` is combined
    /// with a remote or npm source, or when a mode without default sources is
    /// given none.
    pub fn from_args(args: &PublishArgs, cwd: &Utf8Path) -> Result<Self> {
        let mode = acquisition_mode(args.fresh, args.from)?;
        let sources = if args.sources.is_empty() {
            mode.default_sources()
        } else {
            args.sources.clone()
        };
        if sources.is_empty() {
            return Err(PublishError::InvalidArgument {
                argument: "SOURCE",
                reason: format!("{mode} mode needs at least one source"),
            });
        }

        let base_dir = match &args.base_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => cwd.join(dir),
            None => cwd.to_path_buf(),
        };

        Ok(Self {
            sources,
            mode,
            feed_url: args.url.clone().unwrap_or_default().trim().to_owned(),
            api_key: args.api_key.clone().filter(|key| !key.is_empty()),
            auth_scheme: args.auth.clone(),
            cert_path: args.ca_cert.clone(),
            fields: args.field.iter().cloned().collect(),
            headers: args.header.iter().cloned().collect(),
            interactive: args.interactive,
            base_dir,
            registry_url: args.registry.clone(),
            build: BuildSettings {
                bundler: args.bundler.clone(),
                flags: BuildFlags {
                    minify: !args.build.no_minify,
                    source_maps: !args.build.no_source_maps,
                    declaration: !args.build.no_declaration,
                    content_hash: !args.build.no_content_hash,
                    schema_version: args.build.schema.clone(),
                },
                hooks: args.hook.clone(),
            },
            quiet: args.quiet,
        })
    }
}

fn acquisition_mode(fresh: bool, from: SourceKind) -> Result<AcquisitionMode> {
    match (fresh, from) {
        (true, SourceKind::Local) => Ok(AcquisitionMode::Fresh),
        (true, other) => Err(PublishError::InvalidArgument {
            argument: "--fresh",
            reason: format!("cannot be combined with --from {}", source_kind_name(other)),
        }),
        (false, SourceKind::Local) => Ok(AcquisitionMode::Local),
        (false, SourceKind::Remote) => Ok(AcquisitionMode::Remote),
        (false, SourceKind::Npm) => Ok(AcquisitionMode::Npm),
    }
}

const fn source_kind_name(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Local => "local",
        SourceKind::Remote => "remote",
        SourceKind::Npm => "npm",
    }
}

/// Parse a `KEY=VALUE` argument.
///
/// # Errors
///
/// Returns a message when the `=` is missing or the key is empty.
///
/// # Examples
///
/// ```
/// use pilet_publish::config::parse_key_value;
///
/// assert_eq!(
///     parse_key_value("x-team=core=1"),
///     Ok(("x-team".to_owned(), "core=1".to_owned()))
/// );
/// assert!(parse_key_value("novalue").is_err());
/// ```
pub fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_owned(), value.to_owned()))
}
