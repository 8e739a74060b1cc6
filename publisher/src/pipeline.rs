//! End-to-end publish orchestration.
//!
//! A run checks its preconditions (feed URL, trust material, credential)
//! before any network activity, resolves every artefact, and only then starts
//! the sequential upload loop. Collaborators are produced by a
//! [`ServiceFactory`] so tests can replace the network and the bundler.

use crate::artefact::download::{Downloader, HttpDownloader};
use crate::artefact::registry::{NpmRegistry, RegistryLookup};
use crate::auth::{CredentialCache, CredentialPrompt, TerminalPrompt};
use crate::batch::{Batch, BatchReport};
use crate::builder::{BuildBackend, BuildOptions, Builder, CommandBuildBackend, DEFAULT_OUT_DIR};
use crate::command::{CommandExecutor, SystemCommandExecutor};
use crate::config::ReleaseConfig;
use crate::error::{PublishError, Result};
use crate::hooks::HookRegistry;
use crate::http;
use crate::output::{batch_header, summary_lines, write_stderr_line};
use crate::resolution::Resolver;
use crate::trust::{TrustMaterial, require_trust_material};
use crate::upload::{FeedClient, HttpFeedClient};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

/// Collaborators for one run.
pub struct Services {
    /// Upload transport.
    pub feed: Box<dyn FeedClient>,
    /// Remote artefact downloads.
    pub downloader: Box<dyn Downloader>,
    /// npm registry lookups.
    pub registry: Box<dyn RegistryLookup>,
    /// Bundler for fresh builds.
    pub backend: Box<dyn BuildBackend>,
    /// Out-of-band credential prompt.
    pub prompt: Box<dyn CredentialPrompt>,
    /// Build lifecycle hooks.
    pub hooks: HookRegistry,
}

/// Produces the collaborators for a run once preconditions hold.
pub trait ServiceFactory {
    /// Create services for `config`, trusting `trust` for TLS when present.
    ///
    /// # Errors
    ///
    /// Returns an error when a client cannot be constructed.
    fn services(&self, config: &ReleaseConfig, trust: Option<&TrustMaterial>) -> Result<Services>;
}

impl<F> ServiceFactory for F
where
    F: Fn(&ReleaseConfig, Option<&TrustMaterial>) -> Result<Services>,
{
    fn services(&self, config: &ReleaseConfig, trust: Option<&TrustMaterial>) -> Result<Services> {
        self(config, trust)
    }
}

/// Real collaborators: `ureq` for HTTP, the configured bundler CLI, and a
/// terminal prompt.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpServices;

impl ServiceFactory for HttpServices {
    fn services(&self, config: &ReleaseConfig, trust: Option<&TrustMaterial>) -> Result<Services> {
        let agent = http::agent(trust)?;
        let executor: Arc<dyn CommandExecutor> = Arc::new(SystemCommandExecutor);
        Ok(Services {
            feed: Box::new(HttpFeedClient::new(agent.clone())),
            downloader: Box::new(HttpDownloader::new(agent.clone())),
            registry: Box::new(NpmRegistry::new(config.registry_url.clone(), agent)),
            backend: Box::new(CommandBuildBackend::new(
                config.build.bundler.clone(),
                Arc::clone(&executor),
            )),
            prompt: Box::new(TerminalPrompt),
            hooks: HookRegistry::from_specs(&config.build.hooks, &executor),
        })
    }
}

/// Publish with real collaborators.
///
/// # Errors
///
/// See [`publish_with`].
pub fn publish(config: &ReleaseConfig, stderr: &mut dyn Write) -> Result<BatchReport> {
    publish_with(config, &HttpServices, stderr)
}

/// State owned by one run and dropped with it.
///
/// The staging directory holds downloads and freshly packed archives; it is
/// removed when the context is dropped.
pub struct RunContext {
    trust: Option<TrustMaterial>,
    staging: TempDir,
    staging_dir: Utf8PathBuf,
    credentials: CredentialCache,
}

impl RunContext {
    /// Check the feed URL and load trust material.
    ///
    /// # Errors
    ///
    /// Returns a precondition error for the feed URL or certificate, or an
    /// I/O error when the staging directory cannot be created.
    pub fn prepare(config: &ReleaseConfig) -> Result<Self> {
        validate_feed_url(&config.feed_url)?;
        let trust = require_trust_material(config.cert_path.as_deref())?;
        let staging = tempfile::Builder::new().prefix("pilet-publish-").tempdir()?;
        let staging_dir = Utf8PathBuf::try_from(staging.path().to_path_buf())
            .map_err(camino::FromPathBufError::into_io_error)?;
        log::debug!("staging artefacts in {staging_dir}");
        Ok(Self {
            trust,
            staging,
            staging_dir,
            credentials: CredentialCache::new(),
        })
    }

    /// Trust material loaded for this run.
    #[must_use]
    pub fn trust(&self) -> Option<&TrustMaterial> {
        self.trust.as_ref()
    }

    /// Directory for downloads and packed archives.
    #[must_use]
    pub fn staging_dir(&self) -> &Utf8Path {
        &self.staging_dir
    }

    /// Remove the staging directory now rather than on drop.
    ///
    /// # Errors
    ///
    /// Returns the I/O error when removal fails.
    pub fn close(self) -> Result<()> {
        self.staging.close()?;
        Ok(())
    }
}

/// Publish with collaborators from `factory`.
///
/// Upload failures do not make this fail; they are reported in the returned
/// [`BatchReport`].
///
/// # Errors
///
/// Returns a precondition error (feed URL, certificate, credential) before
/// any network activity, or a resolution error when nothing can be uploaded.
pub fn publish_with(
    config: &ReleaseConfig,
    factory: &dyn ServiceFactory,
    stderr: &mut dyn Write,
) -> Result<BatchReport> {
    let mut context = RunContext::prepare(config)?;
    let services = factory.services(config, context.trust())?;
    let credential = context
        .credentials
        .resolve(config, services.prompt.as_ref())?;

    let build_options = BuildOptions {
        flags: config.build.flags.clone(),
        hooks: services.hooks,
        out_dir_name: DEFAULT_OUT_DIR.to_owned(),
    };
    let resolver = Resolver::new(
        context.staging_dir(),
        services.downloader.as_ref(),
        services.registry.as_ref(),
        Builder::new(services.backend.as_ref(), &build_options),
    );
    let artefacts = resolver.resolve(config)?;

    if !config.quiet {
        write_stderr_line(stderr, batch_header(artefacts.len(), &config.feed_url));
    }
    let report = Batch::new(
        config,
        services.feed.as_ref(),
        services.prompt.as_ref(),
        &mut context.credentials,
        credential,
    )
    .run(&artefacts, stderr);

    for line in summary_lines(&report) {
        write_stderr_line(stderr, line);
    }
    if let Err(e) = context.close() {
        log::warn!("could not remove staging directory: {e}");
    }
    Ok(report)
}

/// Reject an empty or non-http(s) feed URL.
///
/// # Errors
///
/// Returns [`PublishError::MissingFeedUrl`] or [`PublishError::InvalidFeedUrl`].
pub fn validate_feed_url(url: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(PublishError::MissingFeedUrl);
    }
    let lower = url.to_ascii_lowercase();
    let rest = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.starts_with('/') => Ok(()),
        _ => Err(PublishError::InvalidFeedUrl {
            url: url.to_owned(),
        }),
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
