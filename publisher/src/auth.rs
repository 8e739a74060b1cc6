//! Authorization schemes and the run-scoped credential cache.
//!
//! The feed accepts an API key through the `Authorization` header. When no
//! key is configured and interactive login is allowed, the token is obtained
//! once per run through a [`CredentialPrompt`] and cached in
//! [`CredentialCache`], which lives in the pipeline's run context.

use crate::config::ReleaseConfig;
use crate::error::{PublishError, Result};
use std::fmt;
use std::io::{BufRead, Write};
use std::str::FromStr;

/// How the API key is presented to the feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AuthScheme {
    /// Send the raw key as the header value.
    None,
    /// `Authorization: Basic <key>`.
    #[default]
    Basic,
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// `Authorization: Digest <key>`.
    Digest,
    /// `Authorization: <scheme> <key>` for any other scheme.
    Custom(String),
}

impl AuthScheme {
    /// Render the `Authorization` header value for `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use pilet_publish::auth::AuthScheme;
    ///
    /// assert_eq!(AuthScheme::Bearer.authorization("abc"), "Bearer abc");
    /// assert_eq!(AuthScheme::None.authorization("abc"), "abc");
    /// ```
    #[must_use]
    pub fn authorization(&self, key: &str) -> String {
        match self {
            Self::None => key.to_owned(),
            Self::Basic => format!("Basic {key}"),
            Self::Bearer => format!("Bearer {key}"),
            Self::Digest => format!("Digest {key}"),
            Self::Custom(scheme) => format!("{scheme} {key}"),
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Basic => f.write_str("basic"),
            Self::Bearer => f.write_str("bearer"),
            Self::Digest => f.write_str("digest"),
            Self::Custom(scheme) => f.write_str(scheme),
        }
    }
}

impl FromStr for AuthScheme {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
            return Err(format!("invalid auth scheme '{s}'"));
        }
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "none" => Self::None,
            "basic" => Self::Basic,
            "bearer" => Self::Bearer,
            "digest" => Self::Digest,
            _ => Self::Custom(trimmed.to_owned()),
        })
    }
}

/// Obtains a feed token out of band.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialPrompt {
    /// Ask for a token for `feed_url`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error when the prompt cannot be shown or answered.
    fn request_token(&self, feed_url: &str) -> std::io::Result<String>;
}

/// Prompts on stderr and reads the token from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl CredentialPrompt for TerminalPrompt {
    fn request_token(&self, feed_url: &str) -> std::io::Result<String> {
        let mut stderr = std::io::stderr();
        write!(stderr, "API key for {feed_url}: ")?;
        stderr.flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim().to_owned())
    }
}

/// Run-scoped credential state.
///
/// A statically configured key always wins. Otherwise a prompted token is
/// cached for the rest of the run so the user is asked at most once, unless
/// the feed rejects it and [`CredentialCache::refresh`] is called.
#[derive(Debug, Default)]
pub struct CredentialCache {
    token: Option<String>,
    prompts: usize,
}

impl CredentialCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the key to use for uploads.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::MissingApiKey`] when no key is configured and
    /// the run is not interactive, or [`PublishError::CredentialPrompt`] when
    /// the prompt fails or yields an empty token.
    pub fn resolve(
        &mut self,
        config: &ReleaseConfig,
        prompt: &dyn CredentialPrompt,
    ) -> Result<String> {
        if let Some(key) = config.api_key.as_deref().filter(|key| !key.is_empty()) {
            return Ok(key.to_owned());
        }
        if let Some(token) = &self.token {
            return Ok(token.clone());
        }
        if !config.interactive {
            return Err(PublishError::MissingApiKey);
        }
        self.ask(config, prompt)
    }

    /// Discard a rejected prompted token and ask again.
    ///
    /// Statically configured keys are never re-prompted.
    ///
    /// # Errors
    ///
    /// Same as [`CredentialCache::resolve`].
    pub fn refresh(
        &mut self,
        config: &ReleaseConfig,
        prompt: &dyn CredentialPrompt,
    ) -> Result<String> {
        if config.api_key.as_deref().is_some_and(|key| !key.is_empty()) || !config.interactive {
            return Err(PublishError::MissingApiKey);
        }
        self.token = None;
        self.ask(config, prompt)
    }

    /// Whether a token was obtained through the prompt this run.
    #[must_use]
    pub const fn is_prompted(&self) -> bool {
        self.token.is_some()
    }

    /// Number of prompts shown this run.
    #[must_use]
    pub const fn prompts(&self) -> usize {
        self.prompts
    }

    fn ask(&mut self, config: &ReleaseConfig, prompt: &dyn CredentialPrompt) -> Result<String> {
        self.prompts += 1;
        let token = prompt
            .request_token(&config.feed_url)
            .map_err(|e| PublishError::CredentialPrompt {
                reason: e.to_string(),
            })?;
        let token = token.trim().to_owned();
        if token.is_empty() {
            return Err(PublishError::CredentialPrompt {
                reason: "no token entered".to_owned(),
            });
        }
        log::debug!("obtained interactive credential for {}", config.feed_url);
        self.token = Some(token.clone());
        Ok(token)
    }
}
