//! npm registry lookups.
//!
//! Resolves a package specifier to the tarball URL of one published version.
//! The registry's packument (`GET <registry>/<name>`) lists every version and
//! its dist-tags; the requested version is chosen by exact match, then by tag,
//! then as the highest version satisfying a semver range.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Dist-tag used when a specifier names no version.
pub const DEFAULT_TAG: &str = "latest";

/// Errors arising from registry lookups.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The specifier could not be parsed.
    #[error("invalid package specifier '{specifier}': {reason}")]
    InvalidSpecifier {
        /// The rejected specifier.
        specifier: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The registry does not know the package.
    #[error("package {name} not found in registry")]
    PackageNotFound {
        /// Package name.
        name: String,
    },

    /// No published version matches the requirement.
    #[error("no version of {name} matches '{requirement}'")]
    VersionNotFound {
        /// Package name.
        name: String,
        /// Version, tag, or range that was requested.
        requirement: String,
    },

    /// The registry request failed.
    #[error("registry request for {name} failed: {reason}")]
    Http {
        /// Package name.
        name: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The registry answered with something other than a packument.
    #[error("invalid registry response for {name}: {reason}")]
    InvalidResponse {
        /// Package name.
        name: String,
        /// Parser message.
        reason: String,
    },
}

/// A package name with an optional version, tag, or range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpecifier {
    /// Package name, possibly scoped.
    pub name: String,
    /// Version, dist-tag, or semver range.
    pub requirement: Option<String>,
}

impl PackageSpecifier {
    /// The requirement, or [`DEFAULT_TAG`].
    #[must_use]
    pub fn requirement_or_default(&self) -> &str {
        self.requirement.as_deref().unwrap_or(DEFAULT_TAG)
    }
}

impl fmt::Display for PackageSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requirement {
            Some(requirement) => write!(f, "{}@{requirement}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for PackageSpecifier {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let invalid = |reason: &str| RegistryError::InvalidSpecifier {
            specifier: s.to_owned(),
            reason: reason.to_owned(),
        };

        // A leading `@` belongs to the scope, not the version separator.
        let split_at = raw
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '@')
            .map(|(index, _)| index);
        let (name, requirement) = match split_at {
            Some(index) => {
                let (name, rest) = raw.split_at(index);
                let requirement = rest.trim_start_matches('@').trim();
                if requirement.is_empty() {
                    return Err(invalid("empty version after '@'"));
                }
                (name, Some(requirement.to_owned()))
            }
            None => (raw, None),
        };

        if name.is_empty() {
            return Err(invalid("empty package name"));
        }
        if let Some(scoped) = name.strip_prefix('@') {
            let valid = scoped
                .split_once('/')
                .is_some_and(|(scope, pkg)| !scope.is_empty() && !pkg.is_empty() && !pkg.contains('/'));
            if !valid {
                return Err(invalid("scoped names must look like @scope/name"));
            }
        } else if name.contains('/') {
            return Err(invalid("unscoped names cannot contain '/'"));
        }

        Ok(Self {
            name: name.to_owned(),
            requirement,
        })
    }
}

/// Resolves specifiers to tarball URLs.
///
/// Implementations must be shareable across threads because lookups run
/// concurrently.
#[cfg_attr(test, mockall::automock)]
pub trait RegistryLookup: Send + Sync {
    /// Return the tarball URL for `specifier`.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] when the package or a matching version
    /// cannot be found, or the registry cannot be reached.
    fn tarball_url(&self, specifier: &PackageSpecifier) -> Result<String, RegistryError>;
}

/// The subset of a registry packument the lookup needs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Packument {
    /// Tag name to version.
    #[serde(rename = "dist-tags", default)]
    pub dist_tags: BTreeMap<String, String>,
    /// Version string to metadata.
    #[serde(default)]
    pub versions: BTreeMap<String, PackumentVersion>,
}

/// One version entry of a packument.
#[derive(Debug, Clone, Deserialize)]
pub struct PackumentVersion {
    /// Distribution metadata.
    pub dist: PackumentDist,
}

/// Distribution metadata of a version.
#[derive(Debug, Clone, Deserialize)]
pub struct PackumentDist {
    /// Tarball download URL.
    pub tarball: String,
}

/// Pick the tarball URL matching `specifier` from `packument`.
///
/// # Errors
///
/// Returns [`RegistryError::VersionNotFound`] when nothing matches.
pub fn select_tarball(
    packument: &Packument,
    specifier: &PackageSpecifier,
) -> Result<String, RegistryError> {
    let requirement = specifier.requirement_or_default();
    let not_found = || RegistryError::VersionNotFound {
        name: specifier.name.clone(),
        requirement: requirement.to_owned(),
    };

    if let Some(version) = packument.versions.get(requirement) {
        return Ok(version.dist.tarball.clone());
    }
    if let Some(tagged) = packument.dist_tags.get(requirement) {
        return packument
            .versions
            .get(tagged)
            .map(|version| version.dist.tarball.clone())
            .ok_or_else(not_found);
    }

    let range = semver::VersionReq::parse(requirement).map_err(|_| not_found())?;
    packument
        .versions
        .iter()
        .filter_map(|(raw, version)| {
            semver::Version::parse(raw)
                .ok()
                .filter(|parsed| range.matches(parsed))
                .map(|parsed| (parsed, version))
        })
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, version)| version.dist.tarball.clone())
        .ok_or_else(not_found)
}

/// Registry client using `ureq`.
#[derive(Clone)]
pub struct NpmRegistry {
    base_url: String,
    agent: ureq::Agent,
}

impl NpmRegistry {
    /// Create a client for the registry at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, agent: ureq::Agent) -> Self {
        Self {
            base_url: base_url.into(),
            agent,
        }
    }

    /// Packument URL for `name`; the scope separator is percent-encoded.
    ///
    /// # Examples
    ///
    /// ```
    /// use pilet_publish::artefact::registry::NpmRegistry;
    ///
    /// assert_eq!(
    ///     NpmRegistry::packument_url("https://registry.npmjs.org/", "@acme/cart"),
    ///     "https://registry.npmjs.org/@acme%2fcart"
    /// );
    /// ```
    #[must_use]
    pub fn packument_url(base_url: &str, name: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), name.replace('/', "%2f"))
    }

    fn fetch_packument(&self, name: &str) -> Result<Packument, RegistryError> {
        let url = Self::packument_url(&self.base_url, name);
        log::debug!("looking up {name} at {url}");
        let http_error = |reason: String| RegistryError::Http {
            name: name.to_owned(),
            reason,
        };

        let response = self
            .agent
            .get(&url)
            .header("Accept", "application/json")
            .call()
            .map_err(|e| http_error(e.to_string()))?;
        match response.status().as_u16() {
            200..=299 => {}
            404 => {
                return Err(RegistryError::PackageNotFound {
                    name: name.to_owned(),
                });
            }
            other => return Err(http_error(format!("HTTP {other}"))),
        }

        let body = response
            .into_body()
            .read_to_string()
            .map_err(|e| http_error(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| RegistryError::InvalidResponse {
            name: name.to_owned(),
            reason: e.to_string(),
        })
    }
}

impl RegistryLookup for NpmRegistry {
    fn tarball_url(&self, specifier: &PackageSpecifier) -> Result<String, RegistryError> {
        let packument = self.fetch_packument(&specifier.name)?;
        let url = select_tarball(&packument, specifier)?;
        log::debug!("resolved {specifier} to {url}");
        Ok(url)
    }
}
