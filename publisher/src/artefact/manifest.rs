//! `package.json` reading for pilet roots.
//!
//! Only the fields needed for naming and packing are parsed; everything else
//! in the file is ignored.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// File name of the package manifest.
pub const MANIFEST_FILE: &str = "package.json";

/// Errors arising from manifest reading.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// The manifest file could not be read.
    #[error("failed to read {path}")]
    Io {
        /// Path to the manifest.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The manifest is not valid JSON or has the wrong shape.
    #[error("invalid {path}: {source}")]
    Json {
        /// Path to the manifest.
        path: Utf8PathBuf,
        /// The parser error.
        #[source]
        source: serde_json::Error,
    },

    /// A required field is missing or empty.
    #[error("{path} has no {field}")]
    MissingField {
        /// Path to the manifest.
        path: Utf8PathBuf,
        /// The missing field.
        field: &'static str,
    },
}

/// The subset of `package.json` the publisher uses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageManifest {
    /// Package name, possibly scoped (`@scope/name`).
    #[serde(default)]
    pub name: String,
    /// Package version.
    #[serde(default)]
    pub version: String,
    /// Explicit list of files and directories to pack.
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

impl PackageManifest {
    /// Read and validate `<root>/package.json`.
    ///
    /// # Errors
    ///
    /// Returns a [`ManifestError`] when the file is unreadable, malformed, or
    /// lacks a name or version.
    pub fn read(root: &Utf8Path) -> Result<Self, ManifestError> {
        let path = root.join(MANIFEST_FILE);
        let text = std::fs::read_to_string(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(&text, &path)
    }

    /// Parse manifest JSON read from `path`.
    ///
    /// # Errors
    ///
    /// Same as [`PackageManifest::read`], minus I/O.
    ///
    /// # Examples
    ///
    /// ```
    /// use camino::Utf8Path;
    /// use pilet_publish::artefact::manifest::PackageManifest;
    ///
    /// let manifest = PackageManifest::parse(
    ///     r#"{"name":"@acme/cart","version":"1.2.0"}"#,
    ///     Utf8Path::new("package.json"),
    /// )?;
    /// assert_eq!(manifest.archive_stem(), "acme-cart-1.2.0");
    /// # Ok::<(), pilet_publish::artefact::manifest::ManifestError>(())
    /// ```
    pub fn parse(text: &str, path: &Utf8Path) -> Result<Self, ManifestError> {
        let manifest: Self = serde_json::from_str(text).map_err(|source| ManifestError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        for (field, value) in [("name", &manifest.name), ("version", &manifest.version)] {
            if value.trim().is_empty() {
                return Err(ManifestError::MissingField {
                    path: path.to_path_buf(),
                    field,
                });
            }
        }
        Ok(manifest)
    }

    /// Archive file stem in npm's `<scope>-<name>-<version>` form.
    #[must_use]
    pub fn archive_stem(&self) -> String {
        let name = self.name.trim_start_matches('@').replace('/', "-");
        format!("{name}-{}", self.version)
    }

    /// Archive file name (`<stem>.tgz`).
    #[must_use]
    pub fn archive_name(&self) -> String {
        format!("{}.tgz", self.archive_stem())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn parse(text: &str) -> Result<PackageManifest, ManifestError> {
        PackageManifest::parse(text, Utf8Path::new("/pilet/package.json"))
    }

    #[rstest]
    #[case(r#"{"name":"cart","version":"0.1.0"}"#, "cart-0.1.0.tgz")]
    #[case(r#"{"name":"@acme/cart","version":"2.0.0-beta.1"}"#, "acme-cart-2.0.0-beta.1.tgz")]
    fn archive_names_follow_npm_pack(#[case] json: &str, #[case] expected: &str) {
        assert_eq!(parse(json).expect("valid").archive_name(), expected);
    }

    #[test]
    fn files_list_is_optional() {
        let manifest = parse(r#"{"name":"cart","version":"1.0.0","main":"dist/index.js"}"#)
            .expect("valid");
        assert!(manifest.files.is_none());

        let manifest =
            parse(r#"{"name":"cart","version":"1.0.0","files":["dist"]}"#).expect("valid");
        assert_eq!(manifest.files, Some(vec!["dist".to_owned()]));
    }

    #[rstest]
    #[case(r#"{"version":"1.0.0"}"#, "name")]
    #[case(r#"{"name":"cart","version":" "}"#, "version")]
    fn missing_fields_are_reported(#[case] json: &str, #[case] expected: &str) {
        let err = parse(json).expect_err("incomplete manifest");
        assert!(matches!(err, ManifestError::MissingField { field, .. } if field == expected));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(parse("{"), Err(ManifestError::Json { .. })));
    }

    #[test]
    fn read_reports_missing_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8Path::from_path(dir.path()).expect("UTF-8 temp path");
        assert!(matches!(
            PackageManifest::read(root),
            Err(ManifestError::Io { .. })
        ));
    }
}
