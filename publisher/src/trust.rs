//! CA certificate loading.
//!
//! The configured certificate is read once at the start of a run. The bytes
//! are kept in a [`TrustMaterial`] owned by the run context and lent to the
//! HTTP agent used for every download, lookup and upload.

use crate::error::{PublishError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::ErrorKind;

/// Raw certificate bytes and where they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustMaterial {
    path: Utf8PathBuf,
    bytes: Vec<u8>,
}

impl TrustMaterial {
    /// Wrap already-loaded certificate bytes.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>, bytes: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            bytes,
        }
    }

    /// Path the certificate was read from.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Certificate bytes, PEM or DER.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the bytes look like PEM text.
    #[must_use]
    pub fn is_pem(&self) -> bool {
        self.bytes
            .windows(b"-----BEGIN".len())
            .any(|window| window == b"-----BEGIN")
    }
}

/// Load the certificate at `path`.
///
/// Returns `Ok(None)` when no path is configured or the file does not exist.
///
/// # Errors
///
/// Returns [`PublishError::CertificateUnreadable`] when the file exists but
/// cannot be read.
///
/// # Examples
///
/// ```
/// use pilet_publish::trust::load_trust_material;
///
/// assert!(load_trust_material(None)?.is_none());
/// # Ok::<(), pilet_publish::error::PublishError>(())
/// ```
pub fn load_trust_material(path: Option<&Utf8Path>) -> Result<Option<TrustMaterial>> {
    let Some(path) = path else {
        return Ok(None);
    };
    match std::fs::read(path) {
        Ok(bytes) => {
            log::debug!("loaded {} bytes of trust material from {path}", bytes.len());
            Ok(Some(TrustMaterial::new(path, bytes)))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("no certificate at {path}");
            Ok(None)
        }
        Err(source) => Err(PublishError::CertificateUnreadable {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Load the certificate at `path`, treating a configured but missing file as
/// fatal.
///
/// # Errors
///
/// Returns [`PublishError::CertificateNotFound`] when a path is configured
/// but nothing exists there, or any error from [`load_trust_material`].
pub fn require_trust_material(path: Option<&Utf8Path>) -> Result<Option<TrustMaterial>> {
    match (path, load_trust_material(path)?) {
        (Some(path), None) => Err(PublishError::CertificateNotFound {
            path: path.to_path_buf(),
        }),
        (_, material) => Ok(material),
    }
}
