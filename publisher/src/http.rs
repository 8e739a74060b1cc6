//! HTTP agent construction.
//!
//! One `ureq` agent is built per run. When trust material is loaded its
//! certificates replace the default roots. HTTP error statuses are returned as
//! responses so callers can classify them.

use crate::error::{PublishError, Result};
use crate::trust::TrustMaterial;
use std::sync::Arc;
use std::time::Duration;
use ureq::tls::{Certificate, PemItem, RootCerts, TlsConfig};

/// Network timeout applied to every request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Build the run's HTTP agent.
///
/// # Errors
///
/// Returns [`PublishError::InvalidCertificate`] when the trust material holds
/// no usable certificate.
pub fn agent(trust: Option<&TrustMaterial>) -> Result<ureq::Agent> {
    let mut builder = ureq::Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(REQUEST_TIMEOUT));

    if let Some(trust) = trust {
        let certificates = certificates(trust)?;
        log::debug!(
            "using {} custom root certificate(s) from {}",
            certificates.len(),
            trust.path()
        );
        let tls = TlsConfig::builder()
            .root_certs(RootCerts::Specific(Arc::new(certificates)))
            .build();
        builder = builder.tls_config(tls);
    }

    Ok(ureq::Agent::new_with_config(builder.build()))
}

/// Decode every certificate in the trust material.
///
/// PEM bundles may hold several certificates; anything else is read as a
/// single DER certificate.
///
/// # Errors
///
/// Returns [`PublishError::InvalidCertificate`] when PEM parsing fails or
/// yields no certificates.
pub fn certificates(trust: &TrustMaterial) -> Result<Vec<Certificate<'static>>> {
    let invalid = |reason: String| PublishError::InvalidCertificate {
        path: trust.path().to_path_buf(),
        reason,
    };

    if !trust.is_pem() {
        if trust.bytes().is_empty() {
            return Err(invalid("file is empty".to_owned()));
        }
        return Ok(vec![Certificate::from_der(trust.bytes()).to_owned()]);
    }

    let mut certificates = Vec::new();
    for item in ureq::tls::parse_pem(trust.bytes()) {
        match item.map_err(|e| invalid(e.to_string()))? {
            PemItem::Certificate(certificate) => certificates.push(certificate.to_owned()),
            _ => log::debug!("ignoring non-certificate PEM item in {}", trust.path()),
        }
    }

    if certificates.is_empty() {
        return Err(invalid("no certificates found".to_owned()));
    }
    Ok(certificates)
}
