//! Upload requests and outcome classification.
//!
//! Each artefact is read fully into memory, wrapped in a `multipart/form-data`
//! body together with the configured extra fields, and sent to the feed with
//! the configured headers and `Authorization`. The response status is
//! classified into an [`UploadOutcome`]; no upload failure is an error at this
//! level.

use crate::config::ReleaseConfig;
use crate::resolution::Artefact;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Content type of the artefact part.
pub const ARTEFACT_CONTENT_TYPE: &str = "application/gzip";

/// Form field name of the artefact part.
pub const ARTEFACT_FIELD: &str = "file";

/// How an upload attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadClassification {
    /// The feed accepted the artefact (2xx).
    Success,
    /// Quota or billing problem (402).
    PaymentRequired,
    /// The version is already published (409).
    VersionConflict,
    /// The artefact exceeds the feed's size limit (413).
    PayloadTooLarge,
    /// Any other non-2xx status.
    Failed,
    /// The artefact could not be read; nothing was sent.
    Unreadable,
    /// The request never produced a response.
    Transport,
}

impl UploadClassification {
    /// Whether this classification counts as a successful upload.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Human-readable description for summaries.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "uploaded",
            Self::PaymentRequired => "payment required: the feed's quota or plan does not allow this upload",
            Self::VersionConflict => "version already exists on the feed",
            Self::PayloadTooLarge => "payload too large for the feed",
            Self::Failed => "upload failed",
            Self::Unreadable => "artefact could not be read",
            Self::Transport => "could not reach the feed",
        }
    }
}

impl fmt::Display for UploadClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Classify an HTTP status.
///
/// # Examples
///
/// ```
/// use pilet_publish::upload::{UploadClassification, classify};
///
/// assert_eq!(classify(201), UploadClassification::Success);
/// assert_eq!(classify(409), UploadClassification::VersionConflict);
/// assert_eq!(classify(500), UploadClassification::Failed);
/// ```
#[must_use]
pub const fn classify(status: u16) -> UploadClassification {
    match status {
        200..=299 => UploadClassification::Success,
        402 => UploadClassification::PaymentRequired,
        409 => UploadClassification::VersionConflict,
        413 => UploadClassification::PayloadTooLarge,
        _ => UploadClassification::Failed,
    }
}

/// Result of one upload attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// The artefact that was uploaded.
    pub artefact: Artefact,
    /// Whether the feed accepted it.
    pub success: bool,
    /// Response status, when a response arrived.
    pub http_status: Option<u16>,
    /// Response body, when a response arrived.
    pub response_body: Option<String>,
    /// Outcome category.
    pub classification: UploadClassification,
    /// Local error text for unreadable artefacts and transport failures.
    pub detail: Option<String>,
}

impl UploadOutcome {
    /// Outcome for a response from the feed.
    #[must_use]
    pub fn from_response(artefact: Artefact, response: FeedResponse) -> Self {
        let classification = classify(response.status);
        Self {
            artefact,
            success: classification.is_success(),
            http_status: Some(response.status),
            response_body: Some(response.body),
            classification,
            detail: None,
        }
    }

    /// Outcome for an attempt that produced no response.
    #[must_use]
    pub fn without_response(
        artefact: Artefact,
        classification: UploadClassification,
        detail: String,
    ) -> Self {
        Self {
            artefact,
            success: false,
            http_status: None,
            response_body: None,
            classification,
            detail: Some(detail),
        }
    }
}

/// A fully encoded upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Feed URL.
    pub url: String,
    /// `Content-Type` header value, including the multipart boundary.
    pub content_type: String,
    /// Other headers, in send order.
    pub headers: Vec<(String, String)>,
    /// Encoded body.
    pub body: Vec<u8>,
}

impl UploadRequest {
    /// Value of the first header named `name` (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status and body returned by the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

/// The request did not produce a response.
#[derive(Debug, thiserror::Error)]
#[error("request to {url} failed: {reason}")]
pub struct TransportError {
    /// Target URL.
    pub url: String,
    /// A human-readable description of the failure.
    pub reason: String,
}

/// Sends encoded uploads to the feed.
#[cfg_attr(test, mockall::automock)]
pub trait FeedClient: Send + Sync {
    /// Send `request` and return the feed's response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no response was received.
    fn send(&self, request: &UploadRequest) -> Result<FeedResponse, TransportError>;
}

/// Feed client using `ureq`.
#[derive(Clone)]
pub struct HttpFeedClient {
    agent: ureq::Agent,
}

impl HttpFeedClient {
    /// Create a client sharing `agent`.
    #[must_use]
    pub fn new(agent: ureq::Agent) -> Self {
        Self { agent }
    }
}

impl FeedClient for HttpFeedClient {
    fn send(&self, request: &UploadRequest) -> Result<FeedResponse, TransportError> {
        let transport_error = |reason: String| TransportError {
            url: request.url.clone(),
            reason,
        };

        let mut builder = self
            .agent
            .post(&request.url)
            .header("Content-Type", request.content_type.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .send(request.body.as_slice())
            .map_err(|e| transport_error(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response.into_body().read_to_string().unwrap_or_else(|e| {
            log::debug!("could not read response body from {}: {e}", request.url);
            String::new()
        });
        Ok(FeedResponse { status, body })
    }
}

/// Encode `fields` and the artefact as `multipart/form-data`.
///
/// Fields come first in key order, followed by the artefact part. The
/// boundary is derived from the payload digest, so encoding is
/// deterministic. Returns the `Content-Type` value and the body.
#[must_use]
pub fn encode_multipart(
    fields: &BTreeMap<String, String>,
    file_name: &str,
    payload: &[u8],
) -> (String, Vec<u8>) {
    let digest = format!("{:x}", Sha256::digest(payload));
    let boundary = format!("----pilet-{}", digest.get(..32).unwrap_or(digest.as_str()));

    let mut head = String::new();
    for (name, value) in fields {
        head.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{value}\r\n",
            escape_quoted(name)
        ));
    }
    head.push_str(&format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"{ARTEFACT_FIELD}\"; \
         filename=\"{}\"\r\nContent-Type: {ARTEFACT_CONTENT_TYPE}\r\n\r\n",
        escape_quoted(file_name)
    ));

    let mut body = head.into_bytes();
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={boundary}"), body)
}

/// Percent-encode characters that would break a quoted header parameter.
fn escape_quoted(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Headers for an upload: configured extras, then `Authorization`.
///
/// Extras cannot replace `Authorization` or `Content-Type`.
#[must_use]
pub fn upload_headers(config: &ReleaseConfig, credential: &str) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = config
        .headers
        .iter()
        .filter(|(name, _)| {
            let reserved = name.eq_ignore_ascii_case("authorization")
                || name.eq_ignore_ascii_case("content-type");
            if reserved {
                log::warn!("ignoring extra header {name}; it is set by the publisher");
            }
            !reserved
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    headers.push((
        "Authorization".to_owned(),
        config.auth_scheme.authorization(credential),
    ));
    headers
}

/// Upload one artefact and classify the result.
///
/// The artefact is read before anything is sent; a read failure yields an
/// [`UploadClassification::Unreadable`] outcome without contacting the feed.
#[must_use]
pub fn upload(
    artefact: &Artefact,
    config: &ReleaseConfig,
    credential: &str,
    client: &dyn FeedClient,
) -> UploadOutcome {
    let payload = match std::fs::read(&artefact.path) {
        Ok(payload) => payload,
        Err(e) => {
            log::warn!("cannot read {}: {e}", artefact.path);
            return UploadOutcome::without_response(
                artefact.clone(),
                UploadClassification::Unreadable,
                e.to_string(),
            );
        }
    };

    let file_name = artefact.path.file_name().unwrap_or("pilet.tgz");
    let (content_type, body) = encode_multipart(&config.fields, file_name, &payload);
    let request = UploadRequest {
        url: config.feed_url.clone(),
        content_type,
        headers: upload_headers(config, credential),
        body,
    };

    log::info!(
        "uploading {} ({} bytes) to {}",
        artefact.path,
        payload.len(),
        request.url
    );
    match client.send(&request) {
        Ok(response) => {
            let outcome = UploadOutcome::from_response(artefact.clone(), response);
            if outcome.success {
                log::debug!("{} accepted with {:?}", artefact.path, outcome.http_status);
            } else {
                log::warn!(
                    "{} rejected with {:?}: {}",
                    artefact.path,
                    outcome.http_status,
                    outcome.classification
                );
            }
            outcome
        }
        Err(e) => {
            log::warn!("{e}");
            UploadOutcome::without_response(
                artefact.clone(),
                UploadClassification::Transport,
                e.reason,
            )
        }
    }
}

#[cfg(test)]
#[path = "upload_tests.rs"]
mod tests;
