//! Shared test utilities: stub collaborators for every pipeline seam.
//!
//! Every stub is `Send + Sync` because fresh builds, downloads and registry
//! lookups run concurrently.

use crate::artefact::download::{DownloadError, Downloader};
use crate::artefact::registry::{PackageSpecifier, RegistryError, RegistryLookup};
use crate::auth::CredentialPrompt;
use crate::builder::{BuildBackend, BuildError, BundleRequest};
use crate::command::{CommandExecutor, RunOptions};
use crate::upload::{FeedClient, FeedResponse, TransportError, UploadRequest};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::process::{ExitStatus, Output};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a panicking test poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code.unsigned_abs())
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// Represents an expected command invocation for testing.
#[derive(Debug)]
pub struct ExpectedCall {
    /// The command to execute (e.g., "sh").
    pub cmd: &'static str,
    /// The arguments to pass to the command.
    pub args: Vec<&'static str>,
    /// The result to return when this command is invoked.
    pub result: std::io::Result<Output>,
}

/// A stub implementation of `CommandExecutor` for testing.
///
/// Records expected command invocations and returns predefined results,
/// allowing tests to verify command execution without side effects.
#[derive(Debug)]
pub struct StubExecutor {
    expected: Mutex<VecDeque<ExpectedCall>>,
    options: Mutex<Vec<RunOptions>>,
}

impl StubExecutor {
    /// Creates a new `StubExecutor` with the given expected calls.
    #[must_use]
    pub fn new(expected: Vec<ExpectedCall>) -> Self {
        Self {
            expected: Mutex::new(expected.into()),
            options: Mutex::new(Vec::new()),
        }
    }

    /// Asserts that all expected command invocations have been consumed.
    ///
    /// # Panics
    ///
    /// Panics if there are remaining expected calls that were not invoked.
    pub fn assert_finished(&self) {
        assert!(
            lock(&self.expected).is_empty(),
            "expected no further command invocations"
        );
    }

    /// Run options seen so far, in invocation order.
    #[must_use]
    pub fn recorded_options(&self) -> Vec<RunOptions> {
        lock(&self.options).clone()
    }
}

impl CommandExecutor for StubExecutor {
    fn run(&self, cmd: &str, args: &[&str], options: &RunOptions) -> std::io::Result<Output> {
        let call = lock(&self.expected).pop_front();
        let Some(call) = call else {
            panic!("unexpected command invocation: {cmd} {args:?}");
        };

        assert_eq!(call.cmd, cmd);
        assert_eq!(call.args.as_slice(), args);
        lock(&self.options).push(options.clone());

        call.result
    }
}

/// Feed stub that answers with scripted statuses and records every request.
///
/// Requests beyond the script are answered with `200`.
#[derive(Debug, Clone, Default)]
pub struct RecordingFeed {
    statuses: Arc<Mutex<VecDeque<u16>>>,
    requests: Arc<Mutex<Vec<UploadRequest>>>,
    calls: Arc<AtomicUsize>,
}

impl RecordingFeed {
    /// Create a feed answering with `statuses` in order.
    #[must_use]
    pub fn with_statuses(statuses: &[u16]) -> Self {
        Self {
            statuses: Arc::new(Mutex::new(statuses.iter().copied().collect())),
            ..Self::default()
        }
    }

    /// Number of upload attempts made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<UploadRequest> {
        lock(&self.requests).clone()
    }
}

impl FeedClient for RecordingFeed {
    fn send(&self, request: &UploadRequest) -> Result<FeedResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.requests).push(request.clone());
        let status = lock(&self.statuses).pop_front().unwrap_or(200);
        Ok(FeedResponse {
            status,
            body: format!("{{\"status\":{status}}}"),
        })
    }
}

/// Downloader stub that writes fixed bytes and records requested URLs.
#[derive(Debug, Clone, Default)]
pub struct StaticDownloader {
    payload: Vec<u8>,
    failing: Vec<String>,
    urls: Arc<Mutex<Vec<String>>>,
}

impl StaticDownloader {
    /// Serve `payload` for every URL.
    #[must_use]
    pub fn new(payload: &[u8]) -> Self {
        Self {
            payload: payload.to_vec(),
            ..Self::default()
        }
    }

    /// Answer `url` with a 404.
    #[must_use]
    pub fn failing(mut self, url: &str) -> Self {
        self.failing.push(url.to_owned());
        self
    }

    /// URLs requested so far, in completion order.
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        lock(&self.urls).clone()
    }
}

impl Downloader for StaticDownloader {
    fn download(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        lock(&self.urls).push(url.to_owned());
        if self.failing.iter().any(|failing| failing == url) {
            return Err(DownloadError::NotFound {
                url: url.to_owned(),
            });
        }
        std::fs::write(dest, &self.payload)?;
        Ok(())
    }
}

/// Registry stub mapping package names to tarball URLs.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    tarballs: BTreeMap<String, String>,
    lookups: Arc<AtomicUsize>,
}

impl StaticRegistry {
    /// Register `name` → `url`.
    #[must_use]
    pub fn with_package(mut self, name: &str, url: &str) -> Self {
        self.tarballs.insert(name.to_owned(), url.to_owned());
        self
    }

    /// Number of lookups performed.
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl RegistryLookup for StaticRegistry {
    fn tarball_url(&self, specifier: &PackageSpecifier) -> Result<String, RegistryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.tarballs
            .get(&specifier.name)
            .cloned()
            .ok_or_else(|| RegistryError::PackageNotFound {
                name: specifier.name.clone(),
            })
    }
}

/// Build backend stub that writes a small bundle and records each step.
#[derive(Debug, Clone, Default)]
pub struct FakeBackend {
    events: Arc<Mutex<Vec<String>>>,
    failing_entries: Vec<String>,
}

impl FakeBackend {
    /// Make bundling fail for entries whose path ends with `suffix`.
    #[must_use]
    pub fn failing_for(mut self, suffix: &str) -> Self {
        self.failing_entries.push(suffix.to_owned());
        self
    }

    /// Shared event log; hooks may append to it as well.
    #[must_use]
    pub fn events(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.events)
    }

    /// Events recorded so far.
    #[must_use]
    pub fn recorded(&self) -> Vec<String> {
        lock(&self.events).clone()
    }
}

impl BuildBackend for FakeBackend {
    fn bundle(&self, request: &BundleRequest) -> Result<(), BuildError> {
        lock(&self.events).push(format!("bundle:{}", request.entry));
        if self
            .failing_entries
            .iter()
            .any(|suffix| request.entry.as_str().ends_with(suffix.as_str()))
        {
            return Err(BuildError::BundlerFailed {
                step: "bundle",
                reason: "syntax error".to_owned(),
            });
        }
        std::fs::create_dir_all(&request.out_dir).map_err(BuildError::Io)?;
        std::fs::write(request.out_dir.join("index.js"), b"export default {};")
            .map_err(BuildError::Io)?;
        Ok(())
    }

    fn emit_declaration(&self, request: &BundleRequest) -> Result<(), BuildError> {
        lock(&self.events).push(format!("declaration:{}", request.entry));
        std::fs::write(request.out_dir.join("index.d.ts"), b"export {};")
            .map_err(BuildError::Io)?;
        Ok(())
    }
}

/// Credential prompt stub returning a fixed token.
#[derive(Debug, Clone, Default)]
pub struct StaticPrompt {
    tokens: Arc<Mutex<VecDeque<String>>>,
    calls: Arc<AtomicUsize>,
}

impl StaticPrompt {
    /// Answer successive prompts with `tokens`; once exhausted, prompts fail.
    #[must_use]
    pub fn with_tokens(tokens: &[&str]) -> Self {
        Self {
            tokens: Arc::new(Mutex::new(
                tokens.iter().map(|&token| token.to_owned()).collect(),
            )),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of prompts shown.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CredentialPrompt for StaticPrompt {
    fn request_token(&self, _feed_url: &str) -> std::io::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.tokens)
            .pop_front()
            .ok_or_else(|| std::io::Error::other("no token available"))
    }
}
