//! Sequential upload loop and batch verdict.
//!
//! Artefacts are uploaded one at a time in resolution order. A failed upload
//! never stops the loop; every outcome is kept and the verdict is derived from
//! the whole sequence.

use crate::auth::{CredentialCache, CredentialPrompt};
use crate::config::ReleaseConfig;
use crate::output::{failure_body, outcome_line, progress_line, write_stderr_line};
use crate::resolution::Artefact;
use crate::upload::{FeedClient, UploadOutcome, upload};
use std::io::Write;

/// Status code that triggers a one-off credential refresh in interactive runs.
const UNAUTHORISED: u16 = 401;

/// Overall result of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchVerdict {
    /// Every artefact was accepted.
    Success,
    /// At least one artefact was not accepted.
    PartialOrFullUploadFailure,
}

/// Ordered outcomes of a batch; index `i` belongs to artefact `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    outcomes: Vec<UploadOutcome>,
}

impl BatchReport {
    /// Wrap ordered outcomes.
    #[must_use]
    pub fn new(outcomes: Vec<UploadOutcome>) -> Self {
        Self { outcomes }
    }

    /// Outcomes in artefact order.
    #[must_use]
    pub fn outcomes(&self) -> &[UploadOutcome] {
        &self.outcomes
    }

    /// Number of accepted artefacts.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.success).count()
    }

    /// Outcomes that were not accepted.
    pub fn failures(&self) -> impl Iterator<Item = &UploadOutcome> {
        self.outcomes.iter().filter(|outcome| !outcome.success)
    }

    /// Success iff every outcome succeeded.
    #[must_use]
    pub fn verdict(&self) -> BatchVerdict {
        if self.success_count() == self.outcomes.len() {
            BatchVerdict::Success
        } else {
            BatchVerdict::PartialOrFullUploadFailure
        }
    }

    /// Whether the verdict is [`BatchVerdict::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.verdict() == BatchVerdict::Success
    }
}

/// Drives uploads for one run.
pub struct Batch<'a> {
    config: &'a ReleaseConfig,
    client: &'a dyn FeedClient,
    prompt: &'a dyn CredentialPrompt,
    credentials: &'a mut CredentialCache,
    credential: String,
    refreshed: bool,
}

impl<'a> Batch<'a> {
    /// Create a batch uploading with `credential`, already resolved through
    /// `credentials`.
    #[must_use]
    pub fn new(
        config: &'a ReleaseConfig,
        client: &'a dyn FeedClient,
        prompt: &'a dyn CredentialPrompt,
        credentials: &'a mut CredentialCache,
        credential: String,
    ) -> Self {
        Self {
            config,
            client,
            prompt,
            credentials,
            credential,
            refreshed: false,
        }
    }

    /// Upload every artefact in order and collect the outcomes.
    pub fn run(&mut self, artefacts: &[Artefact], progress: &mut dyn Write) -> BatchReport {
        let total = artefacts.len();
        let mut outcomes = Vec::with_capacity(total);
        for (index, artefact) in artefacts.iter().enumerate() {
            if !self.config.quiet {
                write_stderr_line(progress, progress_line(index, total, artefact));
            }
            let outcome = self.upload_one(artefact);
            if !self.config.quiet {
                write_stderr_line(progress, outcome_line(&outcome));
                if let Some(body) = failure_body(&outcome) {
                    write_stderr_line(progress, body);
                }
            }
            outcomes.push(outcome);
        }

        let report = BatchReport::new(outcomes);
        log::info!(
            "{} of {total} artefact(s) uploaded to {}",
            report.success_count(),
            self.config.feed_url
        );
        report
    }

    fn upload_one(&mut self, artefact: &Artefact) -> UploadOutcome {
        let outcome = upload(artefact, self.config, &self.credential, self.client);
        if outcome.http_status != Some(UNAUTHORISED) || !self.may_refresh() {
            return outcome;
        }

        self.refreshed = true;
        match self.credentials.refresh(self.config, self.prompt) {
            Ok(token) => {
                log::info!("feed rejected the credential; retrying {}", artefact.path);
                self.credential = token;
                upload(artefact, self.config, &self.credential, self.client)
            }
            Err(e) => {
                log::warn!("could not refresh credential: {e}");
                outcome
            }
        }
    }

    /// Only a prompted token is refreshed, and only once per run.
    fn may_refresh(&self) -> bool {
        !self.refreshed && self.config.interactive && self.credentials.is_prompted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcquisitionMode;
    use crate::test_utils::{RecordingFeed, StaticPrompt};
    use crate::upload::UploadClassification;
    use camino::Utf8PathBuf;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Staged {
        _dir: TempDir,
        artefacts: Vec<Artefact>,
    }

    #[fixture]
    fn staged() -> Staged {
        let dir = TempDir::new().expect("temp dir creation succeeds");
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 temp path");
        let artefacts = ["a.tgz", "b.tgz", "c.tgz"]
            .into_iter()
            .map(|name| {
                let path = root.join(name);
                std::fs::write(&path, name).expect("write artefact");
                Artefact::new(path, "*.tgz")
            })
            .collect();
        Staged {
            _dir: dir,
            artefacts,
        }
    }

    fn keyed_config() -> ReleaseConfig {
        ReleaseConfig {
            api_key: Some("k3y".to_owned()),
            ..ReleaseConfig::new("https://feed.example", AcquisitionMode::Local)
        }
    }

    fn run_batch(
        config: &ReleaseConfig,
        feed: &RecordingFeed,
        prompt: &StaticPrompt,
        artefacts: &[Artefact],
    ) -> (BatchReport, String) {
        let mut credentials = CredentialCache::new();
        let credential = credentials.resolve(config, prompt).expect("credential");
        let mut progress = Vec::new();
        let report =
            Batch::new(config, feed, prompt, &mut credentials, credential).run(artefacts, &mut progress);
        (report, String::from_utf8(progress).expect("UTF-8 progress"))
    }

    #[rstest]
    fn all_accepted_is_success(staged: Staged) {
        let feed = RecordingFeed::default();
        let (report, progress) =
            run_batch(&keyed_config(), &feed, &StaticPrompt::default(), &staged.artefacts);

        assert_eq!(report.verdict(), BatchVerdict::Success);
        assert_eq!(report.success_count(), 3);
        let paths: Vec<_> = report.outcomes().iter().map(|o| &o.artefact.path).collect();
        let expected: Vec<_> = staged.artefacts.iter().map(|a| &a.path).collect();
        assert_eq!(paths, expected);
        assert!(progress.contains("[3/3] Uploading"));
    }

    #[rstest]
    fn one_failure_fails_the_batch_without_short_circuit(staged: Staged) {
        let feed = RecordingFeed::with_statuses(&[200, 413, 200]);
        let (report, _) =
            run_batch(&keyed_config(), &feed, &StaticPrompt::default(), &staged.artefacts);

        assert_eq!(report.verdict(), BatchVerdict::PartialOrFullUploadFailure);
        assert_eq!(feed.call_count(), 3);
        let statuses: Vec<_> = report.outcomes().iter().map(|o| o.http_status).collect();
        assert_eq!(statuses, vec![Some(200), Some(413), Some(200)]);
        let failed: Vec<_> = report.failures().map(|o| o.classification).collect();
        assert_eq!(failed, vec![UploadClassification::PayloadTooLarge]);
    }

    #[rstest]
    fn quiet_runs_write_no_progress(staged: Staged) {
        let config = ReleaseConfig {
            quiet: true,
            ..keyed_config()
        };
        let (_, progress) = run_batch(
            &config,
            &RecordingFeed::default(),
            &StaticPrompt::default(),
            &staged.artefacts,
        );
        assert!(progress.is_empty());
    }

    #[rstest]
    fn unauthorised_prompted_token_is_refreshed_once(staged: Staged) {
        let config = ReleaseConfig {
            interactive: true,
            ..ReleaseConfig::new("https://feed.example", AcquisitionMode::Local)
        };
        let feed = RecordingFeed::with_statuses(&[401, 200, 401]);
        let prompt = StaticPrompt::with_tokens(&["stale", "fresh", "unused"]);

        let (report, _) = run_batch(&config, &feed, &prompt, &staged.artefacts);

        assert_eq!(prompt.call_count(), 2);
        assert_eq!(feed.call_count(), 4);
        let auth: Vec<_> = feed
            .requests()
            .iter()
            .map(|r| r.header("Authorization").map(str::to_owned))
            .collect();
        assert_eq!(
            auth,
            vec![
                Some("Basic stale".to_owned()),
                Some("Basic fresh".to_owned()),
                Some("Basic fresh".to_owned()),
                Some("Basic fresh".to_owned()),
            ]
        );
        let statuses: Vec<_> = report.outcomes().iter().map(|o| o.http_status).collect();
        assert_eq!(statuses, vec![Some(200), Some(401), Some(200)]);
    }

    #[rstest]
    fn static_keys_are_never_refreshed(staged: Staged) {
        let config = ReleaseConfig {
            interactive: true,
            ..keyed_config()
        };
        let feed = RecordingFeed::with_statuses(&[401]);
        let prompt = StaticPrompt::with_tokens(&["never"]);

        let (report, _) = run_batch(&config, &feed, &prompt, &staged.artefacts);

        assert_eq!(prompt.call_count(), 0);
        assert_eq!(feed.call_count(), 3);
        assert!(!report.is_success());
    }

    #[test]
    fn empty_report_is_vacuously_successful() {
        assert_eq!(BatchReport::new(Vec::new()).verdict(), BatchVerdict::Success);
    }
}
