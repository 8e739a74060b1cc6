//! pilet-publish CLI entrypoint.
//!
//! Parses arguments, resolves the release configuration, and runs the publish
//! pipeline. Exits with `0` when every artefact was accepted, `1` when any
//! upload failed, and the error's own exit code for fatal failures.

use camino::Utf8PathBuf;
use clap::Parser;
use pilet_publish::batch::BatchReport;
use pilet_publish::cli::{Cli, Command, PublishArgs};
use pilet_publish::config::ReleaseConfig;
use pilet_publish::error::{PublishError, Result};
use pilet_publish::output::write_stderr_line;
use pilet_publish::pipeline::publish;
use std::io::Write;

/// Exit code for a run in which at least one upload failed.
const UPLOAD_FAILURE_EXIT_CODE: i32 = 1;

fn main() {
    let cli = Cli::parse();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, stderr: &mut dyn Write) -> Result<BatchReport> {
    match &cli.command {
        Command::Publish(args) => {
            let config = release_config(args)?;
            publish(&config, stderr)
        }
    }
}

/// Builds the release configuration relative to the working directory.
fn release_config(args: &PublishArgs) -> Result<ReleaseConfig> {
    let cwd = std::env::current_dir()?;
    let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| PublishError::InvalidArgument {
        argument: "--base-dir",
        reason: format!("current directory is not valid UTF-8: {e}"),
    })?;
    ReleaseConfig::from_args(args, &cwd)
}

fn exit_code_for_run_result(result: Result<BatchReport>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(report) if report.is_success() => 0,
        Ok(_) => UPLOAD_FAILURE_EXIT_CODE,
        Err(err) => {
            write_stderr_line(stderr, format!("error[{}]: {err}", err.code()));
            let mut source = std::error::Error::source(&err);
            while let Some(cause) = source {
                write_stderr_line(stderr, format!("  caused by: {cause}"));
                source = cause.source();
            }
            err.exit_code()
        }
    }
}
