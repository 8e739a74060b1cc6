//! CLI argument definitions for the pilet publisher.
//!
//! This module defines the command-line interface using clap. It is separated
//! from the main entrypoint to keep the binary small and focused on
//! orchestration.

use crate::auth::AuthScheme;
use crate::config::parse_key_value;
use crate::hooks::HookSpec;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Default npm registry used for `--from npm`.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org";

/// Default bundler program for fresh builds.
pub const DEFAULT_BUNDLER: &str = "pilet-bundle";

/// Publish pilets to a feed service.
#[derive(Parser, Debug)]
#[command(name = "pilet-publish")]
#[command(version, about)]
#[command(long_about = concat!(
    "Publish pilets to a feed service.\n\n",
    "Artefacts are picked up from local globs, downloaded from URLs, resolved ",
    "through an npm registry, or built fresh from entry modules. Every artefact ",
    "is uploaded in order; the run succeeds only when all uploads succeed.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Upload every tarball in the current directory:\n",
    "    $ pilet-publish publish --url https://feed.example/api/v1/pilet\n\n",
    "  Build and upload a pilet from source:\n",
    "    $ pilet-publish publish --fresh src/index.tsx --url ... --api-key ...\n\n",
    "  Upload a package from npm:\n",
    "    $ pilet-publish publish --from npm my-pilet@1.2.0 --url ...\n",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Resolve artefacts and upload them to the feed.
    Publish(PublishArgs),
}

/// Where pre-existing artefacts come from.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceKind {
    /// Glob patterns relative to the base directory.
    #[default]
    Local,
    /// Direct download URLs.
    Remote,
    /// npm package specifiers.
    Npm,
}

/// Arguments for the publish command.
#[derive(Args, Debug, Clone)]
pub struct PublishArgs {
    /// Globs, URLs, package specifiers, or entry modules depending on the mode.
    #[arg(value_name = "SOURCE")]
    pub sources: Vec<String>,

    /// Where existing artefacts come from.
    #[arg(long, value_enum, default_value_t = SourceKind::Local)]
    pub from: SourceKind,

    /// Build and pack the sources as entry modules instead.
    #[arg(long)]
    pub fresh: bool,

    /// Feed upload URL.
    #[arg(long, value_name = "FEED_URL", env = "PILET_FEED_URL")]
    pub url: Option<String>,

    /// API key for the feed.
    #[arg(long, value_name = "KEY", env = "PILET_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Authorization scheme (none, basic, bearer, digest, or any other name).
    #[arg(long, value_name = "SCHEME", default_value = "basic")]
    pub auth: AuthScheme,

    /// Custom CA certificate (PEM or DER) for TLS validation.
    #[arg(long, value_name = "PATH")]
    pub ca_cert: Option<Utf8PathBuf>,

    /// Extra form field sent with every upload (repeatable).
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub field: Vec<(String, String)>,

    /// Extra HTTP header sent with every upload (repeatable).
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub header: Vec<(String, String)>,

    /// Prompt for an API key when none is configured.
    #[arg(long)]
    pub interactive: bool,

    /// Directory local globs and entry modules are relative to [default: current dir].
    #[arg(long, value_name = "DIR")]
    pub base_dir: Option<Utf8PathBuf>,

    /// npm registry for `--from npm`.
    #[arg(long, value_name = "URL", default_value = DEFAULT_REGISTRY)]
    pub registry: String,

    /// Bundler program for fresh builds.
    #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_BUNDLER)]
    pub bundler: String,

    /// Build flags for fresh builds.
    #[command(flatten)]
    pub build: BuildArgs,

    /// Hook command run at a build checkpoint, as CHECKPOINT=COMMAND (repeatable).
    #[arg(long, value_name = "CHECKPOINT=COMMAND")]
    pub hook: Vec<HookSpec>,

    /// Suppress progress output (the summary and errors are still shown).
    #[arg(short, long)]
    pub quiet: bool,
}

/// On/off build toggles; each defaults to on.
#[derive(Args, Debug, Clone, Default)]
pub struct BuildArgs {
    /// Minify the bundle.
    #[arg(long, overrides_with = "no_minify")]
    pub minify: bool,
    /// Do not minify the bundle.
    #[arg(long, overrides_with = "minify")]
    pub no_minify: bool,

    /// Emit source maps.
    #[arg(long, overrides_with = "no_source_maps")]
    pub source_maps: bool,
    /// Do not emit source maps.
    #[arg(long, overrides_with = "source_maps")]
    pub no_source_maps: bool,

    /// Emit a declaration file.
    #[arg(long, overrides_with = "no_declaration")]
    pub declaration: bool,
    /// Do not emit a declaration file.
    #[arg(long, overrides_with = "declaration")]
    pub no_declaration: bool,

    /// Add content hashes to emitted file names.
    #[arg(long, overrides_with = "no_content_hash")]
    pub content_hash: bool,
    /// Do not add content hashes to emitted file names.
    #[arg(long, overrides_with = "content_hash")]
    pub no_content_hash: bool,

    /// Pilet schema version passed to the bundler.
    #[arg(long, value_name = "VERSION")]
    pub schema: Option<String>,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
