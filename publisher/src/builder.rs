//! Build orchestration around an external bundler.
//!
//! The bundler itself is opaque: [`BuildBackend`] is the narrow contract the
//! pipeline relies on. [`Builder`] locates the pilet root for an entry module,
//! fires lifecycle hooks around the bundle and declaration steps, and reports
//! the package identity for packing.

use crate::artefact::manifest::{MANIFEST_FILE, ManifestError, PackageManifest};
use crate::command::{CommandExecutor, RunOptions, failure_text};
use crate::hooks::{HookContext, HookError, HookPoint, HookRegistry};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Default output directory, relative to the pilet root.
pub const DEFAULT_OUT_DIR: &str = "dist";

/// Bundler toggles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFlags {
    /// Minify the bundle.
    pub minify: bool,
    /// Emit source maps.
    pub source_maps: bool,
    /// Emit a declaration file after bundling.
    pub declaration: bool,
    /// Add content hashes to emitted file names.
    pub content_hash: bool,
    /// Pilet schema version, if pinned.
    pub schema_version: Option<String>,
}

impl Default for BuildFlags {
    fn default() -> Self {
        Self {
            minify: true,
            source_maps: true,
            declaration: true,
            content_hash: true,
            schema_version: None,
        }
    }
}

/// Everything a build needs besides the entry module.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Bundler toggles.
    pub flags: BuildFlags,
    /// Hooks fired around the bundle and declaration steps.
    pub hooks: HookRegistry,
    /// Output directory name, relative to the pilet root.
    pub out_dir_name: String,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            flags: BuildFlags::default(),
            hooks: HookRegistry::new(),
            out_dir_name: DEFAULT_OUT_DIR.to_owned(),
        }
    }
}

/// One bundler invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
    /// Entry module.
    pub entry: Utf8PathBuf,
    /// Pilet root the bundler runs in.
    pub root: Utf8PathBuf,
    /// Where build output goes.
    pub out_dir: Utf8PathBuf,
    /// Bundler toggles.
    pub flags: BuildFlags,
}

/// Result of building one entry module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Pilet root, ready for packing.
    pub root: Utf8PathBuf,
    /// Package name from `package.json`.
    pub package_name: String,
    /// Package version from `package.json`.
    pub package_version: String,
}

/// Errors raised while building an entry module.
#[derive(Debug, Error)]
pub enum BuildError {
    /// No ancestor of the entry holds a `package.json`.
    #[error("no package.json found above {entry}")]
    ProjectNotFound {
        /// The entry module.
        entry: Utf8PathBuf,
    },

    /// The pilet's `package.json` is unusable.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A lifecycle hook failed.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// The bundler reported a failure.
    #[error("bundler {step} step failed: {reason}")]
    BundlerFailed {
        /// `bundle` or `declaration`.
        step: &'static str,
        /// Captured diagnostic output.
        reason: String,
    },

    /// The bundler could not be started.
    #[error("failed to start bundler {program}")]
    Spawn {
        /// Bundler program.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An I/O operation failed.
    #[error("I/O error during build: {0}")]
    Io(#[from] std::io::Error),
}

/// The externally owned bundling step.
///
/// Implementations must be shareable across threads because entries are
/// built concurrently.
#[cfg_attr(test, mockall::automock)]
pub trait BuildBackend: Send + Sync {
    /// Bundle `request.entry` into `request.out_dir`.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when bundling fails.
    fn bundle(&self, request: &BundleRequest) -> Result<(), BuildError>;

    /// Emit the declaration file for `request.entry` into `request.out_dir`.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when declaration emission fails.
    fn emit_declaration(&self, request: &BundleRequest) -> Result<(), BuildError>;
}

/// Runs a bundler CLI for each step.
///
/// `<program> bundle --entry <entry> --out-dir <dir> [--minify]
/// [--source-maps] [--content-hash] [--schema <v>]` and `<program> declaration
/// --entry <entry> --out-dir <dir>`, both in the pilet root.
pub struct CommandBuildBackend {
    program: String,
    executor: Arc<dyn CommandExecutor>,
}

impl CommandBuildBackend {
    /// Create a backend running `program` through `executor`.
    #[must_use]
    pub fn new(program: impl Into<String>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            program: program.into(),
            executor,
        }
    }

    /// Arguments for the bundle step.
    #[must_use]
    pub fn bundle_args(request: &BundleRequest) -> Vec<String> {
        let mut args = vec![
            "bundle".to_owned(),
            "--entry".to_owned(),
            request.entry.to_string(),
            "--out-dir".to_owned(),
            request.out_dir.to_string(),
        ];
        let flags = &request.flags;
        for (enabled, flag) in [
            (flags.minify, "--minify"),
            (flags.source_maps, "--source-maps"),
            (flags.content_hash, "--content-hash"),
        ] {
            if enabled {
                args.push(flag.to_owned());
            }
        }
        if let Some(schema) = &flags.schema_version {
            args.push("--schema".to_owned());
            args.push(schema.clone());
        }
        args
    }

    /// Arguments for the declaration step.
    #[must_use]
    pub fn declaration_args(request: &BundleRequest) -> Vec<String> {
        vec![
            "declaration".to_owned(),
            "--entry".to_owned(),
            request.entry.to_string(),
            "--out-dir".to_owned(),
            request.out_dir.to_string(),
        ]
    }

    fn run_step(
        &self,
        step: &'static str,
        request: &BundleRequest,
        args: &[String],
    ) -> Result<(), BuildError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        log::debug!("running {} {}", self.program, args.join(" "));
        let output = self
            .executor
            .run(&self.program, &args, &RunOptions::in_dir(&request.root))
            .map_err(|source| BuildError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BuildError::BundlerFailed {
                step,
                reason: failure_text(&output),
            });
        }
        Ok(())
    }
}

impl BuildBackend for CommandBuildBackend {
    fn bundle(&self, request: &BundleRequest) -> Result<(), BuildError> {
        self.run_step("bundle", request, &Self::bundle_args(request))
    }

    fn emit_declaration(&self, request: &BundleRequest) -> Result<(), BuildError> {
        self.run_step("declaration", request, &Self::declaration_args(request))
    }
}

/// Builds entry modules with hooks around each step.
pub struct Builder<'a> {
    backend: &'a dyn BuildBackend,
    options: &'a BuildOptions,
}

impl<'a> Builder<'a> {
    /// Create a builder.
    #[must_use]
    pub fn new(backend: &'a dyn BuildBackend, options: &'a BuildOptions) -> Self {
        Self { backend, options }
    }

    /// Build one entry module.
    ///
    /// Hooks fire in the order before-build, bundle, after-build, then (when
    /// declarations are enabled) before-declaration, emit, after-declaration.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; later steps and hooks do not
    /// run.
    pub fn build(&self, entry: &Utf8Path) -> Result<BuildOutcome, BuildError> {
        let root = find_pilet_root(entry)?;
        let manifest = PackageManifest::read(&root)?;
        let request = BundleRequest {
            entry: entry.to_path_buf(),
            root: root.clone(),
            out_dir: root.join(&self.options.out_dir_name),
            flags: self.options.flags.clone(),
        };

        log::info!("building {} {} from {entry}", manifest.name, manifest.version);
        self.fire(HookPoint::BeforeBuild, &request)?;
        self.backend.bundle(&request)?;
        self.fire(HookPoint::AfterBuild, &request)?;

        if request.flags.declaration {
            self.fire(HookPoint::BeforeDeclaration, &request)?;
            self.backend.emit_declaration(&request)?;
            self.fire(HookPoint::AfterDeclaration, &request)?;
        }

        Ok(BuildOutcome {
            root,
            package_name: manifest.name,
            package_version: manifest.version,
        })
    }

    fn fire(&self, point: HookPoint, request: &BundleRequest) -> Result<(), BuildError> {
        self.options.hooks.fire(&HookContext {
            point,
            entry: &request.entry,
            root: &request.root,
        })?;
        Ok(())
    }
}

/// Nearest ancestor directory of `entry` holding a `package.json`.
///
/// # Errors
///
/// Returns [`BuildError::ProjectNotFound`] when there is none.
pub fn find_pilet_root(entry: &Utf8Path) -> Result<Utf8PathBuf, BuildError> {
    entry
        .ancestors()
        .skip(1)
        .find(|dir| dir.join(MANIFEST_FILE).is_file())
        .map(Utf8Path::to_path_buf)
        .ok_or_else(|| BuildError::ProjectNotFound {
            entry: entry.to_path_buf(),
        })
}
