//! Lifecycle hooks fired around the external build step.
//!
//! Hooks are registered against one of four checkpoints and run synchronously
//! in registration order. The first failing hook stops the remaining hooks for
//! that checkpoint and aborts the entry's build with the hook's own error.

use crate::command::{CommandExecutor, RunOptions, failure_text, shell};
use camino::Utf8Path;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// A fixed point in the build where hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Before the bundler runs.
    BeforeBuild,
    /// After the bundler succeeded.
    AfterBuild,
    /// Before declaration files are emitted.
    BeforeDeclaration,
    /// After declaration files were emitted.
    AfterDeclaration,
}

impl HookPoint {
    /// All checkpoints in execution order.
    pub const ALL: [Self; 4] = [
        Self::BeforeBuild,
        Self::AfterBuild,
        Self::BeforeDeclaration,
        Self::AfterDeclaration,
    ];

    /// Kebab-case name used on the command line and in hook environments.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeBuild => "before-build",
            Self::AfterBuild => "after-build",
            Self::BeforeDeclaration => "before-declaration",
            Self::AfterDeclaration => "after-declaration",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|point| point.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "unknown hook checkpoint '{s}' (expected before-build, after-build, \
                     before-declaration or after-declaration)"
                )
            })
    }
}

/// What a hook sees when it runs.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    /// The checkpoint being fired.
    pub point: HookPoint,
    /// Entry module being built.
    pub entry: &'a Utf8Path,
    /// Pilet root (directory holding `package.json`).
    pub root: &'a Utf8Path,
}

/// Errors raised by hooks.
#[derive(Debug, Error)]
pub enum HookError {
    /// A shell hook exited unsuccessfully.
    #[error("{point} hook `{command}` failed: {reason}")]
    CommandFailed {
        /// Checkpoint the hook was registered for.
        point: HookPoint,
        /// The shell command line.
        command: String,
        /// Captured diagnostic output.
        reason: String,
    },

    /// A shell hook could not be started.
    #[error("{point} hook `{command}` could not be started")]
    Spawn {
        /// Checkpoint the hook was registered for.
        point: HookPoint,
        /// The shell command line.
        command: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An in-process hook reported a failure.
    #[error("{point} hook failed: {message}")]
    Failed {
        /// Checkpoint the hook was registered for.
        point: HookPoint,
        /// Description supplied by the hook.
        message: String,
    },
}

/// A callback run at a build checkpoint.
pub trait BuildHook: Send + Sync {
    /// Run the hook.
    ///
    /// # Errors
    ///
    /// Returns a [`HookError`] to abort the entry's build.
    fn run(&self, context: &HookContext<'_>) -> Result<(), HookError>;
}

impl<F> BuildHook for F
where
    F: Fn(&HookContext<'_>) -> Result<(), HookError> + Send + Sync,
{
    fn run(&self, context: &HookContext<'_>) -> Result<(), HookError> {
        self(context)
    }
}

/// Ordered list of hook registrations.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: Vec<(HookPoint, Arc<dyn BuildHook>)>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|(point, _)| point))
            .finish()
    }
}

impl HookRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `hook` at `point`, after any hooks already registered there.
    pub fn register(&mut self, point: HookPoint, hook: impl BuildHook + 'static) {
        self.hooks.push((point, Arc::new(hook)));
    }

    /// Register a closure at `point`.
    pub fn register_fn<F>(&mut self, point: HookPoint, hook: F)
    where
        F: Fn(&HookContext<'_>) -> Result<(), HookError> + Send + Sync + 'static,
    {
        self.register(point, hook);
    }

    /// Number of registered hooks across all checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook registered at `context.point`, in order.
    ///
    /// # Errors
    ///
    /// Returns the first hook failure; later hooks for the checkpoint are
    /// skipped.
    pub fn fire(&self, context: &HookContext<'_>) -> Result<(), HookError> {
        for (point, hook) in &self.hooks {
            if *point == context.point {
                log::debug!("running {} hook for {}", point, context.entry);
                hook.run(context)?;
            }
        }
        Ok(())
    }

    /// Build a registry of shell hooks from `checkpoint=command` specs.
    #[must_use]
    pub fn from_specs(specs: &[HookSpec], executor: &Arc<dyn CommandExecutor>) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            registry.register(
                spec.point,
                ShellHook::new(spec.command.clone(), Arc::clone(executor)),
            );
        }
        registry
    }
}

/// A hook given on the command line as `checkpoint=command`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookSpec {
    /// Checkpoint to fire at.
    pub point: HookPoint,
    /// Shell command line.
    pub command: String,
}

impl FromStr for HookSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (point, command) = s
            .split_once('=')
            .ok_or_else(|| format!("expected CHECKPOINT=COMMAND, got '{s}'"))?;
        let command = command.trim();
        if command.is_empty() {
            return Err(format!("hook '{point}' has an empty command"));
        }
        Ok(Self {
            point: point.trim().parse()?,
            command: command.to_owned(),
        })
    }
}

/// Runs a shell command line as a hook, inside the pilet root.
///
/// The hook receives `PILET_HOOK`, `PILET_ENTRY` and `PILET_ROOT` in its
/// environment.
pub struct ShellHook {
    command: String,
    executor: Arc<dyn CommandExecutor>,
}

impl ShellHook {
    /// Create a shell hook.
    #[must_use]
    pub fn new(command: String, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { command, executor }
    }
}

impl BuildHook for ShellHook {
    fn run(&self, context: &HookContext<'_>) -> Result<(), HookError> {
        let (program, flag) = shell();
        let options = RunOptions::in_dir(context.root)
            .with_env("PILET_HOOK", context.point.as_str())
            .with_env("PILET_ENTRY", context.entry.as_str())
            .with_env("PILET_ROOT", context.root.as_str());
        let output = self
            .executor
            .run(program, &[flag, &self.command], &options)
            .map_err(|source| HookError::Spawn {
                point: context.point,
                command: self.command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(HookError::CommandFailed {
                point: context.point,
                command: self.command.clone(),
                reason: failure_text(&output),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockCommandExecutor;
    use crate::test_utils::{ExpectedCall, StubExecutor, failure_output, success_output};
    use rstest::rstest;
    use std::sync::Mutex;

    fn context(point: HookPoint) -> HookContext<'static> {
        HookContext {
            point,
            entry: Utf8Path::new("/work/pilet/src/index.tsx"),
            root: Utf8Path::new("/work/pilet"),
        }
    }

    #[rstest]
    #[case("before-build", HookPoint::BeforeBuild)]
    #[case("after-build", HookPoint::AfterBuild)]
    #[case("before-declaration", HookPoint::BeforeDeclaration)]
    #[case("after-declaration", HookPoint::AfterDeclaration)]
    fn hook_points_parse_from_kebab_case(#[case] raw: &str, #[case] expected: HookPoint) {
        assert_eq!(raw.parse::<HookPoint>(), Ok(expected));
        assert_eq!(expected.to_string(), raw);
    }

    #[test]
    fn hook_spec_requires_separator_and_command() {
        assert!("before-build".parse::<HookSpec>().is_err());
        assert!("before-build=  ".parse::<HookSpec>().is_err());
        assert!("during-build=echo".parse::<HookSpec>().is_err());

        let spec: HookSpec = "after-build=npm run verify".parse().expect("valid spec");
        assert_eq!(spec.point, HookPoint::AfterBuild);
        assert_eq!(spec.command, "npm run verify");
    }

    #[test]
    fn fire_runs_only_matching_hooks_in_registration_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HookRegistry::new();
        for (point, label) in [
            (HookPoint::BeforeBuild, "first"),
            (HookPoint::AfterBuild, "after"),
            (HookPoint::BeforeBuild, "second"),
        ] {
            let calls = Arc::clone(&calls);
            registry.register_fn(point, move |_| {
                calls.lock().expect("calls lock").push(label);
                Ok(())
            });
        }

        registry
            .fire(&context(HookPoint::BeforeBuild))
            .expect("hooks succeed");
        assert_eq!(*calls.lock().expect("calls lock"), vec!["first", "second"]);
    }

    #[test]
    fn fire_stops_at_first_failure() {
        let ran_after_failure = Arc::new(Mutex::new(false));
        let mut registry = HookRegistry::new();
        registry.register_fn(HookPoint::AfterBuild, |ctx| {
            Err(HookError::Failed {
                point: ctx.point,
                message: "lint errors".to_owned(),
            })
        });
        let flag = Arc::clone(&ran_after_failure);
        registry.register_fn(HookPoint::AfterBuild, move |_| {
            *flag.lock().expect("flag lock") = true;
            Ok(())
        });

        let err = registry
            .fire(&context(HookPoint::AfterBuild))
            .expect_err("first hook fails");
        assert!(err.to_string().contains("lint errors"));
        assert!(!*ran_after_failure.lock().expect("flag lock"));
    }

    #[test]
    fn shell_hook_reports_command_failure() {
        let (program, flag) = shell();
        let executor: Arc<dyn CommandExecutor> = Arc::new(StubExecutor::new(vec![ExpectedCall {
            cmd: program,
            args: vec![flag, "npm test"],
            result: Ok(failure_output("3 tests failed")),
        }]));
        let registry = HookRegistry::from_specs(
            &[HookSpec {
                point: HookPoint::BeforeBuild,
                command: "npm test".to_owned(),
            }],
            &executor,
        );

        let err = registry
            .fire(&context(HookPoint::BeforeBuild))
            .expect_err("hook fails");
        assert!(matches!(
            err,
            HookError::CommandFailed { ref reason, .. } if reason == "3 tests failed"
        ));
    }

    #[test]
    fn shell_hook_runs_in_pilet_root_with_environment() {
        let (program, flag) = shell();
        let stub = Arc::new(StubExecutor::new(vec![ExpectedCall {
            cmd: program,
            args: vec![flag, "echo ok"],
            result: Ok(success_output()),
        }]));
        let executor: Arc<dyn CommandExecutor> = stub.clone();
        let hook = ShellHook::new("echo ok".to_owned(), executor);

        hook.run(&context(HookPoint::AfterDeclaration))
            .expect("hook succeeds");

        stub.assert_finished();
        let options = stub.recorded_options();
        let first = options.first().expect("one invocation");
        assert_eq!(first.cwd.as_deref(), Some(Utf8Path::new("/work/pilet")));
        assert!(
            first
                .env
                .contains(&("PILET_HOOK".to_owned(), "after-declaration".to_owned()))
        );
    }

    #[test]
    fn shell_hook_spawn_failure_names_the_command() {
        let (program, flag) = shell();
        let mut executor = MockCommandExecutor::new();
        executor
            .expect_run()
            .withf(move |cmd, args, options| {
                cmd == program
                    && args == [flag, "npm run lint"]
                    && options.cwd.as_deref() == Some(Utf8Path::new("/work/pilet"))
            })
            .times(1)
            .returning(|_, _, _| Err(std::io::Error::from(std::io::ErrorKind::NotFound)));
        let hook = ShellHook::new("npm run lint".to_owned(), Arc::new(executor));

        let err = hook
            .run(&context(HookPoint::BeforeBuild))
            .expect_err("shell cannot start");

        assert!(matches!(
            err,
            HookError::Spawn { point: HookPoint::BeforeBuild, ref command, .. } if command == "npm run lint"
        ));
    }
}
