// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for parallel-spec.
//!
//! The root data structure is [`ParallelSpecConfig`]. The embedded default config is always loaded
//! first, and a repository-specific config file is layered on top of it.

mod max_fail;
mod worker_count;

pub use max_fail::*;
pub use worker_count::*;

use crate::errors::{ConfigParseError, ConfigParseErrorKind};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::Deserialize;

/// Overall configuration for parallel-spec.
#[derive(Clone, Debug)]
pub struct ParallelSpecConfig {
    workspace_root: Utf8PathBuf,
    inner: ConfigImpl,
}

impl ParallelSpecConfig {
    /// The default location of the config within the workspace root.
    pub const CONFIG_PATH: &'static str = ".config/parallel-spec.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the config from the given file, or if not specified from `.config/parallel-spec.toml`
    /// in the workspace root.
    ///
    /// If no config file is specified and the workspace root doesn't have
    /// `.config/parallel-spec.toml`, uses the default config options.
    pub fn from_sources(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let workspace_root = workspace_root.into();

        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let inner = Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(config_file, kind))?;

        Ok(Self {
            workspace_root,
            inner,
        })
    }

    /// Returns the default config.
    pub fn default_config(workspace_root: impl Into<Utf8PathBuf>) -> Self {
        let inner = Self::build_and_deserialize_config(&Self::make_default_config())
            .expect("default config is always valid");
        Self {
            workspace_root: workspace_root.into(),
            inner,
        }
    }

    /// Returns the workspace root. Workers are started in this directory.
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Returns the runner section of the config.
    pub fn runner(&self) -> &RunnerConfig {
        &self.inner.runner
    }

    /// Returns the worker section of the config.
    pub fn worker(&self) -> &WorkerConfig {
        &self.inner.worker
    }

    /// Returns the path to the runtime log, resolved against the workspace root.
    pub fn runtime_log_path(&self) -> Utf8PathBuf {
        self.workspace_root.join(&self.inner.runner.runtime_log)
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<ConfigImpl, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|err| ConfigParseErrorKind::BuildError(Box::new(err)))?;

        let inner: ConfigImpl = serde_path_to_error::deserialize(config)
            .map_err(|err| ConfigParseErrorKind::DeserializeError(Box::new(err)))?;
        if inner.worker.program.is_empty() {
            return Err(ConfigParseErrorKind::EmptyWorkerProgram);
        }

        Ok(inner)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ConfigImpl {
    runner: RunnerConfig,
    worker: WorkerConfig,
}

/// The `[runner]` section of the config.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RunnerConfig {
    workers: WorkerCount,
    fail_fast: MaxFail,
    runtime_log: Utf8PathBuf,
    test_suffix: String,
}

impl RunnerConfig {
    /// The upper bound on the number of workers.
    pub fn workers(&self) -> WorkerCount {
        self.workers
    }

    /// The fail-fast threshold.
    pub fn fail_fast(&self) -> MaxFail {
        self.fail_fast
    }

    /// The suffix identifying test files inside directories.
    pub fn test_suffix(&self) -> &str {
        &self.test_suffix
    }
}

/// The `[worker]` section of the config: how worker processes are invoked.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct WorkerConfig {
    program: Vec<String>,
    runtime_formatter: String,
    event_formatter: String,
    #[serde(default)]
    support_path: Option<SupportPath>,
}

impl WorkerConfig {
    /// Creates a new worker config.
    ///
    /// Returns `None` if `program` is empty.
    pub fn new(
        program: Vec<String>,
        runtime_formatter: impl Into<String>,
        event_formatter: impl Into<String>,
        support_path: Option<SupportPath>,
    ) -> Option<Self> {
        (!program.is_empty()).then(|| Self {
            program,
            runtime_formatter: runtime_formatter.into(),
            event_formatter: event_formatter.into(),
            support_path,
        })
    }

    /// The worker executable.
    pub fn program(&self) -> &str {
        &self.program[0]
    }

    /// Arguments passed to the worker before any generated arguments.
    pub fn leading_args(&self) -> &[String] {
        &self.program[1..]
    }

    /// The name of the formatter that writes the runtime log.
    pub fn runtime_formatter(&self) -> &str {
        &self.runtime_formatter
    }

    /// The name of the formatter that writes token-delimited events.
    pub fn event_formatter(&self) -> &str {
        &self.event_formatter
    }

    /// The support path override, if any.
    pub fn support_path(&self) -> Option<&SupportPath> {
        self.support_path.as_ref()
    }
}

/// A directory prepended to a path-list environment variable for each worker, so that the
/// worker's runtime can find parallel-spec's formatters.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct SupportPath {
    /// The environment variable, e.g. `RUBYLIB`.
    pub var: String,

    /// The directory to prepend.
    pub path: Utf8PathBuf,
}
