// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by parallel-spec.

use crate::runner::WorkerId;
use camino::Utf8PathBuf;
use config::ConfigError;
use std::fmt;
use thiserror::Error;
use tokio::task::JoinError;

/// An error that occurred while parsing the config.
#[derive(Debug, Error)]
#[error("failed to parse parallel-spec config at `{config_file}`")]
#[non_exhaustive]
pub struct ConfigParseError {
    config_file: Utf8PathBuf,
    #[source]
    kind: ConfigParseErrorKind,
}

impl ConfigParseError {
    pub(crate) fn new(config_file: impl Into<Utf8PathBuf>, kind: ConfigParseErrorKind) -> Self {
        Self {
            config_file: config_file.into(),
            kind,
        }
    }

    /// Returns the config file for this error.
    pub fn config_file(&self) -> &Utf8PathBuf {
        &self.config_file
    }

    /// Returns the kind of error this is.
    pub fn kind(&self) -> &ConfigParseErrorKind {
        &self.kind
    }
}

/// The kind of error that occurred while parsing a config.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigParseErrorKind {
    /// An error occurred while building the config.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// An error occurred while deserializing the config.
    #[error(transparent)]
    DeserializeError(Box<serde_path_to_error::Error<ConfigError>>),

    /// The worker program was specified as an empty list.
    #[error("`worker.program` must contain at least one element")]
    EmptyWorkerProgram,
}

/// An error that occurs while parsing a [`MaxFail`](crate::config::MaxFail) value.
#[derive(Clone, Debug, Error)]
#[error("unrecognized value for fail-fast: {reason}")]
pub struct MaxFailParseError {
    reason: String,
}

impl MaxFailParseError {
    pub(crate) fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// An error that occurs while parsing a [`WorkerCount`](crate::config::WorkerCount) value.
#[derive(Clone, Debug, Error)]
#[error(
    "unrecognized value for workers: {input}\n(hint: this takes a positive integer or \"num-cpus\")"
)]
pub struct WorkerCountParseError {
    input: String,
}

impl WorkerCountParseError {
    pub(crate) fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
        }
    }
}

/// An error that occurs while collecting test files from paths.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestListError {
    /// A path passed in does not exist.
    #[error("test path `{path}` does not exist")]
    PathNotFound {
        /// The path that was not found.
        path: Utf8PathBuf,
    },

    /// An error occurred while walking a directory.
    #[error("error while walking directory `{path}`")]
    WalkDir {
        /// The directory being walked.
        path: Utf8PathBuf,

        /// The underlying error.
        #[source]
        err: walkdir::Error,
    },

    /// A file found while walking a directory is not valid UTF-8.
    #[error("path found under `{path}` is not valid UTF-8: {}", .found.display())]
    NonUtf8Path {
        /// The directory being walked.
        path: Utf8PathBuf,

        /// The path that was found.
        found: std::path::PathBuf,
    },
}

/// An error that occurs while reading the runtime log.
#[derive(Debug, Error)]
#[error("failed to read runtime log at `{path}`")]
pub struct RuntimeLogReadError {
    path: Utf8PathBuf,
    #[source]
    err: std::io::Error,
}

impl RuntimeLogReadError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, err: std::io::Error) -> Self {
        Self {
            path: path.into(),
            err,
        }
    }
}

/// An error that occurs while setting up the signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] std::io::Error);

/// An error that occurs while building the test runner.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerBuildError {
    /// The worker count was zero.
    #[error("the number of workers must be at least 1")]
    NoWorkers,

    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// An error occurred while setting up signals.
    #[error("error setting up signals")]
    SignalHandlerSetupError(#[from] SignalHandlerSetupError),

    /// The support path could not be added to its environment variable.
    #[error("error adding support path to `{var}`")]
    InvalidSupportPath {
        /// The environment variable.
        var: String,

        /// The underlying error.
        #[source]
        err: std::env::JoinPathsError,
    },
}

/// An error that occurs while starting a worker process.
///
/// This is fatal for the whole run.
#[derive(Debug, Error)]
#[error("failed to spawn worker {worker_id}: `{command}`")]
pub struct WorkerSpawnError {
    worker_id: WorkerId,
    command: String,
    #[source]
    err: std::io::Error,
}

impl WorkerSpawnError {
    pub(crate) fn new(worker_id: WorkerId, command: String, err: std::io::Error) -> Self {
        Self {
            worker_id,
            command,
            err,
        }
    }

    /// Returns the ID of the worker that failed to spawn.
    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Returns the shell-quoted command line that failed to spawn.
    pub fn command(&self) -> &str {
        &self.command
    }
}

/// An error that occurs while executing a test run.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RunnerExecuteError {
    /// A worker could not be started. Workers that were already started have been killed.
    #[error(transparent)]
    WorkerSpawn(#[from] WorkerSpawnError),

    /// One or more relay or supervisor tasks panicked.
    #[error("{} runner task(s) panicked", .join_errors.len())]
    TasksPanicked {
        /// The join errors for the tasks that panicked.
        join_errors: Vec<JoinError>,
    },
}

/// Displays an error and its chain of sources on one line, separated by `: `.
#[derive(Clone, Copy, Debug)]
pub struct DisplayErrorChain<E>(E);

impl<E: std::error::Error> DisplayErrorChain<E> {
    /// Creates a new `DisplayErrorChain`.
    pub fn new(error: E) -> Self {
        Self(error)
    }
}

impl<E: std::error::Error> fmt::Display for DisplayErrorChain<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }
        Ok(())
    }
}
