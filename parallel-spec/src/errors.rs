// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use owo_colors::OwoColorize;
use parallel_spec_metadata::ParallelSpecExitCode;
use parallel_spec_runner::{
    errors::{
        ConfigParseError, RunnerBuildError, RunnerExecuteError, TestListError, WorkerSpawnError,
    },
    signal::ShutdownEvent,
};
use std::error::Error;
use thiserror::Error;
use tracing::error;

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that parallel-spec knows how to report.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("could not determine the current directory")]
    CurrentDirFailed {
        #[source]
        err: std::io::Error,
    },
    #[error("current directory is not valid UTF-8")]
    CurrentDirInvalidUtf8 {
        #[source]
        err: camino::FromPathBufError,
    },
    #[error("config parse error")]
    ConfigParseError {
        #[from]
        err: ConfigParseError,
    },
    #[error("test list error")]
    TestListError {
        #[from]
        err: TestListError,
    },
    #[error("no test files to run")]
    NoTestsRun,
    #[error("test runner build error")]
    RunnerBuildError {
        #[from]
        err: RunnerBuildError,
    },
    #[error("worker spawn error")]
    WorkerSpawnError { err: WorkerSpawnError },
    #[error("runner execute error")]
    RunnerExecuteError { err: RunnerExecuteError },
    #[error("test run interrupted")]
    TestRunInterrupted { event: ShutdownEvent },
    #[error("test run failed")]
    TestRunFailed,
}

impl From<RunnerExecuteError> for ExpectedError {
    fn from(err: RunnerExecuteError) -> Self {
        match err {
            RunnerExecuteError::WorkerSpawn(err) => Self::WorkerSpawnError { err },
            err => Self::RunnerExecuteError { err },
        }
    }
}

impl ExpectedError {
    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::CurrentDirFailed { .. }
            | Self::CurrentDirInvalidUtf8 { .. }
            | Self::ConfigParseError { .. }
            | Self::TestListError { .. }
            | Self::RunnerBuildError { .. } => ParallelSpecExitCode::SETUP_ERROR,
            Self::NoTestsRun => ParallelSpecExitCode::NO_TESTS_RUN,
            Self::WorkerSpawnError { .. } => ParallelSpecExitCode::WORKER_SPAWN_FAILED,
            Self::TestRunInterrupted { .. } => ParallelSpecExitCode::INTERRUPTED,
            Self::RunnerExecuteError { .. } | Self::TestRunFailed => {
                ParallelSpecExitCode::TEST_RUN_FAILED
            }
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::CurrentDirFailed { err } => {
                error!("could not determine the current directory");
                Some(err as &dyn Error)
            }
            Self::CurrentDirInvalidUtf8 { err } => {
                error!("current directory is not valid UTF-8");
                Some(err as &dyn Error)
            }
            Self::ConfigParseError { err } => {
                error!(
                    "failed to parse parallel-spec config at `{}`",
                    err.config_file().style(styles.bold)
                );
                Some(err.kind() as &dyn Error)
            }
            Self::TestListError { err } => {
                error!("failed to collect test files");
                Some(err as &dyn Error)
            }
            Self::NoTestsRun => {
                error!("no test files to run");
                None
            }
            Self::RunnerBuildError { err } => {
                error!("failed to build test runner");
                Some(err as &dyn Error)
            }
            Self::WorkerSpawnError { err } => {
                error!(
                    "failed to start worker {}: `{}`",
                    err.worker_id(),
                    err.command().style(styles.bold)
                );
                err.source()
            }
            Self::RunnerExecuteError { err } => {
                error!("error while running tests");
                Some(err as &dyn Error)
            }
            Self::TestRunInterrupted { event } => {
                error!(
                    "test run {} by {event} signal",
                    "interrupted".style(styles.warning_text)
                );
                None
            }
            Self::TestRunFailed => {
                error!("test run failed");
                None
            }
        };

        while let Some(err) = next_error {
            error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
