// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-worker configuration and command lines.

use crate::{config::WorkerConfig, partition::Group};
use camino::{Utf8Path, Utf8PathBuf};
use std::{ffi::OsString, fmt, process::Stdio};
use tokio::process::Child;

/// The environment variable holding the worker's ID.
pub const WORKER_ID_ENV: &str = "PARALLEL_SPEC_WORKER_ID";

/// The environment variable holding the worker's correlation token.
pub const TOKEN_ENV: &str = "PARALLEL_SPEC_TOKEN";

/// The environment variable holding the number of workers in the run.
pub const WORKER_COUNT_ENV: &str = "PARALLEL_SPEC_WORKER_COUNT";

/// Identifies a worker within a run. IDs start at 1.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct WorkerId(usize);

impl WorkerId {
    /// Returns the ID of the worker at the given 0-based index.
    pub fn from_index(index: usize) -> Self {
        Self(index + 1)
    }

    /// Returns the numeric ID.
    pub fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A random string that separates human-readable output from structured events on a worker's
/// standard output.
///
/// Each worker gets a fresh token, so a test's own output can never be mistaken for an event.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Generates a token from 128 random bits.
    pub fn generate() -> Self {
        Self(format!("{:032x}", rand::random::<u128>()))
    }

    /// Creates a token from a fixed string.
    ///
    /// Returns `None` if the string is empty, since an empty token would match every line.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        (!token.is_empty()).then_some(Self(token))
    }

    /// Returns the token as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything that distinguishes one worker from another.
#[derive(Clone, Debug)]
pub struct WorkerSpec {
    id: WorkerId,
    token: CorrelationToken,
    seed: u64,
    group: Group,
}

impl WorkerSpec {
    /// Creates a new spec with a freshly generated token.
    pub fn new(id: WorkerId, seed: u64, group: Group) -> Self {
        Self::with_token(id, CorrelationToken::generate(), seed, group)
    }

    /// Creates a new spec with the given token.
    pub fn with_token(id: WorkerId, token: CorrelationToken, seed: u64, group: Group) -> Self {
        Self {
            id,
            token,
            seed,
            group,
        }
    }

    /// The worker's ID.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// The worker's correlation token.
    pub fn token(&self) -> &CorrelationToken {
        &self.token
    }

    /// The seed passed to the worker.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// The tests assigned to the worker.
    pub fn group(&self) -> &Group {
        &self.group
    }
}

/// Builds [`WorkerCommand`]s for the workers in a run.
#[derive(Clone, Debug)]
pub(super) struct WorkerLauncher {
    worker: WorkerConfig,
    workspace_root: Utf8PathBuf,
    runtime_log: Utf8PathBuf,
    tags: Vec<String>,
    support_env: Option<(String, OsString)>,
}

impl WorkerLauncher {
    pub(super) fn new(
        worker: WorkerConfig,
        workspace_root: Utf8PathBuf,
        runtime_log: Utf8PathBuf,
        tags: Vec<String>,
        support_env: Option<(String, OsString)>,
    ) -> Self {
        Self {
            worker,
            workspace_root,
            runtime_log,
            tags,
            support_env,
        }
    }

    pub(super) fn command_for(&self, spec: &WorkerSpec, worker_count: usize) -> WorkerCommand {
        let mut args: Vec<String> = self.worker.leading_args().to_vec();
        for tag in &self.tags {
            args.push("--tag".to_owned());
            args.push(tag.clone());
        }
        args.push("--seed".to_owned());
        args.push(spec.seed.to_string());
        args.push("--format".to_owned());
        args.push(self.worker.runtime_formatter().to_owned());
        args.push("--out".to_owned());
        args.push(self.runtime_log.to_string());
        args.push("--format".to_owned());
        args.push(self.worker.event_formatter().to_owned());
        args.extend(spec.group.iter().map(ToOwned::to_owned));

        let mut env = vec![
            (WORKER_ID_ENV.to_owned(), OsString::from(spec.id.to_string())),
            (TOKEN_ENV.to_owned(), OsString::from(spec.token.as_str())),
            (
                WORKER_COUNT_ENV.to_owned(),
                OsString::from(worker_count.to_string()),
            ),
        ];
        if let Some((var, value)) = &self.support_env {
            env.push((var.clone(), value.clone()));
        }

        WorkerCommand {
            program: self.worker.program().to_owned(),
            args,
            env,
            current_dir: self.workspace_root.clone(),
        }
    }
}

/// Computes the value of the support path variable: the configured directory, resolved against
/// `workspace_root`, followed by whatever the variable already holds.
pub(super) fn support_path_value(
    workspace_root: &Utf8Path,
    path: &Utf8Path,
    existing: Option<OsString>,
) -> Result<OsString, std::env::JoinPathsError> {
    let path = workspace_root.join(path).into_std_path_buf();
    let existing = existing.unwrap_or_default();
    let rest = std::env::split_paths(&existing).filter(|p| !p.as_os_str().is_empty());
    std::env::join_paths(std::iter::once(path).chain(rest))
}

/// A fully expanded worker command line and environment.
#[derive(Clone, Debug)]
pub(super) struct WorkerCommand {
    program: String,
    args: Vec<String>,
    env: Vec<(String, OsString)>,
    current_dir: Utf8PathBuf,
}

impl WorkerCommand {
    #[cfg(test)]
    pub(super) fn args(&self) -> &[String] {
        &self.args
    }

    #[cfg(test)]
    pub(super) fn env(&self) -> &[(String, OsString)] {
        &self.env
    }

    /// The shell-quoted command line.
    pub(super) fn display_command(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(&self.args))
    }

    /// The worker-specific environment followed by the command line, as it could be pasted into a
    /// shell.
    pub(super) fn display_verbose(&self) -> String {
        let mut parts: Vec<String> = self
            .env
            .iter()
            .map(|(var, value)| {
                format!("{var}={}", shell_words::quote(&value.to_string_lossy()))
            })
            .collect();
        parts.push(self.display_command());
        parts.join(" ")
    }

    /// Starts the worker with stdout and stderr captured and stdin closed.
    pub(super) fn spawn(&self) -> std::io::Result<Child> {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.env.iter().map(|(var, value)| (var, value)))
            .current_dir(&self.current_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        super::os::set_process_group(&mut cmd);

        let mut cmd = tokio::process::Command::from(cmd);
        cmd.kill_on_drop(true);
        cmd.spawn()
    }
}
