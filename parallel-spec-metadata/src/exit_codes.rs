// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

/// Documented exit codes for `parallel-spec` failures.
///
/// Unknown/unexpected failures will always result in exit code 1.
pub enum ParallelSpecExitCode {}

impl ParallelSpecExitCode {
    /// No errors occurred and every example passed or was pending.
    pub const OK: i32 = 0;

    /// No test files were selected to run, but no other errors occurred.
    pub const NO_TESTS_RUN: i32 = 4;

    /// One or more examples failed.
    pub const TEST_RUN_FAILED: i32 = 100;

    /// A user issue happened while setting up a run: bad configuration, bad arguments, or
    /// missing test paths.
    pub const SETUP_ERROR: i32 = 96;

    /// A worker process could not be started.
    pub const WORKER_SPAWN_FAILED: i32 = 97;

    /// The run was interrupted by a signal before all workers finished.
    pub const INTERRUPTED: i32 = 130;
}
