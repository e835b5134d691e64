// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use tokio::process::Child;

pub(super) fn set_process_group(_cmd: &mut std::process::Command) {
    // TODO: assign workers to a job object so that grandchildren are killed too.
}

/// Kills the worker process.
pub(super) fn kill_worker(child: &mut Child) {
    // An error here means the process already exited.
    _ = child.start_kill();
}
