// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::os::unix::process::CommandExt;
use tokio::process::Child;

/// Puts the worker in its own process group, so that killing it also kills anything it started.
pub(super) fn set_process_group(cmd: &mut std::process::Command) {
    cmd.process_group(0);
}

/// Kills the worker's process group.
pub(super) fn kill_worker(child: &mut Child) {
    let Some(pid) = child.id() else {
        // The child was already reaped.
        return;
    };
    // The worker is a process group leader, so its pid is also its process group ID.
    unsafe {
        libc::kill(-(pid as libc::pid_t), libc::SIGKILL);
    }
}
