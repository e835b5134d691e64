// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The test runner.
//!
//! The main structure in this module is [`TestRunner`]. A run goes through these phases:
//!
//! 1. Planning: the test list is split into groups, one per worker.
//! 2. Launching: a worker process is started for each non-empty group, along with relays for its
//!    standard output and standard error.
//! 3. Aggregating: the dispatcher consumes events from every relay, on the calling thread.
//! 4. Finalizing: the reporter renders its summary, and every task is joined.

mod dispatcher;
mod imp;
mod internal_events;
mod relay;
mod worker;

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        #[path = "unix.rs"]
        mod os;
    } else if #[cfg(windows)] {
        #[path = "windows.rs"]
        mod os;
    } else {
        compile_error!("parallel-spec only supports Unix and Windows");
    }
}

pub use imp::*;
pub use worker::{
    CorrelationToken, TOKEN_ENV, WORKER_COUNT_ENV, WORKER_ID_ENV, WorkerId, WorkerSpec,
};
