// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs a spec suite across parallel worker processes.
//!
//! Test files are split into groups balanced by their historical runtimes, one worker process
//! is started per group, and the workers' structured events are merged into a single progress
//! report.
//!
//! The library surface of this crate is not stable. Use the `parallel-spec` binary instead.

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::{OutputContext, StderrStyles};
