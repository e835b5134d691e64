// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Machine-readable formats shared between `parallel-spec` and the worker processes it runs.
//!
//! Workers interleave free-form console output with structured events on their standard output.
//! Each structured event is a JSON object placed after the worker's correlation token on a line;
//! this crate describes those objects ([`WireEvent`]) and the exit codes produced by the
//! `parallel-spec` binary ([`ParallelSpecExitCode`]).

mod errors;
mod exit_codes;
mod wire;

pub use errors::*;
pub use exit_codes::*;
pub use wire::*;
