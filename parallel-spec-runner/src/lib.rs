// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for parallel-spec, which runs a test suite across several worker processes
//! and merges their results into a single report.
//!
//! The flow of a run is:
//!
//! 1. [`test_list::TestList`] collects test files.
//! 2. A [`partition::Partitioner`] splits them into groups, balanced by historical runtime.
//! 3. [`runner::TestRunner`] starts a worker process per group, and demultiplexes each worker's
//!    output into text (forwarded to our own output) and structured events.
//! 4. Events from every worker are dispatched, in arrival order, to a [`reporter::Reporter`].

pub mod config;
pub mod errors;
pub mod partition;
pub mod reporter;
pub mod runner;
pub mod signal;
pub mod test_list;
