// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reporting results from a run.
//!
//! The dispatcher forwards every structured event it receives to a [`Reporter`]. The default
//! implementation, [`ProgressReporter`], renders a compact progress line followed by a summary.

mod progress;

pub use progress::*;

use parallel_spec_metadata::{ExampleSummary, GroupMetadata};
use std::time::Duration;

/// A sink for results from a run.
///
/// All methods are called from a single thread, in the order events are dispatched. Events from
/// different workers may be interleaved, but events from any one worker arrive in the order that
/// worker produced them.
pub trait Reporter {
    /// Called when an example passes.
    fn example_passed(&mut self, example: &ExampleSummary);

    /// Called when an example is pending or skipped.
    fn example_pending(&mut self, example: &ExampleSummary);

    /// Called when an example fails.
    fn example_failed(&mut self, example: &ExampleSummary);

    /// Called when a worker starts an example group.
    fn group_started(&mut self, group: &GroupMetadata);

    /// Called when a worker finishes its most recently started example group.
    fn group_finished(&mut self);

    /// Records the time spent loading test files.
    ///
    /// This may be called several times over a run, each time with a more complete figure.
    fn set_load_time(&mut self, load_time: Duration);

    /// Called once at the end of a run, after the last event has been dispatched.
    fn finish(&mut self);

    /// Returns the examples that failed so far.
    fn failed_examples(&self) -> &[ExampleSummary];
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn example_passed(&mut self, example: &ExampleSummary) {
        (**self).example_passed(example)
    }

    fn example_pending(&mut self, example: &ExampleSummary) {
        (**self).example_pending(example)
    }

    fn example_failed(&mut self, example: &ExampleSummary) {
        (**self).example_failed(example)
    }

    fn group_started(&mut self, group: &GroupMetadata) {
        (**self).group_started(group)
    }

    fn group_finished(&mut self) {
        (**self).group_finished()
    }

    fn set_load_time(&mut self, load_time: Duration) {
        (**self).set_load_time(load_time)
    }

    fn finish(&mut self) {
        (**self).finish()
    }

    fn failed_examples(&self) -> &[ExampleSummary] {
        (**self).failed_examples()
    }
}

/// Counts of what was dispatched during a run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// The number of examples that passed.
    pub passed: usize,

    /// The number of examples that were pending.
    pub pending: usize,

    /// The number of examples that failed.
    pub failed: usize,

    /// The number of example groups started, across all workers.
    pub groups_started: usize,

    /// The number of example groups finished, across all workers.
    pub groups_finished: usize,
}

impl RunStats {
    /// Returns the total number of examples reported.
    pub fn examples(&self) -> usize {
        self.passed + self.pending + self.failed
    }

    /// Returns true if no examples failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}
