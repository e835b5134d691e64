// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Splitting a test list into groups, one per worker.
//!
//! Groups are balanced by estimated runtime rather than by count, using the runtime log written by
//! workers during previous runs.

use crate::errors::RuntimeLogReadError;
use camino::Utf8Path;
use std::{collections::HashMap, time::Duration};
use tracing::{debug, warn};

/// An ordered, immutable sequence of test IDs assigned to one worker.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Group {
    tests: Vec<String>,
    estimated_runtime: Duration,
}

impl Group {
    /// Creates a new group.
    pub fn new(tests: Vec<String>, estimated_runtime: Duration) -> Self {
        Self {
            tests,
            estimated_runtime,
        }
    }

    /// Returns the number of tests in this group.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if this group has no tests.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Returns the tests in this group.
    pub fn tests(&self) -> &[String] {
        &self.tests
    }

    /// Iterates over the tests in this group.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.tests.iter().map(String::as_str)
    }

    /// Returns the sum of the estimated runtimes of the tests in this group.
    pub fn estimated_runtime(&self) -> Duration {
        self.estimated_runtime
    }
}

/// Computes worker counts and groups for a run.
pub trait Partitioner {
    /// Returns the number of workers to start: never more than `requested`, and never more than
    /// the number of tests.
    fn determine_worker_count(&self, requested: usize, total_tests: usize) -> usize {
        requested.min(total_tests)
    }

    /// Splits `tests` into exactly `worker_count` groups.
    ///
    /// Every test appears in exactly one group. The result is deterministic given the same tests
    /// and the same runtime log contents.
    fn partition(
        &self,
        tests: &[String],
        worker_count: usize,
        runtime_log: &Utf8Path,
    ) -> Vec<Group>;
}

/// Historical per-test runtimes, as recorded by workers in the runtime log.
///
/// The log has one `test_id:seconds` entry per line. The last colon on a line separates the ID from
/// the runtime, so IDs may themselves contain colons. When a test appears several times, the last
/// entry wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RuntimeLog {
    runtimes: HashMap<String, f64>,
}

impl RuntimeLog {
    /// Reads the runtime log at `path`. A missing file produces an empty log.
    pub fn read_from(path: &Utf8Path) -> Result<Self, RuntimeLogReadError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(%path, "no runtime log found, groups will be balanced by count");
                Ok(Self::default())
            }
            Err(err) => Err(RuntimeLogReadError::new(path, err)),
        }
    }

    /// Parses the contents of a runtime log. Malformed lines are skipped.
    pub fn parse(contents: &str) -> Self {
        let mut runtimes = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed = line.rsplit_once(':').and_then(|(test, seconds)| {
                let seconds: f64 = seconds.trim().parse().ok()?;
                (!test.is_empty() && seconds.is_finite() && seconds >= 0.0)
                    .then_some((test, seconds))
            });
            match parsed {
                Some((test, seconds)) => {
                    runtimes.insert(test.to_owned(), seconds);
                }
                None => debug!(line, "skipping malformed runtime log line"),
            }
        }

        Self { runtimes }
    }

    /// Returns the recorded runtime for a test, in seconds.
    pub fn get(&self, test: &str) -> Option<f64> {
        self.runtimes.get(test).copied()
    }

    /// Returns the number of tests with recorded runtimes.
    pub fn len(&self) -> usize {
        self.runtimes.len()
    }

    /// Returns true if no runtimes were recorded.
    pub fn is_empty(&self) -> bool {
        self.runtimes.is_empty()
    }
}

/// A [`Partitioner`] that balances groups by historical runtime.
///
/// Tests are assigned longest-first to the group with the smallest estimated total. Tests with no
/// recorded runtime are estimated at the mean of the known runtimes among `tests`, or at
/// [`Self::DEFAULT_ESTIMATE`] if none are known. Within a group, tests keep their input order.
#[derive(Clone, Copy, Debug, Default)]
pub struct RuntimePartitioner;

impl RuntimePartitioner {
    /// The estimate used for every test when no runtimes are known, in seconds.
    pub const DEFAULT_ESTIMATE: f64 = 1.0;

    /// Splits `tests` into `worker_count` groups using an already-loaded runtime log.
    pub fn partition_with_log(
        &self,
        tests: &[String],
        worker_count: usize,
        runtime_log: &RuntimeLog,
    ) -> Vec<Group> {
        if worker_count == 0 {
            return Vec::new();
        }

        let known: Vec<f64> = tests
            .iter()
            .filter_map(|test| runtime_log.get(test))
            .collect();
        let fallback = if known.is_empty() {
            Self::DEFAULT_ESTIMATE
        } else {
            known.iter().sum::<f64>() / known.len() as f64
        };

        // (input index, estimate), longest first. Ties are broken by test ID so the result doesn't
        // depend on input order for equal estimates.
        let mut estimates: Vec<(usize, f64)> = tests
            .iter()
            .enumerate()
            .map(|(index, test)| (index, runtime_log.get(test).unwrap_or(fallback)))
            .collect();
        estimates.sort_by(|(a_index, a), (b_index, b)| {
            b.total_cmp(a)
                .then_with(|| tests[*a_index].cmp(&tests[*b_index]))
        });

        let mut totals = vec![0.0f64; worker_count];
        let mut assigned: Vec<Vec<usize>> = vec![Vec::new(); worker_count];
        for (index, estimate) in estimates {
            // The group with the smallest total. Equal totals (e.g. all-zero estimates) go to the
            // group with the fewest tests, then to the lowest index.
            let group = (0..worker_count)
                .min_by(|&a, &b| {
                    totals[a]
                        .total_cmp(&totals[b])
                        .then_with(|| assigned[a].len().cmp(&assigned[b].len()))
                })
                .unwrap_or(0);
            totals[group] += estimate;
            assigned[group].push(index);
        }

        assigned
            .into_iter()
            .zip(totals)
            .map(|(mut indexes, total)| {
                indexes.sort_unstable();
                let group_tests = indexes.into_iter().map(|i| tests[i].clone()).collect();
                Group::new(group_tests, Duration::try_from_secs_f64(total).unwrap_or_default())
            })
            .collect()
    }
}

impl Partitioner for RuntimePartitioner {
    fn partition(
        &self,
        tests: &[String],
        worker_count: usize,
        runtime_log: &Utf8Path,
    ) -> Vec<Group> {
        let log = RuntimeLog::read_from(runtime_log).unwrap_or_else(|err| {
            warn!(
                "{}, groups will be balanced by count",
                crate::errors::DisplayErrorChain::new(&err)
            );
            RuntimeLog::default()
        });
        self.partition_with_log(tests, worker_count, &log)
    }
}
