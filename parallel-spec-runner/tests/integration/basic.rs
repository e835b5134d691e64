// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::fixtures::*;
use camino::Utf8Path;
use color_eyre::eyre::{Result, bail};
use parallel_spec_runner::{
    config::{MaxFail, WorkerCount},
    errors::{RunnerBuildError, RunnerExecuteError},
    partition::{Group, Partitioner, RuntimePartitioner},
    runner::{RunOutcome, TestRunnerBuilder, WorkerId},
    signal::{ShutdownEvent, SignalHandlerKind},
    test_list::TestList,
};
use pretty_assertions::assert_eq;
use std::{
    collections::BTreeSet,
    time::{Duration, Instant},
};

fn position(reporter: &RecordingReporter, call: &ReporterCall) -> usize {
    reporter
        .calls
        .iter()
        .position(|c| c == call)
        .unwrap_or_else(|| panic!("{call:?} not found in {:?}", reporter.calls))
}

#[test]
fn all_passing_across_three_workers() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::fake_worker()?;
    let tests = [
        "spec/a_spec.rb",
        "spec/b_spec.rb",
        "spec/c_spec.rb",
        "spec/d_spec.rb",
        "spec/e_spec.rb",
        "spec/f_spec.rb",
    ];

    let mut builder = TestRunnerBuilder::default();
    builder.set_workers(WorkerCount::Count(3));
    let (finished, reporter) = workspace.run(&tests, builder)?;

    assert_eq!(finished.worker_count, 3);
    assert_eq!(finished.outcome, RunOutcome::Completed);
    assert!(finished.is_success());
    assert_eq!(finished.stats.passed, 6);
    assert_eq!(finished.stats.groups_started, 3);
    assert_eq!(finished.stats.groups_finished, 3);
    assert!(reporter.finished);
    assert!(reporter.failed.is_empty());

    let passed: BTreeSet<_> = reporter
        .calls
        .iter()
        .filter_map(|call| match call {
            ReporterCall::Passed(file) => Some(file.as_str()),
            _ => None,
        })
        .collect();
    let expected: BTreeSet<_> = tests.iter().map(|test| format!("./{test}")).collect();
    assert_eq!(
        passed,
        expected.iter().map(String::as_str).collect::<BTreeSet<_>>()
    );
    assert_eq!(
        reporter.count(|call| matches!(call, ReporterCall::Passed(_))),
        6
    );

    let groups: BTreeSet<_> = reporter
        .calls
        .iter()
        .filter_map(|call| match call {
            ReporterCall::GroupStarted(description) => Some(description.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        groups,
        BTreeSet::from(["worker 1", "worker 2", "worker 3"])
    );

    // Without runtime history, worker 1 runs a and d, worker 2 runs b and e, worker 3 runs c and
    // f. Each worker's events are dispatched in the order it produced them.
    for (worker, first, second) in [(1, "a", "d"), (2, "b", "e"), (3, "c", "f")] {
        let started = position(
            &reporter,
            &ReporterCall::GroupStarted(format!("worker {worker}")),
        );
        let first = position(
            &reporter,
            &ReporterCall::Passed(format!("./spec/{first}_spec.rb")),
        );
        let second = position(
            &reporter,
            &ReporterCall::Passed(format!("./spec/{second}_spec.rb")),
        );
        assert!(
            started < first && first < second,
            "worker {worker} events out of order: {:?}",
            reporter.calls
        );
    }

    // The load summary with the highest count (worker 3's) wins.
    assert_eq!(reporter.load_time, Some(Duration::from_millis(3500)));

    Ok(())
}

#[test]
fn fail_fast_stops_hung_workers() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::fake_worker()?;
    // Worker 1 runs a_fail then c_hang, worker 2 runs b then d_hang.
    let tests = [
        "spec/a_fail_spec.rb",
        "spec/b_spec.rb",
        "spec/c_hang_spec.rb",
        "spec/d_hang_spec.rb",
    ];

    let mut builder = TestRunnerBuilder::default();
    builder
        .set_workers(WorkerCount::Count(2))
        .set_max_fail(MaxFail::Count(1));
    let start = Instant::now();
    let (finished, reporter) = workspace.run(&tests, builder)?;
    let elapsed = start.elapsed();

    assert!(
        elapsed < Duration::from_secs(20),
        "run should not wait for hung workers (took {elapsed:?})"
    );
    assert_eq!(finished.worker_count, 2);
    assert_eq!(finished.outcome, RunOutcome::FailFast);
    assert!(!finished.is_success());
    assert_eq!(finished.stats.failed, 1);
    assert!(reporter.finished);
    assert_eq!(reporter.failed.len(), 1);
    assert_eq!(reporter.failed[0].file_path, "./spec/a_fail_spec.rb");
    assert_eq!(
        reporter.count(|call| matches!(
            call,
            ReporterCall::Passed(file) if file.contains("hang")
        )),
        0
    );

    Ok(())
}

#[test]
fn failures_and_pending_without_fail_fast() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::fake_worker()?;
    let tests = [
        "spec/a_fail_spec.rb",
        "spec/b_pending_spec.rb",
        "spec/c_spec.rb",
        "spec/d_fail_spec.rb",
    ];

    let mut builder = TestRunnerBuilder::default();
    builder
        .set_workers(WorkerCount::Count(2))
        .set_max_fail(MaxFail::All)
        .add_tag("~slow")
        .add_tag("focus");
    let (finished, reporter) = workspace.run(&tests, builder)?;

    assert_eq!(finished.outcome, RunOutcome::Completed);
    assert!(!finished.is_success());
    assert_eq!(finished.failed_examples, 2);
    assert_eq!(finished.stats.passed, 1);
    assert_eq!(finished.stats.pending, 1);
    assert_eq!(finished.stats.failed, 2);
    assert_eq!(finished.stats.examples(), 4);
    assert_eq!(
        reporter.count(|call| matches!(call, ReporterCall::Pending(_))),
        1
    );

    // Every worker is passed every tag, in order.
    let groups: BTreeSet<_> = reporter
        .calls
        .iter()
        .filter_map(|call| match call {
            ReporterCall::GroupStarted(description) => Some(description.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(
        groups,
        BTreeSet::from([
            "worker 1 tag=~slow tag=focus",
            "worker 2 tag=~slow tag=focus",
        ])
    );

    Ok(())
}

#[cfg(unix)]
#[test]
fn interrupt_stops_hung_workers() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::fake_worker()?;
    // Worker 1 runs a, worker 2 hangs on b_hang.
    let test_list = TestList::new(["spec/a_spec.rb", "spec/b_hang_spec.rb"]);

    let mut builder = TestRunnerBuilder::default();
    builder.set_workers(WorkerCount::Count(2));
    // The handler is installed here, so SIGINT is captured from now on rather than killing the
    // test process.
    let runner = builder.build(
        &test_list,
        workspace.config(),
        &RuntimePartitioner,
        SignalHandlerKind::Standard,
    )?;

    let interrupter = std::thread::spawn(|| {
        std::thread::sleep(Duration::from_secs(1));
        // SAFETY: kill has no memory safety preconditions.
        unsafe { libc::kill(std::process::id() as libc::pid_t, libc::SIGINT) };
    });

    let start = Instant::now();
    let mut reporter = RecordingReporter::default();
    let finished = runner.execute(&mut reporter)?;
    let elapsed = start.elapsed();
    interrupter.join().expect("interrupter thread panicked");

    assert!(
        elapsed < Duration::from_secs(20),
        "run should not wait for hung workers (took {elapsed:?})"
    );
    assert_eq!(finished.worker_count, 2);
    assert_eq!(
        finished.outcome,
        RunOutcome::Interrupted(ShutdownEvent::Interrupt)
    );
    assert!(reporter.finished);
    assert_eq!(
        reporter.count(|call| matches!(
            call,
            ReporterCall::Passed(file) if file.contains("hang")
        )),
        0
    );

    Ok(())
}

#[test]
fn zero_workers_is_rejected() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::fake_worker()?;
    let test_list = TestList::new(["spec/a_spec.rb"]);

    let mut builder = TestRunnerBuilder::default();
    builder.set_workers(WorkerCount::Count(0));
    match builder.build(
        &test_list,
        workspace.config(),
        &RuntimePartitioner,
        SignalHandlerKind::Noop,
    ) {
        Err(RunnerBuildError::NoWorkers) => Ok(()),
        other => bail!("expected NoWorkers, got {other:?}"),
    }
}

#[test]
fn malformed_events_are_dropped() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::fake_worker()?;
    let tests = ["spec/a_garbage_spec.rb", "spec/b_spec.rb"];

    let mut builder = TestRunnerBuilder::default();
    builder.set_workers(WorkerCount::Count(2));
    let (finished, reporter) = workspace.run(&tests, builder)?;

    assert_eq!(finished.outcome, RunOutcome::Completed);
    assert!(finished.is_success());
    // The malformed event is dropped, and the worker's later events still arrive.
    assert_eq!(finished.stats.passed, 2);
    assert_eq!(
        reporter.count(|call| matches!(call, ReporterCall::GroupFinished)),
        2
    );

    Ok(())
}

/// Adds an empty group after the groups produced by the runtime partitioner.
struct WithEmptyGroup;

impl Partitioner for WithEmptyGroup {
    fn partition(
        &self,
        tests: &[String],
        worker_count: usize,
        runtime_log: &Utf8Path,
    ) -> Vec<Group> {
        let mut groups = RuntimePartitioner.partition(tests, worker_count, runtime_log);
        groups.push(Group::default());
        groups
    }
}

#[test]
fn empty_groups_count_as_exited_workers() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::fake_worker()?;
    let tests = ["spec/a_spec.rb", "spec/b_spec.rb"];

    let mut builder = TestRunnerBuilder::default();
    builder.set_workers(WorkerCount::Count(2));
    let (finished, _) = workspace.run_with(&tests, builder, &WithEmptyGroup)?;

    assert_eq!(finished.worker_count, 3);
    assert_eq!(finished.outcome, RunOutcome::Completed);
    assert_eq!(finished.stats.passed, 2);
    assert_eq!(finished.stats.groups_started, 2);

    Ok(())
}

#[test]
fn no_tests_succeeds_trivially() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::fake_worker()?;

    let (finished, reporter) = workspace.run(&[], TestRunnerBuilder::default())?;

    assert_eq!(finished.worker_count, 0);
    assert_eq!(finished.outcome, RunOutcome::Completed);
    assert!(finished.is_success());
    assert!(reporter.finished);
    assert!(reporter.calls.is_empty());

    Ok(())
}

#[test]
fn spawn_failure_is_fatal() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::new(&["/nonexistent/parallel-spec-worker"])?;
    let test_list = TestList::new(["spec/a_spec.rb", "spec/b_spec.rb"]);

    let mut builder = TestRunnerBuilder::default();
    builder.set_workers(WorkerCount::Count(2));
    let runner = builder.build(
        &test_list,
        workspace.config(),
        &RuntimePartitioner,
        SignalHandlerKind::Noop,
    )?;
    let mut reporter = RecordingReporter::default();

    match runner.execute(&mut reporter) {
        Err(RunnerExecuteError::WorkerSpawn(err)) => {
            assert_eq!(err.worker_id(), WorkerId::from_index(0));
            assert!(
                err.command()
                    .starts_with("/nonexistent/parallel-spec-worker --seed "),
                "unexpected command: {}",
                err.command()
            );
        }
        other => bail!("expected a spawn error, got {other:?}"),
    }
    // No aggregation is attempted.
    assert!(!reporter.finished);
    assert!(reporter.calls.is_empty());

    Ok(())
}

#[test]
fn pinned_seed_is_kept() -> Result<()> {
    test_init();
    let workspace = TestWorkspace::fake_worker()?;
    let test_list = TestList::new(["spec/a_spec.rb"]);

    let mut builder = TestRunnerBuilder::default();
    builder.set_seed(4242);
    let runner = builder.build(
        &test_list,
        workspace.config(),
        &RuntimePartitioner,
        SignalHandlerKind::Noop,
    )?;
    assert_eq!(runner.seed(), 4242);

    let mut reporter = RecordingReporter::default();
    let finished = runner.execute(&mut reporter)?;
    assert_eq!(finished.worker_count, 1);
    assert!(finished.is_success());

    Ok(())
}
