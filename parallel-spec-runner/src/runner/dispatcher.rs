// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatcher: the single consumer of the event bus.
//!
//! All aggregate state for a run lives here and is only touched from the dispatcher loop, so
//! nothing in this module needs to be synchronized.

use super::{RunOutcome, internal_events::RunnerEvent};
use crate::{
    config::MaxFail,
    reporter::{Reporter, RunStats},
    signal::SignalHandler,
};
use parallel_spec_metadata::WireEvent;
use std::ops::ControlFlow;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

pub(super) struct DispatcherContext<'a, R: ?Sized> {
    reporter: &'a mut R,
    worker_count: usize,
    exited_count: usize,
    failure_count: usize,
    max_fail: MaxFail,
    load_count: Option<u64>,
    stats: RunStats,
}

impl<'a, R: Reporter + ?Sized> DispatcherContext<'a, R> {
    pub(super) fn new(reporter: &'a mut R, worker_count: usize, max_fail: MaxFail) -> Self {
        Self {
            reporter,
            worker_count,
            exited_count: 0,
            failure_count: 0,
            max_fail,
            load_count: None,
            stats: RunStats::default(),
        }
    }

    pub(super) fn stats(&self) -> RunStats {
        self.stats
    }

    /// Runs the dispatcher loop until every worker has exited, fail-fast kicks in, or a shutdown
    /// signal is received.
    pub(super) async fn run(
        &mut self,
        receiver: &mut UnboundedReceiver<RunnerEvent>,
        signal_handler: &mut SignalHandler,
    ) -> RunOutcome {
        if self.exited_count >= self.worker_count {
            return RunOutcome::Completed;
        }

        let mut signals_done = false;
        loop {
            tokio::select! {
                event = receiver.recv() => {
                    let Some(event) = event else {
                        // Every relay is gone, but not every relay sent an exit event.
                        warn!(
                            "{} of {} workers exited without reporting completion",
                            self.worker_count - self.exited_count,
                            self.worker_count,
                        );
                        break RunOutcome::WorkersLost;
                    };
                    if let ControlFlow::Break(outcome) = self.handle_event(event) {
                        break outcome;
                    }
                }
                signal = signal_handler.recv(), if !signals_done => {
                    match signal {
                        Some(event) => {
                            info!("received {event}, stopping run");
                            break RunOutcome::Interrupted(event);
                        }
                        None => signals_done = true,
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, event: RunnerEvent) -> ControlFlow<RunOutcome> {
        let worker_id = event.worker_id();
        match event {
            RunnerEvent::Wire { event, .. } => return self.handle_wire_event(event),
            RunnerEvent::UnknownKind { kind, .. } => {
                warn!(%worker_id, "ignoring event of unknown kind `{kind}`");
            }
            RunnerEvent::Exit { .. } => {
                self.exited_count += 1;
                debug!(
                    %worker_id,
                    "worker finished ({}/{} exited)",
                    self.exited_count,
                    self.worker_count,
                );
                if self.exited_count >= self.worker_count {
                    return ControlFlow::Break(RunOutcome::Completed);
                }
            }
        }

        ControlFlow::Continue(())
    }

    fn handle_wire_event(&mut self, event: WireEvent) -> ControlFlow<RunOutcome> {
        match event {
            WireEvent::ExamplePassed { example } => {
                self.stats.passed += 1;
                self.reporter.example_passed(&example);
            }
            WireEvent::ExamplePending { example } => {
                self.stats.pending += 1;
                self.reporter.example_pending(&example);
            }
            WireEvent::ExampleFailed { example } => {
                self.stats.failed += 1;
                self.failure_count += 1;
                self.reporter.example_failed(&example);
                if self.max_fail.is_exceeded(self.failure_count) {
                    info!(
                        "{} failed, stopping run (fail-fast is {})",
                        plural_failures(self.failure_count),
                        self.max_fail,
                    );
                    return ControlFlow::Break(RunOutcome::FailFast);
                }
            }
            WireEvent::GroupStarted { group } => {
                self.stats.groups_started += 1;
                self.reporter.group_started(&group);
            }
            WireEvent::GroupFinished {} => {
                self.stats.groups_finished += 1;
                self.reporter.group_finished();
            }
            WireEvent::LoadSummary { summary } => {
                // Partial summaries arrive from several workers in no particular order. The one
                // with the highest count is the most complete.
                if self.load_count.is_none_or(|count| summary.count > count) {
                    self.load_count = Some(summary.count);
                    self.reporter.set_load_time(summary.load_time());
                }
            }
            WireEvent::Seed { .. } | WireEvent::Close {} => {}
        }

        ControlFlow::Continue(())
    }
}

fn plural_failures(count: usize) -> String {
    if count == 1 {
        "1 example".to_owned()
    } else {
        format!("{count} examples")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{runner::WorkerId, signal::ShutdownEvent};
    use parallel_spec_metadata::{ExampleStatus, ExampleSummary, GroupMetadata, LoadSummary};
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[derive(Debug, Default)]
    struct TestReporter {
        calls: Vec<String>,
        load_times: Vec<Duration>,
        failed: Vec<ExampleSummary>,
    }

    impl Reporter for TestReporter {
        fn example_passed(&mut self, example: &ExampleSummary) {
            self.calls.push(format!("passed {}", example.id));
        }

        fn example_pending(&mut self, example: &ExampleSummary) {
            self.calls.push(format!("pending {}", example.id));
        }

        fn example_failed(&mut self, example: &ExampleSummary) {
            self.calls.push(format!("failed {}", example.id));
            self.failed.push(example.clone());
        }

        fn group_started(&mut self, group: &GroupMetadata) {
            self.calls.push(format!("group_started {}", group.description));
        }

        fn group_finished(&mut self) {
            self.calls.push("group_finished".to_owned());
        }

        fn set_load_time(&mut self, load_time: Duration) {
            self.load_times.push(load_time);
        }

        fn finish(&mut self) {}

        fn failed_examples(&self) -> &[ExampleSummary] {
            &self.failed
        }
    }

    fn example(id: &str, status: ExampleStatus) -> ExampleSummary {
        ExampleSummary {
            id: id.to_owned(),
            description: id.to_owned(),
            full_description: String::new(),
            status,
            run_time: 0.0,
            file_path: "./spec/a_spec.rb".to_owned(),
            line_number: None,
            pending_message: None,
            exception: None,
        }
    }

    fn wire(worker: usize, event: WireEvent) -> RunnerEvent {
        RunnerEvent::Wire {
            worker_id: WorkerId::from_index(worker),
            event,
        }
    }

    fn passed(worker: usize, id: &str) -> RunnerEvent {
        wire(
            worker,
            WireEvent::ExamplePassed {
                example: example(id, ExampleStatus::Passed),
            },
        )
    }

    fn failed(worker: usize, id: &str) -> RunnerEvent {
        wire(
            worker,
            WireEvent::ExampleFailed {
                example: example(id, ExampleStatus::Failed),
            },
        )
    }

    fn load(worker: usize, load_time: f64, count: u64) -> RunnerEvent {
        wire(
            worker,
            WireEvent::LoadSummary {
                summary: LoadSummary { load_time, count },
            },
        )
    }

    fn exit(worker: usize) -> RunnerEvent {
        RunnerEvent::Exit {
            worker_id: WorkerId::from_index(worker),
        }
    }

    /// Sends `events`, then runs the dispatcher. The sender is kept alive unless `close` is set.
    async fn dispatch(
        reporter: &mut TestReporter,
        worker_count: usize,
        max_fail: MaxFail,
        events: Vec<RunnerEvent>,
        close: bool,
    ) -> (RunOutcome, RunStats, usize) {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        for event in events {
            sender.send(event).unwrap();
        }
        let _sender = (!close).then_some(sender);

        let mut signal_handler = SignalHandler::noop();
        let mut cx = DispatcherContext::new(reporter, worker_count, max_fail);
        let outcome = cx.run(&mut receiver, &mut signal_handler).await;
        let stats = cx.stats();

        let mut remaining = 0;
        while receiver.try_recv().is_ok() {
            remaining += 1;
        }
        (outcome, stats, remaining)
    }

    #[tokio::test]
    async fn zero_workers_complete_immediately() {
        let mut reporter = TestReporter::default();
        let (outcome, stats, remaining) =
            dispatch(&mut reporter, 0, MaxFail::All, vec![], false).await;
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(stats, RunStats::default());
        assert_eq!(remaining, 0);
        assert!(reporter.calls.is_empty());
    }

    #[tokio::test]
    async fn completes_when_every_worker_exits() {
        let mut reporter = TestReporter::default();
        let events = vec![
            wire(
                0,
                WireEvent::GroupStarted {
                    group: GroupMetadata {
                        description: "A".to_owned(),
                        file_path: None,
                        line_number: None,
                    },
                },
            ),
            passed(0, "a1"),
            passed(1, "b1"),
            wire(1, WireEvent::Seed { seed: Some(42) }),
            RunnerEvent::UnknownKind {
                worker_id: WorkerId::from_index(1),
                kind: "dump_profile".to_owned(),
            },
            exit(1),
            wire(0, WireEvent::GroupFinished {}),
            wire(0, WireEvent::Close {}),
            exit(0),
            exit(2),
        ];
        let (outcome, stats, remaining) =
            dispatch(&mut reporter, 3, MaxFail::All, events, false).await;
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(remaining, 0);
        assert_eq!(
            reporter.calls,
            [
                "group_started A",
                "passed a1",
                "passed b1",
                "group_finished"
            ]
        );
        assert_eq!(
            stats,
            RunStats {
                passed: 2,
                pending: 0,
                failed: 0,
                groups_started: 1,
                groups_finished: 1,
            }
        );
    }

    #[tokio::test]
    async fn load_summary_keeps_highest_count() {
        let mut reporter = TestReporter::default();
        let events = vec![
            load(0, 1.0, 2),
            load(1, 0.5, 1),
            load(1, 3.0, 5),
            load(0, 2.0, 5),
            load(0, 0.0, 0),
            exit(0),
            exit(1),
        ];
        let (outcome, _, _) = dispatch(&mut reporter, 2, MaxFail::All, events, false).await;
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(
            reporter.load_times,
            [Duration::from_secs(1), Duration::from_secs(3)]
        );
    }

    #[tokio::test]
    async fn fail_fast_stops_processing() {
        let mut reporter = TestReporter::default();
        let events = vec![
            passed(0, "a1"),
            failed(0, "a2"),
            passed(1, "b1"),
            failed(1, "b2"),
            exit(0),
        ];
        let (outcome, stats, remaining) =
            dispatch(&mut reporter, 2, MaxFail::Count(1), events, false).await;
        assert_eq!(outcome, RunOutcome::FailFast);
        assert_eq!(reporter.calls, ["passed a1", "failed a2"]);
        assert_eq!(stats.failed, 1);
        // Nothing after the failure was consumed, and the run didn't wait for worker 2.
        assert_eq!(remaining, 3);
    }

    #[tokio::test]
    async fn fail_fast_threshold_above_one() {
        let mut reporter = TestReporter::default();
        let events = vec![
            failed(0, "a1"),
            passed(1, "b1"),
            failed(1, "b2"),
            passed(0, "a2"),
        ];
        let (outcome, stats, remaining) =
            dispatch(&mut reporter, 2, MaxFail::Count(2), events, false).await;
        assert_eq!(outcome, RunOutcome::FailFast);
        assert_eq!(stats.failed, 2);
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn failures_without_fail_fast_run_to_completion() {
        let mut reporter = TestReporter::default();
        let events = vec![failed(0, "a1"), failed(0, "a2"), exit(0)];
        let (outcome, stats, _) = dispatch(&mut reporter, 1, MaxFail::All, events, false).await;
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(stats.failed, 2);
        assert_eq!(reporter.failed_examples().len(), 2);
    }

    #[tokio::test]
    async fn closed_bus_reports_lost_workers() {
        let mut reporter = TestReporter::default();
        let events = vec![passed(0, "a1"), exit(0)];
        let (outcome, stats, _) = dispatch(&mut reporter, 2, MaxFail::All, events, true).await;
        assert_eq!(outcome, RunOutcome::WorkersLost);
        assert_eq!(stats.passed, 1);
    }

    #[tokio::test]
    async fn interrupt_while_waiting_for_events() {
        let mut reporter = TestReporter::default();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        sender.send(passed(0, "a1")).unwrap();
        sender.send(exit(0)).unwrap();

        let (signal_sender, signal_receiver) = mpsc::unbounded_channel();
        let mut signal_handler = SignalHandler::from_events(signal_receiver);
        let mut cx = DispatcherContext::new(&mut reporter, 2, MaxFail::All);

        // The interrupt is only sent after the dispatcher has drained the bus and is waiting on
        // worker 2, which never exits.
        let (outcome, ()) = tokio::join!(cx.run(&mut receiver, &mut signal_handler), async {
            tokio::task::yield_now().await;
            signal_sender.send(ShutdownEvent::Interrupt).unwrap();
        });
        let stats = cx.stats();

        assert_eq!(outcome, RunOutcome::Interrupted(ShutdownEvent::Interrupt));
        assert_eq!(stats.passed, 1);
        assert_eq!(reporter.calls, ["passed a1"]);
        drop(sender);
    }

    #[tokio::test]
    async fn closed_signal_stream_keeps_dispatching() {
        let mut reporter = TestReporter::default();
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let (signal_sender, signal_receiver) = mpsc::unbounded_channel::<ShutdownEvent>();
        drop(signal_sender);
        let mut signal_handler = SignalHandler::from_events(signal_receiver);

        let mut cx = DispatcherContext::new(&mut reporter, 1, MaxFail::All);
        let (outcome, ()) = tokio::join!(cx.run(&mut receiver, &mut signal_handler), async {
            tokio::task::yield_now().await;
            sender.send(passed(0, "a1")).unwrap();
            sender.send(exit(0)).unwrap();
        });

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(cx.stats().passed, 1);
    }
}
