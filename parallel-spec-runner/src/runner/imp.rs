// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{
    WorkerId, WorkerSpec,
    dispatcher::DispatcherContext,
    internal_events::RunnerEvent,
    relay::{relay_stderr, relay_stdout},
    worker::{WorkerLauncher, support_path_value},
};
use crate::{
    config::{MaxFail, ParallelSpecConfig, WorkerCount},
    errors::{RunnerBuildError, RunnerExecuteError, WorkerSpawnError},
    partition::Partitioner,
    reporter::{Reporter, RunStats},
    signal::{ShutdownEvent, SignalHandler, SignalHandlerKind},
    test_list::TestList,
};
use camino::Utf8PathBuf;
use debug_ignore::DebugIgnore;
use std::{io::Write, process::ExitStatus};
use tokio::{
    process::Child,
    runtime::Runtime,
    sync::{
        broadcast,
        mpsc::{self, UnboundedSender},
    },
    task::JoinSet,
};
use tracing::{debug, info, warn};

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    workers: Option<WorkerCount>,
    max_fail: Option<MaxFail>,
    tags: Vec<String>,
    seed: Option<u64>,
    verbose: bool,
}

impl TestRunnerBuilder {
    /// Sets the upper bound on the number of workers, overriding the config.
    pub fn set_workers(&mut self, workers: WorkerCount) -> &mut Self {
        self.workers = Some(workers);
        self
    }

    /// Sets the fail-fast threshold, overriding the config.
    pub fn set_max_fail(&mut self, max_fail: MaxFail) -> &mut Self {
        self.max_fail = Some(max_fail);
        self
    }

    /// Adds a tag filter, passed to every worker with `--tag`.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tags.push(tag.into());
        self
    }

    /// Pins the seed passed to workers. By default a random seed is chosen for each run.
    pub fn set_seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    /// If set, prints each worker's environment and command line to stderr before starting it.
    pub fn set_verbose(&mut self, verbose: bool) -> &mut Self {
        self.verbose = verbose;
        self
    }

    /// Creates a new test runner.
    pub fn build<'a>(
        self,
        test_list: &'a TestList,
        config: &ParallelSpecConfig,
        partitioner: &'a dyn Partitioner,
        signal_handler: SignalHandlerKind,
    ) -> Result<TestRunner<'a>, RunnerBuildError> {
        let workers = self
            .workers
            .unwrap_or_else(|| config.runner().workers())
            .compute();
        if workers == 0 {
            return Err(RunnerBuildError::NoWorkers);
        }
        let max_fail = self
            .max_fail
            .unwrap_or_else(|| config.runner().fail_fast());
        // Seeds are kept small so they are easy to copy into a rerun.
        let seed = self
            .seed
            .unwrap_or_else(|| u64::from(rand::random::<u16>()));

        let support_env = match config.worker().support_path() {
            Some(support) => {
                let value = support_path_value(
                    config.workspace_root(),
                    &support.path,
                    std::env::var_os(&support.var),
                )
                .map_err(|err| RunnerBuildError::InvalidSupportPath {
                    var: support.var.clone(),
                    err,
                })?;
                Some((support.var.clone(), value))
            }
            None => None,
        };

        let runtime_log = config.runtime_log_path();
        let launcher = WorkerLauncher::new(
            config.worker().clone(),
            config.workspace_root().to_owned(),
            runtime_log.clone(),
            self.tags,
            support_env,
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("parallel-spec-worker")
            .build()
            .map_err(RunnerBuildError::TokioRuntimeCreate)?;
        let _guard = runtime.enter();

        // signal_handler.build() must be called from within the guard.
        let signal_handler = signal_handler.build()?;

        Ok(TestRunner {
            inner: TestRunnerInner {
                test_list,
                partitioner: DebugIgnore(partitioner),
                launcher,
                runtime_log,
                workers,
                max_fail,
                seed,
                verbose: self.verbose,
            },
            runtime,
            signal_handler,
        })
    }
}

/// Context for running tests.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner<'a> {
    inner: TestRunnerInner<'a>,
    runtime: Runtime,
    signal_handler: SignalHandler,
}

impl TestRunner<'_> {
    /// Returns the seed passed to workers.
    pub fn seed(&self) -> u64 {
        self.inner.seed
    }

    /// Executes the run, forwarding events to `reporter`.
    ///
    /// The only hard error is a worker failing to start, in which case the workers that had
    /// already started are killed. Everything else, including failed examples, fail-fast and
    /// interrupts, is described by the returned [`RunFinished`].
    pub fn execute(
        self,
        reporter: &mut dyn Reporter,
    ) -> Result<RunFinished, RunnerExecuteError> {
        let Self {
            inner,
            runtime,
            mut signal_handler,
        } = self;

        let res = runtime.block_on(inner.execute(reporter, &mut signal_handler));

        // Every worker has been reaped at this point. Don't wait for the blocking threads that
        // back stdout and stderr.
        runtime.shutdown_background();
        res
    }
}

#[derive(Debug)]
struct TestRunnerInner<'a> {
    test_list: &'a TestList,
    partitioner: DebugIgnore<&'a dyn Partitioner>,
    launcher: WorkerLauncher,
    runtime_log: Utf8PathBuf,
    workers: usize,
    max_fail: MaxFail,
    seed: u64,
    verbose: bool,
}

impl TestRunnerInner<'_> {
    async fn execute(
        &self,
        reporter: &mut dyn Reporter,
        signal_handler: &mut SignalHandler,
    ) -> Result<RunFinished, RunnerExecuteError> {
        debug!("planning run");
        let tests = self.test_list.tests();
        let requested = self
            .partitioner
            .determine_worker_count(self.workers, tests.len());
        let groups = self
            .partitioner
            .partition(tests, requested, &self.runtime_log);
        if groups.len() != requested {
            debug!(
                requested,
                actual = groups.len(),
                "partitioner produced a different number of groups"
            );
        }
        // Every group, empty or not, accounts for exactly one exit event.
        let worker_count = groups.len();
        info!(
            "{} for {}, ~{} per worker",
            plural(worker_count, "worker"),
            plural(tests.len(), "test file"),
            tests.len().checked_div(worker_count).unwrap_or(0),
        );
        info!("randomized with seed {}", self.seed);

        debug!("launching workers");
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let mut tasks = RunTasks::new();
        for (index, group) in groups.into_iter().enumerate() {
            let spec = WorkerSpec::new(WorkerId::from_index(index), self.seed, group);
            if spec.group().is_empty() {
                debug!(worker_id = %spec.id(), "group is empty, not starting a worker");
                _ = sender.send(RunnerEvent::Exit {
                    worker_id: spec.id(),
                });
                continue;
            }

            let command = self.launcher.command_for(&spec, worker_count);
            if self.verbose {
                _ = writeln!(std::io::stderr(), "{}", command.display_verbose());
            }

            match command.spawn() {
                Ok(child) => {
                    debug!(
                        worker_id = %spec.id(),
                        tests = spec.group().len(),
                        estimated_runtime = ?spec.group().estimated_runtime(),
                        "started worker"
                    );
                    tasks.start_worker(&spec, child, sender.clone());
                }
                Err(err) => {
                    let err = WorkerSpawnError::new(spec.id(), command.display_command(), err);
                    tasks.cancel();
                    // The spawn error takes precedence over any task panics.
                    _ = tasks.join().await;
                    return Err(err.into());
                }
            }
        }
        // Only relays hold senders from here on, so the bus closes once they're all gone.
        drop(sender);

        debug!("aggregating events");
        let mut cx = DispatcherContext::new(reporter, worker_count, self.max_fail);
        let outcome = cx.run(&mut receiver, signal_handler).await;
        let stats = cx.stats();
        drop(receiver);

        if outcome != RunOutcome::Completed {
            debug!(?outcome, "cancelling remaining workers");
            tasks.cancel();
        }

        debug!("finalizing run");
        reporter.finish();
        tasks.join().await?;

        let finished = RunFinished {
            worker_count,
            outcome,
            stats,
            failed_examples: reporter.failed_examples().len(),
        };
        debug!(?finished, "run done");
        Ok(finished)
    }
}

/// The tasks started for a run: one supervisor per worker process, and a pair of relays per
/// worker.
struct RunTasks {
    // Kept alive until every supervisor has been joined.
    cancel_sender: broadcast::Sender<()>,
    supervisors: JoinSet<()>,
    relays: JoinSet<()>,
}

impl RunTasks {
    fn new() -> Self {
        let (cancel_sender, _) = broadcast::channel(1);
        Self {
            cancel_sender,
            supervisors: JoinSet::new(),
            relays: JoinSet::new(),
        }
    }

    fn start_worker(
        &mut self,
        spec: &WorkerSpec,
        mut child: Child,
        sender: UnboundedSender<RunnerEvent>,
    ) {
        let worker_id = spec.id();
        match child.stdout.take() {
            Some(stdout) => {
                self.relays.spawn(relay_stdout(
                    worker_id,
                    spec.token().clone(),
                    stdout,
                    tokio::io::stdout(),
                    sender,
                ));
            }
            None => {
                _ = sender.send(RunnerEvent::Exit { worker_id });
            }
        }
        if let Some(stderr) = child.stderr.take() {
            self.relays
                .spawn(relay_stderr(worker_id, stderr, tokio::io::stderr()));
        }

        self.supervisors
            .spawn(supervise(worker_id, child, self.cancel_sender.subscribe()));
    }

    /// Kills every worker and aborts every relay.
    fn cancel(&mut self) {
        // An error means there are no supervisors to notify.
        _ = self.cancel_sender.send(());
        self.relays.abort_all();
    }

    /// Waits for every task to finish. Cancelled tasks are fine, panicked ones are not.
    async fn join(mut self) -> Result<(), RunnerExecuteError> {
        let mut join_errors = Vec::new();
        while let Some(res) = self.relays.join_next().await {
            match res {
                Err(err) if err.is_panic() => join_errors.push(err),
                _ => {}
            }
        }
        while let Some(res) = self.supervisors.join_next().await {
            match res {
                Err(err) if err.is_panic() => join_errors.push(err),
                _ => {}
            }
        }

        if join_errors.is_empty() {
            Ok(())
        } else {
            Err(RunnerExecuteError::TasksPanicked { join_errors })
        }
    }
}

/// Reaps a worker process, killing it first if the run is cancelled.
async fn supervise(
    worker_id: WorkerId,
    mut child: Child,
    mut cancel_receiver: broadcast::Receiver<()>,
) {
    tokio::select! {
        status = child.wait() => log_exit(worker_id, status),
        _ = cancel_receiver.recv() => {
            debug!(%worker_id, "killing worker");
            super::os::kill_worker(&mut child);
            match child.wait().await {
                Ok(status) => debug!(%worker_id, %status, "worker killed"),
                Err(err) => warn!(%worker_id, "error waiting for killed worker: {err}"),
            }
        }
    }
}

fn log_exit(worker_id: WorkerId, status: std::io::Result<ExitStatus>) {
    match status {
        Ok(status) if status.success() => debug!(%worker_id, "worker exited successfully"),
        // Failed examples make workers exit non-zero, so this isn't an error by itself.
        Ok(status) => debug!(%worker_id, %status, "worker exited unsuccessfully"),
        Err(err) => warn!(%worker_id, "error waiting for worker: {err}"),
    }
}

fn plural(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}

/// How a run ended.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    /// Every worker exited.
    Completed,

    /// The fail-fast threshold was reached, and the remaining workers were killed.
    FailFast,

    /// A shutdown signal was received, and the remaining workers were killed.
    Interrupted(ShutdownEvent),

    /// Some workers' output streams closed without the workers being accounted for.
    WorkersLost,
}

/// The result of a run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RunFinished {
    /// The number of workers, including workers for empty groups.
    pub worker_count: usize,

    /// How the run ended.
    pub outcome: RunOutcome,

    /// Counts of dispatched events.
    pub stats: RunStats,

    /// The number of failed examples recorded by the reporter.
    pub failed_examples: usize,
}

impl RunFinished {
    /// Returns true if the reporter recorded no failed examples.
    pub fn is_success(&self) -> bool {
        self.failed_examples == 0
    }
}
