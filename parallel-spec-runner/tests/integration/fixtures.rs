// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use camino_tempfile::Utf8TempDir;
use color_eyre::eyre::Result;
use indoc::indoc;
use parallel_spec_metadata::{ExampleSummary, GroupMetadata};
use parallel_spec_runner::{
    config::ParallelSpecConfig,
    partition::{Partitioner, RuntimePartitioner},
    reporter::Reporter,
    runner::{RunFinished, TestRunnerBuilder},
    signal::SignalHandlerKind,
    test_list::TestList,
};
use std::{sync::Once, time::Duration};

/// A worker that reports one example per `spec/*` argument.
///
/// * Files ending in `fail_spec.rb` fail, and files ending in `pending_spec.rb` are pending.
/// * Files ending in `hang_spec.rb` make the worker sleep before reporting anything else.
/// * Files ending in `garbage_spec.rb` make the worker emit a malformed event first.
///
/// Each worker reports a load summary whose count is its worker ID, and a group described as
/// `worker <ID>` followed by ` tag=<TAG>` for each `--tag` it was passed.
pub(crate) const FAKE_WORKER: &str = indoc! {r#"
    emit() { printf '%s%s\n' "$PARALLEL_SPEC_TOKEN" "$1"; }
    echo "worker $PARALLEL_SPEC_WORKER_ID of $PARALLEL_SPEC_WORKER_COUNT starting"
    emit '{"type":"seed"}'
    emit '{"type":"load_summary","summary":{"load_time":'"$PARALLEL_SPEC_WORKER_ID"'.5,"count":'"$PARALLEL_SPEC_WORKER_ID"'}}'
    tags=
    prev=
    for arg in "$@"; do
        if [ "$prev" = --tag ]; then tags="$tags tag=$arg"; fi
        prev=$arg
    done
    emit '{"type":"group_started","group":{"description":"worker '"$PARALLEL_SPEC_WORKER_ID$tags"'"}}'
    for arg in "$@"; do
        case "$arg" in
            spec/*) ;;
            *) continue ;;
        esac
        case "$arg" in
            *hang_spec.rb) sleep 30 ;;
            *garbage_spec.rb) emit '{"type":"example_passed","example":' ;;
        esac
        case "$arg" in
            *fail_spec.rb) status=failed ;;
            *pending_spec.rb) status=pending ;;
            *) status=passed ;;
        esac
        printf 'running %s... ' "$arg"
        emit '{"type":"example_'"$status"'","example":{"id":"./'"$arg"'[1:1]","description":"works","status":"'"$status"'","file_path":"./'"$arg"'","line_number":3}}'
        echo "stderr from $arg" >&2
    done
    emit '{"type":"group_finished"}'
    emit '{"type":"close"}'
"#};

pub(crate) fn test_init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        color_eyre::install().expect("color-eyre installed once");
        _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// A temporary workspace with a config that runs `program` as the worker.
pub(crate) struct TestWorkspace {
    // Kept alive so the workspace isn't deleted during the test.
    _dir: Utf8TempDir,
    config: ParallelSpecConfig,
}

impl TestWorkspace {
    pub(crate) fn new(program: &[&str]) -> Result<Self> {
        let dir = Utf8TempDir::new()?;
        let config_path = dir.path().join(ParallelSpecConfig::CONFIG_PATH);
        std::fs::create_dir_all(config_path.parent().expect("config path has a parent"))?;

        let program = program
            .iter()
            .map(|arg| format!("'''{arg}'''"))
            .collect::<Vec<_>>()
            .join(", ");
        std::fs::write(
            &config_path,
            format!("[worker]\nprogram = [{program}]\n\n[runner]\nruntime-log = \"runtime.log\"\n"),
        )?;

        let config = ParallelSpecConfig::from_sources(dir.path(), None)?;
        Ok(Self { _dir: dir, config })
    }

    pub(crate) fn fake_worker() -> Result<Self> {
        Self::new(&["/bin/sh", "-c", FAKE_WORKER, "fake-worker"])
    }

    pub(crate) fn config(&self) -> &ParallelSpecConfig {
        &self.config
    }

    /// Runs `tests` with the runtime partitioner and a recording reporter.
    pub(crate) fn run(
        &self,
        tests: &[&str],
        builder: TestRunnerBuilder,
    ) -> Result<(RunFinished, RecordingReporter)> {
        self.run_with(tests, builder, &RuntimePartitioner)
    }

    pub(crate) fn run_with(
        &self,
        tests: &[&str],
        builder: TestRunnerBuilder,
        partitioner: &dyn Partitioner,
    ) -> Result<(RunFinished, RecordingReporter)> {
        let test_list = TestList::new(tests.iter().copied());
        let runner = builder.build(
            &test_list,
            &self.config,
            partitioner,
            SignalHandlerKind::Noop,
        )?;
        let mut reporter = RecordingReporter::default();
        let finished = runner.execute(&mut reporter)?;
        Ok((finished, reporter))
    }
}

/// A reporter that records every call made to it.
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    pub(crate) calls: Vec<ReporterCall>,
    pub(crate) load_time: Option<Duration>,
    pub(crate) failed: Vec<ExampleSummary>,
    pub(crate) finished: bool,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) enum ReporterCall {
    Passed(String),
    Pending(String),
    Failed(String),
    GroupStarted(String),
    GroupFinished,
}

impl RecordingReporter {
    pub(crate) fn count(&self, f: impl Fn(&ReporterCall) -> bool) -> usize {
        self.calls.iter().filter(|call| f(call)).count()
    }
}

impl Reporter for RecordingReporter {
    fn example_passed(&mut self, example: &ExampleSummary) {
        self.calls.push(ReporterCall::Passed(example.file_path.clone()));
    }

    fn example_pending(&mut self, example: &ExampleSummary) {
        self.calls
            .push(ReporterCall::Pending(example.file_path.clone()));
    }

    fn example_failed(&mut self, example: &ExampleSummary) {
        self.calls.push(ReporterCall::Failed(example.file_path.clone()));
        self.failed.push(example.clone());
    }

    fn group_started(&mut self, group: &GroupMetadata) {
        self.calls
            .push(ReporterCall::GroupStarted(group.description.clone()));
    }

    fn group_finished(&mut self) {
        self.calls.push(ReporterCall::GroupFinished);
    }

    fn set_load_time(&mut self, load_time: Duration) {
        self.load_time = Some(load_time);
    }

    fn finish(&mut self) {
        self.finished = true;
    }

    fn failed_examples(&self) -> &[ExampleSummary] {
        &self.failed
    }
}
