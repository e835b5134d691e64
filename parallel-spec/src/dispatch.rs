// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::Result,
    output::{OutputContext, OutputOpts, clap_styles},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, ValueEnum};
use parallel_spec_metadata::ParallelSpecExitCode;
use parallel_spec_runner::{
    config::{MaxFail, ParallelSpecConfig, WorkerCount},
    partition::RuntimePartitioner,
    reporter::ProgressReporter,
    runner::{RunFinished, RunOutcome, TestRunnerBuilder},
    signal::SignalHandlerKind,
    test_list::TestList,
};
use tracing::{debug, warn};

/// Runs a spec suite across parallel worker processes.
///
/// Test files are split into groups balanced by their recorded runtimes, and each group is run by
/// its own worker process. Results from all workers are merged into a single progress report.
#[derive(Debug, Parser)]
#[command(version, styles = clap_styles::style())]
pub struct ParallelSpecApp {
    /// Test files or directories to run [default: spec]
    #[arg(value_name = "PATHS")]
    paths: Vec<Utf8PathBuf>,

    #[command(flatten)]
    runner_opts: RunnerOpts,

    #[command(flatten)]
    config_opts: ConfigOpts,

    #[command(flatten)]
    output: OutputOpts,
}

impl ParallelSpecApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the exit code on success.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        let workspace_root = current_dir()?;
        let config = self.config_opts.make_config(&workspace_root)?;

        let test_list = TestList::from_paths(
            &workspace_root,
            &self.paths,
            config.runner().test_suffix(),
        )?;
        if test_list.is_empty() {
            match self.runner_opts.no_tests {
                NoTestsBehavior::Pass => {}
                NoTestsBehavior::Warn => warn!("no test files to run"),
                NoTestsBehavior::Fail => return Err(ExpectedError::NoTestsRun),
            }
        }

        let mut builder = self.runner_opts.to_builder();
        builder.set_verbose(output.verbose);
        let runner = builder.build(
            &test_list,
            &config,
            &RuntimePartitioner,
            SignalHandlerKind::Standard,
        )?;

        let mut reporter = ProgressReporter::new(std::io::stdout());
        if output.color.should_colorize(supports_color::Stream::Stdout) {
            reporter.colorize();
        }

        let finished = runner.execute(&mut reporter)?;
        final_result(&finished)
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirFailed { err })?;
    Utf8PathBuf::try_from(dir).map_err(|err| ExpectedError::CurrentDirInvalidUtf8 { err })
}

/// Maps the end of a run to an exit code or an error to display.
fn final_result(finished: &RunFinished) -> Result<i32> {
    debug!(?finished, "mapping run result to exit code");
    if let RunOutcome::Interrupted(event) = finished.outcome {
        return Err(ExpectedError::TestRunInterrupted { event });
    }

    if finished.is_success() {
        Ok(ParallelSpecExitCode::OK)
    } else {
        Err(ExpectedError::TestRunFailed)
    }
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: .config/parallel-spec.toml]
    #[arg(long, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,
}

impl ConfigOpts {
    fn make_config(&self, workspace_root: &Utf8Path) -> Result<ParallelSpecConfig> {
        ParallelSpecConfig::from_sources(workspace_root, self.config_file.as_deref())
            .map_err(ExpectedError::from)
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Runner options")]
struct RunnerOpts {
    /// Number of worker processes to start [default: from config]
    ///
    /// Never more workers than test files are started.
    #[arg(
        long,
        short = 'n',
        value_name = "N",
        env = "PARALLEL_SPEC_WORKERS"
    )]
    workers: Option<WorkerCount>,

    /// Cancel the run on the first failure
    #[arg(long, visible_alias = "ff")]
    fail_fast: bool,

    /// Run all tests regardless of failure
    #[arg(long, visible_alias = "nff", overrides_with = "fail_fast")]
    no_fail_fast: bool,

    /// Number of failed examples after which the run is cancelled [possible values: integer or
    /// "all"]
    #[arg(
        long,
        value_name = "N",
        conflicts_with_all = ["fail_fast", "no_fail_fast"]
    )]
    max_fail: Option<MaxFail>,

    /// Filter examples by tag, passed to every worker (may be specified multiple times)
    #[arg(long = "tag", short = 't', value_name = "TAG")]
    tags: Vec<String>,

    /// Seed passed to every worker [default: random]
    #[arg(long, value_name = "SEED")]
    seed: Option<u64>,

    /// Behavior if there are no test files to run
    #[arg(
        long,
        value_enum,
        default_value_t,
        value_name = "ACTION",
        env = "PARALLEL_SPEC_NO_TESTS"
    )]
    no_tests: NoTestsBehavior,
}

impl RunnerOpts {
    fn to_builder(&self) -> TestRunnerBuilder {
        let mut builder = TestRunnerBuilder::default();

        if let Some(workers) = self.workers {
            builder.set_workers(workers);
        }

        if let Some(max_fail) = self.max_fail {
            builder.set_max_fail(max_fail);
            debug!(max_fail = ?max_fail, "set max fail");
        } else if self.no_fail_fast {
            builder.set_max_fail(MaxFail::from_fail_fast(false));
            debug!("set max fail via from_fail_fast(false)");
        } else if self.fail_fast {
            builder.set_max_fail(MaxFail::from_fail_fast(true));
            debug!("set max fail via from_fail_fast(true)");
        }

        for tag in &self.tags {
            builder.add_tag(tag.clone());
        }

        if let Some(seed) = self.seed {
            builder.set_seed(seed);
        }

        builder
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
enum NoTestsBehavior {
    /// Silently run nothing and exit with code 0.
    Pass,

    /// Produce a warning and exit with code 0.
    #[default]
    Warn,

    /// Produce an error message and exit with code 4.
    #[value(alias = "error")]
    Fail,
}
