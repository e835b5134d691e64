// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::Reporter;
use owo_colors::{OwoColorize, Style};
use parallel_spec_metadata::{ExampleSummary, GroupMetadata};
use std::{
    io::{self, Write},
    time::{Duration, Instant},
};
use swrite::{SWrite, swrite};
use tracing::warn;

/// The default reporter: one character per example as results come in, then a summary.
///
/// Progress characters are `.` for a pass, `*` for a pending example and `F` for a failure.
#[derive(Debug)]
pub struct ProgressReporter<W> {
    writer: W,
    styles: Styles,
    start_time: Instant,
    load_time: Duration,
    example_count: usize,
    pending: Vec<ExampleSummary>,
    failed: Vec<ExampleSummary>,
    write_failed: bool,
}

impl<W: Write> ProgressReporter<W> {
    /// Creates a new reporter that writes to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            styles: Styles::default(),
            start_time: Instant::now(),
            load_time: Duration::ZERO,
            example_count: 0,
            pending: Vec::new(),
            failed: Vec::new(),
            write_failed: false,
        }
    }

    /// Enables ANSI colors in the output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Returns the examples that were pending.
    pub fn pending_examples(&self) -> &[ExampleSummary] {
        &self.pending
    }

    /// Consumes the reporter, returning the writer.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn write_progress(&mut self, ch: char, style: Style) {
        let res = write!(self.writer, "{}", ch.style(style)).and_then(|()| self.writer.flush());
        self.handle_write(res);
    }

    fn handle_write(&mut self, res: io::Result<()>) {
        // Only warn once, since a closed pipe fails every subsequent write too.
        if let Err(err) = res {
            if !self.write_failed {
                self.write_failed = true;
                warn!("failed to write progress output: {err}");
            }
        }
    }

    fn write_summary(&mut self, elapsed: Duration) -> io::Result<()> {
        let styles = self.styles;
        let w = &mut self.writer;
        writeln!(w)?;

        if !self.pending.is_empty() {
            writeln!(
                w,
                "\nPending: (Failures listed here are expected and do not affect your suite's status)"
            )?;
            for (index, example) in self.pending.iter().enumerate() {
                writeln!(
                    w,
                    "\n  {}) {}",
                    index + 1,
                    example.display_description().style(styles.pending)
                )?;
                let message = example
                    .pending_message
                    .as_deref()
                    .unwrap_or("No reason given");
                writeln!(w, "     {}", format!("# {message}").style(styles.comment))?;
                writeln!(
                    w,
                    "     {}",
                    format!("# {}", example.location()).style(styles.comment)
                )?;
            }
        }

        if !self.failed.is_empty() {
            writeln!(w, "\nFailures:")?;
            for (index, example) in self.failed.iter().enumerate() {
                writeln!(w, "\n  {}) {}", index + 1, example.display_description())?;
                match &example.exception {
                    Some(exception) => {
                        if !exception.class.is_empty() {
                            writeln!(w, "     {}", exception.class.style(styles.failed))?;
                        }
                        for line in exception.message.lines() {
                            writeln!(w, "       {}", line.style(styles.failed))?;
                        }
                        for line in &exception.backtrace {
                            writeln!(w, "     {}", format!("# {line}").style(styles.comment))?;
                        }
                    }
                    None => {
                        writeln!(w, "     {}", "(no failure details)".style(styles.failed))?;
                    }
                }
            }
        }

        writeln!(
            w,
            "\nFinished in {} (files took {} to load)",
            format_seconds(elapsed),
            format_seconds(self.load_time),
        )?;

        let mut totals = format!(
            "{}, {}",
            pluralize(self.example_count, "example"),
            pluralize(self.failed.len(), "failure"),
        );
        if !self.pending.is_empty() {
            swrite!(totals, ", {} pending", self.pending.len());
        }
        let totals_style = if !self.failed.is_empty() {
            styles.failed
        } else if !self.pending.is_empty() {
            styles.pending
        } else {
            styles.passed
        };
        writeln!(w, "{}", totals.style(totals_style))?;

        if !self.failed.is_empty() {
            writeln!(w, "\nFailed examples:\n")?;
            for example in &self.failed {
                writeln!(
                    w,
                    "{} {}",
                    format!("rspec {}", example.location()).style(styles.failed),
                    format!("# {}", example.display_description()).style(styles.comment),
                )?;
            }
        }

        w.flush()
    }
}

impl<W: Write> Reporter for ProgressReporter<W> {
    fn example_passed(&mut self, _example: &ExampleSummary) {
        self.example_count += 1;
        self.write_progress('.', self.styles.passed);
    }

    fn example_pending(&mut self, example: &ExampleSummary) {
        self.example_count += 1;
        self.pending.push(example.clone());
        self.write_progress('*', self.styles.pending);
    }

    fn example_failed(&mut self, example: &ExampleSummary) {
        self.example_count += 1;
        self.failed.push(example.clone());
        self.write_progress('F', self.styles.failed);
    }

    fn group_started(&mut self, _group: &GroupMetadata) {}

    fn group_finished(&mut self) {}

    fn set_load_time(&mut self, load_time: Duration) {
        self.load_time = load_time;
    }

    fn finish(&mut self) {
        let elapsed = self.start_time.elapsed();
        let res = self.write_summary(elapsed);
        self.handle_write(res);
    }

    fn failed_examples(&self) -> &[ExampleSummary] {
        &self.failed
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Styles {
    passed: Style,
    pending: Style,
    failed: Style,
    comment: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.passed = Style::new().green();
        self.pending = Style::new().yellow();
        self.failed = Style::new().red();
        self.comment = Style::new().cyan();
    }
}

/// Formats a duration the way test frameworks usually print it: up to five decimal places below
/// one second, two above, with trailing zeros removed.
fn format_seconds(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    let formatted = if secs < 1.0 {
        format!("{secs:.5}")
    } else {
        format!("{secs:.2}")
    };
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    let trimmed = if trimmed.is_empty() { "0" } else { trimmed };
    let unit = if trimmed == "1" { "second" } else { "seconds" };
    format!("{trimmed} {unit}")
}

fn pluralize(count: usize, word: &str) -> String {
    if count == 1 {
        format!("{count} {word}")
    } else {
        format!("{count} {word}s")
    }
}
