// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::WireEventParseError;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// A structured event emitted by a worker process.
///
/// On the wire, each event is a JSON object with a `type` field naming the event kind, plus
/// kind-specific payload fields. The correlation token that precedes the object on its line is
/// never part of the payload.
///
/// There is intentionally no `exit` kind here: worker exits are observed by the runner when a
/// worker's output stream ends, and never reported by the worker itself.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireEvent {
    /// An example passed.
    ExamplePassed {
        /// The example that passed.
        example: ExampleSummary,
    },

    /// An example was skipped or marked pending.
    ExamplePending {
        /// The example that is pending.
        example: ExampleSummary,
    },

    /// An example failed.
    ExampleFailed {
        /// The example that failed.
        example: ExampleSummary,
    },

    /// An example group started.
    GroupStarted {
        /// Metadata for the group.
        group: GroupMetadata,
    },

    /// The most recently started example group finished.
    GroupFinished {},

    /// A (possibly partial) load summary.
    LoadSummary {
        /// The summary.
        summary: LoadSummary,
    },

    /// The seed used by the worker. Informational only.
    Seed {
        /// The seed, if the worker chose to report it.
        #[serde(default)]
        seed: Option<u64>,
    },

    /// The worker's formatter closed. Informational only.
    Close {},
}

impl WireEvent {
    /// All event kinds known to this version, as they appear in the `type` field.
    pub const KINDS: &'static [&'static str] = &[
        "example_passed",
        "example_pending",
        "example_failed",
        "group_started",
        "group_finished",
        "load_summary",
        "seed",
        "close",
    ];

    /// Parses a single event fragment.
    ///
    /// Leading and trailing whitespace (including the line terminator) is ignored. Parsing is
    /// strict: a fragment that names an unknown kind, or whose payload doesn't match the schema
    /// for its kind, is an error.
    pub fn parse(input: &str) -> Result<Self, WireEventParseError> {
        let value: serde_json::Value =
            serde_json::from_str(input.trim()).map_err(WireEventParseError::InvalidJson)?;
        let kind = match value.get("type") {
            Some(serde_json::Value::String(kind)) => kind.clone(),
            _ => return Err(WireEventParseError::MissingType),
        };
        if !Self::KINDS.contains(&kind.as_str()) {
            return Err(WireEventParseError::UnknownKind { kind });
        }

        serde_json::from_value(value).map_err(|err| WireEventParseError::InvalidPayload { kind, err })
    }

    /// Returns the kind of this event, as it appears in the `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ExamplePassed { .. } => "example_passed",
            Self::ExamplePending { .. } => "example_pending",
            Self::ExampleFailed { .. } => "example_failed",
            Self::GroupStarted { .. } => "group_started",
            Self::GroupFinished {} => "group_finished",
            Self::LoadSummary { .. } => "load_summary",
            Self::Seed { .. } => "seed",
            Self::Close {} => "close",
        }
    }
}

/// Status of an individual example.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExampleStatus {
    /// The example passed.
    Passed,

    /// The example is pending or skipped.
    Pending,

    /// The example failed.
    Failed,
}

impl fmt::Display for ExampleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => write!(f, "passed"),
            Self::Pending => write!(f, "pending"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A summary of a single example, as reported by a worker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExampleSummary {
    /// A unique identifier for the example, e.g. `./spec/models/user_spec.rb[1:2:1]`.
    pub id: String,

    /// The example's own description.
    pub description: String,

    /// The description including all enclosing groups.
    #[serde(default)]
    pub full_description: String,

    /// The status of the example.
    pub status: ExampleStatus,

    /// How long the example took to run, in seconds.
    #[serde(default)]
    pub run_time: f64,

    /// The file the example is defined in.
    #[serde(default)]
    pub file_path: String,

    /// The line the example is defined on.
    #[serde(default)]
    pub line_number: Option<u32>,

    /// For pending examples, the reason they are pending.
    #[serde(default)]
    pub pending_message: Option<String>,

    /// For failed examples, details about the failure.
    #[serde(default)]
    pub exception: Option<ExampleException>,
}

impl ExampleSummary {
    /// Returns the run time as a [`Duration`].
    ///
    /// Negative or non-finite run times are treated as zero.
    pub fn run_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.run_time).unwrap_or_default()
    }

    /// Returns `file:line` if the line number is known, otherwise the file path.
    pub fn location(&self) -> String {
        match self.line_number {
            Some(line) => format!("{}:{line}", self.file_path),
            None => self.file_path.clone(),
        }
    }

    /// Returns the full description if set, otherwise the example's own description.
    pub fn display_description(&self) -> &str {
        if self.full_description.is_empty() {
            &self.description
        } else {
            &self.full_description
        }
    }
}

/// Structured failure details for a failed example.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExampleException {
    /// The class or kind of the failure.
    #[serde(default)]
    pub class: String,

    /// The failure message.
    pub message: String,

    /// Location information, innermost first.
    #[serde(default)]
    pub backtrace: Vec<String>,
}

/// Metadata about an example group.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct GroupMetadata {
    /// The group's description.
    pub description: String,

    /// The file the group is defined in.
    #[serde(default)]
    pub file_path: Option<String>,

    /// The line the group is defined on.
    #[serde(default)]
    pub line_number: Option<u32>,
}

/// A load summary reported by a worker.
///
/// Workers report partial load summaries as they load test files. `count` increases
/// monotonically across a run, and the summary with the highest count is the most complete.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    /// Time spent loading test files, in seconds.
    pub load_time: f64,

    /// A monotonic counter.
    pub count: u64,
}

impl LoadSummary {
    /// Returns the load time as a [`Duration`].
    pub fn load_time(&self) -> Duration {
        Duration::try_from_secs_f64(self.load_time).unwrap_or_default()
    }
}
