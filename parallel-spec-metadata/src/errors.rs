// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::{error, fmt};

/// An error that occurs while parsing a structured event fragment from a worker.
#[derive(Debug)]
#[non_exhaustive]
pub enum WireEventParseError {
    /// The fragment is not valid JSON.
    InvalidJson(serde_json::Error),

    /// The fragment is valid JSON, but is not an object with a string `type` field.
    MissingType,

    /// The `type` field names an event kind this version does not know about.
    UnknownKind {
        /// The kind that was provided.
        kind: String,
    },

    /// The event kind is known, but its payload does not match the expected schema.
    InvalidPayload {
        /// The kind of event.
        kind: String,

        /// The underlying deserialization error.
        err: serde_json::Error,
    },
}

impl WireEventParseError {
    /// Returns the unknown kind, if this error is due to an unknown event kind.
    pub fn unknown_kind(&self) -> Option<&str> {
        match self {
            Self::UnknownKind { kind } => Some(kind),
            Self::InvalidJson(_) | Self::MissingType | Self::InvalidPayload { .. } => None,
        }
    }
}

impl fmt::Display for WireEventParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidJson(_) => write!(f, "event fragment is not valid JSON"),
            Self::MissingType => {
                write!(f, "event fragment is not an object with a string `type` field")
            }
            Self::UnknownKind { kind } => write!(f, "unknown event kind `{kind}`"),
            Self::InvalidPayload { kind, .. } => {
                write!(f, "invalid payload for `{kind}` event")
            }
        }
    }
}

impl error::Error for WireEventParseError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidJson(err) | Self::InvalidPayload { err, .. } => Some(err),
            Self::MissingType | Self::UnknownKind { .. } => None,
        }
    }
}
