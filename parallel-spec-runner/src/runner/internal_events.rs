// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events sent from relays to the dispatcher over the event bus.

use super::WorkerId;
use parallel_spec_metadata::WireEvent;

#[derive(Clone, Debug, PartialEq)]
pub(super) enum RunnerEvent {
    /// A structured event parsed from a worker's output.
    Wire {
        worker_id: WorkerId,
        event: WireEvent,
    },

    /// A well-formed event of a kind this version doesn't know about.
    UnknownKind { worker_id: WorkerId, kind: String },

    /// The worker's output stream ended. Always the last event for a worker.
    Exit { worker_id: WorkerId },
}

impl RunnerEvent {
    pub(super) fn worker_id(&self) -> WorkerId {
        match self {
            Self::Wire { worker_id, .. }
            | Self::UnknownKind { worker_id, .. }
            | Self::Exit { worker_id } => *worker_id,
        }
    }
}
