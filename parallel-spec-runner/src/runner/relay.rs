// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Relays that copy a worker's output streams to our own.
//!
//! A worker interleaves free-form text and structured events on its standard output. Each event
//! is written on the same line as the worker's [`CorrelationToken`], directly after it. Everything
//! before the token is text and is forwarded as-is. Everything after it is a JSON event.

use super::{CorrelationToken, WorkerId, internal_events::RunnerEvent};
use bstr::ByteSlice;
use parallel_spec_metadata::WireEvent;
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc::UnboundedSender,
};
use tracing::{debug, warn};

/// Splits a line into the text before the token and, if the token is present, the bytes after it.
fn split_line<'a>(line: &'a [u8], token: &CorrelationToken) -> (&'a [u8], Option<&'a [u8]>) {
    let token = token.as_str().as_bytes();
    match line.find(token) {
        Some(pos) => (&line[..pos], Some(&line[pos + token.len()..])),
        None => (line, None),
    }
}

/// Reads `reader` line by line until it ends, forwarding text to `out` and events to `sender`.
///
/// An [`RunnerEvent::Exit`] for `worker_id` is always sent last, exactly once.
pub(super) async fn relay_stdout<R, W>(
    worker_id: WorkerId,
    token: CorrelationToken,
    reader: R,
    mut out: W,
    sender: UnboundedSender<RunnerEvent>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    let mut out_failed = false;

    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                warn!(%worker_id, "error reading worker output: {err}");
                break;
            }
        }

        let (text, fragment) = split_line(&line, &token);
        if !text.is_empty() && !out_failed {
            let res = match out.write_all(text).await {
                Ok(()) => out.flush().await,
                Err(err) => Err(err),
            };
            if let Err(err) = res {
                // Keep reading so that events still reach the dispatcher.
                debug!(%worker_id, "error forwarding worker output: {err}");
                out_failed = true;
            }
        }

        if let Some(fragment) = fragment {
            if let Some(event) = parse_fragment(worker_id, fragment) {
                // The receiver is only dropped once the dispatcher is done with events.
                _ = sender.send(event);
            }
        }
    }

    _ = sender.send(RunnerEvent::Exit { worker_id });
}

/// Parses an event fragment. Malformed fragments are logged and dropped.
fn parse_fragment(worker_id: WorkerId, fragment: &[u8]) -> Option<RunnerEvent> {
    let fragment = match fragment.to_str() {
        Ok(fragment) => fragment,
        Err(err) => {
            warn!(%worker_id, "dropping malformed event (not valid UTF-8): {err}");
            return None;
        }
    };

    match WireEvent::parse(fragment) {
        Ok(event) => Some(RunnerEvent::Wire { worker_id, event }),
        Err(err) => match err.unknown_kind() {
            Some(kind) => Some(RunnerEvent::UnknownKind {
                worker_id,
                kind: kind.to_owned(),
            }),
            None => {
                warn!(
                    %worker_id,
                    "dropping malformed event: {err}\n(fragment: {})",
                    fragment.trim_end()
                );
                None
            }
        },
    }
}

/// Copies `reader` to `out` in whatever chunks the reads produce, until `reader` ends.
pub(super) async fn relay_stderr<R, W>(worker_id: WorkerId, mut reader: R, mut out: W)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    if let Err(err) = tokio::io::copy(&mut reader, &mut out).await {
        debug!(%worker_id, "error relaying worker stderr: {err}");
    }
}
