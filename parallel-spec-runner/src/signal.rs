// Copyright (c) The parallel-spec Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Support for handling signals during a run.
//!
//! On Unix, SIGINT, SIGTERM and SIGHUP end the run. On Windows, Ctrl-C does.

use crate::errors::SignalHandlerSetupError;
use std::{fmt, task::Poll};

/// The kind of signal handling to set up for a run.
///
/// A `SignalHandlerKind` can be passed into
/// [`TestRunnerBuilder::build`](crate::runner::TestRunnerBuilder::build).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum SignalHandlerKind {
    /// Listen for the signals that end a run on this platform.
    #[default]
    Standard,

    /// Ignore signals. Useful for tests.
    Noop,
}

impl SignalHandlerKind {
    pub(crate) fn build(self) -> Result<SignalHandler, SignalHandlerSetupError> {
        match self {
            Self::Standard => Ok(SignalHandler {
                source: Source::Os(OsSignals::listen()?),
            }),
            Self::Noop => Ok(SignalHandler::noop()),
        }
    }
}

/// Where a run's shutdown events come from.
#[derive(Debug)]
pub(crate) struct SignalHandler {
    source: Source,
}

#[derive(Debug)]
enum Source {
    Os(OsSignals),
    Noop,
    #[cfg(test)]
    Channel(tokio::sync::mpsc::UnboundedReceiver<ShutdownEvent>),
}

impl SignalHandler {
    pub(crate) fn noop() -> Self {
        Self {
            source: Source::Noop,
        }
    }

    /// Creates a handler that yields whatever is sent on `events`.
    #[cfg(test)]
    pub(crate) fn from_events(
        events: tokio::sync::mpsc::UnboundedReceiver<ShutdownEvent>,
    ) -> Self {
        Self {
            source: Source::Channel(events),
        }
    }

    /// Waits for the next shutdown event.
    ///
    /// Returns `None` once no more events can arrive. For the no-op handler, that is immediately.
    pub(crate) async fn recv(&mut self) -> Option<ShutdownEvent> {
        match &mut self.source {
            Source::Os(signals) => signals.recv().await,
            Source::Noop => None,
            #[cfg(test)]
            Source::Channel(events) => events.recv().await,
        }
    }
}

/// OS signal streams, each paired with the event it stands for.
#[derive(Debug)]
struct OsSignals {
    listeners: Vec<(ShutdownEvent, os::Listener)>,
}

impl OsSignals {
    /// Must be called from within a Tokio runtime.
    fn listen() -> std::io::Result<Self> {
        Ok(Self {
            listeners: os::listeners()?,
        })
    }

    async fn recv(&mut self) -> Option<ShutdownEvent> {
        std::future::poll_fn(|cx| {
            let mut index = 0;
            while index < self.listeners.len() {
                let event = self.listeners[index].0;
                match self.listeners[index].1.poll_recv(cx) {
                    Poll::Ready(Some(())) => return Poll::Ready(Some(event)),
                    // The stream is closed and will never fire again.
                    Poll::Ready(None) => {
                        self.listeners.remove(index);
                    }
                    Poll::Pending => index += 1,
                }
            }

            if self.listeners.is_empty() {
                Poll::Ready(None)
            } else {
                Poll::Pending
            }
        })
        .await
    }
}

#[cfg(unix)]
mod os {
    use super::ShutdownEvent;
    use tokio::signal::unix::{SignalKind, signal};

    pub(super) type Listener = tokio::signal::unix::Signal;

    pub(super) fn listeners() -> std::io::Result<Vec<(ShutdownEvent, Listener)>> {
        [
            (ShutdownEvent::Interrupt, SignalKind::interrupt()),
            (ShutdownEvent::Term, SignalKind::terminate()),
            (ShutdownEvent::Hangup, SignalKind::hangup()),
        ]
        .into_iter()
        .map(|(event, kind)| Ok((event, signal(kind)?)))
        .collect()
    }
}

#[cfg(windows)]
mod os {
    use super::ShutdownEvent;

    pub(super) type Listener = tokio::signal::windows::CtrlC;

    pub(super) fn listeners() -> std::io::Result<Vec<(ShutdownEvent, Listener)>> {
        Ok(vec![(
            ShutdownEvent::Interrupt,
            tokio::signal::windows::ctrl_c()?,
        )])
    }
}

/// A signal event that causes the run to end early.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ShutdownEvent {
    /// SIGHUP.
    #[cfg(unix)]
    Hangup,

    /// SIGTERM.
    #[cfg(unix)]
    Term,

    /// SIGINT or Ctrl-C.
    Interrupt,
}

impl fmt::Display for ShutdownEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            #[cfg(unix)]
            Self::Hangup => "hangup",
            #[cfg(unix)]
            Self::Term => "termination",
            Self::Interrupt => "interrupt",
        };
        f.write_str(name)
    }
}
