//! Inbound dispatch loop
//!
//! A single task owns the reading half of the association. Commands from the
//! peer are queued for `get_command` callers, responses are handed to the
//! response router. When the association ends the loop closes the router and
//! the command queue and exits; it is never restarted.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, span, warn, Instrument, Level};
use uuid::Uuid;

use crate::channel::EnvelopeReader;
use crate::command::Command;
use crate::envelope::Envelope;
use crate::error::{DimseError, Result};
use crate::router::ResponseRouter;

/// Items of the inbound command queue; stray responses arrive as errors
pub(crate) type CommandItem = Result<Command>;

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The peer ended the association
    EndOfStream,
    /// The association was closed locally
    Closed,
    /// A message could not be read or decoded
    ReadFailure,
}

pub(crate) struct DispatchLoop<R> {
    reader: R,
    router: Arc<ResponseRouter>,
    commands: mpsc::UnboundedSender<CommandItem>,
    closed: CancellationToken,
}

impl<R: EnvelopeReader> DispatchLoop<R> {
    pub(crate) fn new(
        reader: R,
        router: Arc<ResponseRouter>,
        commands: mpsc::UnboundedSender<CommandItem>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            reader,
            router,
            commands,
            closed,
        }
    }

    /// Run the loop on its own task inside an `association` span
    pub(crate) fn spawn(self, association: Uuid) -> JoinHandle<LoopExit> {
        let span = span!(Level::INFO, "association", id = %association);
        tokio::spawn(self.run().instrument(span))
    }

    pub(crate) async fn run(mut self) -> LoopExit {
        debug!("dispatch loop started");
        let exit = loop {
            let received = tokio::select! {
                _ = self.closed.cancelled() => break LoopExit::Closed,
                received = self.reader.receive() => received,
            };

            match received {
                Ok(Some(Envelope::Command(command))) => {
                    debug!(
                        message_id = command.message_id(),
                        kind = %command.kind(),
                        "queued inbound command"
                    );
                    // nobody left to read commands; keep routing responses
                    let _ = self.commands.send(Ok(command));
                }
                Ok(Some(Envelope::Response(response))) => {
                    match self.router.deliver(response) {
                        Ok(()) => {}
                        Err(DimseError::UnknownCommand(message_id)) => {
                            let _ = self.commands.send(Err(DimseError::UnknownCommand(message_id)));
                        }
                        Err(_) => break LoopExit::Closed,
                    }
                }
                Ok(None) => {
                    info!("peer ended the association");
                    break LoopExit::EndOfStream;
                }
                Err(e) => {
                    warn!("Closing association after read failure: {}", e);
                    break LoopExit::ReadFailure;
                }
            }
        };

        self.closed.cancel();
        self.router.close();
        debug!(?exit, "dispatch loop stopped");
        // dropping `self.commands` ends the command queue
        exit
    }
}
