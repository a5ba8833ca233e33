//! DIMSE service facade
//!
//! [`DimseService`] is the entry point used by applications: it sends
//! commands and responses, hands out message IDs, returns inbound commands
//! and waits for the responses to commands it sent. It is cheap to clone and
//! every clone talks to the same association.

use std::sync::{Arc, Mutex};

use futures::stream::Stream;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::allocator::MessageIdAllocator;
use crate::channel::{EnvelopeReader, EnvelopeWriter};
use crate::command::{
    CEchoCommand, CFindCommand, CGetCommand, CMoveCommand, CStoreCommand, Command, NActionCommand,
    NCreateCommand, NDeleteCommand, NEventReportCommand, NGetCommand, NSetCommand,
};
use crate::config::DimseConfig;
use crate::dispatch::{CommandItem, DispatchLoop, LoopExit};
use crate::envelope::Envelope;
use crate::error::{DimseError, Result};
use crate::response::{
    CEchoResponse, CFindResponse, CGetResponse, CMoveResponse, CStoreResponse, NActionResponse,
    NCreateResponse, NDeleteResponse, NEventReportResponse, NGetResponse, NSetResponse, Response,
};
use crate::router::ResponseRouter;

struct Inner {
    config: DimseConfig,
    association: Uuid,
    allocator: MessageIdAllocator,
    router: Arc<ResponseRouter>,
    commands: AsyncMutex<mpsc::UnboundedReceiver<CommandItem>>,
    writer: AsyncMutex<Box<dyn EnvelopeWriter>>,
    closed: CancellationToken,
    dispatch: Mutex<Option<JoinHandle<LoopExit>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // stops the dispatch loop once the last handle is gone
        self.closed.cancel();
    }
}

/// Waiter registered by `send`, retired unless the write completes
///
/// Covers both a failed write and a `send` future dropped mid-write.
struct Registration<'a> {
    router: &'a ResponseRouter,
    message_id: u16,
    armed: bool,
}

impl<'a> Registration<'a> {
    fn new(router: &'a ResponseRouter, message_id: u16) -> Result<Self> {
        router.register_waiter(message_id)?;
        Ok(Self {
            router,
            message_id,
            armed: true,
        })
    }

    fn keep(mut self) {
        self.armed = false;
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.router.retire(self.message_id);
        }
    }
}

/// Generates the typed response getters
macro_rules! response_getters {
    ($($(#[$doc:meta])* $fn_name:ident($command:ty) -> $response:ty => $narrow:path;)*) => {
        $(
            $(#[$doc])*
            pub async fn $fn_name(&self, command: &$command) -> Result<$response> {
                self.typed_response(command.message_id(), $narrow).await
            }
        )*
    };
}

/// DIMSE service bound to one association
#[derive(Clone)]
pub struct DimseService {
    inner: Arc<Inner>,
}

impl DimseService {
    /// Start a service over an established association
    ///
    /// Spawns the dispatch loop, so this must be called from within a tokio runtime.
    pub fn new<R, W>(config: DimseConfig, reader: R, writer: W) -> Result<Self>
    where
        R: EnvelopeReader,
        W: EnvelopeWriter,
    {
        config.validate()?;

        let association = Uuid::new_v4();
        let closed = CancellationToken::new();
        let router = Arc::new(ResponseRouter::with_token(closed.clone()));
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let dispatch =
            DispatchLoop::new(reader, router.clone(), commands_tx, closed.clone()).spawn(association);

        info!(
            association = %association,
            local_aet = %config.local_aet,
            peer_aet = %config.peer_aet,
            "DIMSE service started"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                allocator: MessageIdAllocator::new(config.first_message_id),
                config,
                association,
                router,
                commands: AsyncMutex::new(commands_rx),
                writer: AsyncMutex::new(Box::new(writer)),
                closed,
                dispatch: Mutex::new(Some(dispatch)),
            }),
        })
    }

    /// Identifier of the association, as recorded in log spans
    pub fn association_id(&self) -> Uuid {
        self.inner.association
    }

    pub fn config(&self) -> &DimseConfig {
        &self.inner.config
    }

    /// Get a message ID for a new command
    ///
    /// IDs of commands still waiting for responses are skipped.
    pub fn next_command_id(&self) -> u16 {
        let router = &self.inner.router;
        let mut id = self.inner.allocator.next_id();
        for _ in 0..u16::MAX {
            if !router.is_registered(id) {
                break;
            }
            id = self.inner.allocator.next_id();
        }
        id
    }

    /// Transfer syntax negotiated for `abstract_syntax`
    pub fn transfer_syntax(&self, abstract_syntax: &str) -> Result<String> {
        self.inner
            .config
            .transfer_syntax(abstract_syntax)
            .map(str::to_string)
            .ok_or_else(|| DimseError::AbstractSyntaxNotNegotiated(abstract_syntax.to_string()))
    }

    fn check_abstract_syntax(&self, abstract_syntax: &str) -> Result<()> {
        if self.inner.config.presentation_contexts.is_empty() {
            return Ok(());
        }
        self.transfer_syntax(abstract_syntax).map(|_| ())
    }

    /// Send a command or a response to the peer
    ///
    /// Commands that expect an answer are registered with the router before
    /// they are written, so a fast response cannot be missed.
    pub async fn send(&self, envelope: impl Into<Envelope>) -> Result<()> {
        let envelope = envelope.into();
        if self.is_closed() {
            return Err(DimseError::AssociationClosed);
        }
        self.check_abstract_syntax(envelope.abstract_syntax())?;

        let message_id = envelope.message_id();
        let registration = if envelope.expects_response() {
            Some(Registration::new(&self.inner.router, message_id)?)
        } else {
            None
        };

        let written = tokio::select! {
            _ = self.inner.closed.cancelled() => Err(DimseError::AssociationClosed),
            written = async {
                let mut writer = self.inner.writer.lock().await;
                writer.send(&envelope).await
            } => written,
        };

        match written {
            Ok(()) => {
                if let Some(registration) = registration {
                    registration.keep();
                }
                debug!(
                    association = %self.inner.association,
                    message_id,
                    kind = %envelope.kind(),
                    response = envelope.is_response(),
                    "sent DIMSE message"
                );
                Ok(())
            }
            Err(e) => {
                drop(registration);
                warn!("Failed to send {} {}: {}", envelope.kind(), message_id, e);
                Err(e)
            }
        }
    }

    /// Wait for the next command sent by the peer
    ///
    /// Several tasks may wait at once; each command is returned to exactly
    /// one of them. Responses that match no outstanding command are
    /// reported here as `UnknownCommand`.
    pub async fn get_command(&self) -> Result<Command> {
        if self.is_closed() {
            return Err(DimseError::AssociationClosed);
        }
        let closed = &self.inner.closed;

        let mut commands = tokio::select! {
            _ = closed.cancelled() => return Err(DimseError::AssociationClosed),
            commands = self.inner.commands.lock() => commands,
        };

        tokio::select! {
            biased;
            _ = closed.cancelled() => Err(DimseError::AssociationClosed),
            item = commands.recv() => item.unwrap_or(Err(DimseError::AssociationClosed)),
        }
    }

    /// Wait for the next response to `message_id`, retiring the ID once terminal
    async fn next_response(&self, message_id: u16) -> Result<Response> {
        let response = self.inner.router.await_next(message_id).await?;
        if response.is_terminal() {
            self.inner.router.retire(message_id);
        }
        Ok(response)
    }

    async fn typed_response<T>(
        &self,
        message_id: u16,
        narrow: fn(Response) -> Result<T>,
    ) -> Result<T> {
        let response = self.next_response(message_id).await?;
        narrow(response).map_err(|e| {
            warn!(message_id, "Response does not match its command: {}", e);
            self.inner.router.retire(message_id);
            e
        })
    }

    response_getters! {
        get_c_store_response(CStoreCommand) -> CStoreResponse => Response::into_c_store;
        /// Returns pending responses until the terminal one
        get_c_get_response(CGetCommand) -> CGetResponse => Response::into_c_get;
        /// Returns pending responses until the terminal one
        get_c_find_response(CFindCommand) -> CFindResponse => Response::into_c_find;
        /// Returns pending responses until the terminal one
        get_c_move_response(CMoveCommand) -> CMoveResponse => Response::into_c_move;
        get_c_echo_response(CEchoCommand) -> CEchoResponse => Response::into_c_echo;
        get_n_event_report_response(NEventReportCommand) -> NEventReportResponse => Response::into_n_event_report;
        get_n_get_response(NGetCommand) -> NGetResponse => Response::into_n_get;
        get_n_set_response(NSetCommand) -> NSetResponse => Response::into_n_set;
        get_n_action_response(NActionCommand) -> NActionResponse => Response::into_n_action;
        get_n_delete_response(NDeleteCommand) -> NDeleteResponse => Response::into_n_delete;
    }

    /// A success without an instance UID takes the one named by `command`
    pub async fn get_n_create_response(&self, command: &NCreateCommand) -> Result<NCreateResponse> {
        let response = self
            .typed_response(command.message_id(), Response::into_n_create)
            .await?;
        response.inherit_instance_uid(command).map_err(|e| {
            warn!(message_id = command.message_id(), "Rejected N-CREATE response: {}", e);
            e
        })
    }

    /// Every response to `command`, ending after the terminal one or the first error
    pub fn responses(&self, command: &Command) -> impl Stream<Item = Result<Response>> + Send + 'static {
        let service = self.clone();
        let message_id = command.message_id();
        async_stream::stream! {
            loop {
                match service.next_response(message_id).await {
                    Ok(response) => {
                        let terminal = response.is_terminal();
                        yield Ok(response);
                        if terminal {
                            break;
                        }
                    }
                    Err(e) => {
                        yield Err(e);
                        break;
                    }
                }
            }
        }
    }

    /// Message IDs of commands still waiting for responses
    pub fn outstanding_commands(&self) -> Vec<u16> {
        self.inner.router.outstanding()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Close the association from this side
    ///
    /// Every blocked and future call fails with `AssociationClosed`.
    pub async fn close(&self) -> Result<()> {
        let first = !self.inner.closed.is_cancelled();
        self.inner.closed.cancel();
        self.inner.router.close();

        let handle = self
            .inner
            .dispatch
            .lock()
            .expect("dispatch handle lock poisoned")
            .take();
        if let Some(handle) = handle {
            match handle.await {
                Ok(exit) => debug!(?exit, "dispatch loop joined"),
                Err(e) => return Err(DimseError::internal(format!("dispatch task failed: {}", e))),
            }
        }

        let result = self.inner.writer.lock().await.close().await;
        if first {
            info!(association = %self.inner.association, "DIMSE service closed");
        }
        result
    }
}

impl std::fmt::Debug for DimseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DimseService")
            .field("association", &self.inner.association)
            .field("closed", &self.is_closed())
            .field("outstanding", &self.outstanding_commands())
            .finish()
    }
}
