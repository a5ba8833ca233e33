//! Correlation of inbound responses with the commands that caused them

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{DimseError, Result};
use crate::response::Response;

/// Response queue of one outstanding command
struct Waiter {
    tx: mpsc::UnboundedSender<Response>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<Response>>,
    /// Cancelled when the ID is retired or the router closes
    done: CancellationToken,
}

/// Routes responses to the callers waiting on their message ID
///
/// Each registered message ID owns an unbounded FIFO queue guarded by its own
/// lock, so callers waiting on different IDs never contend. The map lock is
/// only held for lookups.
pub struct ResponseRouter {
    waiters: Mutex<HashMap<u16, Arc<Waiter>>>,
    closed: CancellationToken,
}

impl ResponseRouter {
    pub fn new() -> Self {
        Self::with_token(CancellationToken::new())
    }

    /// Create a router that closes when `closed` is cancelled
    pub fn with_token(closed: CancellationToken) -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
            closed,
        }
    }

    fn waiters(&self) -> std::sync::MutexGuard<'_, HashMap<u16, Arc<Waiter>>> {
        self.waiters.lock().expect("response router lock poisoned")
    }

    /// Start accepting responses for `message_id`
    pub fn register_waiter(&self, message_id: u16) -> Result<()> {
        if self.is_closed() {
            return Err(DimseError::AssociationClosed);
        }
        let mut waiters = self.waiters();
        if waiters.contains_key(&message_id) {
            return Err(DimseError::invalid_command(format!(
                "message ID {} is already outstanding",
                message_id
            )));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        waiters.insert(
            message_id,
            Arc::new(Waiter {
                tx,
                rx: AsyncMutex::new(rx),
                done: self.closed.child_token(),
            }),
        );
        trace!(message_id, outstanding = waiters.len(), "registered response waiter");
        Ok(())
    }

    /// Queue a response for the caller waiting on its message ID
    ///
    /// Fails with `UnknownCommand` when no command with that ID is outstanding.
    pub fn deliver(&self, response: Response) -> Result<()> {
        if self.is_closed() {
            return Err(DimseError::AssociationClosed);
        }
        let message_id = response.message_id();
        let Some(waiter) = self.lookup(message_id) else {
            warn!(message_id, kind = %response.kind(), "response for unknown message ID");
            return Err(DimseError::UnknownCommand(message_id));
        };
        trace!(message_id, status = response.status_code(), "delivering response");
        waiter
            .tx
            .send(response)
            .map_err(|_| DimseError::UnknownCommand(message_id))
    }

    /// Wait for the next response to `message_id`
    pub async fn await_next(&self, message_id: u16) -> Result<Response> {
        if self.is_closed() {
            return Err(DimseError::AssociationClosed);
        }
        let waiter = self
            .lookup(message_id)
            .ok_or(DimseError::UnknownCommand(message_id))?;

        let mut rx = tokio::select! {
            _ = waiter.done.cancelled() => return Err(self.ended(message_id)),
            rx = waiter.rx.lock() => rx,
        };

        tokio::select! {
            biased;
            _ = waiter.done.cancelled() => Err(self.ended(message_id)),
            response = rx.recv() => response.ok_or_else(|| self.ended(message_id)),
        }
    }

    /// Error for a waiter whose queue ended
    fn ended(&self, message_id: u16) -> DimseError {
        if self.is_closed() {
            DimseError::AssociationClosed
        } else {
            DimseError::UnknownCommand(message_id)
        }
    }

    /// Stop accepting responses for `message_id`
    ///
    /// Callers still waiting on the ID fail with `UnknownCommand`. Returns
    /// whether the ID was registered.
    pub fn retire(&self, message_id: u16) -> bool {
        let removed = self.waiters().remove(&message_id);
        match removed {
            Some(waiter) => {
                waiter.done.cancel();
                debug!(message_id, "retired message ID");
                true
            }
            None => false,
        }
    }

    /// Fail every current and future wait with `AssociationClosed`
    pub fn close(&self) {
        self.closed.cancel();
        let drained = {
            let mut waiters = self.waiters();
            let count = waiters.len();
            waiters.clear();
            count
        };
        debug!(outstanding = drained, "response router closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn is_registered(&self, message_id: u16) -> bool {
        self.waiters().contains_key(&message_id)
    }

    /// Message IDs currently awaiting responses, sorted
    pub fn outstanding(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.waiters().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn lookup(&self, message_id: u16) -> Option<Arc<Waiter>> {
        self.waiters().get(&message_id).cloned()
    }
}

impl Default for ResponseRouter {
    fn default() -> Self {
        Self::new()
    }
}
