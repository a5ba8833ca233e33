//! Boundary between the DIMSE service and the association carrying it
//!
//! The association layer implements [`EnvelopeReader`] and [`EnvelopeWriter`]
//! on top of its P-DATA framing. [`memory_pair`] provides an in-process
//! association for tests and for wiring two services together.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use crate::codec::{self, DataSetMessage};
use crate::envelope::Envelope;
use crate::error::{DimseError, Result};

/// Default number of messages buffered by an in-memory channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Receiving half of an association
#[async_trait]
pub trait EnvelopeReader: Send + 'static {
    /// Receive the next message; `Ok(None)` means the peer closed the association
    async fn receive(&mut self) -> Result<Option<Envelope>>;
}

/// Sending half of an association
#[async_trait]
pub trait EnvelopeWriter: Send + 'static {
    async fn send(&mut self, envelope: &Envelope) -> Result<()>;

    /// Release the association; the peer observes end of stream
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Reader of an in-memory association
pub struct MemoryReader {
    rx: mpsc::Receiver<DataSetMessage>,
}

#[async_trait]
impl EnvelopeReader for MemoryReader {
    async fn receive(&mut self) -> Result<Option<Envelope>> {
        match self.rx.recv().await {
            Some(message) => {
                trace!(abstract_syntax = %message.abstract_syntax, "received command set");
                codec::decode(message).map(Some)
            }
            None => Ok(None),
        }
    }
}

/// Writer of an in-memory association
pub struct MemoryWriter {
    tx: Option<mpsc::Sender<DataSetMessage>>,
}

impl MemoryWriter {
    /// Send a message to the peer without encoding it from an envelope
    pub async fn inject_raw(&self, message: DataSetMessage) -> Result<()> {
        let tx = self.tx.as_ref().ok_or_else(closed_pipe)?;
        tx.send(message).await.map_err(|_| closed_pipe())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

fn closed_pipe() -> DimseError {
    DimseError::Io(std::io::Error::new(
        std::io::ErrorKind::BrokenPipe,
        "in-memory association closed",
    ))
}

#[async_trait]
impl EnvelopeWriter for MemoryWriter {
    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        self.inject_raw(codec::encode(envelope)).await
    }

    async fn close(&mut self) -> Result<()> {
        self.tx.take();
        Ok(())
    }
}

/// One side of an in-memory association
pub struct MemoryEndpoint {
    pub reader: MemoryReader,
    pub writer: MemoryWriter,
}

impl MemoryEndpoint {
    pub fn into_split(self) -> (MemoryReader, MemoryWriter) {
        (self.reader, self.writer)
    }
}

/// Create two connected endpoints
pub fn memory_pair() -> (MemoryEndpoint, MemoryEndpoint) {
    memory_pair_with_capacity(DEFAULT_CHANNEL_CAPACITY)
}

/// Create two connected endpoints buffering up to `capacity` messages each way
pub fn memory_pair_with_capacity(capacity: usize) -> (MemoryEndpoint, MemoryEndpoint) {
    let (a_tx, b_rx) = mpsc::channel(capacity.max(1));
    let (b_tx, a_rx) = mpsc::channel(capacity.max(1));
    (
        MemoryEndpoint {
            reader: MemoryReader { rx: a_rx },
            writer: MemoryWriter { tx: Some(a_tx) },
        },
        MemoryEndpoint {
            reader: MemoryReader { rx: b_rx },
            writer: MemoryWriter { tx: Some(b_tx) },
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CEchoCommand;
    use crate::types::DataSet;

    const VERIFICATION: &str = "1.2.840.10008.1.1";

    #[tokio::test]
    async fn test_pair_carries_envelopes_both_ways() {
        let (mut a, mut b) = memory_pair();
        let echo = Envelope::from(CEchoCommand::new(VERIFICATION, 1, VERIFICATION).unwrap());

        a.writer.send(&echo).await.unwrap();
        assert_eq!(b.reader.receive().await.unwrap(), Some(echo.clone()));

        b.writer.send(&echo).await.unwrap();
        assert_eq!(a.reader.receive().await.unwrap(), Some(echo));
    }

    #[tokio::test]
    async fn test_close_is_end_of_stream() {
        let (mut a, mut b) = memory_pair();
        a.writer.close().await.unwrap();

        assert!(b.reader.receive().await.unwrap().is_none());
        let echo = Envelope::from(CEchoCommand::new(VERIFICATION, 1, VERIFICATION).unwrap());
        assert!(matches!(a.writer.send(&echo).await, Err(DimseError::Io(_))));
    }

    #[tokio::test]
    async fn test_malformed_message_surfaces_on_receive() {
        let (a, mut b) = memory_pair();
        a.writer
            .inject_raw(DataSetMessage {
                abstract_syntax: VERIFICATION.to_string(),
                command: DataSet::new_empty(),
                payload: None,
            })
            .await
            .unwrap();

        assert!(matches!(
            b.reader.receive().await,
            Err(DimseError::MalformedMessage(_))
        ));
    }
}
