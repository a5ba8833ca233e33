//! DIMSE (DICOM Message Service Element) service layer
//!
//! This crate carries DIMSE commands and responses over an association that
//! has already been negotiated. Many tasks may share one association: each
//! sends commands under its own message ID and waits for the responses to
//! them, while a single dispatch task reads everything the peer sends.
//!
//! # Features
//! - All composite (C-STORE, C-GET, C-FIND, C-MOVE, C-ECHO, C-CANCEL) and
//!   normalized (N-EVENT-REPORT, N-GET, N-SET, N-ACTION, N-CREATE, N-DELETE)
//!   operations, validated when constructed
//! - Pending response streams for C-GET, C-FIND and C-MOVE
//! - Closure by either side wakes every waiting task
//! - In-memory association for tests

pub mod allocator;
pub mod channel;
pub mod codec;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod response;
pub mod router;
pub mod service;
pub mod types;

// Re-export commonly used types
pub use allocator::MessageIdAllocator;
pub use channel::{memory_pair, EnvelopeReader, EnvelopeWriter, MemoryEndpoint};
pub use codec::DataSetMessage;
pub use command::{
    CCancelCommand, CEchoCommand, CFindCommand, CGetCommand, CMoveCommand, CStoreCommand, Command,
    CommandHeader, NActionCommand, NCreateCommand, NDeleteCommand, NEventReportCommand,
    NGetCommand, NSetCommand,
};
pub use config::{DimseConfig, PresentationContext};
pub use envelope::Envelope;
pub use error::{DimseError, Result};
pub use response::{
    CEchoResponse, CFindResponse, CGetResponse, CMoveResponse, CStoreResponse, NActionResponse,
    NCreateResponse, NDeleteResponse, NEventReportResponse, NGetResponse, NSetResponse, Response,
    ResponseHeader,
};
pub use router::ResponseRouter;
pub use service::DimseService;
pub use types::{status_codes, CommandKind, DataSet, DimseStatus, Priority, SubOperations};

/// DIMSE protocol version
pub const DIMSE_VERSION: &str = "0.1.0";
