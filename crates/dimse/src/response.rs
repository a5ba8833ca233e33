//! DIMSE response messages
//!
//! Responses built locally are always constructed from a reference to the
//! command they answer, so a C-GET command can only ever produce a
//! [`CGetResponse`]. Responses decoded from the wire are checked with the
//! same rules before they reach the router, except the ones that need the
//! request, which apply when the caller collects the response.

use dicom_core::Tag;

use crate::command::{
    require_uid, CEchoCommand, CFindCommand, CGetCommand, CMoveCommand, CStoreCommand,
    CommandHeader, NActionCommand, NCreateCommand, NDeleteCommand, NEventReportCommand,
    NGetCommand, NSetCommand,
};
use crate::error::{DimseError, Result};
use crate::types::{status_codes, CommandKind, DataSet, DimseStatus, SubOperations};

/// Fields shared by every response
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHeader {
    pub(crate) abstract_syntax: String,
    pub(crate) message_id_being_responded_to: u16,
    pub(crate) status_code: u16,
    pub(crate) affected_sop_class_uid: Option<String>,
    pub(crate) affected_sop_instance_uid: Option<String>,
    pub(crate) payload: Option<DataSet>,
}

impl ResponseHeader {
    fn answering(command: &CommandHeader, status_code: u16) -> Self {
        Self {
            abstract_syntax: command.abstract_syntax.clone(),
            message_id_being_responded_to: command.message_id,
            status_code,
            affected_sop_class_uid: command
                .affected_sop_class_uid
                .clone()
                .or_else(|| command.requested_sop_class_uid.clone()),
            affected_sop_instance_uid: command
                .affected_sop_instance_uid
                .clone()
                .or_else(|| command.requested_sop_instance_uid.clone()),
            payload: None,
        }
    }

    pub fn abstract_syntax(&self) -> &str {
        &self.abstract_syntax
    }

    pub fn message_id_being_responded_to(&self) -> u16 {
        self.message_id_being_responded_to
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn status(&self) -> DimseStatus {
        DimseStatus::from_code(self.status_code)
    }

    pub fn affected_sop_class_uid(&self) -> Option<&str> {
        self.affected_sop_class_uid.as_deref()
    }

    pub fn affected_sop_instance_uid(&self) -> Option<&str> {
        self.affected_sop_instance_uid.as_deref()
    }

    pub fn payload(&self) -> Option<&DataSet> {
        self.payload.as_ref()
    }
}

/// Reject pending statuses for operations that answer exactly once
fn terminal_status(kind: CommandKind, status_code: u16) -> Result<u16> {
    if DimseStatus::from_code(status_code).is_pending() && !kind.is_partial() {
        return Err(DimseError::invalid_command(format!(
            "{} responses cannot have pending status 0x{:04X}",
            kind, status_code
        )));
    }
    Ok(status_code)
}

macro_rules! response_accessors {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl $ty {
                pub fn header(&self) -> &ResponseHeader {
                    &self.header
                }

                pub fn message_id_being_responded_to(&self) -> u16 {
                    self.header.message_id_being_responded_to
                }

                pub fn status(&self) -> DimseStatus {
                    self.header.status()
                }

                pub fn status_code(&self) -> u16 {
                    self.header.status_code
                }
            }

            impl From<$ty> for Response {
                fn from(response: $ty) -> Self {
                    Response::$variant(response)
                }
            }
        )*
    };
}

/// C-STORE response
#[derive(Debug, Clone, PartialEq)]
pub struct CStoreResponse {
    pub(crate) header: ResponseHeader,
}

impl CStoreResponse {
    pub fn new(command: &CStoreCommand, status_code: u16) -> Result<Self> {
        let status_code = terminal_status(CommandKind::CStore, status_code)?;
        Ok(Self {
            header: ResponseHeader::answering(&command.header, status_code),
        })
    }
}

/// C-GET response, one of a stream of pending responses or the final one
#[derive(Debug, Clone, PartialEq)]
pub struct CGetResponse {
    pub(crate) header: ResponseHeader,
    pub(crate) sub_operations: SubOperations,
}

impl CGetResponse {
    /// `identifier` lists the failed SOP instance UIDs, when there are any
    pub fn new(
        command: &CGetCommand,
        status_code: u16,
        sub_operations: SubOperations,
        identifier: Option<DataSet>,
    ) -> Result<Self> {
        let mut header = ResponseHeader::answering(&command.header, status_code);
        header.payload = identifier;
        Ok(Self {
            header,
            sub_operations,
        })
    }

    pub fn sub_operations(&self) -> SubOperations {
        self.sub_operations
    }

    pub fn identifier(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// C-FIND response
#[derive(Debug, Clone, PartialEq)]
pub struct CFindResponse {
    pub(crate) header: ResponseHeader,
}

impl CFindResponse {
    /// Pending response carrying one match
    pub fn pending(command: &CFindCommand, identifier: DataSet) -> Result<Self> {
        let mut header = ResponseHeader::answering(&command.header, status_codes::PENDING);
        header.payload = Some(identifier);
        Ok(Self { header })
    }

    /// Final response, success or failure
    pub fn new(command: &CFindCommand, status_code: u16) -> Result<Self> {
        if DimseStatus::from_code(status_code).is_pending() {
            return Err(DimseError::invalid_command(
                "pending C-FIND responses must carry an identifier",
            ));
        }
        Ok(Self {
            header: ResponseHeader::answering(&command.header, status_code),
        })
    }

    pub fn identifier(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// C-MOVE response, one of a stream of pending responses or the final one
#[derive(Debug, Clone, PartialEq)]
pub struct CMoveResponse {
    pub(crate) header: ResponseHeader,
    pub(crate) sub_operations: SubOperations,
}

impl CMoveResponse {
    /// `identifier` lists the failed SOP instance UIDs, when there are any
    pub fn new(
        command: &CMoveCommand,
        status_code: u16,
        sub_operations: SubOperations,
        identifier: Option<DataSet>,
    ) -> Result<Self> {
        let mut header = ResponseHeader::answering(&command.header, status_code);
        header.payload = identifier;
        Ok(Self {
            header,
            sub_operations,
        })
    }

    pub fn sub_operations(&self) -> SubOperations {
        self.sub_operations
    }

    pub fn identifier(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// C-ECHO response
#[derive(Debug, Clone, PartialEq)]
pub struct CEchoResponse {
    pub(crate) header: ResponseHeader,
}

impl CEchoResponse {
    pub fn new(command: &CEchoCommand, status_code: u16) -> Result<Self> {
        let status_code = terminal_status(CommandKind::CEcho, status_code)?;
        Ok(Self {
            header: ResponseHeader::answering(&command.header, status_code),
        })
    }
}

/// N-EVENT-REPORT response
#[derive(Debug, Clone, PartialEq)]
pub struct NEventReportResponse {
    pub(crate) header: ResponseHeader,
    pub(crate) event_type_id: Option<u16>,
}

impl NEventReportResponse {
    pub fn new(command: &NEventReportCommand, status_code: u16) -> Result<Self> {
        let status_code = terminal_status(CommandKind::NEventReport, status_code)?;
        Ok(Self {
            header: ResponseHeader::answering(&command.header, status_code),
            event_type_id: Some(command.event_type_id),
        })
    }

    /// Successful response with an event reply
    pub fn with_reply(command: &NEventReportCommand, event_reply: DataSet) -> Result<Self> {
        let mut response = Self::new(command, status_codes::SUCCESS)?;
        response.header.payload = Some(event_reply);
        Ok(response)
    }

    /// The peer may omit the event type ID
    pub fn event_type_id(&self) -> Option<u16> {
        self.event_type_id
    }

    pub fn event_reply(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// N-GET response
#[derive(Debug, Clone, PartialEq)]
pub struct NGetResponse {
    pub(crate) header: ResponseHeader,
}

impl NGetResponse {
    pub fn new(
        command: &NGetCommand,
        status_code: u16,
        attribute_list: Option<DataSet>,
    ) -> Result<Self> {
        let status_code = terminal_status(CommandKind::NGet, status_code)?;
        let mut header = ResponseHeader::answering(&command.header, status_code);
        header.payload = attribute_list;
        Ok(Self { header })
    }

    pub fn attribute_list(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// N-SET response
#[derive(Debug, Clone, PartialEq)]
pub struct NSetResponse {
    pub(crate) header: ResponseHeader,
    pub(crate) modified_attributes: Vec<Tag>,
}

impl NSetResponse {
    pub fn new(command: &NSetCommand, status_code: u16) -> Result<Self> {
        let status_code = terminal_status(CommandKind::NSet, status_code)?;
        Ok(Self {
            header: ResponseHeader::answering(&command.header, status_code),
            modified_attributes: Vec::new(),
        })
    }

    /// Successful response listing the attributes that were modified
    pub fn success(command: &NSetCommand, modified_attributes: Vec<Tag>) -> Result<Self> {
        let mut response = Self::new(command, status_codes::SUCCESS)?;
        response.modified_attributes = modified_attributes;
        Ok(response)
    }

    pub fn modified_attributes(&self) -> &[Tag] {
        &self.modified_attributes
    }
}

/// N-ACTION response
#[derive(Debug, Clone, PartialEq)]
pub struct NActionResponse {
    pub(crate) header: ResponseHeader,
    pub(crate) action_type_id: Option<u16>,
}

impl NActionResponse {
    pub fn new(command: &NActionCommand, status_code: u16) -> Result<Self> {
        let status_code = terminal_status(CommandKind::NAction, status_code)?;
        Ok(Self {
            header: ResponseHeader::answering(&command.header, status_code),
            action_type_id: Some(command.action_type_id),
        })
    }

    /// Successful response with an action reply
    pub fn with_reply(command: &NActionCommand, action_reply: DataSet) -> Result<Self> {
        let mut response = Self::new(command, status_codes::SUCCESS)?;
        response.header.payload = Some(action_reply);
        Ok(response)
    }

    pub fn action_type_id(&self) -> Option<u16> {
        self.action_type_id
    }

    pub fn action_reply(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// N-CREATE response
#[derive(Debug, Clone, PartialEq)]
pub struct NCreateResponse {
    pub(crate) header: ResponseHeader,
}

impl NCreateResponse {
    /// A successful status requires the request to have named the instance
    pub fn new(command: &NCreateCommand, status_code: u16) -> Result<Self> {
        let status_code = terminal_status(CommandKind::NCreate, status_code)?;
        let response = Self {
            header: ResponseHeader::answering(&command.header, status_code),
        };
        response.check_instance_uid()?;
        Ok(response)
    }

    /// Successful response; `affected_sop_instance_uid` overrides the one of the request
    pub fn success(
        command: &NCreateCommand,
        affected_sop_instance_uid: Option<String>,
        attribute_list: Option<DataSet>,
    ) -> Result<Self> {
        let mut header = ResponseHeader::answering(&command.header, status_codes::SUCCESS);
        if let Some(uid) = affected_sop_instance_uid {
            header.affected_sop_instance_uid = Some(require_uid("affected SOP instance UID", uid)?);
        }
        header.payload = attribute_list;
        let response = Self { header };
        response.check_instance_uid()?;
        Ok(response)
    }

    /// Fill a missing instance UID from the request it answers
    ///
    /// Peers may leave out a UID the request already named, so received
    /// responses are only checked once the request is known.
    pub(crate) fn inherit_instance_uid(mut self, command: &NCreateCommand) -> Result<Self> {
        if self.header.affected_sop_instance_uid.is_none() {
            self.header.affected_sop_instance_uid =
                command.header.affected_sop_instance_uid.clone();
        }
        self.check_instance_uid()?;
        Ok(self)
    }

    fn check_instance_uid(&self) -> Result<()> {
        if self.header.status() == DimseStatus::Success
            && self.header.affected_sop_instance_uid.is_none()
        {
            return Err(DimseError::invalid_command(
                "successful N-CREATE responses need an affected SOP instance UID",
            ));
        }
        Ok(())
    }

    pub fn attribute_list(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// N-DELETE response
#[derive(Debug, Clone, PartialEq)]
pub struct NDeleteResponse {
    pub(crate) header: ResponseHeader,
}

impl NDeleteResponse {
    pub fn new(command: &NDeleteCommand, status_code: u16) -> Result<Self> {
        let status_code = terminal_status(CommandKind::NDelete, status_code)?;
        Ok(Self {
            header: ResponseHeader::answering(&command.header, status_code),
        })
    }
}

response_accessors! {
    CStoreResponse => CStore,
    CGetResponse => CGet,
    CFindResponse => CFind,
    CMoveResponse => CMove,
    CEchoResponse => CEcho,
    NEventReportResponse => NEventReport,
    NGetResponse => NGet,
    NSetResponse => NSet,
    NActionResponse => NAction,
    NCreateResponse => NCreate,
    NDeleteResponse => NDelete,
}

/// Any DIMSE response
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    CStore(CStoreResponse),
    CGet(CGetResponse),
    CFind(CFindResponse),
    CMove(CMoveResponse),
    CEcho(CEchoResponse),
    NEventReport(NEventReportResponse),
    NGet(NGetResponse),
    NSet(NSetResponse),
    NAction(NActionResponse),
    NCreate(NCreateResponse),
    NDelete(NDeleteResponse),
}

/// Generates the narrowing accessors of [`Response`]
macro_rules! narrow_response {
    ($($as_fn:ident, $into_fn:ident => $variant:ident($ty:ident)),* $(,)?) => {
        $(
            pub fn $as_fn(&self) -> Result<&$ty> {
                match self {
                    Response::$variant(response) => Ok(response),
                    other => Err(other.mismatch(CommandKind::$variant)),
                }
            }

            pub fn $into_fn(self) -> Result<$ty> {
                match self {
                    Response::$variant(response) => Ok(response),
                    other => Err(other.mismatch(CommandKind::$variant)),
                }
            }
        )*
    };
}

impl Response {
    pub fn kind(&self) -> CommandKind {
        match self {
            Response::CStore(_) => CommandKind::CStore,
            Response::CGet(_) => CommandKind::CGet,
            Response::CFind(_) => CommandKind::CFind,
            Response::CMove(_) => CommandKind::CMove,
            Response::CEcho(_) => CommandKind::CEcho,
            Response::NEventReport(_) => CommandKind::NEventReport,
            Response::NGet(_) => CommandKind::NGet,
            Response::NSet(_) => CommandKind::NSet,
            Response::NAction(_) => CommandKind::NAction,
            Response::NCreate(_) => CommandKind::NCreate,
            Response::NDelete(_) => CommandKind::NDelete,
        }
    }

    pub fn header(&self) -> &ResponseHeader {
        match self {
            Response::CStore(r) => &r.header,
            Response::CGet(r) => &r.header,
            Response::CFind(r) => &r.header,
            Response::CMove(r) => &r.header,
            Response::CEcho(r) => &r.header,
            Response::NEventReport(r) => &r.header,
            Response::NGet(r) => &r.header,
            Response::NSet(r) => &r.header,
            Response::NAction(r) => &r.header,
            Response::NCreate(r) => &r.header,
            Response::NDelete(r) => &r.header,
        }
    }

    /// Message ID of the command this response answers
    pub fn message_id(&self) -> u16 {
        self.header().message_id_being_responded_to
    }

    pub fn abstract_syntax(&self) -> &str {
        &self.header().abstract_syntax
    }

    pub fn status(&self) -> DimseStatus {
        self.header().status()
    }

    pub fn status_code(&self) -> u16 {
        self.header().status_code
    }

    pub fn is_pending(&self) -> bool {
        self.status().is_pending()
    }

    /// Whether no further responses follow for this message ID
    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn affected_sop_class_uid(&self) -> Option<&str> {
        self.header().affected_sop_class_uid()
    }

    pub fn affected_sop_instance_uid(&self) -> Option<&str> {
        self.header().affected_sop_instance_uid()
    }

    pub fn payload_data_set(&self) -> Option<&DataSet> {
        self.header().payload()
    }

    /// Sub-operation counters, for C-GET and C-MOVE responses
    pub fn sub_operations(&self) -> Option<SubOperations> {
        match self {
            Response::CGet(r) => Some(r.sub_operations),
            Response::CMove(r) => Some(r.sub_operations),
            _ => None,
        }
    }

    fn mismatch(&self, expected: CommandKind) -> DimseError {
        DimseError::TypeMismatch {
            expected: expected.name(),
            found: self.kind().name(),
        }
    }

    /// Apply the construction rules to a response decoded from the wire
    pub(crate) fn validate(&self) -> Result<()> {
        terminal_status(self.kind(), self.status_code())?;
        match self {
            Response::CFind(r) if r.header.status().is_pending() && r.header.payload.is_none() => {
                Err(DimseError::invalid_command(
                    "pending C-FIND responses must carry an identifier",
                ))
            }
            _ => Ok(()),
        }
    }

    narrow_response! {
        as_c_store, into_c_store => CStore(CStoreResponse),
        as_c_get, into_c_get => CGet(CGetResponse),
        as_c_find, into_c_find => CFind(CFindResponse),
        as_c_move, into_c_move => CMove(CMoveResponse),
        as_c_echo, into_c_echo => CEcho(CEchoResponse),
        as_n_event_report, into_n_event_report => NEventReport(NEventReportResponse),
        as_n_get, into_n_get => NGet(NGetResponse),
        as_n_set, into_n_set => NSet(NSetResponse),
        as_n_action, into_n_action => NAction(NActionResponse),
        as_n_create, into_n_create => NCreate(NCreateResponse),
        as_n_delete, into_n_delete => NDelete(NDeleteResponse),
    }
}
