//! DIMSE request messages
//!
//! Each operation has its own command type whose constructor enforces the
//! field combinations required by PS3.7 for that operation. [`Command`] is
//! the closed set of all of them, as received from a peer.

use dicom_core::Tag;

use crate::error::{DimseError, Result};
use crate::types::{validate_ae_title, CommandKind, DataSet, Priority};

/// Maximum length of a UID value
const MAX_UID_LEN: usize = 64;

/// Fields shared by every command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandHeader {
    pub(crate) abstract_syntax: String,
    pub(crate) message_id: u16,
    pub(crate) priority: Option<Priority>,
    pub(crate) affected_sop_class_uid: Option<String>,
    pub(crate) affected_sop_instance_uid: Option<String>,
    pub(crate) requested_sop_class_uid: Option<String>,
    pub(crate) requested_sop_instance_uid: Option<String>,
    pub(crate) payload: Option<DataSet>,
}

impl CommandHeader {
    fn new(abstract_syntax: String, message_id: u16) -> Result<Self> {
        if abstract_syntax.trim().is_empty() {
            return Err(DimseError::invalid_command("abstract syntax is required"));
        }
        Ok(Self {
            abstract_syntax,
            message_id,
            priority: None,
            affected_sop_class_uid: None,
            affected_sop_instance_uid: None,
            requested_sop_class_uid: None,
            requested_sop_instance_uid: None,
            payload: None,
        })
    }

    pub fn abstract_syntax(&self) -> &str {
        &self.abstract_syntax
    }

    pub fn message_id(&self) -> u16 {
        self.message_id
    }

    pub fn priority(&self) -> Option<Priority> {
        self.priority
    }

    pub fn affected_sop_class_uid(&self) -> Option<&str> {
        self.affected_sop_class_uid.as_deref()
    }

    pub fn affected_sop_instance_uid(&self) -> Option<&str> {
        self.affected_sop_instance_uid.as_deref()
    }

    pub fn requested_sop_class_uid(&self) -> Option<&str> {
        self.requested_sop_class_uid.as_deref()
    }

    pub fn requested_sop_instance_uid(&self) -> Option<&str> {
        self.requested_sop_instance_uid.as_deref()
    }

    pub fn payload(&self) -> Option<&DataSet> {
        self.payload.as_ref()
    }
}

/// Check that a UID is present and well formed, returning it trimmed
pub(crate) fn require_uid(what: &str, uid: impl Into<String>) -> Result<String> {
    let uid = uid.into();
    let trimmed = uid.trim_end_matches(['\0', ' ']).trim_start();
    if trimmed.is_empty() {
        return Err(DimseError::invalid_command(format!("{} is required", what)));
    }
    if trimmed.len() > MAX_UID_LEN {
        return Err(DimseError::invalid_command(format!(
            "{} exceeds {} characters",
            what, MAX_UID_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Implements the accessors every concrete command shares
macro_rules! command_accessors {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(
            impl $ty {
                pub fn header(&self) -> &CommandHeader {
                    &self.header
                }

                pub fn message_id(&self) -> u16 {
                    self.header.message_id
                }

                pub fn abstract_syntax(&self) -> &str {
                    &self.header.abstract_syntax
                }
            }

            impl From<$ty> for Command {
                fn from(command: $ty) -> Self {
                    Command::$variant(command)
                }
            }
        )*
    };
}

/// C-STORE request
#[derive(Debug, Clone, PartialEq)]
pub struct CStoreCommand {
    pub(crate) header: CommandHeader,
    pub(crate) originator_aet: Option<String>,
    pub(crate) originator_message_id: Option<u16>,
}

impl CStoreCommand {
    pub fn new(
        abstract_syntax: impl Into<String>,
        message_id: u16,
        priority: Priority,
        affected_sop_class_uid: impl Into<String>,
        affected_sop_instance_uid: impl Into<String>,
        payload: DataSet,
    ) -> Result<Self> {
        let mut header = CommandHeader::new(abstract_syntax.into(), message_id)?;
        header.priority = Some(priority);
        header.affected_sop_class_uid =
            Some(require_uid("affected SOP class UID", affected_sop_class_uid)?);
        header.affected_sop_instance_uid = Some(require_uid(
            "affected SOP instance UID",
            affected_sop_instance_uid,
        )?);
        header.payload = Some(payload);
        Ok(Self {
            header,
            originator_aet: None,
            originator_message_id: None,
        })
    }

    /// Mark this store as a sub-operation of a C-MOVE issued by `originator_aet`
    pub fn with_move_originator(
        mut self,
        originator_aet: impl Into<String>,
        originator_message_id: u16,
    ) -> Result<Self> {
        let originator_aet = originator_aet.into();
        validate_ae_title("move originator AET", &originator_aet)?;
        self.originator_aet = Some(originator_aet.trim().to_string());
        self.originator_message_id = Some(originator_message_id);
        Ok(self)
    }

    pub fn originator_aet(&self) -> Option<&str> {
        self.originator_aet.as_deref()
    }

    pub fn originator_message_id(&self) -> Option<u16> {
        self.originator_message_id
    }

    pub fn payload(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// C-GET request
#[derive(Debug, Clone, PartialEq)]
pub struct CGetCommand {
    pub(crate) header: CommandHeader,
}

impl CGetCommand {
    pub fn new(
        abstract_syntax: impl Into<String>,
        message_id: u16,
        priority: Priority,
        affected_sop_class_uid: impl Into<String>,
        identifier: DataSet,
    ) -> Result<Self> {
        let header = query_header(
            abstract_syntax.into(),
            message_id,
            priority,
            affected_sop_class_uid.into(),
            identifier,
        )?;
        Ok(Self { header })
    }

    pub fn identifier(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// C-FIND request
#[derive(Debug, Clone, PartialEq)]
pub struct CFindCommand {
    pub(crate) header: CommandHeader,
}

impl CFindCommand {
    pub fn new(
        abstract_syntax: impl Into<String>,
        message_id: u16,
        priority: Priority,
        affected_sop_class_uid: impl Into<String>,
        identifier: DataSet,
    ) -> Result<Self> {
        let header = query_header(
            abstract_syntax.into(),
            message_id,
            priority,
            affected_sop_class_uid.into(),
            identifier,
        )?;
        Ok(Self { header })
    }

    pub fn identifier(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// C-MOVE request
#[derive(Debug, Clone, PartialEq)]
pub struct CMoveCommand {
    pub(crate) header: CommandHeader,
    pub(crate) destination_aet: String,
}

impl CMoveCommand {
    pub fn new(
        abstract_syntax: impl Into<String>,
        message_id: u16,
        priority: Priority,
        affected_sop_class_uid: impl Into<String>,
        destination_aet: impl Into<String>,
        identifier: DataSet,
    ) -> Result<Self> {
        let destination_aet = destination_aet.into();
        validate_ae_title("C-MOVE destination AET", &destination_aet)?;
        let header = query_header(
            abstract_syntax.into(),
            message_id,
            priority,
            affected_sop_class_uid.into(),
            identifier,
        )?;
        Ok(Self {
            header,
            destination_aet: destination_aet.trim().to_string(),
        })
    }

    pub fn destination_aet(&self) -> &str {
        &self.destination_aet
    }

    pub fn identifier(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

fn query_header(
    abstract_syntax: String,
    message_id: u16,
    priority: Priority,
    affected_sop_class_uid: String,
    identifier: DataSet,
) -> Result<CommandHeader> {
    let mut header = CommandHeader::new(abstract_syntax, message_id)?;
    header.priority = Some(priority);
    header.affected_sop_class_uid =
        Some(require_uid("affected SOP class UID", affected_sop_class_uid)?);
    header.payload = Some(identifier);
    Ok(header)
}

/// C-ECHO request
#[derive(Debug, Clone, PartialEq)]
pub struct CEchoCommand {
    pub(crate) header: CommandHeader,
}

impl CEchoCommand {
    pub fn new(
        abstract_syntax: impl Into<String>,
        message_id: u16,
        affected_sop_class_uid: impl Into<String>,
    ) -> Result<Self> {
        let mut header = CommandHeader::new(abstract_syntax.into(), message_id)?;
        header.affected_sop_class_uid =
            Some(require_uid("affected SOP class UID", affected_sop_class_uid)?);
        Ok(Self { header })
    }
}

/// C-CANCEL request
///
/// A C-CANCEL carries no message ID of its own: its message ID is the one of
/// the C-GET, C-FIND or C-MOVE being cancelled, and the peer never answers it.
#[derive(Debug, Clone, PartialEq)]
pub struct CCancelCommand {
    pub(crate) header: CommandHeader,
}

impl CCancelCommand {
    pub fn new(abstract_syntax: impl Into<String>, cancel_message_id: u16) -> Result<Self> {
        let header = CommandHeader::new(abstract_syntax.into(), cancel_message_id)?;
        Ok(Self { header })
    }

    pub fn cancel_message_id(&self) -> u16 {
        self.header.message_id
    }
}

/// N-EVENT-REPORT request
#[derive(Debug, Clone, PartialEq)]
pub struct NEventReportCommand {
    pub(crate) header: CommandHeader,
    pub(crate) event_type_id: u16,
}

impl NEventReportCommand {
    pub fn new(
        abstract_syntax: impl Into<String>,
        message_id: u16,
        affected_sop_class_uid: impl Into<String>,
        affected_sop_instance_uid: impl Into<String>,
        event_type_id: u16,
        event_information: Option<DataSet>,
    ) -> Result<Self> {
        let mut header = CommandHeader::new(abstract_syntax.into(), message_id)?;
        header.affected_sop_class_uid =
            Some(require_uid("affected SOP class UID", affected_sop_class_uid)?);
        header.affected_sop_instance_uid = Some(require_uid(
            "affected SOP instance UID",
            affected_sop_instance_uid,
        )?);
        header.payload = event_information;
        Ok(Self {
            header,
            event_type_id,
        })
    }

    pub fn event_type_id(&self) -> u16 {
        self.event_type_id
    }

    pub fn event_information(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// N-GET request
#[derive(Debug, Clone, PartialEq)]
pub struct NGetCommand {
    pub(crate) header: CommandHeader,
    pub(crate) attribute_identifiers: Vec<Tag>,
}

impl NGetCommand {
    /// An empty attribute list requests every attribute
    pub fn new(
        abstract_syntax: impl Into<String>,
        message_id: u16,
        requested_sop_class_uid: impl Into<String>,
        requested_sop_instance_uid: impl Into<String>,
        attribute_identifiers: Vec<Tag>,
    ) -> Result<Self> {
        let header = requested_header(
            abstract_syntax.into(),
            message_id,
            requested_sop_class_uid.into(),
            requested_sop_instance_uid.into(),
        )?;
        Ok(Self {
            header,
            attribute_identifiers,
        })
    }

    pub fn attribute_identifiers(&self) -> &[Tag] {
        &self.attribute_identifiers
    }
}

/// N-SET request
#[derive(Debug, Clone, PartialEq)]
pub struct NSetCommand {
    pub(crate) header: CommandHeader,
}

impl NSetCommand {
    pub fn new(
        abstract_syntax: impl Into<String>,
        message_id: u16,
        requested_sop_class_uid: impl Into<String>,
        requested_sop_instance_uid: impl Into<String>,
        modification_list: DataSet,
    ) -> Result<Self> {
        let mut header = requested_header(
            abstract_syntax.into(),
            message_id,
            requested_sop_class_uid.into(),
            requested_sop_instance_uid.into(),
        )?;
        header.payload = Some(modification_list);
        Ok(Self { header })
    }

    pub fn modification_list(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// N-ACTION request
#[derive(Debug, Clone, PartialEq)]
pub struct NActionCommand {
    pub(crate) header: CommandHeader,
    pub(crate) action_type_id: u16,
}

impl NActionCommand {
    pub fn new(
        abstract_syntax: impl Into<String>,
        message_id: u16,
        requested_sop_class_uid: impl Into<String>,
        requested_sop_instance_uid: impl Into<String>,
        action_type_id: u16,
        action_information: Option<DataSet>,
    ) -> Result<Self> {
        let mut header = requested_header(
            abstract_syntax.into(),
            message_id,
            requested_sop_class_uid.into(),
            requested_sop_instance_uid.into(),
        )?;
        header.payload = action_information;
        Ok(Self {
            header,
            action_type_id,
        })
    }

    pub fn action_type_id(&self) -> u16 {
        self.action_type_id
    }

    pub fn action_information(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// N-CREATE request
#[derive(Debug, Clone, PartialEq)]
pub struct NCreateCommand {
    pub(crate) header: CommandHeader,
}

impl NCreateCommand {
    /// Without an affected SOP instance UID the peer assigns one in its response
    pub fn new(
        abstract_syntax: impl Into<String>,
        message_id: u16,
        affected_sop_class_uid: impl Into<String>,
        affected_sop_instance_uid: Option<String>,
        attribute_list: Option<DataSet>,
    ) -> Result<Self> {
        let mut header = CommandHeader::new(abstract_syntax.into(), message_id)?;
        header.affected_sop_class_uid =
            Some(require_uid("affected SOP class UID", affected_sop_class_uid)?);
        header.affected_sop_instance_uid = affected_sop_instance_uid
            .map(|uid| require_uid("affected SOP instance UID", uid))
            .transpose()?;
        header.payload = attribute_list;
        Ok(Self { header })
    }

    pub fn attribute_list(&self) -> Option<&DataSet> {
        self.header.payload.as_ref()
    }
}

/// N-DELETE request
#[derive(Debug, Clone, PartialEq)]
pub struct NDeleteCommand {
    pub(crate) header: CommandHeader,
}

impl NDeleteCommand {
    pub fn new(
        abstract_syntax: impl Into<String>,
        message_id: u16,
        requested_sop_class_uid: impl Into<String>,
        requested_sop_instance_uid: impl Into<String>,
    ) -> Result<Self> {
        let header = requested_header(
            abstract_syntax.into(),
            message_id,
            requested_sop_class_uid.into(),
            requested_sop_instance_uid.into(),
        )?;
        Ok(Self { header })
    }
}

fn requested_header(
    abstract_syntax: String,
    message_id: u16,
    requested_sop_class_uid: String,
    requested_sop_instance_uid: String,
) -> Result<CommandHeader> {
    let mut header = CommandHeader::new(abstract_syntax, message_id)?;
    header.requested_sop_class_uid =
        Some(require_uid("requested SOP class UID", requested_sop_class_uid)?);
    header.requested_sop_instance_uid = Some(require_uid(
        "requested SOP instance UID",
        requested_sop_instance_uid,
    )?);
    Ok(header)
}

command_accessors! {
    CStoreCommand => CStore,
    CGetCommand => CGet,
    CFindCommand => CFind,
    CMoveCommand => CMove,
    CEchoCommand => CEcho,
    CCancelCommand => CCancel,
    NEventReportCommand => NEventReport,
    NGetCommand => NGet,
    NSetCommand => NSet,
    NActionCommand => NAction,
    NCreateCommand => NCreate,
    NDeleteCommand => NDelete,
}

/// Any DIMSE request
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CStore(CStoreCommand),
    CGet(CGetCommand),
    CFind(CFindCommand),
    CMove(CMoveCommand),
    CEcho(CEchoCommand),
    CCancel(CCancelCommand),
    NEventReport(NEventReportCommand),
    NGet(NGetCommand),
    NSet(NSetCommand),
    NAction(NActionCommand),
    NCreate(NCreateCommand),
    NDelete(NDeleteCommand),
}

/// Generates the borrowing narrowing accessors of [`Command`]
macro_rules! narrow_command {
    ($($fn_name:ident => $variant:ident($ty:ident)),* $(,)?) => {
        $(
            pub fn $fn_name(&self) -> Result<&$ty> {
                match self {
                    Command::$variant(command) => Ok(command),
                    other => Err(DimseError::TypeMismatch {
                        expected: CommandKind::$variant.name(),
                        found: other.kind().name(),
                    }),
                }
            }
        )*
    };
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CStore(_) => CommandKind::CStore,
            Command::CGet(_) => CommandKind::CGet,
            Command::CFind(_) => CommandKind::CFind,
            Command::CMove(_) => CommandKind::CMove,
            Command::CEcho(_) => CommandKind::CEcho,
            Command::CCancel(_) => CommandKind::CCancel,
            Command::NEventReport(_) => CommandKind::NEventReport,
            Command::NGet(_) => CommandKind::NGet,
            Command::NSet(_) => CommandKind::NSet,
            Command::NAction(_) => CommandKind::NAction,
            Command::NCreate(_) => CommandKind::NCreate,
            Command::NDelete(_) => CommandKind::NDelete,
        }
    }

    pub fn header(&self) -> &CommandHeader {
        match self {
            Command::CStore(c) => &c.header,
            Command::CGet(c) => &c.header,
            Command::CFind(c) => &c.header,
            Command::CMove(c) => &c.header,
            Command::CEcho(c) => &c.header,
            Command::CCancel(c) => &c.header,
            Command::NEventReport(c) => &c.header,
            Command::NGet(c) => &c.header,
            Command::NSet(c) => &c.header,
            Command::NAction(c) => &c.header,
            Command::NCreate(c) => &c.header,
            Command::NDelete(c) => &c.header,
        }
    }

    pub fn message_id(&self) -> u16 {
        self.header().message_id
    }

    pub fn abstract_syntax(&self) -> &str {
        &self.header().abstract_syntax
    }

    pub fn priority(&self) -> Option<Priority> {
        self.header().priority
    }

    pub fn affected_sop_class_uid(&self) -> Option<&str> {
        self.header().affected_sop_class_uid()
    }

    pub fn affected_sop_instance_uid(&self) -> Option<&str> {
        self.header().affected_sop_instance_uid()
    }

    pub fn requested_sop_class_uid(&self) -> Option<&str> {
        self.header().requested_sop_class_uid()
    }

    pub fn requested_sop_instance_uid(&self) -> Option<&str> {
        self.header().requested_sop_instance_uid()
    }

    pub fn payload_data_set(&self) -> Option<&DataSet> {
        self.header().payload()
    }

    narrow_command! {
        as_c_store => CStore(CStoreCommand),
        as_c_get => CGet(CGetCommand),
        as_c_find => CFind(CFindCommand),
        as_c_move => CMove(CMoveCommand),
        as_c_echo => CEcho(CEchoCommand),
        as_c_cancel => CCancel(CCancelCommand),
        as_n_event_report => NEventReport(NEventReportCommand),
        as_n_get => NGet(NGetCommand),
        as_n_set => NSet(NSetCommand),
        as_n_action => NAction(NActionCommand),
        as_n_create => NCreate(NCreateCommand),
        as_n_delete => NDelete(NDeleteCommand),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERIFICATION: &str = "1.2.840.10008.1.1";
    const STUDY_ROOT_FIND: &str = "1.2.840.10008.5.1.4.1.2.2.1";
    const STUDY_ROOT_MOVE: &str = "1.2.840.10008.5.1.4.1.2.2.2";
    const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";

    #[test]
    fn test_c_echo_round_trips_fields() {
        let echo = CEchoCommand::new(VERIFICATION, 42, VERIFICATION).unwrap();
        let command = Command::from(echo);

        assert_eq!(command.kind(), CommandKind::CEcho);
        assert_eq!(command.message_id(), 42);
        assert_eq!(command.abstract_syntax(), VERIFICATION);
        assert_eq!(command.affected_sop_class_uid(), Some(VERIFICATION));
        assert_eq!(command.priority(), None);
        assert!(command.payload_data_set().is_none());
    }

    #[test]
    fn test_c_move_requires_destination() {
        let result = CMoveCommand::new(
            STUDY_ROOT_MOVE,
            1,
            Priority::Medium,
            STUDY_ROOT_MOVE,
            "",
            DataSet::new_empty(),
        );
        assert!(matches!(result, Err(DimseError::InvalidCommand(_))));

        let result = CMoveCommand::new(
            STUDY_ROOT_MOVE,
            1,
            Priority::Medium,
            STUDY_ROOT_MOVE,
            "A_DESTINATION_TOO_LONG",
            DataSet::new_empty(),
        );
        assert!(matches!(result, Err(DimseError::InvalidCommand(_))));

        let command = CMoveCommand::new(
            STUDY_ROOT_MOVE,
            1,
            Priority::High,
            STUDY_ROOT_MOVE,
            "STORESCP",
            DataSet::new_empty(),
        )
        .unwrap();
        assert_eq!(command.destination_aet(), "STORESCP");
    }

    #[test]
    fn test_missing_uids_are_rejected() {
        assert!(matches!(
            CEchoCommand::new(VERIFICATION, 1, ""),
            Err(DimseError::InvalidCommand(_))
        ));
        assert!(matches!(
            CEchoCommand::new("", 1, VERIFICATION),
            Err(DimseError::InvalidCommand(_))
        ));
        assert!(matches!(
            CStoreCommand::new(
                CT_IMAGE_STORAGE,
                1,
                Priority::Medium,
                CT_IMAGE_STORAGE,
                "",
                DataSet::new_empty()
            ),
            Err(DimseError::InvalidCommand(_))
        ));
        assert!(matches!(
            NDeleteCommand::new("1.2.3", 1, "1.2.3", ""),
            Err(DimseError::InvalidCommand(_))
        ));
        assert!(matches!(
            NEventReportCommand::new("1.2.3", 1, "1.2.3", "", 1, None),
            Err(DimseError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_narrowing_wrong_kind_is_type_mismatch() {
        let find = CFindCommand::new(
            STUDY_ROOT_FIND,
            9,
            Priority::Low,
            STUDY_ROOT_FIND,
            DataSet::new_empty(),
        )
        .unwrap();
        let command = Command::from(find.clone());

        match command.as_c_store() {
            Err(DimseError::TypeMismatch { expected, found }) => {
                assert_eq!(expected, "C-STORE");
                assert_eq!(found, "C-FIND");
            }
            other => panic!("expected type mismatch, got {:?}", other),
        }

        // the command is left untouched
        assert_eq!(command.as_c_find().unwrap(), &find);
        assert_eq!(command.priority(), Some(Priority::Low));
    }

    #[test]
    fn test_c_store_move_originator() {
        let store = CStoreCommand::new(
            CT_IMAGE_STORAGE,
            3,
            Priority::Medium,
            CT_IMAGE_STORAGE,
            "1.2.3.4.5",
            DataSet::new_empty(),
        )
        .unwrap()
        .with_move_originator("MOVESCU", 17)
        .unwrap();

        assert_eq!(store.originator_aet(), Some("MOVESCU"));
        assert_eq!(store.originator_message_id(), Some(17));
        assert_eq!(store.header().affected_sop_instance_uid(), Some("1.2.3.4.5"));
    }

    #[test]
    fn test_n_create_instance_uid_is_optional() {
        let create = NCreateCommand::new("1.2.840.10008.3.1.2.3.3", 5, "1.2.840.10008.3.1.2.3.3", None, None)
            .unwrap();
        assert_eq!(create.header().affected_sop_instance_uid(), None);

        let cancel = CCancelCommand::new(STUDY_ROOT_FIND, 9).unwrap();
        assert_eq!(cancel.cancel_message_id(), 9);
        assert_eq!(Command::from(cancel).kind(), CommandKind::CCancel);
    }
}
