//! Common types for DIMSE operations

use dicom_object::InMemDicomObject;
use serde::{Deserialize, Serialize};

use crate::error::{DimseError, Result};

/// Opaque data set attached to commands and responses
pub type DataSet = InMemDicomObject;

/// Maximum length of an Application Entity Title
pub const MAX_AE_TITLE_LEN: usize = 16;

/// Well-known DIMSE status codes (PS3.7 Annex C)
pub mod status_codes {
    pub const SUCCESS: u16 = 0x0000;
    pub const PENDING: u16 = 0xFF00;
    pub const PENDING_WITH_WARNINGS: u16 = 0xFF01;
    pub const CANCEL: u16 = 0xFE00;
    pub const ATTRIBUTE_LIST_ERROR: u16 = 0x0107;
    pub const ATTRIBUTE_VALUE_OUT_OF_RANGE: u16 = 0x0116;
    pub const WARNING: u16 = 0x0001;
    pub const SUB_OPERATIONS_COMPLETE_WITH_FAILURES: u16 = 0xB000;
    pub const PROCESSING_FAILURE: u16 = 0x0110;
    pub const NO_SUCH_OBJECT_INSTANCE: u16 = 0x0112;
    pub const UNRECOGNIZED_OPERATION: u16 = 0x0211;
    pub const OUT_OF_RESOURCES: u16 = 0xA700;
    pub const UNABLE_TO_CALCULATE_MATCHES: u16 = 0xA701;
    pub const MOVE_DESTINATION_UNKNOWN: u16 = 0xA801;
    pub const IDENTIFIER_DOES_NOT_MATCH_SOP_CLASS: u16 = 0xA900;
    pub const UNABLE_TO_PROCESS: u16 = 0xC000;
}

/// DIMSE operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandKind {
    CStore,
    CGet,
    CFind,
    CMove,
    CEcho,
    CCancel,
    NEventReport,
    NGet,
    NSet,
    NAction,
    NCreate,
    NDelete,
}

impl CommandKind {
    /// All operation kinds, in command field order
    pub const ALL: [CommandKind; 12] = [
        CommandKind::CStore,
        CommandKind::CGet,
        CommandKind::CFind,
        CommandKind::CMove,
        CommandKind::CEcho,
        CommandKind::NEventReport,
        CommandKind::NGet,
        CommandKind::NSet,
        CommandKind::NAction,
        CommandKind::NCreate,
        CommandKind::NDelete,
        CommandKind::CCancel,
    ];

    /// Command Field (0000,0100) value of the request
    pub fn command_field(self) -> u16 {
        match self {
            CommandKind::CStore => 0x0001,
            CommandKind::CGet => 0x0010,
            CommandKind::CFind => 0x0020,
            CommandKind::CMove => 0x0021,
            CommandKind::CEcho => 0x0030,
            CommandKind::NEventReport => 0x0100,
            CommandKind::NGet => 0x0110,
            CommandKind::NSet => 0x0120,
            CommandKind::NAction => 0x0130,
            CommandKind::NCreate => 0x0140,
            CommandKind::NDelete => 0x0150,
            CommandKind::CCancel => 0x0FFF,
        }
    }

    /// Command Field value of the response, if the operation has one
    pub fn response_field(self) -> Option<u16> {
        match self {
            CommandKind::CCancel => None,
            other => Some(other.command_field() | 0x8000),
        }
    }

    /// Classify a Command Field value, returning the kind and whether it is a response
    pub fn from_command_field(field: u16) -> Option<(CommandKind, bool)> {
        let is_response = field & 0x8000 != 0;
        let request_field = field & 0x7FFF;
        let kind = Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.command_field() == request_field)?;
        if is_response && kind == CommandKind::CCancel {
            return None;
        }
        Some((kind, is_response))
    }

    /// Whether the operation may answer with a stream of pending responses
    pub fn is_partial(self) -> bool {
        matches!(self, CommandKind::CGet | CommandKind::CFind | CommandKind::CMove)
    }

    /// Whether the peer answers this command at all
    pub fn expects_response(self) -> bool {
        self != CommandKind::CCancel
    }

    /// Whether the command carries a priority
    pub fn has_priority(self) -> bool {
        matches!(
            self,
            CommandKind::CStore | CommandKind::CGet | CommandKind::CFind | CommandKind::CMove
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandKind::CStore => "C-STORE",
            CommandKind::CGet => "C-GET",
            CommandKind::CFind => "C-FIND",
            CommandKind::CMove => "C-MOVE",
            CommandKind::CEcho => "C-ECHO",
            CommandKind::CCancel => "C-CANCEL",
            CommandKind::NEventReport => "N-EVENT-REPORT",
            CommandKind::NGet => "N-GET",
            CommandKind::NSet => "N-SET",
            CommandKind::NAction => "N-ACTION",
            CommandKind::NCreate => "N-CREATE",
            CommandKind::NDelete => "N-DELETE",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Priority of C-STORE, C-GET, C-FIND and C-MOVE requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    /// Low priority
    Low,
    /// Medium priority (default)
    #[default]
    Medium,
    /// High priority
    High,
}

impl Priority {
    /// Priority (0000,0700) value
    pub fn code(self) -> u16 {
        match self {
            Priority::Medium => 0x0000,
            Priority::High => 0x0001,
            Priority::Low => 0x0002,
        }
    }

    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            0x0000 => Ok(Priority::Medium),
            0x0001 => Ok(Priority::High),
            0x0002 => Ok(Priority::Low),
            other => Err(DimseError::malformed(format!(
                "invalid priority 0x{:04X}",
                other
            ))),
        }
    }
}

/// DIMSE operation status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimseStatus {
    /// Operation completed successfully
    Success,
    /// Operation is pending (more responses to follow)
    Pending(u16),
    /// Operation cancelled by user
    Cancel,
    /// Operation failed with error
    Failure(u16), // DICOM status code
    /// Warning occurred during operation
    Warning(u16), // DICOM status code
}

impl DimseStatus {
    /// Classify a raw status code
    pub fn from_code(code: u16) -> Self {
        match code {
            status_codes::SUCCESS => DimseStatus::Success,
            status_codes::PENDING | status_codes::PENDING_WITH_WARNINGS => {
                DimseStatus::Pending(code)
            }
            status_codes::CANCEL => DimseStatus::Cancel,
            status_codes::WARNING
            | status_codes::ATTRIBUTE_LIST_ERROR
            | status_codes::ATTRIBUTE_VALUE_OUT_OF_RANGE
            | 0xB000..=0xBFFF => DimseStatus::Warning(code),
            _ => DimseStatus::Failure(code),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            DimseStatus::Success => status_codes::SUCCESS,
            DimseStatus::Pending(code) => *code,
            DimseStatus::Cancel => status_codes::CANCEL,
            DimseStatus::Failure(code) | DimseStatus::Warning(code) => *code,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, DimseStatus::Pending(_))
    }

    /// Any status other than pending ends the response stream
    pub fn is_terminal(&self) -> bool {
        !self.is_pending()
    }

    /// Check if a status indicates success (including warnings)
    pub fn is_successful(&self) -> bool {
        matches!(self, DimseStatus::Success | DimseStatus::Warning(_))
    }
}

/// Sub-operation counters of C-GET and C-MOVE responses
///
/// Each counter travels as a single US element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubOperations {
    pub remaining: u16,
    pub completed: u16,
    pub failed: u16,
    pub warning: u16,
}

impl SubOperations {
    pub fn new(remaining: u16, completed: u16, failed: u16, warning: u16) -> Self {
        Self {
            remaining,
            completed,
            failed,
            warning,
        }
    }
}

/// Validate an Application Entity Title
pub fn validate_ae_title(what: &str, aet: &str) -> Result<()> {
    let trimmed = aet.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_AE_TITLE_LEN {
        return Err(DimseError::invalid_command(format!(
            "{} must be 1-{} characters",
            what, MAX_AE_TITLE_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_field_classification() {
        assert_eq!(
            CommandKind::from_command_field(0x0021),
            Some((CommandKind::CMove, false))
        );
        assert_eq!(
            CommandKind::from_command_field(0x8030),
            Some((CommandKind::CEcho, true))
        );
        assert_eq!(
            CommandKind::from_command_field(0x0FFF),
            Some((CommandKind::CCancel, false))
        );
        assert_eq!(CommandKind::from_command_field(0x8FFF), None);
        assert_eq!(CommandKind::from_command_field(0x0042), None);
    }

    #[test]
    fn test_partial_kinds() {
        let partial: Vec<_> = CommandKind::ALL
            .iter()
            .filter(|kind| kind.is_partial())
            .collect();
        assert_eq!(
            partial,
            vec![&CommandKind::CGet, &CommandKind::CFind, &CommandKind::CMove]
        );
        assert!(!CommandKind::CCancel.expects_response());
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(DimseStatus::from_code(0x0000), DimseStatus::Success);
        assert_eq!(DimseStatus::from_code(0xFF01), DimseStatus::Pending(0xFF01));
        assert_eq!(DimseStatus::from_code(0xFE00), DimseStatus::Cancel);
        assert_eq!(DimseStatus::from_code(0xB000), DimseStatus::Warning(0xB000));
        assert_eq!(DimseStatus::from_code(0xA801), DimseStatus::Failure(0xA801));
        assert!(DimseStatus::from_code(0xC000).is_terminal());
        assert!(DimseStatus::Warning(0x0001).is_successful());
        assert!(!DimseStatus::Pending(0xFF00).is_successful());
    }

    #[test]
    fn test_priority_codes() {
        for priority in [Priority::Low, Priority::Medium, Priority::High] {
            assert_eq!(Priority::from_code(priority.code()).unwrap(), priority);
        }
        assert!(Priority::from_code(7).is_err());
    }

    #[test]
    fn test_ae_title_validation() {
        assert!(validate_ae_title("Destination AET", "STORESCP").is_ok());
        assert!(validate_ae_title("Destination AET", "  ").is_err());
        assert!(validate_ae_title("Destination AET", &"A".repeat(17)).is_err());
    }
}
