//! The unit exchanged over an association: a command or a response

use crate::codec;
use crate::command::Command;
use crate::error::{DimseError, Result};
use crate::response::Response;
use crate::types::{CommandKind, DataSet};

/// A DIMSE message as sent and received by the service
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Command(Command),
    Response(Response),
}

impl Envelope {
    pub fn kind(&self) -> CommandKind {
        match self {
            Envelope::Command(command) => command.kind(),
            Envelope::Response(response) => response.kind(),
        }
    }

    pub fn is_response(&self) -> bool {
        matches!(self, Envelope::Response(_))
    }

    /// Message ID of a command, or the ID a response answers
    pub fn message_id(&self) -> u16 {
        match self {
            Envelope::Command(command) => command.message_id(),
            Envelope::Response(response) => response.message_id(),
        }
    }

    pub fn abstract_syntax(&self) -> &str {
        match self {
            Envelope::Command(command) => command.abstract_syntax(),
            Envelope::Response(response) => response.abstract_syntax(),
        }
    }

    pub fn affected_sop_class_uid(&self) -> Option<&str> {
        match self {
            Envelope::Command(command) => command.affected_sop_class_uid(),
            Envelope::Response(response) => response.affected_sop_class_uid(),
        }
    }

    pub fn affected_sop_instance_uid(&self) -> Option<&str> {
        match self {
            Envelope::Command(command) => command.affected_sop_instance_uid(),
            Envelope::Response(response) => response.affected_sop_instance_uid(),
        }
    }

    /// Responses only carry affected UIDs
    pub fn requested_sop_class_uid(&self) -> Option<&str> {
        match self {
            Envelope::Command(command) => command.requested_sop_class_uid(),
            Envelope::Response(_) => None,
        }
    }

    pub fn requested_sop_instance_uid(&self) -> Option<&str> {
        match self {
            Envelope::Command(command) => command.requested_sop_instance_uid(),
            Envelope::Response(_) => None,
        }
    }

    pub fn payload_data_set(&self) -> Option<&DataSet> {
        match self {
            Envelope::Command(command) => command.payload_data_set(),
            Envelope::Response(response) => response.payload_data_set(),
        }
    }

    /// Build the group 0000 command set describing this message
    pub fn command_data_set(&self) -> DataSet {
        codec::command_set(self)
    }

    /// Whether the peer will answer this message
    pub fn expects_response(&self) -> bool {
        match self {
            Envelope::Command(command) => command.kind().expects_response(),
            Envelope::Response(_) => false,
        }
    }

    pub fn as_command(&self) -> Result<&Command> {
        match self {
            Envelope::Command(command) => Ok(command),
            Envelope::Response(response) => Err(DimseError::TypeMismatch {
                expected: "command",
                found: response.kind().name(),
            }),
        }
    }

    pub fn as_response(&self) -> Result<&Response> {
        match self {
            Envelope::Response(response) => Ok(response),
            Envelope::Command(command) => Err(DimseError::TypeMismatch {
                expected: "response",
                found: command.kind().name(),
            }),
        }
    }

    pub fn into_command(self) -> Result<Command> {
        match self {
            Envelope::Command(command) => Ok(command),
            Envelope::Response(response) => Err(DimseError::TypeMismatch {
                expected: "command",
                found: response.kind().name(),
            }),
        }
    }

    pub fn into_response(self) -> Result<Response> {
        match self {
            Envelope::Response(response) => Ok(response),
            Envelope::Command(command) => Err(DimseError::TypeMismatch {
                expected: "response",
                found: command.kind().name(),
            }),
        }
    }
}

impl From<Command> for Envelope {
    fn from(command: Command) -> Self {
        Envelope::Command(command)
    }
}

impl From<Response> for Envelope {
    fn from(response: Response) -> Self {
        Envelope::Response(response)
    }
}

/// Lets `service.send(CEchoCommand::new(..)?)` work without wrapping twice
macro_rules! envelope_from {
    ($($ty:ty => $wrap:ident),* $(,)?) => {
        $(
            impl From<$ty> for Envelope {
                fn from(message: $ty) -> Self {
                    Envelope::$wrap(message.into())
                }
            }
        )*
    };
}

envelope_from! {
    crate::command::CStoreCommand => Command,
    crate::command::CGetCommand => Command,
    crate::command::CFindCommand => Command,
    crate::command::CMoveCommand => Command,
    crate::command::CEchoCommand => Command,
    crate::command::CCancelCommand => Command,
    crate::command::NEventReportCommand => Command,
    crate::command::NGetCommand => Command,
    crate::command::NSetCommand => Command,
    crate::command::NActionCommand => Command,
    crate::command::NCreateCommand => Command,
    crate::command::NDeleteCommand => Command,
    crate::response::CStoreResponse => Response,
    crate::response::CGetResponse => Response,
    crate::response::CFindResponse => Response,
    crate::response::CMoveResponse => Response,
    crate::response::CEchoResponse => Response,
    crate::response::NEventReportResponse => Response,
    crate::response::NGetResponse => Response,
    crate::response::NSetResponse => Response,
    crate::response::NActionResponse => Response,
    crate::response::NCreateResponse => Response,
    crate::response::NDeleteResponse => Response,
}
