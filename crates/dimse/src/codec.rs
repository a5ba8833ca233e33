//! Conversion between envelopes and DIMSE command sets
//!
//! A DIMSE message travels as a group 0000 command set, encoded in implicit
//! VR little endian by the association layer, optionally followed by a data
//! set in the negotiated transfer syntax. This module only deals with the
//! in-memory objects; byte encoding belongs to the association.

use std::borrow::Cow;

use dicom_core::{dicom_value, DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::mem::InMemElement;

use crate::command::{
    CCancelCommand, CEchoCommand, CFindCommand, CGetCommand, CMoveCommand, CStoreCommand, Command,
    NActionCommand, NCreateCommand, NDeleteCommand, NEventReportCommand, NGetCommand, NSetCommand,
};
use crate::envelope::Envelope;
use crate::error::{DimseError, Result};
use crate::response::{
    CEchoResponse, CFindResponse, CGetResponse, CMoveResponse, CStoreResponse, NActionResponse,
    NCreateResponse, NDeleteResponse, NEventReportResponse, NGetResponse, NSetResponse, Response,
    ResponseHeader,
};
use crate::types::{CommandKind, DataSet, Priority, SubOperations};

/// Command Data Set Type (0000,0800) when no data set follows
pub const NO_DATA_SET: u16 = 0x0101;

/// Command Data Set Type written when a data set follows
pub const DATA_SET_PRESENT: u16 = 0x0000;

/// A DIMSE message as handed to or received from the association
#[derive(Debug, Clone, PartialEq)]
pub struct DataSetMessage {
    /// Abstract syntax of the presentation context the message travels on
    pub abstract_syntax: String,
    pub command: DataSet,
    pub payload: Option<DataSet>,
}

/// Split an envelope into its command set and payload
pub fn encode(envelope: &Envelope) -> DataSetMessage {
    DataSetMessage {
        abstract_syntax: envelope.abstract_syntax().to_string(),
        command: command_set(envelope),
        payload: envelope.payload_data_set().cloned(),
    }
}

fn us(tag: Tag, value: u16) -> InMemElement {
    DataElement::new(tag, VR::US, dicom_value!(U16, [value]))
}

fn ui(tag: Tag, uid: &str) -> InMemElement {
    DataElement::new(tag, VR::UI, PrimitiveValue::from(uid))
}

fn ae(tag: Tag, aet: &str) -> InMemElement {
    DataElement::new(tag, VR::AE, PrimitiveValue::from(aet))
}

fn tag_list(tag: Tag, list: &[Tag]) -> InMemElement {
    DataElement::new(tag, VR::AT, PrimitiveValue::Tags(list.iter().copied().collect()))
}

/// Build the command set of an envelope
pub(crate) fn command_set(envelope: &Envelope) -> DataSet {
    let mut elements = Vec::new();

    if let Some(uid) = envelope.affected_sop_class_uid() {
        elements.push(ui(tags::AFFECTED_SOP_CLASS_UID, uid));
    }
    if let Some(uid) = envelope.affected_sop_instance_uid() {
        elements.push(ui(tags::AFFECTED_SOP_INSTANCE_UID, uid));
    }
    if let Some(uid) = envelope.requested_sop_class_uid() {
        elements.push(ui(tags::REQUESTED_SOP_CLASS_UID, uid));
    }
    if let Some(uid) = envelope.requested_sop_instance_uid() {
        elements.push(ui(tags::REQUESTED_SOP_INSTANCE_UID, uid));
    }

    let data_set_type = if envelope.payload_data_set().is_some() {
        DATA_SET_PRESENT
    } else {
        NO_DATA_SET
    };
    elements.push(us(tags::COMMAND_DATA_SET_TYPE, data_set_type));

    match envelope {
        Envelope::Command(command) => command_fields(command, &mut elements),
        Envelope::Response(response) => response_fields(response, &mut elements),
    }

    DataSet::command_from_element_iter(elements)
}

fn command_fields(command: &Command, elements: &mut Vec<InMemElement>) {
    let kind = command.kind();
    elements.push(us(tags::COMMAND_FIELD, kind.command_field()));

    // C-CANCEL identifies the operation it cancels, not itself
    if kind == CommandKind::CCancel {
        elements.push(us(tags::MESSAGE_ID_BEING_RESPONDED_TO, command.message_id()));
    } else {
        elements.push(us(tags::MESSAGE_ID, command.message_id()));
    }

    if let Some(priority) = command.priority() {
        elements.push(us(tags::PRIORITY, priority.code()));
    }

    match command {
        Command::CStore(store) => {
            if let Some(aet) = store.originator_aet() {
                elements.push(ae(tags::MOVE_ORIGINATOR_APPLICATION_ENTITY_TITLE, aet));
            }
            if let Some(id) = store.originator_message_id() {
                elements.push(us(tags::MOVE_ORIGINATOR_MESSAGE_ID, id));
            }
        }
        Command::CMove(mv) => elements.push(ae(tags::MOVE_DESTINATION, mv.destination_aet())),
        Command::NEventReport(report) => {
            elements.push(us(tags::EVENT_TYPE_ID, report.event_type_id()))
        }
        Command::NAction(action) => {
            elements.push(us(tags::ACTION_TYPE_ID, action.action_type_id()))
        }
        Command::NGet(get) if !get.attribute_identifiers().is_empty() => elements.push(tag_list(
            tags::ATTRIBUTE_IDENTIFIER_LIST,
            get.attribute_identifiers(),
        )),
        _ => {}
    }
}

fn response_fields(response: &Response, elements: &mut Vec<InMemElement>) {
    let kind = response.kind();
    // every kind except C-CANCEL has a response field and C-CANCEL never builds a response
    elements.push(us(
        tags::COMMAND_FIELD,
        kind.response_field().unwrap_or(kind.command_field() | 0x8000),
    ));
    elements.push(us(tags::MESSAGE_ID_BEING_RESPONDED_TO, response.message_id()));
    elements.push(us(tags::STATUS, response.status_code()));

    if let Some(sub) = response.sub_operations() {
        elements.push(us(tags::NUMBER_OF_REMAINING_SUBOPERATIONS, sub.remaining));
        elements.push(us(tags::NUMBER_OF_COMPLETED_SUBOPERATIONS, sub.completed));
        elements.push(us(tags::NUMBER_OF_FAILED_SUBOPERATIONS, sub.failed));
        elements.push(us(tags::NUMBER_OF_WARNING_SUBOPERATIONS, sub.warning));
    }

    match response {
        Response::NEventReport(report) => {
            if let Some(id) = report.event_type_id() {
                elements.push(us(tags::EVENT_TYPE_ID, id));
            }
        }
        Response::NAction(action) => {
            if let Some(id) = action.action_type_id() {
                elements.push(us(tags::ACTION_TYPE_ID, id));
            }
        }
        Response::NSet(set) if !set.modified_attributes().is_empty() => elements.push(tag_list(
            tags::ATTRIBUTE_IDENTIFIER_LIST,
            set.modified_attributes(),
        )),
        _ => {}
    }
}

/// Read-only view over a received command set
struct Fields<'a> {
    command: &'a DataSet,
}

impl<'a> Fields<'a> {
    fn optional_u16(&self, tag: Tag, name: &str) -> Result<Option<u16>> {
        match self.command.get(tag) {
            None => Ok(None),
            Some(elem) => elem
                .to_int::<u16>()
                .map(Some)
                .map_err(|e| DimseError::malformed(format!("{}: {}", name, e))),
        }
    }

    fn required_u16(&self, tag: Tag, name: &str) -> Result<u16> {
        self.optional_u16(tag, name)?
            .ok_or_else(|| DimseError::malformed(format!("missing {}", name)))
    }

    /// Absent counters read as zero
    fn counter(&self, tag: Tag, name: &str) -> Result<u16> {
        Ok(self.optional_u16(tag, name)?.unwrap_or(0))
    }

    fn optional_str(&self, tag: Tag, name: &str) -> Result<Option<String>> {
        let Some(elem) = self.command.get(tag) else {
            return Ok(None);
        };
        let value: Cow<str> = elem
            .to_str()
            .map_err(|e| DimseError::malformed(format!("{}: {}", name, e)))?;
        let value = value.trim_end_matches(['\0', ' ']).trim_start();
        if value.is_empty() {
            Ok(None)
        } else {
            Ok(Some(value.to_string()))
        }
    }

    /// Missing UIDs are left to the constructors, which reject them
    fn uid(&self, tag: Tag, name: &str) -> Result<String> {
        Ok(self.optional_str(tag, name)?.unwrap_or_default())
    }

    fn tags(&self, tag: Tag, name: &str) -> Result<Vec<Tag>> {
        let Some(elem) = self.command.get(tag) else {
            return Ok(Vec::new());
        };
        match elem.value().primitive() {
            Some(PrimitiveValue::Tags(list)) => Ok(list.to_vec()),
            Some(PrimitiveValue::Empty) => Ok(Vec::new()),
            _ => Err(DimseError::malformed(format!("{} is not a tag list", name))),
        }
    }

    fn priority(&self) -> Result<Priority> {
        Priority::from_code(self.required_u16(tags::PRIORITY, "Priority")?)
    }
}

fn require_payload(payload: Option<DataSet>, kind: CommandKind) -> Result<DataSet> {
    payload.ok_or_else(|| DimseError::malformed(format!("{} without a data set", kind)))
}

/// Rebuild an envelope from a received message
pub fn decode(message: DataSetMessage) -> Result<Envelope> {
    let DataSetMessage {
        abstract_syntax,
        command,
        payload,
    } = message;
    let fields = Fields { command: &command };

    let field = fields.required_u16(tags::COMMAND_FIELD, "Command Field")?;
    let (kind, is_response) = CommandKind::from_command_field(field).ok_or_else(|| {
        DimseError::malformed(format!("unknown command field 0x{:04X}", field))
    })?;

    let data_set_type = fields
        .optional_u16(tags::COMMAND_DATA_SET_TYPE, "Command Data Set Type")?
        .unwrap_or(NO_DATA_SET);
    if data_set_type != NO_DATA_SET && payload.is_none() {
        return Err(DimseError::malformed(format!(
            "{} announces a data set that is missing",
            kind
        )));
    }

    if is_response {
        decode_response(kind, abstract_syntax, &fields, payload).map(Envelope::Response)
    } else {
        decode_command(kind, abstract_syntax, &fields, payload).map(Envelope::Command)
    }
}

fn decode_command(
    kind: CommandKind,
    abstract_syntax: String,
    fields: &Fields<'_>,
    payload: Option<DataSet>,
) -> Result<Command> {
    let message_id = || fields.required_u16(tags::MESSAGE_ID, "Message ID");
    let affected_class = || fields.uid(tags::AFFECTED_SOP_CLASS_UID, "Affected SOP Class UID");
    let affected_instance =
        || fields.uid(tags::AFFECTED_SOP_INSTANCE_UID, "Affected SOP Instance UID");
    let requested_class = || fields.uid(tags::REQUESTED_SOP_CLASS_UID, "Requested SOP Class UID");
    let requested_instance =
        || fields.uid(tags::REQUESTED_SOP_INSTANCE_UID, "Requested SOP Instance UID");

    let command: Command = match kind {
        // C-CANCEL identifies the operation it cancels, not itself
        CommandKind::CCancel => CCancelCommand::new(
            abstract_syntax,
            fields.required_u16(
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                "Message ID Being Responded To",
            )?,
        )?
        .into(),
        CommandKind::CStore => {
            let mut store = CStoreCommand::new(
                abstract_syntax,
                message_id()?,
                fields.priority()?,
                affected_class()?,
                affected_instance()?,
                require_payload(payload, kind)?,
            )?;
            let originator = fields.optional_str(
                tags::MOVE_ORIGINATOR_APPLICATION_ENTITY_TITLE,
                "Move Originator AET",
            )?;
            let originator_id =
                fields.optional_u16(tags::MOVE_ORIGINATOR_MESSAGE_ID, "Move Originator Message ID")?;
            if let (Some(aet), Some(originator_id)) = (originator, originator_id) {
                store = store.with_move_originator(aet, originator_id)?;
            }
            store.into()
        }
        CommandKind::CGet => CGetCommand::new(
            abstract_syntax,
            message_id()?,
            fields.priority()?,
            affected_class()?,
            require_payload(payload, kind)?,
        )?
        .into(),
        CommandKind::CFind => CFindCommand::new(
            abstract_syntax,
            message_id()?,
            fields.priority()?,
            affected_class()?,
            require_payload(payload, kind)?,
        )?
        .into(),
        CommandKind::CMove => CMoveCommand::new(
            abstract_syntax,
            message_id()?,
            fields.priority()?,
            affected_class()?,
            fields
                .optional_str(tags::MOVE_DESTINATION, "Move Destination")?
                .unwrap_or_default(),
            require_payload(payload, kind)?,
        )?
        .into(),
        CommandKind::CEcho => {
            CEchoCommand::new(abstract_syntax, message_id()?, affected_class()?)?.into()
        }
        CommandKind::NEventReport => NEventReportCommand::new(
            abstract_syntax,
            message_id()?,
            affected_class()?,
            affected_instance()?,
            fields.required_u16(tags::EVENT_TYPE_ID, "Event Type ID")?,
            payload,
        )?
        .into(),
        CommandKind::NGet => NGetCommand::new(
            abstract_syntax,
            message_id()?,
            requested_class()?,
            requested_instance()?,
            fields.tags(tags::ATTRIBUTE_IDENTIFIER_LIST, "Attribute Identifier List")?,
        )?
        .into(),
        CommandKind::NSet => NSetCommand::new(
            abstract_syntax,
            message_id()?,
            requested_class()?,
            requested_instance()?,
            require_payload(payload, kind)?,
        )?
        .into(),
        CommandKind::NAction => NActionCommand::new(
            abstract_syntax,
            message_id()?,
            requested_class()?,
            requested_instance()?,
            fields.required_u16(tags::ACTION_TYPE_ID, "Action Type ID")?,
            payload,
        )?
        .into(),
        CommandKind::NCreate => NCreateCommand::new(
            abstract_syntax,
            message_id()?,
            affected_class()?,
            fields.optional_str(tags::AFFECTED_SOP_INSTANCE_UID, "Affected SOP Instance UID")?,
            payload,
        )?
        .into(),
        CommandKind::NDelete => {
            NDeleteCommand::new(
                abstract_syntax,
                message_id()?,
                requested_class()?,
                requested_instance()?,
            )?
            .into()
        }
    };
    Ok(command)
}

fn decode_response(
    kind: CommandKind,
    abstract_syntax: String,
    fields: &Fields<'_>,
    payload: Option<DataSet>,
) -> Result<Response> {
    if abstract_syntax.trim().is_empty() {
        return Err(DimseError::invalid_command("abstract syntax is required"));
    }

    let header = ResponseHeader {
        abstract_syntax,
        message_id_being_responded_to: fields.required_u16(
            tags::MESSAGE_ID_BEING_RESPONDED_TO,
            "Message ID Being Responded To",
        )?,
        status_code: fields.required_u16(tags::STATUS, "Status")?,
        affected_sop_class_uid: fields
            .optional_str(tags::AFFECTED_SOP_CLASS_UID, "Affected SOP Class UID")?,
        affected_sop_instance_uid: fields
            .optional_str(tags::AFFECTED_SOP_INSTANCE_UID, "Affected SOP Instance UID")?,
        payload,
    };

    let sub_operations = || -> Result<SubOperations> {
        Ok(SubOperations::new(
            fields.counter(tags::NUMBER_OF_REMAINING_SUBOPERATIONS, "Remaining Sub-operations")?,
            fields.counter(tags::NUMBER_OF_COMPLETED_SUBOPERATIONS, "Completed Sub-operations")?,
            fields.counter(tags::NUMBER_OF_FAILED_SUBOPERATIONS, "Failed Sub-operations")?,
            fields.counter(tags::NUMBER_OF_WARNING_SUBOPERATIONS, "Warning Sub-operations")?,
        ))
    };

    let response: Response = match kind {
        CommandKind::CStore => CStoreResponse { header }.into(),
        CommandKind::CGet => CGetResponse {
            header,
            sub_operations: sub_operations()?,
        }
        .into(),
        CommandKind::CFind => CFindResponse { header }.into(),
        CommandKind::CMove => CMoveResponse {
            header,
            sub_operations: sub_operations()?,
        }
        .into(),
        CommandKind::CEcho => CEchoResponse { header }.into(),
        CommandKind::NEventReport => NEventReportResponse {
            header,
            event_type_id: fields.optional_u16(tags::EVENT_TYPE_ID, "Event Type ID")?,
        }
        .into(),
        CommandKind::NGet => NGetResponse { header }.into(),
        CommandKind::NSet => NSetResponse {
            header,
            modified_attributes: fields
                .tags(tags::ATTRIBUTE_IDENTIFIER_LIST, "Attribute Identifier List")?,
        }
        .into(),
        CommandKind::NAction => NActionResponse {
            header,
            action_type_id: fields.optional_u16(tags::ACTION_TYPE_ID, "Action Type ID")?,
        }
        .into(),
        CommandKind::NCreate => NCreateResponse { header }.into(),
        CommandKind::NDelete => NDeleteResponse { header }.into(),
        CommandKind::CCancel => {
            return Err(DimseError::malformed("C-CANCEL has no response"));
        }
    };

    response.validate()?;
    Ok(response)
}
