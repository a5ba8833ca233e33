use std::collections::HashSet;
use std::time::Duration;

use dicom_core::{dicom_value, DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::tags;
use dimse_service::dimse::{
    memory_pair, status_codes, CEchoCommand, CEchoResponse, CFindCommand, CFindResponse,
    CMoveCommand, CMoveResponse, Command, CommandKind, DataSet, DataSetMessage, DimseConfig,
    DimseError, DimseService, DimseStatus, Envelope, EnvelopeWriter, NCreateCommand,
    NCreateResponse, Priority, SubOperations,
};
use futures_util::StreamExt;

const VERIFICATION: &str = "1.2.840.10008.1.1";
const STUDY_ROOT_FIND: &str = "1.2.840.10008.5.1.4.1.2.2.1";
const STUDY_ROOT_MOVE: &str = "1.2.840.10008.5.1.4.1.2.2.2";
const MPPS: &str = "1.2.840.10008.3.1.2.3.3";

fn config(local: &str, peer: &str) -> DimseConfig {
    DimseConfig {
        local_aet: local.to_string(),
        peer_aet: peer.to_string(),
        ..DimseConfig::default()
    }
}

/// Two services talking to each other over an in-memory association
fn connect() -> (DimseService, DimseService) {
    let (a, b) = memory_pair();
    let scu = DimseService::new(config("SCU", "SCP"), a.reader, a.writer).unwrap();
    let scp = DimseService::new(config("SCP", "SCU"), b.reader, b.writer).unwrap();
    (scu, scp)
}

fn patient(id: &str) -> DataSet {
    DataSet::from_element_iter([DataElement::new(
        tags::PATIENT_ID,
        VR::LO,
        PrimitiveValue::from(id),
    )])
}

fn patient_id(data_set: &DataSet) -> String {
    data_set
        .get(tags::PATIENT_ID)
        .unwrap()
        .to_str()
        .unwrap()
        .trim()
        .to_string()
}

#[tokio::test(flavor = "multi_thread")]
async fn echo_round_trip_between_services() {
    let (scu, scp) = connect();

    // the provider works on a clone so the association outlives its task
    let provider = {
        let scp = scp.clone();
        tokio::spawn(async move {
            let command = scp.get_command().await.unwrap();
            let echo = command.as_c_echo().unwrap();
            assert_eq!(echo.abstract_syntax(), VERIFICATION);
            assert_eq!(echo.header().affected_sop_class_uid(), Some(VERIFICATION));
            scp.send(CEchoResponse::new(echo, status_codes::SUCCESS).unwrap())
                .await
                .unwrap();
        })
    };

    let echo = CEchoCommand::new(VERIFICATION, scu.next_command_id(), VERIFICATION).unwrap();
    tokio_test::assert_ok!(scu.send(echo.clone()).await);
    let response = scu.get_c_echo_response(&echo).await.unwrap();

    assert_eq!(response.status(), DimseStatus::Success);
    assert_eq!(response.message_id_being_responded_to(), echo.message_id());
    provider.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn find_returns_pending_responses_in_order_then_retires() {
    let (scu, scp) = connect();

    let provider = {
        let scp = scp.clone();
        tokio::spawn(async move {
            let command = scp.get_command().await.unwrap();
            let find = command.as_c_find().unwrap();
            for id in ["P1", "P2", "P3"] {
                scp.send(CFindResponse::pending(find, patient(id)).unwrap())
                    .await
                    .unwrap();
            }
            scp.send(CFindResponse::new(find, status_codes::SUCCESS).unwrap())
                .await
                .unwrap();
        })
    };

    let find = CFindCommand::new(
        STUDY_ROOT_FIND,
        scu.next_command_id(),
        Priority::Medium,
        STUDY_ROOT_FIND,
        patient("*"),
    )
    .unwrap();
    scu.send(find.clone()).await.unwrap();

    let mut matches = Vec::new();
    loop {
        let response = scu.get_c_find_response(&find).await.unwrap();
        if response.status().is_terminal() {
            assert_eq!(response.status(), DimseStatus::Success);
            break;
        }
        // the ID stays registered while responses are pending
        assert_eq!(scu.outstanding_commands(), vec![find.message_id()]);
        matches.push(patient_id(response.identifier().unwrap()));
    }

    assert_eq!(matches, vec!["P1", "P2", "P3"]);
    assert!(scu.outstanding_commands().is_empty());
    assert!(matches!(
        scu.get_c_find_response(&find).await,
        Err(DimseError::UnknownCommand(_))
    ));
    provider.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn move_responses_stream_ends_after_terminal() {
    let (scu, scp) = connect();

    let provider = {
        let scp = scp.clone();
        tokio::spawn(async move {
            let command = scp.get_command().await.unwrap();
            let mv = command.as_c_move().unwrap();
            assert_eq!(mv.destination_aet(), "ARCHIVE");
            for completed in 1..=2 {
                let counters = SubOperations::new(2 - completed, completed, 0, 0);
                scp.send(CMoveResponse::new(mv, status_codes::PENDING, counters, None).unwrap())
                    .await
                    .unwrap();
            }
            let done = SubOperations::new(0, 2, 0, 0);
            scp.send(CMoveResponse::new(mv, status_codes::SUCCESS, done, None).unwrap())
                .await
                .unwrap();
        })
    };

    let mv = CMoveCommand::new(
        STUDY_ROOT_MOVE,
        scu.next_command_id(),
        Priority::High,
        STUDY_ROOT_MOVE,
        "ARCHIVE",
        patient("P1"),
    )
    .unwrap();
    scu.send(mv.clone()).await.unwrap();

    let responses: Vec<_> = scu.responses(&Command::from(mv)).collect().await;
    assert_eq!(responses.len(), 3);

    let counters: Vec<_> = responses
        .iter()
        .map(|r| r.as_ref().unwrap().sub_operations().unwrap())
        .collect();
    assert_eq!(counters[0], SubOperations::new(1, 1, 0, 0));
    assert_eq!(counters[2], SubOperations::new(0, 2, 0, 0));
    assert!(responses[2].as_ref().unwrap().is_terminal());
    assert!(scu.outstanding_commands().is_empty());
    provider.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_callers_receive_only_their_own_responses() {
    const CALLERS: usize = 32;
    let (scu, scp) = connect();

    // answer in reverse order of arrival
    let provider = {
        let scp = scp.clone();
        tokio::spawn(async move {
            let mut commands = Vec::new();
            for _ in 0..CALLERS {
                commands.push(scp.get_command().await.unwrap());
            }
            for command in commands.iter().rev() {
                let echo = command.as_c_echo().unwrap();
                scp.send(CEchoResponse::new(echo, status_codes::SUCCESS).unwrap())
                    .await
                    .unwrap();
            }
        })
    };

    let callers: Vec<_> = (0..CALLERS)
        .map(|_| {
            let scu = scu.clone();
            tokio::spawn(async move {
                let echo =
                    CEchoCommand::new(VERIFICATION, scu.next_command_id(), VERIFICATION).unwrap();
                scu.send(echo.clone()).await.unwrap();
                let response = scu.get_c_echo_response(&echo).await.unwrap();
                assert_eq!(response.message_id_being_responded_to(), echo.message_id());
                echo.message_id()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for caller in callers {
        let id = tokio::time::timeout(Duration::from_secs(5), caller)
            .await
            .expect("caller never got its response")
            .unwrap();
        assert!(ids.insert(id));
    }
    assert_eq!(ids.len(), CALLERS);
    provider.await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn message_ids_are_unique_under_concurrency() {
    let (scu, _scp) = connect();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let scu = scu.clone();
            tokio::spawn(async move { (0..200).map(|_| scu.next_command_id()).collect::<Vec<_>>() })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            assert_ne!(id, 0);
            assert!(seen.insert(id), "message ID {} handed out twice", id);
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn stray_response_is_reported_to_command_callers() {
    let (a, mut peer) = memory_pair();
    let service = DimseService::new(config("SCU", "SCP"), a.reader, a.writer).unwrap();

    let never_sent = CEchoCommand::new(VERIFICATION, 999, VERIFICATION).unwrap();
    let stray = CEchoResponse::new(&never_sent, status_codes::SUCCESS).unwrap();
    peer.writer.send(&Envelope::from(stray)).await.unwrap();

    assert!(matches!(
        service.get_command().await,
        Err(DimseError::UnknownCommand(999))
    ));
    assert!(!service.is_closed());

    // the association keeps working afterwards
    let echo = CEchoCommand::new(VERIFICATION, 1, VERIFICATION).unwrap();
    peer.writer.send(&Envelope::from(echo.clone())).await.unwrap();
    assert_eq!(service.get_command().await.unwrap(), Command::from(echo));
}

#[tokio::test(flavor = "multi_thread")]
async fn n_create_response_carries_assigned_instance_uid() {
    let (scu, scp) = connect();

    let provider = {
        let scp = scp.clone();
        tokio::spawn(async move {
            let command = scp.get_command().await.unwrap();
            let create = command.as_n_create().unwrap();
            assert_eq!(create.header().affected_sop_instance_uid(), None);
            let response =
                NCreateResponse::success(create, Some("1.2.826.0.1.3680043.2.1".into()), None).unwrap();
            scp.send(response).await.unwrap();
        })
    };

    let create = NCreateCommand::new(MPPS, scu.next_command_id(), MPPS, None, Some(patient("P9")))
        .unwrap();
    scu.send(create.clone()).await.unwrap();
    let response = scu.get_n_create_response(&create).await.unwrap();

    assert_eq!(
        response.header().affected_sop_instance_uid(),
        Some("1.2.826.0.1.3680043.2.1")
    );
    provider.await.unwrap();
}

/// A successful N-CREATE response that leaves out the affected SOP instance UID
fn bare_n_create_success(message_id: u16) -> DataSetMessage {
    DataSetMessage {
        abstract_syntax: MPPS.to_string(),
        command: DataSet::command_from_element_iter([
            DataElement::new(tags::AFFECTED_SOP_CLASS_UID, VR::UI, PrimitiveValue::from(MPPS)),
            DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [0x8140])),
            DataElement::new(
                tags::MESSAGE_ID_BEING_RESPONDED_TO,
                VR::US,
                dicom_value!(U16, [message_id]),
            ),
            DataElement::new(tags::STATUS, VR::US, dicom_value!(U16, [status_codes::SUCCESS])),
            DataElement::new(tags::COMMAND_DATA_SET_TYPE, VR::US, dicom_value!(U16, [0x0101])),
        ]),
        payload: None,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn n_create_response_without_instance_uid_keeps_association_open() {
    let (a, peer) = memory_pair();
    let scu = DimseService::new(config("SCU", "SCP"), a.reader, a.writer).unwrap();

    let named = NCreateCommand::new(
        MPPS,
        scu.next_command_id(),
        MPPS,
        Some("1.2.826.0.1.7".into()),
        None,
    )
    .unwrap();
    let anonymous = NCreateCommand::new(MPPS, scu.next_command_id(), MPPS, None, None).unwrap();
    scu.send(named.clone()).await.unwrap();
    scu.send(anonymous.clone()).await.unwrap();

    for command in [&named, &anonymous] {
        peer.writer
            .inject_raw(bare_n_create_success(command.message_id()))
            .await
            .unwrap();
    }

    // the UID named by the request is taken over
    let response = scu.get_n_create_response(&named).await.unwrap();
    assert_eq!(response.status(), DimseStatus::Success);
    assert_eq!(
        response.header().affected_sop_instance_uid(),
        Some("1.2.826.0.1.7")
    );

    // nobody named the instance, only this caller sees the error
    assert!(matches!(
        scu.get_n_create_response(&anonymous).await,
        Err(DimseError::InvalidCommand(_))
    ));
    assert!(!scu.is_closed());
    assert!(scu.outstanding_commands().is_empty());
}

#[test]
fn c_move_without_destination_is_rejected() {
    let result = CMoveCommand::new(
        STUDY_ROOT_MOVE,
        1,
        Priority::Medium,
        STUDY_ROOT_MOVE,
        "",
        DataSet::new_empty(),
    );
    assert!(matches!(result, Err(DimseError::InvalidCommand(_))));
}

#[test]
fn c_store_accessor_on_find_is_a_type_mismatch() {
    let find = CFindCommand::new(
        STUDY_ROOT_FIND,
        1,
        Priority::Medium,
        STUDY_ROOT_FIND,
        DataSet::new_empty(),
    )
    .unwrap();
    let command = Command::from(find);

    assert!(matches!(
        command.as_c_store(),
        Err(DimseError::TypeMismatch { expected: "C-STORE", found: "C-FIND" })
    ));
    assert_eq!(command.kind(), CommandKind::CFind);
    assert!(command.as_c_find().is_ok());
}
