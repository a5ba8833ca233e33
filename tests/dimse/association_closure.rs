use std::time::Duration;

use dimse_service::dimse::{
    memory_pair, CEchoCommand, CFindCommand, DataSet, DataSetMessage, DimseConfig, DimseError,
    DimseService, Priority,
};

const VERIFICATION: &str = "1.2.840.10008.1.1";
const STUDY_ROOT_FIND: &str = "1.2.840.10008.5.1.4.1.2.2.1";

fn find(message_id: u16) -> CFindCommand {
    CFindCommand::new(
        STUDY_ROOT_FIND,
        message_id,
        Priority::Medium,
        STUDY_ROOT_FIND,
        DataSet::new_empty(),
    )
    .unwrap()
}

async fn assert_closed_soon<T: std::fmt::Debug>(handle: tokio::task::JoinHandle<Result<T, DimseError>>) {
    let result = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("waiter still blocked after the association ended")
        .unwrap();
    assert!(
        matches!(result, Err(DimseError::AssociationClosed)),
        "expected AssociationClosed, got {:?}",
        result
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn peer_end_of_stream_wakes_every_waiter() {
    let (local, peer) = memory_pair();
    let service = DimseService::new(DimseConfig::default(), local.reader, local.writer).unwrap();

    let mut response_waiters = Vec::new();
    for _ in 0..5 {
        let command = find(service.next_command_id());
        service.send(command.clone()).await.unwrap();
        let service = service.clone();
        response_waiters
            .push(tokio::spawn(async move { service.get_c_find_response(&command).await }));
    }
    let command_waiter = {
        let service = service.clone();
        tokio::spawn(async move { service.get_command().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // the peer goes away
    drop(peer);

    for waiter in response_waiters {
        assert_closed_soon(waiter).await;
    }
    assert_closed_soon(command_waiter).await;
    assert!(service.is_closed());
    assert!(service.outstanding_commands().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn local_close_reaches_the_peer() {
    let (a, b) = memory_pair();
    let scu = DimseService::new(DimseConfig::default(), a.reader, a.writer).unwrap();
    let scp = DimseService::new(DimseConfig::default(), b.reader, b.writer).unwrap();

    let provider = {
        let scp = scp.clone();
        tokio::spawn(async move { scp.get_command().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    scu.close().await.unwrap();

    assert_closed_soon(provider).await;
    assert!(scp.is_closed());
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_message_closes_the_service() {
    let (local, peer) = memory_pair();
    let service = DimseService::new(DimseConfig::default(), local.reader, local.writer).unwrap();

    let command = find(service.next_command_id());
    service.send(command.clone()).await.unwrap();
    let waiter = {
        let service = service.clone();
        tokio::spawn(async move { service.get_c_find_response(&command).await })
    };

    // a command set without a command field
    peer.writer
        .inject_raw(DataSetMessage {
            abstract_syntax: STUDY_ROOT_FIND.to_string(),
            command: DataSet::new_empty(),
            payload: None,
        })
        .await
        .unwrap();

    assert_closed_soon(waiter).await;
    assert!(service.is_closed());
}

#[tokio::test(flavor = "multi_thread")]
async fn every_operation_fails_identically_after_close() {
    let (local, _peer) = memory_pair();
    let service = DimseService::new(DimseConfig::default(), local.reader, local.writer).unwrap();

    let echo = CEchoCommand::new(VERIFICATION, service.next_command_id(), VERIFICATION).unwrap();
    service.send(echo.clone()).await.unwrap();
    service.close().await.unwrap();

    for _ in 0..2 {
        tokio_test::assert_err!(service.send(echo.clone()).await);
        assert!(matches!(
            service.send(echo.clone()).await,
            Err(DimseError::AssociationClosed)
        ));
        assert!(matches!(
            service.get_command().await,
            Err(DimseError::AssociationClosed)
        ));
        assert!(matches!(
            service.get_c_echo_response(&echo).await,
            Err(DimseError::AssociationClosed)
        ));
    }
    assert!(service.close().await.is_ok());
}
