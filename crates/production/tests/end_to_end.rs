//! Federates talking to a live RTI over loopback sockets.

use futures::{SinkExt, StreamExt};
use rti_coordinator::ClockSyncConfig;
use rti_federate::{run_udp_clock_sync, ClockSyncEstimator, FederateConfig, FederateError, RtiClient};
use rti_messages::{Message, RejectReason, WireCodec};
use rti_production::network::PortSelection;
use rti_production::{start, RunningRti, ServerConfig};
use rti_test_helpers::{chain_topology, FEDERATION_ID};
use rti_types::{FederateId, Interval, Tag};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_util::codec::Framed;

const STEP: Duration = Duration::from_secs(5);

fn server_config() -> ServerConfig {
    ServerConfig::default()
        .with_host("127.0.0.1")
        .with_port(PortSelection::Fixed(0))
        .with_clock_sync(ClockSyncConfig::disabled())
}

async fn start_chain(n: usize) -> RunningRti {
    start(chain_topology(n, Interval::ZERO), server_config())
        .await
        .unwrap()
}

fn federate(rti: &RunningRti, id: u16) -> FederateConfig {
    FederateConfig::new(FederateId(id), FEDERATION_ID)
        .with_rti_host("127.0.0.1")
        .with_rti_port(rti.local_addr().port())
        .with_connect_retries(1, Duration::from_millis(10))
        .with_tcp_timeout(STEP)
}

async fn connect(rti: &RunningRti, id: u16) -> RtiClient {
    timeout(STEP, RtiClient::connect(federate(rti, id)))
        .await
        .unwrap()
        .unwrap()
}

async fn recv(client: &mut RtiClient) -> Message {
    timeout(STEP, client.recv()).await.unwrap().unwrap()
}

/// A connection that speaks the wire format without the client's handshake.
async fn raw(rti: &RunningRti) -> Framed<TcpStream, WireCodec> {
    let stream = TcpStream::connect(rti.local_addr()).await.unwrap();
    Framed::new(stream, WireCodec::federate_side())
}

async fn expect_reject_and_close(framed: &mut Framed<TcpStream, WireCodec>, reason: RejectReason) {
    let reply = timeout(STEP, framed.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(reply, Message::Reject(reason));
    let next = timeout(STEP, framed.next()).await.unwrap();
    assert!(next.is_none(), "connection should be closed, got {next:?}");
}

// ═══════════════════════════════════════════════════════════════════════════
// Handshake
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_join_is_acked() {
    let rti = start_chain(2).await;
    let client = connect(&rti, 0).await;
    assert_eq!(client.federate(), FederateId(0));
    assert_eq!(client.udp_port(), None);
}

#[tokio::test]
async fn test_join_ack_carries_clock_sync_port() {
    let rti = start(
        chain_topology(1, Interval::ZERO),
        server_config().with_clock_sync(ClockSyncConfig::default()),
    )
    .await
    .unwrap();
    let client = connect(&rti, 0).await;
    assert!(client.udp_port().is_some());
    assert_eq!(client.udp_port(), rti.udp_addr().map(|addr| addr.port()));
}

#[tokio::test]
async fn test_wrong_federation_id_is_rejected_and_closed() {
    let rti = start_chain(2).await;
    let mut framed = raw(&rti).await;
    framed
        .send(Message::Join {
            federate: FederateId(0),
            federation_id: "someone-else".to_string(),
        })
        .await
        .unwrap();
    expect_reject_and_close(&mut framed, RejectReason::FederationIdDoesNotMatch).await;
}

#[tokio::test]
async fn test_client_skips_rti_of_other_federation() {
    let rti = start_chain(2).await;
    let config = FederateConfig::new(FederateId(0), "someone-else")
        .with_rti_host("127.0.0.1")
        .with_rti_port(rti.local_addr().port())
        .with_connect_retries(1, Duration::from_millis(10))
        .with_tcp_timeout(STEP);
    let result = RtiClient::connect(config).await;
    assert!(matches!(result, Err(FederateError::RtiNotFound { .. })));
}

#[tokio::test]
async fn test_id_in_use_and_out_of_range_are_rejected() {
    let rti = start_chain(2).await;
    let _first = connect(&rti, 0).await;

    let duplicate = RtiClient::connect(federate(&rti, 0)).await;
    assert!(matches!(
        duplicate,
        Err(FederateError::Rejected(RejectReason::FederateIdInUse))
    ));

    let out_of_range = RtiClient::connect(federate(&rti, 7)).await;
    assert!(matches!(
        out_of_range,
        Err(FederateError::Rejected(RejectReason::FederateIdOutOfRange))
    ));
}

#[tokio::test]
async fn test_non_join_first_message_is_rejected() {
    let rti = start_chain(1).await;
    let mut framed = raw(&rti).await;
    framed
        .send(Message::NextEventTag(Tag::new(10, 0)))
        .await
        .unwrap();
    expect_reject_and_close(&mut framed, RejectReason::UnexpectedMessage).await;
}

#[tokio::test]
async fn test_unknown_message_type_is_rejected() {
    let rti = start_chain(1).await;
    let mut framed = raw(&rti).await;
    framed.get_mut().write_all(&[42]).await.unwrap();
    expect_reject_and_close(&mut framed, RejectReason::UnexpectedMessage).await;
}

#[tokio::test]
async fn test_non_utf8_federation_id_is_rejected() {
    let rti = start_chain(1).await;
    let mut framed = raw(&rti).await;
    framed
        .get_mut()
        .write_all(&[1, 0, 0, 2, 0xff, 0xfe])
        .await
        .unwrap();
    expect_reject_and_close(&mut framed, RejectReason::FederationIdDoesNotMatch).await;

    // The id was never taken.
    let client = connect(&rti, 0).await;
    assert_eq!(client.federate(), FederateId(0));
}

#[tokio::test]
async fn test_garbage_after_join_is_rejected() {
    let rti = start_chain(1).await;
    let mut framed = raw(&rti).await;
    framed
        .send(Message::Join {
            federate: FederateId(0),
            federation_id: FEDERATION_ID.to_string(),
        })
        .await
        .unwrap();
    let ack = timeout(STEP, framed.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(ack, Message::Ack { udp_port: None });

    framed.get_mut().write_all(&[42]).await.unwrap();
    expect_reject_and_close(&mut framed, RejectReason::UnexpectedMessage).await;
}

#[tokio::test]
async fn test_silent_connection_times_out() {
    let rti = start(
        chain_topology(1, Interval::ZERO),
        server_config().with_tcp_timeout(Duration::from_millis(100)),
    )
    .await
    .unwrap();
    let mut framed = raw(&rti).await;
    let next = timeout(STEP, framed.next()).await.unwrap();
    assert!(next.is_none());
}

#[tokio::test]
async fn test_rejoin_after_resign() {
    let rti = start_chain(2).await;
    connect(&rti, 0).await.resign().await.unwrap();

    // The resign and the new join travel on different connections.
    for _ in 0..50 {
        match RtiClient::connect(federate(&rti, 0)).await {
            Ok(client) => {
                assert_eq!(client.federate(), FederateId(0));
                return;
            }
            Err(FederateError::Rejected(RejectReason::FederateIdInUse)) => {
                sleep(Duration::from_millis(20)).await;
            }
            Err(e) => panic!("rejoin failed: {e}"),
        }
    }
    panic!("rejoin never accepted");
}

// ═══════════════════════════════════════════════════════════════════════════
// Time advance and stop
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_chain_grants_over_sockets() {
    let rti = start_chain(2).await;
    let mut upstream = connect(&rti, 0).await;
    let mut downstream = connect(&rti, 1).await;

    upstream.send_next_event(Tag::new(100, 0)).await.unwrap();
    assert_eq!(
        recv(&mut upstream).await,
        Message::TimeAdvanceGrant(Tag::new(100, 0))
    );

    downstream.send_next_event(Tag::new(150, 0)).await.unwrap();
    upstream.send_completed(Tag::new(100, 0)).await.unwrap();
    assert_eq!(
        recv(&mut downstream).await,
        Message::TimeAdvanceGrant(Tag::new(100, 0))
    );
}

#[tokio::test]
async fn test_upstream_resign_releases_downstream() {
    let rti = start_chain(2).await;
    let upstream = connect(&rti, 0).await;
    let mut downstream = connect(&rti, 1).await;

    downstream.send_next_event(Tag::new(300, 0)).await.unwrap();
    upstream.resign().await.unwrap();
    assert_eq!(
        recv(&mut downstream).await,
        Message::TimeAdvanceGrant(Tag::new(300, 0))
    );
}

#[tokio::test]
async fn test_stop_agrees_on_max_of_replies() {
    let rti = start_chain(2).await;
    let mut a = connect(&rti, 0).await;
    let mut b = connect(&rti, 1).await;

    a.send_stop_request(500).await.unwrap();
    assert_eq!(recv(&mut b).await, Message::StopRequest(500));

    b.send_stop_reply(480).await.unwrap();
    assert_eq!(recv(&mut a).await, Message::StopGranted(500));
    assert_eq!(recv(&mut b).await, Message::StopGranted(500));
}

#[tokio::test]
async fn test_start_time_broadcast() {
    let rti = start_chain(2).await;
    let mut a = connect(&rti, 0).await;
    let mut b = connect(&rti, 1).await;

    a.send_timestamp(1_000).await.unwrap();
    b.send_timestamp(2_000).await.unwrap();
    let expected = Message::Timestamp(2_000 + Interval::from_secs(1).as_nanos());
    assert_eq!(recv(&mut a).await, expected);
    assert_eq!(recv(&mut b).await, expected);
}

// ═══════════════════════════════════════════════════════════════════════════
// Forwarding and addresses
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_address_query_retries_until_advertised() {
    let rti = start_chain(2).await;
    let mut a = connect(&rti, 0).await;
    let mut b = connect(&rti, 1).await;

    let advertise = async {
        sleep(Duration::from_millis(300)).await;
        b.advertise_address(6000).await
    };
    let (address, advertised) = tokio::join!(a.query_address(FederateId(1)), advertise);
    advertised.unwrap();
    assert_eq!(address.unwrap(), (Ipv4Addr::LOCALHOST, 6000));
}

#[tokio::test]
async fn test_timed_message_forwarded() {
    use bytes::Bytes;
    use rti_messages::TimedMessage;
    use rti_types::PortId;

    let rti = start_chain(2).await;
    let mut a = connect(&rti, 0).await;
    let mut b = connect(&rti, 1).await;

    let message = TimedMessage {
        port: PortId(3),
        federate: FederateId(1),
        tag: Tag::new(42, 1),
        payload: Bytes::from_static(b"hello"),
    };
    a.send_timed_message(message.clone()).await.unwrap();
    assert_eq!(recv(&mut b).await, Message::TimedMessage(message));
}

// ═══════════════════════════════════════════════════════════════════════════
// Clock sync and teardown
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_clock_sync_adjusts_offset() {
    let clock_sync = ClockSyncConfig {
        enabled: true,
        period: Duration::from_millis(50),
        trials: 2,
        udp_timeout: Duration::from_secs(1),
    };
    let rti = start(
        chain_topology(1, Interval::ZERO),
        server_config().with_clock_sync(clock_sync),
    )
    .await
    .unwrap();
    let client = connect(&rti, 0).await;
    let udp_port = client.udp_port().unwrap();

    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let rti_udp = SocketAddr::from((Ipv4Addr::LOCALHOST, udp_port));
    let estimator = ClockSyncEstimator::new(Interval::from_millis(50), 2, 1);
    let (offset_tx, mut offset_rx) = watch::channel(0i64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(run_udp_clock_sync(
        socket,
        rti_udp,
        FederateId(0),
        estimator,
        offset_tx,
        shutdown_rx,
    ));

    timeout(STEP, offset_rx.changed()).await.unwrap().unwrap();
    // Same host, same clock: the estimate stays small.
    assert!(offset_rx.borrow().abs() < Interval::from_millis(50).as_nanos());

    shutdown_tx.send(true).unwrap();
    let estimator = task.await.unwrap().unwrap();
    assert!(estimator.round_trip().is_some());
}

#[tokio::test]
async fn test_rti_exits_when_all_resign() {
    let rti = start_chain(2).await;
    let a = connect(&rti, 0).await;
    let b = connect(&rti, 1).await;
    a.resign().await.unwrap();
    b.resign().await.unwrap();
    timeout(STEP, rti.wait()).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let rti = start_chain(1).await;
    let mut client = connect(&rti, 0).await;
    rti.shutdown();
    let result = timeout(STEP, client.recv()).await.unwrap();
    assert!(matches!(result, Err(FederateError::ConnectionClosed)));
    timeout(STEP, rti.wait()).await.unwrap().unwrap();
}
