//! Tests driving a single ConnectionSession directly

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

use tcprelay::logging::RecordingLog;
use tcprelay::relay::{ConnectionSession, SessionState};
use tcprelay::{ProxyConfig, RemoteEndpoint, ShutdownCoordinator};

/// Returns (client side, server side) of a fresh local connection
async fn client_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let client = TcpStream::connect(listener.local_addr().unwrap())
        .await
        .unwrap();
    let (server_side, _) = listener.accept().await.unwrap();
    (client, server_side)
}

fn config(remotes: Vec<RemoteEndpoint>) -> Arc<ProxyConfig> {
    Arc::new(ProxyConfig {
        remotes,
        timeout: Duration::from_secs(5),
        ..ProxyConfig::default()
    })
}

#[tokio::test]
async fn test_no_reachable_remote_closes_client_without_pumps() {
    let dead = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        RemoteEndpoint::new("127.0.0.1", listener.local_addr().unwrap().port())
    };
    let (mut client, server_side) = client_pair().await;
    let client_addr = server_side.peer_addr().unwrap();

    let log = Arc::new(RecordingLog::new());
    let coordinator = ShutdownCoordinator::new();
    let session = ConnectionSession::new("s1".to_string(), client_addr, config(vec![dead]), log.clone());
    assert_eq!(session.state(), SessionState::Connecting);

    let summary = timeout(
        Duration::from_secs(5),
        session.run(server_side, coordinator.subscribe()),
    )
    .await
    .unwrap();

    assert_eq!(summary.final_state, SessionState::Closed);
    assert_eq!(summary.remotes_connected, 0);
    assert!(!summary.relayed());
    assert!(summary.drained_by.is_none());

    let mut buf = [0u8; 8];
    let n = client.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0);

    assert!(log
        .warnings()
        .iter()
        .any(|w| w.contains("Could not connect to any remote endpoint")));
}

#[tokio::test]
async fn test_summary_counts_traffic_and_drain_cause() {
    let remote_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = RemoteEndpoint::new("127.0.0.1", remote_listener.local_addr().unwrap().port());
    let (mut client, server_side) = client_pair().await;
    let client_addr = server_side.peer_addr().unwrap();

    let log = Arc::new(RecordingLog::new());
    let coordinator = ShutdownCoordinator::new();
    let session = ConnectionSession::new(
        "s2".to_string(),
        client_addr,
        config(vec![endpoint.clone()]),
        log.clone(),
    );
    let handle = tokio::spawn(session.run(server_side, coordinator.subscribe()));

    let (mut remote, _) = remote_listener.accept().await.unwrap();
    client.write_all(b"ATDT5551234\r").await.unwrap();
    let mut buf = [0u8; 12];
    remote.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"ATDT5551234\r");

    remote.write_all(b"CONNECT\r\n").await.unwrap();
    let mut reply = [0u8; 9];
    client.read_exact(&mut reply).await.unwrap();
    assert_eq!(&reply, b"CONNECT\r\n");

    drop(client);
    let summary = timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.final_state, SessionState::Closed);
    assert_eq!(summary.remotes_connected, 1);
    assert_eq!(summary.pumps_started, 2);
    assert_eq!(summary.bytes_up, 12);
    assert_eq!(summary.bytes_down, 9);
    assert_eq!(summary.drained_by, Some(format!("{} -> *", client_addr)));

    let upstream = log.chunk_bytes(&format!("{} -> *", client_addr));
    assert_eq!(upstream, b"ATDT5551234\r");
    let downstream = log.chunk_bytes(&format!("{} -> {}", endpoint, client_addr));
    assert_eq!(downstream, b"CONNECT\r\n");

    // Remote socket was closed by the teardown
    let n = remote.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0);
    assert!(log.errors().is_empty());
    assert!(log.infos().iter().any(|m| m.contains("Session s2 from")));
}

#[tokio::test]
async fn test_shutdown_during_relay_is_not_an_error() {
    let remote_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = RemoteEndpoint::new("127.0.0.1", remote_listener.local_addr().unwrap().port());
    let (mut client, server_side) = client_pair().await;
    let client_addr = server_side.peer_addr().unwrap();

    let log = Arc::new(RecordingLog::new());
    let coordinator = ShutdownCoordinator::new();
    let session = ConnectionSession::new("s3".to_string(), client_addr, config(vec![endpoint]), log.clone());
    let handle = tokio::spawn(session.run(server_side, coordinator.subscribe()));

    // A chunk reaching the remote means the pumps are running
    let (mut remote, _) = remote_listener.accept().await.unwrap();
    client.write_all(b"live").await.unwrap();
    let mut buf = [0u8; 4];
    timeout(Duration::from_secs(5), remote.read_exact(&mut buf))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buf, b"live");

    coordinator.trigger();

    let summary = timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.final_state, SessionState::Closed);
    assert!(summary.relayed());
    assert_eq!(summary.bytes_up, 4);
    assert!(log.errors().is_empty());
    assert!(log.infos().iter().any(|m| m.contains("stopped for shutdown")));

    let n = client.read(&mut buf).await.unwrap_or(0);
    assert_eq!(n, 0);
}
