//! Integration tests for the remote-control server and client
//!
//! These run the real network thread on a loopback TCP socket and talk to
//! it through the async client, with a plain thread standing in for the
//! host's consumer loop.

use remote_client::{ClientError, RemoteClient};
use remote_protocol::{ClientSubscriptions, MalformedReport, ServerPacket};
use remote_server::{RemoteApi, RemoteConfig, RemoteHandle, ScriptOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::time::{sleep, timeout};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn loopback_config() -> RemoteConfig {
    RemoteConfig {
        bind_addr: "127.0.0.1:0".into(),
        ..RemoteConfig::default()
    }
}

async fn start_server(config: RemoteConfig) -> (RemoteApi, String) {
    let api = RemoteApi::start(config).expect("Failed to start server");
    for _ in 0..500 {
        if let Some(addr) = api.local_addr() {
            return (api, addr.to_string());
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("Server never bound");
}

async fn connect(addr: &str) -> RemoteClient {
    RemoteClient::connect(addr)
        .await
        .expect("Failed to connect")
}

/// Host loop running scripts on its own thread, uppercasing the payload
struct Consumer {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Consumer {
    fn spawn(handle: RemoteHandle) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut executor = |payload: &[u8]| {
                    if payload == b"fail" {
                        ScriptOutcome::failure("script failed")
                    } else {
                        ScriptOutcome::success(payload.to_ascii_uppercase())
                    }
                };
                while !stop.load(Ordering::Relaxed) {
                    handle.process_command(&mut executor);
                    thread::sleep(Duration::from_millis(1));
                }
            })
        };
        Self {
            stop,
            thread: Some(thread),
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// PROTOCOL ROUND TRIPS
mod protocol_tests {
    use super::*;

    /// Tests the handshake ack and subscription flags over TCP
    #[tokio::test]
    async fn handshake_is_acknowledged() {
        let (api, addr) = start_server(loopback_config()).await;
        let mut client = connect(&addr).await;

        let sequence = timeout(
            TEST_TIMEOUT,
            client.handshake(ClientSubscriptions::from_interest_byte(0x03)),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(sequence, 0);

        let subscriptions = api.handle().subscriptions();
        assert!(subscriptions.logging);
        assert!(subscriptions.multiworld_updates);
        assert!(api.handle().is_connected());
    }

    /// Tests script execution through a consumer thread
    #[tokio::test]
    async fn remote_execute_round_trip() {
        let (api, addr) = start_server(loopback_config()).await;
        let _consumer = Consumer::spawn(api.handle());
        let mut client = connect(&addr).await;

        client.handshake(ClientSubscriptions::default()).await.unwrap();

        let result = timeout(TEST_TIMEOUT, client.execute(b"ok"))
            .await
            .unwrap()
            .unwrap();
        assert!(result.success);
        assert_eq!(result.sequence, 1);
        assert_eq!(result.result, b"OK");

        let result = timeout(TEST_TIMEOUT, client.execute(b"fail"))
            .await
            .unwrap()
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.sequence, 2);
        assert_eq!(result.result_text(), "script failed");
    }

    /// Tests a script at the maximum payload size
    #[tokio::test]
    async fn largest_payload_is_accepted() {
        let (api, addr) = start_server(loopback_config()).await;
        let _consumer = Consumer::spawn(api.handle());
        let mut client = connect(&addr).await;

        let script = vec![b'a'; remote_protocol::DEFAULT_BUFFER_SIZE];
        let result = timeout(TEST_TIMEOUT, client.execute(&script))
            .await
            .unwrap()
            .unwrap();
        assert!(result.success);
        assert_eq!(result.result, vec![b'A'; remote_protocol::DEFAULT_BUFFER_SIZE]);
    }

    /// Tests log streaming to a subscribed client
    #[tokio::test]
    async fn log_lines_reach_subscribed_client() {
        let (api, addr) = start_server(loopback_config()).await;
        let handle = api.handle();
        let mut client = connect(&addr).await;

        client
            .handshake(ClientSubscriptions::from_interest_byte(0x01))
            .await
            .unwrap();
        assert!(handle.send_log(b"hello from host"));

        let line = timeout(TEST_TIMEOUT, client.next_log())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(line, b"hello from host");
    }

    /// Tests that unsubscribed clients get no log lines
    #[tokio::test]
    async fn log_lines_skip_unsubscribed_client() {
        let (api, addr) = start_server(loopback_config()).await;
        let handle = api.handle();
        let mut client = connect(&addr).await;

        client.handshake(ClientSubscriptions::default()).await.unwrap();
        assert!(!handle.send_log(b"nobody asked"));
    }
}

/// MALFORMED INPUT
mod malformed_tests {
    use super::*;

    /// Tests the diagnostic for an unknown type byte
    #[tokio::test]
    async fn unknown_type_is_reported_and_connection_survives() {
        let (_api, addr) = start_server(loopback_config()).await;
        let mut client = connect(&addr).await;

        client.send_raw(&[0x7F]).await.unwrap();
        let packet = timeout(TEST_TIMEOUT, client.next_packet())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            packet,
            ServerPacket::Malformed {
                sequence: 0,
                report: MalformedReport {
                    offending_type: 0x7F,
                    received: 1,
                    expected: 0,
                },
            }
        );

        let sequence = client.handshake(ClientSubscriptions::default()).await.unwrap();
        assert_eq!(sequence, 1);
    }

    /// Tests that an oversized frame is skipped without desync
    #[tokio::test]
    async fn oversized_payload_is_reported_once() {
        let (api, addr) = start_server(loopback_config()).await;
        let _consumer = Consumer::spawn(api.handle());
        let mut client = connect(&addr).await;

        let declared = remote_protocol::DEFAULT_BUFFER_SIZE as u32 + 1;
        let mut wire = vec![3];
        wire.extend_from_slice(&declared.to_le_bytes());
        wire.extend(std::iter::repeat(b'z').take(declared as usize));
        client.send_raw(&wire).await.unwrap();

        match timeout(TEST_TIMEOUT, client.execute(b"after")).await.unwrap() {
            Err(ClientError::Malformed(report)) => assert_eq!(
                report,
                MalformedReport {
                    offending_type: 3,
                    received: 5,
                    expected: 5 + declared,
                }
            ),
            other => panic!("expected malformed report, got {:?}", other),
        }

        // The skipped body did not desynchronize the stream
        let packet = timeout(TEST_TIMEOUT, client.next_packet())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            packet,
            ServerPacket::RemoteExecuteResult {
                sequence: 1,
                success: true,
                result: b"AFTER".to_vec(),
            }
        );
    }
}

/// CONNECTION LIFECYCLE
mod lifecycle_tests {
    use super::*;

    /// Tests the keep-alive timeout
    #[tokio::test]
    async fn silent_client_is_dropped() {
        let config = RemoteConfig {
            keep_alive_timeout_ms: 200,
            ..loopback_config()
        };
        let (api, addr) = start_server(config).await;
        let mut client = connect(&addr).await;
        client.handshake(ClientSubscriptions::default()).await.unwrap();

        let outcome = timeout(TEST_TIMEOUT, client.next_packet()).await.unwrap();
        assert!(matches!(
            outcome,
            Err(ClientError::Closed) | Err(ClientError::Io(_))
        ));

        for _ in 0..100 {
            if !api.handle().is_connected() {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("Server still reports a connection");
    }

    /// Tests that keep-alives prevent the timeout
    #[tokio::test]
    async fn keep_alive_holds_connection_open() {
        let config = RemoteConfig {
            keep_alive_timeout_ms: 200,
            ..loopback_config()
        };
        let (api, addr) = start_server(config).await;
        let mut client = connect(&addr).await;
        client.handshake(ClientSubscriptions::default()).await.unwrap();

        for _ in 0..10 {
            sleep(Duration::from_millis(50)).await;
            client.keep_alive().await.unwrap();
        }
        assert!(api.handle().is_connected());

        let sequence = client.handshake(ClientSubscriptions::default()).await.unwrap();
        assert_eq!(sequence, 1);
    }

    /// Tests sequence reset across reconnects
    #[tokio::test]
    async fn reconnect_restarts_sequence_numbers() {
        let (_api, addr) = start_server(loopback_config()).await;

        let mut first = connect(&addr).await;
        assert_eq!(first.handshake(ClientSubscriptions::default()).await.unwrap(), 0);
        assert_eq!(first.handshake(ClientSubscriptions::default()).await.unwrap(), 1);
        drop(first);

        let mut second = connect(&addr).await;
        let sequence = timeout(TEST_TIMEOUT, second.handshake(ClientSubscriptions::default()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(sequence, 0);
    }

    /// Tests that shutdown frees the listening port
    #[tokio::test]
    async fn shutdown_releases_port() {
        let (mut api, addr) = start_server(loopback_config()).await;
        api.shutdown();
        assert!(api.local_addr().is_none());

        let config = RemoteConfig {
            bind_addr: addr.clone(),
            ..RemoteConfig::default()
        };
        let (_again, rebound) = start_server(config).await;
        assert_eq!(rebound, addr);
    }
}
