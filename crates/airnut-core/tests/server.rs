//! Integration tests for the Airnut socket server.
//!
//! These drive a real listener on an ephemeral loopback port with scripted
//! fake devices, covering the handshake, login round-trip, data posts,
//! malformed-frame tolerance, lifecycle idempotence, rebinding, and the
//! polling schedule.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};

use airnut_core::{AirnutServer, Error, ServerConfig};

/// Timeout for any single wait in these tests.
const WAIT: Duration = Duration::from_secs(5);

/// Device identifier every loopback connection maps to.
const LOCAL_IP: &str = "127.0.0.1";

fn test_config() -> ServerConfig {
    ServerConfig {
        bind: "127.0.0.1:0".to_string(),
        // Long enough that only explicitly-triggered broadcasts happen.
        scan_interval: 600,
        // Disable night suppression so tests pass at any hour.
        night_update: true,
        ..Default::default()
    }
}

async fn start_server(config: ServerConfig) -> Arc<AirnutServer> {
    let server = AirnutServer::new(config).expect("valid test config");
    server.start().await.expect("server starts");
    server
}

async fn connect_device(server: &AirnutServer) -> TcpStream {
    let addr = server.local_addr().await.expect("server is running");
    TcpStream::connect(addr).await.expect("device connects")
}

/// Parse every complete JSON value from a buffer of concatenated objects.
/// Outbound commands carry no delimiter, so this is how a device sees them.
fn parse_concat_json(buf: &[u8]) -> Vec<Value> {
    let mut values = Vec::new();
    let mut iter = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();
    loop {
        match iter.next() {
            Some(Ok(value)) => values.push(value),
            // Trailing partial object or end of buffer: stop either way.
            _ => break,
        }
    }
    values
}

/// Read from the device socket until `count` complete JSON values arrive.
async fn read_commands(stream: &mut TcpStream, count: usize) -> Vec<Value> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let values = parse_concat_json(&buf);
        if values.len() >= count {
            return values;
        }
        let n = timeout(WAIT, stream.read(&mut chunk))
            .await
            .expect("timed out waiting for a command")
            .expect("read from server");
        assert!(n > 0, "server closed the connection unexpectedly");
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// Assert that nothing arrives on the device socket within `quiet`.
async fn expect_no_data(stream: &mut TcpStream, quiet: Duration) {
    let mut chunk = [0u8; 1024];
    match timeout(quiet, stream.read(&mut chunk)).await {
        Err(_) => {} // timed out: nothing arrived, as expected
        Ok(Ok(0)) => panic!("server closed the connection"),
        Ok(Ok(n)) => panic!("unexpected {} bytes from server", n),
        Ok(Err(e)) => panic!("read error: {}", e),
    }
}

/// A 4-hour night window centered on the current local time, so suppression
/// is active no matter when the test runs. Wrap-around windows are handled
/// by the server, so no clamping is needed near midnight.
fn window_around_now() -> (String, String) {
    let now = time::OffsetDateTime::now_local()
        .unwrap_or_else(|_| time::OffsetDateTime::now_utc())
        .time();
    let start = now - time::Duration::hours(2);
    let end = now + time::Duration::hours(2);
    (
        format!("{:02}:{:02}", start.hour(), start.minute()),
        format!("{:02}:{:02}", end.hour(), end.minute()),
    )
}

/// Wait for the store to hold a reading for `device_ip`.
async fn wait_for_reading(server: &AirnutServer, device_ip: &str) -> airnut_core::DeviceReading {
    timeout(WAIT, async {
        loop {
            if let Some(reading) = server.reading_for(device_ip).await {
                return reading;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("timed out waiting for a reading")
}

#[tokio::test]
async fn handshake_sends_set_volume_then_get() {
    let server = start_server(test_config()).await;
    let mut device = connect_device(&server).await;

    let commands = read_commands(&mut device, 2).await;
    assert_eq!(commands[0]["p"], "set_volume");
    assert_eq!(commands[0]["param"]["volume"], 0);
    assert_eq!(commands[1]["p"], "get");
    assert_eq!(commands[1]["check_key"], "s_get19085");

    server.stop().await;
}

#[tokio::test]
async fn login_gets_fixed_ack_and_post_updates_reading() {
    let server = start_server(test_config()).await;
    let mut device = connect_device(&server).await;
    read_commands(&mut device, 2).await;

    device
        .write_all(b"{\"p\":\"log_in\"}\n\r")
        .await
        .unwrap();
    let ack = &read_commands(&mut device, 1).await[0];
    assert_eq!(ack["type"], "client");
    assert_eq!(ack["socket_id"], 18_567);
    assert_eq!(ack["result"], 0);
    assert_eq!(ack["p"], "log_in");

    device
        .write_all(
            b"{\"p\":\"post\",\"param\":{\"indoor\":{\"t\":23.45,\"h\":55.0,\"pm25\":12,\"co2\":450}}}\n\r",
        )
        .await
        .unwrap();

    let reading = wait_for_reading(&server, LOCAL_IP).await;
    assert_eq!(reading.temperature, Some(23.5));
    assert_eq!(reading.humidity, Some(55.0));
    assert_eq!(reading.pm25, Some(12));
    assert_eq!(reading.co2, Some(450));
    assert!(reading.last_update.is_some());

    server.stop().await;
}

#[tokio::test]
async fn malformed_frame_does_not_disconnect_its_sender() {
    let server = start_server(test_config()).await;

    let mut bad_device = connect_device(&server).await;
    read_commands(&mut bad_device, 2).await;
    let mut good_device = connect_device(&server).await;
    read_commands(&mut good_device, 2).await;

    assert_eq!(server.connection_count().await, 2);

    bad_device.write_all(b"{this is not json\n\r").await.unwrap();
    good_device
        .write_all(
            b"{\"p\":\"post\",\"param\":{\"indoor\":{\"t\":20,\"h\":40,\"pm25\":5,\"co2\":600}}}\n\r",
        )
        .await
        .unwrap();

    let reading = wait_for_reading(&server, LOCAL_IP).await;
    assert_eq!(reading.co2, Some(600));

    // The sender of the malformed frame is still connected and can still
    // deliver a valid post afterwards.
    assert_eq!(server.connection_count().await, 2);
    bad_device
        .write_all(
            b"{\"p\":\"post\",\"param\":{\"indoor\":{\"t\":21,\"h\":41,\"pm25\":6,\"co2\":700}}}\n\r",
        )
        .await
        .unwrap();
    timeout(WAIT, async {
        loop {
            if server
                .reading_for(LOCAL_IP)
                .await
                .is_some_and(|r| r.co2 == Some(700))
            {
                return;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("post after a malformed frame still lands");

    server.stop().await;
}

#[tokio::test]
async fn record_split_across_reads_still_parses() {
    let server = start_server(test_config()).await;
    let mut device = connect_device(&server).await;
    read_commands(&mut device, 2).await;

    device
        .write_all(b"{\"p\":\"post\",\"param\":{\"indoor\":{\"t\":19.96,")
        .await
        .unwrap();
    device.flush().await.unwrap();
    sleep(Duration::from_millis(50)).await;
    device
        .write_all(b"\"h\":62.5,\"pm25\":9,\"co2\":512}}}\n\r")
        .await
        .unwrap();

    let reading = wait_for_reading(&server, LOCAL_IP).await;
    assert_eq!(reading.temperature, Some(20.0));
    assert_eq!(reading.humidity, Some(62.5));
    assert_eq!(reading.pm25, Some(9));
    assert_eq!(reading.co2, Some(512));

    server.stop().await;
}

#[tokio::test]
async fn double_start_keeps_one_listener() {
    let server = start_server(test_config()).await;
    let addr = server.local_addr().await.unwrap();

    // Second start is a logged no-op: same listener, no bind error.
    server.start().await.expect("redundant start is ok");
    assert_eq!(server.local_addr().await, Some(addr));

    // Still accepting.
    let mut device = connect_device(&server).await;
    read_commands(&mut device, 2).await;

    server.stop().await;
}

#[tokio::test]
async fn stop_then_start_rebinds_the_same_port() {
    let server = start_server(test_config()).await;
    let addr = server.local_addr().await.unwrap();

    let mut device = connect_device(&server).await;
    read_commands(&mut device, 2).await;
    device
        .write_all(
            b"{\"p\":\"post\",\"param\":{\"indoor\":{\"t\":22,\"h\":50,\"pm25\":3,\"co2\":480}}}\n\r",
        )
        .await
        .unwrap();
    wait_for_reading(&server, LOCAL_IP).await;

    server.stop().await;
    assert!(!server.is_running().await);

    // A server pinned to the port just released must rebind immediately.
    let rebound = start_server(ServerConfig {
        bind: addr.to_string(),
        ..test_config()
    })
    .await;
    assert_eq!(rebound.local_addr().await, Some(addr));

    // Stop cleared the first server's reading store.
    assert!(server.reading_for(LOCAL_IP).await.is_none());

    rebound.stop().await;
}

#[tokio::test]
async fn bind_conflict_surfaces_bind_error() {
    // Hold the port with a plain listener (no SO_REUSEPORT).
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = occupied.local_addr().unwrap();

    let server = AirnutServer::new(ServerConfig {
        bind: addr.to_string(),
        ..test_config()
    })
    .unwrap();

    match server.start().await {
        Err(Error::Bind { addr: failed, .. }) => assert_eq!(failed, addr),
        other => panic!("expected a bind error, got {:?}", other.map(|_| ())),
    }
    assert!(!server.is_running().await);
}

#[tokio::test]
async fn update_is_rate_limited_by_scan_interval() {
    let server = start_server(test_config()).await;
    let mut device = connect_device(&server).await;
    read_commands(&mut device, 2).await;

    // First call: no previous scan, broadcasts immediately.
    server.update_device_data().await;
    let get = &read_commands(&mut device, 1).await[0];
    assert_eq!(get["p"], "get");
    let first_scan = server.last_scan_at().await.expect("scan clock advanced");

    // Second call inside the interval: silently rate-limited.
    server.update_device_data().await;
    assert_eq!(server.last_scan_at().await, Some(first_scan));
    expect_no_data(&mut device, Duration::from_millis(300)).await;

    server.stop().await;
}

#[tokio::test]
async fn night_window_suppresses_and_never_advances_scan_clock() {
    // A window straddling the current time, with suppression enabled.
    let (night_start, night_end) = window_around_now();
    let server = start_server(ServerConfig {
        night_start,
        night_end,
        night_update: false,
        ..test_config()
    })
    .await;
    let mut device = connect_device(&server).await;
    read_commands(&mut device, 2).await;

    for _ in 0..3 {
        server.update_device_data().await;
    }
    // Unlike rate limiting, suppression leaves the scan clock untouched so
    // the next call re-evaluates the window.
    assert!(server.last_scan_at().await.is_none());
    expect_no_data(&mut device, Duration::from_millis(300)).await;

    server.stop().await;
}

#[tokio::test]
async fn broadcast_evicts_unreachable_connections() {
    let server = start_server(test_config()).await;
    let mut device = connect_device(&server).await;
    read_commands(&mut device, 2).await;
    assert_eq!(server.connection_count().await, 1);

    // Device goes away without the server noticing yet.
    drop(device);
    sleep(Duration::from_millis(100)).await;

    // Broadcasting flushes out the dead connection sooner or later; the
    // first write may land in the OS buffer, so allow a few attempts.
    // (The read loop usually observes EOF first, which is also fine.)
    timeout(WAIT, async {
        while server.connection_count().await > 0 {
            server.update_device_data().await;
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("dead connection is removed");

    server.stop().await;
}

#[tokio::test]
async fn idle_timeout_closes_silent_connections() {
    let server = start_server(ServerConfig {
        idle_timeout: Some(1),
        ..test_config()
    })
    .await;
    let mut device = connect_device(&server).await;
    read_commands(&mut device, 2).await;
    assert_eq!(server.connection_count().await, 1);

    // Say nothing; the server should hang up on us.
    let mut chunk = [0u8; 64];
    let n = timeout(WAIT, device.read(&mut chunk))
        .await
        .expect("server closes the idle connection")
        .expect("clean close");
    assert_eq!(n, 0);

    timeout(WAIT, async {
        while server.connection_count().await > 0 {
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("idle connection deregistered");

    server.stop().await;
}
