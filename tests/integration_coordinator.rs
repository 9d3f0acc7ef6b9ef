//! Integration tests for coordinator communication
//!
//! Drives the real worker binary against a mock coordinator WebSocket server
//! and a canned work server: connect → ping/pong → work dispatch →
//! cancellation → reconnection.

#![cfg(unix)]

mod common;

use std::process::{Child, Command, Stdio};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message as WsMessage, WebSocketStream};

// ─────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────

/// Kills the worker process when the test ends
struct WorkerGuard(Child);

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Launch the worker binary against a local mock coordinator.
///
/// `/bin/sh` stands in for the work-server binary: it exits immediately, but
/// the worker only talks to the gateway port, never to the process itself.
fn spawn_worker(ws_port: u16, gateway_port: u16, extra_env: &[(&str, String)]) -> WorkerGuard {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vpow-worker"));
    cmd.args(["run", &common::valid_address()])
        .env("VPOW_COORDINATOR_URL", format!("ws://127.0.0.1:{}", ws_port))
        .env("VPOW_GATEWAY_PORT", gateway_port.to_string())
        .env("VPOW_GATEWAY_SERVER_PATH", "/bin/sh")
        .env("VPOW_RECONNECT_INTERVAL_MS", "100")
        .env("VPOW_LIVENESS_TIMEOUT_MS", "60000")
        .env("VPOW_LOG_LEVEL", "error")
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    for (key, value) in extra_env {
        cmd.env(key, value);
    }

    WorkerGuard(cmd.spawn().expect("failed to spawn worker binary"))
}

/// Wait for the worker to connect and complete the WebSocket handshake
async fn accept_worker(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = tokio::time::timeout(Duration::from_secs(10), listener.accept())
        .await
        .expect("worker did not connect in time")
        .expect("accept failed");
    accept_async(stream).await.expect("websocket handshake failed")
}

/// Read the next text frame as JSON, within a timeout
async fn next_json(
    ws: &mut WebSocketStream<TcpStream>,
    timeout: Duration,
) -> Option<serde_json::Value> {
    loop {
        let frame = tokio::time::timeout(timeout, ws.next()).await.ok()??;
        match frame {
            Ok(WsMessage::Text(text)) => {
                return Some(serde_json::from_str(&text).expect("frame is not JSON"))
            }
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

/// A canned single-shot HTTP work server on its own thread. Sends each
/// received request body down the channel.
fn canned_work_server(nonce: &str) -> (u16, std_mpsc::Receiver<String>) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let body = format!(r#"{{"work":"{}"}}"#, nonce);
    let (tx, rx) = std_mpsc::channel();

    std::thread::spawn(move || {
        while let Ok((mut stream, _)) = listener.accept() {
            let request = common::answer_http_request(&mut stream, &body);
            if tx.send(request).is_err() {
                break;
            }
        }
    });

    (port, rx)
}

// ─────────────────────────────────────────────────────────────────
// Liveness
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ping_answered_with_pong() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_port = listener.local_addr().unwrap().port();
    let _worker = spawn_worker(ws_port, 1, &[]);

    let mut ws = accept_worker(&listener).await;

    ws.send(WsMessage::Text(r#"{"action":"ping"}"#.to_string()))
        .await
        .unwrap();

    let pong = next_json(&mut ws, Duration::from_secs(5))
        .await
        .expect("no pong received");
    assert_eq!(pong["action"], "pong");
    assert!(pong["d"].is_i64() || pong["d"].is_u64(), "pong carries an epoch-ms number");
}

#[tokio::test]
async fn test_malformed_frames_are_ignored() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_port = listener.local_addr().unwrap().port();
    let _worker = spawn_worker(ws_port, 1, &[]);

    let mut ws = accept_worker(&listener).await;

    // Garbage and unknown actions must not kill the connection
    ws.send(WsMessage::Text("not json".to_string())).await.unwrap();
    ws.send(WsMessage::Text(r#"{"action":"work_reboot"}"#.to_string()))
        .await
        .unwrap();
    ws.send(WsMessage::Text(r#"{"no_action":true}"#.to_string()))
        .await
        .unwrap();

    ws.send(WsMessage::Text(r#"{"action":"ping"}"#.to_string()))
        .await
        .unwrap();

    let pong = next_json(&mut ws, Duration::from_secs(5))
        .await
        .expect("connection died on malformed frames");
    assert_eq!(pong["action"], "pong");
}

#[tokio::test]
async fn test_liveness_timeout_forces_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_port = listener.local_addr().unwrap().port();
    let _worker = spawn_worker(
        ws_port,
        1,
        &[("VPOW_LIVENESS_TIMEOUT_MS", "300".to_string())],
    );

    // First connection: send no pings at all
    let mut ws = accept_worker(&listener).await;

    // The worker force-closes the silent transport...
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "worker kept a silent connection alive");

    // ...and reconnects on its own
    let mut ws = accept_worker(&listener).await;

    // The replacement transport is live
    ws.send(WsMessage::Text(r#"{"action":"ping"}"#.to_string()))
        .await
        .unwrap();
    let pong = next_json(&mut ws, Duration::from_secs(5)).await.unwrap();
    assert_eq!(pong["action"], "pong");
}

// ─────────────────────────────────────────────────────────────────
// Reconnection
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_port = listener.local_addr().unwrap().port();
    let _worker = spawn_worker(ws_port, 1, &[]);

    // Accept, then drop the connection outright
    let ws = accept_worker(&listener).await;
    drop(ws);

    // The worker schedules a fixed-delay reconnect and comes back
    let mut ws = accept_worker(&listener).await;

    ws.send(WsMessage::Text(r#"{"action":"ping"}"#.to_string()))
        .await
        .unwrap();
    let pong = next_json(&mut ws, Duration::from_secs(5)).await.unwrap();
    assert_eq!(pong["action"], "pong");
}

#[tokio::test]
async fn test_reconnects_repeatedly() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_port = listener.local_addr().unwrap().port();
    let _worker = spawn_worker(ws_port, 1, &[]);

    // Drop several connections in a row: the retry never gives up
    for _ in 0..3 {
        let ws = accept_worker(&listener).await;
        drop(ws);
    }

    let mut ws = accept_worker(&listener).await;
    ws.send(WsMessage::Text(r#"{"action":"ping"}"#.to_string()))
        .await
        .unwrap();
    assert!(next_json(&mut ws, Duration::from_secs(5)).await.is_some());
}

// ─────────────────────────────────────────────────────────────────
// Work Dispatch
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_work_generate_produces_response() {
    let (gateway_port, request_rx) = canned_work_server("abc123");
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_port = listener.local_addr().unwrap().port();
    let _worker = spawn_worker(ws_port, gateway_port, &[]);

    let mut ws = accept_worker(&listener).await;

    ws.send(WsMessage::Text(
        r#"{"action":"work_generate","hash":"H1","threshold":"fffffff800000000"}"#.to_string(),
    ))
    .await
    .unwrap();

    let response = next_json(&mut ws, Duration::from_secs(10))
        .await
        .expect("no response frame received");
    assert_eq!(response["action"], "response");
    assert_eq!(response["hash"], "H1");
    assert_eq!(response["nonce"], "abc123");

    // The gateway saw the forwarded parameters
    let request = request_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let request: serde_json::Value = serde_json::from_str(&request).unwrap();
    assert_eq!(request["action"], "work_generate");
    assert_eq!(request["hash"], "H1");
    assert_eq!(request["threshold"], "fffffff800000000");
}

#[tokio::test]
async fn test_work_cancel_suppresses_response() {
    // A work server that never answers work_generate, but acknowledges
    // work_cancel
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let gateway_port = listener.local_addr().unwrap().port();
    let (cancel_tx, cancel_rx) = std_mpsc::channel();

    std::thread::spawn(move || {
        let mut held = Vec::new();
        while let Ok((mut stream, _)) = listener.accept() {
            let mut probe = [0u8; 4096];
            use std::io::Read;
            let n = stream.read(&mut probe).unwrap_or(0);
            let request = String::from_utf8_lossy(&probe[..n]).to_string();

            if request.contains("work_cancel") {
                use std::io::Write;
                let _ = stream.write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
                );
                let _ = cancel_tx.send(());
            } else {
                // Hold the generate exchange open without answering
                held.push(stream);
            }
        }
    });

    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_port = ws_listener.local_addr().unwrap().port();
    let _worker = spawn_worker(ws_port, gateway_port, &[]);

    let mut ws = accept_worker(&ws_listener).await;

    ws.send(WsMessage::Text(
        r#"{"action":"work_generate","hash":"H2","threshold":"fffffff800000000"}"#.to_string(),
    ))
    .await
    .unwrap();
    ws.send(WsMessage::Text(
        r#"{"action":"work_cancel","hash":"H2"}"#.to_string(),
    ))
    .await
    .unwrap();

    // The cancellation reached the work server out-of-band
    cancel_rx
        .recv_timeout(Duration::from_secs(10))
        .expect("work server never saw the cancellation");

    // And no response frame is ever sent for the cancelled hash
    assert!(
        next_json(&mut ws, Duration::from_millis(1500)).await.is_none(),
        "a response was sent for cancelled work"
    );
}

#[tokio::test]
async fn test_cancel_unknown_hash_is_silent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_port = listener.local_addr().unwrap().port();
    let _worker = spawn_worker(ws_port, 1, &[]);

    let mut ws = accept_worker(&listener).await;

    ws.send(WsMessage::Text(
        r#"{"action":"work_cancel","hash":"never-dispatched"}"#.to_string(),
    ))
    .await
    .unwrap();

    // No frame comes back, and the connection stays healthy
    assert!(next_json(&mut ws, Duration::from_millis(500)).await.is_none());
    ws.send(WsMessage::Text(r#"{"action":"ping"}"#.to_string()))
        .await
        .unwrap();
    let pong = next_json(&mut ws, Duration::from_secs(5)).await.unwrap();
    assert_eq!(pong["action"], "pong");
}

#[tokio::test]
async fn test_work_accepted_needs_no_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_port = listener.local_addr().unwrap().port();
    let _worker = spawn_worker(ws_port, 1, &[]);

    let mut ws = accept_worker(&listener).await;

    ws.send(WsMessage::Text(
        r#"{"action":"work_accepted","hash":"H3","payout":["100","250"]}"#.to_string(),
    ))
    .await
    .unwrap();

    assert!(next_json(&mut ws, Duration::from_millis(500)).await.is_none());
}
