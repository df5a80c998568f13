//! Shared test utilities: local WebSocket servers, a raw HTTP responder and
//! a recording CONNECT proxy, all bound to ephemeral loopback ports.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_tungstenite::WebSocketStream;

use cambist::CambistError;

/// Public Binance stream endpoint used by the live tests.
pub const BINANCE_STREAM_URL: &str = "wss://stream.binance.com:9443";

/// Starts a WebSocket server that accepts a single client and runs
/// `behavior` on it. Returns the `ws://` URL to dial.
pub async fn spawn_ws_server<F, Fut>(behavior: F) -> String
where
    F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("Failed to read local addr");

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("Failed to accept client");
        let ws = tokio_tungstenite::accept_async(tcp)
            .await
            .expect("Failed to complete server handshake");
        behavior(ws).await;
    });

    format!("ws://{addr}/ws/test")
}

/// Starts a server that answers the first HTTP request with `status_line`
/// and `body`, written in one piece.
pub async fn spawn_http_responder(status_line: &str, body: Vec<u8>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind responder");
    let addr = listener.local_addr().expect("Failed to read local addr");

    let mut response = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(&body);

    tokio::spawn(async move {
        let (mut tcp, _) = listener.accept().await.expect("Failed to accept client");
        read_head(&mut tcp).await;
        tcp.write_all(&response)
            .await
            .expect("Failed to write response");
        // Keep the socket open until the client has read the response.
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    });

    format!("ws://{addr}/ws/test")
}

/// Like [`spawn_http_responder`], but flushes the head and waits `pause`
/// before sending the body, so it arrives in a separate read.
pub async fn spawn_split_http_responder(
    status_line: &str,
    body: Vec<u8>,
    pause: std::time::Duration,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind responder");
    let addr = listener.local_addr().expect("Failed to read local addr");

    let head = format!(
        "{status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );

    tokio::spawn(async move {
        let (mut tcp, _) = listener.accept().await.expect("Failed to accept client");
        read_head(&mut tcp).await;
        tcp.write_all(head.as_bytes())
            .await
            .expect("Failed to write response head");
        tcp.flush().await.expect("Failed to flush response head");
        tokio::time::sleep(pause).await;
        tcp.write_all(&body).await.expect("Failed to write response body");
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    });

    format!("ws://{addr}/ws/test")
}

/// A CONNECT proxy that records every request line it receives.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub requests: Arc<Mutex<Vec<String>>>,
}

impl TestProxy {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn request_lines(&self) -> Vec<String> {
        self.requests.lock().expect("proxy log poisoned").clone()
    }
}

/// Starts a CONNECT proxy that tunnels to the requested target.
pub async fn spawn_connect_proxy() -> TestProxy {
    spawn_proxy(None).await
}

/// Starts a proxy that rejects every CONNECT with `status_line`.
pub async fn spawn_rejecting_proxy(status_line: &'static str) -> TestProxy {
    spawn_proxy(Some(status_line)).await
}

async fn spawn_proxy(reject_with: Option<&'static str>) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind proxy");
    let addr = listener.local_addr().expect("Failed to read local addr");
    let requests = Arc::new(Mutex::new(Vec::new()));
    let log = requests.clone();

    tokio::spawn(async move {
        while let Ok((mut client, _)) = listener.accept().await {
            let log = log.clone();
            tokio::spawn(async move {
                let head = read_head(&mut client).await;
                let request_line = head.lines().next().unwrap_or_default().to_string();
                log.lock().expect("proxy log poisoned").push(request_line.clone());

                if let Some(status_line) = reject_with {
                    let reply = format!("{status_line}\r\nContent-Length: 0\r\n\r\n");
                    let _ = client.write_all(reply.as_bytes()).await;
                    return;
                }

                let target = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();
                let mut upstream = TcpStream::connect(&target)
                    .await
                    .expect("Failed to reach tunnel target");
                client
                    .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                    .await
                    .expect("Failed to confirm tunnel");
                let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
            });
        }
    });

    TestProxy { addr, requests }
}

/// Reads an HTTP request head, returning it as text.
async fn read_head(tcp: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        match tcp.read(&mut byte).await {
            Ok(0) | Err(_) => break,
            Ok(_) => head.push(byte[0]),
        }
    }
    String::from_utf8_lossy(&head).into_owned()
}

/// Frame handler that forwards every payload as text to a channel.
pub fn frame_recorder() -> (impl FnMut(&[u8]) + Send + 'static, UnboundedReceiver<String>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |frame: &[u8]| {
        let _ = tx.send(String::from_utf8_lossy(frame).into_owned());
    };
    (handler, rx)
}

/// Error handler that forwards the terminal error to a channel.
pub fn error_recorder() -> (
    impl FnOnce(CambistError) + Send + 'static,
    UnboundedReceiver<CambistError>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |err: CambistError| {
        let _ = tx.send(err);
    };
    (handler, rx)
}
