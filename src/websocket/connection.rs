//! Dialing a stream endpoint.
//!
//! [`connect`] opens the TCP connection (directly or through a tunnelling
//! proxy), then performs the TLS and WebSocket handshakes. A rejected
//! handshake keeps whatever body the server sent along with the failure;
//! exchanges put their rate-limit and auth diagnostics there.
//!
//! The upgrade runs over a [`HandshakeIo`] that hands tungstenite one byte
//! per read, so nothing past the response head is consumed. The transport
//! stays recoverable: on success it is rebuilt into a client stream, on
//! rejection the remaining body is read from it directly.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout_at};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, client_async_with_config};
use tracing::{debug, info, warn};
use tungstenite::http::header::CONTENT_LENGTH;
use tungstenite::protocol::Role;
use url::Url;

use super::{LiveStream, WsConfig, WsSettings, proxy};
use crate::{CambistError, Result, tls};

/// Upper bound on the rejection body kept for diagnostics.
const MAX_REJECTION_BODY: usize = 64 * 1024;

/// Time allowed for the rest of a rejection body to arrive.
const REJECTION_BODY_DEADLINE: Duration = Duration::from_secs(3);

/// Establishes a WebSocket connection to the configured endpoint.
///
/// Proxy selection happens before any network activity, so a malformed
/// override fails without dialing. Nothing is retried.
///
/// # Errors
///
/// - [`CambistError::InvalidEndpoint`] if the endpoint is not a `ws`/`wss` URL
/// - [`CambistError::ProxyOverride`] / [`CambistError::Proxy`] for an
///   unusable proxy, [`CambistError::ProxyConnect`] if it refuses the tunnel
/// - [`CambistError::Tls`] if the pinned CA file cannot be loaded
/// - [`CambistError::Io`] if the TCP dial fails
/// - [`CambistError::Handshake`] or [`CambistError::HandshakeBodyUnreadable`]
///   if the TLS or WebSocket handshake fails
pub async fn connect(config: &WsConfig, settings: &WsSettings) -> Result<LiveStream> {
    let endpoint = config.endpoint();
    let url = Url::parse(endpoint).map_err(|e| CambistError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(CambistError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: format!("unsupported scheme {:?}", url.scheme()),
        });
    }
    let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
        return Err(CambistError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "missing host".to_string(),
        });
    };

    let proxy = proxy::resolve(&url, settings.proxy_override.as_deref())?;
    let tls_config = match url.scheme() {
        "wss" => Some(tls::ws_client_config(settings.ca_file.as_deref())?),
        _ => None,
    };

    let stream = match &proxy {
        Some(proxy) => proxy::tunnel(proxy, host, port).await?,
        None => TcpStream::connect(format!("{host}:{port}")).await?,
    };
    stream.set_nodelay(true)?;

    let stream = match tls_config {
        Some(config) => tls::connect_tls(stream, host, config).await?,
        None => MaybeTlsStream::Plain(stream),
    };

    upgrade(endpoint, stream).await
}

/// Runs the client handshake over `stream` and returns the upgraded
/// connection, or the rejection with its body.
async fn upgrade<S>(endpoint: &str, stream: S) -> Result<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let slot = Arc::new(Mutex::new(Some(stream)));
    let handshake = client_async_with_config(
        endpoint,
        HandshakeIo {
            slot: Arc::clone(&slot),
        },
        None,
    )
    .await;
    let inner = take_stream(&slot);

    match handshake {
        Ok((handshake_ws, response)) => {
            drop(handshake_ws);
            let Some(inner) = inner else {
                return Err(CambistError::Handshake {
                    body: String::new(),
                    source: tungstenite::Error::ConnectionClosed,
                });
            };
            info!(endpoint, status = %response.status(), "WebSocket handshake completed");
            Ok(WebSocketStream::from_raw_socket(inner, Role::Client, None).await)
        }
        Err(err) => {
            warn!(endpoint, error = %err, "WebSocket handshake failed");
            Err(handshake_error(err, inner).await)
        }
    }
}

fn take_stream<S>(slot: &Mutex<Option<S>>) -> Option<S> {
    match slot.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

/// Transport lent to tungstenite for the upgrade. Reads yield at most one
/// byte so the handshake never buffers past the response head.
struct HandshakeIo<S> {
    slot: Arc<Mutex<Option<S>>>,
}

impl<S> HandshakeIo<S> {
    fn with_inner<T>(
        &self,
        f: impl FnOnce(Pin<&mut S>) -> Poll<io::Result<T>>,
    ) -> Poll<io::Result<T>>
    where
        S: Unpin,
    {
        let mut guard = self
            .slot
            .lock()
            .map_err(|_| io::Error::other("handshake transport lock poisoned"))?;
        let inner = guard
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;
        f(Pin::new(inner))
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for HandshakeIo<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        let mut byte = [0u8; 1];
        let mut one = ReadBuf::new(&mut byte);
        ready!(self.with_inner(|inner| inner.poll_read(cx, &mut one)))?;
        buf.put_slice(one.filled());
        Poll::Ready(Ok(()))
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for HandshakeIo<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.with_inner(|inner| inner.poll_write(cx, buf))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.with_inner(|inner| inner.poll_flush(cx))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.with_inner(|inner| inner.poll_shutdown(cx))
    }
}

/// Wraps a handshake failure together with the text of the rejection body.
///
/// The part of the body tungstenite already buffered is completed from
/// `stream` when one is available.
async fn handshake_error<S>(err: tungstenite::Error, stream: Option<S>) -> CambistError
where
    S: AsyncRead + Unpin,
{
    let tungstenite::Error::Http(response) = &err else {
        return CambistError::Handshake {
            body: String::new(),
            source: err,
        };
    };
    let received = response
        .body()
        .as_ref()
        .map(|b| b[..].to_vec())
        .unwrap_or_default();
    let content_length = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok());

    let body = match stream {
        Some(mut stream) => read_rejection_body(&mut stream, received, content_length).await,
        None => Ok(received),
    };

    match body
        .map_err(|e| e.to_string())
        .and_then(|b| String::from_utf8(b).map_err(|e| e.to_string()))
    {
        Ok(body) => CambistError::Handshake { body, source: err },
        Err(reason) => CambistError::HandshakeBodyUnreadable { reason, source: err },
    }
}

/// Reads the rest of a rejection body after the response head.
///
/// With a `Content-Length` the full body must arrive before the deadline;
/// a short read is an error. Without one the body runs until EOF, the size
/// cap or the deadline, whichever comes first.
async fn read_rejection_body<S>(
    stream: &mut S,
    mut body: Vec<u8>,
    content_length: Option<usize>,
) -> io::Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let deadline = Instant::now() + REJECTION_BODY_DEADLINE;

    if let Some(len) = content_length {
        let len = len.min(MAX_REJECTION_BODY);
        if body.len() < len {
            let mut rest = vec![0u8; len - body.len()];
            timeout_at(deadline, stream.read_exact(&mut rest))
                .await
                .map_err(|_| {
                    io::Error::new(io::ErrorKind::TimedOut, "timed out reading response body")
                })??;
            body.extend_from_slice(&rest);
        }
        body.truncate(len);
        return Ok(body);
    }

    let mut chunk = [0u8; 4096];
    while body.len() < MAX_REJECTION_BODY {
        match timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => body.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                debug!(received = body.len(), "rejection body still open at deadline");
                break;
            }
        }
    }
    body.truncate(MAX_REJECTION_BODY);
    Ok(body)
}
