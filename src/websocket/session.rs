//! Session runner: owns a live connection for its whole lifetime.
//!
//! Three tasks run per session:
//! - the read loop, which hands every data frame to the caller's handler
//!   in arrival order and reports the terminal error;
//! - a supervisor, which closes the connection when the caller stops the
//!   session;
//! - the keepalive loop, when enabled.
//!
//! A stop request makes the shutdown silent: the read loop checks the stop
//! token before reporting, so the error handler never sees the failure the
//! stop itself caused. Closing a connection is idempotent and always
//! unblocks the read loop, even when the peer has gone quiet.

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use tungstenite::Message;

use super::keepalive::{self, Liveness};
use super::{WsConfig, WsSettings, connect};
use crate::{CambistError, Result};

/// How long the final close frame may take before the socket is dropped.
const CLOSE_DEADLINE: Duration = Duration::from_secs(1);

/// Close code reported when the peer's close frame carries no status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Caller-owned handle requesting a graceful stop.
///
/// Dropping the handle does not stop the session.
#[derive(Debug, Clone)]
pub struct StopSignal {
    token: CancellationToken,
}

impl StopSignal {
    /// Requests the session to stop. Calling it again has no effect.
    ///
    /// The error handler is not invoked for a session stopped this way.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Returns `true` once [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Runner-owned handle that completes once the read loop has exited and
/// the connection has been released.
#[derive(Debug, Clone)]
pub struct DoneSignal {
    token: CancellationToken,
}

impl DoneSignal {
    /// Waits until the session has fully terminated.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }

    /// Returns `true` if the session has terminated.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// The write half of a live connection plus its close state.
///
/// The read half belongs to the read loop alone.
pub(crate) struct Connection<S> {
    writer: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    closed: CancellationToken,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn new(writer: SplitSink<WebSocketStream<S>, Message>) -> Self {
        Self {
            writer: Mutex::new(writer),
            closed: CancellationToken::new(),
        }
    }

    /// Marks the connection closed. Safe to call any number of times.
    pub(crate) fn close(&self) {
        self.closed.cancel();
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Completes once the connection has been closed.
    pub(crate) async fn closed(&self) {
        self.closed.cancelled().await;
    }

    /// Writes a ping control frame, failing if it takes longer than `deadline`.
    pub(crate) async fn ping(&self, deadline: Duration) -> Result<()> {
        let send = async {
            let mut writer = self.writer.lock().await;
            writer.send(Message::Ping(Default::default())).await
        };
        match tokio::time::timeout(deadline, send).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CambistError::WebSocket(tungstenite::Error::Io(
                std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    "ping write deadline exceeded",
                ),
            ))),
        }
    }

    /// Closes the connection and makes a bounded attempt at a close frame.
    async fn shutdown(&self) {
        self.close();
        let send_close = async {
            let mut writer = self.writer.lock().await;
            writer.close().await
        };
        match tokio::time::timeout(CLOSE_DEADLINE, send_close).await {
            Ok(Ok(())) => trace!("close frame sent"),
            Ok(Err(e)) => trace!(error = %e, "close frame not sent"),
            Err(_) => trace!("close frame timed out"),
        }
    }
}

/// Closes the connection and signals completion when dropped, whichever
/// way the read-loop task ends.
struct SessionGuard<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    conn: Arc<Connection<S>>,
    done: CancellationToken,
}

impl<S> Drop for SessionGuard<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    fn drop(&mut self) {
        self.conn.close();
        self.done.cancel();
    }
}

/// Connects to `config` and starts a session on the new connection.
///
/// Returns as soon as the handshake completes; frames are delivered in the
/// background. See [`start_session`] for the handler contract.
///
/// # Errors
///
/// Returns [`CambistError::Config`] for settings rejected by
/// [`WsSettings::validate`], before anything is dialed, and any
/// establishment error from [`connect`]. Errors after that point go to
/// `err_handler`.
pub async fn serve<H, E>(
    config: &WsConfig,
    settings: &WsSettings,
    handler: H,
    err_handler: E,
) -> Result<(DoneSignal, StopSignal)>
where
    H: FnMut(&[u8]) + Send + 'static,
    E: FnOnce(CambistError) + Send + 'static,
{
    settings.validate()?;
    let stream = connect(config, settings).await?;
    start_session(stream, settings, handler, err_handler)
}

/// Starts the read loop (and keepalive, if enabled) on an established
/// stream and returns the done/stop pair immediately.
///
/// `handler` receives the payload of each text or binary frame, one at a
/// time in arrival order; it should return promptly since it stalls every
/// later frame. Control frames are not delivered. `err_handler` is called
/// at most once with the error that ended the session, and never when the
/// session ended because [`StopSignal::stop`] was called.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`CambistError::Config`] for settings rejected by
/// [`WsSettings::validate`]; no task is spawned in that case.
pub fn start_session<S, H, E>(
    stream: WebSocketStream<S>,
    settings: &WsSettings,
    handler: H,
    err_handler: E,
) -> Result<(DoneSignal, StopSignal)>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: FnMut(&[u8]) + Send + 'static,
    E: FnOnce(CambistError) + Send + 'static,
{
    settings.validate()?;

    let (writer, reader) = stream.split();
    let conn = Arc::new(Connection::new(writer));
    let liveness = Arc::new(Liveness::new());
    let done = CancellationToken::new();
    let stop = CancellationToken::new();

    tokio::spawn(supervise(conn.clone(), stop.clone(), done.clone()));

    if settings.keepalive {
        tokio::spawn(keepalive::run(
            conn.clone(),
            liveness.clone(),
            settings.timeout,
        ));
    }

    let guard = SessionGuard {
        conn: conn.clone(),
        done: done.clone(),
    };
    let stopped = stop.clone();
    tokio::spawn(async move {
        let _guard = guard;
        let err = read_loop(reader, &conn, &liveness, handler).await;
        if stopped.is_cancelled() {
            debug!("session stopped by caller");
        } else {
            warn!(error = %err, "session terminated");
            err_handler(err);
        }
        conn.shutdown().await;
    });

    Ok((DoneSignal { token: done }, StopSignal { token: stop }))
}

/// Waits for a stop request or session end and closes the connection on
/// the former.
async fn supervise<S>(conn: Arc<Connection<S>>, stop: CancellationToken, done: CancellationToken)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::select! {
        () = stop.cancelled() => {
            info!("stop requested, closing connection");
            conn.close();
        }
        () = done.cancelled() => {}
    }
}

/// Delivers frames until the connection fails or is closed, returning the
/// error that ended it.
async fn read_loop<S, H>(
    mut reader: SplitStream<WebSocketStream<S>>,
    conn: &Connection<S>,
    liveness: &Liveness,
    mut handler: H,
) -> CambistError
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    H: FnMut(&[u8]),
{
    loop {
        let next = tokio::select! {
            biased;
            () = conn.closed() => return CambistError::ConnectionClosed,
            next = reader.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => handler(text.as_bytes()),
            Some(Ok(Message::Binary(data))) => handler(&data[..]),
            Some(Ok(Message::Pong(_))) => {
                liveness.record_ack();
                trace!("Received pong");
            }
            Some(Ok(Message::Ping(_) | Message::Frame(_))) => {}
            Some(Ok(Message::Close(frame))) => {
                return match frame {
                    Some(frame) => CambistError::PeerClosed {
                        code: u16::from(frame.code),
                        reason: frame.reason.to_string(),
                    },
                    None => CambistError::PeerClosed {
                        code: NO_STATUS_RECEIVED,
                        reason: String::new(),
                    },
                };
            }
            Some(Err(e)) => return CambistError::WebSocket(e),
            None => return CambistError::StreamEnded,
        }
    }
}
