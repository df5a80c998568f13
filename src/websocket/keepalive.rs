//! Ping cadence and dead-peer detection.
//!
//! The keepalive loop pings on a fixed interval and, after every tick,
//! checks that *some* pong arrived within the timeout window. Pings and
//! pongs are not paired, so a slow peer and a dead one are only told apart
//! at the granularity of one timeout.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::session::Connection;

/// Write deadline for a single ping, independent of the keepalive timeout.
pub(crate) const PING_WRITE_DEADLINE: Duration = Duration::from_secs(10);

/// Time of the most recent pong, shared between the read loop (writer)
/// and the keepalive loop (reader).
///
/// Stored as microseconds since `origin` in an atomic. A stale read can
/// only postpone dead-peer detection by one tick.
#[derive(Debug)]
pub(crate) struct Liveness {
    origin: Instant,
    last_ack_us: AtomicU64,
}

impl Liveness {
    /// Starts the clock with an implicit acknowledgment at creation time.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
            last_ack_us: AtomicU64::new(0),
        }
    }

    /// Records that a pong was just observed.
    pub(crate) fn record_ack(&self) {
        let elapsed = self.origin.elapsed().as_micros() as u64;
        self.last_ack_us.store(elapsed, Ordering::Relaxed);
    }

    /// Time elapsed since the last recorded pong.
    #[must_use]
    pub(crate) fn since_last_ack(&self) -> Duration {
        let last = Duration::from_micros(self.last_ack_us.load(Ordering::Relaxed));
        self.origin.elapsed().saturating_sub(last)
    }
}

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the keepalive loop until the connection is closed.
///
/// Closes the connection itself when a ping cannot be written or when no
/// pong has been seen for longer than `timeout`. The resulting read
/// failure is what the session reports; nothing is returned from here.
pub(crate) async fn run<S>(conn: Arc<Connection<S>>, liveness: Arc<Liveness>, timeout: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut ticker = tokio::time::interval(timeout);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        if conn.is_closed() {
            return;
        }
        if let Err(e) = conn.ping(PING_WRITE_DEADLINE).await {
            debug!(error = %e, "keepalive ping failed, closing connection");
            conn.close();
            return;
        }
        debug!("Sent ping");

        tokio::select! {
            _ = ticker.tick() => {}
            () = conn.closed() => return,
        }

        let silence = liveness.since_last_ack();
        if silence > timeout {
            warn!(
                silence_ms = silence.as_millis() as u64,
                timeout_ms = timeout.as_millis() as u64,
                "no pong within keepalive timeout, closing connection"
            );
            conn.close();
            return;
        }
    }
}
