//! Managed WebSocket stream sessions.
//!
//! This module is organized by concern:
//! - [`connection`] - Dialing an endpoint, directly or through a proxy
//! - [`proxy`] - Proxy resolution and HTTP CONNECT tunnelling
//! - [`session`] - Read loop, stop/done signalling
//! - `keepalive` - Ping cadence and dead-peer detection
//!
//! A session is started with [`serve`], which returns a [`DoneSignal`] and
//! a [`StopSignal`]. Frames are handed to the caller's handler one at a
//! time in arrival order; a terminal error goes to the error handler unless
//! the caller asked the session to stop.

pub mod connection;
mod keepalive;
pub mod proxy;
pub mod session;

use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{CambistError, Result};

pub use connection::connect;
pub use session::{DoneSignal, StopSignal, serve, start_session};

/// An established WebSocket connection, TLS-wrapped for `wss` endpoints.
pub type LiveStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default keepalive timeout, used both as ping cadence and as the
/// dead-peer threshold.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Target endpoint of a stream session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsConfig {
    endpoint: String,
}

impl WsConfig {
    /// Wraps a fully-formed stream URL.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    /// Endpoint for a single raw stream, e.g. `btcusdt@aggTrade`.
    #[must_use]
    pub fn raw_stream(base_url: &str, stream: &str) -> Self {
        Self::new(format!("{}/ws/{stream}", base_url.trim_end_matches('/')))
    }

    /// Endpoint multiplexing several streams over one connection. Frames on
    /// a combined stream are wrapped as `{"stream": ..., "data": ...}`.
    #[must_use]
    pub fn combined_stream(base_url: &str, streams: &[&str]) -> Self {
        Self::new(format!(
            "{}/stream?streams={}",
            base_url.trim_end_matches('/'),
            streams.join("/")
        ))
    }

    /// The target URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Connection and keepalive settings applied to every session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsSettings {
    /// Send pings and drop the connection when pongs stop arriving.
    pub keepalive: bool,
    /// Ping cadence, and the longest tolerated silence between pongs.
    pub timeout: Duration,
    /// Proxy for the handshake. Takes precedence over `HTTP_PROXY` and
    /// friends; `None` or an empty string means environment resolution.
    pub proxy_override: Option<String>,
    /// PEM file of pinned root certificates for `wss` endpoints.
    pub ca_file: Option<PathBuf>,
}

impl Default for WsSettings {
    fn default() -> Self {
        Self {
            keepalive: false,
            timeout: DEFAULT_TIMEOUT,
            proxy_override: None,
            ca_file: None,
        }
    }
}

impl WsSettings {
    /// Checks that the settings can drive a session.
    ///
    /// # Errors
    ///
    /// Returns [`CambistError::Config`] if keepalive is enabled with a zero
    /// timeout.
    pub fn validate(&self) -> Result<()> {
        if self.keepalive && self.timeout.is_zero() {
            return Err(CambistError::Config(
                "keepalive timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
