//! Crate-level error types.
//!
//! [`CambistError`] unifies every error source (configuration, proxy
//! resolution, WebSocket handshake and session, REST calls, JSON) behind a
//! single enum so callers can match on the variant they care about while
//! still using the `?` operator for easy propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CambistError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum CambistError {
    /// An environment variable held a value that could not be interpreted.
    #[error("configuration error: {0}")]
    Config(String),

    /// The pinned CA file could not be read or turned into a TLS config.
    #[error("tls error: {0}")]
    Tls(String),

    /// The stream endpoint is not a usable `ws://` or `wss://` URL.
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// The explicit proxy override could not be parsed as a URL.
    #[error("unable to parse proxy override ({value}): {reason}")]
    ProxyOverride { value: String, reason: String },

    /// The resolved proxy cannot be used (unsupported scheme, bad env value).
    #[error("proxy error: {0}")]
    Proxy(String),

    /// The proxy answered the CONNECT request with a non-success status.
    #[error("proxy refused tunnel: {status}")]
    ProxyConnect { status: String },

    /// Socket-level failure while dialing or tunnelling.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The WebSocket handshake failed. `body` holds whatever diagnostic
    /// payload the server returned with its rejection (possibly empty).
    #[error("response from failed dial call: {body}, original dialer error: {source}")]
    Handshake {
        body: String,
        #[source]
        source: tungstenite::Error,
    },

    /// The WebSocket handshake failed and its response body could not be
    /// decoded either.
    #[error(
        "unable to read response from failed dial call, error: {reason}, original dialer error: {source}"
    )]
    HandshakeBodyUnreadable {
        reason: String,
        #[source]
        source: tungstenite::Error,
    },

    /// A WebSocket operation (read, ping) failed on a live connection.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The peer sent a close frame.
    #[error("connection closed by peer (code {code}): {reason}")]
    PeerClosed { code: u16, reason: String },

    /// The inbound stream ended without a close frame.
    #[error("websocket stream ended")]
    StreamEnded,

    /// The connection was closed locally (stop request or keepalive timeout).
    #[error("use of closed connection")]
    ConnectionClosed,

    /// An HTTP request to the REST API failed at the transport level.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The REST API answered with an error status.
    #[error("api error (status {status}, code {code}): {message}")]
    Api {
        status: u16,
        code: i64,
        message: String,
    },

    /// A keyed or signed REST request was issued on a client without an
    /// API key.
    #[error("endpoint requires an API key")]
    MissingApiKey,

    /// A signed REST request was issued on a client without a signer.
    #[error("signed endpoint requires a request signer")]
    MissingSigner,

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A URL could not be parsed.
    #[error("url error: {0}")]
    Url(#[from] url::ParseError),
}
