//! Exchange REST and WebSocket stream client library.
//!
//! Provides keepalive-managed WebSocket stream sessions with explicit
//! stop/done signalling, and typed services for the wallet REST endpoints
//! (withdrawals and travel-rule deposits).

pub mod config;
pub mod error;
pub mod models;
pub mod rest;
pub mod tls;
pub mod websocket;

pub use error::{CambistError, Result};
