//! Domain layer for hidproxy-web.
//!
//! Plain types describing what a client can ask for and what it gets back.
//! Nothing here knows about sockets, axum or tokio.

pub mod config;
pub mod messages;

pub use config::WebConfig;
pub use messages::{StatusReport, UnsealResult, WebError, WebRequest, WebResponse};
