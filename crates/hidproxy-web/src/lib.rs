//! hidproxy-web library crate.
//!
//! The bulk macro service: a small HTTP API that lets a browser or `curl`
//! download and replace the whole macro set as `macros.txt`, read the device
//! status, and unseal the device with a typed password.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! HTTP client
//!         ↕
//! [hidproxy-web]
//!   ├── domain/           Pure types: requests, responses, WebError, WebConfig
//!   ├── application/      MacroBackend seam, DeviceHandle (mpsc → executor D)
//!   └── infrastructure/
//!         └── http_server/ axum router and serve loop
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain`, `hidproxy-core` and tokio channels.
//! - `infrastructure` depends on all other layers plus `axum`.
//!
//! # For beginners: who touches the flash?
//!
//! Only executor D may touch the key-value store.  The HTTP handlers never
//! read macros themselves: each request becomes a [`application::WebCommand`]
//! posted over a bounded channel, and the handler waits on a one-shot reply.
//! Executor D answers between keystrokes, so a slow upload never reorders or
//! drops typing.

/// Domain layer: request/response types and configuration (no I/O).
pub mod domain;

/// Application layer: the backend seam and the channel handle to executor D.
pub mod application;

/// Infrastructure layer: HTTP routes and the server loop.
pub mod infrastructure;
