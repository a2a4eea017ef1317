//! Infrastructure layer for hidproxy-web.
//!
//! Binds the TCP listener, routes requests to the [`MacroBackend`] and maps
//! [`WebError`] onto HTTP status codes.
//!
//! [`MacroBackend`]: crate::application::MacroBackend
//! [`WebError`]: crate::domain::WebError

pub mod http_server;

pub use http_server::{router, run_server};
