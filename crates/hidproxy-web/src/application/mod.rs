//! Application layer for hidproxy-web.
//!
//! Defines the [`MacroBackend`] seam the HTTP routes call, and
//! [`DeviceHandle`], the production backend that forwards each call to
//! executor D as a [`WebCommand`].

pub mod backend;

pub use backend::{password_keycodes, DeviceHandle, MacroBackend, WebCommand};

#[cfg(test)]
pub use backend::MockMacroBackend;
