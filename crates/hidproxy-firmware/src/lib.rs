//! hidproxy-firmware library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the `hid-proxy` binary in `main.rs` share the same module tree.
//!
//! # Layer rules
//!
//! - `application` depends on `hidproxy-core` and on the adapter traits in
//!   `infrastructure`, never on a concrete adapter.
//! - `infrastructure` holds the adapters (USB, flash, NFC, MQTT, config)
//!   plus their mock and simulated implementations.

pub mod application;
pub mod infrastructure;
