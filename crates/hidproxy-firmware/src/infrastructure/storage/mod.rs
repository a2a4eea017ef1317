//! Storage infrastructure: the configuration file.
//!
//! Macros, the password hash and WiFi settings live in the flash key/value
//! store (`infrastructure::kvstore`).  This module only covers the TOML file
//! that tells the host binary where that flash image is and how the device
//! should behave.

pub mod config;
