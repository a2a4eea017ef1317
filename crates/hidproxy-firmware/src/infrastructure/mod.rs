//! Infrastructure layer for the firmware.
//!
//! Contains the adapters that touch the outside world: the USB host and
//! device stacks, the flash-backed key/value store, the NFC reader, the MQTT
//! client, the configuration file, and the queues between the two executors.
//!
//! **Dependency rule**: application code reaches hardware only through the
//! traits declared here (`UpstreamHost`, `DownstreamDevice`, `NfcKeyService`,
//! `MqttPublisher`, `BlockDevice`), so every use case can run against the
//! mock implementations in tests.

pub mod kvstore;
pub mod mqtt;
pub mod nfc;
pub mod queues;
pub mod storage;
pub mod usb;
