//! MQTT publishing adapter.
//!
//! The proxy publishes two kinds of messages: its lock state on
//! `<prefix>/lock` whenever it seals or unseals, and the topic/payload pairs
//! carried by MQTT macro actions.  The broker connection itself is an
//! external collaborator behind [`MqttPublisher`].

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

/// Error type for publish attempts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MqttError {
    #[error("not connected to broker")]
    NotConnected,

    #[error("publish to '{topic}' failed: {reason}")]
    PublishFailed { topic: String, reason: String },
}

/// Seal state as announced on `<prefix>/lock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Unlocked,
}

impl LockState {
    pub fn as_str(self) -> &'static str {
        match self {
            LockState::Locked => "locked",
            LockState::Unlocked => "unlocked",
        }
    }
}

/// Topic carrying the seal state.
pub fn lock_topic(prefix: &str) -> String {
    format!("{prefix}/lock")
}

/// Topic carrying the online announcement.
pub fn status_topic(prefix: &str) -> String {
    format!("{prefix}/status")
}

/// Default topic prefix: `hidproxy-` followed by the last two bytes of the
/// board id in lowercase hex.
pub fn default_topic_prefix(device_id: &[u8]) -> String {
    match device_id {
        [.., a, b] => format!("hidproxy-{a:02x}{b:02x}"),
        _ => "hidproxy".to_string(),
    }
}

/// Contract with the MQTT client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MqttPublisher: Send + Sync {
    /// Publishes `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`MqttError`] when the broker is unreachable or rejects the
    /// message.
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), MqttError>;
}

/// Publisher used when no broker is configured: logs what would be sent.
#[derive(Debug, Default)]
pub struct LoggingPublisher;

#[async_trait]
impl MqttPublisher for LoggingPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<(), MqttError> {
        info!("mqtt: {topic} = {payload}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prefix_uses_last_two_id_bytes() {
        let id = [0xE6, 0x60, 0x58, 0x38, 0x83, 0x1A, 0x2B, 0x2F];
        assert_eq!(default_topic_prefix(&id), "hidproxy-2b2f");
    }

    #[test]
    fn test_default_prefix_for_short_id() {
        assert_eq!(default_topic_prefix(&[1]), "hidproxy");
    }

    #[test]
    fn test_lock_topic_and_payloads() {
        assert_eq!(lock_topic("hidproxy-2b2f"), "hidproxy-2b2f/lock");
        assert_eq!(LockState::Locked.as_str(), "locked");
        assert_eq!(LockState::Unlocked.as_str(), "unlocked");
    }

    #[tokio::test]
    async fn test_mock_publisher_receives_lock_message() {
        // Arrange
        let mut mock = MockMqttPublisher::new();
        mock.expect_publish()
            .withf(|topic, payload| topic == "p/lock" && payload == "locked")
            .times(1)
            .returning(|_, _| Ok(()));

        // Act
        let result = mock.publish(&lock_topic("p"), LockState::Locked.as_str()).await;

        // Assert
        assert!(result.is_ok());
    }

    #[test]
    fn test_logging_publisher_always_succeeds() {
        assert!(tokio_test::block_on(LoggingPublisher.publish("t", "m")).is_ok());
    }
}
