//! HTTP service configuration.

use std::net::SocketAddr;

/// Runtime settings for the bulk macro service.
///
/// The firmware builds this from the `[web]` section of its TOML file.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Address the listener binds to.
    pub bind_addr: SocketAddr,

    /// Depth of the request channel to executor D.  Further requests wait
    /// for a free slot.
    pub request_queue: usize,
}

impl Default for WebConfig {
    /// | Field         | Default        |
    /// |---------------|----------------|
    /// | bind_addr     | `0.0.0.0:8080` |
    /// | request_queue | 4              |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            request_queue: 4,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_port_is_8080() {
        // Arrange / Act
        let cfg = WebConfig::default();
        // Assert
        assert_eq!(cfg.bind_addr.port(), 8080);
        assert!(cfg.bind_addr.ip().is_unspecified());
    }

    #[test]
    fn test_default_request_queue_is_small() {
        assert_eq!(WebConfig::default().request_queue, 4);
    }
}
