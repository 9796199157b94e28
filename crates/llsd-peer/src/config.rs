//! Peer configuration.

use std::ops::Range;

/// Configuration for the peer server and its port search.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Interface to bind. Loopback unless a test rig needs otherwise.
    pub host: String,
    /// First candidate port.
    pub port_base: u16,
    /// Number of sequential candidate ports to try.
    pub port_span: u16,
    /// Echo decoded requests at debug level.
    pub echo_requests: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port_base: 8000,
            port_span: 20,
            echo_requests: false,
        }
    }
}

impl PeerConfig {
    /// Candidate ports in the order they are tried.
    ///
    /// The end is exclusive and saturates at the top of the port space, so
    /// 65535 is never a candidate and a base of 65535 yields an empty
    /// range.
    pub fn port_range(&self) -> Range<u16> {
        let end = self.port_base.saturating_add(self.port_span);
        self.port_base..end
    }
}

/// True when `LLSD_PEER_VERBOSE` holds anything but "" or "0".
pub fn verbose_from_env() -> bool {
    std::env::var("LLSD_PEER_VERBOSE")
        .map(|v| !v.is_empty() && v != "0")
        .unwrap_or(false)
}
