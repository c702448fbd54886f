//! Statistics for relays and connections

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Live counters for one publisher's relay
///
/// Updated from the relay tasks with relaxed atomics; read via
/// [`RelayStats::snapshot`].
#[derive(Debug)]
pub struct RelayStats {
    started_at: Instant,
    packets_forwarded: AtomicU64,
    bytes_forwarded: AtomicU64,
    packets_dropped: AtomicU64,
    keyframe_requests: AtomicU64,
}

impl RelayStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            packets_forwarded: AtomicU64::new(0),
            bytes_forwarded: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            keyframe_requests: AtomicU64::new(0),
        }
    }

    /// Record a packet written to the outbound track
    pub fn record_forwarded(&self, payload_len: usize) {
        self.packets_forwarded.fetch_add(1, Ordering::Relaxed);
        self.bytes_forwarded
            .fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    /// Record a packet that reached no subscriber
    pub fn record_dropped(&self) {
        self.packets_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a keyframe request sent upstream
    pub fn record_keyframe_request(&self) {
        self.keyframe_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough copy of the counters
    pub fn snapshot(&self) -> RelayStatsSnapshot {
        RelayStatsSnapshot {
            duration: self.started_at.elapsed(),
            packets_forwarded: self.packets_forwarded.load(Ordering::Relaxed),
            bytes_forwarded: self.bytes_forwarded.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            keyframe_requests: self.keyframe_requests.load(Ordering::Relaxed),
        }
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time relay statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStatsSnapshot {
    /// Time since the relay started
    pub duration: Duration,
    /// Packets written to the outbound track
    pub packets_forwarded: u64,
    /// Payload bytes written to the outbound track
    pub bytes_forwarded: u64,
    /// Packets dropped because no subscriber was attached
    pub packets_dropped: u64,
    /// Keyframe requests sent to the publisher
    pub keyframe_requests: u64,
}

impl RelayStatsSnapshot {
    /// Payload bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes_forwarded * 8) / secs
        } else {
            0
        }
    }
}

/// Server-wide connection counters
#[derive(Debug, Default)]
pub struct ServerStats {
    total_connections: AtomicU64,
    active_connections: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted connection
    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished connection
    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Connections accepted since start
    pub fn total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    /// Connections currently open
    pub fn active_connections(&self) -> u64 {
        self.active_connections.load(Ordering::Relaxed)
    }
}
