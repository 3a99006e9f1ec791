//! Listener counters.
//!
//! Tracks how many messages arrived, how they decoded and how many
//! observer callbacks ran, without keeping packet contents.

use crate::listener::packet::PacketKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared between the listener and its worker thread.
#[derive(Debug)]
pub struct ListenerStats {
    /// Raw messages taken from the transport
    messages_received: AtomicU64,
    switch_packets: AtomicU64,
    battery_packets: AtomicU64,
    fused_packets: AtomicU64,
    /// ACC/GYRO packets from old firmware
    legacy_dropped: AtomicU64,
    /// Packets with a type this listener does not know
    unknown_dropped: AtomicU64,
    malformed: AtomicU64,
    /// Observer callbacks invoked
    dispatches: AtomicU64,
    started_at: DateTime<Utc>,
}

impl Default for ListenerStats {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerStats {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            switch_packets: AtomicU64::new(0),
            battery_packets: AtomicU64::new(0),
            fused_packets: AtomicU64::new(0),
            legacy_dropped: AtomicU64::new(0),
            unknown_dropped: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }

    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_packet(&self, kind: PacketKind) {
        let counter = match kind {
            PacketKind::Switch => &self.switch_packets,
            PacketKind::Battery => &self.battery_packets,
            PacketKind::Fused => &self.fused_packets,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_legacy(&self) {
        self.legacy_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown(&self) {
        self.unknown_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatches(&self, count: u64) {
        self.dispatches.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            switch_packets: self.switch_packets.load(Ordering::Relaxed),
            battery_packets: self.battery_packets.load(Ordering::Relaxed),
            fused_packets: self.fused_packets.load(Ordering::Relaxed),
            legacy_dropped: self.legacy_dropped.load(Ordering::Relaxed),
            unknown_dropped: self.unknown_dropped.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            dispatches: self.dispatches.load(Ordering::Relaxed),
            started_at: self.started_at,
            duration_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.snapshot();
        format!(
            "Listener Statistics:\n\
             - Messages received: {}\n\
             - Switch packets: {}\n\
             - Battery packets: {}\n\
             - Fused packets: {}\n\
             - Legacy packets dropped: {}\n\
             - Unknown packets dropped: {}\n\
             - Malformed messages: {}\n\
             - Observer callbacks: {}\n\
             - Duration: {} seconds",
            stats.messages_received,
            stats.switch_packets,
            stats.battery_packets,
            stats.fused_packets,
            stats.legacy_dropped,
            stats.unknown_dropped,
            stats.malformed,
            stats.dispatches,
            stats.duration_secs
        )
    }
}

/// Point-in-time copy of [`ListenerStats`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub messages_received: u64,
    pub switch_packets: u64,
    pub battery_packets: u64,
    pub fused_packets: u64,
    pub legacy_dropped: u64,
    pub unknown_dropped: u64,
    pub malformed: u64,
    pub dispatches: u64,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
}

impl StatsSnapshot {
    /// Packets that decoded into a dispatchable kind.
    pub fn decoded(&self) -> u64 {
        self.switch_packets + self.battery_packets + self.fused_packets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = ListenerStats::new();
        stats.record_message();
        stats.record_message();
        stats.record_packet(PacketKind::Fused);
        stats.record_legacy();
        stats.record_dispatches(2);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.fused_packets, 1);
        assert_eq!(snapshot.decoded(), 1);
        assert_eq!(snapshot.legacy_dropped, 1);
        assert_eq!(snapshot.dispatches, 2);
    }

    #[test]
    fn test_summary() {
        let stats = ListenerStats::new();
        stats.record_malformed();
        let summary = stats.summary();
        assert!(summary.contains("Malformed messages: 1"));
        assert!(summary.contains("Observer callbacks: 0"));
    }
}
