//! Per-pipeline counters

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by a pipeline's reader and writer
#[derive(Debug)]
pub struct PipelineStats {
    started_at: DateTime<Utc>,
    pub(crate) packets_read: AtomicU64,
    pub(crate) packets_dropped: AtomicU64,
    pub(crate) packets_written: AtomicU64,
    pub(crate) short_writes: AtomicU64,
    pub(crate) connection_attempts: AtomicU64,
    pub(crate) connections: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            packets_read: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            packets_written: AtomicU64::new(0),
            short_writes: AtomicU64::new(0),
            connection_attempts: AtomicU64::new(0),
            connections: AtomicU64::new(0),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            packets_read: self.packets_read.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            packets_written: self.packets_written.load(Ordering::Relaxed),
            short_writes: self.short_writes.load(Ordering::Relaxed),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            connections: self.connections.load(Ordering::Relaxed),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub packets_read: u64,
    /// Packets discarded because the queue was full
    pub packets_dropped: u64,
    pub packets_written: u64,
    /// Float writes the sink only partially accepted
    pub short_writes: u64,
    pub connection_attempts: u64,
    /// Attempts that delivered at least one packet
    pub connections: u64,
}

impl StatsSnapshot {
    /// Fraction of read packets that were dropped
    pub fn drop_rate(&self) -> f32 {
        if self.packets_read == 0 {
            0.0
        } else {
            self.packets_dropped as f32 / self.packets_read as f32
        }
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_drop_rate() {
        let stats = PipelineStats::new();
        assert_eq!(stats.snapshot().drop_rate(), 0.0);

        for _ in 0..4 {
            PipelineStats::bump(&stats.packets_read);
        }
        PipelineStats::bump(&stats.packets_dropped);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.packets_read, 4);
        assert_eq!(snapshot.packets_dropped, 1);
        assert_eq!(snapshot.drop_rate(), 0.25);
    }
}
