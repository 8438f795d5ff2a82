//! Reader statistics
//!
//! Counters and accumulated timings for the read paths. A
//! [`ReaderStats`] is shared via `Arc` and injected at handle
//! construction so tests and embedders can observe a single handle in
//! isolation instead of scraping process-global state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters and timers maintained by the read paths.
#[derive(Debug, Default)]
pub struct ReaderStats {
    /// Packets returned by the random-access read path
    pub packets_read: AtomicU64,
    /// Packets produced by the sequential scan path
    pub packets_scanned: AtomicU64,
    /// 1 MiB blocks fetched from disk by the scanner
    pub blocks_read: AtomicU64,
    /// Nanoseconds spent in random-access packet reads
    pub packet_read_nanos: AtomicU64,
    /// Nanoseconds spent in scan steps
    pub packet_scan_nanos: AtomicU64,
}

/// Point-in-time copy of a [`ReaderStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub packets_read: u64,
    pub packets_scanned: u64,
    pub blocks_read: u64,
    pub packet_read_nanos: u64,
    pub packet_scan_nanos: u64,
}

impl ReaderStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_read: self.packets_read.load(Ordering::Relaxed),
            packets_scanned: self.packets_scanned.load(Ordering::Relaxed),
            blocks_read: self.blocks_read.load(Ordering::Relaxed),
            packet_read_nanos: self.packet_read_nanos.load(Ordering::Relaxed),
            packet_scan_nanos: self.packet_scan_nanos.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drop guard that adds its elapsed lifetime to an accumulated
/// nanosecond counter.
pub(crate) struct NanoTimer<'a> {
    total: &'a AtomicU64,
    start: Instant,
}

impl<'a> NanoTimer<'a> {
    pub(crate) fn new(total: &'a AtomicU64) -> Self {
        Self {
            total,
            start: Instant::now(),
        }
    }
}

impl Drop for NanoTimer<'_> {
    fn drop(&mut self) {
        let nanos = u64::try_from(self.start.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.total.fetch_add(nanos, Ordering::Relaxed);
    }
}
