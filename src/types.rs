//! Common types used throughout the blockfile reader

use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Timing and length information captured alongside one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureInfo {
    /// Wall-clock time the packet was captured
    pub timestamp: SystemTime,
    /// Original on-wire length of the packet
    pub length: u32,
    /// Captured (possibly truncated) length; never exceeds `length`
    pub captured_length: u32,
}

impl CaptureInfo {
    pub(crate) fn new(sec: u32, nsec: u32, length: u32, captured_length: u32) -> Self {
        Self {
            timestamp: UNIX_EPOCH + Duration::new(u64::from(sec), nsec),
            length,
            captured_length,
        }
    }
}

/// A single packet read out of a blockfile.
///
/// Scan-path packets share the 1 MiB block buffer they were parsed from
/// via refcounted [`Bytes`] slices; random-access packets own a freshly
/// read buffer. Either way the payload stays valid for as long as the
/// `Packet` is held.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Payload bytes; `data.len() == capture_info.captured_length`
    pub data: Bytes,
    /// Capture timing and lengths
    pub capture_info: CaptureInfo,
}

/// Packet positions resolved from an index for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Positions {
    /// Every packet in the segment matches
    All,
    /// Byte offsets of matching packet records, in delivery order
    List(Vec<u64>),
}

impl Positions {
    /// An explicit position set matching nothing.
    pub fn empty() -> Self {
        Self::List(Vec::new())
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}
