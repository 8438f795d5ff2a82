//! Blockfile on-disk format
//!
//! A blockfile is a sequence of fixed-size 1 MiB blocks. Each block
//! starts with a ring-buffer block descriptor carrying the packet count
//! and the offset of the first packet record; records then form a
//! linked list inside the block, each header holding the relative
//! offset of the next one (zero marks the last record of a block).
//!
//! All fields are little-endian and decoded at fixed offsets with
//! explicit bounds checks. Headers whose declared offsets or lengths
//! escape the bytes actually available are rejected rather than read
//! out-of-bounds, even though the files are normally self-produced and
//! trusted.

use crate::error::{BlockfileError, Result};
use crate::types::CaptureInfo;
use byteorder::{ByteOrder, LittleEndian};

/// Fixed size of one block: 1 MiB.
pub const BLOCK_SIZE: usize = 1 << 20;

/// Bytes of the block descriptor we consume.
pub(crate) const BLOCK_HEADER_LEN: usize = 20;

/// Bytes of a packet record header carrying the fields we care about.
/// The on-disk record header is longer; these 28 bytes cover timing,
/// lengths, the payload offset, and the next-record link.
pub(crate) const PACKET_HEADER_LEN: usize = 28;

/// Parsed block descriptor fields.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BlockHeader {
    /// Number of packet records in this block
    pub num_pkts: u32,
    /// Offset of the first record, relative to the block start
    pub offset_to_first_pkt: u32,
}

impl BlockHeader {
    /// Decode a block descriptor from the start of a block buffer.
    ///
    /// `file_offset` is only used to report where in the file a
    /// malformed descriptor was found.
    pub(crate) fn parse(buf: &[u8], file_offset: u64) -> Result<Self> {
        if buf.len() < BLOCK_HEADER_LEN {
            return Err(BlockfileError::Format {
                offset: file_offset,
                reason: format!(
                    "block too short for descriptor: {} < {BLOCK_HEADER_LEN} bytes",
                    buf.len()
                ),
            });
        }
        let num_pkts = LittleEndian::read_u32(&buf[12..16]);
        let offset_to_first_pkt = LittleEndian::read_u32(&buf[16..20]);

        if num_pkts > 0 && offset_to_first_pkt as usize + PACKET_HEADER_LEN > buf.len() {
            return Err(BlockfileError::Format {
                offset: file_offset,
                reason: format!(
                    "first packet offset {offset_to_first_pkt} escapes {}-byte block",
                    buf.len()
                ),
            });
        }
        Ok(Self {
            num_pkts,
            offset_to_first_pkt,
        })
    }
}

/// Parsed packet record header fields.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PacketHeader {
    /// Relative offset of the next record; zero for the last record
    pub next_offset: u32,
    /// Capture timestamp, seconds part
    pub sec: u32,
    /// Capture timestamp, nanoseconds part
    pub nsec: u32,
    /// Captured (possibly truncated) payload length
    pub captured_length: u32,
    /// Original on-wire length
    pub length: u32,
    /// Payload offset relative to the record start
    pub mac: u16,
}

impl PacketHeader {
    /// Decode a packet record header from `buf`, which must hold at
    /// least [`PACKET_HEADER_LEN`] bytes.
    ///
    /// `file_offset` locates the record in the file for error reports.
    pub(crate) fn parse(buf: &[u8], file_offset: u64) -> Result<Self> {
        if buf.len() < PACKET_HEADER_LEN {
            return Err(BlockfileError::Format {
                offset: file_offset,
                reason: format!(
                    "packet header truncated: {} < {PACKET_HEADER_LEN} bytes",
                    buf.len()
                ),
            });
        }
        let header = Self {
            next_offset: LittleEndian::read_u32(&buf[0..4]),
            sec: LittleEndian::read_u32(&buf[4..8]),
            nsec: LittleEndian::read_u32(&buf[8..12]),
            captured_length: LittleEndian::read_u32(&buf[12..16]),
            length: LittleEndian::read_u32(&buf[16..20]),
            mac: LittleEndian::read_u16(&buf[24..26]),
        };
        if header.captured_length > header.length {
            return Err(BlockfileError::Format {
                offset: file_offset,
                reason: format!(
                    "captured length {} exceeds packet length {}",
                    header.captured_length, header.length
                ),
            });
        }
        if header.captured_length as usize > BLOCK_SIZE {
            return Err(BlockfileError::Format {
                offset: file_offset,
                reason: format!(
                    "captured length {} exceeds block size {BLOCK_SIZE}",
                    header.captured_length
                ),
            });
        }
        Ok(header)
    }

    pub(crate) fn capture_info(&self) -> CaptureInfo {
        CaptureInfo::new(self.sec, self.nsec, self.length, self.captured_length)
    }
}
