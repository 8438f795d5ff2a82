//! Sequential block scanner
//!
//! The scanner walks a blockfile block by block, yielding every packet
//! in file order. It tracks two levels of structure: the fixed 1 MiB
//! block framing, and the linked list of variable-length packet records
//! inside each block. A record with a zero next-offset before the
//! block's last declared packet is the one layout the format does not
//! support and terminates the scan with a format error.

use crate::error::{BlockfileError, Result};
use crate::format::{BLOCK_SIZE, BlockHeader, PACKET_HEADER_LEN, PacketHeader};
use crate::stats::{NanoTimer, ReaderStats};
use crate::types::Packet;
use bytes::{Bytes, BytesMut};
use std::fs::File;
use std::io::ErrorKind;
use std::os::unix::fs::FileExt;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// No block loaded yet, or the current block is fully consumed
    NeedBlock,
    /// A block is loaded and packets remain in it
    InBlock,
    /// Clean end of segment reached
    Done,
    /// A read or format error was returned; the scan is over
    Errored,
}

/// Scanner yielding every packet of a blockfile in file order.
pub(crate) struct BlockScanner<'a> {
    file: &'a File,
    stats: &'a ReaderStats,
    state: ScanState,
    /// Current block bytes; packet payloads are slices of this buffer
    block: Bytes,
    header: Option<BlockHeader>,
    current: Option<PacketHeader>,
    /// Packets consumed from the current block
    block_packets_read: u32,
    /// File offset of the next block to load
    next_block_offset: u64,
    /// Offset of the current packet record within the block
    packet_offset: usize,
}

impl<'a> BlockScanner<'a> {
    pub(crate) fn new(file: &'a File, stats: &'a ReaderStats) -> Self {
        Self {
            file,
            stats,
            state: ScanState::NeedBlock,
            block: Bytes::new(),
            header: None,
            current: None,
            block_packets_read: 0,
            next_block_offset: 0,
            packet_offset: 0,
        }
    }

    /// Advance to the next packet and return it.
    ///
    /// `Ok(None)` signals clean end of segment. After an error or the
    /// end of the segment, further calls return `Ok(None)`.
    pub(crate) fn next_packet(&mut self) -> Result<Option<Packet>> {
        let _timer = NanoTimer::new(&self.stats.packet_scan_nanos);
        if matches!(self.state, ScanState::Done | ScanState::Errored) {
            return Ok(None);
        }
        match self.advance() {
            Ok(true) => Ok(Some(self.current_packet()?)),
            Ok(false) => {
                self.state = ScanState::Done;
                Ok(None)
            }
            Err(err) => {
                self.state = ScanState::Errored;
                Err(err)
            }
        }
    }

    /// Move to the next packet record, loading blocks as needed.
    /// Returns false on clean end of file.
    fn advance(&mut self) -> Result<bool> {
        while self.needs_block() {
            if !self.load_block()? {
                return Ok(false);
            }
        }

        self.block_packets_read += 1;
        let header = match self.header {
            Some(header) => header,
            None => {
                return Err(BlockfileError::Format {
                    offset: self.current_block_offset(),
                    reason: "no block loaded".into(),
                });
            }
        };

        self.packet_offset = match &self.current {
            None => header.offset_to_first_pkt as usize,
            Some(prev) if prev.next_offset != 0 => self.packet_offset + prev.next_offset as usize,
            // A zero next-offset with packets still expected in this
            // block is a layout we do not support.
            Some(_) => {
                return Err(BlockfileError::Format {
                    offset: self.current_packet_file_offset(),
                    reason: "block layout not supported: zero next-packet offset before the last packet".into(),
                });
            }
        };

        let record_offset = self.current_packet_file_offset();
        if self.packet_offset + PACKET_HEADER_LEN > self.block.len() {
            return Err(BlockfileError::Format {
                offset: record_offset,
                reason: format!(
                    "packet record at block offset {} escapes the block",
                    self.packet_offset
                ),
            });
        }
        let packet = PacketHeader::parse(&self.block[self.packet_offset..], record_offset)?;

        // Validate the payload window before anyone slices it.
        let payload_start = self.packet_offset + packet.mac as usize;
        let payload_end = payload_start + packet.captured_length as usize;
        if payload_end > self.block.len() {
            return Err(BlockfileError::Format {
                offset: record_offset,
                reason: format!(
                    "payload of {} bytes at block offset {payload_start} escapes the block",
                    packet.captured_length
                ),
            });
        }

        self.current = Some(packet);
        ReaderStats::increment(&self.stats.packets_scanned);
        Ok(true)
    }

    fn needs_block(&self) -> bool {
        match (self.state, self.header) {
            (ScanState::NeedBlock, _) | (_, None) => true,
            (_, Some(header)) => self.block_packets_read == header.num_pkts,
        }
    }

    /// Load the next 1 MiB block. Returns false at end of file.
    fn load_block(&mut self) -> Result<bool> {
        ReaderStats::increment(&self.stats.blocks_read);
        let mut buf = BytesMut::zeroed(BLOCK_SIZE);
        match self.file.read_exact_at(&mut buf, self.next_block_offset) {
            Ok(()) => {}
            // A short or empty trailing read means the segment ends here.
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return Ok(false),
            Err(err) => {
                return Err(BlockfileError::Read {
                    offset: self.next_block_offset,
                    source: err,
                });
            }
        }

        let header = BlockHeader::parse(&buf, self.next_block_offset)?;
        trace!(
            "loaded block at {}: {} packets, first at {}",
            self.next_block_offset, header.num_pkts, header.offset_to_first_pkt
        );

        self.block = buf.freeze();
        self.header = Some(header);
        self.next_block_offset += BLOCK_SIZE as u64;
        self.block_packets_read = 0;
        self.current = None;
        self.state = ScanState::InBlock;
        Ok(true)
    }

    /// Materialize the current packet as a view into the block buffer.
    fn current_packet(&self) -> Result<Packet> {
        let packet = match &self.current {
            Some(packet) => packet,
            None => {
                return Err(BlockfileError::Format {
                    offset: self.current_block_offset(),
                    reason: "no current packet".into(),
                });
            }
        };
        let start = self.packet_offset + packet.mac as usize;
        let end = start + packet.captured_length as usize;
        Ok(Packet {
            data: self.block.slice(start..end),
            capture_info: packet.capture_info(),
        })
    }

    /// File offset of the block currently loaded.
    fn current_block_offset(&self) -> u64 {
        self.next_block_offset.saturating_sub(BLOCK_SIZE as u64)
    }

    /// File offset of the current packet record.
    fn current_packet_file_offset(&self) -> u64 {
        self.current_block_offset() + self.packet_offset as u64
    }
}
