//! Shared fixtures: a synthetic blockfile builder and a minimal index
//! and query implementation for exercising the read paths.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use blockfile::{BLOCK_SIZE, BlockfileError, Positions, Query, Result, SegmentIndex};
use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Install the log subscriber so `RUST_LOG` makes the read paths'
/// tracing visible in test runs. Later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Offset of the first packet record within each block.
pub const FIRST_PACKET_OFFSET: u32 = 64;
/// Payload offset relative to each record start.
pub const PAYLOAD_OFFSET: u16 = 32;

/// One packet to place in a block.
#[derive(Clone)]
pub struct PacketSpec {
    pub payload: Vec<u8>,
    pub wire_length: u32,
    pub sec: u32,
    pub nsec: u32,
}

impl PacketSpec {
    pub fn new(payload_len: usize, seq: u32) -> Self {
        Self {
            payload: (0..payload_len).map(|i| (i % 251) as u8).collect(),
            wire_length: (payload_len as u32) * 2,
            sec: 1_700_000_000 + seq,
            nsec: seq * 10,
        }
    }
}

/// Builds blockfiles block by block and records each packet's absolute
/// file position.
#[derive(Default)]
pub struct SegmentBuilder {
    blocks: Vec<Vec<u8>>,
    positions: Vec<u64>,
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one 1 MiB block holding `packets`.
    pub fn block(&mut self, packets: &[PacketSpec]) -> &mut Self {
        self.block_raw(packets, packets.len() as u32, false)
    }

    /// Append a block whose declared packet count and next-offset chain
    /// can be forced inconsistent, for malformed-layout tests.
    pub fn block_raw(
        &mut self,
        packets: &[PacketSpec],
        declared_count: u32,
        zero_first_next: bool,
    ) -> &mut Self {
        let block_base = (self.blocks.len() * BLOCK_SIZE) as u64;
        let mut block = vec![0u8; BLOCK_SIZE];
        LittleEndian::write_u32(&mut block[12..16], declared_count);
        LittleEndian::write_u32(&mut block[16..20], FIRST_PACKET_OFFSET);

        let mut offset = FIRST_PACKET_OFFSET as usize;
        for (i, spec) in packets.iter().enumerate() {
            let record_len = PAYLOAD_OFFSET as usize + spec.payload.len();
            // 16-byte record alignment, like the capture ring buffer
            let stride = record_len.div_ceil(16) * 16;
            let last = i + 1 == packets.len();
            let next = if last || (zero_first_next && i == 0) {
                0
            } else {
                stride as u32
            };

            let record = &mut block[offset..offset + record_len];
            LittleEndian::write_u32(&mut record[0..4], next);
            LittleEndian::write_u32(&mut record[4..8], spec.sec);
            LittleEndian::write_u32(&mut record[8..12], spec.nsec);
            LittleEndian::write_u32(&mut record[12..16], spec.payload.len() as u32);
            LittleEndian::write_u32(&mut record[16..20], spec.wire_length);
            LittleEndian::write_u16(&mut record[24..26], PAYLOAD_OFFSET);
            record[PAYLOAD_OFFSET as usize..].copy_from_slice(&spec.payload);

            self.positions.push(block_base + offset as u64);
            offset += stride;
        }

        self.blocks.push(block);
        self
    }

    /// Absolute file positions of every packet written so far.
    pub fn positions(&self) -> &[u64] {
        &self.positions
    }

    /// Write the blockfile and an (empty but present) companion index
    /// next to it, returning the blockfile path.
    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        init_tracing();
        let path = dir.join(name);
        let mut file = fs::File::create(&path).expect("create blockfile");
        for block in &self.blocks {
            file.write_all(block).expect("write block");
        }
        file.sync_all().expect("sync blockfile");
        fs::write(blockfile::index_path(&path), b"test index").expect("write index");
        path
    }
}

/// Index stub: the file must exist, dumping echoes the key range.
#[derive(Debug)]
pub struct TestIndex {
    path: PathBuf,
}

impl SegmentIndex for TestIndex {
    fn open(path: &Path) -> Result<Self> {
        fs::metadata(path).map_err(BlockfileError::Io)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn dump(&self, out: &mut dyn Write, start: &[u8], end: &[u8]) -> Result<()> {
        writeln!(
            out,
            "index {:?}: {:02x?}..{:02x?}",
            self.path, start, end
        )?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Query resolving to a fixed position set.
pub struct FixedQuery(pub Positions);

impl fmt::Display for FixedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Positions::All => write!(f, "all"),
            Positions::List(list) => write!(f, "{} positions", list.len()),
        }
    }
}

impl Query<TestIndex> for FixedQuery {
    fn lookup_in(&self, _index: &TestIndex) -> Result<Positions> {
        Ok(self.0.clone())
    }
}

/// Query whose resolution always fails.
pub struct FailingQuery;

impl fmt::Display for FailingQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failing")
    }
}

impl Query<TestIndex> for FailingQuery {
    fn lookup_in(&self, _index: &TestIndex) -> Result<Positions> {
        Err(BlockfileError::Index("synthetic resolution failure".into()))
    }
}
