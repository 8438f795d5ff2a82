//! Blockfile segment handle
//!
//! A [`BlockFile`] owns one open capture segment and its companion
//! index, and serves three read operations over them: a full sequential
//! scan, query position resolution, and the query-driven packet lookup.
//! A read/write lock keeps `close()` from invalidating the descriptors
//! while a query is still using them: queries hold the read side for
//! their whole streaming section, `close()` takes the write side.

use crate::config::ReaderConfig;
use crate::error::{BlockfileError, Result};
use crate::format::{PACKET_HEADER_LEN, PacketHeader};
use crate::index::{Query, SegmentIndex, index_path};
use crate::scan::BlockScanner;
use crate::stats::{NanoTimer, ReaderStats};
use crate::stream::{CancelToken, PacketSink, PacketStream, packet_channel};
use crate::types::{Packet, Positions};
use bytes::BytesMut;
use std::fs::File;
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, trace};

/// The open descriptors behind a handle. Both are present until
/// `close()` takes them; no operation ever observes one without the
/// other.
#[derive(Debug)]
struct Resources<I> {
    file: File,
    index: I,
}

/// Handle to a single blockfile segment on disk and its index.
#[derive(Debug)]
pub struct BlockFile<I: SegmentIndex> {
    name: PathBuf,
    resources: Arc<RwLock<Option<Resources<I>>>>,
    /// Fired once by `close()`; in-flight queries stop at their next
    /// packet boundary when they observe it.
    done: CancelToken,
    stats: Arc<ReaderStats>,
    config: ReaderConfig,
}

impl<I: SegmentIndex> BlockFile<I> {
    /// Open a named blockfile and its index with default configuration
    /// and fresh statistics.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(path, ReaderConfig::default(), Arc::default())
    }

    /// Open a named blockfile and its index.
    ///
    /// The index path is derived from the blockfile path (see
    /// [`index_path`]). If the index fails to open, the blockfile
    /// descriptor is released before returning: a partial open never
    /// leaks.
    pub fn open_with(
        path: impl Into<PathBuf>,
        config: ReaderConfig,
        stats: Arc<ReaderStats>,
    ) -> Result<Self> {
        let path = path.into();
        debug!("opening blockfile {:?}", path);
        let file = File::open(&path).map_err(|source| BlockfileError::Open {
            path: path.clone(),
            source,
        })?;
        let index = match I::open(&index_path(&path)) {
            Ok(index) => index,
            Err(err) => {
                drop(file);
                return Err(BlockfileError::OpenIndex {
                    path,
                    source: Box::new(err),
                });
            }
        };
        Ok(Self {
            name: path,
            resources: Arc::new(RwLock::new(Some(Resources { file, index }))),
            done: CancelToken::new(),
            stats,
            config,
        })
    }

    /// Path of the file underlying this blockfile.
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Statistics shared by every operation on this handle.
    pub fn stats(&self) -> Arc<ReaderStats> {
        Arc::clone(&self.stats)
    }

    /// Close this blockfile.
    ///
    /// Fires the shutdown signal, waits for every in-flight query to
    /// release the read lock, then closes the index and releases the
    /// file descriptor. Both closes are attempted; the first error is
    /// returned. Resources are cleared either way, so later operations
    /// see an empty handle instead of stale descriptors.
    pub async fn close(&self) -> Result<()> {
        debug!("closing blockfile {:?}", self.name);
        self.done.cancel();
        let mut guard = self.resources.write().await;
        trace!("closing blockfile descriptors {:?}", self.name);
        let Some(mut resources) = guard.take() else {
            return Ok(());
        };
        let mut first_err = None;
        if let Err(err) = resources.index.close() {
            first_err = Some(err);
        }
        // Dropping the read-only descriptor releases it; there is no
        // separate failure to observe on this side.
        drop(resources);
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Stream every packet in the segment, in file order.
    ///
    /// The read lock is acquired before this returns and moves into a
    /// background producer task; it is released exactly when the
    /// returned stream is exhausted, erred, or abandoned.
    pub async fn all_packets(&self) -> PacketStream {
        let (sink, stream) = packet_channel(self.config.stream_capacity);
        let guard = Arc::clone(&self.resources).read_owned().await;
        let stats = Arc::clone(&self.stats);
        let name = self.name.clone();
        tokio::spawn(async move {
            let Some(resources) = guard.as_ref() else {
                sink.close(None);
                return;
            };
            let mut scanner = BlockScanner::new(&resources.file, &stats);
            loop {
                match scanner.next_packet() {
                    Ok(Some(packet)) => {
                        if !sink.send(packet).await {
                            trace!("blockfile {:?} scan abandoned by consumer", name);
                            return;
                        }
                    }
                    Ok(None) => {
                        sink.close(None);
                        return;
                    }
                    Err(err) => {
                        sink.close(Some(err));
                        return;
                    }
                }
            }
        });
        stream
    }

    /// Resolve the positions of all packets matched by `query`.
    ///
    /// Returns an empty position list (not an error) once the handle is
    /// closed.
    pub async fn positions<Q: Query<I>>(&self, query: &Q) -> Result<Positions> {
        let guard = self.resources.read().await;
        match guard.as_ref() {
            Some(resources) => query.lookup_in(&resources.index),
            None => Ok(Positions::empty()),
        }
    }

    /// Stream all packets matched by `query` into `sink`.
    ///
    /// The sink is closed exactly once on every path: with an index or
    /// read error when resolution or a packet read fails, with
    /// [`BlockfileError::Cancelled`] when `ctx` fired, and with no
    /// error otherwise. Explicit positions are visited in the order the
    /// index returned them; a failing offset aborts the query rather
    /// than being skipped.
    pub async fn lookup<Q: Query<I>>(&self, ctx: &CancelToken, query: &Q, sink: PacketSink) {
        let guard = self.resources.read().await;
        debug!("blockfile {:?} looking up query {}", self.name, query);
        let start = Instant::now();
        let Some(resources) = guard.as_ref() else {
            sink.close(None);
            return;
        };
        let positions = match query.lookup_in(&resources.index) {
            Ok(positions) => positions,
            Err(err) => {
                sink.close(Some(BlockfileError::IndexLookup(Box::new(err))));
                return;
            }
        };
        match positions {
            Positions::All => {
                debug!("blockfile {:?} reading all packets", self.name);
                let mut scanner = BlockScanner::new(&resources.file, &self.stats);
                loop {
                    match scanner.next_packet() {
                        Ok(Some(packet)) => {
                            tokio::select! {
                                _ = ctx.cancelled() => {
                                    debug!("blockfile {:?} cancelling packet read", self.name);
                                    break;
                                }
                                _ = self.done.cancelled() => {
                                    debug!("blockfile {:?} closing, breaking out of query", self.name);
                                    break;
                                }
                                delivered = sink.send(packet) => {
                                    if !delivered {
                                        break;
                                    }
                                }
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            sink.close(Some(err));
                            return;
                        }
                    }
                }
            }
            Positions::List(offsets) => {
                debug!("blockfile {:?} reading {} packets", self.name, offsets.len());
                for offset in offsets {
                    let packet = match read_packet_at(&resources.file, offset, &self.stats) {
                        Ok(packet) => packet,
                        Err(err) => {
                            debug!("blockfile {:?} error reading packet: {}", self.name, err);
                            sink.close(Some(err));
                            return;
                        }
                    };
                    tokio::select! {
                        _ = ctx.cancelled() => {
                            debug!("blockfile {:?} cancelling packet read", self.name);
                            break;
                        }
                        _ = self.done.cancelled() => {
                            debug!("blockfile {:?} closing, breaking out of query", self.name);
                            break;
                        }
                        delivered = sink.send(packet) => {
                            if !delivered {
                                break;
                            }
                        }
                    }
                }
            }
        }
        debug!(
            "blockfile {:?} finished reading packets in {:?}",
            self.name,
            start.elapsed()
        );
        sink.close(ctx.is_cancelled().then_some(BlockfileError::Cancelled));
    }

    /// Dump a human-readable version of this blockfile's index to
    /// `out`, restricted to keys between `start` and `end`. The format
    /// is owned by the index implementation. No-op once closed.
    pub async fn dump_index(&self, out: &mut dyn Write, start: &[u8], end: &[u8]) -> Result<()> {
        let guard = self.resources.read().await;
        match guard.as_ref() {
            Some(resources) => resources.index.dump(out, start, end),
            None => Ok(()),
        }
    }
}

/// Read a single packet whose record starts at `offset`.
///
/// Reads the fixed-size record header, then exactly `captured_length`
/// payload bytes into a fresh buffer. Any failure, including reads past
/// the end of the file, is surfaced as an error carrying the offending
/// offset; there is no partial-header tolerance.
fn read_packet_at(file: &File, offset: u64, stats: &ReaderStats) -> Result<Packet> {
    ReaderStats::increment(&stats.packets_read);
    let _timer = NanoTimer::new(&stats.packet_read_nanos);

    let mut header_buf = [0u8; PACKET_HEADER_LEN];
    file.read_exact_at(&mut header_buf, offset)
        .map_err(|source| BlockfileError::Read { offset, source })?;
    let header = PacketHeader::parse(&header_buf, offset)?;

    let payload_offset = offset + u64::from(header.mac);
    let mut payload = BytesMut::zeroed(header.captured_length as usize);
    file.read_exact_at(&mut payload, payload_offset)
        .map_err(|source| BlockfileError::Read {
            offset: payload_offset,
            source,
        })?;
    Ok(Packet {
        data: payload.freeze(),
        capture_info: header.capture_info(),
    })
}
