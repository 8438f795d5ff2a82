//! Blockfile reading for full-packet-capture storage
//!
//! This crate is the read side of a packet-capture store: it opens
//! capture segments ("blockfiles") written by a separate capture
//! process, together with their companion indexes, and streams packets
//! back out — either the whole segment in file order, or only the
//! packets an index query resolves to.
//!
//! The capture format packs variable-length packet records into fixed
//! 1 MiB blocks; see [`format`] for the layout, [`BlockFile`] for the
//! segment handle, and [`SegmentIndex`]/[`Query`] for the collaborator
//! traits an index implementation plugs into.

pub mod blockfile;
pub mod config;
pub mod error;
pub mod format;
pub mod index;
pub mod stats;
pub mod stream;
pub mod types;

mod scan;

pub use blockfile::BlockFile;
pub use config::ReaderConfig;
pub use error::{BlockfileError, Result};
pub use format::BLOCK_SIZE;
pub use index::{Query, SegmentIndex, index_path};
pub use stats::{ReaderStats, StatsSnapshot};
pub use stream::{CancelToken, PacketSink, PacketStream, packet_channel};
pub use types::{CaptureInfo, Packet, Positions};
