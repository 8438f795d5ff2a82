//! Index and query collaborator boundary
//!
//! The index file format and the query language live outside this
//! crate. A blockfile handle only needs two capabilities from them:
//! resolving a query to packet positions, and a debug dump. Both are
//! expressed as traits so embedders plug their own implementations in.

use crate::error::Result;
use crate::types::Positions;
use std::fmt;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

/// Companion index of one blockfile.
///
/// The handle opens the index alongside the blockfile and closes both
/// together; everything about the on-disk index format is owned by the
/// implementation.
pub trait SegmentIndex: Sized + Send + Sync + 'static {
    /// Open the index at `path`.
    fn open(path: &Path) -> Result<Self>;

    /// Write a human-readable dump of index entries between `start` and
    /// `end` (inclusive key bounds) to `out`. The format is owned by
    /// the index implementation.
    fn dump(&self, out: &mut dyn Write, start: &[u8], end: &[u8]) -> Result<()>;

    /// Release underlying resources. Called once, from the handle's
    /// close path.
    fn close(&mut self) -> Result<()>;
}

/// A query that can be resolved against a [`SegmentIndex`].
///
/// The `Display` form is used for logging only.
pub trait Query<I: SegmentIndex>: fmt::Display {
    /// Resolve this query to the positions of matching packets.
    fn lookup_in(&self, index: &I) -> Result<Positions>;
}

/// Derive the index path for a blockfile path.
///
/// Capture layouts keep blockfiles under a `PKT` directory with the
/// index of the same name under a sibling `IDX` directory; the first
/// `PKT` component is swapped for `IDX`. Paths without a `PKT`
/// component get an `idx` extension appended instead.
pub fn index_path(blockfile: &Path) -> PathBuf {
    let mut swapped = false;
    let mut out = PathBuf::new();
    for component in blockfile.components() {
        match component {
            Component::Normal(name) if !swapped && name == "PKT" => {
                out.push("IDX");
                swapped = true;
            }
            other => out.push(other.as_os_str()),
        }
    }
    if swapped {
        out
    } else {
        let mut fallback = blockfile.as_os_str().to_os_string();
        fallback.push(".idx");
        PathBuf::from(fallback)
    }
}
