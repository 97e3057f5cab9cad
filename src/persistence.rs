//! Checkpointing: save and load the complete core state as JSON.
//!
//! Mid-day replays restart from a checkpoint instead of re-reading the
//! morning's ticks. The document covers every piece of state (ladders,
//! order directory, cage, hold slot, statistics, reconciler buckets),
//! so a loaded book continues bit-identically.
//!
//! # Usage
//!
//! ```ignore
//! book.save(Path::new("600000.chk"))?;
//! let book = OrderBook::load(Path::new("600000.chk"))?;
//! ```

use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use crate::book::OrderBook;

impl OrderBook {
    /// Serialize the full core state to a JSON checkpoint file.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = std::fs::File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, self).map_err(io::Error::other)?;
        Ok(())
    }

    /// Restore a book from a checkpoint written by [`OrderBook::save`].
    pub fn load(path: &Path) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|e| {
            io::Error::new(io::ErrorKind::InvalidData, format!("{}: {e}", path.display()))
        })
    }
}
