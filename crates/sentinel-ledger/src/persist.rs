//! Ledger persistence
//!
//! Append-only file of block records, one JSON line per block. Reload
//! re-validates the entire chain before serving; a file that fails
//! validation is refused, never partially loaded. Block digests are
//! always recomputed from canonical bytes, so the on-disk text encoding
//! carries no hashing authority.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::chain::{Block, Chain, ChainError};
use crate::signature::KeyRegistry;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("ledger file i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger file line {0} is not a valid block record")]
    Malformed(usize),
    #[error("persisted chain failed validation: {0}")]
    Invalid(#[from] ChainError),
}

/// Append-only block log.
pub struct LedgerStore {
    path: PathBuf,
}

impl LedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one sealed block.
    pub fn append(&self, block: &Block) -> Result<(), PersistError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(block).expect("block serializes");
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Replace the log with a full chain. Used after a consensus swap,
    /// when append-only no longer describes the local history.
    pub fn rewrite(&self, chain: &Chain) -> Result<(), PersistError> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = File::create(&tmp)?;
            for block in chain.blocks() {
                let line = serde_json::to_string(block).expect("block serializes");
                writeln!(file, "{line}")?;
            }
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Load and fully validate a persisted chain.
pub fn load_chain(
    path: impl AsRef<Path>,
    difficulty_bits: u8,
    keys: &KeyRegistry,
) -> Result<Chain, PersistError> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);

    let mut blocks = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let block: Block =
            serde_json::from_str(&line).map_err(|_| PersistError::Malformed(lineno + 1))?;
        blocks.push(block);
    }

    let chain = Chain::try_from_blocks(blocks, difficulty_bits, keys)?;
    info!(
        path = %path.as_ref().display(),
        blocks = chain.len(),
        "ledger reloaded and validated"
    );
    Ok(chain)
}
