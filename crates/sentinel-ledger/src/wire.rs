//! Block wire encoding
//!
//! Transmission format: the canonical header fields, the difficulty as
//! a single unsigned byte, then the length-prefixed transactions. All
//! integers big-endian. Decoding recomputes nothing; the receiver
//! validates the block against its own chain state afterwards.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sentinel_core::CommandPayload;

use crate::chain::Block;
use crate::hash::BlockHash;
use crate::transaction::Transaction;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("message truncated at offset {0}")]
    Truncated(usize),
    #[error("transaction {0} payload is not decodable")]
    BadPayload(usize),
    #[error("trailing {0} bytes after block")]
    TrailingBytes(usize),
}

/// Encode one block plus the difficulty it was sealed under.
pub fn encode_block(block: &Block, difficulty_bits: u8) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&block.index.to_be_bytes());
    out.extend_from_slice(&block.timestamp_ns.to_be_bytes());
    out.extend_from_slice(block.prev_hash.as_bytes());
    out.extend_from_slice(&block.nonce.to_be_bytes());
    out.extend_from_slice(block.hash.as_bytes());
    out.push(difficulty_bits);

    out.extend_from_slice(&(block.transactions.len() as u32).to_be_bytes());
    for tx in &block.transactions {
        encode_transaction(&mut out, tx);
    }
    out
}

/// Decode a block message; returns the block and the advertised
/// difficulty.
pub fn decode_block(bytes: &[u8]) -> Result<(Block, u8), WireError> {
    let mut reader = Reader::new(bytes);

    let index = reader.u64()?;
    let timestamp_ns = reader.u64()?;
    let prev_hash = BlockHash(reader.array32()?);
    let nonce = reader.u64()?;
    let hash = BlockHash(reader.array32()?);
    let difficulty_bits = reader.u8()?;

    let count = reader.u32()? as usize;
    let mut transactions = Vec::with_capacity(count.min(1024));
    for i in 0..count {
        transactions.push(decode_transaction(&mut reader, i)?);
    }
    if reader.remaining() != 0 {
        return Err(WireError::TrailingBytes(reader.remaining()));
    }

    Ok((
        Block {
            index,
            timestamp_ns,
            prev_hash,
            transactions,
            nonce,
            hash,
        },
        difficulty_bits,
    ))
}

fn encode_transaction(out: &mut Vec<u8>, tx: &Transaction) {
    out.extend_from_slice(&tx.timestamp_ns.to_be_bytes());
    put_bytes(out, tx.source_id.as_bytes());
    let payload = serde_json::to_vec(&WirePayload::from(&tx.command)).expect("payload serializes");
    put_bytes(out, &payload);
    put_bytes(out, tx.signature.as_bytes());
}

fn decode_transaction(reader: &mut Reader<'_>, idx: usize) -> Result<Transaction, WireError> {
    let timestamp_ns = reader.u64()?;
    let source_id = String::from_utf8(reader.bytes()?.to_vec())
        .map_err(|_| WireError::BadPayload(idx))?;
    let payload: WirePayload =
        serde_json::from_slice(reader.bytes()?).map_err(|_| WireError::BadPayload(idx))?;
    let signature = String::from_utf8(reader.bytes()?.to_vec())
        .map_err(|_| WireError::BadPayload(idx))?;
    Ok(Transaction {
        timestamp_ns,
        source_id,
        command: payload.0,
        signature,
    })
}

/// Envelope so the command enum's serde shape is pinned at the wire
/// boundary.
#[derive(Serialize, Deserialize)]
struct WirePayload(CommandPayload);

impl From<&CommandPayload> for WirePayload {
    fn from(payload: &CommandPayload) -> Self {
        Self(payload.clone())
    }
}

fn put_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated(self.offset));
        }
        let out = &self.bytes[self.offset..self.offset + n];
        self.offset += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().expect("4 bytes")))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().expect("8 bytes")))
    }

    fn array32(&mut self) -> Result<[u8; 32], WireError> {
        Ok(self.take(32)?.try_into().expect("32 bytes"))
    }

    fn bytes(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.u32()? as usize;
        self.take(len)
    }
}
