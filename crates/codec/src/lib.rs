//! # Codec — Block Serialization
//!
//! Defines the [`Record`] trait — the seam between the block log and the
//! block representation it stores — plus the production [`Block`] type and
//! its canonical binary encoding.
//!
//! The log never inspects a block beyond what this trait exposes: its
//! height ([`Record::number`]) and a self-delimiting binary form. Because
//! the encoding is self-delimiting, the log file needs no per-entry length
//! prefix; a decoder positioned at the first byte of a block consumes
//! exactly that block and reports how many bytes it read.
//!
//! ## Binary Block Format
//!
//! ```text
//! [crc32: u32 LE]        over everything after this field
//! [number: u32 LE]       block height, starting at 1
//! [previous: 32 bytes]   digest of the previous block
//! [timestamp: u64 LE]    unix seconds
//! [producer_len: u16 LE][producer bytes]
//! [tx_count: u32 LE]
//! repeated [tx_len: u32 LE][tx bytes]
//! ```
//!
//! The encoding must stay stable for the lifetime of a log file; changing
//! it requires rewriting the log through the rewrite path.

use byteorder::{LittleEndian, ReadBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read};
use thiserror::Error;

/// Maximum producer account name length we'll accept during decode (1 KiB).
/// Prevents OOM on corrupt input.
pub const MAX_PRODUCER_BYTES: usize = 1024;
/// Maximum single-transaction size we'll allocate during decode (10 MiB).
pub const MAX_TRANSACTION_BYTES: usize = 10 * 1024 * 1024;
/// Maximum transactions per block we'll accept during decode.
pub const MAX_TRANSACTIONS: usize = 1 << 20;

/// Errors that can occur while encoding or decoding a block.
#[derive(Debug, Error)]
pub enum CodecError {
    /// An underlying I/O error. `UnexpectedEof` means the input ended in
    /// the middle of a block.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The bytes do not form a valid block (bad checksum, oversized field,
    /// invalid utf-8, ...).
    #[error("malformed block: {0}")]
    Malformed(&'static str),
}

/// A record that can live in the block log.
///
/// The log treats records as opaque: it appends their encoded bytes, reads
/// them back by offset, and orders them by [`number`](Record::number),
/// which must increase by exactly one per appended record starting at 1.
///
/// `decode` must read exactly one record from a stream positioned at its
/// first byte and report the byte count consumed — the log uses that count
/// to find the entry's trailer.
pub trait Record: Clone {
    /// Height of this record in the chain, starting at 1.
    fn number(&self) -> u32;

    /// Appends the canonical binary encoding of `self` to `buf`.
    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), CodecError>;

    /// Reads exactly one record from `r`, returning it and the number of
    /// bytes consumed.
    fn decode<R: Read>(r: &mut R) -> Result<(Self, u64), CodecError>;
}

/// A finalized block as stored in the log.
///
/// Transactions are carried as opaque pre-serialized byte strings; their
/// internal structure is the concern of layers above the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Block height, starting at 1.
    pub number: u32,
    /// Digest of the previous block (all zeroes for block 1).
    pub previous: [u8; 32],
    /// Production time, unix seconds.
    pub timestamp: u64,
    /// Account name of the producer.
    pub producer: String,
    /// Serialized transactions, opaque to the log.
    pub transactions: Vec<Vec<u8>>,
}

impl Block {
    /// Size of this block's canonical encoding in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> u64 {
        let tx_bytes: u64 = self
            .transactions
            .iter()
            .map(|tx| 4 + tx.len() as u64)
            .sum();
        4 + 4 + 32 + 8 + 2 + self.producer.len() as u64 + 4 + tx_bytes
    }
}

impl Record for Block {
    fn number(&self) -> u32 {
        self.number
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        if self.producer.len() > MAX_PRODUCER_BYTES {
            return Err(CodecError::Malformed("producer name too long"));
        }
        if self.transactions.len() > MAX_TRANSACTIONS {
            return Err(CodecError::Malformed("too many transactions"));
        }
        for tx in &self.transactions {
            if tx.len() > MAX_TRANSACTION_BYTES {
                return Err(CodecError::Malformed("transaction too large"));
            }
        }

        // Reserve 4 bytes for the checksum, filled in after the body.
        let crc_at = buf.len();
        buf.extend_from_slice(&[0u8; 4]);
        let body_at = buf.len();

        buf.extend_from_slice(&self.number.to_le_bytes());
        buf.extend_from_slice(&self.previous);
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.extend_from_slice(&(self.producer.len() as u16).to_le_bytes());
        buf.extend_from_slice(self.producer.as_bytes());
        buf.extend_from_slice(&(self.transactions.len() as u32).to_le_bytes());
        for tx in &self.transactions {
            buf.extend_from_slice(&(tx.len() as u32).to_le_bytes());
            buf.extend_from_slice(tx);
        }

        let mut hasher = Crc32::new();
        hasher.update(&buf[body_at..]);
        let crc = hasher.finalize();
        buf[crc_at..body_at].copy_from_slice(&crc.to_le_bytes());
        Ok(())
    }

    fn decode<R: Read>(r: &mut R) -> Result<(Self, u64), CodecError> {
        let stored_crc = r.read_u32::<LittleEndian>()?;
        let mut hasher = Crc32::new();
        let mut consumed = 4u64;

        let mut num = [0u8; 4];
        r.read_exact(&mut num)?;
        hasher.update(&num);
        consumed += 4;
        let number = u32::from_le_bytes(num);

        let mut previous = [0u8; 32];
        r.read_exact(&mut previous)?;
        hasher.update(&previous);
        consumed += 32;

        let mut ts = [0u8; 8];
        r.read_exact(&mut ts)?;
        hasher.update(&ts);
        consumed += 8;
        let timestamp = u64::from_le_bytes(ts);

        let mut plen = [0u8; 2];
        r.read_exact(&mut plen)?;
        hasher.update(&plen);
        consumed += 2;
        let producer_len = u16::from_le_bytes(plen) as usize;
        if producer_len > MAX_PRODUCER_BYTES {
            return Err(CodecError::Malformed("producer name too long"));
        }
        let mut producer = vec![0u8; producer_len];
        r.read_exact(&mut producer)?;
        hasher.update(&producer);
        consumed += producer_len as u64;
        let producer = String::from_utf8(producer)
            .map_err(|_| CodecError::Malformed("producer is not valid utf-8"))?;

        let mut cnt = [0u8; 4];
        r.read_exact(&mut cnt)?;
        hasher.update(&cnt);
        consumed += 4;
        let tx_count = u32::from_le_bytes(cnt) as usize;
        if tx_count > MAX_TRANSACTIONS {
            return Err(CodecError::Malformed("too many transactions"));
        }

        let mut transactions = Vec::with_capacity(tx_count.min(1024));
        for _ in 0..tx_count {
            let mut tlen = [0u8; 4];
            r.read_exact(&mut tlen)?;
            hasher.update(&tlen);
            consumed += 4;
            let tx_len = u32::from_le_bytes(tlen) as usize;
            if tx_len > MAX_TRANSACTION_BYTES {
                return Err(CodecError::Malformed("transaction too large"));
            }
            let mut tx = vec![0u8; tx_len];
            r.read_exact(&mut tx)?;
            hasher.update(&tx);
            consumed += tx_len as u64;
            transactions.push(tx);
        }

        if hasher.finalize() != stored_crc {
            return Err(CodecError::Malformed("checksum mismatch"));
        }

        Ok((
            Block {
                number,
                previous,
                timestamp,
                producer,
                transactions,
            },
            consumed,
        ))
    }
}
