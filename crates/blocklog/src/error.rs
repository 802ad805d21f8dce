use codec::CodecError;
use std::io;
use thiserror::Error;

/// Errors surfaced by the block log.
///
/// Every error is raised in exactly one circumstance; recoverable local
/// conditions (missing/short/long index, partial entry at the log tail) are
/// healed silently inside `open` and never reach the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// `append` was called with a block whose number is not head + 1.
    #[error("cannot append block {found}: expected block {expected}")]
    OutOfOrder { expected: u32, found: u32 },

    /// The codec could not decode the bytes at `offset`.
    #[error("malformed block at offset {offset}: {source}")]
    MalformedBlock { offset: u64, source: CodecError },

    /// A read ran past the end of the log.
    #[error("short read at offset {offset}: log ends at {len}")]
    ShortRead { offset: u64, len: u64 },

    /// The given offset does not name a block in the log.
    #[error("invalid offset {offset}: log ends at {len}")]
    InvalidOffset { offset: u64, len: u64 },

    /// An index entry disagrees with the log content it points at.
    #[error("index entry for block {number} points at offset {offset}, which holds block {found}")]
    IndexInconsistent { number: u32, offset: u64, found: u32 },

    /// The log itself is damaged in a way recovery cannot repair.
    #[error("block log corrupt: {0}")]
    Corrupt(String),

    /// An OS-level I/O failure.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// `rewrite` asked for more blocks than the input log holds.
    #[error("input log holds {available} blocks but {requested} were requested")]
    InputTooShort { available: u32, requested: u32 },

    /// An operation was called on a closed log.
    #[error("block log is not open")]
    NotOpen,
}

pub type Result<T> = std::result::Result<T, Error>;
