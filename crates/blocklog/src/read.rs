//! Read path: head access, point lookups, and sequential iteration.
//!
//! Point lookups resolve a block number to an offset through the index,
//! then decode the entry with positioned reads bounded by the published
//! log length. Reads take no lock beyond a brief read-lock on the head
//! cache, so any number of readers can proceed while one writer appends.

use codec::{CodecError, Record};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::{Error, Result};
use crate::file::{read_u64_le_at, FileSlice};
use crate::{BlockLog, NPOS};

/// Decodes one entry's block at `offset`, never reading at or past `end`.
/// Returns the block and the bytes its encoding consumed.
pub(crate) fn read_one<B: Record>(file: &File, offset: u64, end: u64) -> Result<(B, u64)> {
    let mut slice = FileSlice::new(file, offset, end);
    B::decode(&mut slice).map_err(|e| match e {
        CodecError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof => Error::ShortRead {
            offset,
            len: end,
        },
        CodecError::Io(err) => Error::Io(err),
        source => Error::MalformedBlock { offset, source },
    })
}

impl<B: Record> BlockLog<B> {
    /// Returns the cached head block, or `None` if the log is empty.
    pub fn head(&self) -> Result<Option<B>> {
        let inner = self.inner()?;
        let state = inner.state();
        Ok(state.head.as_ref().map(|h| h.block.clone()))
    }

    /// Reads the head block from disk by following the offset stored in
    /// the final 8 bytes of the log.
    ///
    /// # Errors
    ///
    /// [`Error::ShortRead`] on an empty log; decode failures surface as
    /// [`Error::MalformedBlock`].
    pub fn read_head(&self) -> Result<B> {
        let inner = self.inner()?;
        let log_len = inner.state().log_len;
        if log_len < 8 {
            return Err(Error::ShortRead {
                offset: 0,
                len: log_len,
            });
        }
        let offset = read_u64_le_at(&inner.log_read, log_len - 8)?;
        let (block, _) = read_one::<B>(&inner.log_read, offset, log_len - 8)?;
        Ok(block)
    }

    /// Returns the log offset of block `number`, or [`NPOS`] if the block
    /// is not in the log (including `number == 0`).
    pub fn offset_of(&self, number: u32) -> Result<u64> {
        Ok(self.block_offset(number)?.unwrap_or(NPOS))
    }

    /// `offset_of` before flattening to the [`NPOS`] sentinel.
    pub(crate) fn block_offset(&self, number: u32) -> Result<Option<u64>> {
        let inner = self.inner()?;
        if number == 0 {
            return Ok(None);
        }
        let entries = inner.state().entries;
        if number as u64 > entries {
            return Ok(None);
        }
        let offset = read_u64_le_at(&inner.index_read, 8 * (number as u64 - 1))?;
        Ok(Some(offset))
    }

    /// Reads block `number`, returning it together with the offset of its
    /// trailer (useful for resuming a forward walk). Returns `None` when
    /// the block is not in the log.
    ///
    /// # Errors
    ///
    /// [`Error::IndexInconsistent`] if the indexed offset decodes to a
    /// block with a different number; [`Error::MalformedBlock`] if it does
    /// not decode at all.
    pub fn read_block_by_number(&self, number: u32) -> Result<Option<(B, u64)>> {
        let Some(offset) = self.block_offset(number)? else {
            return Ok(None);
        };
        let inner = self.inner()?;
        let log_len = inner.state().log_len;
        let (block, consumed) = read_one::<B>(&inner.log_read, offset, log_len)?;
        if block.number() != number {
            return Err(Error::IndexInconsistent {
                number,
                offset,
                found: block.number(),
            });
        }
        Ok(Some((block, offset + consumed)))
    }

    /// Reads the block whose bytes start at `offset`, returning it and the
    /// offset of its trailer.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOffset`] when `offset` is at or past the end of the
    /// log, or when decoding runs off the end (the offset does not name an
    /// entry); [`Error::MalformedBlock`] when the bytes at a valid
    /// position fail to decode.
    pub fn read_block(&self, offset: u64) -> Result<(B, u64)> {
        let inner = self.inner()?;
        let log_len = inner.state().log_len;
        if offset >= log_len {
            return Err(Error::InvalidOffset {
                offset,
                len: log_len,
            });
        }
        match read_one::<B>(&inner.log_read, offset, log_len) {
            Ok((block, consumed)) => Ok((block, offset + consumed)),
            Err(Error::ShortRead { .. }) => Err(Error::InvalidOffset {
                offset,
                len: log_len,
            }),
            Err(e) => Err(e),
        }
    }
}

/// Walks every block of the log at `path` in order, invoking `visit` for
/// each; iteration stops early when `visit` returns `false`.
///
/// Operates on the raw file without opening a [`BlockLog`] — no index is
/// consulted, so this works on a bare main file. The visit order is block
/// 1, 2, 3, … and each entry's trailer is checked against its position.
///
/// # Errors
///
/// [`Error::MalformedBlock`] when an entry fails to decode,
/// [`Error::ShortRead`] when the file ends mid-entry, and
/// [`Error::Corrupt`] when a trailer disagrees with its entry's position.
pub fn iterate<B, F, P>(path: P, mut visit: F) -> Result<()>
where
    B: Record,
    F: FnMut(&B) -> bool,
    P: AsRef<Path>,
{
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut offset = 0u64;
    while offset < len {
        let (block, consumed) = B::decode(&mut reader).map_err(|e| match e {
            CodecError::Io(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Error::ShortRead { offset, len }
            }
            CodecError::Io(err) => Error::Io(err),
            source => Error::MalformedBlock { offset, source },
        })?;

        let mut trailer = [0u8; 8];
        reader
            .read_exact(&mut trailer)
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => Error::ShortRead {
                    offset: offset + consumed,
                    len,
                },
                _ => Error::Io(e),
            })?;
        let trailer = u64::from_le_bytes(trailer);
        if trailer != offset {
            return Err(Error::Corrupt(format!(
                "trailer at offset {} points at {}, expected {}",
                offset + consumed,
                trailer,
                offset
            )));
        }

        if !visit(&block) {
            break;
        }
        offset += consumed + 8;
    }
    Ok(())
}
