//! Cold-start path: reconciling the log and index files on open.
//!
//! The main file is the only file that has to survive a crash. On open,
//! the tail of the log is validated through its final trailer — a partial
//! entry left by an interrupted append is truncated away — and the index
//! is then compared against the log: missing or short indexes are rebuilt
//! by a forward scan of the trailer chain, long ones truncated, and a
//! mismatched final entry triggers a full rebuild. All of this is silent
//! and idempotent; only damage that cannot be repaired (a numbering gap in
//! the body of the log) refuses the open.

use codec::Record;
use std::fs::File;
use std::io;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::file::{read_u64_le_at, AppendFile};
use crate::read::read_one;

/// Validates both files, repairing what can be repaired, and returns the
/// head block and its offset (`None` for an empty log).
pub(crate) fn reconcile<B: Record>(
    log: &mut AppendFile,
    log_read: &File,
    index: &mut AppendFile,
    index_read: &File,
) -> Result<Option<(B, u64)>> {
    if log.len() == 0 {
        if index.len() > 0 {
            warn!(
                index_bytes = index.len(),
                "block log is empty but the index is not; truncating index"
            );
            index.truncate(0)?;
        }
        return Ok(None);
    }

    let Some((head_offset, head)) = locate_head::<B>(log, log_read)? else {
        warn!(
            log_bytes = log.len(),
            "no complete entry found in block log; truncating to empty"
        );
        log.truncate(0)?;
        index.truncate(0)?;
        return Ok(None);
    };

    reconcile_index::<B>(log, log_read, index, index_read, head_offset, head.number())?;
    Ok(Some((head, head_offset)))
}

/// Finds the head entry. The fast path trusts the final 8 bytes; if they
/// do not name a self-consistent entry ending right before them, the log
/// was interrupted mid-append and we scan backward for the largest offset
/// `p` whose 8 bytes are a valid trailer, truncating everything after
/// `p + 8`. Either the last block is fully present or it is gone.
fn locate_head<B: Record>(log: &mut AppendFile, log_read: &File) -> Result<Option<(u64, B)>> {
    let len = log.len();
    if len < 8 {
        return Ok(None);
    }

    let candidate = read_u64_le_at(log_read, len - 8)?;
    if let Some(block) = entry_ending_at::<B>(log_read, candidate, len - 8)? {
        return Ok(Some((candidate, block)));
    }

    for p in (0..len - 8).rev() {
        let candidate = read_u64_le_at(log_read, p)?;
        if let Some(block) = entry_ending_at::<B>(log_read, candidate, p)? {
            warn!(
                from = len,
                to = p + 8,
                "block log ends in a partial entry; truncating"
            );
            log.truncate(p + 8)?;
            return Ok(Some((candidate, block)));
        }
    }
    Ok(None)
}

/// Checks whether `offset` names a block whose encoding ends exactly at
/// `end` — i.e. whether `end` is the position of that entry's trailer.
fn entry_ending_at<B: Record>(file: &File, offset: u64, end: u64) -> Result<Option<B>> {
    if offset >= end {
        return Ok(None);
    }
    match read_one::<B>(file, offset, end) {
        Ok((block, consumed)) if offset + consumed == end && block.number() >= 1 => {
            Ok(Some(block))
        }
        Ok(_) => Ok(None),
        Err(Error::ShortRead { .. } | Error::MalformedBlock { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn reconcile_index<B: Record>(
    log: &AppendFile,
    log_read: &File,
    index: &mut AppendFile,
    index_read: &File,
    head_offset: u64,
    head_number: u32,
) -> Result<()> {
    // A crash mid-entry can leave a ragged index tail.
    let ragged = index.len() % 8;
    if ragged != 0 {
        warn!(
            index_bytes = index.len(),
            "index length is not a multiple of 8; dropping partial entry"
        );
        index.truncate(index.len() - ragged)?;
    }

    let expected = 8 * head_number as u64;

    if index.len() > expected {
        warn!(
            index_bytes = index.len(),
            expected_bytes = expected,
            "index is longer than the log; truncating"
        );
        index.truncate(expected)?;
    }

    if index.len() == 0 {
        info!(blocks = head_number, "reconstructing block log index");
        return construct_index::<B>(log, log_read, index, 0, 1);
    }

    if index.len() < expected {
        // Resume the scan after the last indexed entry, provided it still
        // matches the log; otherwise fall back to a full rebuild.
        let indexed = (index.len() / 8) as u32;
        let last_offset = read_u64_le_at(index_read, index.len() - 8)?;
        match read_one::<B>(log_read, last_offset, log.len()) {
            Ok((block, consumed)) if block.number() == indexed => {
                info!(
                    from_block = indexed + 1,
                    to_block = head_number,
                    "extending block log index"
                );
                return construct_index::<B>(
                    log,
                    log_read,
                    index,
                    last_offset + consumed + 8,
                    indexed + 1,
                );
            }
            Ok(_) | Err(Error::ShortRead { .. } | Error::MalformedBlock { .. }) => {
                warn!("index tail does not match the log; rebuilding index");
                index.truncate(0)?;
                return construct_index::<B>(log, log_read, index, 0, 1);
            }
            Err(e) => return Err(e),
        }
    }

    // Lengths agree; cross-check the final index entry against the head.
    let last_offset = read_u64_le_at(index_read, expected - 8)?;
    if last_offset != head_offset {
        warn!(
            index_offset = last_offset,
            head_offset, "index does not match the log; rebuilding index"
        );
        index.truncate(0)?;
        return construct_index::<B>(log, log_read, index, 0, 1);
    }
    Ok(())
}

/// Forward scan of the trailer chain from `offset`, appending each entry's
/// position to the index. `expected` is the block number the entry at
/// `offset` must carry; any gap or misaligned trailer aborts with
/// [`Error::Corrupt`]. Passing a non-zero `offset` resumes a previously
/// interrupted build.
fn construct_index<B: Record>(
    log: &AppendFile,
    log_read: &File,
    index: &mut AppendFile,
    mut offset: u64,
    mut expected: u32,
) -> Result<()> {
    let len = log.len();
    while offset < len {
        let (block, consumed) = read_one::<B>(log_read, offset, len)?;
        let number = block.number();
        if number != expected {
            return Err(Error::Corrupt(format!(
                "gap in block numbers: expected {} at offset {}, found {}",
                expected, offset, number
            )));
        }

        let trailer_at = offset + consumed;
        let trailer = match read_u64_le_at(log_read, trailer_at) {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(Error::Corrupt(format!(
                    "log ends inside the trailer at offset {}",
                    trailer_at
                )))
            }
            Err(e) => return Err(e.into()),
        };
        if trailer != offset {
            return Err(Error::Corrupt(format!(
                "trailer at offset {} points at {}, expected {}",
                trailer_at, trailer, offset
            )));
        }

        index.append_u64_le(offset)?;
        if expected % 1_000_000 == 0 {
            info!(block = expected, "index reconstruction in progress");
        }

        offset = trailer_at + 8;
        expected = expected
            .checked_add(1)
            .ok_or_else(|| Error::Corrupt("block number overflow".to_string()))?;
    }
    index.flush()?;
    Ok(())
}
