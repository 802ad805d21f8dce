//! Rewrite: copy a prefix of one log into a fresh one.
//!
//! Used for pruning and for repairing a log whose tail is damaged beyond
//! what open-time recovery handles: the output is built through the normal
//! append path, so it carries a correct index and the same durability
//! ordering as live appends.

use codec::Record;
use std::path::Path;

use crate::error::{Error, Result};
use crate::read::iterate;
use crate::BlockLog;

/// Writes blocks `[1..=max_number]` of the log at `input` into a fresh log
/// at `output`.
///
/// The input is walked sequentially without being opened, so its index
/// file is not required. The output is opened through the normal recovery
/// path and appended to block by block; it must not already contain
/// blocks (a non-empty output fails with [`Error::OutOfOrder`] on the
/// first append). The output is *not* renamed over the input — that is
/// the caller's decision.
///
/// # Errors
///
/// [`Error::InputTooShort`] when the input holds fewer than `max_number`
/// blocks; otherwise any error from walking the input or appending to the
/// output.
pub fn rewrite<B, PIn, POut>(input: PIn, output: POut, max_number: u32) -> Result<()>
where
    B: Record,
    PIn: AsRef<Path>,
    POut: AsRef<Path>,
{
    let out = BlockLog::<B>::open(output)?;

    let mut copied = 0u32;
    let mut failure = None;
    iterate::<B, _, _>(input, |block| {
        if copied == max_number {
            return false;
        }
        match out.append(block) {
            Ok(_) => {
                copied += 1;
                copied < max_number
            }
            Err(e) => {
                failure = Some(e);
                false
            }
        }
    })?;

    if let Some(e) = failure {
        return Err(e);
    }
    if copied < max_number {
        return Err(Error::InputTooShort {
            available: copied,
            requested: max_number,
        });
    }
    Ok(())
}
