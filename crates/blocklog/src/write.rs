//! Append path: `append()`, `flush()`, and `sync()`.
//!
//! All mutations of an open log flow through this module. An append writes
//! the block bytes and their trailer as a single frame, records the offset
//! in the index, flushes the log before the index, and only then publishes
//! the new head — so a reader can never observe an entry that is not fully
//! on disk, and a crash at any point leaves a tail the next open repairs.

use codec::Record;

use crate::error::{Error, Result};
use crate::{BlockLog, Head};

impl<B: Record> BlockLog<B> {
    /// Appends an irreversible block, returning the offset at which its
    /// bytes were written.
    ///
    /// # Steps
    ///
    /// 1. Verify `block.number()` is exactly head + 1 (or 1 on an empty
    ///    log); anything else is [`Error::OutOfOrder`].
    /// 2. Encode the block and its 8-byte trailer into one frame and
    ///    append it to the log in a single write.
    /// 3. Append the block's offset to the index.
    /// 4. Flush the log, then the index. A crash between the two leaves a
    ///    short index, which recovery extends; the reverse order could
    ///    leave an index pointing past the log, which it cannot repair.
    /// 5. Publish the new head, block count, and log length.
    ///
    /// # Errors
    ///
    /// [`Error::OutOfOrder`] on a numbering violation, [`Error::NotOpen`]
    /// on a closed log, or any underlying I/O or encoding failure. After
    /// an I/O failure mid-append the on-disk tail may be partial; the next
    /// `open` truncates it away.
    pub fn append(&self, block: &B) -> Result<u64> {
        let inner = self.inner()?;
        let mut w = inner.writers();

        let expected = {
            let state = inner.state();
            match &state.head {
                Some(head) => head
                    .block
                    .number()
                    .checked_add(1)
                    .ok_or_else(|| Error::Corrupt("block number overflow".to_string()))?,
                None => 1,
            }
        };
        let number = block.number();
        if number != expected {
            return Err(Error::OutOfOrder {
                expected,
                found: number,
            });
        }

        let crate::Writers { log, index, buf } = &mut *w;

        let start = log.len();
        buf.clear();
        block
            .encode(buf)
            .map_err(|source| Error::MalformedBlock {
                offset: start,
                source,
            })?;
        buf.extend_from_slice(&start.to_le_bytes());

        log.append(buf)?;
        index.append_u64_le(start)?;

        log.flush()?;
        index.flush()?;

        let mut state = inner.state_mut();
        state.head = Some(Head {
            block: block.clone(),
            offset: start,
        });
        state.entries = number as u64;
        state.log_len = log.len();

        Ok(start)
    }

    /// Drains buffered writes to the OS, log before index.
    ///
    /// Appends already flush; this is for callers that want an explicit
    /// barrier, e.g. before handing the paths to another process.
    pub fn flush(&self) -> Result<()> {
        let inner = self.inner()?;
        let mut w = inner.writers();
        w.log.flush()?;
        w.index.flush()?;
        Ok(())
    }

    /// Flushes and fsyncs both files, log before index, for callers that
    /// need durability stronger than the OS page cache.
    pub fn sync(&self) -> Result<()> {
        let inner = self.inner()?;
        let mut w = inner.writers();
        w.log.sync()?;
        w.index.sync()?;
        Ok(())
    }
}
