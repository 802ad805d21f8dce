//! # BlockLog — Append-Only Block Storage
//!
//! An append-only, on-disk log of finalized blocks, paired with a dense
//! positional index for O(1) random access by block number. Blocks are
//! written here only once they are irreversible; the log is the canonical
//! ledger from which all derived state can be rebuilt by linear replay.
//!
//! ## File Layout
//!
//! The main file is a sequence of entries with no header. Each entry is a
//! block's encoded bytes followed by an 8-byte little-endian trailer
//! holding the absolute offset at which those bytes begin:
//!
//! ```text
//! +---------+----------------+---------+----------------+-----+------------+-------------------+
//! | Block 1 | Pos of Block 1 | Block 2 | Pos of Block 2 | ... | Head Block | Pos of Head Block |
//! +---------+----------------+---------+----------------+-----+------------+-------------------+
//! ```
//!
//! The index file (main path + `.index`) is a dense array of 8-byte
//! little-endian offsets, one per block:
//!
//! ```text
//! +----------------+----------------+-----+-------------------+
//! | Pos of Block 1 | Pos of Block 2 | ... | Pos of Head Block |
//! +----------------+----------------+-----+-------------------+
//! ```
//!
//! The log can be walked forward by decoding a block, skipping 8 bytes,
//! and repeating. The head is found by following the offset in the final
//! 8 bytes of the file. Walking backward means jumping back 8 bytes,
//! following the stored offset, and repeating from just before it.
//!
//! Only the main file has to survive: the index is reconstructed by a
//! linear scan whenever it is missing, short, or inconsistent, and a
//! partially written final entry (a crash mid-append) is truncated away on
//! the next open.
//!
//! ## Module Responsibilities
//!
//! | Module        | Purpose                                              |
//! |---------------|------------------------------------------------------|
//! | `lib.rs`      | `BlockLog` struct, open/close, locking discipline    |
//! | [`file`]      | Buffered append writers + positioned read handles    |
//! | [`write`]     | `append()`, `flush()`, `sync()`                      |
//! | [`read`]      | Point lookups, head access, `iterate()`              |
//! | [`recovery`]  | Tail repair and index (re)construction on open       |
//! | [`rewrite`]   | Copy blocks `[1..=n]` into a fresh log               |
//!
//! ## Concurrency
//!
//! One exclusive appender (a mutex over the write handles) and any number
//! of concurrent readers. Readers resolve offsets against state published
//! under a read-write lock and then use positioned I/O, so they never
//! share a cursor with the writer or with each other. The published
//! lengths advance only after both files are flushed, so a partially
//! written entry is never visible to a reader.

mod error;
mod file;
mod read;
mod recovery;
mod rewrite;
mod write;

pub use error::{Error, Result};
pub use read::iterate;
pub use rewrite::rewrite;

pub use codec::Record;

use file::AppendFile;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

/// Sentinel returned by [`BlockLog::offset_of`] for a block that is not in
/// the log. Distinct from every valid offset.
pub const NPOS: u64 = u64::MAX;

/// The append-only block log.
///
/// Opening a path materializes an empty log if none exists, repairs any
/// partially written tail, and reconciles the positional index with the
/// main file. A `BlockLog` value is always open until [`close`] is called
/// or it is dropped; operations on a closed log fail with
/// [`Error::NotOpen`].
///
/// The type is generic over the stored [`Record`] so the log stays
/// independent of the block representation; production code uses
/// [`codec::Block`].
pub struct BlockLog<B: Record> {
    inner: Option<Inner<B>>,
}

pub(crate) struct Inner<B: Record> {
    log_path: PathBuf,
    index_path: PathBuf,
    /// Writer-side handles, serialized by the append mutex.
    pub(crate) writers: Mutex<Writers>,
    /// Read-only handles used exclusively through positioned reads.
    pub(crate) log_read: File,
    pub(crate) index_read: File,
    /// Head cache and published lengths; only the append path writes it.
    pub(crate) state: RwLock<State<B>>,
    locking: AtomicBool,
}

pub(crate) struct Writers {
    pub(crate) log: AppendFile,
    pub(crate) index: AppendFile,
    /// Reusable scratch buffer for entry encoding.
    pub(crate) buf: Vec<u8>,
}

pub(crate) struct State<B> {
    pub(crate) head: Option<Head<B>>,
    /// Number of fully appended blocks, equal to the head block number.
    pub(crate) entries: u64,
    /// Log length covering only fully appended, flushed entries.
    pub(crate) log_len: u64,
}

pub(crate) struct Head<B> {
    pub(crate) block: B,
    pub(crate) offset: u64,
}

impl<B: Record> BlockLog<B> {
    /// Opens the block log at `path`, creating an empty one if absent.
    ///
    /// The index path is derived by appending `.index` to `path`. Opening
    /// runs recovery: a partially written final entry is truncated away,
    /// and a missing, short, long, or inconsistent index is rebuilt from
    /// the main file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the log contains a gap in block
    /// numbers (damage recovery cannot repair), or an I/O / decode error
    /// from the underlying scan.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let log_path = path.as_ref().to_path_buf();
        let index_path = index_path_of(&log_path);

        let (mut log, log_read) = AppendFile::open(&log_path)?;
        let (mut index, index_read) = AppendFile::open(&index_path)?;

        let head = recovery::reconcile::<B>(&mut log, &log_read, &mut index, &index_read)?;

        let entries = head.as_ref().map(|(b, _)| b.number() as u64).unwrap_or(0);
        let log_len = log.len();
        Ok(BlockLog {
            inner: Some(Inner {
                log_path,
                index_path,
                writers: Mutex::new(Writers {
                    log,
                    index,
                    buf: Vec::with_capacity(4096),
                }),
                log_read,
                index_read,
                state: RwLock::new(State {
                    head: head.map(|(block, offset)| Head { block, offset }),
                    entries,
                    log_len,
                }),
                locking: AtomicBool::new(true),
            }),
        })
    }

    /// Flushes and releases both file handles. Idempotent: closing an
    /// already-closed log is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(inner) = self.inner.take() {
            let mut w = inner.writers();
            w.log.flush()?;
            w.index.flush()?;
        }
        Ok(())
    }

    /// Returns `true` until [`close`](BlockLog::close) is called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Path of the main log file.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotOpen`] on a closed log.
    pub fn path(&self) -> Result<&Path> {
        Ok(&self.inner()?.log_path)
    }

    /// Path of the index file.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::NotOpen`] on a closed log.
    pub fn index_path(&self) -> Result<&Path> {
        Ok(&self.inner()?.index_path)
    }

    /// Enables or disables internal lock waiting.
    ///
    /// With locking disabled the caller guarantees single-threaded access
    /// (the bulk-replay escape hatch): lock acquisitions switch to
    /// non-blocking `try_lock`, so no operation ever parks a thread.
    /// A violated guarantee — contention while locking is disabled —
    /// panics instead of blocking.
    pub fn set_locking(&self, enabled: bool) -> Result<()> {
        self.inner()?.locking.store(enabled, Ordering::Relaxed);
        Ok(())
    }

    pub(crate) fn inner(&self) -> Result<&Inner<B>> {
        self.inner.as_ref().ok_or(Error::NotOpen)
    }
}

impl<B: Record> Inner<B> {
    pub(crate) fn writers(&self) -> MutexGuard<'_, Writers> {
        if self.locking.load(Ordering::Relaxed) {
            self.writers.lock().unwrap_or_else(PoisonError::into_inner)
        } else {
            match self.writers.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(p)) => p.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    panic!("block log append contended while locking is disabled")
                }
            }
        }
    }

    pub(crate) fn state(&self) -> RwLockReadGuard<'_, State<B>> {
        if self.locking.load(Ordering::Relaxed) {
            self.state.read().unwrap_or_else(PoisonError::into_inner)
        } else {
            match self.state.try_read() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(p)) => p.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    panic!("block log state contended while locking is disabled")
                }
            }
        }
    }

    pub(crate) fn state_mut(&self) -> RwLockWriteGuard<'_, State<B>> {
        if self.locking.load(Ordering::Relaxed) {
            self.state.write().unwrap_or_else(PoisonError::into_inner)
        } else {
            match self.state.try_write() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(p)) => p.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    panic!("block log state contended while locking is disabled")
                }
            }
        }
    }
}

impl<B: Record> std::fmt::Debug for BlockLog<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut d = f.debug_struct("BlockLog");
        match &self.inner {
            Some(inner) => {
                let state = inner.state();
                d.field("path", &inner.log_path)
                    .field("blocks", &state.entries)
                    .field("log_len", &state.log_len)
                    .finish()
            }
            None => d.field("open", &false).finish(),
        }
    }
}

/// Best-effort flush on drop. Errors are ignored because `Drop` cannot
/// propagate them; an unflushed tail is repaired on the next open.
impl<B: Record> Drop for BlockLog<B> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let mut w = inner.writers();
            let _ = w.log.flush();
            let _ = w.index.flush();
        }
    }
}

fn index_path_of(log_path: &Path) -> PathBuf {
    let mut os = log_path.as_os_str().to_os_string();
    os.push(".index");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests;
