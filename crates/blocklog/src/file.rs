//! Paired file handles: a buffered append writer plus a separate read-only
//! handle served through positioned reads.
//!
//! The writer side is owned by the append path and tracks the file length
//! itself, so computing the next entry's offset never needs a seek. The
//! reader side is a plain `File` used exclusively through `read_at`-style
//! positioned I/O — readers share no cursor and never contend with the
//! writer or with each other.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

/// Buffered append-only writer over one file.
///
/// All writes land at the end of the file (the handle is opened in append
/// mode); `len` mirrors the on-disk length plus any buffered bytes, which
/// is exactly the offset the next write will land at.
pub(crate) struct AppendFile {
    writer: BufWriter<File>,
    len: u64,
}

impl AppendFile {
    /// Opens (creating if absent) the file at `path`, returning the append
    /// writer and a separate read-only handle for positioned reads.
    pub(crate) fn open(path: &Path) -> io::Result<(AppendFile, File)> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        let reader = File::open(path)?;
        Ok((
            AppendFile {
                writer: BufWriter::new(file),
                len,
            },
            reader,
        ))
    }

    /// Current length in bytes, counting buffered but unflushed writes.
    pub(crate) fn len(&self) -> u64 {
        self.len
    }

    /// Appends `bytes`, returning the offset of the first byte written.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> io::Result<u64> {
        let at = self.len;
        self.writer.write_all(bytes)?;
        self.len += bytes.len() as u64;
        Ok(at)
    }

    /// Appends an 8-byte little-endian value, returning its offset.
    pub(crate) fn append_u64_le(&mut self, value: u64) -> io::Result<u64> {
        self.append(&value.to_le_bytes())
    }

    /// Drains buffered writes to the OS.
    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    /// Drains buffered writes and fsyncs the file.
    pub(crate) fn sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    /// Truncates the file to `len` bytes. Buffered writes are drained
    /// first so the truncation point is well defined.
    pub(crate) fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().set_len(len)?;
        self.len = len;
        Ok(())
    }
}

/// Positioned read into `buf` at `offset`; returns the byte count, 0 at EOF.
#[cfg(unix)]
pub(crate) fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

/// Positioned read into `buf` at `offset`; returns the byte count, 0 at EOF.
#[cfg(windows)]
pub(crate) fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

/// Fills `buf` from `offset`, failing with `UnexpectedEof` if the file ends
/// before `buf` is full.
pub(crate) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match read_at(file, &mut buf[filled..], offset + filled as u64) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "file ended mid-read",
                ))
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Reads an 8-byte little-endian value at `offset`.
pub(crate) fn read_u64_le_at(file: &File, offset: u64) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    read_exact_at(file, &mut buf, offset)?;
    Ok(u64::from_le_bytes(buf))
}

/// A bounded `Read` over `[pos, end)` of a file, served by positioned
/// reads. Decoders handed a `FileSlice` can never see bytes past `end`,
/// which is how readers are kept inside the published length of the log.
pub(crate) struct FileSlice<'a> {
    file: &'a File,
    pos: u64,
    end: u64,
}

impl<'a> FileSlice<'a> {
    pub(crate) fn new(file: &'a File, pos: u64, end: u64) -> Self {
        FileSlice { file, pos, end }
    }
}

impl Read for FileSlice<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.end.saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(remaining) as usize;
        let n = read_at(self.file, &mut buf[..want], self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}
