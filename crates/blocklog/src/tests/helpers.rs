use codec::{CodecError, Record};
use std::io::Read;
use std::path::Path;

use crate::BlockLog;

/// Minimal stand-in block: number `n`, serialized as exactly the 4
/// little-endian bytes of `n`. Every entry in a `TestBlock` log is
/// therefore 12 bytes (4 block bytes + 8-byte trailer) and block `k`
/// lives at offset `12 * (k - 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestBlock(pub u32);

impl Record for TestBlock {
    fn number(&self) -> u32 {
        self.0
    }

    fn encode(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        buf.extend_from_slice(&self.0.to_le_bytes());
        Ok(())
    }

    fn decode<R: Read>(r: &mut R) -> Result<(Self, u64), CodecError> {
        let mut bytes = [0u8; 4];
        r.read_exact(&mut bytes)?;
        Ok((TestBlock(u32::from_le_bytes(bytes)), 4))
    }
}

pub fn append_blocks(log: &BlockLog<TestBlock>, from: u32, to: u32) {
    for n in from..=to {
        log.append(&TestBlock(n)).unwrap();
    }
}

/// The exact on-disk bytes of one `TestBlock` entry.
pub fn entry_bytes(number: u32, offset: u64) -> Vec<u8> {
    let mut bytes = number.to_le_bytes().to_vec();
    bytes.extend_from_slice(&offset.to_le_bytes());
    bytes
}

/// The exact on-disk bytes of a `TestBlock` log holding blocks `1..=n`.
pub fn log_bytes(n: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    for k in 1..=n {
        bytes.extend_from_slice(&entry_bytes(k, 12 * (k as u64 - 1)));
    }
    bytes
}

/// The exact on-disk bytes of the index for blocks `1..=n`.
pub fn index_bytes(n: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    for k in 1..=n {
        bytes.extend_from_slice(&(12 * (k as u64 - 1)).to_le_bytes());
    }
    bytes
}

pub fn index_path(log_path: &Path) -> std::path::PathBuf {
    let mut os = log_path.as_os_str().to_os_string();
    os.push(".index");
    std::path::PathBuf::from(os)
}
