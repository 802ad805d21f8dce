use super::helpers::*;
use crate::{BlockLog, Error};
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use tempfile::tempdir;

fn build_log(path: &std::path::Path, blocks: u32) {
    let log = BlockLog::<TestBlock>::open(path).unwrap();
    append_blocks(&log, 1, blocks);
}

// -------------------- Index reconstruction --------------------

#[test]
fn missing_index_is_rebuilt_byte_for_byte() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks");
    build_log(&path, 5);

    let original = fs::read(index_path(&path)).unwrap();
    fs::remove_file(index_path(&path)).unwrap();

    let log = BlockLog::<TestBlock>::open(&path).unwrap();
    assert_eq!(fs::read(index_path(&path)).unwrap(), original);
    assert_eq!(log.head().unwrap(), Some(TestBlock(5)));
    for n in 1..=5u32 {
        assert!(log.read_block_by_number(n).unwrap().is_some());
    }
}

#[test]
fn short_index_is_extended() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks");
    build_log(&path, 5);

    let original = fs::read(index_path(&path)).unwrap();

    // Keep only the first index entry; recovery resumes the scan after it.
    let file = OpenOptions::new()
        .write(true)
        .open(index_path(&path))
        .unwrap();
    file.set_len(8).unwrap();
    drop(file);

    let log = BlockLog::<TestBlock>::open(&path).unwrap();
    assert_eq!(fs::read(index_path(&path)).unwrap(), original);
    assert_eq!(log.offset_of(5).unwrap(), 48);
}

#[test]
fn ragged_index_tail_is_dropped_and_extended() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks");
    build_log(&path, 3);

    let original = fs::read(index_path(&path)).unwrap();
    let file = OpenOptions::new()
        .write(true)
        .open(index_path(&path))
        .unwrap();
    file.set_len(13).unwrap();
    drop(file);

    let _log = BlockLog::<TestBlock>::open(&path).unwrap();
    assert_eq!(fs::read(index_path(&path)).unwrap(), original);
}

#[test]
fn long_index_is_truncated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks");
    build_log(&path, 3);

    let original = fs::read(index_path(&path)).unwrap();
    let mut file = OpenOptions::new()
        .append(true)
        .open(index_path(&path))
        .unwrap();
    file.write_all(&[0xFF; 16]).unwrap();
    drop(file);

    let log = BlockLog::<TestBlock>::open(&path).unwrap();
    assert_eq!(fs::read(index_path(&path)).unwrap(), original);
    assert_eq!(log.offset_of(4).unwrap(), crate::NPOS);
}

#[test]
fn mismatched_index_is_rebuilt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks");
    build_log(&path, 3);

    let original = fs::read(index_path(&path)).unwrap();

    // Stomp the final index entry so it no longer matches the head.
    let mut corrupted = original.clone();
    corrupted[16..24].copy_from_slice(&[0xFF; 8]);
    fs::write(index_path(&path), &corrupted).unwrap();

    let log = BlockLog::<TestBlock>::open(&path).unwrap();
    assert_eq!(fs::read(index_path(&path)).unwrap(), original);
    assert_eq!(log.offset_of(3).unwrap(), 24);
}

#[test]
fn reconstruction_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks");
    build_log(&path, 7);

    let first = fs::read(index_path(&path)).unwrap();
    fs::remove_file(index_path(&path)).unwrap();
    drop(BlockLog::<TestBlock>::open(&path).unwrap());
    let second = fs::read(index_path(&path)).unwrap();
    assert_eq!(first, second);

    fs::remove_file(index_path(&path)).unwrap();
    drop(BlockLog::<TestBlock>::open(&path).unwrap());
    let third = fs::read(index_path(&path)).unwrap();
    assert_eq!(first, third);
}

// -------------------- Tail self-heal --------------------

#[test]
fn partial_final_entry_is_truncated_for_every_cut() {
    // Cut anywhere inside the final entry (block bytes or trailer): the
    // reopened log must hold exactly blocks 1 and 2.
    for cut in 1..=11u64 {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blocks");
        build_log(&path, 3);

        let data = fs::read(&path).unwrap();
        assert_eq!(data.len(), 36);
        fs::write(&path, &data[..(36 - cut) as usize]).unwrap();

        let log = BlockLog::<TestBlock>::open(&path).unwrap();
        assert_eq!(log.head().unwrap(), Some(TestBlock(2)), "cut={}", cut);
        assert_eq!(fs::read(&path).unwrap(), log_bytes(2), "cut={}", cut);
        assert_eq!(
            fs::read(index_path(&path)).unwrap(),
            index_bytes(2),
            "cut={}",
            cut
        );
    }
}

#[test]
fn single_partial_entry_leaves_empty_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks");
    build_log(&path, 1);

    let data = fs::read(&path).unwrap();
    fs::write(&path, &data[..7]).unwrap();

    let log = BlockLog::<TestBlock>::open(&path).unwrap();
    assert_eq!(log.head().unwrap(), None);
    assert_eq!(fs::read(&path).unwrap().len(), 0);
    assert_eq!(fs::read(index_path(&path)).unwrap().len(), 0);

    // The healed log accepts appends from scratch.
    assert_eq!(log.append(&TestBlock(1)).unwrap(), 0);
}

#[test]
fn garbage_tail_is_truncated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks");
    build_log(&path, 3);

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0xFF; 20]).unwrap();
    drop(file);

    let log = BlockLog::<TestBlock>::open(&path).unwrap();
    assert_eq!(log.head().unwrap(), Some(TestBlock(3)));
    assert_eq!(fs::read(&path).unwrap(), log_bytes(3));
}

// -------------------- Unrecoverable damage --------------------

#[test]
fn numbering_gap_mid_log_refuses_to_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks");

    // Hand-build a log holding blocks 1 and 3: a gap recovery must not
    // silently paper over.
    let mut bytes = entry_bytes(1, 0);
    bytes.extend_from_slice(&entry_bytes(3, 12));
    fs::write(&path, &bytes).unwrap();

    let result = BlockLog::<TestBlock>::open(&path);
    assert!(matches!(result, Err(Error::Corrupt(_))));
}

// -------------------- Empty-log edge --------------------

#[test]
fn empty_log_with_stale_index_truncates_index() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("blocks");
    fs::write(&path, b"").unwrap();
    fs::write(index_path(&path), &[0u8; 16]).unwrap();

    let log = BlockLog::<TestBlock>::open(&path).unwrap();
    assert_eq!(log.head().unwrap(), None);
    assert_eq!(fs::read(index_path(&path)).unwrap().len(), 0);
}
