//! Integration tests for the block log CLI.
//!
//! Each test spawns the binary with a temp log path, drives it over stdin,
//! and asserts on the stdout transcript.

use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Helper to run CLI commands and capture output.
fn run_cli(log_path: &Path, commands: &str) -> String {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new("cargo")
        .args(["run", "-p", "cli", "--"])
        .env("BLOCKLOG_PATH", log_path.to_str().unwrap())
        .env("BLOCKLOG_SYNC", "false")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");

    {
        let stdin = child.stdin.as_mut().expect("Failed to open stdin");
        stdin
            .write_all(commands.as_bytes())
            .expect("Failed to write to stdin");
        stdin.write_all(b"EXIT\n").expect("Failed to write EXIT");
    }

    let output = child.wait_with_output().expect("Failed to read output");
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn gen_then_head_and_get() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("block_log");

    let output = run_cli(&path, "GEN 3\nHEAD\nGET 2\nOFFSET 1\n");

    assert!(output.contains("OK appended 3 blocks (head=3)"));
    assert!(output.contains("block 3 produced by"));
    assert!(output.contains("block 2 produced by"));
    assert!(output.contains("> 0"));
}

#[test]
fn log_persists_across_runs() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("block_log");

    run_cli(&path, "GEN 4\n");
    let output = run_cli(&path, "HEAD\nGEN 2\nHEAD\n");

    assert!(output.contains("block 4 produced by"));
    assert!(output.contains("OK appended 2 blocks (head=6)"));
    assert!(output.contains("block 6 produced by"));
}

#[test]
fn verify_walks_the_whole_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("block_log");

    let output = run_cli(&path, "GEN 5\nVERIFY\n");
    assert!(output.contains("OK 5 blocks, trailer chain intact"));
}

#[test]
fn reindex_rebuilds_a_deleted_index() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("block_log");

    run_cli(&path, "GEN 3\n");

    let index_path = {
        let mut os = path.as_os_str().to_os_string();
        os.push(".index");
        std::path::PathBuf::from(os)
    };
    fs::remove_file(&index_path).unwrap();

    let output = run_cli(&path, "REINDEX\nGET 2\n");
    assert!(output.contains("OK index rebuilt (3 blocks)"));
    assert!(output.contains("block 2 produced by"));
    assert_eq!(fs::read(&index_path).unwrap().len(), 24);
}

#[test]
fn trim_writes_a_prefix_log() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("block_log");
    let pruned = dir.path().join("pruned_log");

    let commands = format!("GEN 5\nTRIM 2 {}\n", pruned.display());
    let output = run_cli(&path, &commands);
    assert!(output.contains("OK wrote blocks 1..=2"));

    let check = run_cli(&pruned, "HEAD\nVERIFY\n");
    assert!(check.contains("block 2 produced by"));
    assert!(check.contains("OK 2 blocks, trailer chain intact"));
}
