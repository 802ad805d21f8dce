//! # CLI - Block Log Inspection Shell
//!
//! A REPL-style command-line tool for the block log. Reads commands from
//! stdin, executes them against the log, and prints results to stdout.
//! Designed for both interactive use and scripted testing (pipe commands
//! via stdin).
//!
//! ## Commands
//!
//! ```text
//! GEN n              Append n deterministic synthetic blocks
//! HEAD               Print the head block summary
//! GET n              Print block n
//! OFFSET n           Print the log offset of block n (or NPOS)
//! RANGE a b          Print summaries of blocks a..=b
//! VERIFY             Walk the whole log, checking trailers and numbering
//! REINDEX            Drop the index file and rebuild it from the log
//! TRIM n path        Rewrite blocks 1..=n into a fresh log at path
//! STATS              Print log debug info
//! FLUSH / SYNC       Durability barriers
//! EXIT / QUIT        Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! BLOCKLOG_PATH   Path of the main log file   (default: "block_log")
//! BLOCKLOG_SYNC   fsync after every GEN batch (default: "false")
//! ```

use anyhow::Result;
use blocklog::{iterate, rewrite, BlockLog, NPOS};
use codec::Block;
use std::io::{self, BufRead, Write};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Builds a deterministic synthetic block for smoke testing: the contents
/// depend only on the block number, so repeated runs produce identical
/// logs.
fn synthetic_block(number: u32) -> Block {
    Block {
        number,
        previous: [(number.wrapping_sub(1) & 0xFF) as u8; 32],
        timestamp: 1_700_000_000 + number as u64 * 3,
        producer: format!("witness{}", number % 21),
        transactions: vec![
            format!("txn-{}-0", number).into_bytes(),
            format!("txn-{}-1", number).into_bytes(),
        ],
    }
}

fn summary(block: &Block) -> String {
    format!(
        "block {} produced by {} at {} ({} txns)",
        block.number,
        block.producer,
        block.timestamp,
        block.transactions.len()
    )
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_writer(io::stderr)
        .init();

    let path = env_or("BLOCKLOG_PATH", "block_log");
    let sync: bool = env_or("BLOCKLOG_SYNC", "false").parse().unwrap_or(false);

    let mut log = BlockLog::<Block>::open(&path)?;
    let head = log.head()?.map(|b| b.number).unwrap_or(0);

    println!("block log opened (path={}, head={}, sync={})", path, head, sync);
    println!("Commands: GEN n | HEAD | GET n | OFFSET n | RANGE a b | VERIFY");
    println!("          REINDEX | TRIM n path | STATS | FLUSH | SYNC | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "GEN" => match parts.next().and_then(|n| n.parse::<u32>().ok()) {
                    Some(count) => {
                        let from = log.head()?.map(|b| b.number).unwrap_or(0);
                        let mut appended = 0u32;
                        let mut failed = None;
                        for n in from + 1..=from.saturating_add(count) {
                            match log.append(&synthetic_block(n)) {
                                Ok(_) => appended += 1,
                                Err(e) => {
                                    failed = Some(e);
                                    break;
                                }
                            }
                        }
                        if sync {
                            log.sync()?;
                        }
                        match failed {
                            None => println!("OK appended {} blocks (head={})", appended, from + appended),
                            Some(e) => println!("ERR append failed after {}: {}", appended, e),
                        }
                    }
                    None => println!("ERR usage: GEN n"),
                },
                "HEAD" => match log.head()? {
                    Some(block) => println!("{}", summary(&block)),
                    None => println!("(empty)"),
                },
                "GET" => match parts.next().and_then(|n| n.parse::<u32>().ok()) {
                    Some(n) => match log.read_block_by_number(n) {
                        Ok(Some((block, _))) => println!("{}", summary(&block)),
                        Ok(None) => println!("(not found)"),
                        Err(e) => println!("ERR read failed: {}", e),
                    },
                    None => println!("ERR usage: GET n"),
                },
                "OFFSET" => match parts.next().and_then(|n| n.parse::<u32>().ok()) {
                    Some(n) => match log.offset_of(n) {
                        Ok(NPOS) => println!("NPOS"),
                        Ok(offset) => println!("{}", offset),
                        Err(e) => println!("ERR offset failed: {}", e),
                    },
                    None => println!("ERR usage: OFFSET n"),
                },
                "RANGE" => {
                    let from = parts.next().and_then(|n| n.parse::<u32>().ok());
                    let to = parts.next().and_then(|n| n.parse::<u32>().ok());
                    match (from, to) {
                        (Some(from), Some(to)) if from <= to => {
                            let mut shown = 0u32;
                            for n in from..=to {
                                match log.read_block_by_number(n) {
                                    Ok(Some((block, _))) => {
                                        println!("{}", summary(&block));
                                        shown += 1;
                                    }
                                    Ok(None) => break,
                                    Err(e) => {
                                        println!("ERR read failed: {}", e);
                                        break;
                                    }
                                }
                            }
                            println!("({} blocks)", shown);
                        }
                        _ => println!("ERR usage: RANGE a b"),
                    }
                }
                "VERIFY" => {
                    let mut count = 0u64;
                    let mut expected = 1u32;
                    let mut ordered = true;
                    let result = iterate::<Block, _, _>(&path, |block| {
                        if block.number != expected {
                            ordered = false;
                            return false;
                        }
                        expected = expected.wrapping_add(1);
                        count += 1;
                        true
                    });
                    match result {
                        Ok(()) if ordered => println!("OK {} blocks, trailer chain intact", count),
                        Ok(()) => println!("ERR numbering broken after {} blocks", count),
                        Err(e) => println!("ERR verify failed after {} blocks: {}", count, e),
                    }
                }
                "REINDEX" => {
                    let index_path = log.index_path()?.to_path_buf();
                    log.close()?;
                    if let Err(e) = std::fs::remove_file(&index_path) {
                        if e.kind() != io::ErrorKind::NotFound {
                            println!("ERR could not remove index: {}", e);
                        }
                    }
                    log = BlockLog::<Block>::open(&path)?;
                    let head = log.head()?.map(|b| b.number).unwrap_or(0);
                    println!("OK index rebuilt ({} blocks)", head);
                }
                "TRIM" => {
                    let n = parts.next().and_then(|n| n.parse::<u32>().ok());
                    let out = parts.next();
                    match (n, out) {
                        (Some(n), Some(out)) => {
                            // Flush so the walk sees every appended block.
                            log.flush()?;
                            match rewrite::<Block, _, _>(&path, out, n) {
                                Ok(()) => println!("OK wrote blocks 1..={} to {}", n, out),
                                Err(e) => println!("ERR trim failed: {}", e),
                            }
                        }
                        _ => println!("ERR usage: TRIM n path"),
                    }
                }
                "STATS" => {
                    println!("{:?}", log);
                }
                "FLUSH" => match log.flush() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR flush failed: {}", e),
                },
                "SYNC" => match log.sync() {
                    Ok(()) => println!("OK"),
                    Err(e) => println!("ERR sync failed: {}", e),
                },
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}
