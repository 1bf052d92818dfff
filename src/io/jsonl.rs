//! JSON Lines (JSONL) utilities.
//!
//! This module provides:
//! - **Typed vector I/O** with Serde: [`read_jsonl_vec`] and [`write_jsonl_vec`]
//! - **Streaming reads**: [`JsonlReader`] deserializes one line at a time
//! - **Raw line helpers** used by the shuffle and split stages: [`count_lines`], [`read_lines`]
//!
//! # Notes
//! - Files are newline-delimited JSON; empty/whitespace-only lines are skipped on
//!   typed reads but still counted by [`count_lines`].
//! - Writes are atomic (see [`AtomicOutput`]).

use crate::io::AtomicOutput;
use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

fn open_buffered(path: &Path) -> Result<BufReader<File>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    Ok(BufReader::new(f))
}

/// Read a JSONL file into a typed `Vec<T>`.
///
/// # Errors
/// Returns an error if the file cannot be opened, read, or if any line fails
/// to parse into `T`. Errors include the line number.
pub fn read_jsonl_vec<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    JsonlReader::open(path)?.collect()
}

/// Write a typed slice as a JSONL file (one JSON value per line), atomically.
///
/// # Returns
/// The number of items written (`data.len()`).
///
/// # Errors
/// Returns an error if the file cannot be created or any item fails to
/// serialize/flush.
pub fn write_jsonl_vec<T: Serialize>(path: impl AsRef<Path>, data: &[T]) -> Result<usize> {
    let mut out = AtomicOutput::create(path)?;
    for item in data {
        out.write_json(item)?;
    }
    out.commit()?;
    Ok(data.len())
}

/// Count every line of a file, blank ones included.
///
/// # Errors
/// Returns an error if the file cannot be opened or read.
pub fn count_lines(path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let mut total: u64 = 0;
    for line in open_buffered(path)?.lines() {
        line.with_context(|| format!("read line {} in {}", total + 1, path.display()))?;
        total += 1;
    }
    Ok(total)
}

/// Read every line of a file, without terminators.
///
/// # Errors
/// Returns an error if the file cannot be opened or is not UTF-8.
pub fn read_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let path = path.as_ref();
    open_buffered(path)?
        .lines()
        .enumerate()
        .map(|(i, line)| line.with_context(|| format!("read line {} in {}", i + 1, path.display())))
        .collect()
}

/// Streaming typed reader over a JSONL file.
pub struct JsonlReader<T> {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    line_no: u64,
    _t: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lines = open_buffered(&path)?.lines();
        Ok(Self {
            path,
            lines,
            line_no: 0,
            _t: PhantomData,
        })
    }
}

impl<T: DeserializeOwned> Iterator for JsonlReader<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = self.lines.next()?;
            self.line_no += 1;
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    return Some(Err(e).with_context(|| {
                        format!("read line {} in {}", self.line_no, self.path.display())
                    }));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            return Some(serde_json::from_str(&line).with_context(|| {
                format!("parse JSONL line {} in {}", self.line_no, self.path.display())
            }));
        }
    }
}
