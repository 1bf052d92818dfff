//! File I/O shared by the stages.
//!
//! Every stage output goes through [`AtomicOutput`]: bytes land in a temporary
//! file next to the destination and only replace it on [`AtomicOutput::commit`].
//! An interrupted stage therefore leaves either the previous file or nothing.

pub mod csv;
pub mod jsonl;

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::create_dir_all;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Line-oriented writer that publishes its file atomically.
pub struct AtomicOutput {
    path: PathBuf,
    writer: BufWriter<NamedTempFile>,
    lines: u64,
}

impl AtomicOutput {
    /// Start writing `path`. Parent directories are created as needed.
    ///
    /// # Errors
    /// Returns an error if the directory or the temporary file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        create_dir_all(&dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        let tmp = tempfile::Builder::new()
            .prefix(".fnr-")
            .suffix(".part")
            .tempfile_in(&dir)
            .with_context(|| format!("create temporary file in {}", dir.display()))?;
        Ok(Self {
            path,
            writer: BufWriter::new(tmp),
            lines: 0,
        })
    }

    /// Destination path (not the temporary file).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written so far.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    /// Write `line` followed by `\n`. `line` must not contain a newline.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer
            .write_all(line.as_bytes())
            .and_then(|()| self.writer.write_all(b"\n"))
            .with_context(|| format!("write line {} of {}", self.lines + 1, self.path.display()))?;
        self.lines += 1;
        Ok(())
    }

    /// Serialize `value` as one JSON line.
    pub fn write_json<T: Serialize>(&mut self, value: &T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, value).with_context(|| {
            format!("serialize line {} of {}", self.lines + 1, self.path.display())
        })?;
        self.writer
            .write_all(b"\n")
            .with_context(|| format!("write {}", self.path.display()))?;
        self.lines += 1;
        Ok(())
    }

    /// Flush, fsync and rename over the destination. Returns the line count.
    ///
    /// # Errors
    /// Returns an error if flushing, syncing or renaming fails; the destination
    /// is left untouched in that case.
    pub fn commit(self) -> Result<u64> {
        let Self {
            path,
            writer,
            lines,
        } = self;
        let tmp = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("flush {}", path.display()))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("sync {}", path.display()))?;
        tmp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("rename into {}", path.display()))?;
        Ok(lines)
    }
}
