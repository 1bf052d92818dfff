//! Corpus CSV reader.
//!
//! [`CorpusReader`] streams the news CSV in bounded chunks of raw rows, keeps
//! the rows whose `type` is one of the configured [`Category`] values and turns
//! them into [`Article`]s.
//!
//! # Design notes
//! - Columns are located by header name (`id`, `type`, `title`, `content`);
//!   any other column is ignored.
//! - Empty `title`/`content` cells count as empty strings.
//! - Rows of other categories are dropped but counted, see [`ReadStats`].
//! - The `csv` crate has no field-size cap, so very long article bodies are
//!   read as-is.

use crate::record::{Article, Category};
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct NewsRow {
    id: String,
    #[serde(rename = "type", default)]
    category: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

/// Row counters of a [`CorpusReader`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Data rows read (header excluded).
    pub rows_read: u64,
    /// Rows turned into articles.
    pub rows_kept: u64,
    /// Rows whose category is not kept.
    pub rows_dropped: u64,
}

/// Lazy, single-pass iterator of kept articles.
pub struct CorpusReader {
    path: PathBuf,
    rows: csv::DeserializeRecordsIntoIter<File, NewsRow>,
    chunk_rows: usize,
    categories: Vec<Category>,
    buffer: VecDeque<Article>,
    failed: Option<anyhow::Error>,
    done: bool,
    stats: ReadStats,
    progress: ProgressBar,
}

impl CorpusReader {
    /// Open `path`, buffering at most `chunk_rows` raw rows at a time.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or its header cannot be read.
    pub fn open(
        path: impl AsRef<Path>,
        chunk_rows: usize,
        categories: &[Category],
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let f = File::open(&path).with_context(|| format!("open {}", path.display()))?;
        let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(f);
        rdr.headers()
            .with_context(|| format!("read CSV header of {}", path.display()))?;
        Ok(Self {
            path,
            rows: rdr.into_deserialize(),
            chunk_rows: chunk_rows.max(1),
            categories: categories.to_vec(),
            buffer: VecDeque::new(),
            failed: None,
            done: false,
            stats: ReadStats::default(),
            progress: ProgressBar::hidden(),
        })
    }

    /// Tick `progress` once per raw row read.
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn stats(&self) -> ReadStats {
        self.stats
    }

    /// Read the next chunk of raw rows into the buffer.
    fn fill(&mut self) -> Result<()> {
        for _ in 0..self.chunk_rows {
            let Some(row) = self.rows.next() else {
                self.done = true;
                self.progress.finish();
                break;
            };
            let row_no = self.stats.rows_read + 1;
            self.stats.rows_read += 1;
            self.progress.inc(1);

            let row = row.with_context(|| {
                format!("parse CSV record #{} in {}", row_no, self.path.display())
            })?;
            let category = row
                .category
                .as_deref()
                .and_then(|c| c.parse::<Category>().ok())
                .filter(|c| self.categories.contains(c));
            let Some(category) = category else {
                self.stats.rows_dropped += 1;
                continue;
            };
            let id = row.id.trim().parse::<i64>().with_context(|| {
                format!(
                    "CSV record #{} in {}: id {:?} is not an integer",
                    row_no,
                    self.path.display(),
                    row.id
                )
            })?;
            self.stats.rows_kept += 1;
            self.buffer.push_back(Article {
                id,
                text: format!(
                    "{} {}",
                    row.title.unwrap_or_default(),
                    row.content.unwrap_or_default()
                ),
                label: category.label(),
            });
        }
        Ok(())
    }
}

impl Iterator for CorpusReader {
    type Item = Result<Article>;

    /// Articles read before a failing row are yielded first, then the error.
    fn next(&mut self) -> Option<Self::Item> {
        while self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fill() {
                self.done = true;
                self.failed = Some(e);
            }
        }
        match self.buffer.pop_front() {
            Some(article) => Some(Ok(article)),
            None => self.failed.take().map(Err),
        }
    }
}
