//! Pre-built test datasets and fixtures.

use crate::embed::VectorTable;
use crate::testing::TEST_VECTOR_DIM;
use crate::text::Normalize;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::create_dir_all;
use std::path::Path;

/// One row of a synthetic corpus CSV.
///
/// `domain` stands in for the many columns of the real corpus that the
/// reader ignores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsRowFixture {
    pub id: String,
    pub domain: String,
    #[serde(rename = "type")]
    pub category: String,
    pub title: String,
    pub content: String,
}

impl NewsRowFixture {
    pub fn new(id: i64, category: &str, title: &str, content: &str) -> Self {
        Self {
            id: id.to_string(),
            domain: "example.com".to_string(),
            category: category.to_string(),
            title: title.to_string(),
            content: content.to_string(),
        }
    }
}

/// Ten rows: five `reliable`, three `fake`, and two of categories the reader drops.
///
/// # Example
///
/// ```
/// use fnr_dataprep::testing::sample_news_rows;
///
/// let rows = sample_news_rows();
/// assert_eq!(rows.len(), 10);
/// ```
#[must_use]
pub fn sample_news_rows() -> Vec<NewsRowFixture> {
    vec![
        NewsRowFixture::new(1, "reliable", "Council", "budget vote passes"),
        NewsRowFixture::new(2, "fake", "Aliens", "landed in the park, sources say"),
        NewsRowFixture::new(3, "satire", "Local man", "wins argument with toaster"),
        NewsRowFixture::new(4, "reliable", "Weather", "rain expected tomorrow"),
        NewsRowFixture::new(5, "fake", "Miracle", "cure found in kitchen"),
        NewsRowFixture::new(6, "reliable", "Markets", "stocks close higher"),
        NewsRowFixture::new(7, "bias", "Opinion", "everyone else is wrong"),
        NewsRowFixture::new(8, "reliable", "Science", "new species of frog described"),
        NewsRowFixture::new(9, "fake", "Secret", "budget hides alien funding"),
        NewsRowFixture::new(10, "reliable", "Sports", "home team wins final"),
    ]
}

/// Write `rows` as a CSV with a header line.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_news_csv(path: impl AsRef<Path>, rows: &[NewsRowFixture]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        create_dir_all(parent).with_context(|| format!("mkdir -p {}", parent.display()))?;
    }
    let mut wtr = csv::Writer::from_path(path).with_context(|| format!("create {}", path.display()))?;
    for (i, row) in rows.iter().enumerate() {
        wtr.serialize(row)
            .with_context(|| format!("serialize CSV row #{}", i + 1))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Lowercases and splits on whitespace; nothing else.
#[derive(Clone, Copy, Debug, Default)]
pub struct WhitespaceNormalizer;

impl Normalize for WhitespaceNormalizer {
    fn normalize(&self, text: &str) -> Vec<String> {
        text.split_whitespace().map(str::to_lowercase).collect()
    }
}

/// A [`TEST_VECTOR_DIM`]-dimensional table covering a few words of
/// [`sample_news_rows`]: `budget`, `wins`, `rain` and `alien`.
#[must_use]
pub fn sample_vectors() -> VectorTable {
    let rows: [(&str, [f32; TEST_VECTOR_DIM]); 4] = [
        ("budget", [1.0, 0.0, 0.0, 0.0]),
        ("wins", [0.0, 1.0, 0.0, 0.0]),
        ("rain", [0.0, 0.0, 1.0, 0.0]),
        ("alien", [0.0, 0.0, 0.0, 1.0]),
    ];
    rows.into_iter().collect()
}
