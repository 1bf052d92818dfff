//! Run configuration.
//!
//! A [`PipelineConfig`] is built once (usually from the environment) and handed
//! to every stage. It owns every derived file path, so no stage has to know how
//! names are composed.
//!
//! | Variable           | Meaning                                  | Default                  |
//! |--------------------|------------------------------------------|--------------------------|
//! | `FNR_PATH_DATA`    | base data directory                      | `data/fake_news_corpus/` |
//! | `FNR_SHUFFLE_SEED` | seed of the line shuffle                 | [`DEFAULT_SHUFFLE_SEED`] |
//! | `FNR_WORKERS`      | normalization worker count               | logical CPU count        |
//! | `FNR_PROGRESS`     | `0`/`false` hides progress bars          | shown                    |

use crate::record::Category;
use crate::split::{Split, SplitRatios};
use anyhow::{Context, Result, bail};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR: &str = "data/fake_news_corpus/";
pub const CORPUS_VERSION: &str = "news_cleaned_2018_02_13";
pub const DEFAULT_SHUFFLE_SEED: u64 = 0x5eed_f4e0;

pub const DEFAULT_MAX_WORDS: usize = 300;
pub const DEFAULT_VECTOR_DIM: usize = 100;
pub const DEFAULT_CSV_CHUNK_ROWS: usize = 10_000;
pub const DEFAULT_PREPROCESS_CHUNK: usize = 1000;

/// Everything a run needs to know, resolved up front.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    /// Path prefix every artifact name is derived from (`<data dir>/<corpus version>`).
    pub base: PathBuf,
    /// Rows of each embedding matrix; longer articles are truncated.
    pub max_words: usize,
    /// Columns of each embedding matrix; must match the vector model.
    pub vector_dim: usize,
    /// Raw CSV rows buffered per read.
    pub csv_chunk_rows: usize,
    /// Articles handed to the worker pool per ordered batch.
    pub preprocess_chunk: usize,
    /// Size of the normalization worker pool.
    pub workers: usize,
    pub split: SplitRatios,
    pub shuffle_seed: u64,
    /// Records per embedded output line.
    pub embed_batch_size: usize,
    pub show_progress: bool,
    /// Categories kept by the reader; everything else is dropped.
    pub categories: Vec<Category>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_data_dir(DEFAULT_DATA_DIR)
    }
}

impl PipelineConfig {
    /// Default tunables rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            base: data_dir.as_ref().join(CORPUS_VERSION),
            max_words: DEFAULT_MAX_WORDS,
            vector_dim: DEFAULT_VECTOR_DIM,
            csv_chunk_rows: DEFAULT_CSV_CHUNK_ROWS,
            preprocess_chunk: DEFAULT_PREPROCESS_CHUNK,
            workers: num_cpus::get().max(1),
            split: SplitRatios::default(),
            shuffle_seed: DEFAULT_SHUFFLE_SEED,
            embed_batch_size: 1,
            show_progress: true,
            categories: Category::ALL.to_vec(),
        }
    }

    /// Build from the process environment.
    ///
    /// # Errors
    /// Returns an error if a set variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup (the environment in production).
    ///
    /// # Errors
    /// Returns an error if a present variable holds an invalid value.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = lookup("FNR_PATH_DATA").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
        let mut config = Self::with_data_dir(data_dir);

        if let Some(seed) = lookup("FNR_SHUFFLE_SEED") {
            config.shuffle_seed = seed
                .trim()
                .parse()
                .with_context(|| format!("FNR_SHUFFLE_SEED is not a u64: {seed:?}"))?;
        }
        if let Some(workers) = lookup("FNR_WORKERS") {
            let n: usize = workers
                .trim()
                .parse()
                .with_context(|| format!("FNR_WORKERS is not a number: {workers:?}"))?;
            if n == 0 {
                bail!("FNR_WORKERS must be at least 1");
            }
            config.workers = n;
        }
        if let Some(progress) = lookup("FNR_PROGRESS") {
            config.show_progress = !matches!(progress.trim(), "0" | "false" | "no" | "off");
        }
        Ok(config)
    }

    /// `base` with `suffix` appended to the file name.
    fn derived(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self.base.clone().into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn corpus_csv(&self) -> PathBuf {
        self.derived(".csv")
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.derived(".fasttext.bin")
    }

    pub fn preprocessed(&self) -> PathBuf {
        self.derived(".preprocessed.jsonl")
    }

    pub fn shuffled(&self) -> PathBuf {
        self.derived(".preprocessed.shuffled.jsonl")
    }

    pub fn split_path(&self, split: Split) -> PathBuf {
        self.derived(&format!(".preprocessed.shuffled.{}.jsonl", split.name()))
    }

    pub fn embedded_path(&self, split: Split) -> PathBuf {
        self.derived(&format!(
            ".preprocessed.shuffled.embedded.{}.jsonl",
            split.name()
        ))
    }

    /// Completion marker of the named stage.
    pub fn marker_path(&self, stage: &str) -> PathBuf {
        self.derived(&format!(".{stage}.done"))
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.derived(".metrics.json")
    }
}
