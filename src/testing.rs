//! Testing utilities for the preparation pipeline.
//!
//! - **Fixtures**: a synthetic news CSV, a tiny vector table, and a
//!   whitespace normalizer that keeps tokens predictable
//! - **Config**: [`test_config`] roots a quiet, small-chunk configuration in a
//!   temporary directory
//!
//! # Quick Start
//!
//! ```no_run
//! use fnr_dataprep::pipeline::Pipeline;
//! use fnr_dataprep::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let tmp = tempfile::tempdir()?;
//! let config = test_config(tmp.path());
//! write_news_csv(config.corpus_csv(), &sample_news_rows())?;
//!
//! let report = Pipeline::new(config).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;
//! assert!(!report.all_skipped());
//! # Ok(())
//! # }
//! ```

pub mod fixtures;

pub use fixtures::*;

use crate::config::PipelineConfig;
use std::path::Path;

/// Vector length used by [`test_config`] and [`sample_vectors`].
pub const TEST_VECTOR_DIM: usize = 4;
/// Sequence length used by [`test_config`].
pub const TEST_MAX_WORDS: usize = 6;

/// Small, silent configuration rooted at `dir`.
pub fn test_config(dir: impl AsRef<Path>) -> PipelineConfig {
    let mut config = PipelineConfig::with_data_dir(dir);
    config.max_words = TEST_MAX_WORDS;
    config.vector_dim = TEST_VECTOR_DIM;
    config.csv_chunk_rows = 3;
    config.preprocess_chunk = 2;
    config.workers = 2;
    config.show_progress = false;
    config
}
