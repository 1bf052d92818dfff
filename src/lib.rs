//! # fnr-dataprep
//!
//! Turns the raw fake-news corpus CSV into fixed-size word-embedding tensors
//! for training a binary reliable/unreliable classifier.
//!
//! ## Stages
//!
//! 1. **Read** ([`io::csv`]) - stream the CSV in bounded chunks and keep rows
//!    labelled `fake`, `conspiracy`, `unreliable` or `reliable`
//!    (label 1 for `reliable`, 0 otherwise)
//! 2. **Preprocess** ([`preprocess`], [`text`]) - normalize and stem article
//!    text on a worker pool, keeping input order
//! 3. **Shuffle** ([`shuffle`]) - seeded in-process permutation of lines
//! 4. **Split** ([`split`]) - positional 80/10/10 train/test/val cut
//! 5. **Embed** ([`embed`]) - one `max_words × vector_dim` matrix per
//!    article from a pretrained vector model, written in batches
//!
//! Stages exchange JSON Lines files and are resumable: each one writes its
//! outputs atomically and then a [completion marker](checkpoint); a rerun
//! skips every stage whose marker still matches its outputs.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fnr_dataprep::{Pipeline, PipelineConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = PipelineConfig::from_env()?;
//! let report = Pipeline::new(config).run()?;
//! println!("train split: {} articles", report.split_sizes.train);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - run configuration and derived paths
//! - [`record`] - records exchanged between stages
//! - [`io`] - atomic outputs, JSONL helpers, corpus CSV reader
//! - [`pipeline`] - the stage driver
//! - [`checkpoint`] - stage completion markers
//! - [`metrics`] - run counters and timings
//! - [`testing`] - fixtures for tests

pub mod checkpoint;
pub mod config;
pub mod embed;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod preprocess;
pub mod record;
pub mod shuffle;
pub mod split;
pub mod testing;
pub mod text;

pub use config::PipelineConfig;
pub use embed::{EmbeddingShape, EmbeddingSource, VectorTable, WordVectorModel, WordVectors};
pub use pipeline::{Pipeline, RunReport, StageOutcome};
pub use record::{Article, Category, EmbeddedBatch, PreprocessedArticle};
pub use split::{Split, SplitRatios, SplitSizes};
pub use text::{Normalize, TextNormalizer};
