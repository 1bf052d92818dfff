//! End-to-end driver.
//!
//! Stages run strictly in sequence and hand data over through files:
//!
//! ```text
//! corpus.csv ─preprocess─▶ .preprocessed.jsonl ─shuffle─▶ .shuffled.jsonl
//!            ─split─▶ .{train,test,val}.jsonl ─embed─▶ .embedded.{train,test,val}.jsonl
//! ```
//!
//! Each stage is skipped when its [completion marker](crate::checkpoint) is
//! valid, so a rerun after a crash resumes at the first unfinished stage.
//! A marker is only valid for the upstream marker and the settings it was
//! written with, so a stage that reruns, or whose settings changed, takes
//! every later stage with it.

use crate::checkpoint::{self, StageMarker};
use crate::config::PipelineConfig;
use crate::embed::{EmbeddingShape, EmbeddingSource, WordVectorModel, WordVectors};
use crate::io::AtomicOutput;
use crate::io::csv::CorpusReader;
use crate::metrics::MetricsCollector;
use crate::preprocess::ParallelPreprocessor;
use crate::shuffle::shuffle_lines;
use crate::split::{Split, SplitPaths, SplitSizes, split_file};
use crate::text::{Normalize, TextNormalizer};
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::metadata;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, info_span};

pub const STAGE_PREPROCESS: &str = "preprocess";
pub const STAGE_SHUFFLE: &str = "shuffle";
pub const STAGE_SPLIT: &str = "split";

/// Marker name of the embedding stage of `split`.
pub fn embed_stage_name(split: Split) -> String {
    format!("embed-{}", split.name())
}

/// What happened to one stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: String,
    /// `true` when a valid marker made the stage a no-op.
    pub skipped: bool,
    /// Lines per output, in the order the stage declares its outputs.
    pub lines: Vec<u64>,
}

impl StageOutcome {
    pub fn total_lines(&self) -> u64 {
        self.lines.iter().sum()
    }
}

#[derive(Clone, Debug, Default)]
pub struct RunReport {
    pub stages: Vec<StageOutcome>,
    pub split_sizes: SplitSizes,
}

impl RunReport {
    pub fn stage(&self, name: &str) -> Option<&StageOutcome> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// `true` when no stage did any work.
    pub fn all_skipped(&self) -> bool {
        self.stages.iter().all(|s| s.skipped)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    metrics: MetricsCollector,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Run every stage with the default normalizer and the model at
    /// [`PipelineConfig::vectors_path`].
    ///
    /// # Errors
    /// Returns the first stage failure.
    pub fn run(&self) -> Result<RunReport> {
        let normalizer = TextNormalizer::new()?;
        let vectors_path = self.config.vectors_path();
        self.run_with(&normalizer, || WordVectorModel::load(&vectors_path))
    }

    /// Run every stage with an explicit normalizer and model loader.
    ///
    /// `load_vectors` is only called if some split still needs embedding.
    ///
    /// # Errors
    /// Returns the first stage failure.
    pub fn run_with<N, V, F>(&self, normalizer: N, load_vectors: F) -> Result<RunReport>
    where
        N: Normalize,
        V: WordVectors,
        F: FnOnce() -> Result<V>,
    {
        self.metrics.record_start();
        let mut report = RunReport::default();

        report.stages.push(self.preprocess_stage(normalizer)?);
        report.stages.push(self.shuffle_stage()?);
        let (split, sizes) = self.split_stage()?;
        report.stages.push(split);
        report.split_sizes = sizes;
        report.stages.extend(self.embed_stage(load_vectors)?);

        self.metrics.record_end();
        self.metrics.log_summary();
        self.metrics
            .save_to_file(self.config.metrics_path())
            .context("save run metrics")?;
        Ok(report)
    }

    /// Fingerprint of a stage that reads the outputs of `upstream`.
    fn derived_from(&self, upstream: &str, settings: &str) -> Result<String> {
        let marker = StageMarker::load(self.config.marker_path(upstream))?;
        Ok(checkpoint::fingerprint(marker.as_ref(), settings))
    }

    /// Skip `stage` if its marker covers `outputs` and matches `fingerprint`,
    /// otherwise run `body`, which must atomically write every output and
    /// return their line counts.
    fn run_stage(
        &self,
        stage: &str,
        fingerprint: &str,
        outputs: &[&Path],
        body: impl FnOnce() -> Result<Vec<u64>>,
    ) -> Result<StageOutcome> {
        let _span = info_span!("stage", name = stage).entered();
        let marker_path = self.config.marker_path(stage);

        if checkpoint::is_complete(&marker_path, stage, fingerprint, outputs)? {
            let lines = match StageMarker::load(&marker_path)? {
                Some(marker) => outputs
                    .iter()
                    .map(|p| marker.lines_of(p).unwrap_or(0))
                    .collect(),
                None => vec![0; outputs.len()],
            };
            info!("already complete, skipping");
            return Ok(StageOutcome {
                stage: stage.to_string(),
                skipped: true,
                lines,
            });
        }

        checkpoint::clear(&marker_path)?;
        info!("running");
        let started = Instant::now();
        let lines = body().with_context(|| format!("stage {stage}"))?;
        let recorded: Vec<(&Path, u64)> = outputs.iter().copied().zip(lines.iter().copied()).collect();
        StageMarker::record(stage, fingerprint, &recorded)?.save(&marker_path)?;

        let elapsed = started.elapsed();
        self.metrics.record_stage_time(stage, elapsed);
        info!(lines = lines.iter().sum::<u64>(), elapsed_ms = elapsed.as_millis() as u64, "done");
        Ok(StageOutcome {
            stage: stage.to_string(),
            skipped: false,
            lines,
        })
    }

    fn progress(&self, len: Option<u64>, unit: &str) -> Result<ProgressBar> {
        if !self.config.show_progress {
            return Ok(ProgressBar::hidden());
        }
        Ok(match len {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(ProgressStyle::with_template(&format!(
                    "[{{elapsed_precise}}] {{bar:50.cyan/blue}} {{pos:>9}}/{{len:9}} {unit} ({{eta}})"
                ))?);
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(ProgressStyle::with_template(&format!(
                    "[{{elapsed_precise}}] {{spinner}} {{pos}} {unit} ({{per_sec}})"
                ))?);
                bar
            }
        })
    }

    /// Read, filter and normalize the corpus CSV into the preprocessed JSONL.
    ///
    /// # Errors
    /// Returns an error if the CSV cannot be read or the output cannot be written.
    pub fn preprocess_stage<N: Normalize>(&self, normalizer: N) -> Result<StageOutcome> {
        let output = self.config.preprocessed();
        let csv_bytes = metadata(self.config.corpus_csv()).map(|m| m.len()).ok();
        let categories: Vec<&str> = self.config.categories.iter().map(|c| c.as_str()).collect();
        let fingerprint = checkpoint::fingerprint(
            None,
            &format!("csv_bytes={csv_bytes:?};categories={}", categories.join(",")),
        );
        self.run_stage(STAGE_PREPROCESS, &fingerprint, &[output.as_path()], || {
            let mut reader = CorpusReader::open(
                self.config.corpus_csv(),
                self.config.csv_chunk_rows,
                &self.config.categories,
            )?
            .with_progress(self.progress(None, "rows")?);
            let pre = ParallelPreprocessor::new(
                normalizer,
                self.config.workers,
                self.config.preprocess_chunk,
            )?;
            info!(workers = pre.workers(), "normalizing");

            let mut out = AtomicOutput::create(&output)?;
            for record in pre.process(reader.by_ref()) {
                out.write_json(&record?)?;
            }
            let lines = out.commit()?;

            let stats = reader.stats();
            info!(
                rows_read = stats.rows_read,
                rows_kept = stats.rows_kept,
                rows_dropped = stats.rows_dropped,
                "corpus filtered"
            );
            self.metrics.set_counter("rows_read", stats.rows_read);
            self.metrics.set_counter("rows_kept", stats.rows_kept);
            self.metrics.set_counter("rows_dropped", stats.rows_dropped);
            self.metrics.set_counter("articles_preprocessed", lines);
            Ok(vec![lines])
        })
    }

    /// Shuffle the preprocessed corpus with the configured seed.
    ///
    /// # Errors
    /// Returns an error if the input is missing or the output cannot be written.
    pub fn shuffle_stage(&self) -> Result<StageOutcome> {
        let output = self.config.shuffled();
        let fingerprint = self.derived_from(
            STAGE_PREPROCESS,
            &format!("seed={}", self.config.shuffle_seed),
        )?;
        self.run_stage(STAGE_SHUFFLE, &fingerprint, &[output.as_path()], || {
            let lines = shuffle_lines(
                self.config.preprocessed(),
                &output,
                self.config.shuffle_seed,
            )?;
            self.metrics.set_counter("lines_shuffled", lines);
            Ok(vec![lines])
        })
    }

    /// Cut the shuffled corpus into train/test/val. Skipped only when all three
    /// outputs are covered by the marker.
    ///
    /// # Errors
    /// Returns an error if the input is missing or an output cannot be written.
    pub fn split_stage(&self) -> Result<(StageOutcome, SplitSizes)> {
        let paths = SplitPaths {
            train: self.config.split_path(Split::Train),
            test: self.config.split_path(Split::Test),
            val: self.config.split_path(Split::Val),
        };
        let outputs: Vec<&Path> = Split::ALL.iter().map(|s| paths.get(*s)).collect();
        let ratios = self.config.split;
        let fingerprint = self.derived_from(
            STAGE_SHUFFLE,
            &format!("train={};test={}", ratios.train, ratios.test),
        )?;
        let outcome = self.run_stage(STAGE_SPLIT, &fingerprint, &outputs, || {
            let progress = self.progress(Some(0), "lines")?;
            let sizes = split_file(self.config.shuffled(), &paths, self.config.split, &progress)?;
            Ok(Split::ALL.iter().map(|s| sizes.get(*s)).collect())
        })?;

        let sizes = SplitSizes {
            train: outcome.lines[0],
            test: outcome.lines[1],
            val: outcome.lines[2],
        };
        for split in Split::ALL {
            self.metrics
                .set_counter(&format!("split_{}", split.name()), sizes.get(split));
        }
        info!(train = sizes.train, test = sizes.test, val = sizes.val, "split sizes");
        Ok((outcome, sizes))
    }

    /// Embed every split that is not complete yet, loading the model at most once.
    ///
    /// # Errors
    /// Returns an error if the model cannot be loaded, has the wrong
    /// dimension, or an output cannot be written.
    pub fn embed_stage<V, F>(&self, load_vectors: F) -> Result<Vec<StageOutcome>>
    where
        V: WordVectors,
        F: FnOnce() -> Result<V>,
    {
        let shape = EmbeddingShape {
            max_words: self.config.max_words,
            vector_dim: self.config.vector_dim,
        };
        let mut loader = Some(load_vectors);
        let mut vectors: Option<V> = None;
        let mut outcomes = Vec::with_capacity(Split::ALL.len());

        for split in Split::ALL {
            let stage = embed_stage_name(split);
            let input = self.config.split_path(split);
            let output: PathBuf = self.config.embedded_path(split);
            let fingerprint = self.derived_from(
                STAGE_SPLIT,
                &format!(
                    "max_words={};vector_dim={};batch={}",
                    shape.max_words, shape.vector_dim, self.config.embed_batch_size
                ),
            )?;

            let outcome = self.run_stage(&stage, &fingerprint, &[output.as_path()], || {
                if vectors.is_none() {
                    let load = loader
                        .take()
                        .context("vector model loader already consumed")?;
                    info!("loading word vectors");
                    vectors = Some(load().context("load word vectors")?);
                }
                let model = vectors
                    .as_ref()
                    .context("vector model not loaded")?;
                let source =
                    EmbeddingSource::new(&input, model, shape, self.config.embed_batch_size)?;

                let progress = self.progress(None, &format!("{} records", split.name()))?;
                let mut out = AtomicOutput::create(&output)?;
                let mut records: u64 = 0;
                for batch in source.batches()? {
                    let batch = batch?;
                    records += batch.len() as u64;
                    progress.inc(batch.len() as u64);
                    out.write_json(&batch)?;
                }
                progress.finish();
                let batches = out.commit()?;
                self.metrics
                    .set_counter(&format!("embedded_{}", split.name()), records);
                Ok(vec![batches])
            })?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}
