use anyhow::{Result, bail};
use fnr_dataprep::io::jsonl::{read_jsonl_vec, read_lines};
use fnr_dataprep::pipeline::{
    RunReport, STAGE_PREPROCESS, STAGE_SHUFFLE, STAGE_SPLIT, embed_stage_name,
};
use fnr_dataprep::testing::*;
use fnr_dataprep::{
    EmbeddedBatch, Pipeline, PipelineConfig, PreprocessedArticle, Split, SplitSizes, VectorTable,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

fn setup(dir: &Path) -> Result<PipelineConfig> {
    let config = test_config(dir);
    write_news_csv(config.corpus_csv(), &sample_news_rows())?;
    Ok(config)
}

fn no_vectors() -> Result<VectorTable> {
    bail!("vector model must not be loaded")
}

/// Stages that follow preprocess, in run order.
const AFTER_PREPROCESS: [&str; 5] = [STAGE_SHUFFLE, STAGE_SPLIT, "embed-train", "embed-test", "embed-val"];

fn reran(report: &RunReport) -> Vec<&str> {
    report
        .stages
        .iter()
        .filter(|s| !s.skipped)
        .map(|s| s.stage.as_str())
        .collect()
}

/// Every data file and marker the pipeline writes, with its bytes.
fn snapshot(config: &PipelineConfig) -> Result<BTreeMap<PathBuf, Vec<u8>>> {
    let mut paths = vec![config.preprocessed(), config.shuffled()];
    for split in Split::ALL {
        paths.push(config.split_path(split));
        paths.push(config.embedded_path(split));
        paths.push(config.marker_path(&embed_stage_name(split)));
    }
    for stage in [STAGE_PREPROCESS, STAGE_SHUFFLE, STAGE_SPLIT] {
        paths.push(config.marker_path(stage));
    }
    paths
        .into_iter()
        .map(|p| Ok((p.clone(), fs::read(&p)?)))
        .collect()
}

#[test]
fn end_to_end_produces_every_artifact() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = setup(tmp.path())?;
    let pipeline = Pipeline::new(config.clone());

    let report = pipeline.run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;
    assert!(report.stages.iter().all(|s| !s.skipped));
    assert_eq!(report.stages.len(), 6);
    assert_eq!(
        report.split_sizes,
        SplitSizes {
            train: 6,
            test: 0,
            val: 2
        }
    );

    let pre: Vec<PreprocessedArticle> = read_jsonl_vec(config.preprocessed())?;
    assert_eq!(pre.len(), 8);
    assert_eq!(pre.iter().map(|a| u64::from(a.label)).sum::<u64>(), 5);
    assert_eq!(pre[0].id, 1);
    assert_eq!(pre[0].content, vec!["council", "budget", "vote", "passes"]);

    let mut shuffled = read_lines(config.shuffled())?;
    let mut original = read_lines(config.preprocessed())?;
    shuffled.sort();
    original.sort();
    assert_eq!(shuffled, original);

    let mut nonzero = 0;
    for split in Split::ALL {
        let batches: Vec<EmbeddedBatch> = read_jsonl_vec(config.embedded_path(split))?;
        assert_eq!(batches.len() as u64, report.split_sizes.get(split));
        for batch in &batches {
            assert_eq!(batch.len(), 1);
            let matrix = &batch.embedding[0];
            assert_eq!(matrix.len(), TEST_MAX_WORDS);
            assert!(matrix.iter().all(|row| row.len() == TEST_VECTOR_DIM));
            nonzero += matrix.iter().flatten().filter(|v| **v != 0.0).count();
        }
    }
    // budget twice, alien, rain, wins
    assert_eq!(nonzero, 5);

    assert!(config.metrics_path().exists());
    Ok(())
}

#[test]
fn split_files_partition_the_shuffled_corpus() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = setup(tmp.path())?;
    Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;

    let joined: Vec<String> = Split::ALL
        .iter()
        .map(|s| read_lines(config.split_path(*s)))
        .collect::<Result<Vec<_>>>()?
        .concat();
    assert_eq!(joined, read_lines(config.shuffled())?);
    Ok(())
}

#[test]
fn rerun_skips_every_stage_and_changes_nothing() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = setup(tmp.path())?;
    Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;
    let before = snapshot(&config)?;

    let report = Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, no_vectors)?;
    assert!(report.all_skipped());
    assert_eq!(report.split_sizes.total(), 8);
    assert_eq!(report.stage(STAGE_PREPROCESS).map(|s| s.total_lines()), Some(8));
    assert_eq!(snapshot(&config)?, before);
    Ok(())
}

#[test]
fn damaged_output_reruns_its_stage_and_everything_after() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = setup(tmp.path())?;
    Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;
    let before = snapshot(&config)?;

    let shuffled = config.shuffled();
    let text = fs::read_to_string(&shuffled)?;
    fs::write(&shuffled, &text[..text.len() / 2])?;

    let report = Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;
    assert_eq!(reran(&report), AFTER_PREPROCESS);
    assert_eq!(fs::read_to_string(&shuffled)?, text);

    // same seed, so only the markers downstream of preprocess differ
    let after = snapshot(&config)?;
    assert_eq!(
        after.get(&config.marker_path(STAGE_PREPROCESS)),
        before.get(&config.marker_path(STAGE_PREPROCESS))
    );
    for split in Split::ALL {
        for path in [config.split_path(split), config.embedded_path(split)] {
            assert_eq!(after.get(&path), before.get(&path), "{}", path.display());
        }
    }
    Ok(())
}

#[test]
fn seed_change_reshuffles_and_recuts_the_splits() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut config = setup(tmp.path())?;
    Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;
    let first_order = read_lines(config.shuffled())?;

    config.shuffle_seed = 99;
    let report = Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;
    assert_eq!(reran(&report), AFTER_PREPROCESS);

    let shuffled = read_lines(config.shuffled())?;
    assert_ne!(shuffled, first_order);
    let joined: Vec<String> = Split::ALL
        .iter()
        .map(|s| read_lines(config.split_path(*s)))
        .collect::<Result<Vec<_>>>()?
        .concat();
    assert_eq!(joined, shuffled);

    let again = Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, no_vectors)?;
    assert!(again.all_skipped());
    Ok(())
}

#[test]
fn batch_size_change_reembeds_only() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut config = setup(tmp.path())?;
    Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;

    config.embed_batch_size = 4;
    let report = Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;
    assert_eq!(reran(&report), &AFTER_PREPROCESS[2..]);

    let train: Vec<EmbeddedBatch> = read_jsonl_vec(config.embedded_path(Split::Train))?;
    assert_eq!(train.iter().map(EmbeddedBatch::len).collect::<Vec<_>>(), vec![4, 2]);
    Ok(())
}

#[test]
fn missing_split_marker_reruns_split_and_embeds() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = setup(tmp.path())?;
    Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;

    fs::remove_file(config.marker_path(STAGE_SPLIT))?;
    let report = Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;
    assert_eq!(reran(&report), &AFTER_PREPROCESS[1..]);
    Ok(())
}

#[test]
fn missing_marker_reruns_that_stage() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = setup(tmp.path())?;
    Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;

    fs::remove_file(config.marker_path(&embed_stage_name(Split::Val)))?;
    let report = Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;
    assert_eq!(reran(&report), ["embed-val"]);
    Ok(())
}

#[test]
fn dropped_rows_are_reported() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = setup(tmp.path())?;
    let pipeline = Pipeline::new(config.clone());
    pipeline.run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;

    let metrics = pipeline.metrics();
    assert_eq!(metrics.counter("rows_read"), Some(10));
    assert_eq!(metrics.counter("rows_dropped"), Some(2));
    assert_eq!(metrics.counter("articles_preprocessed"), Some(8));
    assert_eq!(metrics.counter("embedded_train"), Some(6));

    let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(config.metrics_path())?)?;
    assert_eq!(saved["counters"]["rows_dropped"], 2);
    Ok(())
}

#[test]
fn larger_batches_group_records() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let mut config = setup(tmp.path())?;
    config.embed_batch_size = 4;
    let report = Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()))?;

    let train: Vec<EmbeddedBatch> = read_jsonl_vec(config.embedded_path(Split::Train))?;
    assert_eq!(train.iter().map(EmbeddedBatch::len).collect::<Vec<_>>(), vec![4, 2]);
    assert_eq!(
        report.stage(&embed_stage_name(Split::Train)).map(|s| s.total_lines()),
        Some(2)
    );
    let test: Vec<EmbeddedBatch> = read_jsonl_vec(config.embedded_path(Split::Test))?;
    assert!(test.is_empty());
    Ok(())
}

#[test]
fn missing_corpus_is_an_error() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = test_config(tmp.path());
    let result = Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(sample_vectors()));
    assert!(result.is_err());
    assert!(!config.preprocessed().exists());
    assert!(!config.marker_path(STAGE_PREPROCESS).exists());
    Ok(())
}

#[test]
fn wrong_model_dimension_fails_after_split() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = setup(tmp.path())?;
    let result = Pipeline::new(config.clone()).run_with(WhitespaceNormalizer, || Ok(VectorTable::new(7)));
    assert!(result.is_err());
    assert!(config.marker_path(STAGE_SPLIT).exists());
    assert!(!config.embedded_path(Split::Train).exists());
    Ok(())
}

#[test]
fn default_run_needs_the_vector_model() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let config = setup(tmp.path())?;
    let err = Pipeline::new(config.clone()).run().expect_err("no model on disk");
    assert!(format!("{err:#}").contains("load word vectors"));

    let pre: Vec<PreprocessedArticle> = read_jsonl_vec(config.preprocessed())?;
    assert_eq!(pre.len(), 8);
    assert!(pre.iter().all(|a| a.content.iter().all(|t| t.len() >= 3)));
    Ok(())
}
