use anyhow::Result;
use fnr_dataprep::checkpoint::{StageMarker, clear, compute_checksum, fingerprint, is_complete};
use std::fs;
use std::path::Path;

const FP: &str = "seed=7";

fn write(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text)?;
    Ok(())
}

#[test]
fn saved_marker_loads_back() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let out = tmp.path().join("corpus.preprocessed.jsonl");
    let marker_path = tmp.path().join("corpus.preprocess.done");
    write(out.as_path(), "a\nb\n")?;

    let marker = StageMarker::record("preprocess", FP, &[(out.as_path(), 2)])?;
    marker.save(&marker_path)?;

    let loaded = StageMarker::load(&marker_path)?.expect("marker exists");
    assert_eq!(loaded, marker);
    assert_eq!(loaded.outputs[0].file, "corpus.preprocessed.jsonl");
    assert_eq!(loaded.outputs[0].bytes, 4);
    assert_eq!(loaded.lines_of(&out), Some(2));
    assert_eq!(loaded.lines_of(&tmp.path().join("other.jsonl")), None);
    Ok(())
}

#[test]
fn missing_marker_loads_as_none() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    assert!(StageMarker::load(tmp.path().join("absent.done"))?.is_none());
    assert!(!is_complete(tmp.path().join("absent.done"), "shuffle", FP, &[])?);
    Ok(())
}

#[test]
fn complete_until_an_output_changes_size() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let out = tmp.path().join("shuffled.jsonl");
    let marker_path = tmp.path().join("shuffle.done");
    write(out.as_path(), "x\ny\n")?;
    StageMarker::record("shuffle", FP, &[(out.as_path(), 2)])?.save(&marker_path)?;

    assert!(is_complete(&marker_path, "shuffle", FP, &[out.as_path()])?);

    write(out.as_path(), "x\n")?;
    assert!(!is_complete(&marker_path, "shuffle", FP, &[out.as_path()])?);
    Ok(())
}

#[test]
fn missing_output_is_incomplete() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let out = tmp.path().join("shuffled.jsonl");
    let marker_path = tmp.path().join("shuffle.done");
    write(out.as_path(), "x\n")?;
    StageMarker::record("shuffle", FP, &[(out.as_path(), 1)])?.save(&marker_path)?;

    fs::remove_file(&out)?;
    assert!(!is_complete(&marker_path, "shuffle", FP, &[out.as_path()])?);
    Ok(())
}

#[test]
fn split_needs_every_output_covered() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let train = tmp.path().join("train.jsonl");
    let test = tmp.path().join("test.jsonl");
    let val = tmp.path().join("val.jsonl");
    for p in [&train, &test, &val] {
        write(p, "r\n")?;
    }
    let marker_path = tmp.path().join("split.done");
    StageMarker::record("split", FP, &[(train.as_path(), 1), (test.as_path(), 1)])?.save(&marker_path)?;
    assert!(!is_complete(&marker_path, "split", FP, &[train.as_path(), test.as_path(), val.as_path()])?);

    StageMarker::record("split", FP, &[(train.as_path(), 1), (test.as_path(), 1), (val.as_path(), 1)])?.save(&marker_path)?;
    assert!(is_complete(&marker_path, "split", FP, &[train.as_path(), test.as_path(), val.as_path()])?);
    Ok(())
}

#[test]
fn changed_fingerprint_is_incomplete() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let out = tmp.path().join("shuffled.jsonl");
    let marker_path = tmp.path().join("shuffle.done");
    write(out.as_path(), "x\ny\n")?;
    StageMarker::record("shuffle", FP, &[(out.as_path(), 2)])?.save(&marker_path)?;

    assert!(is_complete(&marker_path, "shuffle", FP, &[out.as_path()])?);
    assert!(!is_complete(&marker_path, "shuffle", "seed=8", &[out.as_path()])?);
    Ok(())
}

#[test]
fn fingerprint_follows_upstream_marker_and_settings() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let out = tmp.path().join("preprocessed.jsonl");
    write(out.as_path(), "x\n")?;
    let first = StageMarker::record("preprocess", FP, &[(out.as_path(), 1)])?;
    let mut second = first.clone();
    second.timestamp += 1;
    second.checksum = "rewritten".to_string();

    let base = fingerprint(Some(&first), "seed=1");
    assert_eq!(base, fingerprint(Some(&first), "seed=1"));
    assert_ne!(base, fingerprint(Some(&first), "seed=2"));
    assert_ne!(base, fingerprint(Some(&second), "seed=1"));
    assert_ne!(base, fingerprint(None, "seed=1"));
    Ok(())
}

#[test]
fn marker_of_another_stage_does_not_count() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let out = tmp.path().join("out.jsonl");
    let marker_path = tmp.path().join("stage.done");
    write(out.as_path(), "x\n")?;
    StageMarker::record("shuffle", FP, &[(out.as_path(), 1)])?.save(&marker_path)?;

    assert!(!is_complete(&marker_path, "preprocess", FP, &[out.as_path()])?);
    Ok(())
}

#[test]
fn tampered_marker_fails_verification() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let out = tmp.path().join("out.jsonl");
    let marker_path = tmp.path().join("stage.done");
    write(out.as_path(), "x\n")?;
    StageMarker::record("shuffle", FP, &[(out.as_path(), 1)])?.save(&marker_path)?;

    let text = fs::read_to_string(&marker_path)?.replace("\"lines\":1", "\"lines\":9");
    write(&marker_path, &text)?;

    let err = StageMarker::load(&marker_path).expect_err("checksum must not match");
    assert!(err.to_string().contains("checksum mismatch"));
    assert!(!is_complete(&marker_path, "shuffle", FP, &[out.as_path()])?);
    Ok(())
}

#[test]
fn garbage_marker_is_incomplete() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let out = tmp.path().join("out.jsonl");
    let marker_path = tmp.path().join("stage.done");
    write(out.as_path(), "x\n")?;
    write(&marker_path, "{ not json")?;

    assert!(StageMarker::load(&marker_path).is_err());
    assert!(!is_complete(&marker_path, "shuffle", FP, &[out.as_path()])?);
    Ok(())
}

#[test]
fn record_requires_existing_outputs() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("never-written.jsonl");
    assert!(StageMarker::record("shuffle", FP, &[(out.as_path(), 0)]).is_err());
}

#[test]
fn clear_removes_marker_and_tolerates_absence() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let marker_path = tmp.path().join("stage.done");
    write(&marker_path, "{}")?;

    clear(&marker_path)?;
    assert!(!marker_path.exists());
    clear(&marker_path)?;
    Ok(())
}

#[test]
fn checksum_is_hex_sha256() {
    assert_eq!(
        compute_checksum(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}
