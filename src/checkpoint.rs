//! Stage completion markers.
//!
//! A stage is complete only when its marker says so. After all outputs of a
//! stage have been atomically renamed into place, a [`StageMarker`] is written
//! (atomically as well) listing each output with its byte size and line count,
//! plus a fingerprint of what the outputs were derived from: the checksum of
//! the upstream stage's marker and the settings that shaped the stage. The
//! marker carries a SHA-256 checksum of its own fields.
//!
//! [`is_complete`] accepts a stage only if the marker exists, parses, verifies,
//! carries the expected fingerprint, names exactly the expected outputs, and
//! every output still has the recorded size. Anything else means "run the
//! stage again". Since a rerun writes a fresh marker, and so a fresh checksum,
//! every stage downstream of it reruns too.
//!
//! # Usage
//!
//! ```no_run
//! use fnr_dataprep::checkpoint::{fingerprint, is_complete, StageMarker};
//! use std::path::Path;
//! # fn main() -> anyhow::Result<()> {
//! let out = Path::new("corpus.preprocessed.jsonl");
//! let marker = Path::new("corpus.preprocess.done");
//! let fingerprint = fingerprint(None, "categories=fake,reliable");
//! if !is_complete(marker, "preprocess", &fingerprint, &[out])? {
//!     // ... write `out` ...
//!     StageMarker::record("preprocess", &fingerprint, &[(out, 42)])?.save(marker)?;
//! }
//! # Ok(())
//! # }
//! ```

use crate::io::AtomicOutput;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{metadata, read_to_string, remove_file};
use std::io::ErrorKind;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// One output file covered by a marker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// File name (no directory), so a data directory can be moved as a whole.
    pub file: String,
    pub bytes: u64,
    pub lines: u64,
}

/// Proof that a stage finished writing all of its outputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageMarker {
    pub stage: String,
    /// See [`fingerprint`].
    pub fingerprint: String,
    pub outputs: Vec<OutputRecord>,
    /// Milliseconds since the epoch.
    pub timestamp: u64,
    /// SHA-256 over the fields above.
    pub checksum: String,
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{} has no UTF-8 file name", path.display()))
}

impl StageMarker {
    /// Describe finished outputs, given as `(path, line count)`, derived from
    /// the inputs and settings summarized by `fingerprint`.
    ///
    /// # Errors
    /// Returns an error if an output is missing.
    pub fn record(stage: &str, fingerprint: &str, outputs: &[(&Path, u64)]) -> Result<Self> {
        let outputs = outputs
            .iter()
            .map(|(path, lines)| {
                let bytes = metadata(path)
                    .with_context(|| format!("stat {}", path.display()))?
                    .len();
                Ok(OutputRecord {
                    file: file_name(path)?,
                    bytes,
                    lines: *lines,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let mut marker = Self {
            stage: stage.to_string(),
            fingerprint: fingerprint.to_string(),
            outputs,
            timestamp: current_timestamp_ms(),
            checksum: String::new(),
        };
        marker.checksum = marker.compute_checksum();
        Ok(marker)
    }

    fn compute_checksum(&self) -> String {
        let mut payload = format!("{}:{}:{}", self.stage, self.fingerprint, self.timestamp);
        for o in &self.outputs {
            payload.push_str(&format!(";{}:{}:{}", o.file, o.bytes, o.lines));
        }
        compute_checksum(payload.as_bytes())
    }

    /// Line count recorded for `path`, if covered.
    pub fn lines_of(&self, path: &Path) -> Option<u64> {
        let name = file_name(path).ok()?;
        self.outputs.iter().find(|o| o.file == name).map(|o| o.lines)
    }

    /// Atomically write the marker to `path`.
    ///
    /// # Errors
    /// Returns an error if the marker cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = AtomicOutput::create(path)?;
        out.write_json(self)?;
        out.commit()?;
        Ok(())
    }

    /// Read and verify a marker. `Ok(None)` if there is no marker file.
    ///
    /// # Errors
    /// Returns an error if the marker cannot be read, parsed, or fails its checksum.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = path.as_ref();
        let text = match read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
        };
        let marker: Self = serde_json::from_str(text.trim())
            .with_context(|| format!("parse stage marker {}", path.display()))?;
        if marker.compute_checksum() != marker.checksum {
            return Err(anyhow!(
                "stage marker {} failed integrity check: checksum mismatch",
                path.display()
            ));
        }
        Ok(Some(marker))
    }
}

/// Digest of what a stage consumes: the marker of the stage it reads from
/// (`None` for the first stage) and its own `settings`.
#[must_use]
pub fn fingerprint(upstream: Option<&StageMarker>, settings: &str) -> String {
    let upstream = upstream.map_or("-", |m| m.checksum.as_str());
    compute_checksum(format!("{upstream}|{settings}").as_bytes())
}

/// Whether `stage` finished writing exactly `outputs` from the inputs
/// summarized by `fingerprint`, per the marker at `marker_path`.
///
/// A corrupt marker is reported and treated as "not complete".
///
/// # Errors
/// Returns an error only if an output's metadata cannot be read for a reason
/// other than absence.
pub fn is_complete(
    marker_path: impl AsRef<Path>,
    stage: &str,
    fingerprint: &str,
    outputs: &[&Path],
) -> Result<bool> {
    let marker_path = marker_path.as_ref();
    let marker = match StageMarker::load(marker_path) {
        Ok(Some(m)) => m,
        Ok(None) => return Ok(false),
        Err(e) => {
            warn!(stage, error = %format!("{e:#}"), "ignoring unusable stage marker");
            return Ok(false);
        }
    };
    if marker.stage != stage || marker.outputs.len() != outputs.len() {
        debug!(stage, "marker does not describe this stage");
        return Ok(false);
    }
    if marker.fingerprint != fingerprint {
        debug!(stage, "inputs or settings changed since the marker was written");
        return Ok(false);
    }
    for (path, record) in outputs.iter().zip(&marker.outputs) {
        if file_name(path)? != record.file {
            return Ok(false);
        }
        let bytes = match metadata(path) {
            Ok(m) => m.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(stage, file = %path.display(), "output missing");
                return Ok(false);
            }
            Err(e) => return Err(e).with_context(|| format!("stat {}", path.display())),
        };
        if bytes != record.bytes {
            debug!(stage, file = %path.display(), bytes, expected = record.bytes, "output size changed");
            return Ok(false);
        }
    }
    Ok(true)
}

/// Remove the marker at `path`, if any, before a stage reruns.
///
/// # Errors
/// Returns an error if an existing marker cannot be removed.
pub fn clear(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

/// Compute SHA-256 checksum of data.
#[must_use]
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Get current timestamp in milliseconds since epoch.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
