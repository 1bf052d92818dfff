//! Positional train/test/val split.
//!
//! The shuffled corpus is cut by line position: the first `floor(train · n)`
//! lines go to train, the next `floor(test · n)` to test and the rest to val.

use crate::io::AtomicOutput;
use crate::io::jsonl::count_lines;
use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One of the three partitions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Split {
    Train,
    Test,
    Val,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Test, Split::Val];

    pub fn name(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
            Split::Val => "val",
        }
    }

    fn index(self) -> usize {
        match self {
            Split::Train => 0,
            Split::Test => 1,
            Split::Val => 2,
        }
    }
}

/// Fractions of the corpus given to train and test; val takes the rest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.8,
            test: 0.1,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SplitSizes {
    pub train: u64,
    pub test: u64,
    pub val: u64,
}

impl SplitSizes {
    /// Sizes for `total` lines. `train + test + val == total` always holds.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn for_total(total: u64, ratios: SplitRatios) -> Self {
        let portion = |r: f64| ((total as f64 * r).floor() as u64).min(total);
        let train = portion(ratios.train);
        let test = portion(ratios.test).min(total - train);
        Self {
            train,
            test,
            val: total - train - test,
        }
    }

    pub fn total(&self) -> u64 {
        self.train + self.test + self.val
    }

    /// Partition of the 0-based line `i`.
    pub fn assign(&self, i: u64) -> Split {
        if i < self.train {
            Split::Train
        } else if i < self.train + self.test {
            Split::Test
        } else {
            Split::Val
        }
    }

    pub fn get(&self, split: Split) -> u64 {
        match split {
            Split::Train => self.train,
            Split::Test => self.test,
            Split::Val => self.val,
        }
    }
}

/// Destination files of [`split_file`].
#[derive(Clone, Debug)]
pub struct SplitPaths {
    pub train: PathBuf,
    pub test: PathBuf,
    pub val: PathBuf,
}

impl SplitPaths {
    pub fn get(&self, split: Split) -> &Path {
        match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
            Split::Val => &self.val,
        }
    }
}

/// Count the lines of `input`, then copy each line to its partition file.
///
/// All three outputs are published only after every line has been written.
///
/// # Errors
/// Returns an error on I/O failure, or if `input` changed between the two passes.
pub fn split_file(
    input: impl AsRef<Path>,
    outputs: &SplitPaths,
    ratios: SplitRatios,
    progress: &ProgressBar,
) -> Result<SplitSizes> {
    let input = input.as_ref();
    let total = count_lines(input)?;
    let sizes = SplitSizes::for_total(total, ratios);
    progress.set_length(total);

    let mut outs = Split::ALL
        .iter()
        .map(|s| AtomicOutput::create(outputs.get(*s)))
        .collect::<Result<Vec<_>>>()?;

    let rdr = BufReader::new(File::open(input).with_context(|| format!("open {}", input.display()))?);
    let mut seen: u64 = 0;
    for line in rdr.lines() {
        let line = line.with_context(|| format!("read line {} in {}", seen + 1, input.display()))?;
        outs[sizes.assign(seen).index()].write_line(&line)?;
        seen += 1;
        progress.inc(1);
    }
    if seen != total {
        bail!(
            "{} changed while splitting: counted {total} lines, then read {seen}",
            input.display()
        );
    }
    for out in outs {
        out.commit()?;
    }
    progress.finish();
    Ok(sizes)
}
