//! In-process whole-line shuffle.

use crate::io::AtomicOutput;
use crate::io::jsonl::read_lines;
use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::path::Path;
use tracing::debug;

/// Permute `lines` uniformly with a generator seeded from `seed`.
pub fn shuffle_in_place<T>(lines: &mut [T], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    lines.shuffle(&mut rng);
}

/// Write the lines of `input` to `output` in seeded random order.
///
/// The whole file is held in memory. The output is published atomically.
///
/// # Returns
/// The number of lines written.
///
/// # Errors
/// Returns an error if `input` cannot be read or `output` cannot be written.
pub fn shuffle_lines(input: impl AsRef<Path>, output: impl AsRef<Path>, seed: u64) -> Result<u64> {
    let mut lines = read_lines(input.as_ref())?;
    debug!(lines = lines.len(), seed, "shuffling");
    shuffle_in_place(&mut lines, seed);

    let mut out = AtomicOutput::create(output)?;
    for line in &lines {
        out.write_line(line)?;
    }
    out.commit()
}
