//! Ordered parallel normalization.
//!
//! Articles are pulled from the input in chunks of `chunk_size`, each chunk is
//! normalized on a dedicated `rayon` pool, and results come back in input
//! order (indexed parallel collect keeps positions). A chunk is fully
//! normalized before its first record is yielded.

use crate::record::{Article, PreprocessedArticle};
use crate::text::Normalize;
use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::VecDeque;

pub struct ParallelPreprocessor<N> {
    normalizer: N,
    pool: ThreadPool,
    chunk_size: usize,
}

impl<N: Normalize> ParallelPreprocessor<N> {
    /// Build a pool of `workers` threads (at least one).
    ///
    /// # Errors
    /// Returns an error if the thread pool cannot be created.
    pub fn new(normalizer: N, workers: usize, chunk_size: usize) -> Result<Self> {
        let workers = workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("fnr-normalize-{i}"))
            .build()
            .with_context(|| format!("build normalization pool of {workers} threads"))?;
        Ok(Self {
            normalizer,
            pool,
            chunk_size: chunk_size.max(1),
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Normalize one chunk, preserving order.
    ///
    /// # Errors
    /// Returns an error if a worker panics.
    pub fn process_chunk(&self, chunk: Vec<Article>) -> Result<Vec<PreprocessedArticle>> {
        let normalizer = &self.normalizer;
        self.pool.install(|| {
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                chunk
                    .into_par_iter()
                    .map(|a| PreprocessedArticle {
                        id: a.id,
                        content: normalizer.normalize(&a.text),
                        label: a.label,
                    })
                    .collect::<Vec<_>>()
            }))
            .map_err(|_| anyhow!("normalization worker panicked"))
        })
    }

    /// Lazily normalize `input`. The first input error ends the stream.
    pub fn process<I>(&self, input: I) -> Preprocessed<'_, N, I>
    where
        I: Iterator<Item = Result<Article>>,
    {
        Preprocessed {
            pre: self,
            input,
            ready: VecDeque::new(),
            done: false,
        }
    }
}

/// Iterator returned by [`ParallelPreprocessor::process`].
pub struct Preprocessed<'a, N, I> {
    pre: &'a ParallelPreprocessor<N>,
    input: I,
    ready: VecDeque<PreprocessedArticle>,
    done: bool,
}

impl<N, I> Preprocessed<'_, N, I>
where
    N: Normalize,
    I: Iterator<Item = Result<Article>>,
{
    fn refill(&mut self) -> Result<()> {
        let mut chunk = Vec::with_capacity(self.pre.chunk_size);
        while chunk.len() < self.pre.chunk_size {
            match self.input.next() {
                Some(article) => chunk.push(article?),
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if !chunk.is_empty() {
            self.ready.extend(self.pre.process_chunk(chunk)?);
        }
        Ok(())
    }
}

impl<N, I> Iterator for Preprocessed<'_, N, I>
where
    N: Normalize,
    I: Iterator<Item = Result<Article>>,
{
    type Item = Result<PreprocessedArticle>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.ready.is_empty() {
            if self.done {
                return None;
            }
            if let Err(e) = self.refill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.ready.pop_front().map(Ok)
    }
}
