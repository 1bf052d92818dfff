//! Token to word-vector embedding.
//!
//! Each preprocessed article becomes a `max_words × vector_dim` matrix: row `i`
//! holds the vector of token `i` when the model knows it, zeros otherwise, and
//! rows past the token count stay zero.
//!
//! [`EmbeddingSource::batches`] walks a split file once, yielding
//! `ceil(records / batch_size)` [`EmbeddedBatch`]es; the last one holds only
//! the remaining records. Calling it again starts over from the first line.

use crate::io::jsonl::JsonlReader;
use crate::record::{EmbeddedBatch, PreprocessedArticle};
use anyhow::{Context, Result, bail};
use finalfusion::compat::fasttext::ReadFastText;
use finalfusion::compat::text::ReadTextDims;
use finalfusion::embeddings::Embeddings;
use finalfusion::storage::NdArray;
use finalfusion::vocab::{FastTextSubwordVocab, SimpleVocab};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Read-only word-vector lookup.
pub trait WordVectors: Send + Sync {
    /// Length of every vector.
    fn dims(&self) -> usize;

    /// Copy the vector of `word` into `out`. Normally `out.len() == dims()`;
    /// otherwise only the shorter of the two lengths is copied.
    /// Returns `false`, leaving `out` untouched, when the word is unknown.
    fn lookup(&self, word: &str, out: &mut [f32]) -> bool;
}

impl<V: WordVectors + ?Sized> WordVectors for &V {
    fn dims(&self) -> usize {
        (**self).dims()
    }

    fn lookup(&self, word: &str, out: &mut [f32]) -> bool {
        (**self).lookup(word, out)
    }
}

enum Backend {
    FastText(Embeddings<FastTextSubwordVocab, NdArray>),
    Text(Embeddings<SimpleVocab, NdArray>),
}

/// Pretrained model read from disk.
///
/// `.bin` files are read as fastText binaries (unknown words get a vector from
/// their character n-grams); `.vec` and `.txt` as text with a `<count> <dims>`
/// header line.
pub struct WordVectorModel {
    backend: Backend,
}

impl WordVectorModel {
    /// # Errors
    /// Returns an error if the file cannot be opened, has an unknown extension,
    /// or fails to parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut rdr = BufReader::new(f);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let backend = match ext.as_deref() {
            Some("bin") => Backend::FastText(
                Embeddings::read_fasttext(&mut rdr)
                    .with_context(|| format!("read fastText model {}", path.display()))?,
            ),
            Some("vec" | "txt") => Backend::Text(
                Embeddings::read_text_dims(&mut rdr)
                    .with_context(|| format!("read text vectors {}", path.display()))?,
            ),
            _ => bail!(
                "{}: unknown vector model format (expected .bin, .vec or .txt)",
                path.display()
            ),
        };
        Ok(Self { backend })
    }
}

impl WordVectors for WordVectorModel {
    fn dims(&self) -> usize {
        match &self.backend {
            Backend::FastText(e) => e.dims(),
            Backend::Text(e) => e.dims(),
        }
    }

    fn lookup(&self, word: &str, out: &mut [f32]) -> bool {
        let found = match &self.backend {
            Backend::FastText(e) => e.embedding(word),
            Backend::Text(e) => e.embedding(word),
        };
        let Some(vector) = found else {
            return false;
        };
        for (o, v) in out.iter_mut().zip(vector.iter()) {
            *o = *v;
        }
        true
    }
}

/// In-memory vectors, all of one length.
#[derive(Clone, Debug, Default)]
pub struct VectorTable {
    dims: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl VectorTable {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            vectors: HashMap::new(),
        }
    }

    /// # Errors
    /// Returns an error if `vector` does not have `dims` entries.
    pub fn insert(&mut self, word: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        let word = word.into();
        if vector.len() != self.dims {
            bail!(
                "vector for {word:?} has {} entries, table expects {}",
                vector.len(),
                self.dims
            );
        }
        self.vectors.insert(word, vector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

/// Every vector has length `N`, so a table collected from arrays is always consistent.
impl<W: Into<String>, const N: usize> FromIterator<(W, [f32; N])> for VectorTable {
    fn from_iter<I: IntoIterator<Item = (W, [f32; N])>>(iter: I) -> Self {
        Self {
            dims: N,
            vectors: iter
                .into_iter()
                .map(|(word, v)| (word.into(), v.to_vec()))
                .collect(),
        }
    }
}

impl WordVectors for VectorTable {
    fn dims(&self) -> usize {
        self.dims
    }

    fn lookup(&self, word: &str, out: &mut [f32]) -> bool {
        let Some(vector) = self.vectors.get(word) else {
            return false;
        };
        for (o, v) in out.iter_mut().zip(vector) {
            *o = *v;
        }
        true
    }
}

/// Matrix shape of one embedded record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EmbeddingShape {
    pub max_words: usize,
    pub vector_dim: usize,
}

/// Embed the first `shape.max_words` tokens; every other row is zero.
pub fn embed_tokens<V: WordVectors + ?Sized>(
    tokens: &[String],
    vectors: &V,
    shape: EmbeddingShape,
) -> Vec<Vec<f32>> {
    let mut rows = vec![vec![0.0_f32; shape.vector_dim]; shape.max_words];
    for (row, token) in rows.iter_mut().zip(tokens) {
        vectors.lookup(token, row);
    }
    rows
}

/// A split file paired with the model that embeds it.
pub struct EmbeddingSource<'v, V: ?Sized> {
    path: PathBuf,
    vectors: &'v V,
    shape: EmbeddingShape,
    batch_size: usize,
}

impl<'v, V: WordVectors + ?Sized> EmbeddingSource<'v, V> {
    /// # Errors
    /// Returns an error if the model's vector length differs from `shape.vector_dim`.
    pub fn new(
        path: impl AsRef<Path>,
        vectors: &'v V,
        shape: EmbeddingShape,
        batch_size: usize,
    ) -> Result<Self> {
        if vectors.dims() != shape.vector_dim {
            bail!(
                "vector model has {} dimensions, expected {}",
                vectors.dims(),
                shape.vector_dim
            );
        }
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            vectors,
            shape,
            batch_size: batch_size.max(1),
        })
    }

    /// A fresh pass over the file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened.
    pub fn batches(&self) -> Result<EmbeddedBatches<'_, 'v, V>> {
        Ok(EmbeddedBatches {
            source: self,
            records: JsonlReader::open(&self.path)?,
            done: false,
        })
    }
}

/// Finite batch iterator from [`EmbeddingSource::batches`].
pub struct EmbeddedBatches<'s, 'v, V: ?Sized> {
    source: &'s EmbeddingSource<'v, V>,
    records: JsonlReader<PreprocessedArticle>,
    done: bool,
}

impl<V: WordVectors + ?Sized> Iterator for EmbeddedBatches<'_, '_, V> {
    type Item = Result<EmbeddedBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let src = self.source;
        let mut batch = EmbeddedBatch {
            embedding: Vec::with_capacity(src.batch_size),
            label: Vec::with_capacity(src.batch_size),
        };
        while batch.len() < src.batch_size {
            match self.records.next() {
                Some(Ok(article)) => {
                    batch
                        .embedding
                        .push(embed_tokens(&article.content, src.vectors, src.shape));
                    batch.label.push(article.label);
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        if batch.is_empty() { None } else { Some(Ok(batch)) }
    }
}
