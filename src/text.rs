//! Article text normalization.
//!
//! [`TextNormalizer`] turns raw article text into stemmed tokens with this
//! filter chain, applied in order:
//!
//! 1. lowercase
//! 2. strip HTML tags
//! 3. replace runs of ASCII punctuation with a space
//! 4. collapse whitespace runs
//! 5. strip digits
//! 6. drop English stopwords
//! 7. drop tokens shorter than [`MIN_TOKEN_CHARS`] characters
//! 8. stem each token (Snowball English)

pub mod stopwords;

use anyhow::{Context, Result};
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;

/// Shortest token kept, in characters.
pub const MIN_TOKEN_CHARS: usize = 3;

/// Deterministic text to token mapping, shared by the worker pool.
pub trait Normalize: Send + Sync {
    fn normalize(&self, text: &str) -> Vec<String>;
}

/// Default normalizer.
pub struct TextNormalizer {
    tags: Regex,
    punctuation: Regex,
    whitespace: Regex,
    digits: Regex,
    stopwords: HashSet<&'static str>,
    stemmer: Stemmer,
}

impl TextNormalizer {
    /// # Errors
    /// Returns an error if a filter pattern fails to compile.
    pub fn new() -> Result<Self> {
        Ok(Self {
            tags: Regex::new(r"<([^>]+)>").context("compile tag pattern")?,
            punctuation: Regex::new(r##"[!"#$%&'()*+,\-./:;<=>?@\[\\\]^_`{|}~]+"##)
                .context("compile punctuation pattern")?,
            whitespace: Regex::new(r"\s+").context("compile whitespace pattern")?,
            digits: Regex::new(r"[0-9]+").context("compile digit pattern")?,
            stopwords: stopwords::ENGLISH.iter().copied().collect(),
            stemmer: Stemmer::create(Algorithm::English),
        })
    }

    /// Steps 1-5: character-level cleanup, before tokenization.
    fn clean(&self, text: &str) -> String {
        let text = text.to_lowercase();
        let text = self.tags.replace_all(&text, "");
        let text = self.punctuation.replace_all(&text, " ");
        let text = self.whitespace.replace_all(&text, " ");
        self.digits.replace_all(&text, "").into_owned()
    }
}

impl Normalize for TextNormalizer {
    fn normalize(&self, text: &str) -> Vec<String> {
        self.clean(text)
            .split_whitespace()
            .filter(|w| !self.stopwords.contains(w))
            .filter(|w| w.chars().count() >= MIN_TOKEN_CHARS)
            .map(|w| self.stemmer.stem(w).into_owned())
            .collect()
    }
}

impl<N: Normalize + ?Sized> Normalize for &N {
    fn normalize(&self, text: &str) -> Vec<String> {
        (**self).normalize(text)
    }
}
