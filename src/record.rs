//! Records flowing between stages.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Source categories the corpus keeps. Every other `type` value is dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    Fake,
    Conspiracy,
    Unreliable,
    Reliable,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Fake,
        Category::Conspiracy,
        Category::Unreliable,
        Category::Reliable,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Fake => "fake",
            Category::Conspiracy => "conspiracy",
            Category::Unreliable => "unreliable",
            Category::Reliable => "reliable",
        }
    }

    /// Binary training label: 1 for reliable sources, 0 otherwise.
    pub fn label(self) -> u8 {
        u8::from(self == Category::Reliable)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ();

    /// Exact, case-sensitive match on the corpus labels.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or(())
    }
}

/// A kept corpus row: title and content joined by one space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Article {
    pub id: i64,
    pub text: String,
    pub label: u8,
}

/// One line of the preprocessed corpus and of every split file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessedArticle {
    pub id: i64,
    pub content: Vec<String>,
    pub label: u8,
}

/// One line of an embedded output file.
///
/// `embedding[i]` is a `max_words × vector_dim` matrix and `label[i]` its label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedBatch {
    pub embedding: Vec<Vec<Vec<f32>>>,
    pub label: Vec<u8>,
}

impl EmbeddedBatch {
    pub fn len(&self) -> usize {
        self.label.len()
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_empty()
    }
}
