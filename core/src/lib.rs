pub mod builder;
pub mod codec;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod persist;
pub mod signals;
pub mod store;
pub mod tokenizer;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use error::{IndexError, Result};

pub type DocId = u32;

/// One of the independently indexed text sources of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Body,
    Title,
    Anchor,
}

impl Field {
    pub const ALL: [Field; 3] = [Field::Body, Field::Title, Field::Anchor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Body => "body",
            Field::Title => "title",
            Field::Anchor => "anchor",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "body" => Ok(Field::Body),
            "title" => Ok(Field::Title),
            "anchor" => Ok(Field::Anchor),
            other => Err(IndexError::configuration("field", format!("unknown field {other:?}"))),
        }
    }
}

/// A `(doc_id, tf)` entry of a posting list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc_id: DocId,
    pub tf: u32,
}

impl Posting {
    pub fn new(doc_id: DocId, tf: u32) -> Self {
        Self { doc_id, tf }
    }
}
