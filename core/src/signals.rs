//! Precomputed per-document signals: link authority and page popularity.
//!
//! Both tables are produced offline. They are read through an [`Arc`] snapshot
//! so a refresh never mutates a table an in-flight request is reading.

use crate::persist::{load_table, save_table, IndexPaths};
use crate::{DocId, IndexError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub struct Signals {
    pub authority: HashMap<DocId, f64>,
    pub popularity: HashMap<DocId, u64>,
}

impl Signals {
    /// Load both tables. A missing file is an empty table; an unreadable one is
    /// reported in the returned errors and also treated as empty.
    pub fn load(paths: &IndexPaths) -> (Self, Vec<IndexError>) {
        Self::load_over(paths, &Signals::default())
    }

    /// Load both tables on top of `previous`: a table that is unreadable keeps
    /// its value from `previous` instead of becoming empty.
    pub fn load_over(paths: &IndexPaths, previous: &Signals) -> (Self, Vec<IndexError>) {
        let mut errors = Vec::new();
        let authority = load_optional(&paths.authority(), "authority table", &mut errors)
            .unwrap_or_else(|| previous.authority.clone());
        let popularity = load_optional(&paths.popularity(), "popularity table", &mut errors)
            .unwrap_or_else(|| previous.popularity.clone());
        (Self { authority, popularity }, errors)
    }

    pub fn authority(&self, doc_id: DocId) -> f64 {
        self.authority.get(&doc_id).copied().unwrap_or(0.0)
    }

    pub fn popularity(&self, doc_id: DocId) -> u64 {
        self.popularity.get(&doc_id).copied().unwrap_or(0)
    }

    /// `1 + log10(authority + 1)`, with negative authorities clamped to zero.
    pub fn authority_boost(&self, doc_id: DocId) -> f64 {
        1.0 + (self.authority(doc_id).max(0.0) + 1.0).log10()
    }
}

/// `None` when the file exists but cannot be decoded; a missing file is an empty table.
fn load_optional<V>(path: &Path, component: &str, errors: &mut Vec<IndexError>) -> Option<HashMap<DocId, V>>
where
    V: serde::de::DeserializeOwned,
{
    if !path.exists() {
        tracing::info!(component, path = %path.display(), "signal table absent, using neutral values");
        return Some(HashMap::new());
    }
    match load_table(path) {
        Ok(table) => Some(table),
        Err(e) => {
            tracing::error!(component, error = %e, "failed to load signal table");
            errors.push(IndexError::configuration(component, e));
            None
        }
    }
}

pub fn save_signals(
    paths: &IndexPaths,
    authority: &BTreeMap<DocId, f64>,
    popularity: &BTreeMap<DocId, u64>,
) -> Result<()> {
    save_table(&paths.authority(), authority)?;
    save_table(&paths.popularity(), popularity)?;
    Ok(())
}

/// Atomically swappable holder of the current [`Signals`].
pub struct SignalTables {
    current: RwLock<Arc<Signals>>,
}

impl SignalTables {
    pub fn new(signals: Signals) -> Self {
        Self { current: RwLock::new(Arc::new(signals)) }
    }

    pub fn snapshot(&self) -> Arc<Signals> {
        self.current.read().clone()
    }

    pub fn replace(&self, signals: Signals) {
        *self.current.write() = Arc::new(signals);
    }
}
