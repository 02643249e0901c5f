//! The loaded, read-only index snapshot a [`crate::engine::QueryEngine`] runs against.

use crate::config::{StoreMode, DEFAULT_DOC_NORM, FALLBACK_DOC_LEN};
use crate::persist::{load_meta, load_table, load_titles, IndexPaths, MetaFile};
use crate::signals::{SignalTables, Signals};
use crate::store::{open_store, PostingReader};
use crate::{DocId, Field, IndexError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Store and side tables of one field.
pub struct FieldIndex {
    field: Field,
    store: Box<dyn PostingReader>,
    lengths: HashMap<DocId, u32>,
    norms: HashMap<DocId, f64>,
    avg_len: f64,
}

impl FieldIndex {
    pub fn open(paths: &IndexPaths, field: Field, mode: StoreMode, has_norms: bool) -> Result<Self> {
        let store = open_store(paths, field, mode)?;
        let lengths = load_table(&paths.lengths(field))?;
        let norms = if has_norms { load_table(&paths.norms(field))? } else { HashMap::new() };
        Ok(Self::from_parts(store, lengths, norms))
    }

    pub fn from_parts(store: Box<dyn PostingReader>, lengths: HashMap<DocId, u32>, norms: HashMap<DocId, f64>) -> Self {
        let avg_len = if lengths.is_empty() {
            FALLBACK_DOC_LEN
        } else {
            lengths.values().map(|&l| f64::from(l)).sum::<f64>() / lengths.len() as f64
        };
        Self { field: store.field(), store, lengths, norms, avg_len }
    }

    pub fn field(&self) -> Field { self.field }

    pub fn store(&self) -> &dyn PostingReader { self.store.as_ref() }

    /// Documents with a recorded length in this field.
    pub fn num_docs(&self) -> usize { self.lengths.len() }

    pub fn doc_len(&self, doc_id: DocId) -> Option<u32> { self.lengths.get(&doc_id).copied() }

    /// Mean document length, or [`FALLBACK_DOC_LEN`] for an empty length table.
    pub fn avg_len(&self) -> f64 { self.avg_len }

    /// Stored cosine norm; missing or zero norms fall back to [`DEFAULT_DOC_NORM`].
    pub fn norm(&self, doc_id: DocId) -> f64 {
        match self.norms.get(&doc_id) {
            Some(&n) if n > 0.0 => n,
            _ => DEFAULT_DOC_NORM,
        }
    }
}

/// A component that failed to load; the engine runs without it.
#[derive(Debug, Clone, Serialize)]
pub struct Degraded {
    pub component: String,
    pub reason: String,
}

pub struct IndexContext {
    paths: IndexPaths,
    meta: MetaFile,
    fields: HashMap<Field, FieldIndex>,
    titles: HashMap<DocId, String>,
    signals: SignalTables,
    degraded: Vec<Degraded>,
}

impl IndexContext {
    /// Load an index directory. Only a missing or unreadable `meta.json` is fatal;
    /// every other failure is logged and recorded in [`IndexContext::degraded`].
    pub fn open(paths: &IndexPaths, mode: StoreMode) -> Result<Self> {
        let meta = load_meta(paths).map_err(|e| match e {
            e @ IndexError::Configuration { .. } => e,
            other => IndexError::configuration("meta.json", other),
        })?;
        let mut degraded = Vec::new();

        let mut fields = HashMap::new();
        for field in Field::ALL {
            let has_norms = meta.field(field).map(|f| f.has_norms).unwrap_or(false);
            match FieldIndex::open(paths, field, mode, has_norms) {
                Ok(index) => {
                    tracing::info!(%field, terms = index.store().num_terms(), docs = index.num_docs(), "field loaded");
                    fields.insert(field, index);
                }
                Err(e) => {
                    tracing::error!(%field, error = %e, "field failed to load, it will contribute no scores");
                    degraded.push(Degraded { component: format!("{field} field"), reason: e.to_string() });
                }
            }
        }

        let titles = match load_titles(paths) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "titles failed to load");
                degraded.push(Degraded { component: "titles".into(), reason: e.to_string() });
                HashMap::new()
            }
        };

        let (signals, errors) = Signals::load(paths);
        for e in errors {
            degraded.push(Degraded { component: "signals".into(), reason: e.to_string() });
        }

        Ok(Self { paths: paths.clone(), meta, fields, titles, signals: SignalTables::new(signals), degraded })
    }

    pub fn meta(&self) -> &MetaFile { &self.meta }

    pub fn num_docs(&self) -> u32 { self.meta.num_docs }

    /// `None` when the field failed to load.
    pub fn field(&self, field: Field) -> Option<&FieldIndex> { self.fields.get(&field) }

    pub fn title(&self, doc_id: DocId) -> Option<&str> { self.titles.get(&doc_id).map(String::as_str) }

    pub fn signals(&self) -> Arc<Signals> { self.signals.snapshot() }

    pub fn degraded(&self) -> &[Degraded] { &self.degraded }

    /// Re-read the signal tables from disk and publish them with one swap.
    /// A table that fails to load keeps its current contents; the problems
    /// found are returned.
    pub fn reload_signals(&self) -> Vec<IndexError> {
        let previous = self.signals.snapshot();
        let (signals, errors) = Signals::load_over(&self.paths, &previous);
        tracing::info!(
            authority = signals.authority.len(),
            popularity = signals.popularity.len(),
            errors = errors.len(),
            "signal tables reloaded"
        );
        self.signals.replace(signals);
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{write_field_store, DEFAULT_BLOCK_SIZE};
    use crate::Posting;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    fn tiny_store(paths: &IndexPaths) -> Box<dyn PostingReader> {
        let postings: BTreeMap<String, Vec<Posting>> =
            [("x".to_string(), vec![Posting::new(1, 1), Posting::new(2, 3)])].into_iter().collect();
        write_field_store(paths, Field::Body, &postings, DEFAULT_BLOCK_SIZE).unwrap();
        open_store(paths, Field::Body, StoreMode::Memory).unwrap()
    }

    #[test]
    fn missing_lengths_and_norms_fall_back() {
        let dir = tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());

        let lengths: HashMap<DocId, u32> = [(1, 4)].into_iter().collect();
        let norms: HashMap<DocId, f64> = [(1, 0.0)].into_iter().collect();
        let index = FieldIndex::from_parts(tiny_store(&paths), lengths, norms);
        assert_eq!(index.doc_len(2), None);
        assert_eq!(index.avg_len(), 4.0);
        assert_eq!(index.norm(1), DEFAULT_DOC_NORM);
        assert_eq!(index.norm(2), DEFAULT_DOC_NORM);

        let empty = FieldIndex::from_parts(tiny_store(&paths), HashMap::new(), HashMap::new());
        assert_eq!(empty.num_docs(), 0);
        assert_eq!(empty.avg_len(), FALLBACK_DOC_LEN);
    }
}
