//! Single-pass, in-memory index construction.

use crate::engine::cosine_idf;
use crate::persist::{save_meta, save_table, FieldMeta, IndexPaths, MetaFile, META_VERSION};
use crate::store::{write_field_store, DEFAULT_BLOCK_SIZE};
use crate::{DocId, Field, IndexError, Posting, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub block_size: u64,
    /// Stored verbatim in `meta.json`; the builder never reads the clock.
    pub created_at: String,
    /// Fields that get a cosine norm table.
    pub cosine_fields: Vec<Field>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self { block_size: DEFAULT_BLOCK_SIZE, created_at: String::new(), cosine_fields: vec![Field::Body] }
    }
}

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub num_docs: u32,
    pub fields: Vec<FieldMeta>,
}

#[derive(Default)]
struct FieldAccumulator {
    postings: BTreeMap<String, BTreeMap<DocId, u32>>,
    lengths: BTreeMap<DocId, u32>,
}

#[derive(Default)]
pub struct IndexBuilder {
    fields: BTreeMap<Field, FieldAccumulator>,
    titles: BTreeMap<DocId, String>,
}

impl IndexBuilder {
    pub fn new() -> Self { Self::default() }

    /// Count `tokens` into `doc_id`'s postings for `field` and add their number
    /// to the document's field length. Repeated calls for the same document
    /// accumulate.
    pub fn add_document<T: AsRef<str>>(&mut self, doc_id: DocId, field: Field, tokens: &[T]) {
        let acc = self.fields.entry(field).or_default();
        for token in tokens {
            let per_doc = acc.postings.entry(token.as_ref().to_string()).or_default();
            let tf = per_doc.entry(doc_id).or_insert(0);
            *tf = tf.saturating_add(1);
        }
        add_length(acc.lengths.entry(doc_id).or_insert(0), tokens.len());
    }

    pub fn set_title(&mut self, doc_id: DocId, title: impl Into<String>) {
        self.titles.insert(doc_id, title.into());
    }

    pub fn has_document(&self, doc_id: DocId) -> bool {
        self.titles.contains_key(&doc_id)
    }

    pub fn num_docs(&self) -> usize {
        self.titles.len()
    }

    /// Write posting stores, side tables and `meta.json` under `paths`.
    pub fn finalize(self, paths: &IndexPaths, options: &BuildOptions) -> Result<BuildSummary> {
        self.validate()?;
        let num_docs = self.titles.len() as u32;
        let mut fields = Vec::with_capacity(Field::ALL.len());
        let mut accs = self.fields;

        for field in Field::ALL {
            let acc = accs.remove(&field).unwrap_or_default();
            let postings: BTreeMap<String, Vec<Posting>> = acc
                .postings
                .into_iter()
                .map(|(term, docs)| (term, docs.into_iter().map(|(d, tf)| Posting::new(d, tf)).collect()))
                .collect();

            let vocab = write_field_store(paths, field, &postings, options.block_size)?;
            save_table(&paths.lengths(field), &acc.lengths)?;

            let has_norms = options.cosine_fields.contains(&field);
            if has_norms {
                let norms = document_norms(&postings, &acc.lengths);
                save_table(&paths.norms(field), &norms)?;
            }
            tracing::info!(%field, terms = vocab.num_terms(), blocks = vocab.num_blocks, docs = acc.lengths.len(), "field written");
            fields.push(FieldMeta { field, num_terms: vocab.num_terms(), num_blocks: vocab.num_blocks, has_norms });
        }

        save_table(&paths.titles(), &self.titles)?;
        let meta = MetaFile {
            num_docs,
            created_at: options.created_at.clone(),
            version: META_VERSION,
            block_size: options.block_size,
            fields: fields.clone(),
        };
        save_meta(paths, &meta)?;
        Ok(BuildSummary { num_docs, fields })
    }

    fn validate(&self) -> Result<()> {
        for (field, acc) in &self.fields {
            if let Some(doc_id) = acc.lengths.keys().find(|d| !self.titles.contains_key(d)) {
                return Err(IndexError::Build(format!("document {doc_id} has {field} text but no title")));
            }
        }
        Ok(())
    }
}

/// Adds `count` tokens to a field length, saturating at `u32::MAX`.
fn add_length(total: &mut u32, count: usize) {
    *total = total.saturating_add(u32::try_from(count).unwrap_or(u32::MAX));
}

/// Euclidean norm of each document's `tf * log10(N / df)` vector, with `N` the
/// number of documents that have a length in the field.
fn document_norms(postings: &BTreeMap<String, Vec<Posting>>, lengths: &BTreeMap<DocId, u32>) -> BTreeMap<DocId, f64> {
    let n = lengths.len() as f64;
    let mut sums: BTreeMap<DocId, f64> = lengths.keys().map(|&d| (d, 0.0)).collect();
    for list in postings.values() {
        let idf = cosine_idf(n, list.len() as f64);
        for p in list {
            let w = f64::from(p.tf) * idf;
            *sums.entry(p.doc_id).or_insert(0.0) += w * w;
        }
    }
    sums.into_iter().map(|(d, s)| (d, s.sqrt())).collect()
}
