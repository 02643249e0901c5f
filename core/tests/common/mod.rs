#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use wikirank_core::builder::{BuildOptions, IndexBuilder};
use wikirank_core::config::{BodyScoring, EngineConfig, Preset, StoreMode};
use wikirank_core::context::IndexContext;
use wikirank_core::engine::QueryEngine;
use wikirank_core::persist::IndexPaths;
use wikirank_core::signals::save_signals;
use wikirank_core::tokenizer::tokenize;
use wikirank_core::{DocId, Field};

pub const BODIES: [(DocId, &str); 4] = [
    (1, "python is a programming language excellent for data science"),
    (2, "machine learning using python is great"),
    (3, "search engine optimization is crucial for websites"),
    (4, "data science involves statistics and python"),
];

pub const TITLES: [(DocId, &str); 4] = [
    (1, "Python (programming language)"),
    (2, "Machine Learning"),
    (3, "SEO Optimization"),
    (4, "Data Science"),
];

pub const ANCHORS: [(DocId, &str); 4] = [
    (1, "link to python"),
    (2, "ml course"),
    (3, "google search results"),
    (4, "data analysis"),
];

pub fn options() -> BuildOptions {
    BuildOptions { created_at: "2024-01-01T00:00:00Z".into(), ..BuildOptions::default() }
}

pub fn sample_builder() -> IndexBuilder {
    let mut b = IndexBuilder::new();
    for (id, title) in TITLES {
        b.set_title(id, title);
        b.add_document(id, Field::Title, &tokenize(title));
    }
    for (id, body) in BODIES {
        b.add_document(id, Field::Body, &tokenize(body));
    }
    for (id, anchor) in ANCHORS {
        b.add_document(id, Field::Anchor, &tokenize(anchor));
    }
    b
}

/// Builds the four-document sample index, with authority and popularity tables.
pub fn build_sample(dir: &Path) -> IndexPaths {
    let paths = IndexPaths::new(dir);
    sample_builder().finalize(&paths, &options()).unwrap();
    let authority: BTreeMap<DocId, f64> = [(1, 0.5), (2, 0.8), (3, 0.1), (4, 0.9)].into_iter().collect();
    let popularity: BTreeMap<DocId, u64> = [(1, 1000), (2, 5000), (3, 100), (4, 2000)].into_iter().collect();
    save_signals(&paths, &authority, &popularity).unwrap();
    paths
}

pub fn engine_with(paths: &IndexPaths, preset: Preset, body_scoring: BodyScoring, mode: StoreMode) -> QueryEngine {
    let ctx = IndexContext::open(paths, mode).unwrap();
    let config = EngineConfig { preset, body_scoring, ..EngineConfig::default() };
    QueryEngine::new(Arc::new(ctx), config)
}

pub fn engine(paths: &IndexPaths) -> QueryEngine {
    engine_with(paths, Preset::default(), BodyScoring::Bm25, StoreMode::Disk)
}

pub fn ids(hits: &[wikirank_core::engine::ScoredDoc]) -> Vec<DocId> {
    hits.iter().map(|h| h.doc_id).collect()
}
