//! Multi-field ranking over a loaded [`IndexContext`].
//!
//! Body relevance is BM25 (or TF-IDF cosine), title and anchor relevance is the
//! number of distinct query terms present. Fused search combines them with the
//! weights of the active [`crate::config::Preset`] and an optional authority boost.

use crate::config::{BodyScoring, EngineConfig, FALLBACK_DOC_LEN, MAX_RESULTS};
use crate::context::{FieldIndex, IndexContext};
use crate::tokenizer::tokenize;
use crate::{DocId, Field, Result};
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};
use std::sync::Arc;

pub type ScoreMap = HashMap<DocId, f64>;

/// Title reported for a result whose document has no title entry.
pub const UNKNOWN_TITLE: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub doc_id: DocId,
    pub score: f64,
}

/// Scoring function used for a single field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldStrategy {
    Bm25,
    Cosine,
    Presence,
}

impl FieldStrategy {
    /// Body is ranked by cosine similarity, title and anchor by presence.
    pub fn default_for(field: Field) -> Self {
        match field {
            Field::Body => FieldStrategy::Cosine,
            Field::Title | Field::Anchor => FieldStrategy::Presence,
        }
    }
}

/// BM25 inverse document frequency: `log10((N - df + 0.5) / (df + 0.5) + 1)`.
pub fn bm25_idf(n: f64, df: f64) -> f64 {
    ((n - df + 0.5) / (df + 0.5) + 1.0).log10()
}

/// Classic inverse document frequency used by cosine scoring: `log10(N / df)`.
pub fn cosine_idf(n: f64, df: f64) -> f64 {
    if n <= 0.0 || df <= 0.0 {
        return 0.0;
    }
    (n / df).log10()
}

/// Query term multiplicities in term order, so float sums are reproducible.
fn term_counts(terms: &[String]) -> BTreeMap<&str, u32> {
    let mut counts = BTreeMap::new();
    for t in terms {
        *counts.entry(t.as_str()).or_insert(0) += 1;
    }
    counts
}

pub struct QueryEngine {
    ctx: Arc<IndexContext>,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(ctx: Arc<IndexContext>, config: EngineConfig) -> Self {
        let w = config.preset.weights();
        tracing::info!(
            preset = %config.preset,
            title = w.title,
            body = w.body,
            anchor = w.anchor,
            authority_boost = w.use_authority_boost,
            alpha = w.boost_alpha,
            body_scoring = ?config.body_scoring,
            "query engine ready"
        );
        Self { ctx, config }
    }

    pub fn context(&self) -> &IndexContext { &self.ctx }

    pub fn config(&self) -> &EngineConfig { &self.config }

    /// Collection size used for IDF: documents with a length in the field, or the
    /// whole index when the field recorded none.
    fn collection_size(&self, index: &FieldIndex) -> f64 {
        match index.num_docs() {
            0 => f64::from(self.ctx.num_docs()),
            n => n as f64,
        }
    }

    pub fn score_bm25(&self, terms: &[String], field: Field) -> Result<ScoreMap> {
        let mut scores = ScoreMap::new();
        let Some(index) = self.ctx.field(field) else { return Ok(scores) };
        let n = self.collection_size(index);
        let avgdl = index.avg_len();
        let k1 = self.config.bm25.k1;
        let b = self.config.bm25.b;

        for (term, count) in term_counts(terms) {
            let Some(df) = index.store().document_frequency(term) else { continue };
            let idf = bm25_idf(n, f64::from(df));
            let repeat = f64::from(count);
            for p in index.store().read_posting_list(term)? {
                let dl = index.doc_len(p.doc_id).map(f64::from).unwrap_or(FALLBACK_DOC_LEN);
                let tf = f64::from(p.tf);
                let denom = tf + k1 * (1.0 - b + b * dl / avgdl);
                *scores.entry(p.doc_id).or_insert(0.0) += repeat * idf * tf * (k1 + 1.0) / denom;
            }
        }
        Ok(scores)
    }

    pub fn score_cosine_tfidf(&self, terms: &[String], field: Field) -> Result<ScoreMap> {
        let mut dots = ScoreMap::new();
        let Some(index) = self.ctx.field(field) else { return Ok(dots) };
        let n = self.collection_size(index);

        let mut query_norm_sq = 0.0;
        for (term, count) in term_counts(terms) {
            let Some(df) = index.store().document_frequency(term) else { continue };
            let idf = cosine_idf(n, f64::from(df));
            let w_q = f64::from(count) * idf;
            query_norm_sq += w_q * w_q;
            for p in index.store().read_posting_list(term)? {
                *dots.entry(p.doc_id).or_insert(0.0) += w_q * f64::from(p.tf) * idf;
            }
        }
        if dots.is_empty() || query_norm_sq <= 0.0 {
            return Ok(ScoreMap::new());
        }

        let query_norm = query_norm_sq.sqrt();
        for (doc_id, dot) in dots.iter_mut() {
            *dot /= query_norm * index.norm(*doc_id);
        }
        Ok(dots)
    }

    /// Number of distinct query terms present in each document's field.
    pub fn score_presence(&self, terms: &[String], field: Field) -> Result<HashMap<DocId, u32>> {
        let mut counts = HashMap::new();
        let Some(index) = self.ctx.field(field) else { return Ok(counts) };
        let distinct: BTreeSet<&str> = terms.iter().map(String::as_str).collect();
        for term in distinct {
            for p in index.store().read_posting_list(term)? {
                *counts.entry(p.doc_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    fn score_with(&self, terms: &[String], field: Field, strategy: FieldStrategy) -> Result<ScoreMap> {
        match strategy {
            FieldStrategy::Bm25 => self.score_bm25(terms, field),
            FieldStrategy::Cosine => self.score_cosine_tfidf(terms, field),
            FieldStrategy::Presence => Ok(self
                .score_presence(terms, field)?
                .into_iter()
                .map(|(d, c)| (d, f64::from(c)))
                .collect()),
        }
    }

    /// Scores of one field for one request; a read failure drops the field from
    /// this request instead of failing it.
    fn field_scores(&self, terms: &[String], field: Field, strategy: FieldStrategy) -> ScoreMap {
        match self.score_with(terms, field, strategy) {
            Ok(scores) => scores,
            Err(e) => {
                tracing::error!(%field, error = %e, "dropping field contribution for this query");
                ScoreMap::new()
            }
        }
    }

    /// Fused multi-field search, at most [`MAX_RESULTS`] documents, best first.
    pub fn search(&self, query: &str) -> Vec<ScoredDoc> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let w = self.config.preset.weights();
        let body_strategy = match self.config.body_scoring {
            BodyScoring::Bm25 => FieldStrategy::Bm25,
            BodyScoring::Cosine => FieldStrategy::Cosine,
        };

        let mut fused = ScoreMap::new();
        for (field, weight, strategy) in [
            (Field::Title, w.title, FieldStrategy::Presence),
            (Field::Body, w.body, body_strategy),
            (Field::Anchor, w.anchor, FieldStrategy::Presence),
        ] {
            if weight <= 0.0 {
                continue;
            }
            for (doc_id, score) in self.field_scores(&terms, field, strategy) {
                *fused.entry(doc_id).or_insert(0.0) += weight * score;
            }
        }

        if w.use_authority_boost {
            let signals = self.ctx.signals();
            for (doc_id, score) in fused.iter_mut() {
                *score *= 1.0 + w.boost_alpha * signals.authority_boost(*doc_id);
            }
        }

        let results = top_k(fused, MAX_RESULTS);
        tracing::debug!(query, terms = terms.len(), hits = results.len(), "search");
        results
    }

    /// Single-field search. Body results are capped at [`MAX_RESULTS`]; title and
    /// anchor return every match.
    pub fn search_field(&self, query: &str, field: Field, strategy: FieldStrategy) -> Vec<ScoredDoc> {
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let scores = self.field_scores(&terms, field, strategy);
        match field {
            Field::Body => top_k(scores, MAX_RESULTS),
            Field::Title | Field::Anchor => rank_all(scores),
        }
    }

    /// `(doc_id, title)` pairs in result order.
    pub fn resolve_titles(&self, hits: &[ScoredDoc]) -> Vec<(String, String)> {
        hits.iter()
            .map(|h| (h.doc_id.to_string(), self.ctx.title(h.doc_id).unwrap_or(UNKNOWN_TITLE).to_string()))
            .collect()
    }

    pub fn get_authority(&self, doc_ids: &[DocId]) -> Vec<f64> {
        let signals = self.ctx.signals();
        doc_ids.iter().map(|&d| signals.authority(d)).collect()
    }

    pub fn get_popularity(&self, doc_ids: &[DocId]) -> Vec<u64> {
        let signals = self.ctx.signals();
        doc_ids.iter().map(|&d| signals.popularity(d)).collect()
    }
}

type RankKey = (OrderedFloat<f64>, Reverse<DocId>);

fn rank_key(doc_id: DocId, score: f64) -> RankKey {
    (OrderedFloat(score), Reverse(doc_id))
}

fn into_sorted(mut keys: Vec<RankKey>) -> Vec<ScoredDoc> {
    // Descending key: higher score first, then lower doc id.
    keys.sort_unstable_by(|a, b| b.cmp(a));
    keys.into_iter().map(|(s, Reverse(doc_id))| ScoredDoc { doc_id, score: s.0 }).collect()
}

/// The `k` best documents via a bounded min-heap, ties broken by ascending doc id.
pub fn top_k(scores: ScoreMap, k: usize) -> Vec<ScoredDoc> {
    if k == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Reverse<RankKey>> = BinaryHeap::with_capacity(k + 1);
    for (doc_id, score) in scores {
        let key = rank_key(doc_id, score);
        if heap.len() < k {
            heap.push(Reverse(key));
        } else if heap.peek().is_some_and(|Reverse(worst)| key > *worst) {
            heap.pop();
            heap.push(Reverse(key));
        }
    }
    into_sorted(heap.into_iter().map(|Reverse(key)| key).collect())
}

/// Every scored document, best first.
pub fn rank_all(scores: ScoreMap) -> Vec<ScoredDoc> {
    into_sorted(scores.into_iter().map(|(d, s)| rank_key(d, s)).collect())
}
