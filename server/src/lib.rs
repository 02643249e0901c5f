use anyhow::{bail, Result};
use axum::{extract::{Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use wikirank_core::config::{EngineConfig, StoreMode};
use wikirank_core::context::{Degraded, IndexContext};
use wikirank_core::engine::{FieldStrategy, QueryEngine, ScoredDoc};
use wikirank_core::persist::IndexPaths;
use wikirank_core::{DocId, Field};

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, String)>;

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
}

/// A document id as sent by clients: a JSON number or a numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DocRef {
    Number(serde_json::Number),
    Text(String),
}

impl DocRef {
    fn doc_id(&self) -> Option<DocId> {
        match self {
            DocRef::Number(n) => n.as_u64().and_then(|n| DocId::try_from(n).ok()),
            DocRef::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Serialize)]
pub struct FieldStatus {
    pub field: Field,
    pub available: bool,
    pub terms: usize,
    pub docs: usize,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub num_docs: u32,
    pub created_at: String,
    pub preset: String,
    pub fields: Vec<FieldStatus>,
    pub degraded: Vec<Degraded>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<QueryEngine>,
    pub admin_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ServeOptions {
    pub engine: EngineConfig,
    pub store_mode: StoreMode,
    /// Refuse to start when any index component failed to load.
    pub strict: bool,
    pub admin_token: Option<String>,
}

pub fn build_app(index_dir: &str, options: &ServeOptions) -> Result<Router> {
    // Load the index snapshot once at startup
    let ctx = IndexContext::open(&IndexPaths::new(index_dir), options.store_mode)?;
    for d in ctx.degraded() {
        tracing::warn!(component = %d.component, reason = %d.reason, "serving degraded");
    }
    if options.strict && !ctx.degraded().is_empty() {
        bail!("{} index component(s) failed to load and --strict is set", ctx.degraded().len());
    }
    let engine = QueryEngine::new(Arc::new(ctx), options.engine);
    Ok(router(AppState { engine: Arc::new(engine), admin_token: options.admin_token.clone() }))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/status", get(status_handler))
        .route("/search", get(search_handler))
        .route("/search_body", get(search_body_handler))
        .route("/search_title", get(search_title_handler))
        .route("/search_anchor", get(search_anchor_handler))
        .route("/get_pagerank", post(pagerank_handler))
        .route("/get_pageview", post(pageview_handler))
        .route("/admin/signals/reload", post(reload_signals_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Runs a query off the async workers, since posting reads block on file I/O.
async fn run_query<F>(state: &AppState, query: F) -> ApiResult<Vec<(String, String)>>
where
    F: FnOnce(&QueryEngine) -> Vec<ScoredDoc> + Send + 'static,
{
    let engine = state.engine.clone();
    let start = std::time::Instant::now();
    let results = tokio::task::spawn_blocking(move || {
        let hits = query(&engine);
        engine.resolve_titles(&hits)
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("query task failed: {e}")))?;
    tracing::debug!(hits = results.len(), took_s = start.elapsed().as_secs_f64(), "query served");
    Ok(Json(results))
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<Vec<(String, String)>> {
    run_query(&state, move |engine| engine.search(&params.query)).await
}

pub async fn search_body_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<Vec<(String, String)>> {
    run_query(&state, move |engine| engine.search_field(&params.query, Field::Body, FieldStrategy::Cosine)).await
}

pub async fn search_title_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<Vec<(String, String)>> {
    run_query(&state, move |engine| engine.search_field(&params.query, Field::Title, FieldStrategy::Presence)).await
}

pub async fn search_anchor_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> ApiResult<Vec<(String, String)>> {
    run_query(&state, move |engine| engine.search_field(&params.query, Field::Anchor, FieldStrategy::Presence)).await
}

/// Positional lookup where ids that do not parse get `T::default()`.
fn lookup_positional<T, F>(refs: &[DocRef], lookup: F) -> Vec<T>
where
    T: Default,
    F: FnOnce(&[DocId]) -> Vec<T>,
{
    let ids: Vec<Option<DocId>> = refs.iter().map(DocRef::doc_id).collect();
    let known: Vec<DocId> = ids.iter().flatten().copied().collect();
    let mut values = lookup(&known).into_iter();
    ids.iter()
        .map(|id| match id {
            Some(_) => values.next().unwrap_or_default(),
            None => T::default(),
        })
        .collect()
}

pub async fn pagerank_handler(State(state): State<AppState>, Json(refs): Json<Vec<DocRef>>) -> Json<Vec<f64>> {
    Json(lookup_positional(&refs, |ids| state.engine.get_authority(ids)))
}

pub async fn pageview_handler(State(state): State<AppState>, Json(refs): Json<Vec<DocRef>>) -> Json<Vec<u64>> {
    Json(lookup_positional(&refs, |ids| state.engine.get_popularity(ids)))
}

pub async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let ctx = state.engine.context();
    let fields = Field::ALL
        .into_iter()
        .map(|field| match ctx.field(field) {
            Some(index) => FieldStatus { field, available: true, terms: index.store().num_terms(), docs: index.num_docs() },
            None => FieldStatus { field, available: false, terms: 0, docs: 0 },
        })
        .collect();
    Json(StatusResponse {
        num_docs: ctx.num_docs(),
        created_at: ctx.meta().created_at.clone(),
        preset: state.engine.config().preset.to_string(),
        fields,
        degraded: ctx.degraded().to_vec(),
    })
}

async fn reload_signals_handler(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<serde_json::Value> {
    authorize(&state, &headers)?;
    let engine = state.engine.clone();
    let errors = tokio::task::spawn_blocking(move || engine.context().reload_signals())
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("reload task failed: {e}")))?;
    let errors: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    Ok(Json(serde_json::json!({ "reloaded": true, "errors": errors })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> std::result::Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_refs_accept_numbers_and_numeric_strings() {
        let refs: Vec<DocRef> = serde_json::from_str(r#"[12, "34", "x", -1, 99999999999, 2.5]"#).unwrap();
        let ids: Vec<Option<DocId>> = refs.iter().map(DocRef::doc_id).collect();
        assert_eq!(ids, vec![Some(12), Some(34), None, None, None, None]);
    }

    #[test]
    fn positional_lookup_fills_gaps_with_defaults() {
        let refs = vec![DocRef::Text("nope".into()), DocRef::Text("2".into()), DocRef::Number(3u64.into())];
        let out = lookup_positional(&refs, |ids| ids.iter().map(|&d| u64::from(d) * 10).collect());
        assert_eq!(out, vec![0, 20, 30]);
    }
}
