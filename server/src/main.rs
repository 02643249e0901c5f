use anyhow::Result;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{fmt, EnvFilter};
use server::{build_app, ServeOptions};
use tokio::net::TcpListener;
use wikirank_core::config::{Bm25Params, BodyScoring, EngineConfig, Preset, StoreMode};

#[derive(Parser)]
struct Args {
    /// Index directory path
    #[arg(long, default_value = "./index")]
    index: String,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Ranking preset for /search
    #[arg(long, env = "ENGINE_VERSION", default_value = "BALANCED_2_NO_PR")]
    preset: Preset,
    /// Body scoring inside /search: bm25 or cosine
    #[arg(long, default_value = "bm25")]
    body_scoring: BodyScoring,
    /// Where postings are read from: disk or memory
    #[arg(long, default_value = "disk")]
    store_mode: StoreMode,
    /// Exit instead of serving when an index component fails to load
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let options = ServeOptions {
        engine: EngineConfig { preset: args.preset, body_scoring: args.body_scoring, bm25: Bm25Params::default() },
        store_mode: args.store_mode,
        strict: args.strict,
        admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.is_empty()),
    };
    tracing::info!(preset = %args.preset, index = %args.index, "loading index");
    let app: Router = build_app(&args.index, &options)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
