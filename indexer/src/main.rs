use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;
use wikirank_core::builder::{BuildOptions, IndexBuilder};
use wikirank_core::config::StoreMode;
use wikirank_core::persist::IndexPaths;
use wikirank_core::signals::{save_signals, Signals};
use wikirank_core::store::{open_store, DEFAULT_BLOCK_SIZE};
use wikirank_core::tokenizer::tokenize;
use wikirank_core::{DocId, Field};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One parsed article: its id, title, plain-text body and outgoing links.
#[derive(Debug, Deserialize)]
struct InputDoc {
    id: DocId,
    title: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    outlinks: Vec<OutLink>,
}

#[derive(Debug, Deserialize)]
struct OutLink {
    target: DocId,
    #[serde(default)]
    text: String,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and manage the multi-field inverted index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Size cap of a postings block file in bytes
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: u64,
        /// JSON object of docId -> authority score
        #[arg(long)]
        authority: Option<String>,
        /// JSON object of docId -> page views
        #[arg(long)]
        popularity: Option<String>,
    },
    /// Replace the authority and/or popularity tables of an existing index
    ImportSignals {
        #[arg(long)]
        index: String,
        #[arg(long)]
        authority: Option<String>,
        #[arg(long)]
        popularity: Option<String>,
    },
    /// Print the document frequency and posting list of a term
    Inspect {
        #[arg(long)]
        index: String,
        /// body, title or anchor
        #[arg(long)]
        field: String,
        #[arg(long)]
        term: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, block_size, authority, popularity } => {
            build_index(&input, &output, block_size)?;
            if authority.is_some() || popularity.is_some() {
                import_signals(&output, authority.as_deref(), popularity.as_deref())?;
            }
            Ok(())
        }
        Commands::ImportSignals { index, authority, popularity } => {
            if authority.is_none() && popularity.is_none() {
                bail!("nothing to import: pass --authority and/or --popularity");
            }
            import_signals(&index, authority.as_deref(), popularity.as_deref())
        }
        Commands::Inspect { index, field, term } => inspect(&index, &field, &term),
    }
}

fn build_index(input: &str, output: &str, block_size: u64) -> Result<()> {
    let files = collect_input_files(Path::new(input))?;
    let mut docs = Vec::new();
    for file in &files {
        read_docs(file, &mut docs).with_context(|| format!("reading {}", file.display()))?;
    }
    tracing::info!(files = files.len(), docs = docs.len(), "read input documents");

    let builder = ingest(docs);
    let options = BuildOptions {
        block_size,
        created_at: time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap_or_default(),
        ..BuildOptions::default()
    };
    let summary = builder.finalize(&IndexPaths::new(output), &options)?;
    for f in &summary.fields {
        tracing::info!(field = %f.field, terms = f.num_terms, blocks = f.num_blocks, "field summary");
    }
    tracing::info!(output, num_docs = summary.num_docs, "index build complete");
    Ok(())
}

fn collect_input_files(input_path: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    } else {
        bail!("input path {} does not exist", input_path.display());
    }
    Ok(files)
}

fn read_docs(file: &Path, docs: &mut Vec<InputDoc>) -> Result<()> {
    let reader = BufReader::new(File::open(file)?);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            let doc: InputDoc = serde_json::from_str(&line).with_context(|| format!("line {}", n + 1))?;
            docs.push(doc);
        }
        return Ok(());
    }
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    match json {
        serde_json::Value::Array(arr) => {
            for v in arr {
                docs.push(serde_json::from_value(v)?);
            }
        }
        json @ serde_json::Value::Object(_) => docs.push(serde_json::from_value(json)?),
        _ => tracing::warn!(file = %file.display(), "skipping JSON file that is neither an object nor an array"),
    }
    Ok(())
}

/// Feed parsed articles into an [`IndexBuilder`].
///
/// Anchor text is indexed under the link target, and only for targets that are
/// themselves in the corpus. A link without text uses the target's title.
fn ingest(docs: Vec<InputDoc>) -> IndexBuilder {
    let mut builder = IndexBuilder::new();
    let mut titles: BTreeMap<DocId, String> = BTreeMap::new();
    let mut kept = Vec::with_capacity(docs.len());

    for doc in docs {
        if builder.has_document(doc.id) {
            tracing::warn!(doc_id = doc.id, "duplicate document id, keeping the first occurrence");
            continue;
        }
        builder.set_title(doc.id, doc.title.clone());
        builder.add_document(doc.id, Field::Title, &tokenize(&doc.title));
        builder.add_document(doc.id, Field::Body, &tokenize(&doc.body));
        titles.insert(doc.id, doc.title.clone());
        kept.push(doc);
    }

    let mut dangling = 0usize;
    for doc in &kept {
        for link in &doc.outlinks {
            let Some(target_title) = titles.get(&link.target) else {
                dangling += 1;
                continue;
            };
            let text = if link.text.trim().is_empty() { target_title.as_str() } else { link.text.as_str() };
            builder.add_document(link.target, Field::Anchor, &tokenize(text));
        }
    }
    tracing::info!(docs = builder.num_docs(), dangling_links = dangling, "ingested documents");
    builder
}

fn load_signal_file<V: DeserializeOwned>(path: &str) -> Result<BTreeMap<DocId, V>> {
    let reader = BufReader::new(File::open(path).with_context(|| format!("opening {path}"))?);
    let table = serde_json::from_reader(reader).with_context(|| format!("parsing {path}"))?;
    Ok(table)
}

/// Write new signal tables, keeping whichever table was not supplied.
fn import_signals(index: &str, authority: Option<&str>, popularity: Option<&str>) -> Result<()> {
    let paths = IndexPaths::new(index);
    let (current, errors) = Signals::load(&paths);
    if !errors.is_empty() {
        tracing::warn!(errors = errors.len(), "existing signal tables were unreadable and will be replaced");
    }
    let authority: BTreeMap<DocId, f64> = match authority {
        Some(path) => load_signal_file(path)?,
        None => current.authority.into_iter().collect(),
    };
    let popularity: BTreeMap<DocId, u64> = match popularity {
        Some(path) => load_signal_file(path)?,
        None => current.popularity.into_iter().collect(),
    };
    save_signals(&paths, &authority, &popularity)?;
    tracing::info!(index, authority = authority.len(), popularity = popularity.len(), "signal tables written");
    Ok(())
}

fn inspect(index: &str, field: &str, term: &str) -> Result<()> {
    let field: Field = field.parse()?;
    let store = open_store(&IndexPaths::new(index), field, StoreMode::Disk)?;
    let postings = store.read_posting_list(term)?;
    let out = serde_json::json!({
        "field": field,
        "term": term,
        "df": store.document_frequency(term),
        "postings": postings,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
