mod common;

use common::{build_sample, engine, ids, options, sample_builder};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use wikirank_core::config::StoreMode;
use wikirank_core::context::IndexContext;
use wikirank_core::engine::FieldStrategy;
use wikirank_core::persist::{load_table, IndexPaths};
use wikirank_core::store::{open_store, PostingReader};
use wikirank_core::{DocId, Field, IndexError};

#[test]
fn posting_list_length_matches_document_frequency() {
    let dir = tempdir().unwrap();
    let paths = build_sample(dir.path());
    for mode in [StoreMode::Disk, StoreMode::Memory] {
        for field in Field::ALL {
            let store = open_store(&paths, field, mode).unwrap();
            assert!(store.num_terms() > 0);
            for (term, &df) in &store.vocabulary().df {
                let list = store.read_posting_list(term).unwrap();
                assert_eq!(list.len() as u32, df, "{field}/{term}");
                assert!(list.windows(2).all(|w| w[0].doc_id < w[1].doc_id));
            }
        }
    }
}

#[test]
fn term_frequencies_sum_to_document_length() {
    let dir = tempdir().unwrap();
    let paths = build_sample(dir.path());
    for field in Field::ALL {
        let store = open_store(&paths, field, StoreMode::Disk).unwrap();
        let mut sums: HashMap<DocId, u32> = HashMap::new();
        for term in store.vocabulary().df.keys() {
            for p in store.read_posting_list(term).unwrap() {
                *sums.entry(p.doc_id).or_insert(0) += p.tf;
            }
        }
        let lengths: HashMap<DocId, u32> = load_table(&paths.lengths(field)).unwrap();
        for (doc_id, len) in lengths {
            assert_eq!(sums.get(&doc_id).copied().unwrap_or(0), len, "{field} doc {doc_id}");
        }
    }
}

fn read_dir_files(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().to_string();
                files.push((rel, fs::read(&path).unwrap()));
            }
        }
    }
    files.sort();
    files
}

#[test]
fn identical_input_builds_identical_bytes() {
    let a = tempdir().unwrap();
    let b = tempdir().unwrap();
    sample_builder().finalize(&IndexPaths::new(a.path()), &options()).unwrap();
    sample_builder().finalize(&IndexPaths::new(b.path()), &options()).unwrap();
    let fa = read_dir_files(a.path());
    let fb = read_dir_files(b.path());
    assert!(fa.iter().any(|(name, _)| name.ends_with("postings_0000.bin")));
    assert_eq!(fa, fb);
}

#[test]
fn corrupt_run_is_distinguishable_from_unknown_term() {
    let dir = tempdir().unwrap();
    let paths = build_sample(dir.path());
    let store = open_store(&paths, Field::Body, StoreMode::Disk).unwrap();
    let loc = store.vocabulary().locations["python"];

    // Overwrite the run's posting count so it no longer agrees with df.
    let block = paths.block(Field::Body, loc.block);
    let mut bytes = fs::read(&block).unwrap();
    bytes[loc.offset as usize] = 0x7f;
    fs::write(&block, bytes).unwrap();

    for mode in [StoreMode::Disk, StoreMode::Memory] {
        let store = open_store(&paths, Field::Body, mode).unwrap();
        let err = store.read_posting_list("python").unwrap_err();
        assert!(err.is_corruption(), "{err}");
        assert!(store.read_posting_list("nonexistent").unwrap().is_empty());
    }

    // The request still succeeds from the title and anchor fields.
    let engine = engine(&paths);
    assert_eq!(ids(&engine.search("python")), vec![1]);
    assert!(engine.search_field("python", Field::Body, FieldStrategy::Bm25).is_empty());
    assert!(engine.score_bm25(&["python".to_string()], Field::Body).unwrap_err().is_corruption());
}

#[test]
fn truncated_block_is_reported_as_corruption() {
    let dir = tempdir().unwrap();
    let paths = build_sample(dir.path());
    let block = paths.block(Field::Title, 0);
    let bytes = fs::read(&block).unwrap();
    fs::write(&block, &bytes[..bytes.len() - 2]).unwrap();

    let store = open_store(&paths, Field::Title, StoreMode::Disk).unwrap();
    let last = store.vocabulary().locations.iter().max_by_key(|(_, l)| l.offset).map(|(t, _)| t.clone()).unwrap();
    assert!(store.read_posting_list(&last).unwrap_err().is_corruption());
}

#[test]
fn failed_field_degrades_instead_of_failing() {
    let dir = tempdir().unwrap();
    let paths = build_sample(dir.path());
    fs::remove_file(paths.vocab(Field::Anchor)).unwrap();
    fs::write(paths.block(Field::Title, 0), b"garbage!").unwrap();

    let ctx = IndexContext::open(&paths, StoreMode::Disk).unwrap();
    let components: Vec<&str> = ctx.degraded().iter().map(|d| d.component.as_str()).collect();
    assert_eq!(components, vec!["title field", "anchor field"]);
    assert!(ctx.field(Field::Anchor).is_none());

    let engine = engine(&paths);
    assert_eq!(ids(&engine.search("python")), vec![2, 4, 1]);
    assert!(engine.search_field("python", Field::Anchor, FieldStrategy::Presence).is_empty());
}

#[test]
fn missing_meta_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    let paths = build_sample(dir.path());
    fs::remove_file(paths.meta()).unwrap();
    let err = IndexContext::open(&paths, StoreMode::Memory).err().unwrap();
    assert!(matches!(err, IndexError::Configuration { .. }));
}

#[test]
fn missing_signals_are_neutral() {
    let dir = tempdir().unwrap();
    let paths = IndexPaths::new(dir.path());
    sample_builder().finalize(&paths, &options()).unwrap();
    let engine = engine(&paths);
    assert!(engine.context().degraded().is_empty());
    assert_eq!(engine.get_authority(&[1, 2]), vec![0.0, 0.0]);
}

#[test]
fn signal_reload_swaps_tables() {
    use std::collections::BTreeMap;
    use wikirank_core::signals::save_signals;

    let dir = tempdir().unwrap();
    let paths = build_sample(dir.path());
    let engine = engine(&paths);
    let before = engine.context().signals();

    let popularity: BTreeMap<DocId, u64> = [(1, 7)].into_iter().collect();
    save_signals(&paths, &BTreeMap::new(), &popularity).unwrap();
    assert!(engine.context().reload_signals().is_empty());

    assert_eq!(engine.get_popularity(&[1, 2]), vec![7, 0]);
    assert_eq!(before.popularity(2), 5000);
}

#[test]
fn corrupt_signal_file_does_not_wipe_loaded_values() {
    let dir = tempdir().unwrap();
    let paths = build_sample(dir.path());
    let engine = engine(&paths);

    fs::write(paths.popularity(), b"\x05").unwrap();
    let errors = engine.context().reload_signals();
    assert_eq!(errors.len(), 1);
    assert_eq!(engine.get_popularity(&[2]), vec![5000]);
    assert_eq!(engine.get_authority(&[4]), vec![0.9]);
}
