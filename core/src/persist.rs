use crate::{DocId, Field, IndexError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{create_dir_all, rename, File};
use std::hash::Hash;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

pub const META_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    pub field: Field,
    pub num_terms: usize,
    pub num_blocks: u32,
    pub has_norms: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub created_at: String,
    pub version: u32,
    pub block_size: u64,
    pub fields: Vec<FieldMeta>,
}

impl MetaFile {
    pub fn field(&self, field: Field) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.field == field)
    }
}

/// Path conventions of an index directory.
#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    pub fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    pub fn titles(&self) -> PathBuf { self.root.join("titles.bin") }
    pub fn authority(&self) -> PathBuf { self.root.join("authority.bin") }
    pub fn popularity(&self) -> PathBuf { self.root.join("popularity.bin") }
    pub fn field_dir(&self, field: Field) -> PathBuf { self.root.join(field.as_str()) }
    pub fn vocab(&self, field: Field) -> PathBuf { self.field_dir(field).join("vocab.bin") }
    pub fn lengths(&self, field: Field) -> PathBuf { self.field_dir(field).join("lengths.bin") }
    pub fn norms(&self, field: Field) -> PathBuf { self.field_dir(field).join("norms.bin") }
    pub fn block(&self, field: Field, block: u32) -> PathBuf {
        self.field_dir(field).join(format!("postings_{block:04}.bin"))
    }
}

/// Writes to a sibling `.tmp` file and renames it over `path`, so readers see
/// either the old or the new contents.
pub fn save_bincode<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let mut w = BufWriter::new(File::create(&tmp)?);
    bincode::serialize_into(&mut w, value)?;
    w.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    rename(&tmp, path)?;
    Ok(())
}

pub fn load_bincode<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let f = File::open(path)?;
    let value = bincode::deserialize_from(BufReader::new(f))?;
    Ok(value)
}

/// Persist a `doc_id`-keyed table in key order so identical tables produce identical bytes.
pub fn save_table<K, V>(path: &Path, table: &BTreeMap<K, V>) -> Result<()>
where
    K: Serialize + Ord,
    V: Serialize,
{
    save_bincode(path, table)
}

pub fn load_table<K, V>(path: &Path) -> Result<HashMap<K, V>>
where
    K: DeserializeOwned + Ord + Eq + Hash,
    V: DeserializeOwned,
{
    let table: BTreeMap<K, V> = load_bincode(path)?;
    Ok(table.into_iter().collect())
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    if meta.version != META_VERSION {
        return Err(IndexError::configuration(
            "meta.json",
            format!("unsupported index version {} (expected {META_VERSION})", meta.version),
        ));
    }
    Ok(meta)
}

pub fn load_titles(paths: &IndexPaths) -> Result<HashMap<DocId, String>> {
    load_table(&paths.titles())
}
