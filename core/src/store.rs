//! Per-field posting storage: capped block files plus a term directory.

use crate::codec::{self, BLOCK_HEADER_LEN};
use crate::config::StoreMode;
use crate::persist::{load_bincode, save_bincode, IndexPaths};
use crate::{Field, IndexError, Posting, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Block files are closed once the next run would push them past this size.
pub const DEFAULT_BLOCK_SIZE: u64 = 1_999_998;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingLocation {
    pub block: u32,
    pub offset: u64,
    pub len: u32,
}

/// Term directory of one field, persisted as `<field>/vocab.bin`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldVocabulary {
    pub num_blocks: u32,
    pub df: BTreeMap<String, u32>,
    pub locations: BTreeMap<String, PostingLocation>,
}

impl FieldVocabulary {
    pub fn num_terms(&self) -> usize { self.df.len() }

    fn lookup(&self, term: &str) -> Option<(u32, PostingLocation)> {
        Some((*self.df.get(term)?, *self.locations.get(term)?))
    }
}

/// Appends encoded runs to `postings_NNNN.bin` files, rolling over at the size cap.
struct BlockWriter {
    paths: IndexPaths,
    field: Field,
    block_size: u64,
    current: Option<BufWriter<File>>,
    block: u32,
    offset: u64,
}

impl BlockWriter {
    fn new(paths: &IndexPaths, field: Field, block_size: u64) -> Self {
        Self { paths: paths.clone(), field, block_size, current: None, block: 0, offset: 0 }
    }

    fn append(&mut self, run: &[u8]) -> Result<PostingLocation> {
        let len = run.len() as u64;
        let full = self.offset > BLOCK_HEADER_LEN && self.offset + len > self.block_size;
        if self.current.is_none() || full {
            self.roll()?;
        }
        let w = self.current.as_mut().ok_or_else(|| IndexError::Build("no open block".into()))?;
        w.write_all(run)?;
        let loc = PostingLocation {
            block: self.block - 1,
            offset: self.offset,
            len: u32::try_from(len).map_err(|_| IndexError::Build("posting run exceeds 4 GiB".into()))?,
        };
        self.offset += len;
        Ok(loc)
    }

    fn roll(&mut self) -> Result<()> {
        if let Some(mut w) = self.current.take() {
            w.flush()?;
        }
        let path = self.paths.block(self.field, self.block);
        let mut w = BufWriter::new(File::create(&path)?);
        codec::write_block_header(&mut w)?;
        self.current = Some(w);
        self.block += 1;
        self.offset = BLOCK_HEADER_LEN;
        Ok(())
    }

    /// Flushes the open block and returns how many blocks were written.
    fn finish(mut self) -> Result<u32> {
        if let Some(mut w) = self.current.take() {
            w.flush()?;
        }
        Ok(self.block)
    }
}

/// Write every term's posting list of one field and its directory.
///
/// Terms are written in lexicographic order, so the output is a pure function
/// of the postings.
pub fn write_field_store(
    paths: &IndexPaths,
    field: Field,
    postings: &BTreeMap<String, Vec<Posting>>,
    block_size: u64,
) -> Result<FieldVocabulary> {
    fs::create_dir_all(paths.field_dir(field))?;
    let mut writer = BlockWriter::new(paths, field, block_size);
    let mut vocab = FieldVocabulary::default();
    for (term, list) in postings {
        let run = codec::encode_postings(list);
        let loc = writer.append(&run)?;
        vocab.df.insert(term.clone(), list.len() as u32);
        vocab.locations.insert(term.clone(), loc);
    }
    vocab.num_blocks = writer.finish()?;
    save_bincode(&paths.vocab(field), &vocab)?;
    tracing::debug!(%field, terms = vocab.num_terms(), blocks = vocab.num_blocks, "wrote posting store");
    Ok(vocab)
}

/// Read access to one field's postings.
///
/// An unknown term yields an empty list; a run that fails to decode yields
/// [`IndexError::CorruptPostingData`].
pub trait PostingReader: Send + Sync {
    fn field(&self) -> Field;

    fn vocabulary(&self) -> &FieldVocabulary;

    fn read_posting_list(&self, term: &str) -> Result<Vec<Posting>>;

    fn document_frequency(&self, term: &str) -> Option<u32> {
        self.vocabulary().df.get(term).copied()
    }

    fn num_terms(&self) -> usize {
        self.vocabulary().num_terms()
    }
}

fn decode_run(field: Field, term: &str, df: u32, bytes: &[u8]) -> Result<Vec<Posting>> {
    codec::decode_postings(bytes, df).map_err(|reason| IndexError::corrupt(field, term, reason))
}

/// Byte range `[start, end)` of a run in a block of `block_len` bytes.
fn run_range(loc: &PostingLocation, block_len: u64) -> std::result::Result<(u64, u64), String> {
    if loc.offset < BLOCK_HEADER_LEN {
        return Err(format!("run offset {} lies inside the block header", loc.offset));
    }
    let end = loc.offset.checked_add(u64::from(loc.len)).ok_or("run range overflows u64")?;
    if end > block_len {
        return Err(format!("run {}..{end} extends past end of block ({block_len} bytes)", loc.offset));
    }
    Ok((loc.offset, end))
}

fn check_block(field: Field, path: &Path) -> Result<()> {
    let mut f = File::open(path)?;
    codec::check_block_header(&mut f)
        .map_err(|reason| IndexError::configuration(format!("{field} postings"), format!("{}: {reason}", path.display())))
}

/// Reads runs straight from the block files, one fresh handle per read.
pub struct DiskPostingStore {
    field: Field,
    vocab: FieldVocabulary,
    blocks: Vec<PathBuf>,
}

impl DiskPostingStore {
    pub fn open(paths: &IndexPaths, field: Field) -> Result<Self> {
        let vocab: FieldVocabulary = load_bincode(&paths.vocab(field))?;
        let blocks: Vec<PathBuf> = (0..vocab.num_blocks).map(|b| paths.block(field, b)).collect();
        for path in &blocks {
            check_block(field, path)?;
        }
        Ok(Self { field, vocab, blocks })
    }
}

impl PostingReader for DiskPostingStore {
    fn field(&self) -> Field { self.field }

    fn vocabulary(&self) -> &FieldVocabulary { &self.vocab }

    fn read_posting_list(&self, term: &str) -> Result<Vec<Posting>> {
        let Some((df, loc)) = self.vocab.lookup(term) else { return Ok(Vec::new()) };
        let path = self
            .blocks
            .get(loc.block as usize)
            .ok_or_else(|| IndexError::corrupt(self.field, term, format!("block {} does not exist", loc.block)))?;
        let mut f = File::open(path)?;
        let (start, end) = run_range(&loc, f.metadata()?.len()).map_err(|reason| IndexError::corrupt(self.field, term, reason))?;
        f.seek(SeekFrom::Start(start))?;
        let mut buf = vec![0u8; (end - start) as usize];
        match f.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(IndexError::corrupt(self.field, term, "run extends past end of block"));
            }
            Err(e) => return Err(e.into()),
        }
        decode_run(self.field, term, df, &buf)
    }
}

/// Holds every block of a field in memory; runs are sliced out on read.
pub struct MemoryPostingStore {
    field: Field,
    vocab: FieldVocabulary,
    blocks: Vec<Vec<u8>>,
}

impl MemoryPostingStore {
    pub fn open(paths: &IndexPaths, field: Field) -> Result<Self> {
        let vocab: FieldVocabulary = load_bincode(&paths.vocab(field))?;
        let mut blocks = Vec::with_capacity(vocab.num_blocks as usize);
        for b in 0..vocab.num_blocks {
            let path = paths.block(field, b);
            let mut bytes = Vec::new();
            BufReader::new(File::open(&path)?).read_to_end(&mut bytes)?;
            codec::check_block_header(&mut bytes.as_slice()).map_err(|reason| {
                IndexError::configuration(format!("{field} postings"), format!("{}: {reason}", path.display()))
            })?;
            blocks.push(bytes);
        }
        Ok(Self { field, vocab, blocks })
    }
}

impl PostingReader for MemoryPostingStore {
    fn field(&self) -> Field { self.field }

    fn vocabulary(&self) -> &FieldVocabulary { &self.vocab }

    fn read_posting_list(&self, term: &str) -> Result<Vec<Posting>> {
        let Some((df, loc)) = self.vocab.lookup(term) else { return Ok(Vec::new()) };
        let block = self
            .blocks
            .get(loc.block as usize)
            .ok_or_else(|| IndexError::corrupt(self.field, term, format!("block {} does not exist", loc.block)))?;
        let (start, end) = run_range(&loc, block.len() as u64).map_err(|reason| IndexError::corrupt(self.field, term, reason))?;
        let bytes = &block[start as usize..end as usize];
        decode_run(self.field, term, df, bytes)
    }
}

pub fn open_store(paths: &IndexPaths, field: Field, mode: StoreMode) -> Result<Box<dyn PostingReader>> {
    Ok(match mode {
        StoreMode::Disk => Box::new(DiskPostingStore::open(paths, field)?),
        StoreMode::Memory => Box::new(MemoryPostingStore::open(paths, field)?),
    })
}
