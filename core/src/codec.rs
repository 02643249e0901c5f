//! Binary encoding of posting lists.
//!
//! A run is `varint(count)` followed by `count` pairs of
//! `varint(doc_id - prev_doc_id)` and `varint(tf)`. Block files start with
//! [`BLOCK_MAGIC`] and a little-endian `u32` format version.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use crate::{DocId, Posting};

pub const BLOCK_MAGIC: &[u8; 4] = b"WRPB";
pub const FORMAT_VERSION: u32 = 1;
pub const BLOCK_HEADER_LEN: u64 = 8;

pub fn write_block_header<W: Write>(w: &mut W) -> io::Result<()> {
    w.write_all(BLOCK_MAGIC)?;
    w.write_u32::<LittleEndian>(FORMAT_VERSION)
}

/// Checks the magic and version at the start of a block file.
pub fn check_block_header<R: Read>(r: &mut R) -> std::result::Result<(), String> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(|e| format!("short block header: {e}"))?;
    if &magic != BLOCK_MAGIC {
        return Err(format!("bad block magic {magic:?}"));
    }
    let version = r.read_u32::<LittleEndian>().map_err(|e| format!("short block header: {e}"))?;
    if version != FORMAT_VERSION {
        return Err(format!("unsupported block format version {version}"));
    }
    Ok(())
}

pub fn write_vint<W: Write>(w: &mut W, mut value: u64) -> io::Result<()> {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            w.write_u8(byte)?;
            return Ok(());
        }
        w.write_u8(byte | 0x80)?;
    }
}

pub fn read_vint<R: Read>(r: &mut R) -> std::result::Result<u64, String> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        let byte = r.read_u8().map_err(|_| "truncated varint".to_string())?;
        if shift == 63 && byte > 1 {
            return Err("varint overflows u64".into());
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 63 {
            return Err("varint overflows u64".into());
        }
    }
}

/// Serialize postings (sorted by doc id, no duplicates) into one run.
pub fn encode_postings(postings: &[Posting]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + postings.len() * 3);
    // Writing into a Vec cannot fail.
    let _ = write_vint(&mut buf, postings.len() as u64);
    let mut prev: DocId = 0;
    for p in postings {
        debug_assert!(p.doc_id >= prev, "postings must be sorted by doc_id");
        let _ = write_vint(&mut buf, u64::from(p.doc_id - prev));
        let _ = write_vint(&mut buf, u64::from(p.tf));
        prev = p.doc_id;
    }
    buf
}

/// Decode one run, validating it against the term's document frequency.
///
/// The error string describes what was wrong; callers wrap it with the field
/// and term it belongs to.
pub fn decode_postings(bytes: &[u8], expected_df: u32) -> std::result::Result<Vec<Posting>, String> {
    let mut cur = Cursor::new(bytes);
    let count = read_vint(&mut cur)?;
    if count != u64::from(expected_df) {
        return Err(format!("run holds {count} postings but df is {expected_df}"));
    }
    let mut postings = Vec::with_capacity(count as usize);
    let mut prev: u64 = 0;
    for i in 0..count {
        let delta = read_vint(&mut cur)?;
        if i > 0 && delta == 0 {
            return Err(format!("duplicate doc id {prev}"));
        }
        let doc_id = prev.checked_add(delta).ok_or_else(|| format!("doc id overflow after {prev}"))?;
        let doc_id = DocId::try_from(doc_id).map_err(|_| format!("doc id {doc_id} out of range"))?;
        let tf = read_vint(&mut cur)?;
        if tf == 0 {
            return Err(format!("zero term frequency for doc {doc_id}"));
        }
        let tf = u32::try_from(tf).map_err(|_| format!("term frequency {tf} out of range"))?;
        postings.push(Posting { doc_id, tf });
        prev = u64::from(doc_id);
    }
    let consumed = cur.position() as usize;
    if consumed != bytes.len() {
        return Err(format!("{} trailing bytes after run", bytes.len() - consumed));
    }
    Ok(postings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_sparse_ids() {
        let postings = vec![Posting::new(3, 1), Posting::new(200, 7), Posting::new(4_000_000_000, 65_536)];
        let bytes = encode_postings(&postings);
        assert_eq!(decode_postings(&bytes, 3).unwrap(), postings);
    }

    #[test]
    fn rejects_df_mismatch() {
        let bytes = encode_postings(&[Posting::new(1, 1)]);
        assert!(decode_postings(&bytes, 2).is_err());
    }

    #[test]
    fn rejects_truncated_run() {
        let bytes = encode_postings(&[Posting::new(1, 1), Posting::new(300, 2)]);
        assert!(decode_postings(&bytes[..bytes.len() - 1], 2).is_err());
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = encode_postings(&[Posting::new(1, 1)]);
        bytes.push(0);
        assert!(decode_postings(&bytes, 1).unwrap_err().contains("trailing"));
    }

    #[test]
    fn rejects_zero_tf_and_duplicates() {
        // count=2, (delta 5, tf 1), (delta 0, tf 1)
        assert!(decode_postings(&[2, 5, 1, 0, 1], 2).unwrap_err().contains("duplicate"));
        // count=1, (delta 5, tf 0)
        assert!(decode_postings(&[1, 5, 0], 1).unwrap_err().contains("zero"));
    }

    #[test]
    fn rejects_delta_overflow() {
        let mut bytes = vec![2, 5, 1];
        write_vint(&mut bytes, u64::MAX).unwrap();
        bytes.push(1);
        assert!(decode_postings(&bytes, 2).unwrap_err().contains("overflow"));

        // A delta that stays within u64 but leaves the u32 id space.
        let mut bytes = vec![1];
        write_vint(&mut bytes, u64::from(u32::MAX) + 1).unwrap();
        bytes.push(1);
        assert!(decode_postings(&bytes, 1).unwrap_err().contains("out of range"));
    }

    #[test]
    fn header_check() {
        let mut buf = Vec::new();
        write_block_header(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, BLOCK_HEADER_LEN);
        assert!(check_block_header(&mut Cursor::new(&buf)).is_ok());
        assert!(check_block_header(&mut Cursor::new(b"nope\x01\x00\x00\x00")).is_err());
    }
}
