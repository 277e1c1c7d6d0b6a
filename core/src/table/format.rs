//! Table file binary layout and encode/decode helpers.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ HEADER      magic (u32) | version (u16) | flags (u16)        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ ENTRIES     key_len (varint) | key | value_len (varint) | val│
//! │             ... N records in ascending comparator order ...  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ INDEX       key_len (varint) | key | record_offset (u64)     │
//! │             ... one sample per K entries (ordinal % K == 0)  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ COMPARATOR  name_len (u16) | name | params_len (u16) | params│
//! ├──────────────────────────────────────────────────────────────┤
//! │ TRAILER     entry_count (u64) | index_offset (u64)           │
//! │             index_len (u64) | comparator_offset (u64)        │
//! │             index_interval (u32) | checksum (u32) | magic    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All fixed-width integers are little-endian. The checksum is a CRC-32 of
//! every byte preceding the checksum field.

use std::io::Write;
use std::ops::Range;

use crate::constants::{FORMAT_VERSION, HEADER_SIZE, TABLE_MAGIC, TRAILER_SIZE};
use crate::error::{PbtError, Result};
use crate::varint::{decode_varint, encode_varint, varint_len};

use super::comparator::ComparatorConfig;

pub(crate) fn write_header<W: Write>(w: &mut W) -> Result<()> {
    w.write_all(&TABLE_MAGIC.to_le_bytes())?;
    w.write_all(&FORMAT_VERSION.to_le_bytes())?;
    w.write_all(&0u16.to_le_bytes())?;
    Ok(())
}

pub(crate) fn check_header(data: &[u8]) -> Result<()> {
    if (data.len() as u64) < HEADER_SIZE {
        return Err(PbtError::corrupt("file too small for header"));
    }
    let magic = read_u32(data, 0)?;
    if magic != TABLE_MAGIC {
        return Err(PbtError::corrupt(format!("bad header magic {magic:#x}")));
    }
    let version = read_u16(data, 4)?;
    if version != FORMAT_VERSION {
        return Err(PbtError::corrupt(format!("unsupported format version {version}")));
    }
    Ok(())
}

/// Encoded size of one entry record.
pub(crate) fn record_len(key: &[u8], value: &[u8]) -> u64 {
    (varint_len(key.len() as u64) + key.len() + varint_len(value.len() as u64) + value.len()) as u64
}

pub(crate) fn write_record<W: Write>(w: &mut W, key: &[u8], value: &[u8]) -> Result<()> {
    encode_varint(key.len() as u64, w)?;
    w.write_all(key)?;
    encode_varint(value.len() as u64, w)?;
    w.write_all(value)?;
    Ok(())
}

/// Byte ranges of one decoded record, relative to the start of the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct RecordSpan {
    pub key: Range<usize>,
    pub value: Range<usize>,
}

impl RecordSpan {
    /// Offset of the record that follows this one.
    pub fn next_offset(&self) -> usize {
        self.value.end
    }
}

/// Decodes the record starting at `offset`. `limit` is the end of the entry region.
pub(crate) fn decode_record(data: &[u8], offset: usize, limit: usize) -> Result<RecordSpan> {
    let region = data
        .get(..limit)
        .ok_or_else(|| PbtError::corrupt("entry region exceeds file"))?;
    let key = read_length_prefixed(region, offset)?;
    let value = read_length_prefixed(region, key.end)?;
    Ok(RecordSpan { key, value })
}

pub(crate) fn write_index_sample<W: Write>(w: &mut W, key: &[u8], record_offset: u64) -> Result<()> {
    encode_varint(key.len() as u64, w)?;
    w.write_all(key)?;
    w.write_all(&record_offset.to_le_bytes())?;
    Ok(())
}

/// One sparse index entry: the key of every Kth record and where that record starts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct IndexSample {
    pub key: Range<usize>,
    pub record_offset: u64,
}

/// Decodes the index block at `range`.
pub(crate) fn decode_index(data: &[u8], range: Range<usize>) -> Result<Vec<IndexSample>> {
    let block = data
        .get(..range.end)
        .ok_or_else(|| PbtError::corrupt("index exceeds file"))?;
    let mut samples = Vec::new();
    let mut pos = range.start;
    while pos < range.end {
        let key = read_length_prefixed(block, pos)?;
        let record_offset = read_u64(block, key.end)?;
        pos = key.end + 8;
        samples.push(IndexSample { key, record_offset });
    }
    Ok(samples)
}

pub(crate) fn write_comparator_block<W: Write>(w: &mut W, config: &ComparatorConfig) -> Result<()> {
    let name = config.name.as_bytes();
    let name_len = u16::try_from(name.len())
        .map_err(|_| PbtError::corrupt("comparator name longer than 65535 bytes"))?;
    let params_len = u16::try_from(config.params.len())
        .map_err(|_| PbtError::corrupt("comparator params longer than 65535 bytes"))?;
    w.write_all(&name_len.to_le_bytes())?;
    w.write_all(name)?;
    w.write_all(&params_len.to_le_bytes())?;
    w.write_all(&config.params)?;
    Ok(())
}

pub(crate) fn comparator_block_len(config: &ComparatorConfig) -> u64 {
    (2 + config.name.len() + 2 + config.params.len()) as u64
}

pub(crate) fn decode_comparator_block(data: &[u8], range: Range<usize>) -> Result<ComparatorConfig> {
    let block = data
        .get(range.clone())
        .ok_or_else(|| PbtError::corrupt("comparator block exceeds file"))?;
    let name_len = read_u16(block, 0)? as usize;
    let name = block
        .get(2..2 + name_len)
        .ok_or_else(|| PbtError::corrupt("comparator name truncated"))?;
    let name = std::str::from_utf8(name)
        .map_err(|_| PbtError::corrupt("comparator name is not UTF-8"))?;
    let params_len = read_u16(block, 2 + name_len)? as usize;
    let params_start = 4 + name_len;
    if params_start + params_len != block.len() {
        return Err(PbtError::corrupt("comparator block length mismatch"));
    }
    Ok(ComparatorConfig::new(name, block[params_start..].to_vec()))
}

/// Fixed-size tail of the file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Trailer {
    pub entry_count: u64,
    pub index_offset: u64,
    pub index_len: u64,
    pub comparator_offset: u64,
    pub index_interval: u32,
    pub checksum: u32,
}

impl Trailer {
    /// Writes every trailer field that precedes the checksum.
    pub fn write_checked_fields<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.entry_count.to_le_bytes())?;
        w.write_all(&self.index_offset.to_le_bytes())?;
        w.write_all(&self.index_len.to_le_bytes())?;
        w.write_all(&self.comparator_offset.to_le_bytes())?;
        w.write_all(&self.index_interval.to_le_bytes())?;
        Ok(())
    }

    /// Writes the checksum and closing magic.
    pub fn write_seal<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&self.checksum.to_le_bytes())?;
        w.write_all(&TABLE_MAGIC.to_le_bytes())?;
        Ok(())
    }

    /// Reads the trailer from the last `TRAILER_SIZE` bytes of `data`.
    pub fn read_from(data: &[u8]) -> Result<Self> {
        let len = data.len() as u64;
        if len < HEADER_SIZE + TRAILER_SIZE {
            return Err(PbtError::corrupt("file too small for header and trailer"));
        }
        let start = (len - TRAILER_SIZE) as usize;
        let magic = read_u32(data, start + 40)?;
        if magic != TABLE_MAGIC {
            return Err(PbtError::corrupt(format!("bad trailer magic {magic:#x}")));
        }
        Ok(Self {
            entry_count: read_u64(data, start)?,
            index_offset: read_u64(data, start + 8)?,
            index_len: read_u64(data, start + 16)?,
            comparator_offset: read_u64(data, start + 24)?,
            index_interval: read_u32(data, start + 32)?,
            checksum: read_u32(data, start + 36)?,
        })
    }
}

fn read_length_prefixed(data: &[u8], offset: usize) -> Result<Range<usize>> {
    let tail = data
        .get(offset..)
        .ok_or_else(|| PbtError::corrupt(format!("offset {offset} out of bounds")))?;
    let (len, varint_size) = decode_varint(tail)?;
    let start = offset + varint_size;
    let end = usize::try_from(len)
        .ok()
        .and_then(|len| start.checked_add(len))
        .filter(|&end| end <= data.len())
        .ok_or_else(|| PbtError::corrupt(format!("field at offset {offset} overruns its region")))?;
    Ok(start..end)
}

fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N]> {
    data.get(offset..offset + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| PbtError::corrupt(format!("truncated field at offset {offset}")))
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16> {
    read_fixed(data, offset).map(u16::from_le_bytes)
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32> {
    read_fixed(data, offset).map(u32::from_le_bytes)
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64> {
    read_fixed(data, offset).map(u64::from_le_bytes)
}
