/// Magic number written at the start of the header and the end of the trailer.
pub const TABLE_MAGIC: u32 = 0x1EAF_1111;

/// On-disk format version.
pub const FORMAT_VERSION: u16 = 1;

/// Header: magic (4) + version (2) + flags (2).
pub const HEADER_SIZE: u64 = 4 + 2 + 2;

/// Trailer: entry_count (8) + index_offset (8) + index_len (8) + comparator_offset (8)
/// + index_interval (4) + checksum (4) + magic (4).
pub const TRAILER_SIZE: u64 = 8 + 8 + 8 + 8 + 4 + 4 + 4;

/// Bytes at the end of the file not covered by the checksum (checksum + magic).
pub const UNCHECKED_TAIL: u64 = 4 + 4;

/// Every Kth entry is sampled into the sparse index.
pub const DEFAULT_INDEX_INTERVAL: u32 = 8;

/// Extension appended to the output path while a table is being built.
pub const TEMP_EXTENSION: &str = "tmp";
