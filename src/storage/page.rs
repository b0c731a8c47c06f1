/// Page geometry and entry size limits.
///
/// A page is a fixed 4096-byte unit identified by a `PageId`. Page number 0 is
/// reserved to mean "no page" (an empty tree has root 0).
///
/// Node layout inside a page (little-endian):
///   [node_type: u16] [nkeys: u16]
///   [pointers: nkeys × u64]
///   [offsets: nkeys × u16]           (end offset of entries 1..=nkeys; offset 0 is implicit)
///   [entries: (key_len: u16, val_len: u16, key, val) ...]

pub const PAGE_SIZE: usize = 4096;
pub const NODE_HEADER_SIZE: usize = 4;
pub const POINTER_SIZE: usize = 8;
pub const OFFSET_SIZE: usize = 2;
/// key_len + val_len prefix of every entry.
pub const ENTRY_HEADER_SIZE: usize = 4;

pub const MAX_KEY_SIZE: usize = 1000;
pub const MAX_VAL_SIZE: usize = 3000;

/// Capacity of a node under construction. A page-sized node plus one
/// oversized insertion always fits.
pub const SCRATCH_SIZE: usize = 2 * PAGE_SIZE;

/// Bytes one entry adds to a node: pointer slot, offset slot, length prefix and payload.
pub const MAX_ENTRY_FOOTPRINT: usize =
    POINTER_SIZE + OFFSET_SIZE + ENTRY_HEADER_SIZE + MAX_KEY_SIZE + MAX_VAL_SIZE;

/// Temporary file suffixes are drawn from `[0, TEMP_SUFFIX_RANGE)`.
pub const TEMP_SUFFIX_RANGE: u32 = 100_000;

pub type PageId = u64;

/// Reserved page number meaning "no page".
pub const NULL_PAGE: PageId = 0;

// A single maximal entry must fit in one page, otherwise no split can help.
const _: () = assert!(NODE_HEADER_SIZE + MAX_ENTRY_FOOTPRINT <= PAGE_SIZE);
// Offsets are stored as u16 and may address anywhere in a scratch node.
const _: () = assert!(SCRATCH_SIZE <= u16::MAX as usize);
// A full page plus one maximal insertion must fit the scratch buffer.
const _: () = assert!(PAGE_SIZE + MAX_ENTRY_FOOTPRINT <= SCRATCH_SIZE);
