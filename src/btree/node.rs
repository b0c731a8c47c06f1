/// B+tree node encoding inside a fixed-size page buffer.
///
/// Layout (little-endian):
///   [node_type: u16] [nkeys: u16]
///   [pointers: nkeys × u64]        child page numbers (internal); zero in leaves
///   [offsets:  nkeys × u16]        offsets[i-1] = end of entry i-1 within the KV region
///   [KV region]                    per entry: [key_len: u16] [val_len: u16] [key] [val]
///
/// A node is built front to back with `append_entry`; each call writes the
/// entry at the position where the previous one ended. Nodes handed out by a
/// `PageStore` are never edited in place: every mutation builds a new `Node`.
use std::fmt;

use crate::error::{check, PageDbError, Result};
use crate::storage::page::{
    PageId, ENTRY_HEADER_SIZE, MAX_KEY_SIZE, MAX_VAL_SIZE, NODE_HEADER_SIZE, OFFSET_SIZE,
    PAGE_SIZE, POINTER_SIZE, SCRATCH_SIZE,
};

const NODE_TYPE_INTERNAL: u16 = 1;
const NODE_TYPE_LEAF: u16 = 2;

/// Bytes each entry costs in the pointer and offset arrays.
const SLOT_SIZE: usize = POINTER_SIZE + OFFSET_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Internal,
    Leaf,
}

impl NodeType {
    pub fn code(self) -> u16 {
        match self {
            NodeType::Internal => NODE_TYPE_INTERNAL,
            NodeType::Leaf => NODE_TYPE_LEAF,
        }
    }

    pub fn from_code(code: u16) -> Result<Self> {
        match code {
            NODE_TYPE_INTERNAL => Ok(NodeType::Internal),
            NODE_TYPE_LEAF => Ok(NodeType::Leaf),
            other => Err(PageDbError::InvalidNodeType(other)),
        }
    }
}

/// Size in bytes of a node holding `nkeys` entries whose KV region is `kv_bytes` long.
pub fn encoded_size(nkeys: usize, kv_bytes: usize) -> usize {
    NODE_HEADER_SIZE + SLOT_SIZE * nkeys + kv_bytes
}

/// One decoded entry. `key` and `value` borrow from the node buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry<'a> {
    pub pointer: PageId,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

/// An owned node buffer of fixed capacity.
///
/// Page-sized nodes have capacity `PAGE_SIZE`. Scratch nodes (`Node::scratch`)
/// have capacity `SCRATCH_SIZE` and may temporarily hold more than a page
/// until `split` breaks them up.
#[derive(Clone, PartialEq, Eq)]
pub struct Node {
    data: Vec<u8>,
}

impl Node {
    /// A zeroed page-sized buffer. The header must be set before use.
    pub fn new() -> Self {
        Node {
            data: vec![0u8; PAGE_SIZE],
        }
    }

    /// A zeroed buffer large enough for a page plus one oversized insertion.
    pub fn scratch() -> Self {
        Node {
            data: vec![0u8; SCRATCH_SIZE],
        }
    }

    /// An empty node of the given type.
    pub fn empty(node_type: NodeType) -> Self {
        let mut node = Node::new();
        // Zero entries always fit.
        node.write_u16(0, node_type.code());
        node.write_u16(2, 0);
        node
    }

    /// Decode and validate a page image read back from storage.
    pub fn from_page(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PAGE_SIZE {
            return Err(PageDbError::Corruption(format!(
                "page image is {} bytes, expected {}",
                bytes.len(),
                PAGE_SIZE
            )));
        }
        let node = Node {
            data: bytes.to_vec(),
        };
        node.validate()?;
        Ok(node)
    }

    /// Full check of the encoded structure: type, array bounds, offset
    /// monotonicity, entry length prefixes and total size.
    pub fn validate(&self) -> Result<()> {
        self.node_type()?;
        let n = self.nkeys() as usize;
        let kv_start = encoded_size(n, 0);
        if kv_start > self.capacity() {
            return Err(PageDbError::Corruption(format!(
                "nkeys={} does not fit a {}-byte buffer",
                n,
                self.capacity()
            )));
        }
        let mut prev = 0usize;
        for i in 0..n {
            let start = kv_start + prev;
            let end = self.offset_unchecked(i + 1) as usize;
            if end < prev + ENTRY_HEADER_SIZE || kv_start + end > self.capacity() {
                return Err(PageDbError::Corruption(format!(
                    "entry {} has bad end offset {}",
                    i, end
                )));
            }
            let klen = self.read_u16(start) as usize;
            let vlen = self.read_u16(start + 2) as usize;
            if start + ENTRY_HEADER_SIZE + klen + vlen != kv_start + end {
                return Err(PageDbError::Corruption(format!(
                    "entry {} length prefix disagrees with offsets",
                    i
                )));
            }
            prev = end;
        }
        if self.total_size() > PAGE_SIZE {
            return Err(PageDbError::Corruption(format!(
                "node size {} exceeds page size",
                self.total_size()
            )));
        }
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// The whole buffer, including unused bytes past `total_size`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Shrink to a page-sized buffer. Fails if the content does not fit a page.
    pub fn into_page(mut self) -> Result<Node> {
        let size = self.total_size();
        check(size <= PAGE_SIZE, || {
            format!("node of {} bytes does not fit a page", size)
        })?;
        self.data.truncate(PAGE_SIZE);
        self.data.resize(PAGE_SIZE, 0);
        Ok(self)
    }

    // --- Header ---

    pub fn node_type(&self) -> Result<NodeType> {
        NodeType::from_code(self.read_u16(0))
    }

    pub fn nkeys(&self) -> u16 {
        self.read_u16(2)
    }

    /// Set type and entry count. The pointer, offset and KV areas are stale
    /// until every entry has been appended.
    pub fn set_header(&mut self, node_type: NodeType, nkeys: u16) -> Result<()> {
        let needed = encoded_size(nkeys as usize, 0);
        check(needed <= self.capacity(), || {
            format!(
                "{} entries need {} bytes of arrays, buffer holds {}",
                nkeys,
                needed,
                self.capacity()
            )
        })?;
        self.write_u16(0, node_type.code());
        self.write_u16(2, nkeys);
        Ok(())
    }

    // --- Pointers ---

    pub fn pointer(&self, idx: u16) -> Result<PageId> {
        self.check_index(idx)?;
        let pos = NODE_HEADER_SIZE + POINTER_SIZE * idx as usize;
        Ok(u64::from_le_bytes(
            self.data[pos..pos + POINTER_SIZE].try_into().unwrap(),
        ))
    }

    pub fn set_pointer(&mut self, idx: u16, page_id: PageId) -> Result<()> {
        self.check_index(idx)?;
        let pos = NODE_HEADER_SIZE + POINTER_SIZE * idx as usize;
        self.data[pos..pos + POINTER_SIZE].copy_from_slice(&page_id.to_le_bytes());
        Ok(())
    }

    // --- Offsets ---

    /// End of entry `idx - 1` within the KV region. `offset(0)` is always 0.
    pub fn offset(&self, idx: u16) -> Result<u16> {
        check(idx <= self.nkeys(), || {
            format!("offset index {} out of range (nkeys={})", idx, self.nkeys())
        })?;
        Ok(self.offset_unchecked(idx as usize))
    }

    fn offset_unchecked(&self, idx: usize) -> u16 {
        if idx == 0 {
            return 0;
        }
        self.read_u16(self.offset_pos(idx))
    }

    fn offset_pos(&self, idx: usize) -> usize {
        NODE_HEADER_SIZE + POINTER_SIZE * self.nkeys() as usize + OFFSET_SIZE * (idx - 1)
    }

    fn kv_start(&self) -> usize {
        encoded_size(self.nkeys() as usize, 0)
    }

    /// Absolute position of entry `idx` (or the end of the region for `idx == nkeys`).
    fn kv_pos(&self, idx: u16) -> Result<usize> {
        Ok(self.kv_start() + self.offset(idx)? as usize)
    }

    // --- Entries ---

    pub fn key(&self, idx: u16) -> Result<&[u8]> {
        self.check_index(idx)?;
        let pos = self.kv_pos(idx)?;
        let klen = self.read_u16(pos) as usize;
        self.view(pos + ENTRY_HEADER_SIZE, klen)
    }

    pub fn value(&self, idx: u16) -> Result<&[u8]> {
        self.check_index(idx)?;
        let pos = self.kv_pos(idx)?;
        let klen = self.read_u16(pos) as usize;
        let vlen = self.read_u16(pos + 2) as usize;
        self.view(pos + ENTRY_HEADER_SIZE + klen, vlen)
    }

    pub fn entry(&self, idx: u16) -> Result<Entry<'_>> {
        Ok(Entry {
            pointer: self.pointer(idx)?,
            key: self.key(idx)?,
            value: self.value(idx)?,
        })
    }

    /// Write entry `idx` right after entry `idx - 1`.
    ///
    /// Entries must be appended in index order within one construction pass,
    /// since the write position comes from the previously stored offset.
    pub fn append_entry(&mut self, idx: u16, pointer: PageId, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_SIZE {
            return Err(PageDbError::KeyTooLarge {
                len: key.len(),
                max: MAX_KEY_SIZE,
            });
        }
        if value.len() > MAX_VAL_SIZE {
            return Err(PageDbError::ValueTooLarge {
                len: value.len(),
                max: MAX_VAL_SIZE,
            });
        }
        self.set_pointer(idx, pointer)?;

        let pos = self.kv_pos(idx)?;
        let entry_len = ENTRY_HEADER_SIZE + key.len() + value.len();
        check(pos + entry_len <= self.capacity(), || {
            format!(
                "entry {} ({} bytes at {}) overruns a {}-byte buffer",
                idx,
                entry_len,
                pos,
                self.capacity()
            )
        })?;

        self.write_u16(pos, key.len() as u16);
        self.write_u16(pos + 2, value.len() as u16);
        let key_start = pos + ENTRY_HEADER_SIZE;
        self.data[key_start..key_start + key.len()].copy_from_slice(key);
        let val_start = key_start + key.len();
        self.data[val_start..val_start + value.len()].copy_from_slice(value);

        let end = self.offset(idx)? as usize + entry_len;
        let offset_pos = self.offset_pos(idx as usize + 1);
        self.write_u16(offset_pos, end as u16);
        Ok(())
    }

    /// Append `count` entries of `src` starting at `src_start` into slots
    /// starting at `dst_start`. Entries are re-encoded, pointers included.
    pub fn copy_range(&mut self, src: &Node, dst_start: u16, src_start: u16, count: u16) -> Result<()> {
        check(src_start as usize + count as usize <= src.nkeys() as usize, || {
            format!(
                "source range {}..{} exceeds nkeys={}",
                src_start,
                src_start as usize + count as usize,
                src.nkeys()
            )
        })?;
        for i in 0..count {
            let entry = src.entry(src_start + i)?;
            self.append_entry(dst_start + i, entry.pointer, entry.key, entry.value)?;
        }
        Ok(())
    }

    /// Size of the node as currently populated: header, arrays and KV region.
    pub fn total_size(&self) -> usize {
        self.kv_start() + self.offset_unchecked(self.nkeys() as usize) as usize
    }

    pub fn entries(&self) -> Entries<'_> {
        Entries {
            node: self,
            next: 0,
        }
    }

    // --- Raw helpers ---

    fn check_index(&self, idx: u16) -> Result<()> {
        check(idx < self.nkeys(), || {
            format!("entry index {} out of range (nkeys={})", idx, self.nkeys())
        })
    }

    fn view(&self, start: usize, len: usize) -> Result<&[u8]> {
        self.data.get(start..start + len).ok_or_else(|| {
            PageDbError::Corruption(format!(
                "{} bytes at {} run past the node buffer",
                len, start
            ))
        })
    }

    fn read_u16(&self, pos: usize) -> u16 {
        u16::from_le_bytes(self.data[pos..pos + 2].try_into().unwrap())
    }

    fn write_u16(&mut self, pos: usize, v: u16) {
        self.data[pos..pos + 2].copy_from_slice(&v.to_le_bytes());
    }
}

impl Default for Node {
    fn default() -> Self {
        Node::new()
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Node");
        match self.node_type() {
            Ok(t) => s.field("type", &t),
            Err(_) => s.field("type", &self.read_u16(0)),
        };
        s.field("nkeys", &self.nkeys())
            .field("size", &self.total_size())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Iterator over the entries of a node, in index order.
pub struct Entries<'a> {
    node: &'a Node,
    next: u16,
}

impl<'a> Iterator for Entries<'a> {
    type Item = Result<Entry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.node.nkeys() {
            return None;
        }
        let idx = self.next;
        self.next += 1;
        Some(self.node.entry(idx))
    }
}
