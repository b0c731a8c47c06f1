/// Key search within a single node.
use std::cmp::Ordering;

use crate::btree::node::{Node, NodeType};
use crate::error::{PageDbError, Result};
use crate::storage::page::PageId;

/// Index of the last key that is `<= key`, or `None` if every stored key is
/// greater than `key` (including the empty node).
///
/// Relies on keys being strictly increasing; uses a binary search.
pub fn find_last_le(node: &Node, key: &[u8]) -> Result<Option<u16>> {
    let (mut lo, mut hi) = (0u16, node.nkeys());
    // Invariant: keys[..lo] <= key < keys[hi..]
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        match node.key(mid)?.cmp(key) {
            Ordering::Less | Ordering::Equal => lo = mid + 1,
            Ordering::Greater => hi = mid,
        }
    }
    Ok(lo.checked_sub(1))
}

/// Child page to descend into for `key` in an internal node.
/// `None` if `key` sorts before the first separator.
pub fn find_child(node: &Node, key: &[u8]) -> Result<Option<PageId>> {
    if node.node_type()? != NodeType::Internal {
        return Err(PageDbError::Invariant(
            "find_child called on a leaf node".into(),
        ));
    }
    match find_last_le(node, key)? {
        Some(idx) => Ok(Some(node.pointer(idx)?)),
        None => Ok(None),
    }
}
