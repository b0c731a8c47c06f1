/// Copy-on-write leaf mutations.
///
/// Both operations build a new scratch-sized node and leave `old` untouched.
/// The result may exceed `PAGE_SIZE`; `split::split` brings it back to page size.
use crate::btree::node::{Node, NodeType};
use crate::error::{check, PageDbError, Result};
use crate::storage::page::{MAX_KEY_SIZE, MAX_VAL_SIZE};

fn check_kv(key: &[u8], value: &[u8]) -> Result<()> {
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
    Ok(())
}

fn check_leaf(old: &Node) -> Result<()> {
    let node_type = old.node_type()?;
    check(node_type == NodeType::Leaf, || {
        format!("expected a leaf node, got {:?}", node_type)
    })
}

/// New leaf with `(key, value)` inserted at `idx`; entries from `idx` on shift up by one.
pub fn leaf_insert(old: &Node, idx: u16, key: &[u8], value: &[u8]) -> Result<Node> {
    check_leaf(old)?;
    check_kv(key, value)?;
    let n = old.nkeys();
    check(idx <= n, || format!("insert index {} out of range (nkeys={})", idx, n))?;
    check(n < u16::MAX, || "leaf entry count overflow".into())?;

    let mut new = Node::scratch();
    new.set_header(NodeType::Leaf, n + 1)?;
    new.copy_range(old, 0, 0, idx)?;
    new.append_entry(idx, 0, key, value)?;
    new.copy_range(old, idx + 1, idx, n - idx)?;
    Ok(new)
}

/// New leaf with entry `idx` replaced by `(key, value)`.
///
/// Does not check that `key` equals the old key; choosing between insert and
/// update is up to the caller.
pub fn leaf_update(old: &Node, idx: u16, key: &[u8], value: &[u8]) -> Result<Node> {
    check_leaf(old)?;
    check_kv(key, value)?;
    let n = old.nkeys();
    check(idx < n, || format!("update index {} out of range (nkeys={})", idx, n))?;

    let mut new = Node::scratch();
    new.set_header(NodeType::Leaf, n)?;
    new.copy_range(old, 0, 0, idx)?;
    new.append_entry(idx, 0, key, value)?;
    new.copy_range(old, idx + 1, idx + 1, n - idx - 1)?;
    Ok(new)
}
