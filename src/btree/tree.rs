/// B-tree handle: the root page number plus read-only descent.
///
/// Nodes are copy-on-write, so the root is replaced, never edited, after a
/// structural change. Tree-level insert and delete live with the caller; this
/// handle only tracks the root and resolves lookups.
use crate::btree::locate::{find_child, find_last_le};
use crate::btree::node::NodeType;
use crate::btree::split::Split;
use crate::error::{PageDbError, Result};
use crate::storage::page::{PageId, NULL_PAGE};
use crate::storage::page_store::PageStore;

/// Maximum B-tree depth to prevent looping forever on a corrupted tree.
const MAX_BTREE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BTree {
    root: PageId,
}

impl BTree {
    /// An empty tree (root 0).
    pub fn new() -> Self {
        BTree { root: NULL_PAGE }
    }

    /// Open an existing tree given its root page number.
    pub fn open(root: PageId) -> Self {
        BTree { root }
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root == NULL_PAGE
    }

    /// Point the tree at a new root. Returns the previous root so the caller
    /// can free it once nothing references it.
    pub fn set_root(&mut self, root: PageId) -> PageId {
        std::mem::replace(&mut self.root, root)
    }

    /// Look up `key`, descending from the root through internal nodes.
    pub fn get(&self, store: &mut impl PageStore, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut page_id = self.root;
        for _ in 0..MAX_BTREE_DEPTH {
            let node = store.get(page_id)?;
            match node.node_type()? {
                NodeType::Leaf => {
                    if let Some(idx) = find_last_le(&node, key)? {
                        if node.key(idx)? == key {
                            return Ok(Some(node.value(idx)?.to_vec()));
                        }
                    }
                    return Ok(None);
                }
                NodeType::Internal => match find_child(&node, key)? {
                    Some(child) => page_id = child,
                    None => return Ok(None),
                },
            }
        }
        Err(PageDbError::Corruption(
            "B-tree depth exceeds maximum (possible cycle)".into(),
        ))
    }
}

/// Allocate a page for every node of `split`, in key order.
pub fn allocate_split(store: &mut impl PageStore, split: Split) -> Result<Vec<PageId>> {
    split
        .into_nodes()
        .into_iter()
        .map(|node| store.allocate(node))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::leaf::leaf_insert;
    use crate::btree::node::Node;
    use crate::btree::split::split;
    use crate::storage::mem_store::MemPageStore;

    #[test]
    fn test_empty_tree() {
        let mut store = MemPageStore::new();
        let tree = BTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.get(&mut store, b"k").unwrap(), None);
    }

    #[test]
    fn test_single_leaf_lookup() {
        let mut store = MemPageStore::new();
        let empty = Node::empty(NodeType::Leaf);
        let one = leaf_insert(&empty, 0, b"b", b"2").unwrap();
        let two = leaf_insert(&one, 0, b"a", b"1").unwrap();
        let root = allocate_split(&mut store, split(two).unwrap()).unwrap();
        assert_eq!(root.len(), 1);

        let mut tree = BTree::new();
        assert_eq!(tree.set_root(root[0]), NULL_PAGE);
        assert_eq!(tree.get(&mut store, b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(tree.get(&mut store, b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(tree.get(&mut store, b"c").unwrap(), None);
        assert_eq!(tree.get(&mut store, b"0").unwrap(), None);
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut store = MemPageStore::new();
        let mut node = Node::new();
        node.set_header(NodeType::Internal, 1).unwrap();
        // Page 1 points at itself.
        node.append_entry(0, 1, b"", b"").unwrap();
        let id = store.allocate(node).unwrap();
        assert_eq!(id, 1);
        let tree = BTree::open(id);
        assert!(matches!(
            tree.get(&mut store, b"x"),
            Err(PageDbError::Corruption(_))
        ));
    }
}
