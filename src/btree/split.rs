/// Splitting an oversized node into page-sized nodes.
///
/// A node produced by one leaf insertion is at most a full page plus one
/// maximal entry, so it always splits into at most three pages.
use tracing::debug;

use crate::btree::node::{encoded_size, Node};
use crate::error::{check, Result};
use crate::storage::page::{NODE_HEADER_SIZE, PAGE_SIZE};

/// Outcome of `split`. Nodes are in key order and each fits in a page.
#[derive(Debug)]
pub enum Split {
    One(Node),
    Two(Node, Node),
    Three(Node, Node, Node),
}

impl Split {
    pub fn count(&self) -> usize {
        match self {
            Split::One(_) => 1,
            Split::Two(..) => 2,
            Split::Three(..) => 3,
        }
    }

    pub fn into_nodes(self) -> Vec<Node> {
        match self {
            Split::One(a) => vec![a],
            Split::Two(a, b) => vec![a, b],
            Split::Three(a, b, c) => vec![a, b, c],
        }
    }
}

/// Split `old` in two so that the right half fits a page.
/// The left half may still be oversized; it comes back in a scratch buffer.
fn split_two(old: &Node) -> Result<(Node, Node)> {
    let n = old.nkeys();
    check(n >= 2, || format!("cannot split a node with {} entries", n))?;
    let node_type = old.node_type()?;
    let total = old.total_size();

    let left_bytes = |nleft: u16| -> Result<usize> {
        Ok(encoded_size(nleft as usize, old.offset(nleft)? as usize))
    };
    let right_bytes = |nleft: u16| -> Result<usize> {
        Ok(total - left_bytes(nleft)? + NODE_HEADER_SIZE)
    };

    let mut nleft = n / 2;
    while nleft > 0 && left_bytes(nleft)? > PAGE_SIZE {
        nleft -= 1;
    }
    check(nleft >= 1, || "left half is empty after shrinking".into())?;
    while nleft < n && right_bytes(nleft)? > PAGE_SIZE {
        nleft += 1;
    }
    check(nleft < n, || "right half is empty after growing".into())?;
    let nright = n - nleft;

    let mut left = Node::scratch();
    left.set_header(node_type, nleft)?;
    left.copy_range(old, 0, 0, nleft)?;

    let mut right = Node::new();
    right.set_header(node_type, nright)?;
    right.copy_range(old, 0, nleft, nright)?;
    check(right.total_size() <= PAGE_SIZE, || {
        format!("right half of {} bytes exceeds a page", right.total_size())
    })?;

    Ok((left, right))
}

/// Break `old` into 1, 2 or 3 page-sized nodes holding the same entries in order.
///
/// The caller allocates a page for each returned node and frees the page that held `old`.
pub fn split(old: Node) -> Result<Split> {
    let size = old.total_size();
    if size <= PAGE_SIZE {
        return Ok(Split::One(old.into_page()?));
    }

    let (left, right) = split_two(&old)?;
    let result = if left.total_size() <= PAGE_SIZE {
        Split::Two(left.into_page()?, right)
    } else {
        let (most_left, middle) = split_two(&left)?;
        check(most_left.total_size() <= PAGE_SIZE, || {
            format!(
                "node of {} bytes needs more than a 3-way split",
                size
            )
        })?;
        Split::Three(most_left.into_page()?, middle, right)
    };

    debug!(
        size,
        nkeys = old.nkeys(),
        pieces = result.count(),
        "btree.split"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::node::NodeType;
    use crate::storage::page::{MAX_KEY_SIZE, MAX_VAL_SIZE};

    fn scratch_leaf(entries: &[(Vec<u8>, Vec<u8>)]) -> Node {
        let mut node = Node::scratch();
        node.set_header(NodeType::Leaf, entries.len() as u16).unwrap();
        for (i, (k, v)) in entries.iter().enumerate() {
            node.append_entry(i as u16, 0, k, v).unwrap();
        }
        node
    }

    fn keys(nodes: &[Node]) -> Vec<Vec<u8>> {
        nodes
            .iter()
            .flat_map(|n| (0..n.nkeys()).map(move |i| n.key(i).unwrap().to_vec()))
            .collect()
    }

    #[test]
    fn test_small_node_is_not_split() {
        let node = scratch_leaf(&[(b"a".to_vec(), b"1".to_vec())]);
        let split = split(node).unwrap();
        assert_eq!(split.count(), 1);
        let nodes = split.into_nodes();
        assert_eq!(nodes[0].capacity(), PAGE_SIZE);
        assert_eq!(nodes[0].key(0).unwrap(), b"a");
    }

    #[test]
    fn test_two_way_split() {
        let entries: Vec<_> = (0..3u8)
            .map(|i| (vec![b'a' + i], vec![i; 1500]))
            .collect();
        let node = scratch_leaf(&entries);
        assert!(node.total_size() > PAGE_SIZE);

        let split = split(node).unwrap();
        assert_eq!(split.count(), 2);
        let nodes = split.into_nodes();
        for n in &nodes {
            assert!(n.total_size() <= PAGE_SIZE);
            assert_eq!(n.node_type().unwrap(), NodeType::Leaf);
        }
        assert_eq!(keys(&nodes), vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn test_three_way_split() {
        // Small, big, small: no two-way cut leaves both sides under a page.
        let big_key = vec![b'm'; MAX_KEY_SIZE];
        let big_val = vec![0u8; MAX_VAL_SIZE];
        let mut entries = Vec::new();
        for i in 0..20u8 {
            entries.push((vec![b'a', i], vec![1u8; 80]));
        }
        entries.push((big_key, big_val));
        for i in 0..20u8 {
            entries.push((vec![b'z', i], vec![2u8; 80]));
        }
        let node = scratch_leaf(&entries);
        assert!(node.total_size() > PAGE_SIZE);

        let split = split(node).unwrap();
        assert_eq!(split.count(), 3);
        let nodes = split.into_nodes();
        for n in &nodes {
            assert!(n.total_size() <= PAGE_SIZE, "piece of {} bytes", n.total_size());
        }
        let expected: Vec<Vec<u8>> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys(&nodes), expected);
    }

    #[test]
    fn test_split_keeps_internal_pointers() {
        let mut node = Node::scratch();
        node.set_header(NodeType::Internal, 6).unwrap();
        for i in 0..6u16 {
            let key = vec![b'a' + i as u8; MAX_KEY_SIZE];
            node.append_entry(i, 1000 + i as u64, &key, b"").unwrap();
        }
        assert!(node.total_size() > PAGE_SIZE);
        let nodes = split(node).unwrap().into_nodes();
        assert!(nodes.len() >= 2);
        let pointers: Vec<u64> = nodes
            .iter()
            .flat_map(|n| (0..n.nkeys()).map(move |i| n.pointer(i).unwrap()))
            .collect();
        assert_eq!(pointers, (1000..1006).collect::<Vec<u64>>());
        for n in &nodes {
            assert_eq!(n.node_type().unwrap(), NodeType::Internal);
        }
    }

    #[test]
    fn test_single_entry_cannot_split() {
        assert!(split_two(&scratch_leaf(&[(b"a".to_vec(), b"1".to_vec())]))
            .unwrap_err()
            .is_invariant());
    }
}
