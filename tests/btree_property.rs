/// Randomized workloads over the node primitives.
///
/// Keeps a flat list of leaves (each covering a key range), applies inserts
/// and updates through leaf_insert/leaf_update/split, and checks:
/// - every stored node fits in a page
/// - keys stay strictly increasing within and across leaves
/// - split pieces concatenate back to their input
/// - lookups through a tree built on top of the leaves match a BTreeMap
use std::collections::BTreeMap;

use pagedb::btree::tree::allocate_split;
use pagedb::storage::page::{MAX_KEY_SIZE, MAX_VAL_SIZE};
use pagedb::{
    find_last_le, leaf_insert, leaf_update, split, BTree, MemPageStore, Node, NodeType, PageId,
    PageStore, PAGE_SIZE,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

type Pairs = Vec<(Vec<u8>, Vec<u8>)>;

fn pairs(node: &Node) -> Pairs {
    node.entries()
        .map(|e| {
            let e = e.unwrap();
            (e.key.to_vec(), e.value.to_vec())
        })
        .collect()
}

fn assert_sorted(keys: &[Vec<u8>]) {
    for w in keys.windows(2) {
        assert!(w[0] < w[1], "order violated: {:?} >= {:?}", w[0], w[1]);
    }
}

/// Insert or update `key` in `leaf`, split, and check the split invariants.
fn upsert(leaf: &Node, key: &[u8], value: &[u8]) -> Vec<Node> {
    let updated = match find_last_le(leaf, key).unwrap() {
        Some(idx) if leaf.key(idx).unwrap() == key => leaf_update(leaf, idx, key, value).unwrap(),
        Some(idx) => leaf_insert(leaf, idx + 1, key, value).unwrap(),
        None => leaf_insert(leaf, 0, key, value).unwrap(),
    };
    let before = pairs(&updated);
    let oversized = updated.total_size() > PAGE_SIZE;

    let result = split(updated).unwrap();
    if oversized {
        assert!(result.count() >= 2);
    } else {
        assert_eq!(result.count(), 1);
    }
    let pieces = result.into_nodes();
    let mut after = Vec::new();
    for piece in &pieces {
        assert!(piece.total_size() <= PAGE_SIZE);
        assert_eq!(piece.capacity(), PAGE_SIZE);
        assert!(piece.nkeys() >= 1);
        after.extend(pairs(piece));
    }
    assert_eq!(after, before, "split lost or reordered entries");
    pieces
}

fn random_key(rng: &mut StdRng, max_len: usize) -> Vec<u8> {
    let len = rng.gen_range(1..=max_len);
    (0..len).map(|_| rng.gen_range(b'a'..=b'e')).collect()
}

fn random_value(rng: &mut StdRng) -> Vec<u8> {
    let len = if rng.gen_bool(0.1) {
        MAX_VAL_SIZE
    } else {
        rng.gen_range(0..400)
    };
    vec![rng.gen(); len]
}

/// Index of the leaf whose range covers `key`.
fn route(leaves: &[Node], key: &[u8]) -> usize {
    let mut idx = 0;
    for (i, leaf) in leaves.iter().enumerate().skip(1) {
        if leaf.key(0).unwrap() <= key {
            idx = i;
        }
    }
    idx
}

fn run_workload(seed: u64, ops: usize, max_key: usize) -> (Vec<Node>, BTreeMap<Vec<u8>, Vec<u8>>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut leaves = vec![Node::empty(NodeType::Leaf)];
    let mut expected = BTreeMap::new();

    for _ in 0..ops {
        let key = random_key(&mut rng, max_key);
        let value = random_value(&mut rng);
        let i = route(&leaves, &key);
        let pieces = upsert(&leaves[i], &key, &value);
        leaves.splice(i..=i, pieces);
        expected.insert(key, value);
    }
    (leaves, expected)
}

#[test]
fn test_random_upserts_keep_invariants() {
    for seed in 0..4 {
        let (leaves, expected) = run_workload(seed, 400, 12);

        let all: Pairs = leaves.iter().flat_map(pairs).collect();
        let keys: Vec<Vec<u8>> = all.iter().map(|(k, _)| k.clone()).collect();
        assert_sorted(&keys);
        assert_eq!(all, expected.into_iter().collect::<Pairs>());
    }
}

#[test]
fn test_max_size_keys_split_within_three_pages() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut leaf = Node::empty(NodeType::Leaf);
    for _ in 0..200 {
        let key_len = if rng.gen_bool(0.5) { MAX_KEY_SIZE } else { rng.gen_range(1..50) };
        let key: Vec<u8> = (0..key_len).map(|_| rng.gen_range(b'a'..=b'z')).collect();
        let value = vec![7u8; rng.gen_range(0..=MAX_VAL_SIZE)];
        let pieces = upsert(&leaf, &key, &value);
        assert!(pieces.len() <= 3);
        // Keep working on a random piece so the leaf stays near full.
        leaf = pieces[rng.gen_range(0..pieces.len())].clone();
    }
}

/// Build one level of internal nodes over `children` (page id, first key).
fn build_level(store: &mut MemPageStore, children: &[(PageId, Vec<u8>)]) -> Vec<(PageId, Vec<u8>)> {
    let mut parents = Vec::new();
    for chunk in children.chunks(100) {
        let mut node = Node::scratch();
        node.set_header(NodeType::Internal, chunk.len() as u16).unwrap();
        for (i, (page_id, key)) in chunk.iter().enumerate() {
            node.append_entry(i as u16, *page_id, key, b"").unwrap();
        }
        let pieces = split(node).unwrap().into_nodes();
        for piece in pieces {
            let first = piece.key(0).unwrap().to_vec();
            let id = store.allocate(piece).unwrap();
            parents.push((id, first));
        }
    }
    parents
}

#[test]
fn test_lookup_through_built_tree() {
    let (leaves, expected) = run_workload(7, 600, 40);
    let mut store = MemPageStore::new();

    let mut level: Vec<(PageId, Vec<u8>)> = leaves
        .into_iter()
        .map(|leaf| {
            let first = leaf.key(0).unwrap().to_vec();
            (store.allocate(leaf).unwrap(), first)
        })
        .collect();
    while level.len() > 1 {
        level = build_level(&mut store, &level);
    }

    let tree = BTree::open(level[0].0);
    for (key, value) in &expected {
        assert_eq!(tree.get(&mut store, key).unwrap().as_ref(), Some(value));
    }
    assert_eq!(tree.get(&mut store, b"zzz-missing").unwrap(), None);
    // Every generated key starts with a..e, so "A" precedes the whole tree.
    assert_eq!(tree.get(&mut store, b"A").unwrap(), None);
}

#[test]
fn test_copy_on_write_replace_and_free() {
    let mut store = MemPageStore::new();
    let mut tree = BTree::new();

    let first = leaf_insert(&Node::empty(NodeType::Leaf), 0, b"k1", b"v1").unwrap();
    let ids = allocate_split(&mut store, split(first).unwrap()).unwrap();
    tree.set_root(ids[0]);

    let old = store.get(tree.root()).unwrap();
    let updated = leaf_update(&old, 0, b"k1", b"v2").unwrap();
    let ids = allocate_split(&mut store, split(updated).unwrap()).unwrap();
    let previous = tree.set_root(ids[0]);
    store.free(previous).unwrap();

    assert_eq!(tree.get(&mut store, b"k1").unwrap(), Some(b"v2".to_vec()));
    assert!(!store.contains(previous));
    // The node we read earlier was never touched.
    assert_eq!(old.value(0).unwrap(), b"v1");
}
