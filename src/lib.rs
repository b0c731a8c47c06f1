//! pagedb: node encoding and mutation core of a disk-backed B+tree key-value store.
//!
//! - Fixed 4096-byte page format with variable-length keys and values
//! - Copy-on-write leaf insert/update producing new node buffers
//! - Splitting an oversized node into 1-3 page-sized nodes
//! - Search primitive for descending the tree
//! - Crash-atomic whole-file writes (temp file + fsync + rename)
//!
//! Page allocation is delegated to a `PageStore` implementation.

pub mod btree;
pub mod error;
pub mod storage;

pub use crate::btree::leaf::{leaf_insert, leaf_update};
pub use crate::btree::locate::{find_child, find_last_le};
pub use crate::btree::node::{Entry, Node, NodeType};
pub use crate::btree::split::{split, Split};
pub use crate::btree::tree::BTree;
pub use crate::error::{PageDbError, Result};
pub use crate::storage::durable::DurableWriter;
pub use crate::storage::mem_store::MemPageStore;
pub use crate::storage::page::{PageId, PAGE_SIZE};
pub use crate::storage::page_store::PageStore;
