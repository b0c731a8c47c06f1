use crate::btree::node::Node;
use crate::error::Result;
use crate::storage::page::PageId;

/// Page I/O capability consumed by the B-tree core.
///
/// Implementations own the mapping from page numbers to bytes. Nodes handed
/// to `allocate` are immutable from then on; updates always go to a new page.
pub trait PageStore {
    /// Return the exact node previously passed to `allocate` for `page_id`.
    fn get(&mut self, page_id: PageId) -> Result<Node>;
    /// Persist `node` and return a fresh page number. Never returns 0.
    fn allocate(&mut self, node: Node) -> Result<PageId>;
    /// Mark `page_id` reusable. Must not be reachable from the current root.
    fn free(&mut self, page_id: PageId) -> Result<()>;
}
