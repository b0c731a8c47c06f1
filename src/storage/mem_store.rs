/// In-memory `PageStore`, persisted as a single page file.
///
/// Page file layout:
///   page 0:        [magic "PAGEDB01"] [version: u32] [page_count: u64] [root: u64] [free_count: u64]
///   pages 1..N:    node images, PAGE_SIZE bytes each (free slots zero-filled)
///   trailer:       free_count × u64 free page numbers
///
/// The whole file is rewritten on every save through `DurableWriter`, so a
/// crash mid-save leaves the previous file intact.
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use rand::Rng;
use tracing::debug;

use crate::btree::node::Node;
use crate::error::{check, PageDbError, Result};
use crate::storage::durable::DurableWriter;
use crate::storage::freelist::FreeList;
use crate::storage::page::{PageId, NULL_PAGE, PAGE_SIZE};
use crate::storage::page_store::PageStore;

const MAGIC: &[u8; 8] = b"PAGEDB01";
const VERSION: u32 = 1;
const FILE_HEADER_SIZE: usize = 8 + 4 + 8 + 8 + 8;

/// Header of a saved page file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: u32,
    /// Number of page slots including the header page.
    pub page_count: u64,
    pub root: PageId,
    pub free_count: u64,
}

impl FileHeader {
    fn encode(&self) -> [u8; FILE_HEADER_SIZE] {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        buf[0..8].copy_from_slice(MAGIC);
        buf[8..12].copy_from_slice(&self.version.to_le_bytes());
        buf[12..20].copy_from_slice(&self.page_count.to_le_bytes());
        buf[20..28].copy_from_slice(&self.root.to_le_bytes());
        buf[28..36].copy_from_slice(&self.free_count.to_le_bytes());
        buf
    }

    /// Parse the header from the start of a page file.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PAGE_SIZE {
            return Err(PageDbError::Corruption(format!(
                "page file of {} bytes is shorter than its header page",
                bytes.len()
            )));
        }
        if &bytes[0..8] != MAGIC {
            return Err(PageDbError::Corruption("bad page file magic".into()));
        }
        let header = FileHeader {
            version: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            page_count: u64::from_le_bytes(bytes[12..20].try_into().unwrap()),
            root: u64::from_le_bytes(bytes[20..28].try_into().unwrap()),
            free_count: u64::from_le_bytes(bytes[28..36].try_into().unwrap()),
        };
        if header.version != VERSION {
            return Err(PageDbError::Corruption(format!(
                "unsupported page file version {}",
                header.version
            )));
        }
        if header.page_count == 0 {
            return Err(PageDbError::Corruption("page_count must include the header page".into()));
        }
        Ok(header)
    }

    fn file_len(&self) -> Option<usize> {
        let pages = usize::try_from(self.page_count).ok()?.checked_mul(PAGE_SIZE)?;
        let trailer = usize::try_from(self.free_count).ok()?.checked_mul(8)?;
        pages.checked_add(trailer)
    }
}

pub struct MemPageStore {
    pages: HashMap<PageId, Node>,
    /// Next never-used page number. Page 0 is the file header and is never issued.
    next_page: PageId,
    freelist: FreeList,
}

impl MemPageStore {
    pub fn new() -> Self {
        MemPageStore {
            pages: HashMap::new(),
            next_page: 1,
            freelist: FreeList::new(),
        }
    }

    /// Number of live pages.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page slots ever issued, plus the header slot.
    pub fn page_count(&self) -> u64 {
        self.next_page
    }

    pub fn free_count(&self) -> usize {
        self.freelist.len()
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.contains_key(&page_id)
    }

    /// Live page numbers in ascending order.
    pub fn page_ids(&self) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self.pages.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Serialize every page into the page-file format with `root` recorded in the header.
    pub fn encode(&self, root: PageId) -> Result<Vec<u8>> {
        check(root == NULL_PAGE || self.contains(root), || {
            format!("root page {} is not live", root)
        })?;
        let header = FileHeader {
            version: VERSION,
            page_count: self.next_page,
            root,
            free_count: self.freelist.len() as u64,
        };
        let len = header
            .file_len()
            .ok_or_else(|| PageDbError::Invariant("page file size overflows usize".into()))?;

        let mut buf = vec![0u8; len];
        buf[..FILE_HEADER_SIZE].copy_from_slice(&header.encode());
        for (&page_id, node) in &self.pages {
            let start = page_id as usize * PAGE_SIZE;
            buf[start..start + PAGE_SIZE].copy_from_slice(&node.as_bytes()[..PAGE_SIZE]);
        }
        let mut pos = self.next_page as usize * PAGE_SIZE;
        for &page_id in self.freelist.pages() {
            buf[pos..pos + 8].copy_from_slice(&page_id.to_le_bytes());
            pos += 8;
        }
        Ok(buf)
    }

    /// Decode a page file produced by `encode`. Returns the store and its root.
    pub fn decode(bytes: &[u8]) -> Result<(Self, PageId)> {
        let header = FileHeader::decode(bytes)?;
        let expected = header
            .file_len()
            .ok_or_else(|| PageDbError::Corruption("page file header sizes overflow".into()))?;
        if bytes.len() != expected {
            return Err(PageDbError::Corruption(format!(
                "page file is {} bytes, header implies {}",
                bytes.len(),
                expected
            )));
        }

        let trailer_start = header.page_count as usize * PAGE_SIZE;
        let free: Vec<PageId> = bytes[trailer_start..]
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
            .collect();
        if let Some(&bad) = free.iter().find(|&&p| p >= header.page_count) {
            return Err(PageDbError::Corruption(format!(
                "free page {} beyond page_count {}",
                bad, header.page_count
            )));
        }
        let freelist = FreeList::from_pages(free)
            .map_err(|e| PageDbError::Corruption(format!("bad free list: {}", e)))?;

        let mut pages = HashMap::new();
        for page_id in 1..header.page_count {
            if freelist.contains(page_id) {
                continue;
            }
            let start = page_id as usize * PAGE_SIZE;
            let node = Node::from_page(&bytes[start..start + PAGE_SIZE])
                .map_err(|e| PageDbError::Corruption(format!("page {}: {}", page_id, e)))?;
            pages.insert(page_id, node);
        }

        if header.root != NULL_PAGE && !pages.contains_key(&header.root) {
            return Err(PageDbError::Corruption(format!(
                "root page {} is not a live page",
                header.root
            )));
        }

        let store = MemPageStore {
            pages,
            next_page: header.page_count,
            freelist,
        };
        Ok((store, header.root))
    }

    /// Atomically replace the page file at `path`.
    pub fn save<R: Rng>(&self, writer: &mut DurableWriter<R>, path: &Path, root: PageId) -> Result<()> {
        let bytes = self.encode(root)?;
        writer.write_atomic(path, &bytes)?;
        debug!(
            path = %path.display(),
            pages = self.pages.len(),
            free = self.freelist.len(),
            root,
            "mem_store.save"
        );
        Ok(())
    }

    /// Write the page file at `path` for the first time. Fails with `AlreadyExists`
    /// if a file is already there.
    pub fn create<R: Rng>(&self, writer: &mut DurableWriter<R>, path: &Path, root: PageId) -> Result<()> {
        let bytes = self.encode(root)?;
        writer.write_exclusive(path, &bytes)
    }

    pub fn load(path: &Path) -> Result<(Self, PageId)> {
        let bytes = fs::read(path)?;
        let (store, root) = Self::decode(&bytes)?;
        debug!(
            path = %path.display(),
            pages = store.pages.len(),
            free = store.freelist.len(),
            root,
            "mem_store.load"
        );
        Ok((store, root))
    }
}

impl Default for MemPageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PageStore for MemPageStore {
    fn get(&mut self, page_id: PageId) -> Result<Node> {
        self.pages
            .get(&page_id)
            .cloned()
            .ok_or(PageDbError::PageNotFound(page_id))
    }

    fn allocate(&mut self, node: Node) -> Result<PageId> {
        node.validate().map_err(|e| match e {
            PageDbError::Corruption(msg) => {
                PageDbError::Invariant(format!("refusing to store malformed node: {}", msg))
            }
            other => other,
        })?;
        let node = node.into_page()?;
        let page_id = match self.freelist.allocate() {
            Some(id) => id,
            None => {
                let id = self.next_page;
                self.next_page += 1;
                id
            }
        };
        self.pages.insert(page_id, node);
        Ok(page_id)
    }

    fn free(&mut self, page_id: PageId) -> Result<()> {
        if self.pages.remove(&page_id).is_none() {
            return Err(PageDbError::PageNotFound(page_id));
        }
        self.freelist.free(page_id)
    }
}
