use crate::error::{check, Result};
use crate::storage::page::{PageId, NULL_PAGE};

/// Free page numbers awaiting reuse. The most recently freed page is handed out first.
#[derive(Debug, Default, Clone)]
pub struct FreeList {
    free_pages: Vec<PageId>,
}

impl FreeList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted list, rejecting page 0 and duplicates.
    pub fn from_pages(pages: Vec<PageId>) -> Result<Self> {
        let mut list = FreeList::new();
        for page_id in pages {
            list.free(page_id)?;
        }
        Ok(list)
    }

    /// Take a free page. Returns None if no free pages available.
    pub fn allocate(&mut self) -> Option<PageId> {
        self.free_pages.pop()
    }

    /// Return a page to the free list. Freeing page 0 or freeing twice is an invariant violation.
    pub fn free(&mut self, page_id: PageId) -> Result<()> {
        check(page_id != NULL_PAGE, || "page 0 cannot be freed".into())?;
        check(!self.free_pages.contains(&page_id), || {
            format!("double-free detected: page {} is already in freelist", page_id)
        })?;
        self.free_pages.push(page_id);
        Ok(())
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.free_pages.contains(&page_id)
    }

    pub fn len(&self) -> usize {
        self.free_pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.free_pages.is_empty()
    }

    pub fn pages(&self) -> &[PageId] {
        &self.free_pages
    }
}
