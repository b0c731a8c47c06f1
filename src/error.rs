use std::path::PathBuf;

use thiserror::Error;

use crate::storage::page::PageId;

#[derive(Error, Debug)]
pub enum PageDbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Key too large: {len} bytes (max {max})")]
    KeyTooLarge { len: usize, max: usize },

    #[error("Value too large: {len} bytes (max {max})")]
    ValueTooLarge { len: usize, max: usize },

    #[error("Invalid node type: {0}")]
    InvalidNodeType(u16),

    #[error("Page not found: page_id={0}")]
    PageNotFound(PageId),

    #[error("Data corruption: {0}")]
    Corruption(String),
}

impl PageDbError {
    /// True for programming-error faults raised by the node layer.
    /// These are reproducible from the same inputs and never worth retrying.
    pub fn is_invariant(&self) -> bool {
        matches!(
            self,
            PageDbError::Invariant(_)
                | PageDbError::KeyTooLarge { .. }
                | PageDbError::ValueTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PageDbError>;

/// Fail with `Invariant` unless `cond` holds.
pub(crate) fn check(cond: bool, msg: impl FnOnce() -> String) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(PageDbError::Invariant(msg()))
    }
}
