/// Crash-safe whole-file writes.
///
/// `write_atomic` goes through a sibling temp file:
///   write payload -> fsync -> rename over target -> fsync parent directory
/// so readers of the target see either the old or the new content, never a mix.
/// Writers of the same target must be serialized by the caller.
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::error::{PageDbError, Result};
use crate::storage::page::TEMP_SUFFIX_RANGE;

/// Point at which an injected failure aborts a write.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFailpoint {
    /// Payload written, not yet synced.
    AfterWrite,
    /// Payload synced, not yet renamed into place.
    BeforeRename,
}

pub struct DurableWriter<R = StdRng> {
    rng: R,
    #[cfg(any(test, feature = "test-utils"))]
    failpoint: Option<WriteFailpoint>,
}

impl DurableWriter<StdRng> {
    /// Writer whose temp-file suffixes come from an entropy-seeded generator.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for DurableWriter<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> DurableWriter<R> {
    pub fn with_rng(rng: R) -> Self {
        DurableWriter {
            rng,
            #[cfg(any(test, feature = "test-utils"))]
            failpoint: None,
        }
    }

    /// Make the next writes fail at `failpoint` until cleared with `None`.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_failpoint(&mut self, failpoint: Option<WriteFailpoint>) {
        self.failpoint = failpoint;
    }

    #[cfg(any(test, feature = "test-utils"))]
    fn hit(&self, at: WriteFailpoint) -> io::Result<()> {
        if self.failpoint == Some(at) {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("injected failure at {:?}", at),
            ));
        }
        Ok(())
    }

    /// `<path>.tmp.<n>` with `n` drawn from `[0, TEMP_SUFFIX_RANGE)`.
    pub fn temp_path(&mut self, path: &Path) -> PathBuf {
        let suffix = self.rng.gen_range(0..TEMP_SUFFIX_RANGE);
        let mut name = OsString::from(path.as_os_str());
        name.push(format!(".tmp.{}", suffix));
        PathBuf::from(name)
    }

    /// Create `path` with `bytes`, failing with `AlreadyExists` if it is already there.
    ///
    /// Intended for one-time initialization. If the write or sync fails the
    /// new file is removed again.
    pub fn write_exclusive(&mut self, path: &Path, bytes: &[u8]) -> Result<()> {
        let file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(PageDbError::AlreadyExists(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.fill(file, bytes) {
            discard(path);
            return Err(e.into());
        }
        sync_parent(path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "durable.write_exclusive");
        Ok(())
    }

    /// Replace the content of `path` with `bytes` atomically.
    ///
    /// A temp-name collision is reported as an I/O error, not retried. On any
    /// failure before the rename the temp file is removed and `path` is untouched.
    pub fn write_atomic(&mut self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = self.temp_path(path);
        // Never clean up a temp file we did not create.
        let file = OpenOptions::new().write(true).create_new(true).open(&tmp)?;

        let staged = self.fill(file, bytes).and_then(|()| {
            #[cfg(any(test, feature = "test-utils"))]
            self.hit(WriteFailpoint::BeforeRename)?;
            fs::rename(&tmp, path)
        });
        if let Err(e) = staged {
            discard(&tmp);
            return Err(e.into());
        }

        sync_parent(path)?;
        debug!(path = %path.display(), bytes = bytes.len(), "durable.write_atomic");
        Ok(())
    }

    /// Write the payload and sync it, closing the file on return.
    fn fill(&self, mut file: File, bytes: &[u8]) -> io::Result<()> {
        file.write_all(bytes)?;
        #[cfg(any(test, feature = "test-utils"))]
        self.hit(WriteFailpoint::AfterWrite)?;
        file.sync_all()
    }
}

fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "durable.cleanup_failed");
        }
    }
}

/// Persist the directory entry so a completed rename or create survives a crash.
#[cfg(unix)]
fn sync_parent(path: &Path) -> io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}
