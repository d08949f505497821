//! Storage backends for loader entries
//!
//! The backend is picked once from [`Layout`](crate::config::Layout) when
//! the manager is built:
//! - [`ArchiveBackend`]: entries are members of one package archive; the
//!   concurrency-sensitive path with the entry cache and swap scheduler
//! - [`DirectoryBackend`]: entries are plain files in a package directory,
//!   for hosts that predate packed packages

mod archive;
mod directory;

use crate::error::ManifestResult;
use crate::naming::LoaderEntry;

pub use archive::ArchiveBackend;
pub use directory::DirectoryBackend;

/// What [`LoaderBackend::add`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    /// The loader archive or directory was created by this call
    pub created: bool,
    /// The entry was written (false when an identical name already existed)
    pub written: bool,
}

/// Storage for loader entries
pub trait LoaderBackend: Send + Sync {
    /// Whether any entry for `dependency` exists
    fn exists(&self, dependency: &str) -> ManifestResult<bool>;

    /// Store an entry
    fn add(&self, entry: &LoaderEntry) -> ManifestResult<AddOutcome>;

    /// Remove every entry for `dependency`, returning how many were removed
    fn remove(&self, dependency: &str) -> ManifestResult<usize>;

    /// Whether a replacement of the stored loader is in progress
    fn is_swapping(&self) -> bool;
}
