//! Directory-backed loader storage for hosts without packed packages

use std::fs::{self, DirBuilder};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use loader_host::Host;

use super::{AddOutcome, LoaderBackend};
use crate::archive::remove_if_exists;
use crate::config::{LoaderConfig, MetadataConfig};
use crate::error::ManifestResult;
use crate::metadata::{metadata_bytes, METADATA_ENTRY};
use crate::naming::{EntryMatcher, LoaderEntry};

/// Loader entries stored as files in the loader package directory.
///
/// The host reloads changed files itself, so there is no swap and no cache.
/// A lock still serializes writers within the process.
pub struct DirectoryBackend {
    dir: PathBuf,
    metadata: MetadataConfig,
    host: Arc<dyn Host>,
    write_lock: Mutex<()>,
}

impl DirectoryBackend {
    pub fn new(config: &LoaderConfig, host: Arc<dyn Host>) -> Self {
        Self {
            dir: config.directory_path(),
            metadata: config.metadata.clone(),
            host,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// File names in the loader directory matching `matcher`, sorted
    fn matching_files(&self, matcher: &EntryMatcher) -> io::Result<Vec<String>> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(read_dir) => read_dir,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut names = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = dir_entry.file_name().to_str() {
                if matcher.is_match(name) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

fn create_package_dir(path: &Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o755);
    }
    builder.create(path)
}

impl LoaderBackend for DirectoryBackend {
    fn exists(&self, dependency: &str) -> ManifestResult<bool> {
        let matcher = EntryMatcher::new(dependency)?;
        let _guard = self.lock();
        Ok(!self.matching_files(&matcher)?.is_empty())
    }

    fn add(&self, entry: &LoaderEntry) -> ManifestResult<AddOutcome> {
        let _guard = self.lock();

        let created = !self.dir.exists();
        if created {
            create_package_dir(&self.dir)?;
            let metadata = metadata_bytes(&self.metadata, self.host.platform())?;
            fs::write(self.dir.join(METADATA_ENTRY), metadata)?;
            tracing::debug!(path = %self.dir.display(), "created loader package directory");
        }

        fs::write(self.dir.join(entry.file_name()), entry.payload())?;
        Ok(AddOutcome {
            created,
            written: true,
        })
    }

    fn remove(&self, dependency: &str) -> ManifestResult<usize> {
        let matcher = EntryMatcher::new(dependency)?;
        let _guard = self.lock();

        let mut removed = 0;
        for name in self.matching_files(&matcher)? {
            if remove_if_exists(&self.dir.join(&name))? {
                tracing::debug!(entry = %name, "removed loader entry file");
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn is_swapping(&self) -> bool {
        false
    }
}
