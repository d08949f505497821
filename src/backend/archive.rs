//! Archive-backed loader storage

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use loader_host::Host;

use super::{AddOutcome, LoaderBackend};
use crate::archive::{self, ArchivePaths};
use crate::config::{LoaderConfig, MetadataConfig};
use crate::error::ManifestResult;
use crate::metadata::{metadata_bytes, METADATA_ENTRY};
use crate::naming::{EntryMatcher, LoaderEntry};
use crate::swap::{lock_state, ArchiveState, SharedState, SwapPhase, SwapScheduler};

/// Loader entries stored as members of one package archive.
///
/// All archive reads and writes, the entry cache and the swap phase are
/// serialized by one lock, shared with the swap scheduler's deferred steps.
pub struct ArchiveBackend {
    paths: ArchivePaths,
    metadata: MetadataConfig,
    host: Arc<dyn Host>,
    state: SharedState,
    swap: SwapScheduler,
}

impl ArchiveBackend {
    pub fn new(config: &LoaderConfig, host: Arc<dyn Host>) -> Self {
        let paths = config.archive_paths();
        let state: SharedState = Arc::new(Mutex::new(ArchiveState::default()));
        let swap = SwapScheduler::new(
            Arc::clone(&host),
            &config.package_name,
            paths.clone(),
            config.swap,
            Arc::clone(&state),
        );

        Self {
            paths,
            metadata: config.metadata.clone(),
            host,
            state,
            swap,
        }
    }

    pub fn paths(&self) -> &ArchivePaths {
        &self.paths
    }

    /// Cached entry names, if the cache is populated
    pub fn cached_entries(&self) -> Option<Vec<String>> {
        lock_state(&self.state).cache.names().map(<[String]>::to_vec)
    }

    /// Fill the cache from the staged replacement if there is one, else the
    /// live archive.
    fn populate_cache(&self, state: &mut ArchiveState) -> ManifestResult<()> {
        if state.cache.is_populated() {
            return Ok(());
        }

        let source = self.paths.current();
        let names = archive::list_entries(source)?;
        tracing::debug!(
            path = %source.display(),
            entries = names.len(),
            "loaded loader entry list"
        );
        state.cache.replace(names);
        Ok(())
    }

    /// Archive that new entries go into.
    ///
    /// Whenever a replacement is staged it wins: the live archive is about
    /// to be replaced by it, or a failed swap left it as the newest state.
    fn write_target(&self) -> &Path {
        if self.paths.has_staged() {
            self.paths.staged()
        } else {
            self.paths.live()
        }
    }

    /// Replace a same-name entry holding different code.
    ///
    /// Zip member names are unique, so the old member is filtered out into
    /// the staged replacement and the new one appended there.
    fn replace_entry(&self, state: &mut ArchiveState, entry: &LoaderEntry) -> ManifestResult<Vec<String>> {
        let file_name = entry.file_name();
        archive::rewrite_staged(&self.paths, |name: &str| name == file_name)?;

        match archive::append(self.paths.staged(), &file_name, entry.payload()) {
            Ok(names) => {
                tracing::debug!(entry = %file_name, "replacing loader entry code");
                Ok(names)
            }
            Err(e) => {
                state.cache.invalidate();
                Err(e)
            }
        }
    }
}

impl LoaderBackend for ArchiveBackend {
    fn exists(&self, dependency: &str) -> ManifestResult<bool> {
        if !self.paths.any_exists() {
            return Ok(false);
        }

        let matcher = EntryMatcher::new(dependency)?;
        let mut state = lock_state(&self.state);
        self.populate_cache(&mut state)?;
        Ok(state.cache.find(&matcher).is_some())
    }

    fn add(&self, entry: &LoaderEntry) -> ManifestResult<AddOutcome> {
        let file_name = entry.file_name();

        let (outcome, begin, load_into_host) = {
            let mut state = lock_state(&self.state);
            let target = self.write_target();
            let created = !target.exists();
            let mut staged_write = target == self.paths.staged();

            let names = if created {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let metadata = metadata_bytes(&self.metadata, self.host.platform())?;
                archive::create(
                    target,
                    &[
                        (METADATA_ENTRY, metadata.as_slice()),
                        (file_name.as_str(), entry.payload()),
                    ],
                )?
            } else {
                let existing = archive::list_entries(target)?;
                if !existing.iter().any(|name| *name == file_name) {
                    archive::append(target, &file_name, entry.payload())?
                } else if archive::read_entry(target, &file_name)?.as_deref() == Some(entry.payload()) {
                    tracing::debug!(entry = %file_name, "loader entry already present");
                    state.cache.replace(existing);
                    return Ok(AddOutcome {
                        created: false,
                        written: false,
                    });
                } else {
                    staged_write = true;
                    self.replace_entry(&mut state, entry)?
                }
            };

            state.cache.replace(names);

            // Anything written to the staged file must reach the live
            // archive through a swap.
            let begin = staged_write && self.swap.stage(&mut state);
            let load_into_host = !created && !staged_write && state.phase == SwapPhase::Idle;
            let outcome = AddOutcome {
                created,
                written: true,
            };
            (outcome, begin, load_into_host)
        };

        if begin {
            self.swap.begin();
        }

        // The host only notices new archives, not new members of one it
        // already has loaded.
        if load_into_host {
            if let Err(e) = self.host.load_entry(self.paths.live(), &file_name) {
                tracing::warn!(entry = %file_name, error = %e, "failed to load new loader entry");
            }
        }

        Ok(outcome)
    }

    fn remove(&self, dependency: &str) -> ManifestResult<usize> {
        if !self.paths.any_exists() {
            return Ok(0);
        }

        let matcher = EntryMatcher::new(dependency)?;
        let mut state = lock_state(&self.state);

        let outcome = archive::rewrite_staged(&self.paths, |name| matcher.is_match(name))?;
        let removed = outcome.removed.len();
        let has_changes = outcome.has_changes();
        state.cache.replace(outcome.entries);

        if !has_changes {
            self.paths.discard_staged()?;
            return Ok(0);
        }

        let begin = self.swap.stage(&mut state);
        drop(state);

        if begin {
            self.swap.begin();
        }
        Ok(removed)
    }

    fn is_swapping(&self) -> bool {
        lock_state(&self.state).phase.is_swapping()
    }
}
