//! Loader manifest manager
//!
//! The entry point for callers. It validates arguments, picks the storage
//! backend once from the configured layout and runs legacy cleanup the
//! first time the loader is created.

use std::sync::Arc;

use loader_host::Host;

use crate::backend::{ArchiveBackend, DirectoryBackend, LoaderBackend};
use crate::cleanup::clean_legacy_loaders;
use crate::config::{Layout, LoaderConfig};
use crate::error::ManifestResult;
use crate::naming::{validate_name, LoaderEntry, Priority};

/// Manages the loader entries of installed dependencies.
///
/// Safe to share between threads; every operation takes `&self`.
pub struct ManifestManager {
    config: LoaderConfig,
    host: Arc<dyn Host>,
    backend: Box<dyn LoaderBackend>,
}

impl ManifestManager {
    pub fn new(config: LoaderConfig, host: Arc<dyn Host>) -> ManifestResult<Self> {
        config.validate()?;

        let backend: Box<dyn LoaderBackend> = match config.layout {
            Layout::Archive => Box::new(ArchiveBackend::new(&config, Arc::clone(&host))),
            Layout::Directory => Box::new(DirectoryBackend::new(&config, Arc::clone(&host))),
        };
        tracing::debug!(layout = ?config.layout, package = %config.package_name, "loader manager ready");

        Ok(Self {
            config,
            host,
            backend,
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn layout(&self) -> Layout {
        self.config.layout
    }

    /// Whether a loader entry exists for `dependency`, at any priority
    pub fn exists(&self, dependency: &str) -> ManifestResult<bool> {
        validate_name(dependency)?;
        self.backend.exists(dependency)
    }

    /// Add a loader entry for `dependency`.
    ///
    /// With no code, or empty code, the entry registers the dependency's
    /// code path with the host.
    pub fn add(&self, priority: Priority, dependency: &str, code: Option<&str>) -> ManifestResult<()> {
        let entry = match code {
            Some(code) if !code.is_empty() => LoaderEntry::new(priority, dependency, code)?,
            _ => LoaderEntry::with_default_code(priority, dependency)?,
        };

        let outcome = self.backend.add(&entry)?;
        if outcome.written {
            tracing::info!(
                dependency = %dependency,
                entry = %entry.file_name(),
                "added loader entry"
            );
        }

        if outcome.created {
            let report = clean_legacy_loaders(&self.config, self.host.as_ref());
            if report.found_legacy {
                tracing::info!(
                    marked = ?report.marked,
                    settings_updated = report.settings_updated,
                    "legacy loader cleanup finished"
                );
            }
        }
        Ok(())
    }

    /// Remove every loader entry for `dependency`
    pub fn remove(&self, dependency: &str) -> ManifestResult<()> {
        validate_name(dependency)?;

        let removed = self.backend.remove(dependency)?;
        if removed > 0 {
            tracing::info!(dependency = %dependency, removed, "removed loader entries");
        }
        Ok(())
    }

    /// Whether the loader archive is being replaced.
    ///
    /// The loader package is disabled in the host for the duration.
    pub fn is_swapping(&self) -> bool {
        self.backend.is_swapping()
    }
}
