//! One-time removal of artifacts left by older loader layouts.
//!
//! Older releases shipped the loader under a different package name and
//! bundled a few dependencies as unpacked packages. When the current loader
//! is first created those remnants are removed and the installed-package
//! list is brought up to date. Nothing here is fatal: failures are logged
//! and the caller carries on.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use loader_host::{Host, HostResult};

use crate::archive::remove_if_exists;
use crate::config::LoaderConfig;

/// Marker left in a directory that could not be deleted, so the package
/// manager deletes it on the next start
pub const CLEANUP_MARKER: &str = "package-control.cleanup";

/// What [`clean_legacy_loaders`] did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// A legacy loader archive or directory was found
    pub found_legacy: bool,
    /// Directories left with a cleanup marker instead of being deleted
    pub marked: Vec<String>,
    /// The installed-package list was saved
    pub settings_updated: bool,
}

/// Delete a directory tree, falling back to dropping a cleanup marker in it.
///
/// Returns `Ok(false)` when there was nothing to delete.
pub fn remove_dir_or_mark(path: &Path) -> io::Result<bool> {
    if !path.is_dir() {
        return Ok(false);
    }

    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to delete directory, marking for cleanup"
            );
            File::create(path.join(CLEANUP_MARKER))?;
            Ok(true)
        }
    }
}

fn remove_dir_logged(path: &Path, report: &mut CleanupReport) -> bool {
    let marker = path.join(CLEANUP_MARKER);
    match remove_dir_or_mark(path) {
        Ok(removed) => {
            if removed && marker.exists() {
                report.marked.push(path.display().to_string());
            }
            removed
        }
        Err(e) => {
            tracing::error!(path = %path.display(), error = %e, "failed to clean up directory");
            false
        }
    }
}

/// Remove the legacy loader and formerly bundled dependencies.
pub fn clean_legacy_loaders(config: &LoaderConfig, host: &dyn Host) -> CleanupReport {
    let mut report = CleanupReport::default();

    let legacy_archive = config.legacy_archive_path();
    let removed_archive = match remove_if_exists(&legacy_archive) {
        Ok(removed) => removed,
        Err(e) => {
            tracing::error!(
                path = %legacy_archive.display(),
                error = %e,
                "failed to delete legacy loader archive"
            );
            // Still present; clean up the rest anyway
            true
        }
    };
    let removed_dir = remove_dir_logged(&config.legacy_directory_path(), &mut report);

    if !removed_archive && !removed_dir {
        return report;
    }
    report.found_legacy = true;
    tracing::info!("Cleaning up remnants of old loaders");

    for name in &config.legacy.bundled_dependencies {
        remove_dir_logged(&config.packages_dir.join(name), &mut report);
    }

    match update_installed_packages(config, host) {
        Ok(updated) => report.settings_updated = updated,
        Err(e) => tracing::error!(error = %e, "failed to update installed packages"),
    }

    report
}

fn update_installed_packages(config: &LoaderConfig, host: &dyn Host) -> HostResult<bool> {
    let original = host.load_installed_packages()?;

    let stale: Vec<&str> = std::iter::once(config.legacy.loader_name.as_str())
        .chain(config.legacy.bundled_dependencies.iter().map(String::as_str))
        .collect();
    let updated: Vec<String> = original
        .iter()
        .filter(|name| !stale.contains(&name.as_str()))
        .cloned()
        .collect();

    if updated == original {
        return Ok(false);
    }
    host.save_installed_packages(&updated)?;
    Ok(true)
}
