//! Filtered rewrite of the loader archive into the staged path.
//!
//! The source is the staged replacement when one exists (it already holds
//! earlier removals), else the live archive. A staged source is first moved
//! to the intermediate path so the output can reuse the staged name.
//!
//! Entries are copied raw: compressed bytes and headers go across verbatim,
//! nothing is decompressed and re-encoded.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use zip::{ZipArchive, ZipWriter};

use super::{remove_if_exists, ArchivePaths};
use crate::error::ManifestResult;

/// Result of [`rewrite_staged`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteOutcome {
    /// Entry names of the new staged archive, in archive order
    pub entries: Vec<String>,
    /// Entries dropped by the predicate
    pub removed: Vec<String>,
    /// The source was an earlier staged replacement
    pub carried_staged: bool,
}

impl RewriteOutcome {
    pub fn removed_any(&self) -> bool {
        !self.removed.is_empty()
    }

    /// The staged output differs from the live archive.
    pub fn has_changes(&self) -> bool {
        self.removed_any() || self.carried_staged
    }
}

/// Rewrite the current archive into the staged path, dropping every entry
/// accepted by `should_remove`.
///
/// On failure the partial output is deleted and an earlier staged
/// replacement is moved back into place, so no staged removal is lost.
pub fn rewrite_staged<F>(paths: &ArchivePaths, should_remove: F) -> ManifestResult<RewriteOutcome>
where
    F: Fn(&str) -> bool,
{
    let carried_staged = paths.has_staged();
    let source = if carried_staged {
        remove_if_exists(paths.intermediate())?;
        fs::rename(paths.staged(), paths.intermediate())?;
        paths.intermediate()
    } else {
        paths.live()
    };

    match copy_filtered(source, paths.staged(), &should_remove) {
        Ok((entries, removed)) => {
            if carried_staged {
                remove_if_exists(paths.intermediate())?;
            }
            Ok(RewriteOutcome {
                entries,
                removed,
                carried_staged,
            })
        }
        Err(e) => {
            if let Err(cleanup) = remove_if_exists(paths.staged()) {
                tracing::warn!(
                    path = %paths.staged().display(),
                    error = %cleanup,
                    "failed to delete partial loader rewrite"
                );
            }
            if carried_staged {
                if let Err(restore) = fs::rename(paths.intermediate(), paths.staged()) {
                    tracing::error!(
                        path = %paths.intermediate().display(),
                        error = %restore,
                        "failed to restore staged loader after rewrite error"
                    );
                }
            }
            Err(e)
        }
    }
}

/// Copy every entry of `source` not accepted by `should_remove` into a new
/// archive at `target`.
///
/// Returns the kept and the removed entry names.
pub fn copy_filtered<F>(
    source: &Path,
    target: &Path,
    should_remove: F,
) -> ManifestResult<(Vec<String>, Vec<String>)>
where
    F: Fn(&str) -> bool,
{
    let mut reader = ZipArchive::new(BufReader::new(File::open(source)?))?;
    let mut writer = ZipWriter::new(File::create(target)?);

    let mut kept = Vec::with_capacity(reader.len());
    let mut removed = Vec::new();

    for index in 0..reader.len() {
        let file = reader.by_index_raw(index)?;
        let name = file.name().to_string();
        if should_remove(&name) {
            removed.push(name);
            continue;
        }
        writer.raw_copy_file(file)?;
        kept.push(name);
    }

    writer.finish()?;
    Ok((kept, removed))
}
