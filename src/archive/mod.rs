//! Loader package archive I/O
//!
//! The archive is a zip file. Only the operations the loader needs are
//! supported:
//! - list entry names (in archive order)
//! - read one entry
//! - create an archive from a set of entries
//! - append one entry in place
//! - write a filtered raw copy of an archive (see [`rewrite`])
//!
//! Zip members cannot be deleted in place, so removals go through a staged
//! copy beside the live file:
//! - `<archive>-new`: the staged replacement
//! - `<archive>-intermediate`: the previous staged replacement while it is
//!   being re-read (a zip cannot be read and overwritten at the same path)

pub mod rewrite;

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Seek, Write};
use std::path::{Path, PathBuf};

use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ManifestResult;

pub use rewrite::{rewrite_staged, RewriteOutcome};

const STAGED_SUFFIX: &str = "-new";
const INTERMEDIATE_SUFFIX: &str = "-intermediate";

/// The live archive and its staged siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePaths {
    live: PathBuf,
    staged: PathBuf,
    intermediate: PathBuf,
}

impl ArchivePaths {
    pub fn new(live: impl Into<PathBuf>) -> Self {
        let live = live.into();
        Self {
            staged: with_suffix(&live, STAGED_SUFFIX),
            intermediate: with_suffix(&live, INTERMEDIATE_SUFFIX),
            live,
        }
    }

    pub fn live(&self) -> &Path {
        &self.live
    }

    pub fn staged(&self) -> &Path {
        &self.staged
    }

    pub fn intermediate(&self) -> &Path {
        &self.intermediate
    }

    pub fn has_staged(&self) -> bool {
        self.staged.exists()
    }

    /// Whether there is any archive to read: live or staged.
    pub fn any_exists(&self) -> bool {
        self.live.exists() || self.staged.exists()
    }

    /// Archive holding the most recent intended state: the staged
    /// replacement if there is one, else the live archive.
    pub fn current(&self) -> &Path {
        if self.staged.exists() {
            &self.staged
        } else {
            &self.live
        }
    }

    /// Replace the live archive with the staged one.
    ///
    /// The live file is deleted first (a missing live file is fine), then
    /// the staged file is renamed into place. Either step fails while the
    /// host still holds the live file open on some platforms. Without a
    /// staged file the live one is left alone.
    pub fn promote_staged(&self) -> io::Result<()> {
        if !self.staged.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no staged archive at {}", self.staged.display()),
            ));
        }
        remove_if_exists(&self.live)?;
        fs::rename(&self.staged, &self.live)
    }

    /// Delete the staged replacement, if any.
    pub fn discard_staged(&self) -> io::Result<bool> {
        remove_if_exists(&self.staged)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Remove a file, treating "not found" as success.
///
/// Returns whether a file was removed.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Options for entries written by the loader
pub fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Entry names of an open archive, in archive order.
pub fn entry_names<R: Read + Seek>(archive: &mut ZipArchive<R>) -> ManifestResult<Vec<String>> {
    let mut names = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        names.push(archive.by_index_raw(index)?.name().to_string());
    }
    Ok(names)
}

/// List the entry names of the archive at `path`.
pub fn list_entries(path: &Path) -> ManifestResult<Vec<String>> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
    entry_names(&mut archive)
}

/// Read one entry, `None` if the archive has no such entry.
pub fn read_entry(path: &Path, name: &str) -> ManifestResult<Option<Vec<u8>>> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
    let mut file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut contents = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut contents)?;
    Ok(Some(contents))
}

/// Create a new archive holding `entries`, replacing any file at `path`.
///
/// Returns the entry names of the written archive.
pub fn create(path: &Path, entries: &[(&str, &[u8])]) -> ManifestResult<Vec<String>> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;

    let mut writer = ZipWriter::new(file);
    for (name, payload) in entries {
        writer.start_file(*name, entry_options())?;
        writer.write_all(payload)?;
    }
    let file = writer.finish()?;

    entry_names(&mut ZipArchive::new(file)?)
}

/// Append one entry to the existing archive at `path`.
///
/// Returns the entry names of the written archive.
pub fn append(path: &Path, name: &str, payload: &[u8]) -> ManifestResult<Vec<String>> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;

    let mut writer = ZipWriter::new_append(file)?;
    writer.start_file(name, entry_options())?;
    writer.write_all(payload)?;
    let file = writer.finish()?;

    entry_names(&mut ZipArchive::new(file)?)
}
