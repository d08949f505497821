//! Host collaborator interface for the dependency loader.
//!
//! The loader manager never talks to the editor directly. Everything it
//! needs from the running host goes through the [`Host`] trait:
//! - the current platform (recorded in the loader metadata)
//! - disabling and re-enabling the loader package around an archive swap
//! - a deferred-callback timer
//! - the persisted list of installed packages
//! - loading a freshly written loader entry into the running host
//!
//! [`TimerThread`] and [`SettingsFile`] are building blocks a host
//! implementation can delegate to.

mod settings;
mod timer;

use std::fmt;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

pub use settings::SettingsFile;
pub use timer::{TimerHandle, TimerThread};

/// Result type for host operations
pub type HostResult<T> = Result<T, HostError>;

/// Errors reported by host collaborators
#[derive(Debug, Error)]
pub enum HostError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("plugin load failed for {entry}: {reason}")]
    PluginLoad { entry: String, reason: String },

    #[error("timer thread has shut down")]
    TimerClosed,
}

/// Callback run later by the host's deferred-callback facility.
pub type Deferred = Box<dyn FnOnce() + Send + 'static>;

/// Platform the host is running on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows,
    Osx,
    Linux,
}

impl Platform {
    /// Platform of the current build target.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Osx
        } else {
            Platform::Linux
        }
    }

    /// Identifier used in package metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Osx => "osx",
            Platform::Linux => "linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the loader manager consumes from the host.
///
/// Implementations must be usable from any thread. Deferred callbacks may
/// run on a different thread than the one that scheduled them.
pub trait Host: Send + Sync + 'static {
    /// Current platform.
    fn platform(&self) -> Platform;

    /// Ask the host to disable a package and release its file handles.
    fn disable_package(&self, package: &str, reason: &str);

    /// Ask the host to re-enable a package disabled by [`Host::disable_package`].
    fn reenable_package(&self, package: &str, reason: &str);

    /// Run `callback` once, after `delay`.
    fn set_timeout(&self, delay: Duration, callback: Deferred);

    /// Load the persisted list of installed package names.
    fn load_installed_packages(&self) -> HostResult<Vec<String>>;

    /// Persist the list of installed package names.
    fn save_installed_packages(&self, packages: &[String]) -> HostResult<()>;

    /// Load a loader entry that was appended to an archive the host already
    /// has open.
    ///
    /// Some hosts only notice new package files, not changed ones, so the
    /// manager calls this after appending to a live archive. Hosts that
    /// reload on their own keep the default.
    fn load_entry(&self, archive: &Path, entry: &str) -> HostResult<()> {
        let _ = (archive, entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_identifiers() {
        assert_eq!(Platform::Windows.as_str(), "windows");
        assert_eq!(Platform::Osx.to_string(), "osx");
        assert_eq!(Platform::Linux.to_string(), "linux");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_current_platform_linux() {
        assert_eq!(Platform::current(), Platform::Linux);
    }
}
