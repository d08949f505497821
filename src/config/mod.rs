//! Loader configuration
//!
//! Every field has a built-in default except the two host directories.
//! Configuration can be built in code with [`LoaderConfig::new`] or loaded
//! from a TOML file:
//!
//! ```toml
//! installed_packages_dir = "/home/me/.config/sublime-text/Installed Packages"
//! packages_dir = "/home/me/.config/sublime-text/Packages"
//! layout = "archive"
//!
//! [swap]
//! swap_delay_ms = 700
//! reenable_delay_ms = 10
//! ```

mod defaults;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archive::ArchivePaths;
use crate::naming;

pub use defaults::{LegacyConfig, MetadataConfig};

/// Upper bound for either swap delay
const MAX_DELAY_MS: u64 = 60_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// How loader entries are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Entries are members of one package archive
    #[default]
    Archive,
    /// Entries are files in a package directory (pre-archive hosts)
    Directory,
}

/// Delays used by the swap scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapTiming {
    /// Wait before replacing the live archive
    pub swap_delay_ms: u64,
    /// Wait after the rename before re-enabling the package
    pub reenable_delay_ms: u64,
}

impl Default for SwapTiming {
    fn default() -> Self {
        Self {
            swap_delay_ms: defaults::SWAP_DELAY_MS,
            reenable_delay_ms: defaults::REENABLE_DELAY_MS,
        }
    }
}

impl SwapTiming {
    pub fn swap_delay(&self) -> Duration {
        Duration::from_millis(self.swap_delay_ms)
    }

    pub fn reenable_delay(&self) -> Duration {
        Duration::from_millis(self.reenable_delay_ms)
    }
}

/// Loader manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory holding packed packages
    pub installed_packages_dir: PathBuf,
    /// Directory holding unpacked packages
    pub packages_dir: PathBuf,
    /// Loader package name
    pub package_name: String,
    /// Extension of the loader archive
    pub archive_extension: String,
    /// Storage layout
    pub layout: Layout,
    /// Swap scheduler delays
    pub swap: SwapTiming,
    /// Metadata entry contents
    pub metadata: MetadataConfig,
    /// Legacy artifacts to clean up
    pub legacy: LegacyConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            installed_packages_dir: PathBuf::new(),
            packages_dir: PathBuf::new(),
            package_name: defaults::PACKAGE_NAME.to_string(),
            archive_extension: defaults::ARCHIVE_EXTENSION.to_string(),
            layout: Layout::default(),
            swap: SwapTiming::default(),
            metadata: MetadataConfig::default(),
            legacy: LegacyConfig::default(),
        }
    }
}

impl LoaderConfig {
    /// Defaults rooted at the given host directories
    pub fn new(installed_packages_dir: impl Into<PathBuf>, packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            installed_packages_dir: installed_packages_dir.into(),
            packages_dir: packages_dir.into(),
            ..Self::default()
        }
    }

    /// Use the given layout
    pub fn with_layout(mut self, layout: Layout) -> Self {
        self.layout = layout;
        self
    }

    /// Use the given swap delays
    pub fn with_swap_timing(mut self, swap: SwapTiming) -> Self {
        self.swap = swap;
        self
    }

    /// Load and validate a TOML configuration file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate TOML configuration
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.installed_packages_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "installed_packages_dir must be set".to_string(),
            ));
        }
        if self.packages_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "packages_dir must be set".to_string(),
            ));
        }
        if !naming::is_valid_name(&self.package_name) {
            return Err(ConfigError::ValidationError(format!(
                "invalid package_name {:?}",
                self.package_name
            )));
        }
        if let Some(name) = std::iter::once(&self.legacy.loader_name)
            .chain(&self.legacy.bundled_dependencies)
            .find(|name| !naming::is_valid_name(name))
        {
            return Err(ConfigError::ValidationError(format!(
                "invalid legacy package name {:?}",
                name
            )));
        }
        if self.archive_extension.is_empty() || self.archive_extension.contains(|c: char| c == '/' || c == '\\') {
            return Err(ConfigError::ValidationError(format!(
                "invalid archive_extension {:?}",
                self.archive_extension
            )));
        }
        if self.swap.swap_delay_ms > MAX_DELAY_MS || self.swap.reenable_delay_ms > MAX_DELAY_MS {
            return Err(ConfigError::ValidationError(format!(
                "swap delays must not exceed {}ms",
                MAX_DELAY_MS
            )));
        }
        Ok(())
    }

    /// Live loader archive
    pub fn archive_path(&self) -> PathBuf {
        self.installed_packages_dir
            .join(format!("{}.{}", self.package_name, self.archive_extension))
    }

    /// Live archive plus its staged siblings
    pub fn archive_paths(&self) -> ArchivePaths {
        ArchivePaths::new(self.archive_path())
    }

    /// Loader package directory (directory layout)
    pub fn directory_path(&self) -> PathBuf {
        self.packages_dir.join(&self.package_name)
    }

    /// Packed loader of the legacy naming scheme
    pub fn legacy_archive_path(&self) -> PathBuf {
        self.installed_packages_dir
            .join(format!("{}.{}", self.legacy.loader_name, self.archive_extension))
    }

    /// Unpacked loader of the legacy naming scheme
    pub fn legacy_directory_path(&self) -> PathBuf {
        self.packages_dir.join(&self.legacy.loader_name)
    }
}
