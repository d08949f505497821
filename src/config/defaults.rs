//! Built-in defaults
//!
//! Hardcoded values matching the layout Package Control uses inside a
//! Sublime Text data directory.

use serde::{Deserialize, Serialize};

/// Name of the loader package
pub const PACKAGE_NAME: &str = "0_package_control_loader";

/// Extension of packed packages
pub const ARCHIVE_EXTENSION: &str = "sublime-package";

/// Delay before the live archive is replaced (lets platform file locks clear)
pub const SWAP_DELAY_MS: u64 = 700;

/// Delay between the rename and re-enabling the package
pub const REENABLE_DELAY_MS: u64 = 10;

/// Loader package name used before the current naming scheme
pub const LEGACY_LOADER_NAME: &str = "0-package_control_loader";

/// Dependencies that used to be bundled with the legacy loader
pub const LEGACY_BUNDLED_DEPENDENCIES: &[&str] = &["bz2", "ssl-linux", "ssl-windows"];

/// Values written to the loader metadata entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetadataConfig {
    /// Loader package version
    pub version: String,
    /// Key naming the host version range (e.g. "sublime_text")
    pub host_key: String,
    /// Supported host version range
    pub host_version_range: String,
    /// Where to report problems
    pub url: String,
    /// Human-readable description
    pub description: String,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            host_key: "sublime_text".to_string(),
            host_version_range: "*".to_string(),
            url: "https://github.com/wbond/package_control/issues".to_string(),
            description: "Package Control dependency loader".to_string(),
        }
    }
}

/// Artifacts of the earlier loader scheme, removed on first archive creation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LegacyConfig {
    /// Old loader package name
    pub loader_name: String,
    /// Dependencies formerly shipped alongside the old loader
    pub bundled_dependencies: Vec<String>,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            loader_name: LEGACY_LOADER_NAME.to_string(),
            bundled_dependencies: LEGACY_BUNDLED_DEPENDENCIES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_defaults() {
        let metadata = MetadataConfig::default();
        assert_eq!(metadata.version, "1.0.0");
        assert_eq!(metadata.host_key, "sublime_text");
        assert_eq!(metadata.host_version_range, "*");
    }

    #[test]
    fn test_legacy_defaults() {
        let legacy = LegacyConfig::default();
        assert_eq!(legacy.loader_name, "0-package_control_loader");
        assert_eq!(legacy.bundled_dependencies, vec!["bz2", "ssl-linux", "ssl-windows"]);
    }
}
