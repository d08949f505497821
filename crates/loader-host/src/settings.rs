//! JSON settings file holding list-valued settings such as
//! `installed_packages`.
//!
//! Lists are normalized on load and save: duplicates dropped, sorted
//! case-insensitively. Saving is skipped when the normalized list did not
//! change, and keys other than the one being saved are preserved.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::{HostError, HostResult};

/// A settings file on disk.
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load a list setting. A missing file or key yields an empty list;
    /// non-string items are ignored.
    pub fn load_list(&self, key: &str) -> HostResult<Vec<String>> {
        let settings = self.read()?;
        let items = settings
            .get(key)
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(normalize(items))
    }

    /// Save a list setting if it differs from `original`.
    ///
    /// Returns `true` when the file was written.
    pub fn save_list(&self, key: &str, items: &[String], original: &[String]) -> HostResult<bool> {
        let items = normalize(items.to_vec());
        if items == normalize(original.to_vec()) {
            return Ok(false);
        }

        let mut settings = self.read()?;
        settings.insert(
            key.to_string(),
            Value::Array(items.into_iter().map(Value::String).collect()),
        );

        let contents = serde_json::to_string_pretty(&Value::Object(settings))
            .map_err(|e| HostError::Settings(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, contents)?;
        fs::rename(&temp_path, &self.path)?;

        tracing::debug!(path = %self.path.display(), key, "saved list setting");
        Ok(true)
    }

    fn read(&self) -> HostResult<Map<String, Value>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(HostError::Io(e)),
        };
        if contents.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str(&contents) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(HostError::Settings(format!(
                "{} does not contain a JSON object",
                self.path.display()
            ))),
            Err(e) => Err(HostError::Settings(format!(
                "failed to parse {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Deduplicate and sort case-insensitively.
fn normalize(mut items: Vec<String>) -> Vec<String> {
    items.sort_by(|a, b| a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b)));
    items.dedup();
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_list() {
        let dir = TempDir::new().unwrap();
        let settings = SettingsFile::new(dir.path().join("missing.json"));

        assert!(settings.load_list("installed_packages").unwrap().is_empty());
    }

    #[test]
    fn test_load_normalizes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pc.json");
        fs::write(
            &path,
            r#"{"installed_packages": ["zeta", "Alpha", "beta", "zeta", 3]}"#,
        )
        .unwrap();

        let settings = SettingsFile::new(&path);
        assert_eq!(
            settings.load_list("installed_packages").unwrap(),
            vec!["Alpha", "beta", "zeta"]
        );
    }

    #[test]
    fn test_save_preserves_other_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pc.json");
        fs::write(
            &path,
            r#"{"auto_upgrade": false, "installed_packages": ["a", "b"]}"#,
        )
        .unwrap();

        let settings = SettingsFile::new(&path);
        let original = settings.load_list("installed_packages").unwrap();
        let written = settings
            .save_list("installed_packages", &["a".to_string()], &original)
            .unwrap();
        assert!(written);

        let value: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["auto_upgrade"], false);
        assert_eq!(value["installed_packages"], serde_json::json!(["a"]));
    }

    #[test]
    fn test_save_skips_unchanged_list() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pc.json");
        let settings = SettingsFile::new(&path);

        let original = vec!["b".to_string(), "a".to_string()];
        let reordered = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let written = settings
            .save_list("installed_packages", &reordered, &original)
            .unwrap();

        assert!(!written);
        assert!(!path.exists());
    }

    #[test]
    fn test_non_object_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pc.json");
        fs::write(&path, "[1, 2]").unwrap();

        let result = SettingsFile::new(&path).load_list("installed_packages");
        assert!(matches!(result, Err(HostError::Settings(_))));
    }
}
