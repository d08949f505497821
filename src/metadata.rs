//! Loader package metadata entry

use loader_host::Platform;
use serde_json::{Map, Value};

use crate::config::MetadataConfig;
use crate::error::ManifestResult;

/// Reserved entry holding the package metadata
pub const METADATA_ENTRY: &str = "dependency-metadata.json";

/// Build the metadata object.
///
/// The platform is recorded so packages synced between machines of
/// different platforms can be detected.
pub fn metadata_value(config: &MetadataConfig, platform: Platform) -> Value {
    let mut map = Map::new();
    map.insert("version".to_string(), Value::String(config.version.clone()));
    map.insert(
        config.host_key.clone(),
        Value::String(config.host_version_range.clone()),
    );
    map.insert(
        "platforms".to_string(),
        Value::Array(vec![Value::String(platform.as_str().to_string())]),
    );
    map.insert("url".to_string(), Value::String(config.url.clone()));
    map.insert(
        "description".to_string(),
        Value::String(config.description.clone()),
    );
    Value::Object(map)
}

/// Serialized metadata entry payload
pub fn metadata_bytes(config: &MetadataConfig, platform: Platform) -> ManifestResult<Vec<u8>> {
    Ok(serde_json::to_vec(&metadata_value(config, platform))?)
}
