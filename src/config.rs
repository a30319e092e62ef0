//! File-backed settings at ~/.halal-compass/config.json.
//!
//! Holds the place-index API credential. The credential is attached to
//! outbound requests server-side only and must never be serialized into
//! any API response. The HALAL_COMPASS_FSQ_KEY environment variable
//! overrides the stored value.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

pub const FSQ_KEY_ENV: &str = "HALAL_COMPASS_FSQ_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    place_index_key: Option<String>,
}

/// Settings store with graceful handling of a missing or corrupt file.
pub struct Config {
    path: PathBuf,
    file: ConfigFile,
}

impl Config {
    /// Load from the default location (~/.halal-compass/config.json).
    pub fn load() -> Self {
        Self::load_from(Self::default_path())
    }

    /// Load from a specific path (for testing).
    pub fn load_from(path: PathBuf) -> Self {
        let file = fs::read_to_string(&path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default();
        Self { path, file }
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".halal-compass")
            .join("config.json")
    }

    /// The place-index credential: env override first, then the file.
    pub fn place_index_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var(FSQ_KEY_ENV) {
            if !key.is_empty() {
                return Some(key);
            }
        }
        self.file.place_index_key.clone()
    }

    /// Store (or clear, with None) the place-index credential.
    pub fn set_place_index_key(&mut self, key: Option<String>) {
        self.file.place_index_key = key.filter(|k| !k.is_empty());
        self.persist();
    }

    fn persist(&self) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string_pretty(&self.file) {
            let _ = fs::write(&self.path, json);
        }
    }
}
