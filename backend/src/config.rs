//! Runtime configuration
//!
//! Values come from environment variables (the CLI loads a `.env` file first
//! with dotenvy). Anything not set falls back to the defaults below.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::enrich::DEFAULT_GEMINI_MODEL;
use crate::segmenter::Dialect;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: String, value: String },
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub input_dir: PathBuf,
    pub segments_dir: PathBuf,
    /// Whole-document records are only written when this is set.
    pub full_doc_dir: Option<PathBuf>,
    pub metadata_cache_path: PathBuf,
    pub dialect: Dialect,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    /// Pause after each document while remote enrichment is on
    pub request_delay_ms: u64,
    pub enrich_retries: u32,
    pub chatling_api_key: Option<String>,
    pub chatling_bot_id: Option<String>,
    pub chatling_ai_model_id: Option<String>,
    /// File stem to metadata title, for files whose names don't identify the book
    pub file_to_meta_key: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut file_to_meta_key = HashMap::new();
        file_to_meta_key.insert("Kinh-Truong-A-Ham-HT-Tue-Sy-Dich".to_string(), "Trường A Hàm".to_string());

        AppConfig {
            input_dir: PathBuf::from("input_docs"),
            segments_dir: PathBuf::from("output_json_segments"),
            full_doc_dir: None,
            metadata_cache_path: PathBuf::from("metadata_dai_chanh.json"),
            dialect: Dialect::default(),
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            request_delay_ms: 2000,
            enrich_retries: 2,
            chatling_api_key: None,
            chatling_bot_id: None,
            chatling_ai_model_id: None,
            file_to_meta_key,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        AppConfig::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = AppConfig::default();

        if let Some(v) = get("KINHSACH_INPUT_DIR") {
            config.input_dir = PathBuf::from(v);
        }
        if let Some(v) = get("KINHSACH_SEGMENTS_DIR") {
            config.segments_dir = PathBuf::from(v);
        }
        if let Some(v) = get("KINHSACH_FULL_DOC_DIR") {
            config.full_doc_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("KINHSACH_METADATA_CACHE") {
            config.metadata_cache_path = PathBuf::from(v);
        }
        if let Some(v) = get("KINHSACH_DIALECT") {
            config.dialect = Dialect::from_str(&v).ok_or_else(|| ConfigError::InvalidValue {
                key: "KINHSACH_DIALECT".to_string(),
                value: v.clone(),
            })?;
        }
        if let Some(v) = get("KINHSACH_REQUEST_DELAY_MS") {
            config.request_delay_ms = parse_number("KINHSACH_REQUEST_DELAY_MS", &v)?;
        }
        if let Some(v) = get("KINHSACH_ENRICH_RETRIES") {
            config.enrich_retries = parse_number("KINHSACH_ENRICH_RETRIES", &v)?;
        }
        if let Some(v) = get("KINHSACH_META_KEYS_FILE") {
            config.file_to_meta_key.extend(load_meta_keys(&PathBuf::from(v))?);
        }

        config.gemini_api_key = get("GEMINI_API_KEY");
        if let Some(v) = get("GEMINI_MODEL") {
            config.gemini_model = v;
        }

        config.chatling_api_key = get("CHATLING_API_KEY");
        config.chatling_bot_id = get("CHATLING_BOT_ID");
        config.chatling_ai_model_id = get("CHATLING_AI_MODEL_ID");

        Ok(config)
    }
}

/// Read a `{ "<file stem>": "<title>" }` JSON file.
pub fn load_meta_keys(path: &PathBuf) -> Result<HashMap<String, String>, ConfigError> {
    let text = fs::read_to_string(path)
        .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
    serde_json::from_str(&text)
        .map_err(|source| ConfigError::Parse { path: path.clone(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.dialect, Dialect::Permissive);
        assert_eq!(config.request_delay_ms, 2000);
        assert!(config.gemini_api_key.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("KINHSACH_INPUT_DIR", "docs"),
            ("KINHSACH_FULL_DOC_DIR", "full"),
            ("KINHSACH_DIALECT", "preamble"),
            ("KINHSACH_REQUEST_DELAY_MS", "0"),
            ("GEMINI_API_KEY", "key"),
            ("CHATLING_BOT_ID", ""),
        ])).unwrap();
        assert_eq!(config.input_dir, PathBuf::from("docs"));
        assert_eq!(config.full_doc_dir, Some(PathBuf::from("full")));
        assert_eq!(config.dialect, Dialect::Preamble);
        assert_eq!(config.request_delay_ms, 0);
        assert_eq!(config.gemini_api_key.as_deref(), Some("key"));
        assert!(config.chatling_bot_id.is_none());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            AppConfig::from_lookup(lookup_from(&[("KINHSACH_DIALECT", "xml")])),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            AppConfig::from_lookup(lookup_from(&[("KINHSACH_ENRICH_RETRIES", "many")])),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_meta_keys_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.json");
        fs::write(&path, r#"{"Tang_Nhat": "Tăng Nhất A Hàm"}"#).unwrap();

        let path_str = path.to_string_lossy().to_string();
        let config = AppConfig::from_lookup(lookup_from(&[("KINHSACH_META_KEYS_FILE", path_str.as_str())])).unwrap();
        assert_eq!(config.file_to_meta_key.get("Tang_Nhat").map(|s| s.as_str()), Some("Tăng Nhất A Hàm"));
        assert!(config.file_to_meta_key.contains_key("Kinh-Truong-A-Ham-HT-Tue-Sy-Dich"));
    }
}
