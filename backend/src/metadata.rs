//! Bibliographic metadata for scripture books
//!
//! Metadata records are flat string maps keyed by the field names of the
//! Taishō (Đại Chánh) catalogue. Every persisted record carries every key of
//! `META_KEYS_TEMPLATE`; unknown values hold the `NOT_AVAILABLE` sentinel.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::enrich::MetadataEnricher;
use crate::helpers::normalize_key;
use crate::NOT_AVAILABLE;

pub const KEY_SUBSCRIPTURE_TITLE: &str = "Tên Kinh Nhỏ";
pub const KEY_SECTION_TITLE: &str = "Số Phẩm";
pub const KEY_DIVISION: &str = "Chia Đoạn";

/// Every field of a persisted metadata record
pub const META_KEYS_TEMPLATE: [&str; 21] = [
    "STT", "Tên Tạng", "Bộ", "Tập Số (Đại Chánh)", "Số Hiệu (Đại Chánh)", "Việt Dịch (Số tập)",
    "Tên Kinh Đầy Đủ", "Tên Tiếng Hán", "Tên Kinh rút gọn", "Hán Dịch", "Việt Dịch",
    "Khảo Dịch - Hiệu đính", "Năm xuất bản", "Số Quyển", "Chủ đề chính", "Từ khóa liên quan",
    "ONIX tương ứng (gợi ý)", "Ghi chú",
    KEY_SUBSCRIPTURE_TITLE, KEY_SECTION_TITLE, KEY_DIVISION,
];

/// Fields filled per segment, not per book
pub const SEGMENT_KEYS: [&str; 3] = [KEY_SUBSCRIPTURE_TITLE, KEY_SECTION_TITLE, KEY_DIVISION];

/// Fields describing the whole book
pub fn book_keys() -> impl Iterator<Item = &'static str> {
    META_KEYS_TEMPLATE.iter().copied().filter(|k| !SEGMENT_KEYS.contains(k))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    pub fn new() -> Self {
        Metadata(BTreeMap::new())
    }

    /// Book-level fields, all set to the sentinel.
    pub fn book_template() -> Self {
        let mut m = Metadata::new();
        m.fill_missing(book_keys());
        m
    }

    /// Book-level fields taken from a flat JSON object. Scalars are
    /// converted to strings, absent, null or nested values become the
    /// sentinel, and keys outside the template are dropped.
    pub fn book_from_value(value: &Value) -> Self {
        let mut m = Metadata::new();
        for key in book_keys() {
            let v = match value.get(key) {
                Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
                Some(Value::Number(n)) => n.to_string(),
                Some(Value::Bool(b)) => b.to_string(),
                _ => NOT_AVAILABLE.to_string(),
            };
            m.set(key, &v);
        }
        m
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn fill_missing<'a>(&mut self, keys: impl IntoIterator<Item = &'a str>) {
        for key in keys {
            self.0.entry(key.to_string()).or_insert_with(|| NOT_AVAILABLE.to_string());
        }
    }

    /// True if every template field is present.
    pub fn is_complete(&self) -> bool {
        META_KEYS_TEMPLATE.iter().all(|k| self.0.contains_key(*k))
    }

    /// True if no book-level field has a real value.
    pub fn is_all_sentinel(&self) -> bool {
        book_keys().all(|k| self.get(k).is_none_or(|v| v == NOT_AVAILABLE))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Source of book-level metadata by title
pub trait MetadataProvider: Send + Sync {
    fn lookup(&self, title: &str) -> Option<Metadata>;
}

/// Metadata index loaded from a JSON file of `{ "<title>": { <fields> } }`.
///
/// Titles are stored by their normalized key, so "Trường A Hàm" and
/// "TRUONG-A-HAM" find the same record.
#[derive(Debug, Clone, Default)]
pub struct LocalMetadataIndex {
    entries: HashMap<String, Metadata>,
}

impl LocalMetadataIndex {
    pub fn new() -> Self {
        LocalMetadataIndex::default()
    }

    pub fn from_value(data: &Value) -> Result<Self> {
        let obj = data.as_object()
            .ok_or_else(|| anyhow::anyhow!("Metadata index must be a JSON object"))?;

        let mut index = LocalMetadataIndex::new();
        for (title, record) in obj {
            if !record.is_object() {
                warn!("Skipping metadata entry '{}': not an object", title);
                continue;
            }
            index.insert(title, Metadata::book_from_value(record));
        }
        Ok(index)
    }

    /// Load the index. A missing file gives an empty index.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No metadata index at {}, starting empty", path.display());
            return Ok(LocalMetadataIndex::new());
        }

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read metadata index: {}", path.display()))?;
        let data: Value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse metadata index: {}", path.display()))?;

        let index = LocalMetadataIndex::from_value(&data)?;
        info!("Loaded {} metadata entries from {}", index.len(), path.display());
        Ok(index)
    }

    /// Write the index with normalized keys.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
        }

        let sorted: BTreeMap<&String, &Metadata> = self.entries.iter().collect();
        let json = serde_json::to_string_pretty(&sorted)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write metadata index: {}", path.display()))?;
        Ok(())
    }

    pub fn insert(&mut self, title: &str, metadata: Metadata) {
        self.entries.insert(normalize_key(Some(title)), metadata);
    }

    pub fn get(&self, title: &str) -> Option<&Metadata> {
        self.entries.get(&normalize_key(Some(title)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl MetadataProvider for LocalMetadataIndex {
    fn lookup(&self, title: &str) -> Option<Metadata> {
        self.get(title).cloned()
    }
}

/// Local index first, then the remote enricher. Remote results are added to
/// the index and written back to the cache file.
pub struct CachedMetadataProvider {
    index: Mutex<LocalMetadataIndex>,
    cache_path: Option<PathBuf>,
    enricher: Option<Box<dyn MetadataEnricher>>,
}

impl CachedMetadataProvider {
    pub fn new(index: LocalMetadataIndex) -> Self {
        CachedMetadataProvider {
            index: Mutex::new(index),
            cache_path: None,
            enricher: None,
        }
    }

    pub fn with_cache_path(mut self, path: PathBuf) -> Self {
        self.cache_path = Some(path);
        self
    }

    pub fn with_enricher(mut self, enricher: Box<dyn MetadataEnricher>) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.lock().is_empty()
    }
}

impl MetadataProvider for CachedMetadataProvider {
    fn lookup(&self, title: &str) -> Option<Metadata> {
        if let Some(m) = self.index.lock().get(title) {
            info!("Found local metadata for '{}'", title);
            return Some(m.clone());
        }

        let enricher = self.enricher.as_ref()?;

        let metadata = match enricher.enrich(title) {
            Ok(m) => m,
            Err(e) => {
                warn!("Metadata enrichment failed for '{}': {}", title, e);
                return None;
            }
        };

        let mut index = self.index.lock();
        index.insert(title, metadata.clone());
        if let Some(path) = &self.cache_path {
            match index.save(path) {
                Ok(()) => info!("Saved metadata cache to {}", path.display()),
                Err(e) => warn!("Failed to save metadata cache: {:#}", e),
            }
        }

        Some(metadata)
    }
}

/// The title used to look up a document's metadata: an explicit override
/// for the file stem if there is one, otherwise the stem with underscores as
/// spaces.
pub fn resolve_meta_title(file_stem: &str, overrides: &HashMap<String, String>) -> String {
    match overrides.get(file_stem) {
        Some(title) => title.clone(),
        None => file_stem.replace('_', " ").trim().to_string(),
    }
}
