//! Segment assembly
//!
//! Turns closed segments into persisted records: book metadata merged with
//! the segment's own fields, content without delimiter lines, and a
//! filesystem-safe identifier.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::classifier::is_delimiter;
use crate::helpers::{sanitize_file_name, slug, truncate_chars};
use crate::metadata::{Metadata, KEY_DIVISION, KEY_SECTION_TITLE, KEY_SUBSCRIPTURE_TITLE, META_KEYS_TEMPLATE};
use crate::types::Segment;
use crate::NOT_AVAILABLE;

pub const MAX_SLUG_CHARS: usize = 50;
pub const MAX_IDENTIFIER_CHARS: usize = 200;

/// "Chia Đoạn" value of whole-document records
pub const FULL_DOCUMENT_LABEL: &str = "Toàn bộ tài liệu";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RecordContent {
    /// Segment records: one entry per line
    Lines(Vec<String>),
    /// Whole-document records: lines joined with "\n"
    Joined(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentRecord {
    pub metadata: Metadata,
    pub content: RecordContent,
}

impl SegmentRecord {
    pub fn lines(&self) -> Vec<&str> {
        match &self.content {
            RecordContent::Lines(lines) => lines.iter().map(|s| s.as_str()).collect(),
            RecordContent::Joined(text) => text.lines().collect(),
        }
    }
}

/// A record together with the key it is stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledSegment {
    pub identifier: String,
    pub record: SegmentRecord,
}

/// Identifier of a segment record.
///
/// Example: "Kinh_Truong_A_Ham_pham_01_phamimodau_kinh_001_1kinhdaibon"
pub fn derive_identifier(base_id: &str, segment: &Segment) -> String {
    let mut parts: Vec<String> = vec![base_id.to_string()];

    if segment.section_index > 0 {
        parts.push(format!("pham_{:02}", segment.section_index));
        if let Some(title) = &segment.section_title {
            let s = slug(title, MAX_SLUG_CHARS);
            if !s.is_empty() {
                parts.push(s);
            }
        }
    }

    if segment.subscripture_index > 0 {
        parts.push(format!("kinh_{:03}", segment.subscripture_index));
        if let Some(title) = &segment.subscripture_title {
            let s = slug(title, MAX_SLUG_CHARS);
            if !s.is_empty() {
                parts.push(s);
            }
        }
    }

    truncate_chars(&sanitize_file_name(&parts.join("_")), MAX_IDENTIFIER_CHARS)
}

fn complete_metadata(mut metadata: Metadata) -> Metadata {
    metadata.fill_missing(META_KEYS_TEMPLATE.iter().copied());
    metadata
}

/// Build the persisted record of a segment. Returns None if nothing is left
/// after removing blank and delimiter lines.
pub fn assemble(segment: &Segment, book_metadata: &Metadata, base_id: &str) -> Option<AssembledSegment> {
    let content: Vec<String> = segment.content
        .iter()
        .filter(|line| !line.trim().is_empty() && !is_delimiter(line))
        .cloned()
        .collect();

    if content.is_empty() {
        return None;
    }

    let mut metadata = book_metadata.clone();
    metadata.set(KEY_SUBSCRIPTURE_TITLE, segment.subscripture_title.as_deref().unwrap_or(NOT_AVAILABLE));
    metadata.set(KEY_SECTION_TITLE, segment.section_title.as_deref().unwrap_or(NOT_AVAILABLE));
    metadata.set(KEY_DIVISION, segment.division_mode.label());

    Some(AssembledSegment {
        identifier: derive_identifier(base_id, segment),
        record: SegmentRecord {
            metadata: complete_metadata(metadata),
            content: RecordContent::Lines(content),
        },
    })
}

/// Record holding the whole document text under the base identifier.
pub fn full_document_record<S: AsRef<str>>(lines: &[S], book_metadata: &Metadata, base_id: &str) -> Option<AssembledSegment> {
    if lines.is_empty() {
        return None;
    }

    let mut metadata = book_metadata.clone();
    metadata.set(KEY_SUBSCRIPTURE_TITLE, NOT_AVAILABLE);
    metadata.set(KEY_SECTION_TITLE, NOT_AVAILABLE);
    metadata.set(KEY_DIVISION, FULL_DOCUMENT_LABEL);

    let text = lines.iter().map(|l| l.as_ref()).collect::<Vec<&str>>().join("\n");

    Some(AssembledSegment {
        identifier: truncate_chars(&sanitize_file_name(base_id), MAX_IDENTIFIER_CHARS),
        record: SegmentRecord {
            metadata: complete_metadata(metadata),
            content: RecordContent::Joined(text),
        },
    })
}

/// Keeps identifiers unique within one document.
///
/// A delimiter inside a sub-scripture closes a segment without changing the
/// indexes, so the next segment derives the same identifier. Repeats get a
/// "_part_N" suffix, starting at 2.
#[derive(Debug, Default)]
pub struct IdentifierRegistry {
    seen: HashMap<String, u32>,
}

impl IdentifierRegistry {
    pub fn new() -> Self {
        IdentifierRegistry::default()
    }

    pub fn unique(&mut self, identifier: &str) -> String {
        let count = self.seen.entry(identifier.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 {
            identifier.to_string()
        } else {
            let suffix = format!("_part_{}", count);
            let keep = MAX_IDENTIFIER_CHARS.saturating_sub(suffix.chars().count());
            format!("{}{}", truncate_chars(identifier, keep), suffix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DivisionMode;

    fn segment(section: Option<(&str, u32)>, sub: Option<(&str, u32)>, content: &[&str]) -> Segment {
        Segment {
            section_title: section.map(|(t, _)| t.to_string()),
            section_index: section.map(|(_, i)| i).unwrap_or(0),
            subscripture_title: sub.map(|(t, _)| t.to_string()),
            subscripture_index: sub.map(|(_, i)| i).unwrap_or(0),
            content: content.iter().map(|s| s.to_string()).collect(),
            division_mode: DivisionMode::SectionAndSubscripture,
        }
    }

    #[test]
    fn test_derive_identifier() {
        let s = segment(Some(("PHẨM I: Mở đầu", 1)), Some(("1. KINH Đại Bổn", 1)), &["x"]);
        assert_eq!(derive_identifier("Truong_A_Ham", &s), "Truong_A_Ham_pham_01_phamimodau_kinh_001_1kinhdaibon");

        let s = segment(None, Some(("KINH Phạm Võng", 12)), &["x"]);
        assert_eq!(derive_identifier("Truong_A_Ham", &s), "Truong_A_Ham_kinh_012_kinhphamvong");

        let s = segment(None, None, &["x"]);
        assert_eq!(derive_identifier("Truong_A_Ham", &s), "Truong_A_Ham");
    }

    #[test]
    fn test_identifier_is_bounded() {
        let base = "b".repeat(190);
        let s = segment(Some(("PHẨM I", 1)), Some(("KINH X", 1)), &["x"]);
        assert_eq!(derive_identifier(&base, &s).chars().count(), MAX_IDENTIFIER_CHARS);
    }

    #[test]
    fn test_assemble_fills_metadata() {
        let s = segment(None, Some(("KINH A", 1)), &["KINH A", "---o0o---", "", "nội dung"]);
        let a = assemble(&s, &Metadata::book_template(), "doc").unwrap();
        assert_eq!(a.record.content, RecordContent::Lines(vec!["KINH A".to_string(), "nội dung".to_string()]));
        assert_eq!(a.record.metadata.get(KEY_SUBSCRIPTURE_TITLE), Some("KINH A"));
        assert_eq!(a.record.metadata.get(KEY_SECTION_TITLE), Some(NOT_AVAILABLE));
        assert_eq!(a.record.metadata.get(KEY_DIVISION), Some("Theo phẩm, theo kinh nhỏ"));
        assert!(a.record.metadata.is_complete());
    }

    #[test]
    fn test_assemble_skips_delimiter_only() {
        let s = segment(None, None, &["---o0o---", "  "]);
        assert!(assemble(&s, &Metadata::new(), "doc").is_none());
    }

    #[test]
    fn test_full_document_record() {
        let a = full_document_record(&["a", "b"], &Metadata::new(), "doc name").unwrap();
        assert_eq!(a.identifier, "doc_name");
        assert_eq!(a.record.content, RecordContent::Joined("a\nb".to_string()));
        assert_eq!(a.record.metadata.get(KEY_DIVISION), Some(FULL_DOCUMENT_LABEL));
        assert!(a.record.metadata.is_complete());

        let empty: [&str; 0] = [];
        assert!(full_document_record(&empty, &Metadata::new(), "doc").is_none());
    }

    #[test]
    fn test_identifier_registry() {
        let mut reg = IdentifierRegistry::new();
        assert_eq!(reg.unique("a"), "a");
        assert_eq!(reg.unique("a"), "a_part_2");
        assert_eq!(reg.unique("b"), "b");
        assert_eq!(reg.unique("a"), "a_part_3");
    }

    #[test]
    fn test_repeated_long_identifier_stays_in_limit() {
        let mut reg = IdentifierRegistry::new();
        let long = "đ".repeat(MAX_IDENTIFIER_CHARS);
        assert_eq!(reg.unique(&long), long);

        let second = reg.unique(&long);
        assert_eq!(second.chars().count(), MAX_IDENTIFIER_CHARS);
        assert!(second.ends_with("_part_2"));
        assert_ne!(second, long);
    }
}
