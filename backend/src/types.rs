//! Core data structures for document segmentation
//!
//! This module defines the types shared by the classifier, the segmentation
//! state machine and the assembler.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a section-level heading
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SectionKind {
    /// PHẨM (chapter)
    Pham,
    /// PHẦN (part)
    Phan,
    /// CHƯƠNG (chapter)
    Chuong,
}

impl SectionKind {
    /// Match a heading keyword, case-insensitive.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_uppercase().as_str() {
            "PHẨM" => Some(SectionKind::Pham),
            "PHẦN" => Some(SectionKind::Phan),
            "CHƯƠNG" => Some(SectionKind::Chuong),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SectionKind::Pham => "PHẨM",
            SectionKind::Phan => "PHẦN",
            SectionKind::Chuong => "CHƯƠNG",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of examining one line of text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Classification {
    /// A standalone boundary marker, e.g. "---o0o---"
    Delimiter,
    /// A section heading, e.g. "PHẨM IV: Tên" or "3. PHẨM Tên"
    SectionHeader {
        kind: SectionKind,
        /// Raw number token as written: Roman, Arabic or a word
        number: String,
        /// Title fragment after the number, if any
        title: Option<String>,
        /// The trimmed header line
        text: String,
    },
    /// A sub-scripture heading, e.g. "1. KINH Alpha" or "KINH Phạm Võng"
    SubHeader {
        number: Option<String>,
        title: String,
        text: String,
    },
    /// Anything else, trimmed
    Content(String),
}

/// Which structural levels were detected across a whole document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DivisionMode {
    SectionAndSubscripture,
    SectionOnly,
    SubscriptureOnly,
    Undetermined,
}

impl DivisionMode {
    pub fn from_flags(seen_section: bool, seen_subscripture: bool) -> Self {
        match (seen_section, seen_subscripture) {
            (true, true) => DivisionMode::SectionAndSubscripture,
            (true, false) => DivisionMode::SectionOnly,
            (false, true) => DivisionMode::SubscriptureOnly,
            (false, false) => DivisionMode::Undetermined,
        }
    }

    /// The value written to the "Chia Đoạn" metadata field.
    pub fn label(&self) -> &'static str {
        match self {
            DivisionMode::SectionAndSubscripture => "Theo phẩm, theo kinh nhỏ",
            DivisionMode::SectionOnly => "Theo phẩm",
            DivisionMode::SubscriptureOnly => "Theo kinh nhỏ",
            DivisionMode::Undetermined => "Không xác định",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DivisionMode::SectionAndSubscripture => "by section and sub-scripture",
            DivisionMode::SectionOnly => "by section only",
            DivisionMode::SubscriptureOnly => "by sub-scripture only",
            DivisionMode::Undetermined => "undetermined",
        }
    }
}

impl fmt::Display for DivisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// A closed, immutable segment of a document.
///
/// `None` titles mean the level was not determined at the time the segment
/// was closed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Segment {
    pub section_title: Option<String>,
    pub section_index: u32,
    pub subscripture_title: Option<String>,
    pub subscripture_index: u32,
    pub content: Vec<String>,
    pub division_mode: DivisionMode,
}

/// Output of segmenting one document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentedDocument {
    pub segments: Vec<Segment>,
    pub division_mode: DivisionMode,
}
