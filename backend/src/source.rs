//! Paragraph sources
//!
//! A document is read as a sequence of paragraphs, one per line of a UTF-8
//! text file. Text is NFC-normalized so that precomposed and decomposed
//! Vietnamese diacritics compare equal in the classifier.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use unicode_normalization::UnicodeNormalization;

pub fn normalize_paragraph(text: &str) -> String {
    text.trim_start_matches('\u{feff}')
        .trim_end_matches(['\r', '\n'])
        .nfc()
        .collect()
}

/// Lazy iterator over the paragraphs of a text file
pub struct Paragraphs {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
}

impl Iterator for Paragraphs {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next().map(|line| {
            line.map(|l| normalize_paragraph(&l))
                .with_context(|| format!("Failed to read line from {}", self.path.display()))
        })
    }
}

pub fn read_paragraphs(path: &Path) -> Result<Paragraphs> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open document: {}", path.display()))?;
    Ok(Paragraphs {
        path: path.to_path_buf(),
        lines: BufReader::new(file).lines(),
    })
}

/// Anything that can yield the paragraphs of one document.
pub trait ParagraphSource {
    /// Display name of the document, used for metadata lookup and identifiers.
    fn display_name(&self) -> String;

    fn paragraphs(&self) -> Result<Vec<String>>;
}

/// A plain text file on disk
#[derive(Debug, Clone)]
pub struct TextFileSource {
    pub path: PathBuf,
}

impl TextFileSource {
    pub fn new(path: &Path) -> Self {
        TextFileSource { path: path.to_path_buf() }
    }
}

impl ParagraphSource for TextFileSource {
    fn display_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    fn paragraphs(&self) -> Result<Vec<String>> {
        read_paragraphs(&self.path)?.collect()
    }
}

/// Paragraphs already in memory
#[derive(Debug, Clone)]
pub struct InMemorySource {
    pub name: String,
    pub lines: Vec<String>,
}

impl InMemorySource {
    pub fn new(name: &str, text: &str) -> Self {
        InMemorySource {
            name: name.to_string(),
            lines: text.lines().map(normalize_paragraph).collect(),
        }
    }
}

impl ParagraphSource for InMemorySource {
    fn display_name(&self) -> String {
        self.name.clone()
    }

    fn paragraphs(&self) -> Result<Vec<String>> {
        Ok(self.lines.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_normalize_paragraph_composes() {
        // "ệ" written as e + combining circumflex + combining dot below
        let decomposed = "Kinh Vie\u{0302}\u{0323}t";
        assert_eq!(normalize_paragraph(decomposed), "Kinh Việt");
        assert_eq!(normalize_paragraph("\u{feff}PHẨM I\r"), "PHẨM I");
    }

    #[test]
    fn test_read_paragraphs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Truong_A_Ham.txt");
        fs::write(&path, "PHẨM I\r\n\r\nKINH A\nnội dung\n").unwrap();

        let lines: Vec<String> = read_paragraphs(&path).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(lines, vec!["PHẨM I", "", "KINH A", "nội dung"]);

        let source = TextFileSource::new(&path);
        assert_eq!(source.display_name(), "Truong_A_Ham");
        assert_eq!(source.paragraphs().unwrap().len(), 4);
    }

    #[test]
    fn test_read_missing_file() {
        assert!(read_paragraphs(Path::new("/nonexistent/doc.txt")).is_err());
    }
}
