//! Retrieval chunks
//!
//! Breaks the content of segment records into passages short enough for an
//! embedding model. Each passage keeps the record metadata, the source file
//! name and a running paragraph number (`doan_so`).

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::assembler::SegmentRecord;

pub const MAX_CHUNK_CHARS: usize = 512;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub content: String,
    pub metadata: Map<String, Value>,
    pub last_updated: DateTime<Utc>,
}

/// Split before an upper-case letter that follows ".", "!" or "?" and
/// whitespace. Abbreviations followed by a capitalized name are split too.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        current.push(c);

        if matches!(c, '.' | '!' | '?') {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j > i + 1 && j < chars.len() && chars[j].is_uppercase() {
                sentences.push(current.trim().to_string());
                current.clear();
                i = j;
                continue;
            }
        }

        i += 1;
    }

    if !current.trim().is_empty() {
        sentences.push(current.trim().to_string());
    }

    sentences
}

/// Pack whole sentences into chunks of at most `max_chars` characters. A
/// single sentence longer than the limit becomes a chunk on its own.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in split_sentences(text) {
        let len = sentence.chars().count();
        if current_len == 0 {
            current = sentence;
            current_len = len;
        } else if current_len + 1 + len <= max_chars {
            current.push(' ');
            current.push_str(&sentence);
            current_len += 1 + len;
        } else {
            chunks.push(std::mem::take(&mut current));
            current = sentence;
            current_len = len;
        }
    }

    if current_len > 0 {
        chunks.push(current);
    }

    chunks
}

/// Chunks of every content line of a record. Lines repeated within the
/// record are chunked once. `doan_so` counts from 1.
pub fn chunk_record(record: &SegmentRecord, source_file: &str, max_chars: usize) -> Vec<Chunk> {
    let mut base = Map::new();
    for (k, v) in record.metadata.iter() {
        base.insert(k.clone(), Value::String(v.clone()));
    }
    base.insert("source_file".to_string(), Value::String(source_file.to_string()));

    let now = Utc::now();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut doan_so: u64 = 0;
    let mut chunks = Vec::new();

    for line in record.lines() {
        let line = line.trim();
        if line.is_empty() || !seen.insert(line) {
            continue;
        }

        for content in chunk_text(line, max_chars) {
            doan_so += 1;
            let mut metadata = base.clone();
            metadata.insert("doan_so".to_string(), Value::from(doan_so));
            chunks.push(Chunk { content, metadata, last_updated: now });
        }
    }

    chunks
}
