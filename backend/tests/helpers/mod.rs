use std::env;

use kinhsach_backend::classifier::is_delimiter;
use kinhsach_backend::logger;
use kinhsach_backend::types::SegmentedDocument;

/// Keep test logs out of the user data folder.
#[allow(dead_code)]
pub fn logging_setup() {
    logger::init_in_dir(&env::temp_dir().join("kinhsach-tests"));
}

#[allow(dead_code)]
pub fn lines(text: &str) -> Vec<String> {
    text.lines().map(|l| l.to_string()).collect()
}

/// All segment content in order.
#[allow(dead_code)]
pub fn flat_content(doc: &SegmentedDocument) -> Vec<String> {
    doc.segments.iter().flat_map(|s| s.content.iter().cloned()).collect()
}

/// Input lines which should reappear in segment content: trimmed, not
/// empty, not a delimiter.
#[allow(dead_code)]
pub fn content_lines(input: &[String]) -> Vec<String> {
    input.iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && !is_delimiter(l))
        .collect()
}
