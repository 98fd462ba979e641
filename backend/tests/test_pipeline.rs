mod helpers;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use serde_json::{json, Value};

use kinhsach_backend::assembler::{SegmentRecord, MAX_IDENTIFIER_CHARS};
use kinhsach_backend::enrich::{EnrichError, MetadataEnricher};
use kinhsach_backend::metadata::{CachedMetadataProvider, LocalMetadataIndex, Metadata, MetadataProvider};
use kinhsach_backend::pipeline::{discover_documents, DocumentOutcome, DocumentProcessor};
use kinhsach_backend::segmenter::{Dialect, SegmenterOptions};
use kinhsach_backend::sink::{JsonDirSink, MemorySink, SegmentSink, SinkError};
use kinhsach_backend::source::InMemorySource;
use kinhsach_backend::types::DivisionMode;

use helpers::logging_setup;

const TRUONG_A_HAM: &str = "\
MỤC LỤC
PHẨM I: Mở đầu
---o0o---
PHẨM I: Mở đầu
Nội dung A
1. KINH Alpha
Nội dung B
---o0o---
PHẨM II
Nội dung C
";

fn write_doc(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

struct FakeEnricher;

impl MetadataEnricher for FakeEnricher {
    fn enrich(&self, title: &str) -> Result<Metadata, EnrichError> {
        if title == "Offline" {
            return Err(EnrichError::EmptyResponse);
        }
        Ok(Metadata::book_from_value(&json!({ "Tên Kinh Đầy Đủ": title })))
    }
}

/// Fails for identifiers containing "kinh"
struct FlakySink {
    inner: MemorySink,
    failures: Mutex<Vec<String>>,
}

impl SegmentSink for FlakySink {
    fn write(&self, identifier: &str, record: &SegmentRecord) -> Result<(), SinkError> {
        if identifier.contains("kinh") {
            self.failures.lock().push(identifier.to_string());
            return Err(SinkError::InvalidIdentifier(identifier.to_string()));
        }
        self.inner.write(identifier, record)
    }
}

#[test]
fn test_extract_directory_to_json() {
    logging_setup();
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let full = tempfile::tempdir().unwrap();

    let doc_path = write_doc(input.path(), "Kinh-Truong-A-Ham-HT-Tue-Sy-Dich.txt", TRUONG_A_HAM);

    let index = LocalMetadataIndex::from_value(&json!({
        "Trường A Hàm": { "Bộ": "Trường A Hàm", "Tên Tạng": "A Hàm" }
    })).unwrap();

    let mut overrides = HashMap::new();
    overrides.insert("Kinh-Truong-A-Ham-HT-Tue-Sy-Dich".to_string(), "Trường A Hàm".to_string());

    let sink = JsonDirSink::new(output.path()).unwrap();
    let full_sink = JsonDirSink::new(full.path()).unwrap();
    let processor = DocumentProcessor::new(&index, &sink, Dialect::Preamble.options())
        .with_title_overrides(overrides)
        .with_full_doc_sink(&full_sink);

    let report = processor.process_file(&doc_path).unwrap();
    assert!(report.metadata_found);
    assert_eq!(report.meta_title, "Trường A Hàm");
    assert_eq!(report.division_mode, DivisionMode::SectionAndSubscripture);
    assert_eq!(report.segments, 3);
    assert_eq!(report.records_written, 3);
    assert!(report.full_doc_written);

    let mut written: Vec<String> = fs::read_dir(output.path()).unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    written.sort();
    assert_eq!(written, vec![
        "Kinh-Truong-A-Ham-HT-Tue-Sy-Dich_pham_01_phamimodau.json",
        "Kinh-Truong-A-Ham-HT-Tue-Sy-Dich_pham_01_phamimodau_kinh_001_1kinhalpha.json",
        "Kinh-Truong-A-Ham-HT-Tue-Sy-Dich_pham_02_phamii.json",
    ]);

    let record = read_json(&output.path().join(&written[1]));
    assert_eq!(record["content"], json!(["1. KINH Alpha", "Nội dung B"]));
    assert_eq!(record["metadata"]["Bộ"], json!("Trường A Hàm"));
    assert_eq!(record["metadata"]["Tên Kinh Nhỏ"], json!("1. KINH Alpha"));
    assert_eq!(record["metadata"]["Số Phẩm"], json!("PHẨM I: Mở đầu"));
    assert_eq!(record["metadata"]["Ghi chú"], json!("Not_Available"));

    let full_record = read_json(&full.path().join("Kinh-Truong-A-Ham-HT-Tue-Sy-Dich.json"));
    assert_eq!(full_record["metadata"]["Chia Đoạn"], json!("Toàn bộ tài liệu"));
    assert!(full_record["content"].as_str().unwrap().starts_with("MỤC LỤC\nPHẨM I: Mở đầu\n---o0o---"));
}

#[test]
fn test_missing_metadata_uses_template() {
    logging_setup();
    let index = LocalMetadataIndex::new();
    let sink = MemorySink::new();
    let processor = DocumentProcessor::new(&index, &sink, SegmenterOptions::default());

    let report = processor.process_lines("Kinh_Le", &["Như vầy tôi nghe."]);
    assert!(!report.metadata_found);
    assert_eq!(report.meta_title, "Kinh Le");

    let (id, record) = sink.records().remove(0);
    assert_eq!(id, "Kinh_Le_kinh_001_kinhle");
    assert!(record.metadata.is_complete());
    assert!(record.metadata.is_all_sentinel());
    assert_eq!(record.metadata.get("Tên Kinh Nhỏ"), Some("Kinh Le"));
}

#[test]
fn test_write_failures_do_not_stop_the_document() {
    logging_setup();
    let index = LocalMetadataIndex::new();
    let sink = FlakySink { inner: MemorySink::new(), failures: Mutex::new(Vec::new()) };
    let processor = DocumentProcessor::new(&index, &sink, SegmenterOptions::default());

    let report = processor.process_lines("doc", &["PHẨM I", "a", "KINH X", "b", "PHẨM II", "c"]);
    assert_eq!(report.segments, 3);
    assert_eq!(report.write_failures, 1);
    assert_eq!(report.records_written, 2);
    assert_eq!(sink.inner.identifiers(), vec!["doc_pham_01_phami", "doc_pham_02_phamii"]);
}

#[test]
fn test_enrichment_is_cached() {
    logging_setup();
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("metadata_cache.json");

    let provider = CachedMetadataProvider::new(LocalMetadataIndex::new())
        .with_cache_path(cache_path.clone())
        .with_enricher(Box::new(FakeEnricher));

    let first = provider.lookup("Tăng Nhất A Hàm").unwrap();
    let second = provider.lookup("TANG NHAT A HAM").unwrap();
    assert_eq!(first, second);
    assert_eq!(first.get("Tên Kinh Đầy Đủ"), Some("Tăng Nhất A Hàm"));
    assert_eq!(provider.len(), 1);

    assert!(provider.lookup("Offline").is_none());
    assert_eq!(provider.len(), 1);

    let sink = MemorySink::new();
    let processor = DocumentProcessor::new(&provider, &sink, SegmenterOptions::default());
    let report = processor.process_lines("Offline", &["một"]);
    assert!(!report.metadata_found);
    assert!(sink.records()[0].1.metadata.is_all_sentinel());

    let reloaded = LocalMetadataIndex::load(&cache_path).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert!(reloaded.get("tang nhat a ham").is_some());
}

#[test]
fn test_long_names_keep_identifiers_in_limit() {
    logging_setup();
    let index = LocalMetadataIndex::new();
    let sink = MemorySink::new();
    let processor = DocumentProcessor::new(&index, &sink, SegmenterOptions::default());

    let name = "d".repeat(195);
    let report = processor.process_lines(&name, &["KINH A", "một", "---o0o---", "hai"]);
    assert_eq!(report.segments, 2);
    assert_eq!(report.records_written, 2);

    let ids = sink.identifiers();
    assert_eq!(ids.len(), 2);
    assert!(ids.iter().all(|id| id.chars().count() <= MAX_IDENTIFIER_CHARS), "{:?}", ids);
    assert!(ids.iter().any(|id| id.ends_with("_part_2")));
}

#[test]
fn test_word_token_sections() {
    logging_setup();
    let index = LocalMetadataIndex::new();
    let sink = MemorySink::new();
    let processor = DocumentProcessor::new(&index, &sink, SegmenterOptions::default());

    let report = processor.process_lines("doc", &["PHẨM MỞ ĐẦU", "a", "PHẨM TỨ ĐẾ", "b"]);
    assert_eq!(report.division_mode, DivisionMode::SectionOnly);
    assert_eq!(report.segments, 2);
    assert_eq!(sink.identifiers(), vec!["doc_pham_01_phammodau", "doc_pham_02_phamtude"]);
}

#[test]
fn test_batch_processes_documents_in_parallel() {
    logging_setup();
    let input = tempfile::tempdir().unwrap();
    for i in 1..=6 {
        write_doc(input.path(), &format!("doc{}.txt", i), "KINH A\nmột\nKINH B\nhai\n");
    }
    write_doc(input.path(), "notes.md", "KINH A\n");

    let paths = discover_documents(input.path(), "txt", false).unwrap();
    assert_eq!(paths.len(), 6);

    let index = LocalMetadataIndex::new();
    let sink = MemorySink::new();
    let processor = DocumentProcessor::new(&index, &sink, SegmenterOptions::default());

    let done = AtomicUsize::new(0);
    let cancel = AtomicBool::new(false);
    let stats = processor.process_batch(&paths, 3, &cancel, |_, outcome| {
        assert!(matches!(outcome, DocumentOutcome::Processed(_)));
        done.fetch_add(1, Ordering::SeqCst);
    }).unwrap();

    assert_eq!(done.load(Ordering::SeqCst), 6);
    assert_eq!(stats.documents, 6);
    assert_eq!(stats.records_written, 12);
    assert_eq!(sink.len(), 12);
}

#[test]
fn test_cancelled_batch_skips_documents() {
    logging_setup();
    let input = tempfile::tempdir().unwrap();
    let paths: Vec<PathBuf> = (1..=3)
        .map(|i| write_doc(input.path(), &format!("doc{}.txt", i), "một\n"))
        .collect();

    let index = LocalMetadataIndex::new();
    let sink = MemorySink::new();
    let processor = DocumentProcessor::new(&index, &sink, SegmenterOptions::default());

    let cancel = AtomicBool::new(true);
    let stats = processor.process_batch(&paths, 2, &cancel, |_, _| {}).unwrap();
    assert_eq!(stats.skipped_documents, 3);
    assert_eq!(stats.documents, 0);
    assert!(sink.is_empty());
}

#[test]
fn test_missing_file_is_a_failed_document() {
    logging_setup();
    let index = LocalMetadataIndex::new();
    let sink = MemorySink::new();
    let processor = DocumentProcessor::new(&index, &sink, SegmenterOptions::default());

    let cancel = AtomicBool::new(false);
    let paths = vec![PathBuf::from("/nonexistent/doc.txt")];
    let stats = processor.process_batch(&paths, 1, &cancel, |_, _| {}).unwrap();
    assert_eq!(stats.failed_documents, 1);
}

#[test]
fn test_in_memory_source() {
    logging_setup();
    let index = LocalMetadataIndex::new();
    let sink = MemorySink::new();
    let processor = DocumentProcessor::new(&index, &sink, SegmenterOptions::default());

    let source = InMemorySource::new("Kinh Tap", "PHẦN 1\nmột\nPHẦN 2\nhai");
    let report = processor.process_source(&source).unwrap();
    assert_eq!(report.division_mode, DivisionMode::SectionOnly);
    assert_eq!(sink.identifiers(), vec!["Kinh_Tap_pham_01_phan1", "Kinh_Tap_pham_02_phan2"]);

    let unnamed = InMemorySource::new("", "một");
    assert!(processor.process_source(&unnamed).is_err());
}
