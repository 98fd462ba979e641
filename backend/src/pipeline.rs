//! Document and batch processing
//!
//! One document: look up book metadata, segment the lines, assemble each
//! segment and hand the records to the sink. A batch runs documents in
//! parallel, each with its own segmenter.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use crate::assembler::{assemble, full_document_record, IdentifierRegistry};
use crate::helpers::base_filename;
use crate::logger::{error, info, warn};
use crate::metadata::{resolve_meta_title, Metadata, MetadataProvider};
use crate::segmenter::{segment_lines, SegmenterOptions};
use crate::sink::SegmentSink;
use crate::source::{read_paragraphs, ParagraphSource};
use crate::types::DivisionMode;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DocumentReport {
    pub name: String,
    pub meta_title: String,
    pub metadata_found: bool,
    pub division_mode: DivisionMode,
    pub segments: usize,
    pub records_written: usize,
    pub write_failures: usize,
    pub full_doc_written: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct BatchStats {
    pub documents: usize,
    pub failed_documents: usize,
    pub skipped_documents: usize,
    pub segments: usize,
    pub records_written: usize,
    pub write_failures: usize,
}

impl BatchStats {
    pub fn add(&mut self, report: &DocumentReport) {
        self.documents += 1;
        self.segments += report.segments;
        self.records_written += report.records_written;
        self.write_failures += report.write_failures;
    }
}

/// What happened to one document of a batch
#[derive(Debug)]
pub enum DocumentOutcome {
    Processed(DocumentReport),
    Failed(anyhow::Error),
    /// Not started because the batch was cancelled
    Skipped,
}

pub struct DocumentProcessor<'a> {
    provider: &'a dyn MetadataProvider,
    sink: &'a dyn SegmentSink,
    full_doc_sink: Option<&'a dyn SegmentSink>,
    options: SegmenterOptions,
    title_overrides: HashMap<String, String>,
    delay: Duration,
}

impl<'a> DocumentProcessor<'a> {
    pub fn new(provider: &'a dyn MetadataProvider, sink: &'a dyn SegmentSink, options: SegmenterOptions) -> Self {
        DocumentProcessor {
            provider,
            sink,
            full_doc_sink: None,
            options,
            title_overrides: HashMap::new(),
            delay: Duration::ZERO,
        }
    }

    /// Also write one whole-document record per document.
    pub fn with_full_doc_sink(mut self, sink: &'a dyn SegmentSink) -> Self {
        self.full_doc_sink = Some(sink);
        self
    }

    pub fn with_title_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.title_overrides = overrides;
        self
    }

    /// Pause after each document, to stay under remote API rate limits.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn book_metadata(&self, meta_title: &str) -> (Metadata, bool) {
        match self.provider.lookup(meta_title) {
            Some(m) => (m, true),
            None => {
                warn(&format!("No metadata for '{}', using empty template", meta_title));
                (Metadata::book_template(), false)
            }
        }
    }

    /// Process the lines of one document. `name` is the document's file stem.
    pub fn process_lines<S: AsRef<str>>(&self, name: &str, lines: &[S]) -> DocumentReport {
        let meta_title = resolve_meta_title(name, &self.title_overrides);
        let (book, metadata_found) = self.book_metadata(&meta_title);
        let base_id = base_filename(name);

        let doc = segment_lines(lines.iter().map(|l| l.as_ref()), &self.options, Some(meta_title.as_str()));
        info(&format!("{}: {} segments, {}", name, doc.segments.len(), doc.division_mode));

        let mut report = DocumentReport {
            name: name.to_string(),
            meta_title,
            metadata_found,
            division_mode: doc.division_mode,
            segments: 0,
            records_written: 0,
            write_failures: 0,
            full_doc_written: false,
        };

        let mut registry = IdentifierRegistry::new();
        for segment in &doc.segments {
            let Some(assembled) = assemble(segment, &book, &base_id) else {
                continue;
            };
            report.segments += 1;

            let identifier = registry.unique(&assembled.identifier);
            match self.sink.write(&identifier, &assembled.record) {
                Ok(()) => report.records_written += 1,
                Err(e) => {
                    error(&format!("{}: {}", name, e));
                    report.write_failures += 1;
                }
            }
        }

        if let Some(full_sink) = self.full_doc_sink {
            let trimmed: Vec<&str> = lines.iter().map(|l| l.as_ref().trim()).collect();
            if let Some(full) = full_document_record(&trimmed, &book, &base_id) {
                match full_sink.write(&full.identifier, &full.record) {
                    Ok(()) => report.full_doc_written = true,
                    Err(e) => error(&format!("{}: {}", name, e)),
                }
            }
        }

        report
    }

    pub fn process_file(&self, path: &Path) -> Result<DocumentReport> {
        let name = path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .with_context(|| format!("No file name: {}", path.display()))?;

        info(&format!("Processing {}", path.display()));
        let lines: Vec<String> = read_paragraphs(path)?.collect::<Result<_>>()?;
        Ok(self.finish_document(&name, &lines))
    }

    pub fn process_source(&self, source: &dyn ParagraphSource) -> Result<DocumentReport> {
        let name = source.display_name();
        if name.is_empty() {
            anyhow::bail!("Document source has no name");
        }
        let lines = source.paragraphs()?;
        Ok(self.finish_document(&name, &lines))
    }

    fn finish_document(&self, name: &str, lines: &[String]) -> DocumentReport {
        let report = self.process_lines(name, lines);
        if !self.delay.is_zero() {
            sleep(self.delay);
        }
        report
    }

    /// Process documents on up to `jobs` threads. Documents not yet started
    /// when `cancel` is set are skipped. `on_done` is called once per document
    /// from the worker thread.
    pub fn process_batch<F>(&self, paths: &[PathBuf], jobs: usize, cancel: &AtomicBool, on_done: F) -> Result<BatchStats>
    where
        F: Fn(&Path, &DocumentOutcome) + Sync,
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(jobs.max(1))
            .build()
            .context("Failed to build thread pool")?;

        let outcomes: Vec<DocumentOutcome> = pool.install(|| {
            paths.par_iter()
                .map(|path| {
                    let outcome = if cancel.load(Ordering::Relaxed) {
                        DocumentOutcome::Skipped
                    } else {
                        match self.process_file(path) {
                            Ok(report) => DocumentOutcome::Processed(report),
                            Err(e) => {
                                error(&format!("Failed to process {}: {:#}", path.display(), e));
                                DocumentOutcome::Failed(e)
                            }
                        }
                    };
                    on_done(path, &outcome);
                    outcome
                })
                .collect()
        });

        let mut stats = BatchStats::default();
        for outcome in &outcomes {
            match outcome {
                DocumentOutcome::Processed(report) => stats.add(report),
                DocumentOutcome::Failed(_) => stats.failed_documents += 1,
                DocumentOutcome::Skipped => stats.skipped_documents += 1,
            }
        }

        info(&format!(
            "Batch done: {} documents, {} failed, {} skipped, {} records written, {} write failures",
            stats.documents, stats.failed_documents, stats.skipped_documents, stats.records_written, stats.write_failures
        ));

        Ok(stats)
    }
}

/// Text documents directly in `dir` (or below it with `recursive`), sorted.
pub fn discover_documents(dir: &Path, extension: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("Input directory not found: {}", dir.display());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry.with_context(|| format!("Failed to read directory: {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_file()
            && path.extension().and_then(|e| e.to_str()).is_some_and(|e| e.eq_ignore_ascii_case(extension))
        {
            files.push(path.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}
