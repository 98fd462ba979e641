use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use kinhsach_backend::config::AppConfig;
use kinhsach_backend::enrich::GeminiEnricher;
use kinhsach_backend::logger;
use kinhsach_backend::metadata::{CachedMetadataProvider, LocalMetadataIndex};
use kinhsach_backend::pipeline::{discover_documents, BatchStats, DocumentOutcome, DocumentProcessor};
use kinhsach_backend::segmenter::SegmenterOptions;
use kinhsach_backend::sink::JsonDirSink;

pub struct ExtractOptions {
    pub segmenter: SegmenterOptions,
    pub enrich: bool,
    pub jobs: usize,
    pub recursive: bool,
    pub fail_fast: bool,
}

fn build_provider(config: &AppConfig, enrich: bool) -> Result<CachedMetadataProvider> {
    let index = match LocalMetadataIndex::load(&config.metadata_cache_path) {
        Ok(index) => index,
        Err(e) => {
            logger::error(&format!("{:#}, starting with an empty metadata cache", e));
            LocalMetadataIndex::new()
        }
    };

    let mut provider = CachedMetadataProvider::new(index)
        .with_cache_path(config.metadata_cache_path.clone());

    if enrich {
        match &config.gemini_api_key {
            Some(key) => {
                let enricher = GeminiEnricher::new(key, &config.gemini_model)?
                    .with_retries(config.enrich_retries, Duration::from_secs(2));
                provider = provider.with_enricher(Box::new(enricher));
            }
            None => logger::warn("GEMINI_API_KEY is not set, remote metadata lookup is off"),
        }
    }

    Ok(provider)
}

fn print_summary(stats: &BatchStats, elapsed: Duration, output_dir: &Path) {
    println!();
    println!("{}", "Extraction finished".bold());
    println!("  Documents:       {}", stats.documents.to_string().green());
    if stats.failed_documents > 0 {
        println!("  Failed:          {}", stats.failed_documents.to_string().red());
    }
    if stats.skipped_documents > 0 {
        println!("  Skipped:         {}", stats.skipped_documents.to_string().yellow());
    }
    println!("  Segments:        {}", stats.segments);
    println!("  Records written: {}", stats.records_written.to_string().green());
    if stats.write_failures > 0 {
        println!("  Write failures:  {}", stats.write_failures.to_string().red());
    }
    println!("  Output:          {}", output_dir.display());
    println!("  Time:            {}", logger::format_duration(elapsed));
}

pub fn run_extract(config: &AppConfig, opts: &ExtractOptions) -> Result<BatchStats> {
    let started = Instant::now();

    let paths = discover_documents(&config.input_dir, "txt", opts.recursive)?;
    if paths.is_empty() {
        logger::warn(&format!("No .txt documents in {}", config.input_dir.display()));
        return Ok(BatchStats::default());
    }
    logger::info(&format!("Found {} documents in {}", paths.len(), config.input_dir.display()));

    let sink = JsonDirSink::new(&config.segments_dir)
        .with_context(|| format!("Failed to create output directory: {}", config.segments_dir.display()))?;

    let full_doc_sink = match &config.full_doc_dir {
        Some(dir) => Some(JsonDirSink::new(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?),
        None => None,
    };

    let provider = build_provider(config, opts.enrich)?;

    let mut processor = DocumentProcessor::new(&provider, &sink, opts.segmenter)
        .with_title_overrides(config.file_to_meta_key.clone());
    if let Some(full) = &full_doc_sink {
        processor = processor.with_full_doc_sink(full);
    }
    if opts.enrich && config.gemini_api_key.is_some() {
        processor = processor.with_delay(Duration::from_millis(config.request_delay_ms));
    }

    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );

    let cancel = AtomicBool::new(false);

    let stats = processor.process_batch(&paths, opts.jobs, &cancel, |path, outcome| {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        match outcome {
            DocumentOutcome::Processed(report) => {
                pb.set_message(format!("{} ({} records)", name, report.records_written));
            }
            DocumentOutcome::Failed(e) => {
                pb.println(format!("{} {}: {:#}", "Failed".red(), name, e));
                if opts.fail_fast {
                    cancel.store(true, Ordering::Relaxed);
                }
            }
            DocumentOutcome::Skipped => {}
        }
        pb.inc(1);
    })?;

    pb.finish_and_clear();

    print_summary(&stats, started.elapsed(), &config.segments_dir);
    Ok(stats)
}
