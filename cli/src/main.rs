mod extract;

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;

use kinhsach_backend::answer::{ChatlingAnswerer, RagService, StaticRetriever};
use kinhsach_backend::assembler::SegmentRecord;
use kinhsach_backend::chunker::{chunk_record, Chunk, MAX_CHUNK_CHARS};
use kinhsach_backend::classifier::Classifier;
use kinhsach_backend::config::AppConfig;
use kinhsach_backend::pipeline::discover_documents;
use kinhsach_backend::segmenter::{segment_lines, Dialect, SegmenterOptions};
use kinhsach_backend::source::read_paragraphs;
use kinhsach_backend::{get_create_kinhsach_dir, logger};

use crate::extract::{run_extract, ExtractOptions};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DialectArg {
    /// No preamble, numbered lines are sub-scripture headings
    Permissive,
    /// Skip everything before the first o0o delimiter
    Preamble,
}

impl From<DialectArg> for Dialect {
    fn from(d: DialectArg) -> Self {
        match d {
            DialectArg::Permissive => Dialect::Permissive,
            DialectArg::Preamble => Dialect::Preamble,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Kinh Sách scripture segmentation", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Data directory for logs.
    /// If not provided, the KINHSACH_DIR environment variable or the user data folder is used.
    #[arg(long, global = true, value_name = "DIRECTORY_PATH", env = "KINHSACH_DIR")]
    kinhsach_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Segment every .txt document of a folder into JSON records
    Extract {
        /// Folder of documents (KINHSACH_INPUT_DIR)
        #[arg(long, value_name = "DIRECTORY_PATH")]
        input_dir: Option<PathBuf>,

        /// Folder for segment records (KINHSACH_SEGMENTS_DIR)
        #[arg(long, value_name = "DIRECTORY_PATH")]
        output_dir: Option<PathBuf>,

        /// Also write whole-document records to this folder (KINHSACH_FULL_DOC_DIR)
        #[arg(long, value_name = "DIRECTORY_PATH")]
        full_doc_dir: Option<PathBuf>,

        /// Metadata index and cache file (KINHSACH_METADATA_CACHE)
        #[arg(long, value_name = "FILE_PATH")]
        metadata_cache: Option<PathBuf>,

        /// Header dialect of the documents (KINHSACH_DIALECT)
        #[arg(long, value_enum)]
        dialect: Option<DialectArg>,

        /// Don't write heading lines into segment content
        #[arg(long)]
        drop_header_lines: bool,

        /// Don't query the remote API for missing metadata
        #[arg(long)]
        no_enrich: bool,

        /// Number of documents processed in parallel
        #[arg(long, short, default_value_t = 1)]
        jobs: usize,

        /// Include documents in sub-folders
        #[arg(long)]
        recursive: bool,

        /// Stop starting new documents after the first failure
        #[arg(long)]
        fail_fast: bool,
    },

    /// Print the segmentation of one document as JSON
    #[command(arg_required_else_help = true)]
    Segment {
        #[arg(value_name = "FILE_PATH")]
        path: PathBuf,

        #[arg(long, value_enum)]
        dialect: Option<DialectArg>,

        /// Document title used when no heading is found. Defaults to the file name.
        #[arg(long)]
        title: Option<String>,
    },

    /// Print the classification of one line as JSON
    #[command(arg_required_else_help = true)]
    Classify {
        line: String,

        /// Read "12. text" lines as sub-scripture headings
        #[arg(long)]
        permissive: bool,
    },

    /// Turn segment records into retrieval chunks, written as JSON Lines
    Chunk {
        /// Folder of segment records (KINHSACH_SEGMENTS_DIR)
        #[arg(long, value_name = "DIRECTORY_PATH")]
        input_dir: Option<PathBuf>,

        /// Output file. Prints to stdout if not given.
        #[arg(long, value_name = "FILE_PATH")]
        output: Option<PathBuf>,

        #[arg(long, default_value_t = MAX_CHUNK_CHARS)]
        max_chars: usize,
    },

    /// Answer a question from the given passages with the hosted chat API
    #[command(arg_required_else_help = true)]
    Ask {
        question: String,

        /// Passages: a .jsonl file of chunks, or plain text with one passage per line
        #[arg(long, value_name = "FILE_PATH")]
        context_file: PathBuf,

        #[arg(long, default_value_t = 5)]
        num_results: usize,
    },
}

fn segmenter_options(config: &AppConfig, dialect: Option<DialectArg>) -> SegmenterOptions {
    dialect.map(Dialect::from).unwrap_or(config.dialect).options()
}

fn segment_document(config: &AppConfig, path: &Path, dialect: Option<DialectArg>, title: Option<String>) -> Result<()> {
    let lines: Vec<String> = read_paragraphs(path)?.collect::<Result<_>>()?;
    let title = title.unwrap_or_else(|| {
        path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
    });

    let doc = segment_lines(&lines, &segmenter_options(config, dialect), Some(title.as_str()));
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

fn classify_line(line: &str, permissive: bool) -> Result<()> {
    let c = Classifier::new(permissive).classify(line);
    println!("{}", serde_json::to_string_pretty(&c)?);
    Ok(())
}

fn chunk_records(input_dir: &Path, output: Option<&Path>, max_chars: usize) -> Result<()> {
    let paths = discover_documents(input_dir, "json", false)?;

    let mut out: Box<dyn Write> = match output {
        Some(p) => Box::new(io::BufWriter::new(
            fs::File::create(p).with_context(|| format!("Failed to create {}", p.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    };

    let mut total = 0;
    for path in &paths {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let record: SegmentRecord = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(e) => {
                logger::warn(&format!("Skipping {}: {}", path.display(), e));
                continue;
            }
        };

        let source_file = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        for chunk in chunk_record(&record, &source_file, max_chars) {
            writeln!(out, "{}", serde_json::to_string(&chunk)?)?;
            total += 1;
        }
    }
    out.flush()?;

    logger::info(&format!("Wrote {} chunks from {} records", total, paths.len()));
    Ok(())
}

fn read_passages(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_jsonl = path.extension().and_then(|e| e.to_str()) == Some("jsonl");
    let mut passages = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        if is_jsonl {
            let chunk: Chunk = serde_json::from_str(line)
                .with_context(|| format!("Invalid chunk in {}", path.display()))?;
            passages.push(chunk.content);
        } else {
            passages.push(line.trim().to_string());
        }
    }
    Ok(passages)
}

fn ask(config: &AppConfig, question: &str, context_file: &Path, num_results: usize) -> Result<()> {
    let answerer = ChatlingAnswerer::new(
        config.chatling_api_key.as_deref(),
        config.chatling_bot_id.as_deref(),
        config.chatling_ai_model_id.as_deref(),
    )?;
    let retriever = StaticRetriever { passages: read_passages(context_file)? };

    let service = RagService::new(retriever, answerer).with_num_results(num_results);
    let result = service.query(question);
    println!("{}", result.answer);
    Ok(())
}

fn main() {
    // The .env file may set KINHSACH_* values, Clap picks up KINHSACH_DIR via `env`.
    if dotenv().is_err() {
        eprintln!("Info: No .env file found or failed to load.");
    }

    let cli = Cli::parse();

    // Precedence:
    // - given with --kinhsach-dir
    // - set with env var KINHSACH_DIR
    // - get_create_kinhsach_dir()
    let kinhsach_dir = match cli.kinhsach_dir {
        Some(path) => path,
        None => match get_create_kinhsach_dir() {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Failed to get kinhsach directory: {}", e);
                eprintln!("Use the --kinhsach-dir option or set the KINHSACH_DIR environment variable.");
                exit(1);
            }
        },
    };
    logger::init_in_dir(&kinhsach_dir);

    let mut config = match AppConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            exit(1);
        }
    };

    let command_result = match cli.command {
        Commands::Extract {
            input_dir, output_dir, full_doc_dir, metadata_cache, dialect,
            drop_header_lines, no_enrich, jobs, recursive, fail_fast,
        } => {
            if let Some(p) = input_dir { config.input_dir = p; }
            if let Some(p) = output_dir { config.segments_dir = p; }
            if let Some(p) = full_doc_dir { config.full_doc_dir = Some(p); }
            if let Some(p) = metadata_cache { config.metadata_cache_path = p; }

            let mut segmenter = segmenter_options(&config, dialect);
            if drop_header_lines {
                segmenter.retain_header_lines = false;
            }

            let opts = ExtractOptions { segmenter, enrich: !no_enrich, jobs, recursive, fail_fast };
            run_extract(&config, &opts).and_then(|stats| {
                if stats.failed_documents > 0 {
                    anyhow::bail!("{} documents failed", stats.failed_documents);
                }
                Ok(())
            })
        }

        Commands::Segment { path, dialect, title } => segment_document(&config, &path, dialect, title),

        Commands::Classify { line, permissive } => classify_line(&line, permissive),

        Commands::Chunk { input_dir, output, max_chars } => {
            let dir = input_dir.unwrap_or_else(|| config.segments_dir.clone());
            chunk_records(&dir, output.as_deref(), max_chars)
        }

        Commands::Ask { question, context_file, num_results } => ask(&config, &question, &context_file, num_results),
    };

    if let Err(e) = command_result {
        logger::error(&format!("{:#}", e));
        eprintln!("Error executing command: {:#}", e);
        exit(1);
    }
}
