//! Theorex CLI - theorem extraction for LaTeX paper sources

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use theorex::{
    diagnostics::{check_document, format_diagnostics},
    extract_with_options,
    files::{decode_source, find_main_file, inline_imports, FileResolver, StdFileResolver},
    ExtractOptions, ExtractionError, ExtractionOutput, ExtractionResult,
};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

/// Nested `\input` levels followed when inlining a source tree
const MAX_INPUT_DEPTH: usize = 16;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "theorex")]
#[command(version)]
#[command(about = "Theorex - theorem extraction for LaTeX paper sources", long_about = None)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Log extraction passes (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: suppress warning output to stderr
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Extract statements from a .tex file or a source directory
    Extract {
        /// Input file or directory (reads stdin if not provided)
        input: Option<String>,

        /// Output file path (writes to stdout if not provided)
        #[arg(short, long)]
        output: Option<String>,

        /// Keep only these kinds, e.g. theorem,lemma
        #[arg(short, long, value_delimiter = ',')]
        kinds: Vec<String>,

        /// Keep theorems, lemmas, propositions and corollaries only
        #[arg(long, conflicts_with = "kinds")]
        statements: bool,

        /// Later statements replace earlier ones with the same title
        #[arg(long)]
        dedupe: bool,
    },

    /// Extract every paper of a directory to one JSON file per paper
    Batch {
        /// Directory holding one sub-directory or .tex file per paper
        input: String,

        /// Output directory
        #[arg(short, long)]
        output_dir: String,

        /// Seconds allowed per paper
        #[arg(short, long, default_value_t = 30)]
        timeout: u64,

        /// Keep theorems, lemmas, propositions and corollaries only
        #[arg(long)]
        statements: bool,
    },

    /// Report what extraction sees in a document
    Check {
        /// Input file or directory (reads stdin if not provided)
        input: Option<String>,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Err(e) = run(cli.command, cli.quiet) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("RUST_LOG") {
        EnvFilter::new(env)
    } else if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(io::stderr)
        .init();
}

#[cfg(feature = "cli")]
fn run(cmd: Commands, quiet: bool) -> ExtractionResult<()> {
    match cmd {
        Commands::Extract {
            input,
            output,
            kinds,
            statements,
            dedupe,
        } => {
            let source = read_input(input.as_deref())?;
            let mut options = if statements {
                ExtractOptions::statements()
            } else {
                ExtractOptions::default()
            };
            if !kinds.is_empty() {
                options = options.with_kinds(kinds);
            }
            options.dedupe_titles |= dedupe;

            let result = extract_with_options(&source, &options);
            if !quiet {
                for warning in &result.warnings {
                    eprintln!("⚠ {}", warning);
                }
            }

            let json = serde_json::to_string_pretty(&result.records)?;
            match output {
                Some(path) => {
                    fs::write(&path, json + "\n")?;
                    eprintln!(
                        "✓ {} statement(s) written to: {}",
                        result.records.len(),
                        path
                    );
                }
                None => println!("{}", json),
            }
        }

        Commands::Batch {
            input,
            output_dir,
            timeout,
            statements,
        } => {
            fs::create_dir_all(&output_dir)?;

            let mut options = if statements {
                ExtractOptions::statements()
            } else {
                ExtractOptions::default()
            };
            // Upsert per (paper, title)
            options.dedupe_titles = true;

            let (success_count, total) = run_batch(
                Path::new(&input),
                Path::new(&output_dir),
                &options,
                Duration::from_secs(timeout),
            )?;

            let rate = if total == 0 {
                0.0
            } else {
                100.0 * success_count as f64 / total as f64
            };
            eprintln!(
                "\nBatch extraction complete: {} of {} papers parsed ({:.1}%)",
                success_count, total, rate
            );
        }

        Commands::Check { input, no_color } => {
            let source = read_input(input.as_deref())?;
            let result = check_document(&source, &ExtractOptions::default());
            println!("{}", format_diagnostics(&result, !no_color));

            if result.has_errors() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Read a .tex file, a source directory (main file inlined), or stdin
fn read_input(input: Option<&str>) -> ExtractionResult<String> {
    match input {
        Some(path) => read_paper(Path::new(path)),
        None => {
            let mut buffer = Vec::new();
            io::stdin().read_to_end(&mut buffer)?;
            decode_source(&buffer)
        }
    }
}

fn read_paper(path: &Path) -> ExtractionResult<String> {
    if !path.is_dir() {
        let resolver = StdFileResolver::with_base_dir(path.parent().unwrap_or(Path::new(".")));
        let source = decode_source(&fs::read(path)?)?;
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        return Ok(inline_imports(&source, name, &resolver, MAX_INPUT_DEPTH)?);
    }

    let resolver = StdFileResolver::with_base_dir(path);
    let main = find_main_file(&resolver)
        .ok_or_else(|| ExtractionError::main_file_not_found(path.display().to_string()))?;
    debug!(main = %main, "main file located");

    let source = resolver.read_file(&main)?;
    Ok(inline_imports(&source, &main, &resolver, MAX_INPUT_DEPTH)?)
}

/// Extract every paper under `input` into `output_dir`; a failing paper is
/// reported and skipped. Returns the number of papers written and the total.
fn run_batch(
    input: &Path,
    output_dir: &Path,
    options: &ExtractOptions,
    timeout: Duration,
) -> ExtractionResult<(usize, usize)> {
    let papers = list_papers(input)?;
    let total = papers.len();
    let mut success_count = 0;

    for paper in papers {
        let paper_id = paper_id(&paper);
        let output_path = output_dir.join(format!("{}.json", paper_id));

        let written = extract_paper(&paper, options, timeout)
            .and_then(|result| write_records(&output_path, &result));
        match written {
            Ok(count) => {
                eprintln!("✓ {} ({} statement(s))", output_path.display(), count);
                success_count += 1;
            }
            Err(e) => {
                eprintln!("✗ {} - {}", paper_id, e);
            }
        }
    }

    Ok((success_count, total))
}

/// Write one paper's records as JSON; returns how many were written
fn write_records(path: &Path, result: &ExtractionOutput) -> ExtractionResult<usize> {
    let json = serde_json::to_string_pretty(&result.records)?;
    fs::write(path, json + "\n")?;
    Ok(result.records.len())
}

/// Every sub-directory or .tex file of a batch directory
fn list_papers(dir: &Path) -> ExtractionResult<Vec<PathBuf>> {
    let mut papers: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|path| {
            path.is_dir() || path.extension().and_then(|s| s.to_str()) == Some("tex")
        })
        .collect();
    papers.sort();
    Ok(papers)
}

fn paper_id(path: &Path) -> String {
    let name = if path.is_dir() {
        path.file_name()
    } else {
        path.file_stem()
    };
    name.and_then(|s| s.to_str())
        .unwrap_or("paper")
        .to_string()
}

/// Run one paper on its own thread so a hang or panic only loses that paper
fn extract_paper(
    path: &Path,
    options: &ExtractOptions,
    timeout: Duration,
) -> ExtractionResult<ExtractionOutput> {
    let (tx, rx) = mpsc::channel();
    let path = path.to_path_buf();
    let options = options.clone();

    thread::spawn(move || {
        let result = read_paper(&path).map(|source| extract_with_options(&source, &options));
        // Receiver is gone once the paper timed out
        let _ = tx.send(result);
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => {
            warn!(timeout = timeout.as_secs(), "paper timed out");
            Err(ExtractionError::internal(format!(
                "timed out after {}s",
                timeout.as_secs()
            )))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            Err(ExtractionError::internal("extraction panicked"))
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Build with --features cli");
}
