use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use bibweave_core::{AppConfig, BibweaveError, CiteSyntax, ExitCode};
use bibweave_science::corpus::{CorpusIndex, CorpusSource};
use bibweave_science::error::{CorpusError, DocumentError, ScienceError};
use bibweave_science::{BibFormat, Pipeline, extract_identifiers, pipeline};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "bibweave",
    about = "Resolve citation links in a document against a bibliography corpus",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format (for scripts).
    /// Also enabled by setting BIBWEAVE_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging (BIBWEAVE_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Match a document's citation links against the corpus and rewrite them.
    Resolve {
        document: PathBuf,
        /// Corpus file (CSL-JSON, Zotero JSON, RIS or BibTeX).
        #[arg(long, conflicts_with = "remote")]
        corpus: Option<PathBuf>,
        /// Remote corpus endpoint.
        #[arg(long)]
        remote: Option<String>,
        /// Rewritten document; stdout when omitted.
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Bibliography file; defaults to the document path with the format's extension.
        #[arg(long)]
        bib: Option<PathBuf>,
        #[arg(long, value_enum, default_value = "bibtex")]
        bib_format: BibFormatArg,
        /// Write the JSON match report here.
        #[arg(long)]
        report: Option<PathBuf>,
        /// Look up unmatched identifiers online and synthesize records.
        #[arg(long)]
        enrich: bool,
        /// Emit \citet / \citep instead of pandoc citations.
        #[arg(long)]
        latex: bool,
        /// Also rewrite links that only received a placeholder key.
        #[arg(long)]
        rewrite_placeholders: bool,
    },

    /// Print the identifiers found in one or more URLs.
    Extract {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// Load a corpus and print load and index statistics.
    Corpus { path: String },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Print the config file location.
    Path,
    /// Write a default config file.
    Init {
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum BibFormatArg {
    Bibtex,
    CslJson,
}

impl From<BibFormatArg> for BibFormat {
    fn from(arg: BibFormatArg) -> Self {
        match arg {
            BibFormatArg::Bibtex => BibFormat::Bibtex,
            BibFormatArg::CslJson => BibFormat::CslJson,
        }
    }
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json_output = cli.json || std::env::var("BIBWEAVE_JSON").as_deref() == Ok("1");

    let code = match run(cli, json_output).await {
        Ok(code) => code,
        Err(err) => {
            let code = exit_code_for(&err);
            if json_output {
                let _ = print_json(&serde_json::json!({
                    "status": "error",
                    "error": format!("{err:#}"),
                    "code": code.code(),
                }));
            } else {
                eprintln!("error: {err:#}");
            }
            code
        }
    };
    std::process::exit(code.code());
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("BIBWEAVE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli, json_output: bool) -> Result<ExitCode> {
    let start = Instant::now();

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);
    let mut config = AppConfig::load_from(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    tracing::debug!(path = %config_path.display(), "config loaded");

    match cli.command {
        Commands::Resolve {
            document,
            corpus,
            remote,
            output,
            bib,
            bib_format,
            report,
            enrich,
            latex,
            rewrite_placeholders,
        } => {
            if let Some(path) = corpus {
                config.corpus.path = Some(path.display().to_string());
                config.corpus.remote_url = None;
            } else if let Some(url) = remote {
                config.corpus.path = None;
                config.corpus.remote_url = Some(url);
            }
            if enrich {
                config.synthesis.enabled = true;
            }
            if latex {
                config.rewrite.syntax = CiteSyntax::Latex;
            }
            if rewrite_placeholders {
                config.rewrite.rewrite_placeholders = true;
            }
            config.validate()?;

            let bib_format = BibFormat::from(bib_format);
            let input = std::fs::read(&document)
                .with_context(|| format!("reading {}", document.display()))?;

            let pipeline = Pipeline::from_config(config)?;
            let out = pipeline
                .run(&input, bib_format)
                .await
                .with_context(|| format!("resolving {}", document.display()))?;

            let bib_path = bib.unwrap_or_else(|| document.with_extension(bib_format.extension()));
            if bib_path == document {
                anyhow::bail!(BibweaveError::ConfigError(format!(
                    "bibliography would overwrite {}; pass --bib",
                    document.display()
                )));
            }
            write_file(&bib_path, &out.bibliography)?;
            if let Some(path) = &output {
                write_file(path, &out.document)?;
            }
            if let Some(path) = &report {
                write_file(path, &out.report.to_json()?)?;
            }

            let dur = start.elapsed().as_millis();
            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "document": if output.is_some() { None } else { Some(&out.document) },
                        "output": output,
                        "bibliography": bib_path,
                        "records": out.records.len(),
                        "report": out.report,
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                if output.is_none() {
                    print!("{}", out.document);
                }
                eprint!("{}", out.report.render_text());
                eprintln!("bibliography: {} ({} records)", bib_path.display(), out.records.len());
            }

            if out.report.has_high_unresolved_fraction() {
                return Ok(ExitCode::UnresolvedThresholdExceeded);
            }
        }

        Commands::Extract { urls } => {
            let sets: Vec<_> = urls
                .iter()
                .map(|url| (url, extract_identifiers(url)))
                .collect();
            let dur = start.elapsed().as_millis();

            if json_output {
                let items: Vec<_> = sets
                    .iter()
                    .map(|(url, ids)| serde_json::json!({ "url": url, "identifiers": ids }))
                    .collect();
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "items": items, "total": items.len() },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                for (url, ids) in &sets {
                    println!("{url}");
                    println!("  normalized: {}", ids.normalized_url);
                    let stable = ids.stable_identifiers();
                    if stable.is_empty() {
                        println!("  no stable identifier");
                    }
                    for id in stable {
                        println!("  {id}");
                    }
                }
            }
        }

        Commands::Corpus { path } => {
            let source = if path.starts_with("http://") || path.starts_with("https://") {
                config.corpus.path = None;
                config.corpus.remote_url = Some(path);
                pipeline::corpus_source(&config.corpus)?
            } else {
                CorpusSource::File(PathBuf::from(path))
            };

            let pipeline = Pipeline::new(config);
            let load = pipeline
                .load_corpus(&source)
                .await
                .with_context(|| format!("loading corpus {}", source.name()))?;
            let skipped = load.skipped.clone();
            let format = load.format;
            let index = CorpusIndex::build(load.records);
            let stats = index.stats();
            let dur = start.elapsed().as_millis();

            if json_output {
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": {
                        "source": source.name(),
                        "format": format,
                        "index": stats,
                        "skipped": skipped,
                    },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                println!("{}: {} records", source.name(), stats.records);
                println!(
                    "  doi {}, isbn {}, arxiv {}, pmid {}, url {}",
                    stats.doi, stats.isbn, stats.arxiv, stats.pmid, stats.url
                );
                if stats.shared_identifiers > 0 {
                    println!("  {} identifiers shared by several records", stats.shared_identifiers);
                }
                for entry in &skipped {
                    println!("  skipped entry at {}: {}", entry.position, entry.reason);
                }
            }
        }

        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::Show => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":config,"meta":{"duration_ms":dur}}))?;
                    } else {
                        print!("{}", toml::to_string_pretty(&config)?);
                    }
                }
                ConfigAction::Path => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":config_path,"exists":config_path.exists()},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("{}", config_path.display());
                    }
                }
                ConfigAction::Init { force } => {
                    if config_path.exists() && !force {
                        eprintln!(
                            "{} already exists. Add --force to overwrite.",
                            config_path.display()
                        );
                        return Ok(ExitCode::InvalidArgs);
                    }
                    AppConfig::default()
                        .save_to(&config_path)
                        .with_context(|| format!("writing {}", config_path.display()))?;
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":config_path},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("Wrote {}", config_path.display());
                    }
                }
            }
        }
    }

    Ok(ExitCode::Success)
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

/// First recognizable error in the chain decides the exit code.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    for cause in err.chain() {
        if let Some(err) = cause.downcast_ref::<ScienceError>() {
            return science_exit_code(err);
        }
        if let Some(err) = cause.downcast_ref::<CorpusError>() {
            return corpus_exit_code(err);
        }
        if let Some(err) = cause.downcast_ref::<DocumentError>() {
            return document_exit_code(err);
        }
        if let Some(err) = cause.downcast_ref::<BibweaveError>() {
            return core_exit_code(err);
        }
        if let Some(err) = cause.downcast_ref::<std::io::Error>() {
            return io_exit_code(err);
        }
    }
    ExitCode::GeneralError
}

fn science_exit_code(err: &ScienceError) -> ExitCode {
    match err {
        ScienceError::Corpus(err) => corpus_exit_code(err),
        ScienceError::Document(err) => document_exit_code(err),
        ScienceError::Core(err) => core_exit_code(err),
        ScienceError::Http(_)
        | ScienceError::ApiError(..)
        | ScienceError::RateLimit(..)
        | ScienceError::Timeout(_) => ExitCode::NetworkError,
        _ => ExitCode::GeneralError,
    }
}

fn corpus_exit_code(err: &CorpusError) -> ExitCode {
    match err {
        CorpusError::NotFound(_) => ExitCode::NotFound,
        CorpusError::Read { .. } => ExitCode::FileSystemError,
        CorpusError::Remote { .. } => ExitCode::NetworkError,
        CorpusError::Empty(_)
        | CorpusError::NoUsableRecords { .. }
        | CorpusError::UnsupportedFormat(_) => ExitCode::InvalidArgs,
    }
}

fn document_exit_code(_: &DocumentError) -> ExitCode {
    ExitCode::InvalidArgs
}

fn core_exit_code(err: &BibweaveError) -> ExitCode {
    match err {
        BibweaveError::RecordNotFound(_) => ExitCode::NotFound,
        BibweaveError::ConfigError(_)
        | BibweaveError::ValidationError(_)
        | BibweaveError::TomlParse(_) => ExitCode::InvalidArgs,
        BibweaveError::Io(err) => io_exit_code(err),
        _ => ExitCode::GeneralError,
    }
}

fn io_exit_code(err: &std::io::Error) -> ExitCode {
    match err.kind() {
        std::io::ErrorKind::NotFound => ExitCode::NotFound,
        _ => ExitCode::FileSystemError,
    }
}
