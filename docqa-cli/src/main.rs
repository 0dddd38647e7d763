//! `docqa`: index a document tree and answer questions about it.

mod settings;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docqa_rag::openai::{OpenAIChatModel, OpenAIEmbeddingProvider};
use docqa_rag::{
    Answer, DiskVectorStore, IndexHandle, IndexOutcome, Indexer, PromptKind, QueryEngine,
};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::settings::{API_KEY_ENV, Settings};

const PREVIEW_CHARS: usize = 200;

/// Exit code for `ask` when the corpus holds nothing to index.
const EXIT_EMPTY_CORPUS: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "docqa", version, about = "Ask questions about a local document tree")]
struct Cli {
    /// Corpus directory, overriding `doc_dir` from the config file
    #[arg(long, global = true)]
    doc_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the index for the corpus, or confirm that it already exists
    Index {
        /// TOML settings file
        #[arg(long, short)]
        config: Option<PathBuf>,
    },
    /// Answer a question from the indexed corpus, indexing first if needed
    Ask {
        /// TOML settings file
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Print each retrieved passage with its source and score
        #[arg(long)]
        show_sources: bool,

        /// The question to answer
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "docqa failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Command::Index { config } => {
            let settings = load_settings(config, cli.doc_dir)?;
            let indexer = build_indexer(&settings)?;
            match indexer.run().await? {
                IndexOutcome::Ready(handle) => {
                    print_index_summary(&handle);
                    Ok(ExitCode::SUCCESS)
                }
                IndexOutcome::Empty => {
                    println!("No documents to index in {}.", settings.rag.doc_dir);
                    Ok(ExitCode::SUCCESS)
                }
            }
        }
        Command::Ask { config, show_sources, question } => {
            let settings = load_settings(config, cli.doc_dir)?;
            let question = question.join(" ");
            let indexer = build_indexer(&settings)?;
            let handle = match indexer.run().await? {
                IndexOutcome::Ready(handle) => handle,
                IndexOutcome::Empty => {
                    eprintln!(
                        "No documents to index in {}; add .md or .txt files and try again.",
                        settings.rag.doc_dir
                    );
                    return Ok(ExitCode::from(EXIT_EMPTY_CORPUS));
                }
            };

            let engine = QueryEngine::from_config(
                indexer.config(),
                indexer.embedder().clone(),
                Arc::new(chat_model(&settings)?),
            );
            let answer = engine.ask(&handle, &question).await?;
            print_answer(&answer, show_sources);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_settings(path: Option<PathBuf>, doc_dir: Option<String>) -> Result<Settings> {
    let mut settings = Settings::load(path.as_deref())?;
    settings.override_doc_dir(doc_dir)?;
    Ok(settings)
}

fn api_key(settings: &Settings) -> Result<String> {
    settings.api_key(std::env::var(API_KEY_ENV).ok())
}

fn build_indexer(settings: &Settings) -> Result<Indexer> {
    let mut provider = OpenAIEmbeddingProvider::new(api_key(settings)?)?;
    if let Some(model) = &settings.openai.embedding_model {
        provider = provider.with_model(model);
    }
    if let Some(dims) = settings.openai.embedding_dimensions {
        provider = provider.with_dimensions(dims);
    }
    if let Some(url) = &settings.openai.base_url {
        provider = provider.with_base_url(url);
    }

    // Index names carry their own path, relative to the working directory.
    let store = Arc::new(DiskVectorStore::new("."));
    Indexer::builder()
        .config(settings.rag.clone())
        .embedding_provider(Arc::new(provider))
        .vector_store(store)
        .build()
        .context("failed to set up the indexing pipeline")
}

fn chat_model(settings: &Settings) -> Result<OpenAIChatModel> {
    let mut model = OpenAIChatModel::new(api_key(settings)?)?;
    if let Some(name) = &settings.openai.chat_model {
        model = model.with_model(name);
    }
    if let Some(url) = &settings.openai.base_url {
        model = model.with_base_url(url);
    }
    Ok(model)
}

fn print_index_summary(handle: &IndexHandle) {
    match handle.report() {
        Some(report) => println!(
            "Indexed {} files ({} documents, {} chunks in {} batches) into {}.",
            report.files,
            report.documents,
            report.chunks,
            report.batches,
            handle.name()
        ),
        None => println!(
            "Index {} already exists with {} records.",
            handle.name(),
            handle.record_count()
        ),
    }
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(PREVIEW_CHARS).collect();
    if text.chars().nth(PREVIEW_CHARS).is_some() {
        preview.push_str("...");
    }
    preview
}

fn print_answer(answer: &Answer, show_sources: bool) {
    if answer.kind == PromptKind::Fallback {
        println!("No relevant passages in the index; answering from general knowledge.\n");
    } else if show_sources {
        println!("--- Retrieved Passages ---");
        for m in &answer.matches {
            println!("{}", preview(m.text()));
            println!("source: {} | score: {:.4}\n", m.source().unwrap_or("unknown"), m.score);
        }
    }
    println!("--- Answer ---\n{}", answer.text);
}
