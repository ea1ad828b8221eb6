//! CLI entry point for the embeddings index store and search client.
//!
//! Provides commands for importing and inspecting indexes and for querying
//! the search backends.

use std::path::PathBuf;
use std::process::ExitCode as ProcessExitCode;

use anyhow::Context;
use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use repo_embeddings::display::{create_index_summary_table, create_results_table};
use repo_embeddings::import::FloatRepoEmbeddingIndex;
use repo_embeddings::io::{ExitCode, JsonResponse, OutputFormat};
use repo_embeddings::storage::UploadOptions;
use repo_embeddings::{
    CommitId, EmbeddingSearchResults, EmbeddingsClient, EmbeddingsError, EmbeddingsResult,
    IndexStore, LocalBlobStore, MultiSearchParameters, RepoId, RepoName, SearchParameters,
    Settings,
};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Embedding index store and search client
#[derive(Parser)]
#[command(
    name = "repo-embeddings",
    version = env!("CARGO_PKG_VERSION"),
    about = "Store quantized embedding indexes and search them across partitions",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Show current configuration settings
    #[command(about = "Display active settings from .repo-embeddings/settings.toml")]
    Config,

    /// Search one repository
    #[command(after_help = "Examples:\n  repo-embeddings search github.com/a/b=42 \"where is auth handled\"")]
    Search {
        /// Repository as name=id
        #[arg(value_parser = parse_repo)]
        repo: (RepoName, RepoId),

        /// Natural language query
        query: String,

        #[command(flatten)]
        counts: ResultCounts,
    },

    /// Search many repositories across all partitions
    #[command(
        name = "multi-search",
        after_help = "Examples:\n  repo-embeddings multi-search -r github.com/a/b=1 -r github.com/c/d=2 \"retry policy\""
    )]
    MultiSearch {
        /// Repository as name=id, repeatable
        #[arg(short, long = "repo", value_parser = parse_repo, required = true)]
        repos: Vec<(RepoName, RepoId)>,

        /// Natural language query
        query: String,

        #[command(flatten)]
        counts: ResultCounts,

        /// Ask backends for debug payloads
        #[arg(long)]
        debug: bool,
    },

    /// Ask whether a chat query needs repository context
    #[command(name = "context-required")]
    ContextRequired {
        /// Chat query
        query: String,
    },

    /// Quantize a float JSON index and store it
    Import {
        /// JSON file with repoName, revision, codeIndex and textIndex
        path: PathBuf,

        /// Blob key (defaults to the revision-addressed index name)
        #[arg(long)]
        key: Option<String>,
    },

    /// Download an index and summarize it
    Inspect {
        /// Repository name
        #[arg(long, required_unless_present = "key")]
        repo: Option<String>,

        /// Commit the index was built from
        #[arg(long, required_unless_present = "key")]
        revision: Option<String>,

        /// Blob key, instead of repo and revision
        #[arg(long, conflicts_with_all = ["repo", "revision"])]
        key: Option<String>,
    },
}

#[derive(clap::Args)]
struct ResultCounts {
    /// Number of code results
    #[arg(long, default_value_t = 10)]
    code: usize,

    /// Number of text results
    #[arg(long, default_value_t = 5)]
    text: usize,

    /// Boost results by document rank
    #[arg(long)]
    ranks: bool,
}

fn parse_repo(value: &str) -> anyhow::Result<(RepoName, RepoId)> {
    let (name, id) = value
        .rsplit_once('=')
        .context("expected <name>=<id>, e.g. github.com/a/b=42")?;
    if name.is_empty() {
        anyhow::bail!("repository name is empty");
    }
    let id: i32 = id
        .parse()
        .with_context(|| format!("invalid repository id '{id}'"))?;
    Ok((RepoName::new(name), RepoId::new(id)))
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("repo_embeddings={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_settings(cli: &Cli) -> EmbeddingsResult<Settings> {
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };
    Ok(settings)
}

#[tokio::main]
async fn main() -> ProcessExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::from_json_flag(cli.json);

    let result = match load_settings(&cli) {
        Ok(settings) => {
            init_logging(settings.debug);
            run(cli.command, &settings, format).await
        }
        Err(e) => {
            init_logging(false);
            Err(e)
        }
    };

    match result {
        Ok(code) => code.into(),
        Err(error) => {
            report_error(&error, format);
            ExitCode::from_error(&error).into()
        }
    }
}

fn report_error(error: &EmbeddingsError, format: OutputFormat) {
    if format.is_json() {
        let response = JsonResponse::from_error(error);
        match serde_json::to_string_pretty(&response) {
            Ok(json) => println!("{json}"),
            Err(_) => eprintln!("Error: {error}"),
        }
        return;
    }
    eprintln!("Error: {error}");
    for suggestion in error.recovery_suggestions() {
        eprintln!("  hint: {suggestion}");
    }
}

async fn run(
    command: Commands,
    settings: &Settings,
    format: OutputFormat,
) -> EmbeddingsResult<ExitCode> {
    match command {
        Commands::Config => {
            let toml_str = toml::to_string_pretty(settings)
                .map_err(|e| EmbeddingsError::General(format!("Error displaying config: {e}")))?;
            println!("Current Configuration:");
            println!("{}", "=".repeat(50));
            println!("{toml_str}");
            Ok(ExitCode::Success)
        }

        Commands::Search {
            repo: (repo_name, repo_id),
            query,
            counts,
        } => {
            let client = EmbeddingsClient::new(&settings.client)?;
            let params = SearchParameters {
                repo_name,
                repo_id,
                query,
                code_results_count: counts.code,
                text_results_count: counts.text,
                use_document_ranks: counts.ranks,
            };
            let results = client.search(&params).await?;
            Ok(print_results(&results, format))
        }

        Commands::MultiSearch {
            repos,
            query,
            counts,
            debug,
        } => {
            let client = EmbeddingsClient::new(&settings.client)?;
            let (repo_names, repo_ids) = repos.into_iter().unzip();
            let params = MultiSearchParameters {
                repo_names,
                repo_ids,
                query,
                code_results_count: counts.code,
                text_results_count: counts.text,
                use_document_ranks: counts.ranks,
                debug,
            };
            let results = client.multi_search(&params).await?;
            Ok(print_results(&results, format))
        }

        Commands::ContextRequired { query } => {
            let client = EmbeddingsClient::new(&settings.client)?;
            let required = client.is_context_required_for_chat_query(&query).await?;
            if format.is_json() {
                #[derive(Serialize)]
                #[serde(rename_all = "camelCase")]
                struct ContextRequired {
                    is_required: bool,
                }
                print_json(JsonResponse::success(ContextRequired {
                    is_required: required,
                }));
            } else {
                println!("{}", if required { "required" } else { "not required" });
            }
            Ok(ExitCode::Success)
        }

        Commands::Import { path, key } => {
            let index = FloatRepoEmbeddingIndex::read(&path)?.quantize()?;
            let store = index_store(settings);
            let (key, size) = match key {
                Some(key) => {
                    let size = store.upload_repo_index(&key, &index).await?;
                    (key, size)
                }
                None => {
                    let (name, size) = store.save(&index).await?;
                    (name.to_string(), size)
                }
            };

            if format.is_json() {
                #[derive(Serialize)]
                struct Imported {
                    key: String,
                    bytes: u64,
                }
                print_json(JsonResponse::success(Imported { key, bytes: size }));
            } else {
                println!(
                    "Stored {}@{} as '{key}' ({size} bytes)",
                    index.repo_name, index.revision
                );
                println!("{}", create_index_summary_table(&index));
            }
            Ok(ExitCode::Success)
        }

        Commands::Inspect {
            repo,
            revision,
            key,
        } => {
            let store = index_store(settings);
            let index = match (key, repo, revision) {
                (Some(key), _, _) => store.download_repo_index(&key).await?,
                (None, Some(repo), Some(revision)) => {
                    store
                        .load(&RepoName::new(repo), &CommitId::new(revision))
                        .await?
                }
                _ => {
                    return Err(EmbeddingsError::General(
                        "inspect needs --key or both --repo and --revision".to_string(),
                    ));
                }
            };

            if format.is_json() {
                #[derive(Serialize)]
                #[serde(rename_all = "camelCase")]
                struct Summary<'a> {
                    repo_name: &'a RepoName,
                    revision: &'a CommitId,
                    code_rows: usize,
                    text_rows: usize,
                    column_dimension: usize,
                }
                print_json(JsonResponse::success(Summary {
                    repo_name: &index.repo_name,
                    revision: &index.revision,
                    code_rows: index.code_index.rows(),
                    text_rows: index.text_index.rows(),
                    column_dimension: index.code_index.column_dimension,
                }));
            } else {
                println!("{}", create_index_summary_table(&index));
            }
            Ok(ExitCode::Success)
        }
    }
}

fn index_store(settings: &Settings) -> IndexStore<LocalBlobStore> {
    debug!("Using blob root {}", settings.storage.blob_root.display());
    IndexStore::with_options(
        LocalBlobStore::new(settings.storage.blob_root.clone()),
        UploadOptions::from(&settings.storage),
    )
}

fn print_results(results: &EmbeddingSearchResults, format: OutputFormat) -> ExitCode {
    let code = if results.is_empty() {
        ExitCode::NotFound
    } else {
        ExitCode::Success
    };

    if format.is_json() {
        print_json(JsonResponse::success(results));
    } else if results.is_empty() {
        println!("No results");
    } else {
        if !results.code_results.is_empty() {
            println!("{}", create_results_table("Code", &results.code_results));
        }
        if !results.text_results.is_empty() {
            println!("{}", create_results_table("Text", &results.text_results));
        }
    }
    code
}

fn print_json<T: Serialize>(response: JsonResponse<T>) {
    match serde_json::to_string_pretty(&response) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing response: {e}"),
    }
}
