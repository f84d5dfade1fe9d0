//! `medreg` command line entry point

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use medreg_scraper::application::{CrawlPipeline, PipelineError, crawl_details, crawl_overview};
use medreg_scraper::infrastructure::config::{AppConfig, ConfigManager};
use medreg_scraper::infrastructure::logging::{init_logging_with_config, log_system_info};
use medreg_scraper::infrastructure::search_index::{self, ElasticsearchClient, SearchIndex, SearchResults};
use medreg_scraper::infrastructure::specialist_suggester::{CompletionClient, suggest_specialists};
use medreg_scraper::infrastructure::{Fetcher, HttpClient, json_store};

/// Medical practitioner register crawler
///
/// Crawls the public register of medical practitioners, rebuilds structured
/// records from its tables and loads them into a search index.
#[derive(Parser, Debug)]
#[command(name = "medreg", version, about)]
#[command(long_about = "Crawls the public register of medical practitioners.

EXAMPLES:
    medreg crawl-overview                      # Listing pages -> overview JSON
    medreg crawl-detail --resume               # Detail pages in checkpointed chunks
    medreg create-index                        # Create the search index
    medreg populate-index                      # Index every detail chunk
    medreg search \"cardiology central\"         # Free-text search
    medreg suggest \"chest pain when climbing\"  # Ask for specialists, then search

CONFIGURATION:
    Settings are read from the JSON file given with --config, or from the
    per-user config directory. A missing file is created with defaults.
    ELASTIC_USERNAME, ELASTIC_PASSWORD, ELASTIC_INDEXNAME, OPENAI_API_KEY and
    OPENAI_API_BASE override the file.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MEDREG_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl every listing page and save the overview records
    CrawlOverview {
        /// Last page index to crawl
        #[arg(long)]
        num_pages: Option<u32>,
    },

    /// Crawl one detail page per overview record
    CrawlDetail {
        /// Skip chunks already written
        #[arg(long)]
        resume: bool,

        /// Records per chunk file
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Create the search index with the practitioner mapping
    CreateIndex,

    /// Index every detail chunk file
    PopulateIndex {
        /// Directory holding the chunk files
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Search the index
    Search {
        query: String,

        /// Hits to print
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },

    /// Suggest specialists for symptoms and search for them
    Suggest {
        symptoms: String,

        /// Hits to print per specialist
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.clone()).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    if let Err(e) = init_logging_with_config(config.logging.clone()) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }
    log_system_info();

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let manager = match path {
        Some(path) => ConfigManager::with_path(path),
        None => ConfigManager::new()?,
    };
    manager.load_config().await
}

fn progress_bar(unit: &str) -> ProgressBar {
    let progress = ProgressBar::new(0);
    let style = ProgressStyle::default_bar()
        .template(&format!(
            "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {unit} ({{percent}}%) {{eta}}"
        ))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress.set_style(style.progress_chars("=>-"));
    progress
}

fn build_pipeline(config: &AppConfig, unit: &str) -> Result<CrawlPipeline<HttpClient>> {
    let client = HttpClient::new(&config.http)?;
    let fetcher = Fetcher::new(client, config.http.retry_policy());
    let pipeline = CrawlPipeline::new(fetcher, config.http.max_concurrency, &config.parsing)?;
    Ok(pipeline.with_progress(progress_bar(unit)))
}

/// Structural errors end the run with a diagnostic, not a bare failure
fn crawl_failed(error: PipelineError) -> Result<ExitCode> {
    match error {
        PipelineError::Structural(structural) => {
            eprintln!("Register layout no longer matches the parser: {structural}");
            if let Some(row) = structural.row() {
                eprintln!("  offending row: {row:?}");
            }
            Ok(ExitCode::FAILURE)
        }
        other => Err(other.into()),
    }
}

async fn run(command: Commands, mut config: AppConfig) -> Result<ExitCode> {
    match command {
        Commands::CrawlOverview { num_pages } => {
            if let Some(num_pages) = num_pages {
                config.crawl.num_pages = num_pages;
            }
            let pipeline = build_pipeline(&config, "pages")?;
            let outcome = match crawl_overview(&pipeline, &config.crawl).await {
                Ok(outcome) => outcome,
                Err(e) => return crawl_failed(e),
            };
            pipeline.progress().finish_and_clear();

            print!("{}", outcome.report);
            println!(
                "{} practitioners saved to {}",
                outcome.practitioners.len(),
                config.crawl.overview_output_path.display()
            );
            Ok(ExitCode::SUCCESS)
        }

        Commands::CrawlDetail { resume, batch_size } => {
            config.crawl.resume |= resume;
            if let Some(batch_size) = batch_size {
                config.crawl.batch_size = batch_size;
            }
            let overview = json_store::load_practitioners(&config.crawl.overview_output_path)
                .await
                .context("Run crawl-overview first")?;
            info!("Loaded {} overview records", overview.len());

            let pipeline = build_pipeline(&config, "practitioners")?;
            let report = match crawl_details(&pipeline, &overview, &config.crawl).await {
                Ok(report) => report,
                Err(e) => return crawl_failed(e),
            };
            pipeline.progress().finish_and_clear();

            print!("{}", report.crawl);
            println!(
                "{} records written to {} chunk files, {} chunks already present",
                report.records_written,
                report.chunks_written.len(),
                report.chunks_skipped.len()
            );
            for integrity in &report.integrity_errors {
                println!("  integrity: {integrity}");
            }
            if report.integrity_errors.is_empty() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }

        Commands::CreateIndex => {
            let index = ElasticsearchClient::new(&config.search)?;
            if index.index_exists().await? {
                println!("Index '{}' already exists", index.index_name());
            } else {
                index.create_index().await?;
                println!("Index '{}' created", index.index_name());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::PopulateIndex { dir } => {
            let index = ElasticsearchClient::new(&config.search)?;
            let dir = dir.unwrap_or_else(|| config.search.data_dir.clone());
            let indexed = search_index::populate_from_dir(&index, &dir, &config.crawl.detail_file_name).await?;
            println!("{indexed} documents added to '{}'", index.index_name());
            Ok(ExitCode::SUCCESS)
        }

        Commands::Search { query, limit } => {
            let index = ElasticsearchClient::new(&config.search)?;
            let results = index.search(&query).await?;
            print_results(&query, &results, limit);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Suggest { symptoms, limit } => {
            let llm = CompletionClient::new(config.llm.clone())?;
            let specialists = suggest_specialists(&llm, &symptoms).await?;
            if specialists.is_empty() {
                println!("No specialists suggested");
                return Ok(ExitCode::SUCCESS);
            }

            let index = ElasticsearchClient::new(&config.search)?;
            for specialist in &specialists {
                let results = index.search(specialist).await?;
                print_results(specialist, &results, limit);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn print_results(query: &str, results: &SearchResults, limit: usize) {
    println!("{} results for \"{query}\"", results.total);
    for hit in results.hits.iter().take(limit) {
        let doctor = &hit.practitioner;
        println!("  [{:.2}] {} {}", hit.score, doctor.registration_no, doctor.name);
        if !doctor.address.is_empty() {
            println!("         {}", doctor.address);
        }
        if let Some(specialty) = &doctor.specialty_name {
            println!("         {specialty}");
        }
    }
}
