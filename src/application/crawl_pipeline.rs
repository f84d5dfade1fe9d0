//! Crawl pipeline: fetch stage, then parse stage
//!
//! Every URL of a crawl is dispatched at once under a semaphore; only when all
//! fetches have settled are the bodies parsed, one page at a time. A page that
//! fails to fetch or has no table contributes nothing. A `StructuralError`
//! stops the run.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use indicatif::ProgressBar;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use crate::domain::Practitioner;
use crate::infrastructure::config::{CrawlConfig, utils};
use crate::infrastructure::http_client::{FetchFailure, Fetcher, PageBody, PageSource};
use crate::infrastructure::json_store;
use crate::infrastructure::parsing::{PageParser, ParsingConfig};
use crate::infrastructure::parsing_error::{MalformedPageError, StructuralError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    Overview,
    Detail,
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overview => f.write_str("overview"),
            Self::Detail => f.write_str("detail"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Structural(#[from] StructuralError),

    #[error("Invalid registration number pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Fetch task failed: {0}")]
    Task(String),

    #[error("Failed to persist {path:?}: {message}")]
    Persistence { path: PathBuf, message: String },
}

impl PipelineError {
    pub fn persistence(path: impl Into<PathBuf>, error: &anyhow::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            message: format!("{error:#}"),
        }
    }
}

/// A page whose body had no usable table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedPage {
    pub url: String,
    pub error: MalformedPageError,
}

/// Per-run counters and the pages that contributed nothing
#[derive(Debug, Clone, Default)]
pub struct CrawlReport {
    pub attempted: usize,
    pub fetched: usize,
    pub fetch_failures: Vec<FetchFailure>,
    pub malformed: Vec<MalformedPage>,
}

impl CrawlReport {
    pub fn skipped(&self) -> usize {
        self.fetch_failures.len() + self.malformed.len()
    }

    /// Fold another run's counters into this one
    pub fn absorb(&mut self, other: CrawlReport) {
        self.attempted += other.attempted;
        self.fetched += other.fetched;
        self.fetch_failures.extend(other.fetch_failures);
        self.malformed.extend(other.malformed);
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} URLs attempted, {} fetched, {} skipped ({} fetch failures, {} malformed pages)",
            self.attempted,
            self.fetched,
            self.skipped(),
            self.fetch_failures.len(),
            self.malformed.len()
        )?;
        for failure in &self.fetch_failures {
            writeln!(f, "  fetch failed: {failure}")?;
        }
        for page in &self.malformed {
            writeln!(f, "  malformed: {} ({})", page.url, page.error)?;
        }
        Ok(())
    }
}

/// Records reconstructed from one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecords {
    pub url: String,
    pub practitioners: Vec<Practitioner>,
}

#[derive(Debug, Clone)]
pub struct PagedOutcome {
    pub pages: Vec<PageRecords>,
    pub report: CrawlReport,
}

#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub practitioners: Vec<Practitioner>,
    pub report: CrawlReport,
}

impl From<PagedOutcome> for CrawlOutcome {
    fn from(outcome: PagedOutcome) -> Self {
        Self {
            practitioners: outcome.pages.into_iter().flat_map(|page| page.practitioners).collect(),
            report: outcome.report,
        }
    }
}

/// Fetcher, concurrency bound and one parser per page type
pub struct CrawlPipeline<S> {
    fetcher: Arc<Fetcher<S>>,
    max_concurrency: usize,
    overview_parser: PageParser,
    detail_parser: PageParser,
    progress: ProgressBar,
}

impl<S> CrawlPipeline<S>
where
    S: PageSource + 'static,
{
    pub fn new(fetcher: Fetcher<S>, max_concurrency: usize, parsing: &ParsingConfig) -> Result<Self, PipelineError> {
        Ok(Self {
            fetcher: Arc::new(fetcher),
            max_concurrency: max_concurrency.max(1),
            overview_parser: PageParser::overview(parsing)?,
            detail_parser: PageParser::detail(parsing),
            progress: ProgressBar::hidden(),
        })
    }

    /// Advance `progress` once per settled fetch
    #[must_use]
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress(&self) -> &ProgressBar {
        &self.progress
    }

    pub fn fetcher(&self) -> &Fetcher<S> {
        &self.fetcher
    }

    fn parser(&self, page_type: PageType) -> &PageParser {
        match page_type {
            PageType::Overview => &self.overview_parser,
            PageType::Detail => &self.detail_parser,
        }
    }

    /// All records of all pages, order across pages unspecified
    pub async fn run(&self, urls: &[String], page_type: PageType) -> Result<CrawlOutcome, PipelineError> {
        Ok(self.run_pages(urls, page_type).await?.into())
    }

    /// Like [`run`](Self::run) but keeps each page's records with its URL
    pub async fn run_pages(&self, urls: &[String], page_type: PageType) -> Result<PagedOutcome, PipelineError> {
        info!("🚀 Crawling {} {} pages (max {} in flight)", urls.len(), page_type, self.max_concurrency);

        let fetched = self.fetch_all(urls).await?;
        let outcome = self.parse_all(fetched, page_type)?;

        let records: usize = outcome.pages.iter().map(|page| page.practitioners.len()).sum();
        info!(
            "✅ {} crawl done: {} records, {} of {} pages fetched, {} skipped",
            page_type,
            records,
            outcome.report.fetched,
            outcome.report.attempted,
            outcome.report.skipped()
        );
        Ok(outcome)
    }

    async fn fetch_all(&self, urls: &[String]) -> Result<Vec<Result<PageBody, FetchFailure>>, PipelineError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));

        let tasks: Vec<_> = urls
            .iter()
            .map(|url| {
                let semaphore = Arc::clone(&semaphore);
                let fetcher = Arc::clone(&self.fetcher);
                let progress = self.progress.clone();
                let url = url.clone();

                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await?;
                    let result = fetcher.fetch(&url).await;
                    progress.inc(1);
                    Ok::<_, tokio::sync::AcquireError>(result)
                })
            })
            .collect();

        join_all(tasks)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(closed)) => Err(PipelineError::Task(closed.to_string())),
                Err(join_error) => Err(PipelineError::Task(join_error.to_string())),
            })
            .collect()
    }

    fn parse_all(
        &self,
        fetched: Vec<Result<PageBody, FetchFailure>>,
        page_type: PageType,
    ) -> Result<PagedOutcome, PipelineError> {
        let parser = self.parser(page_type);
        let mut report = CrawlReport {
            attempted: fetched.len(),
            ..CrawlReport::default()
        };
        let mut pages = Vec::with_capacity(fetched.len());

        for result in fetched {
            let page = match result {
                Ok(page) => page,
                Err(failure) => {
                    report.fetch_failures.push(failure);
                    continue;
                }
            };
            report.fetched += 1;

            let rows = match parser.rows(&page.body) {
                Ok(rows) => rows,
                Err(error) => {
                    warn!("⚠️ Skipping malformed page {}: {}", page.url, error);
                    report.malformed.push(MalformedPage { url: page.url, error });
                    continue;
                }
            };

            let practitioners = parser.reconstruct(&rows).map_err(|e| {
                let e = e.on_page(&page.url);
                error!("💥 {}", e);
                e
            })?;
            debug!("{}: {} rows, {} records", page.url, rows.len(), practitioners.len());
            pages.push(PageRecords {
                url: page.url,
                practitioners,
            });
        }

        Ok(PagedOutcome { pages, report })
    }
}

/// Crawl listing pages `0..=num_pages` and save the result
pub async fn crawl_overview<S>(pipeline: &CrawlPipeline<S>, config: &CrawlConfig) -> Result<CrawlOutcome, PipelineError>
where
    S: PageSource + 'static,
{
    let urls = utils::overview_page_urls(&config.overview_url_template, config.num_pages);
    pipeline.progress().set_length(urls.len() as u64);

    let outcome = pipeline.run(&urls, PageType::Overview).await?;

    json_store::save_practitioners(&outcome.practitioners, &config.overview_output_path)
        .await
        .map_err(|e| PipelineError::persistence(&config.overview_output_path, &e))?;
    Ok(outcome)
}
