//! Checkpointed detail crawl
//!
//! The overview records are split into chunks of `batch_size`. Each chunk is
//! crawled, cross-checked against its overview source and written to its own
//! file before the next chunk starts, so an interrupted crawl keeps every
//! finished chunk.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

use super::crawl_pipeline::{CrawlPipeline, CrawlReport, PageType, PipelineError};
use crate::domain::Practitioner;
use crate::infrastructure::config::{CrawlConfig, utils};
use crate::infrastructure::http_client::PageSource;
use crate::infrastructure::json_store;

/// Overview and detail pages disagree on who a record is
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{url}: {field} differs between overview ({overview:?}) and detail ({detail:?})")]
pub struct DataIntegrityError {
    pub url: String,
    pub field: &'static str,
    pub overview: String,
    pub detail: String,
}

/// Compare the identity fields of a detail record with its overview source
pub fn cross_check(url: &str, overview: &Practitioner, detail: &Practitioner) -> Result<(), DataIntegrityError> {
    let pairs = [
        ("registration_no", overview.registration_no.as_str(), detail.registration_no.as_str()),
        ("name", overview.name.text(), detail.name.text()),
        ("address", overview.address.text(), detail.address.text()),
    ];

    for (field, from_overview, from_detail) in pairs {
        if from_overview != from_detail {
            return Err(DataIntegrityError {
                url: url.to_string(),
                field,
                overview: from_overview.to_string(),
                detail: from_detail.to_string(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct DetailCrawlReport {
    pub crawl: CrawlReport,
    pub chunks_written: Vec<PathBuf>,
    pub chunks_skipped: Vec<PathBuf>,
    pub records_written: usize,
    /// Records excluded from the output
    pub integrity_errors: Vec<DataIntegrityError>,
}

/// Crawl one detail page per overview record, chunk by chunk
pub async fn crawl_details<S>(
    pipeline: &CrawlPipeline<S>,
    overview: &[Practitioner],
    config: &CrawlConfig,
) -> Result<DetailCrawlReport, PipelineError>
where
    S: PageSource + 'static,
{
    let batch_size = config.batch_size.max(1);
    let mut report = DetailCrawlReport::default();
    pipeline.progress().set_length(overview.len() as u64);

    for (index, chunk) in overview.chunks(batch_size).enumerate() {
        let offset = index * batch_size;
        let path = json_store::chunk_path(&config.detail_output_dir, offset, &config.detail_file_name);

        if config.resume && path.exists() {
            info!("⏭️ Chunk {} already on disk: {:?}", offset, path);
            pipeline.progress().inc(chunk.len() as u64);
            report.chunks_skipped.push(path);
            continue;
        }

        info!("📦 Chunk {}..{} of {}", offset, offset + chunk.len(), overview.len());
        let sources: HashMap<String, &Practitioner> = chunk
            .iter()
            .map(|p| (utils::detail_page_url(&config.detail_url_template, &p.registration_no), p))
            .collect();
        let urls: Vec<String> = chunk
            .iter()
            .map(|p| utils::detail_page_url(&config.detail_url_template, &p.registration_no))
            .collect();

        let outcome = pipeline.run_pages(&urls, PageType::Detail).await?;

        let mut verified = Vec::with_capacity(chunk.len());
        for page in outcome.pages {
            for detail in page.practitioners {
                let checked = match sources.get(&page.url) {
                    Some(source) => cross_check(&page.url, source, &detail),
                    None => Ok(()),
                };
                match checked {
                    Ok(()) => verified.push(detail),
                    Err(error) => {
                        warn!("❗ {}", error);
                        report.integrity_errors.push(error);
                    }
                }
            }
        }

        json_store::save_practitioners(&verified, &path)
            .await
            .map_err(|e| PipelineError::persistence(&path, &e))?;

        report.records_written += verified.len();
        report.crawl.absorb(outcome.report);
        report.chunks_written.push(path);
    }

    info!(
        "✅ Detail crawl done: {} records in {} chunks ({} skipped), {} integrity errors",
        report.records_written,
        report.chunks_written.len(),
        report.chunks_skipped.len(),
        report.integrity_errors.len()
    );
    Ok(report)
}
