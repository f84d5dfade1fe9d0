//! Application layer
//!
//! Crawl use cases built on the infrastructure fetcher and parsers.

pub mod crawl_pipeline;
pub mod detail_crawl;

pub use crawl_pipeline::{
    CrawlOutcome, CrawlPipeline, CrawlReport, MalformedPage, PageRecords, PageType, PagedOutcome, PipelineError,
    crawl_overview,
};
pub use detail_crawl::{DataIntegrityError, DetailCrawlReport, crawl_details, cross_check};
