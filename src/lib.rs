//! medreg-scraper - medical practitioner register crawler
//!
//! Crawls the paginated public register, rebuilds practitioner records from
//! its flat table rows, stores them as JSON and feeds them to a search index.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{CrawlPipeline, PageType, PipelineError};
pub use domain::{BilingualText, Practitioner, Qualification};
