//! Infrastructure layer for fetching, parsing, persistence and external integrations
//!
//! This module provides the HTTP fetcher with retry/backoff, the register page
//! parser and record reconstructors, JSON persistence, and the search index
//! and LLM collaborators.

pub mod config; // Configuration, defaults and register constants
pub mod http_client;
pub mod json_store;
pub mod logging;
pub mod parsing;
pub mod parsing_error;
pub mod retry_policy;
pub mod search_index;
pub mod specialist_suggester;

// Re-export commonly used items
pub use config::{AppConfig, ConfigManager, register};
pub use http_client::{FetchAttemptError, FetchFailure, FetchFailureReason, Fetcher, HttpClient, PageBody, PageSource};
pub use logging::{init_logging, init_logging_with_config};
pub use parsing::{PageParser, ParsingConfig, RecordStart};
pub use parsing_error::{MalformedPageError, StructuralError};
pub use retry_policy::RetryPolicy;
pub use search_index::{ElasticsearchClient, SearchIndex};
pub use specialist_suggester::{CompletionClient, LlmClient};
