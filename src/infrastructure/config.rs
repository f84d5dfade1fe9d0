//! Configuration infrastructure
//!
//! Contains configuration loading and management for register crawling.
//!
//! Configuration is organized into sections:
//! 1. Crawl settings (URL templates, page count, output paths, batching)
//! 2. HTTP settings (retry budget, backoff, concurrency)
//! 3. Parsing settings (table layouts, columns, labels)
//! 4. Logging, search index and LLM collaborator settings
//!
//! Secrets are normally supplied through the environment, see
//! [`ConfigManager::apply_env_overrides`].

#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{info, warn};
use url::Url;

use crate::infrastructure::parsing::ParsingConfig;
use crate::infrastructure::retry_policy::RetryPolicy;

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub crawl: CrawlConfig,
    pub http: HttpClientConfig,
    pub parsing: ParsingConfig,
    pub logging: LoggingConfig,
    pub search: SearchConfig,
    pub llm: LlmConfig,
}

/// Crawl entry parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Overview listing URL with a `{page}` placeholder
    pub overview_url_template: String,

    /// Last overview page index; pages `0..=num_pages` are crawled
    pub num_pages: u32,

    /// Where the overview crawl writes its records
    pub overview_output_path: PathBuf,

    /// Detail page URL with a `{registration_no}` placeholder
    pub detail_url_template: String,

    /// Directory receiving the detail chunk files
    pub detail_output_dir: PathBuf,

    /// Chunk `i` is written as `{offset}_{detail_file_name}`
    pub detail_file_name: String,

    /// Detail URLs per chunk
    pub batch_size: usize,

    /// Skip chunks whose output file already exists
    pub resume: bool,
}

/// Fetcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpClientConfig {
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    /// Clamped to `backoff_base_ms`
    pub jitter_ms: u64,
    /// Simultaneous in-flight requests
    pub max_concurrency: usize,
    pub timeout_seconds: u64,
    pub user_agent: String,
    pub retryable_statuses: Vec<u16>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; defaults to the app data dir
    pub log_dir: Option<PathBuf>,

    /// Number of log files to keep (older files will be deleted)
    pub max_files: u32,

    /// Enable automatic log cleanup on startup
    pub auto_cleanup_logs: bool,

    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

/// Search index collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub host: String,
    pub index_name: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// PEM bundle for a self-signed cluster certificate
    pub ca_cert_path: Option<PathBuf>,
    /// Directory scanned by `populate-index`
    pub data_dir: PathBuf,
}

/// Specialist suggestion collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            overview_url_template: register::OVERVIEW_URL_TEMPLATE.to_string(),
            num_pages: defaults::NUM_PAGES,
            overview_output_path: PathBuf::from(defaults::OVERVIEW_OUTPUT_PATH),
            detail_url_template: register::DETAIL_URL_TEMPLATE.to_string(),
            detail_output_dir: PathBuf::from(defaults::DETAIL_OUTPUT_DIR),
            detail_file_name: defaults::DETAIL_FILE_NAME.to_string(),
            batch_size: defaults::BATCH_SIZE,
            resume: false,
        }
    }
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::MAX_RETRIES,
            backoff_base_ms: defaults::BACKOFF_BASE_MS,
            jitter_ms: defaults::JITTER_MS,
            max_concurrency: defaults::MAX_CONCURRENCY,
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            user_agent: defaults::USER_AGENT.to_string(),
            retryable_statuses: defaults::RETRYABLE_STATUSES.to_vec(),
        }
    }
}

impl HttpClientConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            jitter: Duration::from_millis(self.jitter_ms.min(self.backoff_base_ms)),
            retryable_statuses: self.retryable_statuses.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            max_files: defaults::LOG_MAX_FILES,
            auto_cleanup_logs: defaults::LOG_AUTO_CLEANUP,
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("h2".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "warn".to_string());
                filters.insert("selectors".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            host: defaults::ELASTIC_HOST.to_string(),
            index_name: defaults::ELASTIC_INDEX_NAME.to_string(),
            username: None,
            password: None,
            ca_cert_path: None,
            data_dir: PathBuf::from(defaults::DETAIL_OUTPUT_DIR),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: defaults::LLM_API_BASE.to_string(),
            api_key: None,
            model: defaults::LLM_MODEL.to_string(),
            max_tokens: defaults::LLM_MAX_TOKENS,
            temperature: 0.0,
            top_p: defaults::LLM_TOP_P,
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(config_dir)
    }

    /// Get application data directory
    pub fn get_app_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get user data directory")?
            .join(defaults::APP_DIR_NAME);

        Ok(data_dir)
    }

    /// Manager for the default per-user config file
    pub fn new() -> Result<Self> {
        let config_path = Self::get_config_dir()?.join(defaults::CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    /// Manager for an explicit config file
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist.
    /// Environment overrides are applied after loading and never written back.
    pub async fn load_config(&self) -> Result<AppConfig> {
        let mut config = if self.config_path.exists() {
            let content = fs::read_to_string(&self.config_path)
                .await
                .with_context(|| format!("Failed to read configuration file {:?}", self.config_path))?;
            let config: AppConfig = serde_json::from_str(&content)
                .with_context(|| format!("Invalid configuration file {:?}", self.config_path))?;
            info!("Loaded configuration from: {:?}", self.config_path);
            config
        } else {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            default_config
        };

        Self::apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Self::validate(&config);
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        let content = serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Overlay secrets and deployment values from the environment
    pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(username) = lookup(env::ELASTIC_USERNAME) {
            config.search.username = Some(username);
        }
        if let Some(password) = lookup(env::ELASTIC_PASSWORD) {
            config.search.password = Some(password);
        }
        if let Some(index_name) = lookup(env::ELASTIC_INDEXNAME) {
            config.search.index_name = index_name;
        }
        if let Some(api_key) = lookup(env::OPENAI_API_KEY) {
            config.llm.api_key = Some(api_key);
        }
        if let Some(api_base) = lookup(env::OPENAI_API_BASE) {
            config.llm.api_base = api_base;
        }
    }

    fn validate(config: &AppConfig) {
        if config.http.jitter_ms > config.http.backoff_base_ms {
            warn!(
                "⚠️ jitter_ms ({}) exceeds backoff_base_ms ({}), clamping",
                config.http.jitter_ms, config.http.backoff_base_ms
            );
        }
        if !config.crawl.overview_url_template.contains(utils::PAGE_PLACEHOLDER) {
            warn!("⚠️ overview_url_template has no {} placeholder", utils::PAGE_PLACEHOLDER);
        }
        if !config.crawl.detail_url_template.contains(utils::REGISTRATION_NO_PLACEHOLDER) {
            warn!(
                "⚠️ detail_url_template has no {} placeholder",
                utils::REGISTRATION_NO_PLACEHOLDER
            );
        }

        let samples = [
            ("overview_url_template", utils::overview_page_url(&config.crawl.overview_url_template, 0)),
            ("detail_url_template", utils::detail_page_url(&config.crawl.detail_url_template, "M00000")),
            ("search.host", config.search.host.clone()),
            ("llm.api_base", config.llm.api_base.clone()),
        ];
        for (key, sample) in samples {
            if let Err(e) = Url::parse(&sample) {
                warn!("⚠️ {} is not a valid URL ({}): {}", key, e, sample);
            }
        }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Environment variable names read by [`ConfigManager::apply_env_overrides`]
pub mod env {
    pub const ELASTIC_USERNAME: &str = "ELASTIC_USERNAME";
    pub const ELASTIC_PASSWORD: &str = "ELASTIC_PASSWORD";
    pub const ELASTIC_INDEXNAME: &str = "ELASTIC_INDEXNAME";
    pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
    pub const OPENAI_API_BASE: &str = "OPENAI_API_BASE";
}

/// Medical Council register URLs and page layout constants
pub mod register {
    /// Listing of practitioners on the general register
    pub const OVERVIEW_URL_TEMPLATE: &str =
        "https://www.mchk.org.hk/english/list_register/list.php?type=L&page={page}";

    /// Full entry of one practitioner
    pub const DETAIL_URL_TEMPLATE: &str =
        "https://www.mchk.org.hk/english/list_register/detail.php?type=L&reg_no={registration_no}";

    /// `M` followed by five digits, e.g. `M15833`
    pub const REGISTRATION_NO_PATTERN: &str = r"M\d{5}";

    /// Boilerplate rows above the first practitioner on a listing page
    pub const OVERVIEW_HEADER_ROWS: usize = 9;

    /// First cell of the pagination row, after its leading `«`
    pub const PAGINATION_FOOTER: &str = "Previous";

    /// Disclaimer paragraph closing a detail page
    pub const DISCLAIMER_PREFIX: &str = "* A registered";
}

/// Default configuration values
pub mod defaults {
    pub const APP_DIR_NAME: &str = "medreg-scraper";
    pub const CONFIG_FILE_NAME: &str = "config.json";

    // Crawl
    /// Last listing page index of the register
    pub const NUM_PAGES: u32 = 300;
    pub const OVERVIEW_OUTPUT_PATH: &str = "data/scraped_doctors_overview.json";
    pub const DETAIL_OUTPUT_DIR: &str = "data";
    pub const DETAIL_FILE_NAME: &str = "scraped_doctors_detail.json";
    /// The register rate-limits bursts of several thousand requests
    pub const BATCH_SIZE: usize = 1000;

    // HTTP
    pub const MAX_RETRIES: u32 = 5;
    pub const BACKOFF_BASE_MS: u64 = 500;
    pub const JITTER_MS: u64 = 250;
    pub const MAX_CONCURRENCY: usize = 50;
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;
    pub const USER_AGENT: &str = concat!("medreg-scraper/", env!("CARGO_PKG_VERSION"));
    pub const RETRYABLE_STATUSES: &[u16] = &[429, 500, 520];

    // Log configuration defaults
    pub const LOG_LEVEL: &str = "info";
    pub const LOG_JSON_FORMAT: bool = false;
    pub const LOG_CONSOLE_OUTPUT: bool = true;
    pub const LOG_FILE_OUTPUT: bool = false;
    pub const LOG_MAX_FILES: u32 = 5;
    pub const LOG_AUTO_CLEANUP: bool = true;

    // Search
    pub const ELASTIC_HOST: &str = "https://localhost:9200";
    pub const ELASTIC_INDEX_NAME: &str = "doctors";

    // LLM
    pub const LLM_API_BASE: &str = "https://api.openai.com/v1";
    pub const LLM_MODEL: &str = "gpt-3.5-turbo-instruct";
    pub const LLM_MAX_TOKENS: u32 = 1000;
    pub const LLM_TOP_P: f32 = 0.5;
}

/// URL building helper functions
pub mod utils {
    pub const PAGE_PLACEHOLDER: &str = "{page}";
    pub const REGISTRATION_NO_PLACEHOLDER: &str = "{registration_no}";

    /// Listing URL for a page index
    pub fn overview_page_url(template: &str, page: u32) -> String {
        template.replace(PAGE_PLACEHOLDER, &page.to_string())
    }

    /// Detail URL for a registration number
    pub fn detail_page_url(template: &str, registration_no: &str) -> String {
        template.replace(REGISTRATION_NO_PLACEHOLDER, registration_no.trim())
    }

    /// Every listing URL of a crawl, pages `0..=num_pages`
    pub fn overview_page_urls(template: &str, num_pages: u32) -> Vec<String> {
        (0..=num_pages).map(|page| overview_page_url(template, page)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn overview_urls_cover_inclusive_page_range() {
        let urls = utils::overview_page_urls("https://example.test/list?page={page}", 2);
        assert_eq!(
            urls,
            vec![
                "https://example.test/list?page=0",
                "https://example.test/list?page=1",
                "https://example.test/list?page=2",
            ]
        );
    }

    #[test]
    fn detail_url_substitutes_trimmed_registration_number() {
        let url = utils::detail_page_url("https://example.test/d?reg={registration_no}", " M10001 ");
        assert_eq!(url, "https://example.test/d?reg=M10001");
    }

    #[test]
    fn retry_policy_clamps_jitter_to_base() {
        let http = HttpClientConfig {
            backoff_base_ms: 100,
            jitter_ms: 5_000,
            ..HttpClientConfig::default()
        };
        let policy = http.retry_policy();
        assert_eq!(policy.jitter, Duration::from_millis(100));
        assert_eq!(policy.max_retries, 5);
        assert!(policy.is_retryable_status(520));
        assert!(!policy.is_retryable_status(404));
    }

    #[test]
    fn http_section_is_the_source_of_retry_policy() {
        assert_eq!(HttpClientConfig::default().retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let mut config = AppConfig::default();
        let vars: HashMap<&str, &str> = HashMap::from([
            (env::ELASTIC_USERNAME, "elastic"),
            (env::ELASTIC_INDEXNAME, "practitioners"),
            (env::OPENAI_API_KEY, "sk-test"),
        ]);
        ConfigManager::apply_env_overrides(&mut config, |key| vars.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.search.username.as_deref(), Some("elastic"));
        assert_eq!(config.search.password, None);
        assert_eq!(config.search.index_name, "practitioners");
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.llm.api_base, defaults::LLM_API_BASE);
    }

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("config.json"));

        let config = manager.load_config().await.unwrap();
        assert!(manager.config_path().exists());
        assert_eq!(config.http.max_concurrency, defaults::MAX_CONCURRENCY);
        assert_eq!(config.parsing.overview_layout.header_offset, register::OVERVIEW_HEADER_ROWS);
    }

    #[tokio::test]
    async fn partial_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"crawl": {"num_pages": 3, "batch_size": 10}}"#).unwrap();

        let config = ConfigManager::with_path(&path).load_config().await.unwrap();
        assert_eq!(config.crawl.num_pages, 3);
        assert_eq!(config.crawl.batch_size, 10);
        assert_eq!(config.crawl.detail_file_name, defaults::DETAIL_FILE_NAME);
        assert_eq!(config.http.max_retries, defaults::MAX_RETRIES);
    }

    #[tokio::test]
    async fn invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(ConfigManager::with_path(&path).load_config().await.is_err());
    }
}
