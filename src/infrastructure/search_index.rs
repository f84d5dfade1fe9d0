//! Search index collaborator
//!
//! Practitioner documents go into an Elasticsearch index whose mapping
//! mirrors the JSON shape of `Practitioner`. Only the REST endpoints the CLI
//! needs are wrapped.

use std::path::Path;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::domain::Practitioner;
use crate::infrastructure::config::SearchConfig;
use crate::infrastructure::json_store;

/// Fields a free-text query is matched against
pub const SEARCH_FIELDS: &[&str] = &[
    "name.text",
    "address.text",
    "qualifications.nature.text",
    "qualifications.tag",
    "specialty_name",
    "speciality_qualification.nature.text",
    "speciality_qualification.tag",
];

/// `BilingualText` serializes as `{ "text": ... }`
fn bilingual_mapping() -> Value {
    json!({ "properties": { "text": { "type": "text" } } })
}

fn qualification_mapping() -> Value {
    json!({
        "properties": {
            "nature": bilingual_mapping(),
            "tag": { "type": "keyword" },
            "year": { "type": "integer" }
        }
    })
}

/// Index body for `PUT /{index}`
pub fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "registration_no": { "type": "keyword" },
                "name": bilingual_mapping(),
                "address": bilingual_mapping(),
                "qualifications": qualification_mapping(),
                "specialty_registration_no": { "type": "keyword" },
                "specialty_name": { "type": "text" },
                "speciality_qualification": qualification_mapping()
            }
        }
    })
}

/// `multi_match` over [`SEARCH_FIELDS`]
pub fn search_query(query: &str) -> Value {
    json!({
        "multi_match": {
            "query": query,
            "fields": SEARCH_FIELDS
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub score: f64,
    pub practitioner: Practitioner,
}

/// Ranked hits, best first
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub total: u64,
    pub hits: Vec<SearchHit>,
}

/// Read the `hits` section of a `_search` response
pub fn parse_search_response(response: &Value) -> Result<SearchResults> {
    let hits = response.get("hits").context("Search response has no 'hits'")?;
    let total = hits
        .pointer("/total/value")
        .or_else(|| hits.get("total"))
        .and_then(Value::as_u64)
        .unwrap_or_default();

    let hits = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|hit| {
            let score = hit.get("_score").and_then(Value::as_f64).unwrap_or_default();
            let source = hit.get("_source").context("Search hit has no '_source'")?;
            let practitioner =
                Practitioner::deserialize(source).context("Search hit is not a practitioner document")?;
            Ok(SearchHit { score, practitioner })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(SearchResults { total, hits })
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn create_index(&self) -> Result<()>;
    async fn index_exists(&self) -> Result<bool>;
    async fn refresh(&self) -> Result<()>;
    async fn index_document(&self, practitioner: &Practitioner) -> Result<()>;
    async fn count(&self) -> Result<u64>;
    async fn search(&self, query: &str) -> Result<SearchResults>;
}

/// Elasticsearch over its REST API
pub struct ElasticsearchClient {
    client: Client,
    host: String,
    index_name: String,
    credentials: Option<(String, Option<String>)>,
}

impl ElasticsearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(ca_path) = &config.ca_cert_path {
            let pem = std::fs::read(ca_path).with_context(|| format!("Failed to read CA certificate {:?}", ca_path))?;
            let certificate = reqwest::Certificate::from_pem(&pem).context("Invalid CA certificate")?;
            builder = builder.add_root_certificate(certificate);
        }
        let client = builder.build().context("Failed to create search client")?;

        Ok(Self {
            client,
            host: config.host.trim_end_matches('/').to_string(),
            index_name: config.index_name.clone(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}{}", self.host, self.index_name, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            Some((user, password)) => request.basic_auth(user, password.as_deref()),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = self.authorized(request).send().await.context("Search request failed")?;
        let status = response.status();
        let body = response.text().await.context("Failed to read search response")?;
        if !status.is_success() {
            bail!("Search index returned {}: {}", status, body);
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).context("Search response is not JSON")
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchClient {
    async fn create_index(&self) -> Result<()> {
        self.send(self.client.put(self.endpoint("")).json(&index_mapping()))
            .await
            .with_context(|| format!("Failed to create index '{}'", self.index_name))?;
        info!("📚 Created index '{}'", self.index_name);
        Ok(())
    }

    async fn index_exists(&self) -> Result<bool> {
        let response = self
            .authorized(self.client.head(self.endpoint("")))
            .send()
            .await
            .context("Search request failed")?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            other => bail!("Unexpected status {} checking index '{}'", other, self.index_name),
        }
    }

    async fn refresh(&self) -> Result<()> {
        self.send(self.client.post(self.endpoint("/_refresh"))).await?;
        Ok(())
    }

    async fn index_document(&self, practitioner: &Practitioner) -> Result<()> {
        self.send(self.client.post(self.endpoint("/_doc")).json(practitioner))
            .await
            .with_context(|| format!("Failed to index {}", practitioner.registration_no))?;
        debug!("Indexed {}", practitioner.registration_no);
        Ok(())
    }

    async fn count(&self) -> Result<u64> {
        let response = self.send(self.client.get(self.endpoint("/_count"))).await?;
        response
            .get("count")
            .and_then(Value::as_u64)
            .context("Count response has no 'count'")
    }

    async fn search(&self, query: &str) -> Result<SearchResults> {
        let body = json!({ "query": search_query(query) });
        let response = self.send(self.client.post(self.endpoint("/_search")).json(&body)).await?;
        parse_search_response(&response)
    }
}

/// Index every detail chunk file in `dir`, then refresh. Returns documents indexed.
pub async fn populate_from_dir<I>(index: &I, dir: &Path, file_name: &str) -> Result<usize>
where
    I: SearchIndex + ?Sized,
{
    if !index.index_exists().await? {
        bail!("Index does not exist, run create-index first");
    }

    let files = json_store::chunk_files(dir, file_name).await?;
    info!("Indexing {} chunk files from {:?}", files.len(), dir);

    let mut indexed = 0;
    for file in &files {
        let practitioners = json_store::load_practitioners(file).await?;
        for practitioner in &practitioners {
            index.index_document(practitioner).await?;
        }
        indexed += practitioners.len();
        debug!("{:?}: {} documents", file, practitioners.len());
    }

    index.refresh().await?;
    info!("✅ {} documents added, index now holds {}", indexed, index.count().await?);
    Ok(indexed)
}
