//! Specialist suggestion through a text-completion model
//!
//! The model is asked to answer in `{{specialist}}` markers; everything
//! outside the markers is ignored.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::infrastructure::config::LlmConfig;

pub const MEDICAL_PROMPT: &str = "Suggest medical specialists for a patient to see based on \
their described symptoms in the format of {{specialist 1}}, {{specialist 2}}, ..., {{specialist n}}.\nPatient:";

static SPECIALIST_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid marker pattern"));

pub fn build_prompt(symptoms: &str) -> String {
    format!("{MEDICAL_PROMPT}{}", symptoms.trim())
}

/// Contents of every `{{...}}` marker, trimmed, empties dropped
pub fn extract_specialists(completion: &str) -> Vec<String> {
    SPECIALIST_MARKER
        .captures_iter(completion)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

/// `POST {api_base}/completions`
pub struct CompletionClient {
    client: Client,
    config: LlmConfig,
}

impl CompletionClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.is_none() {
            bail!("No LLM API key configured (set OPENAI_API_KEY)");
        }
        let client = Client::builder().build().context("Failed to create LLM client")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl LlmClient for CompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest {
            model: &self.config.model,
            prompt,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
        };
        let url = format!("{}/completions", self.config.api_base.trim_end_matches('/'));

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.context("Completion request failed")?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Completion endpoint returned {}: {}", status, body);
        }

        let completion: CompletionResponse = response.json().await.context("Invalid completion response")?;
        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .context("Completion response has no choices")?;
        Ok(text.trim_matches('\n').to_string())
    }
}

/// Prompt, complete, extract
pub async fn suggest_specialists<L>(llm: &L, symptoms: &str) -> Result<Vec<String>>
where
    L: LlmClient + ?Sized,
{
    let completion = llm.complete(&build_prompt(symptoms)).await?;
    debug!("Completion: {}", completion);
    let specialists = extract_specialists(&completion);
    info!("🩺 Suggested specialists: {:?}", specialists);
    Ok(specialists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Mutex;

    #[rstest]
    #[case("{{Cardiologist}}, {{Neurologist}}", vec!["Cardiologist", "Neurologist"])]
    #[case("See a {{ Dermatologist }} soon.", vec!["Dermatologist"])]
    #[case("{{}} and {{ENT specialist}}", vec!["ENT specialist"])]
    #[case("no markers at all", vec![])]
    fn specialists_are_extracted_from_markers(#[case] completion: &str, #[case] expected: Vec<&str>) {
        assert_eq!(extract_specialists(completion), expected);
    }

    #[test]
    fn prompt_ends_with_patient_text() {
        let prompt = build_prompt("  chest pain  ");
        assert!(prompt.starts_with("Suggest medical specialists"));
        assert!(prompt.ends_with("Patient:chest pain"));
    }

    struct Canned {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for Canned {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn suggestion_chains_prompt_and_extraction() {
        let llm = Canned {
            reply: "{{Gastroenterologist}}, {{General Surgeon}}".into(),
            prompts: Mutex::new(Vec::new()),
        };
        let specialists = suggest_specialists(&llm, "stomach ache").await.unwrap();
        assert_eq!(specialists, vec!["Gastroenterologist", "General Surgeon"]);
        assert!(llm.prompts.lock().unwrap()[0].contains("Patient:stomach ache"));
    }

    #[test]
    fn client_requires_api_key() {
        assert!(CompletionClient::new(LlmConfig::default()).is_err());
        let config = LlmConfig {
            api_key: Some("sk-test".into()),
            ..LlmConfig::default()
        };
        assert!(CompletionClient::new(config).is_ok());
    }
}
