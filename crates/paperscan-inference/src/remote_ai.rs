//! Remote AI analysis provider.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use paperscan_core::defaults::{AI_TIMEOUT_SECS, ENV_AI_SERVICE_KEY, ENV_AI_SERVICE_URL};
use paperscan_core::{DocumentAnalysis, Error, Result, SuggestionSource, TagSuggestion};

use crate::provider::{AnalysisInput, CatalogSnapshot, SuggestionProvider};

/// HTTP client for the image analysis service.
pub struct RemoteAiProvider {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl RemoteAiProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
            timeout_secs: AI_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables.
    /// Returns None if AI_SERVICE_URL is not set.
    pub fn from_env() -> Option<Self> {
        let base_url = std::env::var(ENV_AI_SERVICE_URL).ok()?;
        if base_url.is_empty() {
            return None;
        }
        let api_key = std::env::var(ENV_AI_SERVICE_KEY)
            .ok()
            .filter(|k| !k.is_empty());
        Some(Self::new(base_url, api_key))
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct AnalyzeRequest<'a> {
    image: String, // base64 encoded
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    extracted_text: Option<&'a str>,
    known_tags: Vec<&'a str>,
    known_correspondents: Vec<&'a str>,
    known_document_types: Vec<&'a str>,
}

#[derive(Deserialize)]
struct AnalyzeResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    tags: Vec<AnalyzedTag>,
    #[serde(default)]
    correspondent: Option<String>,
    #[serde(default)]
    document_type: Option<String>,
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    confidence: f32,
}

#[derive(Deserialize)]
struct AnalyzedTag {
    #[serde(default)]
    id: Option<i64>,
    name: String,
    #[serde(default)]
    confidence: f32,
}

impl AnalyzeResponse {
    fn into_analysis(self, catalog: &CatalogSnapshot) -> DocumentAnalysis {
        let suggested_tags = self
            .tags
            .into_iter()
            .filter(|t| !t.name.trim().is_empty())
            .map(|t| {
                // Resolve new-looking names against the catalog so merging
                // can dedupe by id.
                let wanted = t.name.trim().to_lowercase();
                let id = t.id.or_else(|| {
                    catalog
                        .tags
                        .iter()
                        .find(|known| known.name.to_lowercase() == wanted)
                        .map(|known| known.id)
                });
                TagSuggestion::new(id, t.name.trim(), t.confidence)
            })
            .collect();

        DocumentAnalysis {
            suggested_title: self.title.filter(|t| !t.trim().is_empty()),
            suggested_tags,
            suggested_correspondent: self.correspondent,
            suggested_document_type: self.document_type,
            suggested_date: self.date,
            confidence: self.confidence.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl SuggestionProvider for RemoteAiProvider {
    fn source(&self) -> SuggestionSource {
        SuggestionSource::RemoteAi
    }

    async fn analyze(&self, input: &AnalysisInput) -> Result<DocumentAnalysis> {
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(&input.image);

        let request = AnalyzeRequest {
            image: image_b64,
            mime_type: &input.mime_type,
            extracted_text: input.extracted_text.as_deref(),
            known_tags: input.catalog.tags.iter().map(|t| t.name.as_str()).collect(),
            known_correspondents: input
                .catalog
                .correspondents
                .iter()
                .map(|c| c.name.as_str())
                .collect(),
            known_document_types: input
                .catalog
                .document_types
                .iter()
                .map(|d| d.name.as_str())
                .collect(),
        };

        let url = format!("{}/v1/analyze", self.base_url);
        let mut builder = self
            .client
            .post(&url)
            .json(&request)
            .timeout(Duration::from_secs(self.timeout_secs));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        debug!(
            subsystem = "inference",
            component = "remote_ai",
            bytes = input.image.len(),
            "Sending analysis request"
        );

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                subsystem = "inference",
                component = "remote_ai",
                status = status.as_u16(),
                "Analysis service rejected request"
            );
            return Err(Error::Http {
                status: status.as_u16(),
                message: format!("analysis service returned {}: {}", status, body),
            });
        }

        let result: AnalyzeResponse = response.json().await.map_err(|e| {
            Error::AnalysisSource(format!("Failed to parse analysis response: {}", e))
        })?;

        Ok(result.into_analysis(&input.catalog))
    }
}
