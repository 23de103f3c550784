use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use super::BaseListingAnalyzer;
use crate::common::{AnalysisRequest, ListingAnalysis};

pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-haiku-4-5";

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_PHOTOS: usize = 20;

const SYSTEM_PROMPT: &str = "You analyze Dutch real estate listings. \
For positives: list standout good things about this property as short phrases \
(e.g. 'south-facing garden', 'recently renovated bathroom'). \
For negatives: list downsides, required work, or concerns as short phrases \
(e.g. 'needs new kitchen', 'ground floor - no elevator'). \
Never mention size, energy label, price or number of bedrooms in positives or negatives. \
3-5 bullets each. \
For description: translate the listing description to English and strip all marketing \
language. Keep only facts: layout, finishes, orientation, outdoor space, parking, \
building facilities, transport links. \
Respond with only a JSON object: {\"positives\": [..], \"negatives\": [..], \"description\": \"..\"}";

/// The model answered, but not with something we can store.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("no text block in model response")]
    MissingText,
    #[error("model response is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Anthropic API error {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Shape the model is asked to return.
#[derive(Debug, Deserialize)]
struct AnalysisPayload {
    positives: Vec<String>,
    negatives: Vec<String>,
    description: String,
}

/// Listing analysis through the Anthropic Messages API.
pub struct AnthropicClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            client,
        })
    }
}

#[async_trait]
impl BaseListingAnalyzer for AnthropicClient {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<ListingAnalysis> {
        let body = json!({
            "model": self.model,
            "max_tokens": 2000,
            "system": SYSTEM_PROMPT,
            "messages": [{ "role": "user", "content": build_content(request) }],
        });

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .context("Failed to send Anthropic request")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Api { status, body }.into());
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse Anthropic response")?;

        let text = parsed
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .ok_or(AnalyzerError::MissingText)?;

        Ok(parse_analysis(&text)?)
    }
}

/// Photos first, then structured facts, then the raw description.
fn build_content(request: &AnalysisRequest) -> Vec<Value> {
    let mut content: Vec<Value> = request
        .photos
        .iter()
        .take(MAX_PHOTOS)
        .map(|url| json!({ "type": "image", "source": { "type": "url", "url": url } }))
        .collect();

    let mut facts = vec![
        format!("Address: {}", request.address),
        format!("Price: €{}", request.price),
        format!("Living area: {} m²", request.living_area),
        format!("Bedrooms: {}", request.bedrooms),
    ];
    if let Some(label) = &request.energy_label {
        facts.push(format!("Energy label: {}", label));
    }
    if let Some(year) = request.construction_year {
        facts.push(format!("Construction year: {}", year));
    }

    content.push(json!({
        "type": "text",
        "text": format!("Property details:\n{}", facts.join("\n")),
    }));

    if let Some(description) = request.description.as_deref().filter(|d| !d.is_empty()) {
        content.push(json!({
            "type": "text",
            "text": format!("Original listing description (in Dutch):\n{}", description),
        }));
    }

    content.push(json!({ "type": "text", "text": "Analyze this Dutch real estate listing." }));
    content
}

/// Parse the model's JSON answer, tolerating markdown code fences.
pub fn parse_analysis(text: &str) -> Result<ListingAnalysis, AnalyzerError> {
    let cleaned = text
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let payload: AnalysisPayload = serde_json::from_str(cleaned)?;

    Ok(ListingAnalysis {
        positives: payload.positives,
        negatives: payload.negatives,
        description: payload.description,
    })
}
