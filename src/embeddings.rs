use crate::config::GeminiConfig;
use crate::error::{Error, Result};
use crate::http::{Auth, HttpClient};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    RetrievalQuery,
    RetrievalDocument,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: EmbedContent<'a>,
    task_type: TaskType,
}

#[derive(Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini text embeddings (`embedContent`).
#[derive(Clone)]
pub struct EmbeddingClient {
    api_key: String,
    /// Always carries the `models/` prefix.
    model: String,
    base_url: String,
    http: HttpClient,
}

impl EmbeddingClient {
    pub fn new(api_key: String, base_url: String, model: &str) -> Result<Self> {
        let http = HttpClient::new("cinegraph/0.1.0", None, 0)?;
        Ok(Self {
            api_key,
            model: normalize_model(model),
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(gemini: &GeminiConfig, model: &str) -> Result<Self> {
        Self::new(gemini.api_key()?, gemini.base_url.clone(), model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text, TaskType::RetrievalQuery).await
    }

    pub async fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text, TaskType::RetrievalDocument).await
    }

    async fn embed(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>> {
        debug!(model = %self.model, chars = text.len(), ?task_type, "embedding text");
        let request = EmbedRequest {
            model: &self.model,
            content: EmbedContent {
                parts: [EmbedPart { text }],
            },
            task_type,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;
        let url = format!("{}/{}:embedContent", self.base_url, self.model);
        let response_text = self
            .http
            .post_json_raw(&url, &body, Auth::Header("x-goog-api-key", &self.api_key))
            .await?;
        parse_embedding(&response_text)
    }
}

fn normalize_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{model}")
    }
}

fn parse_embedding(text: &str) -> Result<Vec<f32>> {
    let resp: EmbedResponse = serde_json::from_str(text)
        .map_err(|e| Error::parse(format!("parse embedding response: {e}")))?;
    if resp.embedding.values.is_empty() {
        return Err(Error::parse("embedding response contained no values"));
    }
    Ok(resp.embedding.values)
}
