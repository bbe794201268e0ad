use crate::config::{GeminiConfig, ModelProfile};
use crate::error::{Error, Result};
use crate::http::{Auth, HttpClient};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Speaker of a chat message. The lowercase names double as the `type`
/// stored on history nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Ai,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Human => "human",
            Self::Ai => "ai",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "human" | "user" => Some(Self::Human),
            "ai" | "assistant" | "model" => Some(Self::Ai),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub content: String,
    pub finish_reason: Option<String>,
    pub model: String,
    pub usage: Usage,
}

impl fmt::Display for ModelResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.content)?;
        write!(
            f,
            "[model: {}, finish_reason: {}, tokens: {} in / {} out / {} total]",
            self.model,
            self.finish_reason.as_deref().unwrap_or("unknown"),
            self.usage.input_tokens,
            self.usage.output_tokens,
            self.usage.total_tokens
        )
    }
}

// -- Gemini generateContent format --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop_sequences: Vec<&'a str>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

/// Client for the hosted Gemini generative model.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: Option<u32>,
    base_url: String,
    http: HttpClient,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, profile: &ModelProfile) -> Result<Self> {
        let http = HttpClient::new("cinegraph/0.1.0", profile.timeout, profile.max_retries)?;
        Ok(Self {
            api_key,
            model: profile.model.clone(),
            temperature: profile.temperature,
            max_output_tokens: profile.max_output_tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Build from config, reading the API key from the configured env var.
    pub fn from_config(gemini: &GeminiConfig, profile: &ModelProfile) -> Result<Self> {
        Self::new(gemini.api_key()?, gemini.base_url.clone(), profile)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn invoke(&self, messages: &[ChatMessage]) -> Result<ModelResponse> {
        self.invoke_with_stop(messages, &[]).await
    }

    pub async fn invoke_with_stop(
        &self,
        messages: &[ChatMessage],
        stop: &[&str],
    ) -> Result<ModelResponse> {
        debug!(model = %self.model, messages = messages.len(), "sending Gemini request");

        let request = build_request(messages, self.temperature, self.max_output_tokens, stop);
        let body = serde_json::to_string(&request)
            .map_err(|e| Error::parse(format!("serialize request: {e}")))?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response_text = self
            .http
            .post_json_raw(&url, &body, Auth::Header("x-goog-api-key", &self.api_key))
            .await
            .map_err(|e| {
                warn!("Gemini API error: {e}");
                e
            })?;

        parse_response(&response_text, &self.model)
    }

    /// Send a bare string as a single human message.
    pub async fn invoke_text(&self, prompt: &str) -> Result<ModelResponse> {
        self.invoke(&[ChatMessage::human(prompt)]).await
    }

    /// One system + user turn, returning only the text.
    pub async fn complete(&self, system: &str, user_message: &str) -> Result<String> {
        let messages = [ChatMessage::system(system), ChatMessage::human(user_message)];
        Ok(self.invoke(&messages).await?.content)
    }

    /// Like [`complete`](Self::complete), but decodes the reply as JSON.
    /// Markdown fences around the payload are ignored.
    pub async fn complete_json<T: serde::de::DeserializeOwned>(
        &self,
        system: &str,
        user_message: &str,
    ) -> Result<T> {
        let text = self.complete(system, user_message).await?;
        serde_json::from_str(strip_fences(&text))
            .map_err(|e| Error::parse(format!("parse model JSON: {e}\nraw: {text}")))
    }
}

/// Body of the first fenced block (any language tag), else the outermost
/// `{...}` or `[...]` span, else the trimmed text.
fn strip_fences(text: &str) -> &str {
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        // Skip the language tag line, if any.
        let body = match after.find('\n') {
            Some(nl) if !after[..nl].contains("```") => &after[nl + 1..],
            _ => after,
        };
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }
    let open = text.find(['{', '[']);
    let close = text.rfind(['}', ']']);
    if let (Some(start), Some(end)) = (open, close)
        && start < end
    {
        return &text[start..=end];
    }
    text.trim()
}

fn build_request<'a>(
    messages: &'a [ChatMessage],
    temperature: f32,
    max_output_tokens: Option<u32>,
    stop: &'a [&'a str],
) -> GenerateRequest<'a> {
    let system_parts: Vec<Part<'a>> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| Part { text: &m.content })
        .collect();
    let system_instruction = (!system_parts.is_empty()).then_some(Content {
        role: None,
        parts: system_parts,
    });

    let contents = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| Content {
            role: Some(if m.role == Role::Ai { "model" } else { "user" }),
            parts: vec![Part { text: &m.content }],
        })
        .collect();

    GenerateRequest {
        system_instruction,
        contents,
        generation_config: GenerationConfig {
            temperature,
            max_output_tokens,
            stop_sequences: stop.to_vec(),
        },
    }
}

fn parse_response(text: &str, model: &str) -> Result<ModelResponse> {
    let resp: GenerateResponse = serde_json::from_str(text)
        .map_err(|e| Error::parse(format!("parse Gemini response: {e}")))?;

    let usage = resp.usage_metadata.unwrap_or_default();
    let usage = Usage {
        input_tokens: usage.prompt_token_count,
        output_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
    };

    let Some(candidate) = resp.candidates.into_iter().next() else {
        let reason = resp
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".into());
        return Err(Error::parse(format!("empty response from Gemini: {reason}")));
    };

    let content = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    Ok(ModelResponse {
        content,
        finish_reason: candidate.finish_reason,
        model: model.to_string(),
        usage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn system_messages_become_instruction() {
        let messages = vec![
            ChatMessage::system("You are a surfer dude."),
            ChatMessage::human("How are the waves?"),
            ChatMessage::ai("Gnarly."),
        ];
        let req = build_request(&messages, 1.0, None, &[]);
        let v: Value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            v["systemInstruction"]["parts"][0]["text"],
            "You are a surfer dude."
        );
        assert_eq!(v["contents"][0]["role"], "user");
        assert_eq!(v["contents"][1]["role"], "model");
        assert_eq!(v["generationConfig"]["temperature"], 1.0);
        assert!(v["generationConfig"].get("maxOutputTokens").is_none());
        assert!(v["generationConfig"].get("stopSequences").is_none());
    }

    #[test]
    fn stop_sequences_and_token_cap_serialized() {
        let messages = vec![ChatMessage::human("q")];
        let stop = ["\nObservation"];
        let req = build_request(&messages, 0.5, Some(256), &stop);
        let v: Value = serde_json::to_value(&req).unwrap();
        assert!(v.get("systemInstruction").is_none());
        assert_eq!(v["generationConfig"]["maxOutputTokens"], 256);
        assert_eq!(v["generationConfig"]["stopSequences"], json!(["\nObservation"]));
    }

    #[test]
    fn parses_candidate_text_and_usage() {
        let body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Neo4j is "}, {"text": "a graph database."}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 7, "totalTokenCount": 12}
        })
        .to_string();
        let resp = parse_response(&body, "gemini-test").unwrap();
        assert_eq!(resp.content, "Neo4j is a graph database.");
        assert_eq!(resp.finish_reason.as_deref(), Some("STOP"));
        assert_eq!(resp.usage.total_tokens, 12);
        assert!(resp.to_string().contains("gemini-test"));
    }

    #[test]
    fn blocked_prompt_is_parse_error() {
        let body = json!({"promptFeedback": {"blockReason": "SAFETY"}}).to_string();
        let err = parse_response(&body, "m").unwrap_err().to_string();
        assert!(err.contains("SAFETY"), "{err}");
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let text = "Here you go:\n```json\n{\"title\": \"Heat\"}\n```\nEnjoy.";
        assert_eq!(strip_fences(text), "{\"title\": \"Heat\"}");

        let untagged = "```\n[1, 2]\n```";
        assert_eq!(strip_fences(untagged), "[1, 2]");

        let v: Value = serde_json::from_str(strip_fences(text)).unwrap();
        assert_eq!(v["title"], "Heat");
    }

    #[test]
    fn bare_json_found_inside_prose() {
        assert_eq!(
            strip_fences("Sure! {\"year\": 1995} hope that helps"),
            "{\"year\": 1995}"
        );
        assert_eq!(strip_fences("  [\"a\"]\n"), "[\"a\"]");
        assert_eq!(strip_fences("  no json  "), "no json");
    }

    #[test]
    fn role_names_round_trip_history_types() {
        assert_eq!(Role::parse(Role::Human.as_str()), Some(Role::Human));
        assert_eq!(Role::parse("assistant"), Some(Role::Ai));
        assert_eq!(Role::parse("tool"), None);
    }
}
