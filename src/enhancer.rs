//! Prompt enhancement: rewrites a rough draft into a structured task description
//! through the Gemini `generateContent` endpoint.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::config::EnhancerConfig;
use crate::error::{FeedbackError, Result};

pub const ENHANCEMENT_SYSTEM_PROMPT: &str = r#"# Task
Turn the user's rough idea into a clear, structured, actionable task description.

# Output format
Follow this layout exactly:

## Core goal
One or two sentences stating the end result the user wants and why it matters.

## Requirements

**Phase 1: [phase name]**
1. [concrete action]
2. [concrete action]
3. [concrete action]

**Phase 2: [phase name]**
4. [concrete action]
5. [concrete action]
6. [concrete action]

**Phase 3: [phase name]** (only if needed)
7. [concrete action]
8. [concrete action]

**Technical requirements:**
- [requirement]
- [requirement]
- [requirement]

**Expected outcome:**
[deliverables and acceptance criteria]

# Rules
1. Split the work into two or three logical phases.
2. Every step must be specific and actionable.
3. Add the technical constraints and implementation details the draft leaves out.
4. Every step must lead to a concrete result.

Rewrite the user's text now."#;

#[async_trait]
pub trait PromptEnhancer: Send + Sync {
    /// Rewrite `draft`, using `project_context` when it is non-empty
    async fn enhance(&self, draft: &str, project_context: &str) -> Result<String>;

    /// Like `enhance`, but forwards text deltas to `chunks` as they arrive.
    /// The returned string is the full, trimmed answer.
    async fn enhance_streaming(
        &self,
        draft: &str,
        project_context: &str,
        chunks: UnboundedSender<String>,
    ) -> Result<String> {
        let text = self.enhance(draft, project_context).await?;
        let _ = chunks.send(text.clone());
        Ok(text)
    }
}

// Gemini API implementation
pub struct GeminiEnhancer {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
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
struct GenerationConfig {
    temperature: f32,
    response_mime_type: &'static str,
}

#[derive(Deserialize, Default)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Default)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiEnhancer {
    pub fn new(config: &EnhancerConfig) -> Self {
        Self {
            client: Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    fn stream_endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| FeedbackError::enhancement_unavailable("GEMINI_API_KEY is not set"))
    }

    async fn post(&self, url: String, api_key: &str, user_content: &str) -> Result<Response> {
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: ENHANCEMENT_SYSTEM_PROMPT,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: user_content }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                response_mime_type: "text/plain",
            },
        };

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!("Gemini API error {}", status);
            return Err(FeedbackError::enhancement_unavailable(format!(
                "Gemini API error {}: {}",
                status,
                error_text.trim()
            )));
        }
        Ok(response)
    }
}

impl GenerateContentResponse {
    /// Text parts of the first candidate, concatenated
    fn first_candidate_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

/// Splits a `text/event-stream` body into Gemini text deltas
#[derive(Debug, Default)]
pub struct SseTextDecoder {
    buffer: Vec<u8>,
}

impl SseTextDecoder {
    /// Feed raw bytes; returns the deltas of every complete `data:` line
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut deltas = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            let line = String::from_utf8_lossy(&line_bytes);
            if let Some(delta) = parse_data_line(&line) {
                deltas.push(delta);
            }
        }
        deltas
    }

    /// Flush a trailing line that had no newline
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        parse_data_line(&String::from_utf8_lossy(&rest))
    }
}

fn parse_data_line(line: &str) -> Option<String> {
    let json_str = line.trim().strip_prefix("data:")?.trim();
    if json_str.is_empty() || json_str == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<GenerateContentResponse>(json_str) {
        Ok(event) => Some(event.first_candidate_text()).filter(|t| !t.is_empty()),
        Err(e) => {
            debug!("skipping unparseable stream event: {}", e);
            None
        }
    }
}

/// Context-aware user content, as sent to the model
pub fn compose_user_content(draft: &str, project_context: &str) -> String {
    let context = project_context.trim();
    if context.is_empty() {
        draft.to_string()
    } else {
        format!(
            "**Project context:**\n{}\n\n**User request:**\n{}",
            context, draft
        )
    }
}

#[async_trait]
impl PromptEnhancer for GeminiEnhancer {
    async fn enhance(&self, draft: &str, project_context: &str) -> Result<String> {
        let api_key = self.api_key()?;
        if draft.trim().is_empty() {
            return Err(FeedbackError::invalid_input("nothing to enhance"));
        }

        let user_content = compose_user_content(draft, project_context);
        info!("Calling Gemini for prompt enhancement (model={})", self.model);
        debug!("draft chars={}, context chars={}", draft.len(), project_context.len());

        let response = self.post(self.endpoint(), api_key, &user_content).await?;
        let parsed: GenerateContentResponse = response.json().await?;
        let text = parsed.first_candidate_text();

        let text = text.trim();
        if text.is_empty() {
            return Err(FeedbackError::enhancement_unavailable(
                "Gemini returned an empty response",
            ));
        }
        info!("Prompt enhancement complete");
        Ok(text.to_string())
    }

    async fn enhance_streaming(
        &self,
        draft: &str,
        project_context: &str,
        chunks: UnboundedSender<String>,
    ) -> Result<String> {
        let api_key = self.api_key()?;
        if draft.trim().is_empty() {
            return Err(FeedbackError::invalid_input("nothing to enhance"));
        }

        let user_content = compose_user_content(draft, project_context);
        info!("Streaming Gemini prompt enhancement (model={})", self.model);

        let response = self
            .post(self.stream_endpoint(), api_key, &user_content)
            .await?;
        let mut stream = response.bytes_stream();
        let mut decoder = SseTextDecoder::default();
        let mut accumulated = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = chunk?;
            for delta in decoder.push(&bytes) {
                accumulated.push_str(&delta);
                // the dialog may have closed; keep collecting the answer regardless
                let _ = chunks.send(delta);
            }
        }
        if let Some(delta) = decoder.finish() {
            accumulated.push_str(&delta);
            let _ = chunks.send(delta);
        }

        let text = accumulated.trim();
        if text.is_empty() {
            return Err(FeedbackError::enhancement_unavailable(
                "Gemini returned an empty response",
            ));
        }
        info!("Streamed prompt enhancement complete");
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_is_prefixed_when_present() {
        assert_eq!(compose_user_content("fix it", "  "), "fix it");
        assert_eq!(
            compose_user_content("fix it", "axum service"),
            "**Project context:**\naxum service\n\n**User request:**\nfix it"
        );
    }

    #[test]
    fn decoder_handles_split_events() {
        let mut decoder = SseTextDecoder::default();
        let event = r###"data: {"candidates":[{"content":{"parts":[{"text":"## Core"}]}}]}"###;
        let (head, tail) = event.split_at(20);

        assert!(decoder.push(head.as_bytes()).is_empty());
        assert_eq!(decoder.push(format!("{tail}\n\n").as_bytes()), vec!["## Core"]);
        assert!(decoder.push(b": keep-alive\n").is_empty());
        assert!(decoder.push(b"data: [DONE]\n").is_empty());

        decoder.push(br#"data: {"candidates":[{"content":{"parts":[{"text":" goal"}]}}]}"#);
        assert_eq!(decoder.finish().as_deref(), Some(" goal"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn decoder_skips_garbage_and_empty_parts() {
        let mut decoder = SseTextDecoder::default();
        let deltas = decoder.push(b"data: {not json\ndata: {\"candidates\":[]}\n");
        assert!(deltas.is_empty());
    }

    #[tokio::test]
    async fn missing_key_is_unavailable() {
        let enhancer = GeminiEnhancer::new(&EnhancerConfig::default());
        let err = enhancer.enhance("make it faster", "").await.unwrap_err();
        assert!(matches!(err, FeedbackError::EnhancementUnavailable { .. }));

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let err = enhancer.enhance_streaming("make it faster", "", tx).await.unwrap_err();
        assert!(matches!(err, FeedbackError::EnhancementUnavailable { .. }));
        assert!(rx.try_recv().is_err());
    }
}
