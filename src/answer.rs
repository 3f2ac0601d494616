//! Grounded answer generation.
//!
//! [`Generator`] is the seam to the chat model; [`OpenAiGenerator`] talks to
//! an OpenAI-compatible `/v1/chat/completions` endpoint with the same retry
//! policy as the embedding client. [`answer_question`] enforces grounding:
//! an empty context never reaches the model, and a generated answer keeps
//! only citations that point into the assembled context. An answer with no
//! surviving citation is downgraded to the decline phrase.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::context::ContextBlock;
use crate::error::{Error, Result};
use crate::models::{Answer, Citation};

/// Exact refusal text. Callers compare against it, so it never varies.
pub const DECLINE_PHRASE: &str = "I don't have enough information to answer this question.";

const SYSTEM_PROMPT: &str = "\
You are a careful assistant that answers questions using only the provided context.

Rules:
1. Use only information from the context below. Never use outside knowledge.
2. If the context does not contain the information needed to answer, reply \
with exactly: I don't have enough information to answer this question.
3. Cite every claim with the source document and page it came from, in the \
form [Title, page N]. The title and page must match a [Source: ...] tag in \
the context.
4. Be concise and direct.";

/// Produces answer text from a system prompt and a user message.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, system: &str, user: &str) -> Result<String>;
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_retries: u32,
}

impl OpenAiGenerator {
    /// Reads the API key from `OPENAI_API_KEY`.
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::InvalidConfig("OPENAI_API_KEY is not set".to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, system: &str, user: &str) -> std::result::Result<String, CallError> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CallError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(CallError::Transient(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CallError::BadRequest(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CallError::Transient(format!("malformed response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| CallError::Transient("response carried no choices".to_string()))
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, system: &str, user: &str) -> Result<String> {
        let mut last_reason = String::new();
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let secs = 1u64 << (attempt - 1).min(5);
                debug!(attempt, delay_secs = secs, "retrying generation request");
                tokio::time::sleep(Duration::from_secs(secs)).await;
            }
            match self.request(system, user).await {
                Ok(text) => return Ok(text),
                Err(CallError::BadRequest(reason)) => {
                    return Err(Error::GenerationUnavailable {
                        attempts: attempt + 1,
                        reason,
                    });
                }
                Err(CallError::Transient(reason)) => {
                    warn!(attempt, %reason, "generation request failed");
                    last_reason = reason;
                }
            }
        }
        Err(Error::GenerationUnavailable {
            attempts: self.max_retries + 1,
            reason: last_reason,
        })
    }
}

enum CallError {
    Transient(String),
    BadRequest(String),
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

fn decline() -> Answer {
    Answer {
        text: DECLINE_PHRASE.to_string(),
        citations: Vec::new(),
    }
}

/// Ask the model a question grounded in `context`.
pub async fn answer_question(
    generator: &dyn Generator,
    question: &str,
    context: &ContextBlock,
) -> Result<Answer> {
    if context.is_empty() {
        return Ok(decline());
    }

    let user = format!("Context:\n{}\n\nQuestion: {}", context.text(), question);
    let text = generator.generate(SYSTEM_PROMPT, &user).await?;

    let citations: Vec<Citation> = parse_citations(&text)
        .into_iter()
        .filter(|c| context.supports(c))
        .collect();

    if citations.is_empty() {
        // either the model declined or the answer is ungrounded; both get
        // the exact decline text and nothing else
        return Ok(decline());
    }

    Ok(Answer { text, citations })
}

/// Extract `[Title, page N]` references, in order of first appearance.
/// A leading `Source:` is tolerated so echoed context tags still parse.
fn parse_citations(text: &str) -> Vec<Citation> {
    let mut found = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find('[') {
        let after = &rest[start + 1..];
        let Some(end) = after.find(']') else { break };
        if let Some(citation) = parse_citation_body(&after[..end]) {
            if !found.contains(&citation) {
                found.push(citation);
            }
        }
        rest = &after[end + 1..];
    }
    found
}

fn parse_citation_body(inner: &str) -> Option<Citation> {
    let marker = ", page ";
    let pos = inner.rfind(marker)?;
    let mut title = inner[..pos].trim();
    if let Some(stripped) = title.strip_prefix("Source:") {
        title = stripped.trim();
    }
    let page: i64 = inner[pos + marker.len()..].trim().parse().ok()?;
    if title.is_empty() {
        return None;
    }
    Some(Citation {
        title: title.to_string(),
        page,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::assemble;
    use crate::models::RetrievedChunk;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct CannedGenerator {
        reply: String,
        called: AtomicBool,
    }

    impl CannedGenerator {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                called: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Generator for CannedGenerator {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _system: &str, _user: &str) -> Result<String> {
            self.called.store(true, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn context_with(title: &str, page: i64) -> ContextBlock {
        let chunk = RetrievedChunk {
            chunk_id: "c0".to_string(),
            document_id: "d0".to_string(),
            document_title: title.to_string(),
            page_number: page,
            chunk_index: 0,
            content: "Relevant facts live here.".to_string(),
            similarity: 0.95,
        };
        assemble(&[chunk], 8000)
    }

    #[test]
    fn parses_simple_citation() {
        let found = parse_citations("The spindle turns clockwise [Manual, page 4].");
        assert_eq!(
            found,
            vec![Citation {
                title: "Manual".to_string(),
                page: 4
            }]
        );
    }

    #[test]
    fn parses_multiple_and_deduplicates() {
        let found =
            parse_citations("A [Doc, page 1]. B [Doc, page 2]. A again [Doc, page 1].");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].page, 1);
        assert_eq!(found[1].page, 2);
    }

    #[test]
    fn tolerates_source_prefix_and_commas_in_title() {
        let found = parse_citations("See [Source: Widgets, Gadgets and More, page 12].");
        assert_eq!(
            found,
            vec![Citation {
                title: "Widgets, Gadgets and More".to_string(),
                page: 12
            }]
        );
    }

    #[test]
    fn ignores_malformed_brackets() {
        assert!(parse_citations("just [brackets] and [page ] noise").is_empty());
        assert!(parse_citations("unclosed [Doc, page 3").is_empty());
    }

    #[tokio::test]
    async fn empty_context_declines_without_calling_the_model() {
        let generator = CannedGenerator::new("should never be used");
        let context = assemble(&[], 8000);
        let answer = answer_question(&generator, "anything?", &context)
            .await
            .unwrap();
        assert_eq!(answer.text, DECLINE_PHRASE);
        assert!(answer.citations.is_empty());
        assert!(!generator.called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn keeps_only_citations_backed_by_context() {
        let generator =
            CannedGenerator::new("Fact one [Manual, page 2]. Fact two [Other Doc, page 9].");
        let context = context_with("Manual", 2);
        let answer = answer_question(&generator, "what?", &context).await.unwrap();
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].title, "Manual");
        assert_eq!(answer.citations[0].page, 2);
    }

    #[tokio::test]
    async fn uncited_answer_downgrades_to_decline() {
        let generator = CannedGenerator::new("Confident claim with no citation at all.");
        let context = context_with("Manual", 2);
        let answer = answer_question(&generator, "what?", &context).await.unwrap();
        assert_eq!(answer.text, DECLINE_PHRASE);
        assert!(answer.citations.is_empty());
    }

    #[tokio::test]
    async fn decline_with_trailing_prose_is_normalized() {
        let generator = CannedGenerator::new(&format!(
            "{DECLINE_PHRASE} That said, widgets usually ship with a two-year warranty."
        ));
        let context = context_with("Manual", 2);
        let answer = answer_question(&generator, "what?", &context).await.unwrap();
        assert_eq!(answer.text, DECLINE_PHRASE);
        assert!(answer.citations.is_empty());
    }

    #[tokio::test]
    async fn decline_reply_passes_through() {
        let generator = CannedGenerator::new(DECLINE_PHRASE);
        let context = context_with("Manual", 2);
        let answer = answer_question(&generator, "what?", &context).await.unwrap();
        assert_eq!(answer.text, DECLINE_PHRASE);
        assert!(answer.citations.is_empty());
    }
}
