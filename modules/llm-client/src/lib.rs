pub mod types;

pub use types::{ChatMessage, ChatRequest, ChatResponse};

use anyhow::{anyhow, Result};
use tracing::debug;

use replyflow_common::{ReplyOption, ReplyPayload};

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

const REPLY_SYSTEM_PROMPT: &str = "You draft short, friendly replies to social media posts. \
Write three distinct reply options labeled a), b), and c), one per line. \
Keep each under 260 characters. No hashtags unless the post uses them.";

pub struct LlmClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl LlmClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            http: reqwest::Client::new(),
            base_url: OPENAI_API_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %request.model, "LLM chat request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("LLM API error ({}): {}", status, error_text));
        }

        Ok(response.json().await?)
    }

    /// Draft reply options for a source post. `instructions` and
    /// `prior_payload` seed regeneration: the model is told what it produced
    /// last time and what the operator wants changed.
    pub async fn draft_replies(
        &self,
        source_text: &str,
        instructions: Option<&str>,
        prior_payload: Option<&ReplyPayload>,
    ) -> Result<ReplyPayload> {
        let mut prompt = format!("Post to reply to:\n{source_text}");
        if let Some(prior) = prior_payload {
            let prior_text = match prior {
                ReplyPayload::Single { text } => text.clone(),
                ReplyPayload::Options { options } => options
                    .iter()
                    .map(|o| format!("{}) {}", o.label, o.text))
                    .collect::<Vec<_>>()
                    .join("\n"),
            };
            prompt.push_str(&format!("\n\nPrevious draft (write something different):\n{prior_text}"));
        }
        if let Some(extra) = instructions {
            prompt.push_str(&format!("\n\nOperator instructions: {extra}"));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(REPLY_SYSTEM_PROMPT),
                ChatMessage::user(prompt),
            ],
            temperature: 0.9,
        };

        let response = self.chat(&request).await?;
        let text = response
            .text()
            .ok_or_else(|| anyhow!("LLM response had no content"))?;
        Ok(parse_reply_payload(text))
    }
}

/// Parse the model's output into a labeled option set. Lines shaped like
/// `a) text`, `b. text`, or `c: text` become options; anything else degrades
/// to a single reply, never an error.
pub fn parse_reply_payload(raw: &str) -> ReplyPayload {
    let mut options: Vec<ReplyOption> = Vec::new();

    for line in raw.lines() {
        let line = line.trim();
        if line.len() < 3 {
            continue;
        }
        let mut chars = line.chars();
        let label = match chars.next() {
            Some(c) if c.is_ascii_alphabetic() => c.to_ascii_lowercase(),
            _ => continue,
        };
        let sep = chars.next();
        if !matches!(sep, Some(')') | Some('.') | Some(':')) {
            continue;
        }
        let text = chars.as_str().trim();
        if text.is_empty() {
            continue;
        }
        options.push(ReplyOption {
            label: label.to_string(),
            text: text.to_string(),
        });
    }

    if options.len() >= 2 {
        ReplyPayload::Options { options }
    } else {
        ReplyPayload::Single {
            text: raw.trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_lines_become_options() {
        let payload = parse_reply_payload("a) first reply\nb) second reply\nc) third reply");
        match payload {
            ReplyPayload::Options { options } => {
                assert_eq!(options.len(), 3);
                assert_eq!(options[0].label, "a");
                assert_eq!(options[0].text, "first reply");
                assert_eq!(options[2].text, "third reply");
            }
            other => panic!("expected options, got {other:?}"),
        }
    }

    #[test]
    fn dot_and_colon_separators_accepted() {
        let payload = parse_reply_payload("a. one reply here\nb: another reply");
        assert!(payload.has_options());
    }

    #[test]
    fn freeform_output_degrades_to_single() {
        let payload = parse_reply_payload("Just one plain reply with no labels.");
        match payload {
            ReplyPayload::Single { text } => {
                assert_eq!(text, "Just one plain reply with no labels.");
            }
            other => panic!("expected single, got {other:?}"),
        }
    }

    #[test]
    fn lone_labeled_line_degrades_to_single() {
        // One option is not a set; keep the whole output as-is.
        let payload = parse_reply_payload("a) just this");
        assert!(!payload.has_options());
    }
}
