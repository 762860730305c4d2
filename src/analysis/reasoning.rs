//! Client for the external reasoning service.
//!
//! The service answers in free text with a JSON-shaped object somewhere in
//! it. The reply is treated as untrusted: the first well-formed object is
//! extracted and decoded leniently, and anything else is a [`ParseFailure`].
//! Falling back to the heuristic is the caller's decision, not ours.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};

use crate::config::ReasoningConfig;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const PHOTO_CONFIDENCE: &str = "низкая - оценка по фото";
const PHOTO_REASONING: &str = "Приблизительная оценка по фото";

#[derive(Debug, thiserror::Error)]
#[error("unparseable reasoning reply: {0}")]
pub struct ParseFailure(pub String);

#[derive(Debug, thiserror::Error)]
pub enum ReasoningError {
    #[error("reasoning service unreachable: {0}")]
    Transport(String),
    #[error("reasoning service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Parse(#[from] ParseFailure),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawItem {
    #[serde(default, deserialize_with = "loose_text")]
    pub name: Option<String>,
    #[serde(default)]
    pub portion: Value,
    #[serde(default)]
    pub calories: Value,
}

/// The structured part of a reply, calorie fields still raw. Every field
/// tolerates the wrong JSON type: a stray number in `confidence` must not
/// cost the user a usable estimate.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReasonerReply {
    #[serde(default, deserialize_with = "loose_flag")]
    pub no_food_detected: bool,
    #[serde(default, deserialize_with = "loose_text")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "loose_items")]
    pub items: Vec<RawItem>,
    #[serde(default)]
    pub total_calories: Value,
    #[serde(default, deserialize_with = "loose_text")]
    pub confidence: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    pub reasoning: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    pub comment: Option<String>,
    #[serde(skip)]
    pub approximate: bool,
}

/// Strings pass through, scalars are rendered, anything else is dropped.
fn loose_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn loose_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// A non-array is no items; elements that are not objects are skipped.
fn loose_items<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<RawItem>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

impl ReasonerReply {
    pub fn mark_approximate(mut self) -> Self {
        self.approximate = true;
        if self.confidence.as_deref().map_or(true, |c| c.trim().is_empty()) {
            self.confidence = Some(PHOTO_CONFIDENCE.to_string());
        }
        self.reasoning = Some(match self.reasoning.take() {
            Some(r) if !r.trim().is_empty() => format!("{PHOTO_REASONING}. {r}"),
            _ => PHOTO_REASONING.to_string(),
        });
        self
    }
}

#[async_trait]
pub trait ReasoningGateway: Send + Sync {
    async fn analyze_text(&self, description: &str) -> Result<ReasonerReply, ReasoningError>;
    async fn analyze_image(&self, base64_image: &str) -> Result<ReasonerReply, ReasoningError>;
}

/// Returns the first `{...}` in `text` that decodes as a JSON object.
pub fn extract_object(text: &str) -> Option<serde_json::Map<String, Value>> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(map))) => Some(map),
            _ => None,
        }
    })
}

pub fn parse_reply(text: &str) -> Result<ReasonerReply, ParseFailure> {
    let object = extract_object(text)
        .ok_or_else(|| ParseFailure("no JSON object in reply".into()))?;
    let reply: ReasonerReply = serde_json::from_value(Value::Object(object))
        .map_err(|e| ParseFailure(format!("unexpected reply shape: {e}")))?;
    if !reply.no_food_detected && reply.items.is_empty() && reply.total_calories.is_null() {
        return Err(ParseFailure("reply carries neither a verdict nor an estimate".into()));
    }
    Ok(reply)
}

fn text_prompt(description: &str) -> String {
    format!(
        r#"You are a nutritionist. Answer in Russian.

First decide whether the user's message describes food or drink at all.
If it does not, reply with exactly:
{{"no_food_detected": true, "message": "<short explanation>"}}

Otherwise estimate the calories. Use one concrete integer per item and for the
total; never give ranges or words like "about". Always state a portion in
grams or millilitres, assuming a standard portion when none is given. Reply with:
{{"items": [{{"name": "...", "portion": "...", "calories": 0}}], "total_calories": 0,
  "confidence": "...", "reasoning": "...", "comment": "..."}}

User message: "{description}""#
    )
}

const IMAGE_PROMPT: &str = r#"You are a nutritionist looking at a photo. Answer in Russian.

First decide whether the photo shows food or drink. If it does not, reply with:
{"no_food_detected": true, "message": "<what is in the photo instead>"}

Otherwise estimate the calories from the photo. A photo only allows an approximate
estimate; say so in "reasoning". Use one integer per item and for the total, no
ranges. Reply with:
{"items": [{"name": "...", "portion": "...", "calories": 0}], "total_calories": 0,
 "confidence": "low - photo estimate", "reasoning": "...", "comment": "..."}"#;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock<'a> {
    Text { text: String },
    Image { source: ImageSource<'a> },
}

#[derive(Debug, Serialize)]
struct ImageSource<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
struct ResponseBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Media type from the first bytes of a base64 payload.
fn sniff_media_type(base64_image: &str) -> &'static str {
    if base64_image.starts_with("iVBORw0KGgo") {
        "image/png"
    } else if base64_image.starts_with("UklGR") {
        "image/webp"
    } else if base64_image.starts_with("R0lGOD") {
        "image/gif"
    } else {
        "image/jpeg"
    }
}

/// Anthropic Messages API client.
pub struct AnthropicGateway {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicGateway {
    pub fn new(config: &ReasoningConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    async fn complete(&self, content: Vec<ContentBlock<'_>>) -> Result<String, ReasoningError> {
        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, timeout = e.is_timeout(), "reasoning request failed");
                ReasoningError::Transport(e.to_string())
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReasoningError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(ReasoningError::Status {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| ParseFailure(format!("unexpected envelope: {e}")))?;
        let text: String = parsed
            .content
            .into_iter()
            .filter(|b| b.kind == "text")
            .filter_map(|b| b.text)
            .collect::<Vec<_>>()
            .join("\n");
        debug!(chars = text.len(), "reasoning reply received");
        Ok(text)
    }
}

#[async_trait]
impl ReasoningGateway for AnthropicGateway {
    #[instrument(skip(self, description), fields(model = %self.model))]
    async fn analyze_text(&self, description: &str) -> Result<ReasonerReply, ReasoningError> {
        let text = self
            .complete(vec![ContentBlock::Text {
                text: text_prompt(description),
            }])
            .await?;
        Ok(parse_reply(&text)?)
    }

    #[instrument(skip(self, base64_image), fields(model = %self.model, len = base64_image.len()))]
    async fn analyze_image(&self, base64_image: &str) -> Result<ReasonerReply, ReasoningError> {
        let text = self
            .complete(vec![
                ContentBlock::Text {
                    text: IMAGE_PROMPT.to_string(),
                },
                ContentBlock::Image {
                    source: ImageSource {
                        kind: "base64",
                        media_type: sniff_media_type(base64_image),
                        data: base64_image,
                    },
                },
            ])
            .await?;
        Ok(parse_reply(&text)?.mark_approximate())
    }
}
