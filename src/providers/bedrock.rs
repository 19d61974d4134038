//! AWS Bedrock provider
//!
//! Invokes foundation models through the Bedrock runtime. Request bodies
//! differ by model family, so construction dispatches on the model id
//! prefix; response shapes differ the same way, so extraction walks the
//! known answer formats in order.

use std::sync::LazyLock;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_bedrockruntime::error::SdkError;
use aws_sdk_bedrockruntime::operation::invoke_model::InvokeModelError;
use aws_sdk_bedrockruntime::primitives::Blob;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::conversation::{Role, Turn};

use super::{ChatProvider, InferenceError};

/// Bedrock models offered by the model selector.
pub const AVAILABLE_MODELS: &[(&str, &str)] = &[
    ("openai.gpt-oss-20b-1:0", "OpenAI GPT-OSS 20B"),
    ("anthropic.claude-3-sonnet-20240229-v1:0", "Anthropic Claude 3 Sonnet"),
    ("anthropic.claude-3-haiku-20240307-v1:0", "Anthropic Claude 3 Haiku"),
    ("us.deepseek.r1-v1:0", "DeepSeek R1"),
    ("qwen.qwen3-32b-v1:0", "Qwen 3 32B"),
    ("mistral.mixtral-8x7b-instruct-v0:1", "Mistral Mixtral 8x7B Instruct"),
    ("mistral.mistral-7b-instruct-v0:2", "Mistral 7B Instruct"),
];

const MAX_TOKENS: u32 = 1000;
const TEMPERATURE: f64 = 0.7;

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub label: String,
}

pub fn available_models() -> Vec<ModelInfo> {
    AVAILABLE_MODELS
        .iter()
        .map(|(id, label)| ModelInfo {
            id: (*id).to_string(),
            label: (*label).to_string(),
        })
        .collect()
}

pub struct BedrockProvider {
    runtime: aws_sdk_bedrockruntime::Client,
    control: aws_sdk_bedrock::Client,
}

impl BedrockProvider {
    pub async fn new(region: &str) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        Self {
            runtime: aws_sdk_bedrockruntime::Client::new(&shared),
            control: aws_sdk_bedrock::Client::new(&shared),
        }
    }
}

#[async_trait]
impl ChatProvider for BedrockProvider {
    async fn complete(
        &self,
        model_id: &str,
        system: &str,
        transcript: &[Turn],
    ) -> Result<String, InferenceError> {
        let body = build_request_body(model_id, system, transcript);

        let output = self
            .runtime
            .invoke_model()
            .model_id(model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(body.to_string()))
            .send()
            .await
            .map_err(map_invoke_error)?;

        let parsed: Value = serde_json::from_slice(output.body().as_ref())
            .map_err(|e| InferenceError::InvalidResponse(format!("undecodable body: {e}")))?;

        Ok(extract_response_text(&parsed))
    }

    async fn health(&self) -> Result<String, InferenceError> {
        self.control
            .list_foundation_models()
            .send()
            .await
            .map(|_| "AWS Bedrock connection: OK".to_string())
            .map_err(|e| InferenceError::Service(e.to_string()))
    }
}

fn map_invoke_error(err: SdkError<InvokeModelError>) -> InferenceError {
    match err {
        SdkError::ServiceError(ctx) => {
            let service_err = ctx.into_err();
            match &service_err {
                InvokeModelError::ValidationException(_)
                | InvokeModelError::ResourceNotFoundException(_)
                | InvokeModelError::ModelNotReadyException(_) => {
                    InferenceError::Model(service_err.to_string())
                }
                _ => InferenceError::Service(service_err.to_string()),
            }
        }
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            InferenceError::Network(err.to_string())
        }
        other => InferenceError::Network(other.to_string()),
    }
}

/// Transcript entries sent to the model: error placeholders stay local.
fn context_turns(transcript: &[Turn]) -> impl Iterator<Item = &Turn> {
    transcript.iter().filter(|t| !t.error)
}

fn chat_messages(transcript: &[Turn]) -> Vec<Value> {
    context_turns(transcript)
        .map(|t| json!({"role": t.role.as_str(), "content": t.text}))
        .collect()
}

fn messages_with_system(system: &str, transcript: &[Turn]) -> Vec<Value> {
    let mut messages = Vec::new();
    if !system.is_empty() {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.extend(chat_messages(transcript));
    messages
}

/// Plain-text rendering for models that take a single input string.
fn flatten_to_text(system: &str, transcript: &[Turn]) -> String {
    let mut parts = Vec::new();
    if !system.is_empty() {
        parts.push(system.to_string());
    }
    for turn in context_turns(transcript) {
        let speaker = match turn.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        parts.push(format!("{speaker}: {}", turn.text));
    }
    parts.join("\n\n")
}

/// Build the JSON request body for a given Bedrock model.
pub fn build_request_body(model_id: &str, system: &str, transcript: &[Turn]) -> Value {
    if model_id.starts_with("anthropic.") {
        return json!({
            "anthropic_version": "bedrock-2023-05-31",
            "system": system,
            "messages": chat_messages(transcript),
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });
    }
    if model_id.starts_with("us.deepseek.") || model_id.starts_with("qwen.") {
        return json!({
            "messages": messages_with_system(system, transcript),
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
            "top_p": 0.9,
        });
    }
    if model_id.starts_with("meta.") || model_id.starts_with("mistral.") {
        return json!({
            "messages": messages_with_system(system, transcript),
            "max_tokens": MAX_TOKENS,
            "temperature": TEMPERATURE,
        });
    }
    if model_id.starts_with("amazon.titan") {
        return json!({
            "inputText": flatten_to_text(system, transcript),
            "textGenerationConfig": {
                "maxTokenCount": MAX_TOKENS,
                "temperature": TEMPERATURE,
            },
        });
    }
    // Default (OpenAI and others)
    json!({
        "messages": messages_with_system(system, transcript),
        "max_tokens": MAX_TOKENS,
        "temperature": TEMPERATURE,
    })
}

/// Extract the generated text from a Bedrock response body.
pub fn extract_response_text(body: &Value) -> String {
    if let Some(choices) = body.get("choices").and_then(Value::as_array) {
        if let Some(choice) = choices.first() {
            if let Some(content) = choice.pointer("/message/content").and_then(Value::as_str) {
                return content.to_string();
            }
            if let Some(text) = choice.get("text").and_then(Value::as_str) {
                return text.trim().to_string();
            }
        }
    }
    if let Some(content) = body.get("content") {
        if let Some(parts) = content.as_array() {
            let text: String = parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect();
            return text.trim().to_string();
        }
    }
    if let Some(text) = body.pointer("/results/0/outputText").and_then(Value::as_str) {
        return text.to_string();
    }
    if let Some(text) = body.get("generation").and_then(Value::as_str) {
        return text.to_string();
    }
    body.to_string()
}

static REASONING_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<reasoning>.*?</reasoning>").unwrap());
static REASONING_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)</?reasoning>").unwrap());
static EXTRA_BLANK_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n\s*\n").unwrap());

/// Remove reasoning tags and clean up response text.
pub fn clean_response(response: &str) -> String {
    let cleaned = REASONING_BLOCK.replace_all(response, "");
    let cleaned = REASONING_TAG.replace_all(&cleaned, "");
    let cleaned = EXTRA_BLANK_LINES.replace_all(&cleaned, "\n\n");
    cleaned.trim().to_string()
}
