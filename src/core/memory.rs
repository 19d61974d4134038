//! Remote memory service client
//!
//! Thin wrapper over the MemMachine v2 HTTP API. Every call is a single
//! request: a non-2xx response or transport fault surfaces to the caller as
//! an error, never swallowed and never retried. Durability and ranking are
//! the service's business; this module only speaks the wire format.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::MemoryConfig;
use crate::conversation::{utc_timestamp, Role};

const SEARCH_TOP_K: u32 = 5;
const LIST_PAGE_SIZE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Memory service returned {status}: {body}")]
    Service { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    Episodic,
    Semantic,
}

/// One search hit, in the service's relevance order. The service owns the
/// record's internal structure; only content and score cross the boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub source: MemorySource,
}

/// Memory seam used by the chat engine. `store`/`search` carry the per-turn
/// flow; `delete_all` and `health` back the UI's maintenance controls.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn store(&self, text: &str, role: Role) -> Result<(), MemoryError>;
    async fn search(&self, query: &str) -> Result<Vec<MemoryRecord>, MemoryError>;
    async fn delete_all(&self) -> Result<(), MemoryError>;
    async fn health(&self) -> Result<String, MemoryError>;
}

#[derive(Debug, Serialize)]
struct AddMemoriesRequest<'a> {
    org_id: &'a str,
    project_id: &'a str,
    messages: Vec<MemoryMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct MemoryMessage<'a> {
    content: &'a str,
    producer: &'a str,
    produced_for: &'static str,
    role: &'static str,
    timestamp: String,
    metadata: MessageMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct MessageMetadata<'a> {
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    org_id: &'a str,
    project_id: &'a str,
    query: &'a str,
    top_k: u32,
    types: [&'static str; 2],
    filter: String,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    content: SearchContent,
}

#[derive(Debug, Default, Deserialize)]
struct SearchContent {
    #[serde(default)]
    episodic_memory: EpisodicMemory,
    #[serde(default)]
    semantic_memory: Vec<SemanticEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct EpisodicMemory {
    #[serde(default)]
    long_term_memory: EpisodeBucket,
    #[serde(default)]
    short_term_memory: EpisodeBucket,
}

#[derive(Debug, Default, Deserialize)]
struct EpisodeBucket {
    #[serde(default)]
    episodes: Vec<Episode>,
}

#[derive(Debug, Default, Deserialize)]
struct Episode {
    content: Option<String>,
    episode_content: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct SemanticEntry {
    content: Option<String>,
    memory_content: Option<String>,
    #[serde(default)]
    score: Option<f64>,
}

/// Flatten a search response into relevance order: episodic long-term,
/// episodic short-term, then semantic features. Entries without content
/// are dropped.
fn flatten_search_response(response: SearchResponse) -> Vec<MemoryRecord> {
    let mut records = Vec::new();
    let episodic = response.content.episodic_memory;

    for episode in episodic
        .long_term_memory
        .episodes
        .into_iter()
        .chain(episodic.short_term_memory.episodes)
    {
        if let Some(content) = episode.content.or(episode.episode_content) {
            if !content.is_empty() {
                records.push(MemoryRecord {
                    content,
                    score: episode.score,
                    source: MemorySource::Episodic,
                });
            }
        }
    }

    for entry in response.content.semantic_memory {
        if let Some(content) = entry.content.or(entry.memory_content) {
            if !content.is_empty() {
                records.push(MemoryRecord {
                    content,
                    score: entry.score,
                    source: MemorySource::Semantic,
                });
            }
        }
    }

    records
}

/// Pull record ids out of a list page, accepting the id-key spellings the
/// service has used across versions.
fn extract_ids(entries: &[Value], id_keys: &[&str]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| {
            id_keys
                .iter()
                .find_map(|key| entry.get(key))
                .and_then(id_to_string)
        })
        .collect()
}

fn id_to_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub struct MemMachineClient {
    client: Client,
    base_url: String,
    org_id: String,
    project_id: String,
    user_id: String,
}

impl MemMachineClient {
    pub fn new(config: &MemoryConfig) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            org_id: config.org_id.clone(),
            project_id: config.project_id.clone(),
            user_id: config.user_id.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn user_filter(&self) -> String {
        format!("metadata.user_id='{}'", self.user_id)
    }

    async fn post_json(&self, path: &str, payload: &impl Serialize) -> Result<Value, MemoryError> {
        let response = self
            .client
            .post(self.url(path))
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(MemoryError::Service {
                status: status.as_u16(),
                body,
            });
        }

        // Some endpoints answer with an empty body on success.
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| MemoryError::InvalidResponse(e.to_string()))
    }

    /// One page of the list endpoint for the given memory type.
    async fn list_page(&self, memory_type: &str, page_num: usize) -> Result<Vec<Value>, MemoryError> {
        let body = self
            .post_json(
                "/api/v2/memories/list",
                &json!({
                    "org_id": self.org_id,
                    "project_id": self.project_id,
                    "filter": self.user_filter(),
                    "type": memory_type,
                    "page_size": LIST_PAGE_SIZE,
                    "page_num": page_num,
                }),
            )
            .await?;

        Ok(body
            .pointer(&format!("/content/{memory_type}_memory"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_ids(&self, memory_type: &str, id_keys: &[&str]) -> Result<Vec<String>, MemoryError> {
        let mut ids = Vec::new();
        let mut page_num = 0;
        loop {
            let entries = self.list_page(memory_type, page_num).await?;
            if entries.is_empty() {
                break;
            }
            ids.extend(extract_ids(&entries, id_keys));
            if entries.len() < LIST_PAGE_SIZE {
                break;
            }
            page_num += 1;
        }
        Ok(ids)
    }
}

#[async_trait]
impl MemoryStore for MemMachineClient {
    async fn store(&self, text: &str, role: Role) -> Result<(), MemoryError> {
        let payload = AddMemoriesRequest {
            org_id: &self.org_id,
            project_id: &self.project_id,
            messages: vec![MemoryMessage {
                content: text,
                producer: &self.user_id,
                produced_for: "agent",
                role: role.as_str(),
                timestamp: utc_timestamp(),
                metadata: MessageMetadata {
                    user_id: &self.user_id,
                },
            }],
        };

        self.post_json("/api/v2/memories", &payload).await?;
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
        let payload = SearchRequest {
            org_id: &self.org_id,
            project_id: &self.project_id,
            query,
            top_k: SEARCH_TOP_K,
            types: ["episodic", "semantic"],
            filter: self.user_filter(),
        };

        let body = self.post_json("/api/v2/memories/search", &payload).await?;
        if body.is_null() {
            return Ok(Vec::new());
        }
        let response: SearchResponse = serde_json::from_value(body)
            .map_err(|e| MemoryError::InvalidResponse(e.to_string()))?;

        Ok(flatten_search_response(response))
    }

    async fn delete_all(&self) -> Result<(), MemoryError> {
        let episodic_ids = self
            .list_ids("episodic", &["id", "uid", "episode_id"])
            .await?;
        if !episodic_ids.is_empty() {
            self.post_json(
                "/api/v2/memories/episodic/delete",
                &json!({
                    "org_id": self.org_id,
                    "project_id": self.project_id,
                    "episodic_ids": episodic_ids,
                }),
            )
            .await?;
        }

        let semantic_ids = self
            .list_ids("semantic", &["id", "feature_id", "semantic_id"])
            .await?;
        if !semantic_ids.is_empty() {
            self.post_json(
                "/api/v2/memories/semantic/delete",
                &json!({
                    "org_id": self.org_id,
                    "project_id": self.project_id,
                    "semantic_ids": semantic_ids,
                }),
            )
            .await?;
        }

        Ok(())
    }

    async fn health(&self) -> Result<String, MemoryError> {
        let response = self
            .client
            .get(self.url("/api/v2/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok("MemMachine connection: OK".to_string())
        } else {
            Err(MemoryError::Service {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}
