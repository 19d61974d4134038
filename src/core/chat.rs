//! Chat engine
//!
//! One turn runs strictly linearly: optional memory search, prompt
//! assembly, inference, optional memory write-back. The memory-enabled and
//! memory-less variants share this single path; the capability flag is
//! whether a memory store is attached at all.
//!
//! Failure policy per turn:
//! - a failed memory search degrades the turn (no retrieved context) but
//!   never aborts it;
//! - a failed inference call aborts the turn and no memory write happens;
//! - a failed memory write after a successful reply is reported but the
//!   reply stands.

use std::sync::Arc;

use crate::conversation::{Role, Turn};
use crate::core::memory::{MemoryRecord, MemoryStore};
use crate::providers::{clean_response, ChatProvider, InferenceError};

/// Result of one successful turn.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub reply: String,
    pub retrieved: Vec<MemoryRecord>,
    pub search_failed: bool,
    pub store_failed: bool,
}

pub struct ChatEngine {
    provider: Arc<dyn ChatProvider>,
    memory: Option<Arc<dyn MemoryStore>>,
}

impl ChatEngine {
    pub fn new(provider: Arc<dyn ChatProvider>, memory: Option<Arc<dyn MemoryStore>>) -> Self {
        Self { provider, memory }
    }

    pub fn memory_enabled(&self) -> bool {
        self.memory.is_some()
    }

    pub fn memory(&self) -> Option<&Arc<dyn MemoryStore>> {
        self.memory.as_ref()
    }

    pub fn provider(&self) -> &Arc<dyn ChatProvider> {
        &self.provider
    }

    /// Run one turn. `transcript` already ends with the new user turn;
    /// `user_message` is that turn's text, used as the search query and as
    /// the stored memory content.
    pub async fn respond(
        &self,
        transcript: &[Turn],
        model_id: &str,
        user_message: &str,
    ) -> Result<ChatOutcome, InferenceError> {
        let mut retrieved = Vec::new();
        let mut search_failed = false;

        if let Some(memory) = &self.memory {
            match memory.search(user_message).await {
                Ok(records) => retrieved = records,
                Err(e) => {
                    tracing::warn!(error = %e, "memory search failed, continuing without context");
                    search_failed = true;
                }
            }
        }

        let system = build_system_prompt(&retrieved);
        let raw = self.provider.complete(model_id, &system, transcript).await?;
        let reply = clean_response(&raw);

        let mut store_failed = false;
        if let Some(memory) = &self.memory {
            if let Err(e) = memory.store(user_message, Role::User).await {
                tracing::warn!(error = %e, "failed to store user message");
                store_failed = true;
            }
            let assistant_entry = format!("Assistant: {reply}");
            if let Err(e) = memory.store(&assistant_entry, Role::Assistant).await {
                tracing::warn!(error = %e, "failed to store assistant reply");
                store_failed = true;
            }
        }

        Ok(ChatOutcome {
            reply,
            retrieved,
            search_failed,
            store_failed,
        })
    }
}

/// System instruction sent with every completion. Retrieved memory, when
/// present, rides inside the instruction; the transcript travels separately
/// as chat messages.
fn build_system_prompt(retrieved: &[MemoryRecord]) -> String {
    if retrieved.is_empty() {
        return "You are a helpful AI assistant.\n\n\
                Instructions:\n\
                - Respond helpfully and conversationally\n\
                - Do NOT include any reasoning tags, thinking blocks, or meta-commentary\n\
                - Provide your response directly without any <reasoning> or </reasoning> tags\n\
                - Just give a natural, conversational response"
            .to_string();
    }

    let context = retrieved
        .iter()
        .map(|r| r.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a helpful AI assistant with access to the user's memory.\n\n\
         RELEVANT MEMORY CONTEXT:\n{context}\n\n\
         Instructions:\n\
         - Use the memory context to provide personalized responses\n\
         - Reference past conversations naturally when relevant\n\
         - Be conversational and helpful\n\
         - If no relevant context exists, respond normally\n\
         - Do NOT include any reasoning tags, thinking blocks, or meta-commentary\n\
         - Provide your response directly without any <reasoning> or </reasoning> tags\n\
         - Just give a natural, conversational response"
    )
}
