//! Conversation types and per-session state

use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::memory::MemoryRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One transcript entry. Append-only: never mutated or reordered after
/// creation. An entry with `error` set stands in for an assistant turn
/// whose inference call failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub error: bool,
    /// Memory records retrieved for this exchange, shown in the UI panel.
    /// Only populated on assistant turns of the memory-enabled variant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retrieved: Vec<MemoryRecord>,
}

fn is_false(b: &bool) -> bool {
    !b
}

/// RFC 3339 UTC timestamp with a `Z` suffix, the format the memory
/// service expects.
pub fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: utc_timestamp(),
            error: false,
            retrieved: Vec::new(),
        }
    }

    pub fn assistant(text: impl Into<String>, retrieved: Vec<MemoryRecord>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: utc_timestamp(),
            error: false,
            retrieved,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: utc_timestamp(),
            error: true,
            retrieved: Vec::new(),
        }
    }
}

/// State for one UI session: the ordered transcript and the currently
/// selected model. Discarded when the process exits; durability, if any,
/// lives in the remote memory service.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub turns: Vec<Turn>,
    pub model_id: String,
    pub created_at: String,
}

impl Session {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), model_id)
    }

    pub fn with_id(id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            turns: Vec::new(),
            model_id: model_id.into(),
            created_at: utc_timestamp(),
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    /// Switch the active model. Takes effect on the next turn only;
    /// earlier turns are untouched.
    pub fn select_model(&mut self, model_id: impl Into<String>) {
        self.model_id = model_id.into();
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

/// Sessions held by the server, keyed by session id. Each browser session
/// owns exactly one entry; nothing is shared across sessions.
pub type SessionMap = HashMap<String, Session>;
