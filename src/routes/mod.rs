//! API routes and the embedded single-page UI
//!
//! Handlers hold no business logic beyond session bookkeeping: they lock
//! the session map, delegate the turn to the chat engine, and append the
//! result. The UI is a static page served from `assets/`.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::conversation::{Session, Turn};
use crate::providers::bedrock::{available_models, ModelInfo};
use crate::AppState;

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    memory_enabled: bool,
}

#[derive(Debug, Serialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
    default_model: String,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    session_id: String,
    model_id: String,
    turn: Turn,
    search_failed: bool,
    store_failed: bool,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    id: String,
    model_id: String,
    turns: Vec<Turn>,
}

#[derive(Debug, Deserialize)]
struct SelectModelRequest {
    model_id: String,
}

#[derive(Debug, Serialize)]
struct ConnectionStatus {
    service: &'static str,
    ok: bool,
    message: String,
}

async fn ui() -> Html<&'static str> {
    Html(include_str!("../../assets/index.html"))
}

async fn styles() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/css; charset=utf-8")],
        include_str!("../../assets/styles.css"),
    )
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        memory_enabled: state.engine.memory_enabled(),
    })
}

async fn models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        models: available_models(),
        default_model: state.config.default_model_id.clone(),
    })
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let message = request.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::bad_request("message must not be empty"));
    }

    // Append the user turn and snapshot the transcript. The lock is not
    // held across the remote calls.
    let (session_id, model_id, transcript) = {
        let mut sessions = state.sessions.write().await;
        let session = match &request.session_id {
            Some(id) => sessions
                .entry(id.clone())
                .or_insert_with(|| Session::with_id(id.clone(), &state.config.default_model_id)),
            None => {
                let session = Session::new(&state.config.default_model_id);
                sessions.entry(session.id.clone()).or_insert(session)
            }
        };
        session.push(Turn::user(&message));
        (
            session.id.clone(),
            session.model_id.clone(),
            session.turns.clone(),
        )
    };

    let (turn, search_failed, store_failed) =
        match state.engine.respond(&transcript, &model_id, &message).await {
            Ok(outcome) => (
                Turn::assistant(outcome.reply, outcome.retrieved),
                outcome.search_failed,
                outcome.store_failed,
            ),
            Err(e) => {
                tracing::error!(error = %e, model_id = %model_id, "inference failed");
                (Turn::error(format!("Error calling Bedrock: {e}")), false, false)
            }
        };

    {
        let mut sessions = state.sessions.write().await;
        if let Some(session) = sessions.get_mut(&session_id) {
            session.push(turn.clone());
        }
    }

    Ok(Json(ChatResponse {
        session_id,
        model_id,
        turn,
        search_failed,
        store_failed,
    }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let sessions = state.sessions.read().await;
    let session = sessions
        .get(&id)
        .ok_or_else(|| ApiError::not_found("unknown session"))?;

    Ok(Json(SessionResponse {
        id: session.id.clone(),
        model_id: session.model_id.clone(),
        turns: session.turns.clone(),
    }))
}

async fn select_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<SelectModelRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if request.model_id.trim().is_empty() {
        return Err(ApiError::bad_request("model_id must not be empty"));
    }

    let mut sessions = state.sessions.write().await;
    let session = sessions
        .get_mut(&id)
        .ok_or_else(|| ApiError::not_found("unknown session"))?;

    session.select_model(request.model_id.trim());
    Ok(Json(json!({ "model_id": session.model_id })))
}

async fn clear_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut sessions = state.sessions.write().await;
    let session = sessions
        .get_mut(&id)
        .ok_or_else(|| ApiError::not_found("unknown session"))?;

    session.clear();
    Ok(Json(json!({ "cleared": true })))
}

async fn connections(State(state): State<AppState>) -> Json<Vec<ConnectionStatus>> {
    let mut results = Vec::new();

    if let Some(memory) = state.engine.memory() {
        results.push(match memory.health().await {
            Ok(message) => ConnectionStatus {
                service: "memmachine",
                ok: true,
                message,
            },
            Err(e) => ConnectionStatus {
                service: "memmachine",
                ok: false,
                message: format!("MemMachine connection failed: {e}"),
            },
        });
    }

    results.push(match state.engine.provider().health().await {
        Ok(message) => ConnectionStatus {
            service: "bedrock",
            ok: true,
            message,
        },
        Err(e) => ConnectionStatus {
            service: "bedrock",
            ok: false,
            message: format!("AWS Bedrock connection failed: {e}"),
        },
    });

    Json(results)
}

async fn delete_all_memories(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let memory = state
        .engine
        .memory()
        .ok_or_else(|| ApiError::not_found("memory is not enabled"))?;

    memory
        .delete_all()
        .await
        .map_err(|e| ApiError::bad_gateway(format!("Error deleting memories: {e}")))?;

    Ok(Json(json!({ "deleted": true })))
}

pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/", get(ui))
        .route("/styles.css", get(styles))
        .route("/health", get(health))
        .route("/api/models", get(models))
        .route("/api/chat", post(chat))
        .route("/api/session/:id", get(get_session))
        .route("/api/session/:id/model", post(select_model))
        .route("/api/session/:id/clear", post(clear_session))
        .route("/api/connections", get(connections));

    if state.engine.memory_enabled() {
        router = router.route("/api/memories/delete_all", post(delete_all_memories));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::conversation::Role;
    use crate::core::memory::{MemoryError, MemoryRecord, MemoryStore};
    use crate::core::ChatEngine;
    use crate::providers::{ChatProvider, InferenceError};

    struct RecordingProvider {
        fail: bool,
        models_seen: Mutex<Vec<String>>,
    }

    impl RecordingProvider {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                models_seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChatProvider for RecordingProvider {
        async fn complete(
            &self,
            model_id: &str,
            _system: &str,
            transcript: &[Turn],
        ) -> Result<String, InferenceError> {
            self.models_seen.lock().unwrap().push(model_id.to_string());
            if self.fail {
                return Err(InferenceError::Model("invalid model".into()));
            }
            let last = transcript.last().map(|t| t.text.as_str()).unwrap_or("");
            Ok(format!("echo: {last}"))
        }

        async fn health(&self) -> Result<String, InferenceError> {
            Ok("AWS Bedrock connection: OK".to_string())
        }
    }

    #[derive(Default)]
    struct CountingMemory {
        stores: AtomicUsize,
    }

    #[async_trait]
    impl MemoryStore for CountingMemory {
        async fn store(&self, _text: &str, _role: Role) -> Result<(), MemoryError> {
            self.stores.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn search(&self, _query: &str) -> Result<Vec<MemoryRecord>, MemoryError> {
            Ok(Vec::new())
        }

        async fn delete_all(&self) -> Result<(), MemoryError> {
            Ok(())
        }

        async fn health(&self) -> Result<String, MemoryError> {
            Ok("MemMachine connection: OK".to_string())
        }
    }

    fn test_state(
        provider: Arc<RecordingProvider>,
        memory: Option<Arc<CountingMemory>>,
    ) -> AppState {
        let config = Config::from_vars(&HashMap::new(), false).unwrap();
        let memory_dyn = memory.map(|m| m as Arc<dyn MemoryStore>);
        AppState {
            config,
            engine: Arc::new(ChatEngine::new(provider, memory_dyn)),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn chat_appends_turns_in_creation_order() {
        let provider = RecordingProvider::new(false);
        let app = app(test_state(provider, None));

        let (status, first) = post_json(&app, "/api/chat", json!({"message": "one"})).await;
        assert_eq!(status, StatusCode::OK);
        let session_id = first["session_id"].as_str().unwrap().to_string();

        let (_, _second) = post_json(
            &app,
            "/api/chat",
            json!({"session_id": session_id, "message": "two"}),
        )
        .await;

        let (status, session) = get_json(&app, &format!("/api/session/{session_id}")).await;
        assert_eq!(status, StatusCode::OK);
        let turns = session["turns"].as_array().unwrap();
        let texts: Vec<_> = turns.iter().map(|t| t["text"].as_str().unwrap()).collect();
        assert_eq!(texts, vec!["one", "echo: one", "two", "echo: two"]);
        let roles: Vec<_> = turns.iter().map(|t| t["role"].as_str().unwrap()).collect();
        assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
    }

    #[tokio::test]
    async fn inference_failure_renders_error_entry_and_skips_memory_writes() {
        let provider = RecordingProvider::new(true);
        let memory = Arc::new(CountingMemory::default());
        let app = app(test_state(provider, Some(memory.clone())));

        let (status, body) = post_json(&app, "/api/chat", json!({"message": "hi"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["turn"]["error"], true);
        assert!(body["turn"]["text"]
            .as_str()
            .unwrap()
            .starts_with("Error calling Bedrock:"));
        assert_eq!(memory.stores.load(Ordering::SeqCst), 0);

        let session_id = body["session_id"].as_str().unwrap();
        let (_, session) = get_json(&app, &format!("/api/session/{session_id}")).await;
        let turns = session["turns"].as_array().unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[1]["error"], true);
    }

    #[tokio::test]
    async fn model_switch_applies_to_the_next_turn_only() {
        let provider = RecordingProvider::new(false);
        let app = app(test_state(provider.clone(), None));

        let (_, first) = post_json(&app, "/api/chat", json!({"message": "one"})).await;
        let session_id = first["session_id"].as_str().unwrap().to_string();

        let (status, switched) = post_json(
            &app,
            &format!("/api/session/{session_id}/model"),
            json!({"model_id": "anthropic.claude-3-haiku-20240307-v1:0"}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            switched["model_id"],
            "anthropic.claude-3-haiku-20240307-v1:0"
        );

        post_json(
            &app,
            "/api/chat",
            json!({"session_id": session_id, "message": "two"}),
        )
        .await;

        let seen = provider.models_seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                crate::config::DEFAULT_MODEL_ID.to_string(),
                "anthropic.claude-3-haiku-20240307-v1:0".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn successful_memory_turn_stores_both_entries() {
        let provider = RecordingProvider::new(false);
        let memory = Arc::new(CountingMemory::default());
        let app = app(test_state(provider, Some(memory.clone())));

        post_json(&app, "/api/chat", json!({"message": "remember me"})).await;
        assert_eq!(memory.stores.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn delete_all_route_only_exists_with_memory() {
        let without = app(test_state(RecordingProvider::new(false), None));
        let (status, _) = post_json(&without, "/api/memories/delete_all", json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let with = app(test_state(
            RecordingProvider::new(false),
            Some(Arc::new(CountingMemory::default())),
        ));
        let (status, body) = post_json(&with, "/api/memories/delete_all", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);
    }

    #[tokio::test]
    async fn health_reports_the_variant() {
        let app = app(test_state(
            RecordingProvider::new(false),
            Some(Arc::new(CountingMemory::default())),
        ));
        let (status, body) = get_json(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["memory_enabled"], true);
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let app = app(test_state(RecordingProvider::new(false), None));
        let (status, body) = post_json(&app, "/api/chat", json!({"message": "   "})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("message"));
    }
}
