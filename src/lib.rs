//! Memchat - workshop chatbot with pluggable persistent memory
//!
//! Two variants of the same chatbot, built from one orchestration path:
//! `chat-with-memory` stores and retrieves conversation memory through a
//! remote MemMachine service, `chat-without-memory` runs the identical
//! pipeline with no memory attached. Inference goes to AWS Bedrock in both.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod config;
pub mod conversation;
pub mod core;
pub mod providers;
pub mod routes;

use crate::config::Config;
use crate::conversation::SessionMap;
use crate::core::memory::MemoryStore;
use crate::core::{ChatEngine, MemMachineClient};
use crate::providers::BedrockProvider;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: Arc<ChatEngine>,
    pub sessions: Arc<RwLock<SessionMap>>,
}

/// Shared entry point for both binaries. A fatal configuration error
/// propagates out and crashes startup with the aggregated message.
pub async fn run(memory_enabled: bool) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memchat=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env(memory_enabled)?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let provider = Arc::new(BedrockProvider::new(&config.aws_region).await);

    let memory: Option<Arc<dyn MemoryStore>> = config
        .memory
        .as_ref()
        .map(|memory_config| Arc::new(MemMachineClient::new(memory_config)) as Arc<dyn MemoryStore>);

    if let Some(memory_config) = &config.memory {
        tracing::info!(
            server = %memory_config.server_url,
            user = %memory_config.user_id,
            "memory enabled"
        );
    } else {
        tracing::info!("memory disabled, conversations vanish on restart");
    }

    let engine = Arc::new(ChatEngine::new(provider, memory));

    let state = AppState {
        config,
        engine,
        sessions: Arc::new(RwLock::new(HashMap::new())),
    };

    let app = routes::app(state);

    tracing::info!("Memchat running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
