//! Chatbot WITH memory - remembers across turns, models, and restarts.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    memchat::run(true).await
}
