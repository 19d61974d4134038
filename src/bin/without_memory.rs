//! Chatbot WITHOUT memory - forgets everything when the process exits.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    memchat::run(false).await
}
