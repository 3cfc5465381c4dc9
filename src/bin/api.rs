use std::sync::Arc;

use task_agent_orchestrator::{
    agent::Orchestrator,
    api::start_server,
    llm::GeminiClient,
    mailer::SmtpMailer,
    store::TaskStore,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    if std::env::var("GEMINI_API_KEY").unwrap_or_default().is_empty() {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env");
        eprintln!("📌 Model calls will fall back to the safe defaults");
    }

    let api_port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("API_PORT"))
        .unwrap_or_else(|_| "8080".to_string())
        .parse()?;

    info!("🚀 Task Agent Orchestrator - API Server");
    info!("📍 Port: {}", api_port);

    // Create components
    let llm = Box::new(GeminiClient::from_env());
    let mailer = Box::new(SmtpMailer::from_env());
    let store = Arc::new(TaskStore::new());

    let orchestrator = Arc::new(Orchestrator::new(llm, mailer, store));

    info!("✅ Orchestrator initialized");
    info!("📡 Starting API server...");

    // Start API server
    start_server(orchestrator, api_port).await?;

    Ok(())
}
