use std::io::{self, Write};
use std::sync::Arc;

use task_agent_orchestrator::{
    agent::{Orchestrator, SessionContext},
    llm::GeminiClient,
    mailer::SmtpMailer,
    store::TaskStore,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing; keep the REPL quiet unless asked otherwise.
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    if std::env::var("GEMINI_API_KEY").unwrap_or_default().is_empty() {
        eprintln!("⚠️  GEMINI_API_KEY not set in .env — every model call will fall back safely");
    }

    // Create components
    let llm = Box::new(GeminiClient::from_env());
    let mailer = Box::new(SmtpMailer::from_env());
    let store = Arc::new(TaskStore::new());

    let orchestrator = Orchestrator::new(llm, mailer, store);
    let mut session = SessionContext::new();

    info!("Task assistant starting");

    println!("Task assistant. Type 'exit' to quit.");
    println!("Examples:");
    println!(" - 'I need to submit the report by tomorrow 7pm'  (task → add)");
    println!(" - 'summarize tasks'                              (task → summarize)");
    println!(" - 'email Brian about the meeting next week'      (email → draft)");

    let stdin = io::stdin();
    loop {
        print!("You: ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            // EOF
            println!();
            break;
        }

        let user = line.trim();
        if user.is_empty() {
            continue;
        }
        if user.eq_ignore_ascii_case("exit") || user.eq_ignore_ascii_case("quit") {
            println!("Bye.");
            break;
        }

        let reply = orchestrator.handle_turn(&mut session, user).await;
        println!("\nAssistant: {}\n", reply);
    }

    Ok(())
}
