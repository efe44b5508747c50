use std::path::PathBuf;
use std::sync::Arc;

use ai::{ChatOrchestrator, ToolRegistry};
use ai_client::AnthropicClient;
use anyhow::{Context, Result, anyhow};
use clap::Parser;
use database::{SqliteStore, SystemClock};
use models::{Filters, Period};
use settings_loader::AppSettings;

#[derive(Parser, Debug)]
#[command(name = "ask", about = "Ask the budget assistant one question from the terminal.")]
struct Args {
    /// The question, e.g. "How much did I spend on groceries?"
    #[arg(short, long)]
    message: String,

    /// Dashboard period the question defaults to (monthly or yearly)
    #[arg(long, default_value = "monthly", value_parser = parse_period)]
    period: Period,

    /// Month in YYYY-MM format
    #[arg(long)]
    month: Option<String>,

    #[arg(long)]
    year: Option<i32>,

    /// Person to focus on, or "all"
    #[arg(long, default_value = "all")]
    user: String,

    /// Optional settings JSON; falls back to $SETTINGS_PATH
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Print the resulting conversation history as JSON
    #[arg(long)]
    show_history: bool,
}

fn parse_period(raw: &str) -> std::result::Result<Period, String> {
    Period::parse(raw).ok_or_else(|| format!("unknown period '{raw}', expected monthly or yearly"))
}

impl Args {
    fn filters(&self) -> Filters {
        Filters {
            period: self.period,
            month: self.month.clone().filter(|m| !m.trim().is_empty()),
            year: self.year,
            user: self.user.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ai=info,database=warn".into()),
        )
        .init();

    let args = Args::parse();
    let settings = AppSettings::load(args.settings.as_ref())?;
    if !settings.model.is_configured() {
        return Err(anyhow!("ANTHROPIC_API_KEY is not set; add it to the environment or .env"));
    }

    let store = Arc::new(
        SqliteStore::open(&settings.store)
            .with_context(|| format!("opening {}", settings.store.path.display()))?,
    );
    let clock = Arc::new(SystemClock);
    let registry = ToolRegistry::new(store, clock.clone());
    let client = AnthropicClient::new(settings.model.clone())?;
    let orchestrator = ChatOrchestrator::new(Arc::new(client), Arc::new(registry), clock, settings.chat);

    let turn = orchestrator
        .process_message(&args.message, &[], &args.filters())
        .await;

    println!("{}", turn.response);
    if args.show_history {
        println!("{}", serde_json::to_string_pretty(&turn.conversation_history)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_build_filters() {
        let args = Args::try_parse_from([
            "ask", "-m", "top merchants?", "--period", "Yearly", "--year", "2025", "--user", "Bob",
        ])
        .unwrap();
        let filters = args.filters();
        assert_eq!(filters.period, Period::Yearly);
        assert_eq!(filters.year, Some(2025));
        assert_eq!(filters.user, "Bob");
        assert_eq!(filters.month, None);
    }

    #[test]
    fn test_rejects_unknown_period() {
        assert!(Args::try_parse_from(["ask", "-m", "hi", "--period", "weekly"]).is_err());
    }
}
