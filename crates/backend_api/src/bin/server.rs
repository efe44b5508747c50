use std::path::PathBuf;

use backend_api::{init_tracing, run_server};
use clap::Parser;
use settings_loader::AppSettings;

#[derive(Parser, Debug)]
#[command(name = "server", about = "Budget assistant HTTP API.")]
struct Args {
    /// Optional settings JSON; falls back to $SETTINGS_PATH
    #[arg(long)]
    settings: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real env vars still apply
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let settings = AppSettings::load(args.settings.as_ref())?;

    println!("Budget Assistant API Server");
    println!("===========================");
    println!("Database: {}", settings.store.path.display());
    println!("Listening on: {}", settings.server.bind_address());
    println!("Chat enabled: {}", settings.model.is_configured());
    println!();

    run_server(settings).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_flag() {
        let args = Args::try_parse_from(["server", "--settings", "config/prod.json"]).unwrap();
        assert_eq!(args.settings, Some(PathBuf::from("config/prod.json")));

        let args = Args::try_parse_from(["server"]).unwrap();
        assert_eq!(args.settings, None);
    }
}
