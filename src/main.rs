#![cfg(not(tarpaulin_include))]

use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use oa_scheduler::app;
use oa_scheduler::config::{DEFAULT_SECRETS_PATH, Secrets, load_settings};
use oa_scheduler::session::SessionProvider;
use oa_scheduler::sheets::google::GoogleSheets;
use oa_scheduler::view::Dashboard;

/// OA schedule dashboard
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "OA_BIND", default_value = "127.0.0.1:8501")]
    bind: String,

    /// Secrets file holding SHEET_URL and gcp_service_account
    #[arg(long, env = "OA_SECRETS", default_value = DEFAULT_SECRETS_PATH)]
    secrets: PathBuf,

    /// Spreadsheet URL, overrides SHEET_URL from the secrets file
    #[arg(long, env = "SHEET_URL")]
    sheet_url: Option<String>,
}

/// Main entry point for the web application
///
/// Configuration problems never stop the server: they are shown on the
/// Schedule page with a hint on how to fix them.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (config, locator) = load_settings(&args.secrets, args.sheet_url.as_deref());
    if let Err(e) = &locator {
        warn!("{}", e);
    }

    // Secrets are re-read on every connection attempt so a fixed file is
    // picked up without a restart
    let secrets_path = args.secrets.clone();
    let sessions = Arc::new(SessionProvider::new(
        move || {
            let key = Secrets::load(&secrets_path)?.service_account()?;
            GoogleSheets::new(key)
        },
        config.retry.clone(),
    ));

    info!(
        "Starting OA scheduler (roster tab '{}', {} schedule templates)",
        config.roster_sheet,
        config.schedule_sheets.len()
    );
    let dashboard = Dashboard::new(config, locator, sessions);
    app::run(dashboard, &args.bind).await
}
