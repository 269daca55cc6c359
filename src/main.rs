//! acct-fetch CLI
//!
//! Connects to IB TWS/Gateway, fetches the account summary and positions,
//! prints a report to stdout, and disconnects. Logs go to stderr.

use std::sync::Arc;

use clap::Parser;
use tokio::sync::oneshot;

use acct_fetch::config::Settings;
use acct_fetch::{AccountFetcher, AccountSnapshot, AccountSummary, FetchError, PositionRecord, Report, ReportFormat};

const EXIT_FAILURE: i32 = 1;
const EXIT_INTERRUPTED: i32 = 130;

struct Collected {
    summary: AccountSummary,
    positions: Vec<PositionRecord>,
    portfolio: Option<AccountSnapshot>,
}

async fn fetch(fetcher: &mut AccountFetcher, settings: &Settings) -> Result<Collected, FetchError> {
    let summary = fetcher.request_account_summary().await?;
    let positions = fetcher.request_positions().await?;
    let portfolio = if settings.include_portfolio {
        Some(fetcher.request_account_updates(&settings.account).await?)
    } else {
        None
    };
    Ok(Collected {
        summary,
        positions,
        portfolio,
    })
}

fn print_connect_help(e: &FetchError) {
    eprintln!("Failed to connect to IB TWS/Gateway!");
    eprintln!("  Error: {e}");
    eprintln!("Please ensure:");
    eprintln!("  1. TWS or IB Gateway is running");
    eprintln!("  2. API connections are enabled in TWS/Gateway settings");
    eprintln!("  3. The host, port and client ID are correct");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::parse();

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
    let shutdown_tx = Arc::new(std::sync::Mutex::new(Some(shutdown_tx)));

    if let Err(e) = ctrlc::set_handler(move || {
        if let Some(tx) = shutdown_tx.lock().ok().and_then(|mut guard| guard.take()) {
            let _ = tx.send(());
        }
    }) {
        tracing::warn!("failed to install Ctrl+C handler: {e}");
    }

    let mut fetcher = tokio::select! {
        result = AccountFetcher::connect_with(settings.fetcher_config()) => match result {
            Ok(fetcher) => fetcher,
            Err(e) => {
                print_connect_help(&e);
                std::process::exit(EXIT_FAILURE);
            }
        },
        _ = &mut shutdown_rx => {
            eprintln!("Interrupted while connecting");
            std::process::exit(EXIT_INTERRUPTED);
        }
    };

    let accounts = fetcher.managed_accounts().await;
    if !accounts.is_empty() {
        tracing::info!("Managed accounts: {}", accounts.join(", "));
    }

    let outcome = tokio::select! {
        result = fetch(&mut fetcher, &settings) => Some(result),
        _ = &mut shutdown_rx => None,
    };

    fetcher.disconnect().await;

    let collected = match outcome {
        Some(Ok(collected)) => collected,
        Some(Err(e)) => {
            eprintln!("Fetch failed: {e}");
            std::process::exit(EXIT_FAILURE);
        }
        None => {
            eprintln!("Interrupted, connection closed");
            std::process::exit(EXIT_INTERRUPTED);
        }
    };

    let report = Report {
        summary: &collected.summary,
        positions: &collected.positions,
        portfolio: collected.portfolio.as_ref(),
    };

    match report.render(settings.format) {
        Ok(text) => {
            if settings.format == ReportFormat::Text {
                println!("Generated: {}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"));
            }
            print!("{text}");
        }
        Err(e) => {
            eprintln!("Failed to render report: {e}");
            std::process::exit(EXIT_FAILURE);
        }
    }
}
