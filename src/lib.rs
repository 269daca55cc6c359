//! acct-fetch -- account summary and position fetcher for IB TWS/Gateway.
//!
//! One fetch cycle connects, requests the account summary and positions,
//! waits for each to complete, and formats a report.
//!
//! ```rust,ignore
//! let mut fetcher = AccountFetcher::connect("127.0.0.1", 4002, 0).await?;
//! let summary = fetcher.request_account_summary().await?;
//! let positions = fetcher.request_positions().await?;
//! fetcher.disconnect().await;
//! println!("{}", format_report(&summary, &positions));
//! ```

pub mod config;
pub mod errors;
pub mod fetcher;
pub mod handler;
pub mod models;
pub mod report;
pub mod severity;

pub use errors::FetchError;
pub use fetcher::{AccountFetcher, FetcherConfig};
pub use models::{AccountSnapshot, AccountSummary, AccountSummaryRecord, PortfolioEntry, PositionRecord};
pub use report::{format_portfolio, format_report, Report, ReportFormat};
pub use severity::{ErrorCodeTable, Severity};
