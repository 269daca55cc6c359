//! Command-line and environment configuration.

use std::time::Duration;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};

use crate::fetcher::FetcherConfig;
use crate::report::ReportFormat;
use crate::severity::ErrorCodeTable;

/// Fetch account summary and positions from IB TWS/Gateway and print a report.
///
/// Every option can also be set through its environment variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "acct-fetch", version)]
pub struct Settings {
    /// IB TWS/Gateway host
    #[arg(long, env = "IB_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// IB TWS/Gateway port
    #[arg(long, env = "IB_PORT", default_value_t = 4002)]
    pub port: u16,

    /// IB client ID
    #[arg(long = "client-id", env = "IB_CLIENT_ID", default_value_t = 0)]
    pub client_id: i32,

    /// Seconds allowed for connect and handshake
    #[arg(long = "connect-timeout", env = "IB_CONNECT_TIMEOUT", default_value_t = 10)]
    pub connect_timeout: u64,

    /// Seconds allowed per data request
    #[arg(long = "request-timeout", env = "IB_REQUEST_TIMEOUT", default_value_t = 15)]
    pub request_timeout: u64,

    /// Account group for the summary request
    #[arg(long = "account-group", env = "IB_ACCOUNT_GROUP", default_value = "All")]
    pub account_group: String,

    /// Also fetch portfolio valuation through account updates
    ///
    /// The environment variable accepts 1/0, yes/no, on/off and true/false.
    #[arg(
        long = "portfolio",
        env = "IB_INCLUDE_PORTFOLIO",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub include_portfolio: bool,

    /// Account for the portfolio fetch (default: first managed account)
    #[arg(long, env = "IB_ACCOUNT", default_value = "")]
    pub account: String,

    /// Extra error codes to treat as informational (comma-separated)
    #[arg(long = "info-codes", env = "IB_INFO_CODES", value_delimiter = ',')]
    pub info_codes: Vec<i32>,

    /// Extra error codes to treat as fatal (comma-separated)
    #[arg(long = "fatal-codes", env = "IB_FATAL_CODES", value_delimiter = ',')]
    pub fatal_codes: Vec<i32>,

    /// Report output format
    #[arg(long = "format", env = "IB_REPORT_FORMAT", value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

impl Settings {
    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            host: self.host.clone(),
            port: self.port,
            client_id: self.client_id,
            connect_timeout: Duration::from_secs(self.connect_timeout),
            request_timeout: Duration::from_secs(self.request_timeout),
            account_group: self.account_group.clone(),
            error_codes: ErrorCodeTable::with_overrides(&self.info_codes, &self.fatal_codes),
        }
    }
}
