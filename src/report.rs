//! Report formatting.
//!
//! All functions here are pure: they take collected data and return text.

use std::fmt::Write;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{AccountSnapshot, AccountSummary, PositionRecord};

const RULE: &str = "============================================================";

/// Summary tags shown in the report, with their labels.
const SUMMARY_LINES: &[(&str, &str)] = &[
    ("NetLiquidation", "Net Liquidation Value"),
    ("TotalCashValue", "Total Cash Value"),
    ("BuyingPower", "Buying Power"),
    ("AvailableFunds", "Available Funds"),
    ("GrossPositionValue", "Gross Position Value"),
    ("MaintMarginReq", "Maintenance Margin"),
    ("UnrealizedPnL", "Unrealized P&L"),
    ("RealizedPnL", "Realized P&L"),
];

const CASH_BALANCE_TAG: &str = "CashBalance";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Everything one fetch cycle collected.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report<'a> {
    pub summary: &'a AccountSummary,
    pub positions: &'a [PositionRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<&'a AccountSnapshot>,
}

impl Report<'_> {
    pub fn render(&self, format: ReportFormat) -> serde_json::Result<String> {
        match format {
            ReportFormat::Json => serde_json::to_string_pretty(self),
            ReportFormat::Text => {
                let mut out = format_report(self.summary, self.positions);
                if let Some(snapshot) = self.portfolio {
                    out.push('\n');
                    out.push_str(&format_portfolio(snapshot));
                }
                Ok(out)
            }
        }
    }
}

/// Render the account summary and positions as text.
///
/// Summary lines follow a fixed tag order and skip rows without a currency.
/// Cash balances come from the per-currency `CashBalance` rows, zero
/// balances omitted.
pub fn format_report(summary: &AccountSummary, positions: &[PositionRecord]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "ACCOUNT SUMMARY");
    let accounts = summary.accounts();
    if !accounts.is_empty() {
        let list: Vec<&str> = accounts.into_iter().collect();
        let _ = writeln!(out, "Account: {}", list.join(", "));
    }
    let _ = writeln!(out, "{RULE}");

    for (tag, label) in SUMMARY_LINES {
        for record in summary.by_tag(tag).filter(|r| !r.currency.is_empty()) {
            let _ = writeln!(out, "  {label}: {} {}", record.value, record.currency);
        }
    }

    let balances: Vec<_> = summary
        .by_tag(CASH_BALANCE_TAG)
        .filter(|r| !r.currency.is_empty() && !is_zero(&r.value))
        .collect();
    if !balances.is_empty() {
        let _ = writeln!(out, "\nCASH BALANCES:");
        for record in balances {
            let _ = writeln!(out, "  {}: {}", record.currency, record.value);
        }
    }

    if positions.is_empty() {
        let _ = writeln!(out, "\nPOSITIONS: None");
    } else {
        let _ = writeln!(out, "\nPOSITIONS:");
        for pos in positions {
            let _ = writeln!(
                out,
                "  {} ({}): {} @ {:.2} {} [{}]",
                pos.symbol, pos.sec_type, pos.position, pos.avg_cost, pos.currency, pos.account
            );
        }
    }

    let _ = writeln!(out, "\n{RULE}");
    out
}

/// Render an account-updates snapshot as a portfolio section.
pub fn format_portfolio(snapshot: &AccountSnapshot) -> String {
    let mut out = String::new();
    let mut heading = format!("PORTFOLIO ({}", snapshot.account);
    if let Some(ts) = &snapshot.updated_at {
        let _ = write!(heading, ", as of {ts}");
    }
    heading.push(')');

    if snapshot.portfolio.is_empty() {
        let _ = writeln!(out, "{heading}: None");
        return out;
    }

    let _ = writeln!(out, "{heading}:");
    for entry in &snapshot.portfolio {
        let _ = writeln!(
            out,
            "  {} ({}): {} @ ${:.2} | Value: ${:.2} | P&L: ${:.2}",
            entry.symbol, entry.sec_type, entry.position, entry.average_cost, entry.market_value, entry.unrealized_pnl
        );
    }
    out
}

/// Unparseable values are kept rather than hidden.
fn is_zero(value: &str) -> bool {
    value.trim().parse::<Decimal>().map(|d| d.is_zero()).unwrap_or(false)
}
