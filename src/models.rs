//! Account data models.
//!
//! Plain data collected from server events, with `serde` derives for the
//! JSON report.

use std::collections::{BTreeMap, BTreeSet};

use acct_fetch_ibapi::Contract;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

/// Serialize a keyed map as the list of its values.
fn serialize_values<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    V: Serialize,
    S: Serializer,
{
    serializer.collect_seq(map.values())
}

// ============================================================================
// Account Summary
// ============================================================================

/// One tag/value row delivered for an account summary request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummaryRecord {
    pub account: String,
    pub tag: String,
    /// Decimal string as sent by the server.
    pub value: String,
    pub currency: String,
}

/// Summary rows keyed by `(tag, currency)`.
///
/// A later row with the same key replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccountSummary {
    #[serde(rename = "records", serialize_with = "serialize_values")]
    records: BTreeMap<(String, String), AccountSummaryRecord>,
}

impl AccountSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row, returning the one it replaced.
    pub fn insert(&mut self, record: AccountSummaryRecord) -> Option<AccountSummaryRecord> {
        let key = (record.tag.clone(), record.currency.clone());
        self.records.insert(key, record)
    }

    pub fn get(&self, tag: &str, currency: &str) -> Option<&AccountSummaryRecord> {
        self.records.get(&(tag.to_string(), currency.to_string()))
    }

    /// All rows for `tag`, ordered by currency.
    pub fn by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a AccountSummaryRecord> + 'a {
        self.records
            .iter()
            .filter(move |((t, _), _)| t == tag)
            .map(|(_, r)| r)
    }

    pub fn records(&self) -> impl Iterator<Item = &AccountSummaryRecord> {
        self.records.values()
    }

    /// Distinct account ids seen in the rows.
    pub fn accounts(&self) -> BTreeSet<&str> {
        self.records.values().map(|r| r.account.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// Positions
// ============================================================================

/// Held quantity of one instrument in one account.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub account: String,
    pub symbol: String,
    pub sec_type: String,
    pub currency: String,
    pub exchange: String,
    /// Signed; negative for short positions.
    pub position: Decimal,
    pub avg_cost: f64,
}

impl PositionRecord {
    pub fn new(account: String, contract: &Contract, position: Decimal, avg_cost: f64) -> Self {
        Self {
            account,
            symbol: contract.symbol.clone(),
            sec_type: contract.sec_type_str(),
            currency: contract.currency.clone(),
            exchange: contract.exchange.clone(),
            position,
            avg_cost,
        }
    }
}

// ============================================================================
// Account Updates
// ============================================================================

/// One key/value pair from an account-updates subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountValue {
    pub key: String,
    pub value: String,
    pub currency: String,
}

/// A portfolio line with market valuation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioEntry {
    pub symbol: String,
    pub sec_type: String,
    pub currency: String,
    pub position: Decimal,
    pub market_price: f64,
    pub market_value: f64,
    pub average_cost: f64,
    #[serde(rename = "unrealizedPnL")]
    pub unrealized_pnl: f64,
    #[serde(rename = "realizedPnL")]
    pub realized_pnl: f64,
}

/// State accumulated from one account-updates download.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub account: String,
    #[serde(serialize_with = "serialize_values")]
    values: BTreeMap<(String, String), AccountValue>,
    pub portfolio: Vec<PortfolioEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl AccountSnapshot {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            ..Self::default()
        }
    }

    pub fn set_value(&mut self, key: String, value: String, currency: String) {
        self.values.insert(
            (key.clone(), currency.clone()),
            AccountValue { key, value, currency },
        );
    }

    pub fn value(&self, key: &str, currency: &str) -> Option<&str> {
        self.values
            .get(&(key.to_string(), currency.to_string()))
            .map(|v| v.value.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &AccountValue> {
        self.values.values()
    }

    /// Apply a portfolio update: a zero position removes the line for the
    /// same `(symbol, sec_type)`, anything else replaces or appends it.
    pub fn apply_portfolio(&mut self, entry: PortfolioEntry) {
        let existing = self
            .portfolio
            .iter()
            .position(|p| p.symbol == entry.symbol && p.sec_type == entry.sec_type);

        match (existing, entry.position.is_zero()) {
            (Some(i), true) => {
                self.portfolio.remove(i);
            }
            (None, true) => {}
            (Some(i), false) => self.portfolio[i] = entry,
            (None, false) => self.portfolio.push(entry),
        }
    }
}
