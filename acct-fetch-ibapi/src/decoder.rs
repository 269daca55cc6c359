//! IB TWS API message decoder.
//!
//! Decodes incoming messages from the IB wire format: null-terminated ASCII
//! fields parsed from a byte buffer with a position-tracking cursor.

// Decoder functions assign fields in wire order, which does not fit
// struct-literal initialization.
#![allow(clippy::field_reassign_with_default)]

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::errors::{IBApiError, Result};
use crate::models::contract::Contract;
use crate::protocol::{incoming, server_version};
use crate::wrapper::IBEvent;

// ============================================================================
// MessageDecoder
// ============================================================================

/// Decodes IB API wire-format message fields from a byte buffer.
///
/// Each `decode_*` method reads the next field (bytes up to the null
/// terminator), parses it into the requested type, and advances the cursor.
pub struct MessageDecoder<'a> {
    data: &'a [u8],
    pos: usize,
    server_version: i32,
}

impl<'a> MessageDecoder<'a> {
    /// Create a decoder over a message body (without the 4-byte length header).
    pub fn new(data: &'a [u8], server_version: i32) -> Self {
        Self {
            data,
            pos: 0,
            server_version,
        }
    }

    pub fn server_version(&self) -> i32 {
        self.server_version
    }

    pub fn has_remaining(&self) -> bool {
        self.pos < self.data.len()
    }

    fn find_field_end(&self) -> Result<usize> {
        self.data[self.pos..]
            .iter()
            .position(|&b| b == 0)
            .map(|offset| self.pos + offset)
            .ok_or_else(|| IBApiError::Decoding("field not null-terminated".into()))
    }

    fn read_field_str(&mut self) -> Result<&'a str> {
        if !self.has_remaining() {
            return Err(IBApiError::Decoding("unexpected end of message".into()));
        }
        let end = self.find_field_end()?;
        let field = std::str::from_utf8(&self.data[self.pos..end])
            .map_err(|e| IBApiError::Decoding(format!("invalid UTF-8: {e}")))?;
        self.pos = end + 1;
        Ok(field)
    }

    // ========================================================================
    // Type-specific decoders
    // ========================================================================

    pub fn decode_string(&mut self) -> Result<String> {
        self.read_field_str().map(|s| s.to_string())
    }

    /// Decode an i32 field. Empty string → 0.
    pub fn decode_i32(&mut self) -> Result<i32> {
        let s = self.read_field_str()?;
        if s.is_empty() {
            return Ok(0);
        }
        s.parse::<i32>()
            .map_err(|e| IBApiError::Decoding(format!("invalid i32 '{s}': {e}")))
    }

    /// Decode an i64 field. Empty string → 0.
    pub fn decode_i64(&mut self) -> Result<i64> {
        let s = self.read_field_str()?;
        if s.is_empty() {
            return Ok(0);
        }
        s.parse::<i64>()
            .map_err(|e| IBApiError::Decoding(format!("invalid i64 '{s}': {e}")))
    }

    /// Decode a f64 field. Handles `"Infinity"`; empty string → 0.0.
    pub fn decode_f64(&mut self) -> Result<f64> {
        let s = self.read_field_str()?;
        if s.is_empty() {
            return Ok(0.0);
        }
        if s == "Infinity" {
            return Ok(f64::INFINITY);
        }
        s.parse::<f64>()
            .map_err(|e| IBApiError::Decoding(format!("invalid f64 '{s}': {e}")))
    }

    /// Decode Option<f64>: empty string → None.
    pub fn decode_f64_max(&mut self) -> Result<Option<f64>> {
        let s = self.read_field_str()?;
        if s.is_empty() {
            return Ok(None);
        }
        if s == "Infinity" {
            return Ok(Some(f64::INFINITY));
        }
        s.parse::<f64>()
            .map(Some)
            .map_err(|e| IBApiError::Decoding(format!("invalid f64 '{s}': {e}")))
    }

    /// Decode a Decimal field. Empty string → zero.
    pub fn decode_decimal(&mut self) -> Result<Decimal> {
        let s = self.read_field_str()?;
        if s.is_empty() {
            return Ok(Decimal::ZERO);
        }
        Decimal::from_str(s)
            .map_err(|e| IBApiError::Decoding(format!("invalid Decimal '{s}': {e}")))
    }

    /// Decode a string field into a typed value via `FromStr`; empty → None.
    pub fn decode_enum_opt<T: FromStr>(&mut self) -> Result<Option<T>>
    where
        T::Err: std::fmt::Display,
    {
        let s = self.read_field_str()?;
        if s.is_empty() {
            return Ok(None);
        }
        s.parse::<T>()
            .map(Some)
            .map_err(|e| IBApiError::Decoding(format!("invalid enum value '{s}': {e}")))
    }

    pub fn skip_field(&mut self) -> Result<()> {
        let _ = self.read_field_str()?;
        Ok(())
    }
}

// ============================================================================
// Server Message Dispatch
// ============================================================================

/// Decode a complete server message into an `IBEvent`.
///
/// Reads the message id and dispatches to the per-message decoder. Messages
/// the fetcher has no use for, and messages that fail to decode, come back as
/// `IBEvent::Unknown`.
pub fn decode_server_msg(data: &[u8], server_version: i32) -> IBEvent {
    match decode_server_msg_inner(data, server_version) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!("failed to decode server message: {e}");
            IBEvent::Unknown {
                msg_id: -1,
                data: data.to_vec(),
            }
        }
    }
}

fn decode_server_msg_inner(data: &[u8], server_version: i32) -> Result<IBEvent> {
    let mut dec = MessageDecoder::new(data, server_version);
    let msg_id = dec.decode_i32()?;

    match msg_id {
        incoming::ERR_MSG => decode_err_msg(&mut dec),
        incoming::NEXT_VALID_ID => decode_next_valid_id(&mut dec),
        incoming::MANAGED_ACCTS => decode_managed_accts(&mut dec),
        incoming::ACCOUNT_SUMMARY => decode_account_summary(&mut dec),
        incoming::ACCOUNT_SUMMARY_END => decode_account_summary_end(&mut dec),
        incoming::POSITION_DATA => decode_position_data(&mut dec),
        incoming::POSITION_END => Ok(IBEvent::PositionEnd),
        incoming::ACCT_VALUE => decode_acct_value(&mut dec),
        incoming::PORTFOLIO_VALUE => decode_portfolio_value(&mut dec),
        incoming::ACCT_UPDATE_TIME => decode_acct_update_time(&mut dec),
        incoming::ACCT_DOWNLOAD_END => decode_acct_download_end(&mut dec),
        _ => Ok(IBEvent::Unknown {
            msg_id,
            data: data.to_vec(),
        }),
    }
}

// ============================================================================
// Connection & Error
// ============================================================================

/// Decode ERR_MSG (4).
fn decode_err_msg(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let version = dec.decode_i32()?;

    // Version 1 carries only text; code 0 marks it as an untyped notice.
    if version < 2 {
        let message = dec.decode_string()?;
        return Ok(IBEvent::Error {
            req_id: -1,
            code: 0,
            message,
            advanced_order_reject_json: String::new(),
        });
    }

    let req_id = dec.decode_i32()?;
    let code = dec.decode_i32()?;
    let message = dec.decode_string()?;

    let advanced_order_reject_json =
        if dec.server_version() >= server_version::ADVANCED_ORDER_REJECT && dec.has_remaining() {
            dec.decode_string()?
        } else {
            String::new()
        };

    if dec.server_version() >= server_version::ERROR_TIME && dec.has_remaining() {
        dec.skip_field()?;
    }

    Ok(IBEvent::Error {
        req_id,
        code,
        message,
        advanced_order_reject_json,
    })
}

/// Decode NEXT_VALID_ID (9).
fn decode_next_valid_id(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let _version = dec.decode_i32()?;
    let order_id = dec.decode_i64()?;
    Ok(IBEvent::NextValidId { order_id })
}

/// Decode MANAGED_ACCTS (15).
fn decode_managed_accts(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let _version = dec.decode_i32()?;
    let accounts = dec.decode_string()?;
    Ok(IBEvent::ManagedAccounts { accounts })
}

// ============================================================================
// Account Summary & Positions
// ============================================================================

/// Decode ACCOUNT_SUMMARY (63).
fn decode_account_summary(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let _version = dec.decode_i32()?;
    let req_id = dec.decode_i32()?;
    let account = dec.decode_string()?;
    let tag = dec.decode_string()?;
    let value = dec.decode_string()?;
    let currency = dec.decode_string()?;
    Ok(IBEvent::AccountSummary { req_id, account, tag, value, currency })
}

/// Decode ACCOUNT_SUMMARY_END (64).
fn decode_account_summary_end(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let _version = dec.decode_i32()?;
    let req_id = dec.decode_i32()?;
    Ok(IBEvent::AccountSummaryEnd { req_id })
}

/// Decode POSITION_DATA (61).
fn decode_position_data(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let version = dec.decode_i32()?;
    let account = dec.decode_string()?;
    let mut contract = Contract::default();
    contract.con_id = dec.decode_i64()?;
    contract.symbol = dec.decode_string()?;
    contract.sec_type = dec.decode_enum_opt()?;
    contract.last_trade_date_or_contract_month = dec.decode_string()?;
    contract.strike = dec.decode_f64_max()?;
    contract.right = dec.decode_string()?;
    contract.multiplier = dec.decode_string()?;
    contract.exchange = dec.decode_string()?;
    contract.currency = dec.decode_string()?;
    contract.local_symbol = dec.decode_string()?;
    if version >= 2 { contract.trading_class = dec.decode_string()?; }
    let position = dec.decode_decimal()?;
    let avg_cost = if version >= 3 { dec.decode_f64()? } else { 0.0 };
    Ok(IBEvent::Position { account, contract: Box::new(contract), position, avg_cost })
}

// ============================================================================
// Account Updates
// ============================================================================

/// Decode ACCT_VALUE (6).
fn decode_acct_value(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let version = dec.decode_i32()?;
    let key = dec.decode_string()?;
    let value = dec.decode_string()?;
    let currency = dec.decode_string()?;
    let account_name = if version >= 2 { dec.decode_string()? } else { String::new() };
    Ok(IBEvent::UpdateAccountValue { key, value, currency, account_name })
}

/// Decode PORTFOLIO_VALUE (7).
fn decode_portfolio_value(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let version = dec.decode_i32()?;
    let mut contract = Contract::default();
    if version >= 6 { contract.con_id = dec.decode_i64()?; }
    contract.symbol = dec.decode_string()?;
    contract.sec_type = dec.decode_enum_opt()?;
    contract.last_trade_date_or_contract_month = dec.decode_string()?;
    contract.strike = dec.decode_f64_max()?;
    contract.right = dec.decode_string()?;
    if version >= 7 {
        contract.multiplier = dec.decode_string()?;
        contract.primary_exchange = dec.decode_string()?;
    }
    contract.currency = dec.decode_string()?;
    if version >= 2 { contract.local_symbol = dec.decode_string()?; }
    if version >= 8 { contract.trading_class = dec.decode_string()?; }

    let position = dec.decode_decimal()?;
    let market_price = dec.decode_f64()?;
    let market_value = dec.decode_f64()?;
    let (average_cost, unrealized_pnl, realized_pnl) = if version >= 3 {
        (dec.decode_f64()?, dec.decode_f64()?, dec.decode_f64()?)
    } else {
        (0.0, 0.0, 0.0)
    };
    let account_name = if version >= 4 { dec.decode_string()? } else { String::new() };

    Ok(IBEvent::UpdatePortfolio {
        contract: Box::new(contract),
        position, market_price, market_value, average_cost,
        unrealized_pnl, realized_pnl, account_name,
    })
}

/// Decode ACCT_UPDATE_TIME (8).
fn decode_acct_update_time(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let _version = dec.decode_i32()?;
    let timestamp = dec.decode_string()?;
    Ok(IBEvent::UpdateAccountTime { timestamp })
}

/// Decode ACCT_DOWNLOAD_END (54).
fn decode_acct_download_end(dec: &mut MessageDecoder) -> Result<IBEvent> {
    let _version = dec.decode_i32()?;
    let account = dec.decode_string()?;
    Ok(IBEvent::AccountDownloadEnd { account })
}

// ============================================================================
// Tests
// ============================================================================
